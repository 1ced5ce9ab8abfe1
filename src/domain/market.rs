//! Market identity types.
//!
//! A `Market` is the immutable description of one up/down window as
//! supplied by the discovery collaborator. The lifecycle phase is not
//! stored here: it is a pure function of wall-clock time (see `lifecycle`).

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────
// Identifier aliases used across ports
// ────────────────────────────────────────────

/// Outcome token identifier.
pub type TokenId = String;

/// Exchange order identifier.
pub type OrderId = String;

/// Market / condition identifier.
pub type MarketId = String;

/// Minutes in a (365-day) year, used to de-annualize volatility.
pub const MINUTES_PER_YEAR: f64 = 525_600.0;

// ────────────────────────────────────────────
// Asset and duration
// ────────────────────────────────────────────

/// Underlying spot asset of an up/down market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    /// Bitcoin
    BTC,
    /// Ethereum
    ETH,
    /// Solana
    SOL,
    /// Ripple
    XRP,
}

impl Asset {
    /// Every supported asset, in table order.
    pub const ALL: [Self; 4] = [Self::BTC, Self::ETH, Self::SOL, Self::XRP];

    /// Position of this asset in per-asset config tables.
    pub const fn index(self) -> usize {
        match self {
            Self::BTC => 0,
            Self::ETH => 1,
            Self::SOL => 2,
            Self::XRP => 3,
        }
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BTC => write!(f, "BTC"),
            Self::ETH => write!(f, "ETH"),
            Self::SOL => write!(f, "SOL"),
            Self::XRP => write!(f, "XRP"),
        }
    }
}

/// Window length of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DurationClass {
    /// 5-minute window.
    #[serde(rename = "5m")]
    FiveMin,
    /// 15-minute window.
    #[serde(rename = "15m")]
    FifteenMin,
}

impl DurationClass {
    /// Total window length in seconds.
    pub const fn seconds(self) -> u64 {
        match self {
            Self::FiveMin => 300,
            Self::FifteenMin => 900,
        }
    }

    /// Multiplier applied to the 5-minute phase boundaries.
    pub const fn phase_scale(self) -> u64 {
        match self {
            Self::FiveMin => 1,
            Self::FifteenMin => 3,
        }
    }
}

impl std::fmt::Display for DurationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FiveMin => write!(f, "5m"),
            Self::FifteenMin => write!(f, "15m"),
        }
    }
}

/// Which of the two outcome tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenSide {
    /// Pays $1 if the close is above the reference price.
    Yes,
    /// Pays $1 otherwise.
    No,
}

impl TokenSide {
    /// The other token of the pair.
    pub const fn opposite(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }
}

impl std::fmt::Display for TokenSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

// ────────────────────────────────────────────
// Market
// ────────────────────────────────────────────

/// One up/down market window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Condition / market identifier.
    pub id: MarketId,
    /// Underlying asset.
    pub asset: Asset,
    /// Window length.
    pub duration: DurationClass,
    /// Window open (Unix ms).
    pub open_ms: u64,
    /// Window close (Unix ms).
    pub expiry_ms: u64,
    /// Spot price at open; the up/down reference.
    pub reference_price: f64,
    /// YES outcome token.
    pub yes_token: TokenId,
    /// NO outcome token.
    pub no_token: TokenId,
}

impl Market {
    /// Token id for the given side.
    pub fn token(&self, side: TokenSide) -> &TokenId {
        match side {
            TokenSide::Yes => &self.yes_token,
            TokenSide::No => &self.no_token,
        }
    }

    /// Which side a token belongs to, if it belongs to this market.
    pub fn side_of(&self, token_id: &str) -> Option<TokenSide> {
        if token_id == self.yes_token {
            Some(TokenSide::Yes)
        } else if token_id == self.no_token {
            Some(TokenSide::No)
        } else {
            None
        }
    }

    /// Seconds left until expiry, floored at zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn seconds_remaining(&self, now_ms: u64) -> f64 {
        self.expiry_ms.saturating_sub(now_ms) as f64 / 1000.0
    }

    /// Minutes left until expiry, floored at zero.
    pub fn minutes_remaining(&self, now_ms: u64) -> f64 {
        self.seconds_remaining(now_ms) / 60.0
    }
}
