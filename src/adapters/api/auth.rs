//! CLOB Authentication - HMAC-SHA256 Request Signing
//!
//! Level-2 API credentials for the CLOB REST API. Every authenticated
//! request carries the key, passphrase, a timestamp and an HMAC over
//! `timestamp + method + path + body`. Credentials come from the
//! environment (POLY_API_KEY, POLY_API_SECRET, POLY_PASSPHRASE).
//!
//! Order signing (EIP-712) is a different concern and lives with the
//! external signer.

use anyhow::{Context, Result};
use base64::Engine;

/// Header values for one authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    /// POLY_API_KEY.
    pub api_key: String,
    /// POLY_PASSPHRASE.
    pub passphrase: String,
    /// POLY_TIMESTAMP (Unix seconds).
    pub timestamp: String,
    /// POLY_SIGNATURE.
    pub signature: String,
}

/// CLOB API credentials.
pub struct ClobAuth {
    api_key: String,
    /// Never sent; only the HMAC derived from it is.
    api_secret: String,
    passphrase: String,
}

impl std::fmt::Debug for ClobAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClobAuth")
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

impl ClobAuth {
    /// Credentials from explicit values.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            passphrase: passphrase.into(),
        }
    }

    /// Load credentials from environment variables.
    ///
    /// # Errors
    /// Any of the three variables is missing.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("POLY_API_KEY").context("POLY_API_KEY not set")?;
        let api_secret = std::env::var("POLY_API_SECRET").context("POLY_API_SECRET not set")?;
        let passphrase = std::env::var("POLY_PASSPHRASE").context("POLY_PASSPHRASE not set")?;
        Ok(Self::new(api_key, api_secret, passphrase))
    }

    /// HMAC-SHA256 over `timestamp + method + path + body`, base64.
    pub fn sign(&self, timestamp: &str, method: &str, path: &str, body: &str) -> String {
        let message = format!("{timestamp}{method}{path}{body}");
        let mac = hmac_sha256::HMAC::mac(message.as_bytes(), self.api_secret.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac)
    }

    /// Headers for a request made at `timestamp` (Unix seconds).
    pub fn headers_at(&self, timestamp: u64, method: &str, path: &str, body: &str) -> AuthHeaders {
        let timestamp = timestamp.to_string();
        AuthHeaders {
            signature: self.sign(&timestamp, method, path, body),
            api_key: self.api_key.clone(),
            passphrase: self.passphrase.clone(),
            timestamp,
        }
    }

    /// Headers for a request made now.
    pub fn headers(&self, method: &str, path: &str, body: &str) -> AuthHeaders {
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        self.headers_at(now, method, path, body)
    }
}
