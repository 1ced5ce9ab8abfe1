//! Paper Trading - In-process Exchange and Signer
//!
//! Lets the full engine run against live or replayed feeds without
//! touching the venue. The exchange mirrors books from the feed (it is
//! registered as a `FeedObserver`) and matches our orders against them.

pub mod exchange;
pub mod signer;

pub use exchange::PaperExchange;
pub use signer::PaperSigner;
