//! Polymarket CLOB API Adapter
//!
//! Live implementations of the exchange and signer ports over HTTP.
//!
//! Sub-modules:
//! - `auth`: HMAC request signing with level-2 API credentials
//! - `client`: HTTP client with rate limiting and read retries
//! - `exchange`: `ExchangeClient` with trade polling for fills
//! - `signer`: `OrderSigner` backed by a signing sidecar
//! - `types`: API request/response types

pub mod auth;
pub mod client;
pub mod exchange;
pub mod signer;
pub mod types;

pub use auth::ClobAuth;
pub use client::ClobHttp;
pub use exchange::ClobExchange;
pub use signer::RemoteSigner;
