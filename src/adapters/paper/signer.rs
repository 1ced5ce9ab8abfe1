//! Paper signer: HMAC over the intent with a process-local key.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;

use crate::domain::order::{OrderIntent, SignedOrder};
use crate::ports::signer::OrderSigner;

/// Deterministic local signer for paper trading.
pub struct PaperSigner {
    key: Vec<u8>,
    salt: AtomicU64,
}

impl PaperSigner {
    /// Signer with the given key material.
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            salt: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl OrderSigner for PaperSigner {
    async fn sign(&self, intent: &OrderIntent) -> Result<SignedOrder> {
        let salt = self.salt.fetch_add(1, Ordering::Relaxed);
        let message = format!(
            "{}:{}:{}:{}:{:.4}:{:.4}:{salt}",
            intent.id(),
            intent.token_id(),
            intent.side(),
            intent.strategy(),
            intent.price(),
            intent.size(),
        );
        let mac = hmac_sha256::HMAC::mac(message.as_bytes(), &self.key);
        Ok(SignedOrder {
            intent: intent.clone(),
            signature: base64::engine::general_purpose::STANDARD.encode(mac),
            signer: "paper".to_string(),
            salt,
        })
    }
}
