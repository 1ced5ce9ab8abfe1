//! Signer Port - External Order Signing
//!
//! Key custody and EIP-712 payload construction live outside the core.
//! The execution engine hands over a validated intent and gets back the
//! signature material the exchange client attaches to the submission.

use async_trait::async_trait;

use crate::domain::order::{OrderIntent, SignedOrder};

/// Trait for signing collaborators.
#[async_trait]
pub trait OrderSigner: Send + Sync + 'static {
  /// Sign one intent.
  async fn sign(&self, intent: &OrderIntent) -> anyhow::Result<SignedOrder>;
}
