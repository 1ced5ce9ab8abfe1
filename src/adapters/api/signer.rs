//! Remote Signer - `OrderSigner` over a Signing Sidecar
//!
//! Keys never enter this process. Intents are posted to a local signing
//! service which returns the signature, signer address and salt.

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::client::ClobHttp;
use crate::domain::order::{OrderIntent, OrderType, Side, SignedOrder};
use crate::ports::signer::OrderSigner;

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    #[serde(rename = "tokenId")]
    token_id: &'a str,
    price: f64,
    size: f64,
    side: Side,
    #[serde(rename = "orderType")]
    order_type: OrderType,
    #[serde(rename = "clientId")]
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    signature: String,
    signer: String,
    salt: u64,
}

/// Signer backed by an HTTP sidecar.
pub struct RemoteSigner {
    http: Arc<ClobHttp>,
}

impl RemoteSigner {
    /// Signer using a client pointed at the sidecar.
    pub const fn new(http: Arc<ClobHttp>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl OrderSigner for RemoteSigner {
    async fn sign(&self, intent: &OrderIntent) -> Result<SignedOrder> {
        let request = SignRequest {
            token_id: intent.token_id(),
            price: intent.price(),
            size: intent.size(),
            side: intent.side(),
            order_type: intent.order_type(),
            client_id: intent.id().to_string(),
        };
        let response: SignResponse = self.http.post_json("/sign", &request).await?;
        if response.signature.is_empty() {
            bail!("Signer returned an empty signature for {}", intent.id());
        }
        Ok(SignedOrder {
            intent: intent.clone(),
            signature: response.signature,
            signer: response.signer,
            salt: response.salt,
        })
    }
}
