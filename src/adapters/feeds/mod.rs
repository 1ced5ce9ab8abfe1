//! Feed Adapters - Event Ingestion
//!
//! - `ingress`: bounded never-drop queue plus per-token book coalescing
//! - `jsonl`: normalized events from a file or stdin

pub mod ingress;
pub mod jsonl;

pub use ingress::{FeedIngress, IngressReceiver, ingress};
pub use jsonl::{PumpStats, pump_source};
