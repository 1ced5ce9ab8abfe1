//! Metrics and Monitoring Adapters
//!
//! Telemetry sinks (Prometheus on :9090, structured log lines, fan-out)
//! and health check endpoints (/live, /ready) via axum 0.7.

pub mod health;
pub mod prometheus;
pub mod sinks;

pub use health::{HealthServer, HealthState};
pub use prometheus::PrometheusSink;
pub use sinks::{FanoutSink, TracingSink};
