//! Polymarket Up/Down Engine - Library Root
//!
//! Decision and execution engine for 5- and 15-minute up/down markets.
//! Re-exports all modules for the binary, integration tests and benchmarks.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod signals;
pub mod strategies;
pub mod usecases;
