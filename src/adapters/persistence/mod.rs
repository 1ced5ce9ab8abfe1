//! Persistence Adapters - JSONL-based File Storage
//!
//! Append-only JSONL trade journal with daily files. No database
//! dependency: lightweight and greppable.

pub mod journal;

pub use journal::JsonlJournal;
