//! Ledger store boundary.
//!
//! Infrastructure-facing abstraction for persisting item snapshots and the
//! append-only transaction log, plus the in-memory and file-backed backends.

pub mod in_memory;
pub mod jsonl;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use jsonl::JsonlLedgerStore;
pub use r#trait::{LedgerStore, StoreError};
