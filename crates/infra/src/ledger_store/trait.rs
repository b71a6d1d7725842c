use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use stockledger_core::{ExpectedVersion, ItemKey};
use stockledger_inventory::{ItemRecord, Transaction};

/// Ledger store operation error.
///
/// These are **infrastructure errors** (availability, ordering, corruption)
/// as opposed to domain errors (validation, stock invariants).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store's last sequence did not match the expected version.
    #[error("append conflict: {0}")]
    Conflict(String),

    /// Persisted data cannot be read back into a valid log.
    #[error("corrupt store: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable storage for item snapshots and the append-only transaction log.
///
/// ## Contract
///
/// - `load_transactions()` returns the log in append order.
/// - `persist_transaction()` appends exactly one transaction, only when the
///   store's last sequence matches `expected`; the append is atomic.
/// - `persist_item()` replaces the stored snapshot of one item. Snapshots are
///   a cache of the log: the engine repairs them from the log on startup.
pub trait LedgerStore: Send + Sync {
    fn load_items(&self) -> Result<BTreeMap<ItemKey, ItemRecord>, StoreError>;

    fn load_transactions(&self) -> Result<Vec<Transaction>, StoreError>;

    fn persist_transaction(
        &self,
        tx: &Transaction,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    fn persist_item(&self, item: &ItemRecord) -> Result<(), StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn load_items(&self) -> Result<BTreeMap<ItemKey, ItemRecord>, StoreError> {
        (**self).load_items()
    }

    fn load_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        (**self).load_transactions()
    }

    fn persist_transaction(
        &self,
        tx: &Transaction,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).persist_transaction(tx, expected)
    }

    fn persist_item(&self, item: &ItemRecord) -> Result<(), StoreError> {
        (**self).persist_item(item)
    }
}

/// Check that `tx` may follow a stream whose last sequence is `current`.
pub(crate) fn check_append(
    current: u64,
    tx: &Transaction,
    expected: ExpectedVersion,
) -> Result<(), StoreError> {
    if !expected.matches(current) {
        return Err(StoreError::Conflict(format!(
            "expected {expected:?}, found {current}"
        )));
    }
    if tx.sequence != current + 1 {
        return Err(StoreError::Conflict(format!(
            "transaction sequence {} does not follow {current}",
            tx.sequence
        )));
    }
    Ok(())
}
