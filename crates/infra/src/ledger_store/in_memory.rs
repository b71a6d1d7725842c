use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

use stockledger_core::{ExpectedVersion, ItemKey};
use stockledger_inventory::{ItemRecord, Transaction};

use super::r#trait::{check_append, LedgerStore, StoreError};

#[derive(Debug, Default)]
struct State {
    items: BTreeMap<ItemKey, ItemRecord>,
    transactions: Vec<Transaction>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Write failures can be injected to exercise the
/// engine's recovery paths.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<State>,
    failing_transaction_writes: AtomicU32,
    failing_item_writes: AtomicU32,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `persist_transaction` fail.
    pub fn fail_next_transaction_writes(&self, n: u32) {
        self.failing_transaction_writes.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` calls to `persist_item` fail.
    pub fn fail_next_item_writes(&self, n: u32) {
        self.failing_item_writes.store(n, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn load_items(&self) -> Result<BTreeMap<ItemKey, ItemRecord>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(state.items.clone())
    }

    fn load_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(state.transactions.clone())
    }

    fn persist_transaction(
        &self,
        tx: &Transaction,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        if Self::take_failure(&self.failing_transaction_writes) {
            return Err(StoreError::Unavailable("injected transaction write failure".to_string()));
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let current = state.transactions.last().map(|t| t.sequence).unwrap_or(0);
        check_append(current, tx, expected)?;
        state.transactions.push(tx.clone());
        Ok(())
    }

    fn persist_item(&self, item: &ItemRecord) -> Result<(), StoreError> {
        if Self::take_failure(&self.failing_item_writes) {
            return Err(StoreError::Unavailable("injected item write failure".to_string()));
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        state.items.insert(item.item.clone(), item.clone());
        Ok(())
    }
}
