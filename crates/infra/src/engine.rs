//! Ledger engine (application-level orchestration).
//!
//! The engine owns one [`InventoryLedger`] and the injected [`LedgerStore`]
//! and runs every operation inside a single critical section.
//!
//! ## Commit protocol
//!
//! ```text
//! Command
//!   ↓
//! 1. Decide (pure domain validation, produces an event; nothing mutated)
//!   ↓
//! 2. Append the transaction to the store (expected-version check) ← commit point
//!   ↓
//! 3. Apply the event to the in-memory ledger
//!   ↓
//! 4. Write the touched item snapshot
//! ```
//!
//! A failure in step 2 leaves both the store and memory untouched and is
//! surfaced as a persistence failure. A failure in step 4 happens after the
//! commit point: memory stays authoritative, the item is kept as a pending
//! snapshot and re-written on the next flush. Snapshots are a cache of the
//! log, so recovery on `open` repairs any snapshot that fell behind.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use stockledger_core::{AggregateRoot, DomainError, Event, ExpectedVersion, ItemKey};
use stockledger_inventory::{
    AcquireStock, AcquisitionSource, AdjustmentBatch, AdjustmentReport, DisposeStock,
    InventoryLedger, InventoryReport, LedgerCommand, LedgerPolicy, PnlReport, Transaction,
};

use crate::command::{Command, ItemFailure, Outcome, ReportKind};
use crate::ledger_store::{LedgerStore, StoreError};

/// Coarse error classification for callers mapping failures onto a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    UnknownItem,
    InsufficientStock,
    Underflow,
    PersistenceFailure,
    Internal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The command was rejected by domain validation; nothing changed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The ledger store failed.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("ledger state lock poisoned")]
    LockPoisoned,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Domain(DomainError::InvalidInput(_)) => ErrorKind::InvalidInput,
            EngineError::Domain(DomainError::UnknownItem(_)) => ErrorKind::UnknownItem,
            EngineError::Domain(DomainError::InsufficientStock { .. }) => {
                ErrorKind::InsufficientStock
            }
            EngineError::Domain(DomainError::Underflow { .. }) => ErrorKind::Underflow,
            EngineError::Persistence(_) => ErrorKind::PersistenceFailure,
            EngineError::LockPoisoned => ErrorKind::Internal,
        }
    }
}

#[derive(Debug)]
struct EngineState {
    ledger: InventoryLedger,
    /// Items whose snapshot write has not succeeded yet.
    pending_snapshots: BTreeSet<ItemKey>,
}

/// Single-writer inventory ledger engine.
///
/// ## Concurrency
///
/// All state sits behind one mutex. Mutations (stock check + append + apply)
/// and snapshot reads (`pnl_report`, `inventory_report`) never interleave.
/// The engine never retries internally; failed commands may be retried by
/// the caller.
#[derive(Debug)]
pub struct LedgerEngine<S> {
    store: S,
    state: Mutex<EngineState>,
}

impl<S> LedgerEngine<S>
where
    S: LedgerStore,
{
    /// Load the store, replay its log and repair stale item snapshots.
    #[instrument(skip_all, err)]
    pub fn open(store: S, policy: LedgerPolicy) -> Result<Self, EngineError> {
        let history = store.load_transactions()?;
        let transaction_count = history.len();
        let ledger = InventoryLedger::replay(policy, history)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let snapshots = store.load_items()?;
        let mut pending_snapshots = BTreeSet::new();
        for record in ledger.items() {
            match snapshots.get(&record.item) {
                Some(snapshot) if snapshot == record => {}
                Some(_) => {
                    warn!(item = %record.item, "item snapshot disagrees with transaction log; repairing");
                    pending_snapshots.insert(record.item.clone());
                }
                None => {
                    warn!(item = %record.item, "item snapshot missing; repairing");
                    pending_snapshots.insert(record.item.clone());
                }
            }
        }
        for item in snapshots.keys().filter(|k| ledger.item(k).is_none()) {
            warn!(item = %item, "item snapshot has no transactions; ignoring");
        }

        let engine = Self {
            store,
            state: Mutex::new(EngineState {
                ledger,
                pending_snapshots,
            }),
        };

        {
            let mut state = engine.lock()?;
            engine.flush_pending(&mut state);
            info!(
                transactions = transaction_count,
                items = state.ledger.items().count(),
                pending_snapshots = state.pending_snapshots.len(),
                "ledger engine opened"
            );
        }

        Ok(engine)
    }

    #[instrument(skip(self, cost_price, sale_price), fields(item = %item))]
    pub fn acquire(
        &self,
        item: &ItemKey,
        quantity: i64,
        cost_price: Decimal,
        sale_price: Decimal,
    ) -> Result<Transaction, EngineError> {
        let command = LedgerCommand::AcquireStock(AcquireStock {
            item: item.clone(),
            quantity,
            unit_cost: cost_price,
            sale_price,
            source: AcquisitionSource::Purchase,
            occurred_at: Utc::now(),
        });
        let mut state = self.lock()?;
        self.commit(&mut state, &command)
    }

    #[instrument(skip(self), fields(item = %item))]
    pub fn dispose(&self, item: &ItemKey, quantity: i64) -> Result<Transaction, EngineError> {
        let command = LedgerCommand::DisposeStock(DisposeStock {
            item: item.clone(),
            quantity,
            occurred_at: Utc::now(),
        });
        let mut state = self.lock()?;
        self.commit(&mut state, &command)
    }

    /// Apply a correction batch item by item; failures are collected per item.
    ///
    /// The outer `Result` only fails when the engine itself is unusable.
    #[instrument(skip_all, fields(entries = batch.len()))]
    pub fn apply_external_adjustments(
        &self,
        batch: &AdjustmentBatch,
    ) -> Result<AdjustmentReport<EngineError>, EngineError> {
        let mut state = self.lock()?;
        let store = &self.store;
        let report = state.ledger.apply_external_adjustments_with(batch, Utc::now(), |tx| {
            store
                .persist_transaction(tx, ExpectedVersion::Exact(tx.sequence - 1))
                .map_err(EngineError::from)
        });

        for applied in &report.applied {
            if let Some(units) = applied.underflow {
                warn!(item = %applied.item, units, "adjustment clamped at zero stock");
            }
            state.pending_snapshots.insert(applied.item.clone());
        }
        for failure in &report.failures {
            warn!(item = %failure.item, error = %failure.error, "adjustment rejected");
        }
        self.flush_pending(&mut state);

        info!(
            applied = report.applied.len(),
            failed = report.failures.len(),
            version = state.ledger.version(),
            "adjustment batch processed"
        );
        Ok(report)
    }

    pub fn pnl_report(&self) -> Result<PnlReport, EngineError> {
        Ok(self.lock()?.ledger.pnl_report())
    }

    pub fn inventory_report(&self) -> Result<InventoryReport, EngineError> {
        Ok(self.lock()?.ledger.inventory_report())
    }

    /// Audit trail, optionally restricted to one item.
    pub fn transactions(&self, item: Option<&ItemKey>) -> Result<Vec<Transaction>, EngineError> {
        let state = self.lock()?;
        let log = state.ledger.transactions();
        Ok(match item {
            Some(item) => log.for_item(item).cloned().collect(),
            None => log.iter().cloned().collect(),
        })
    }

    /// Number of item snapshots still waiting to be written.
    pub fn pending_snapshots(&self) -> Result<usize, EngineError> {
        Ok(self.lock()?.pending_snapshots.len())
    }

    /// Retry pending snapshot writes; fails if any is still pending.
    pub fn flush_snapshots(&self) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        self.flush_pending(&mut state);
        match state.pending_snapshots.len() {
            0 => Ok(()),
            n => Err(StoreError::Unavailable(format!("{n} item snapshot(s) still pending")).into()),
        }
    }

    /// Execute one command from the caller-facing command surface.
    pub fn execute(&self, command: Command) -> Result<Outcome, EngineError> {
        match command {
            Command::Acquire {
                item,
                quantity,
                cost_price,
                sale_price,
            } => self
                .acquire(&item, quantity, cost_price, sale_price)
                .map(|transaction| Outcome::Recorded { transaction }),
            Command::Dispose { item, quantity } => self
                .dispose(&item, quantity)
                .map(|transaction| Outcome::Recorded { transaction }),
            Command::AdjustBatch { adjustments } => {
                let report = self.apply_external_adjustments(&adjustments)?;
                Ok(Outcome::Adjusted {
                    applied: report.applied,
                    failures: report.failures.iter().map(ItemFailure::from).collect(),
                })
            }
            Command::GetReport { report, item } => match report {
                ReportKind::Pnl => self.pnl_report().map(Outcome::Pnl),
                ReportKind::Inventory => {
                    let items = self.inventory_report()?;
                    Ok(Outcome::Inventory {
                        total_units: items.total_units(),
                        total_value: items.total_value(),
                        items,
                    })
                }
                ReportKind::Transactions => Ok(Outcome::Transactions {
                    transactions: self.transactions(item.as_ref())?,
                }),
            },
        }
    }

    /// Flush pending snapshots and hand the store back.
    #[instrument(skip_all, err)]
    pub fn shutdown(self) -> Result<S, EngineError> {
        self.flush_snapshots()?;
        info!("ledger engine shut down");
        Ok(self.store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineState>, EngineError> {
        self.state.lock().map_err(|_| EngineError::LockPoisoned)
    }

    fn commit(
        &self,
        state: &mut EngineState,
        command: &LedgerCommand,
    ) -> Result<Transaction, EngineError> {
        let store = &self.store;
        let result = state.ledger.execute_with(command, |tx| {
            store
                .persist_transaction(tx, ExpectedVersion::Exact(tx.sequence - 1))
                .map_err(EngineError::from)
        });

        let tx = match result {
            Ok(tx) => tx,
            Err(err) => {
                match &err {
                    EngineError::Domain(e) => warn!(item = %command.item(), error = %e, "command rejected"),
                    other => error!(item = %command.item(), error = %other, "transaction append failed"),
                }
                return Err(err);
            }
        };

        info!(
            sequence = tx.sequence,
            item = %tx.item(),
            event = tx.event.event_type(),
            quantity = tx.quantity(),
            amount = %tx.amount(),
            "transaction committed"
        );
        state.pending_snapshots.insert(tx.item().clone());
        self.flush_pending(state);
        Ok(tx)
    }

    /// Write pending snapshots; keeps the ones that fail for a later flush.
    fn flush_pending(&self, state: &mut EngineState) {
        let pending: Vec<ItemKey> = state.pending_snapshots.iter().cloned().collect();
        for item in pending {
            let Some(record) = state.ledger.item(&item) else {
                state.pending_snapshots.remove(&item);
                continue;
            };
            match self.store.persist_item(record) {
                Ok(()) => {
                    state.pending_snapshots.remove(&item);
                }
                Err(e) => {
                    error!(item = %item, error = %e, "item snapshot write failed; will retry");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger_store::InMemoryLedgerStore;
    use core::str::FromStr;
    use std::sync::Arc;
    use stockledger_inventory::{ItemDisposed, LedgerEvent, StockAdjustment};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn key(name: &str) -> ItemKey {
        ItemKey::new(name).unwrap()
    }

    fn engine() -> (LedgerEngine<Arc<InMemoryLedgerStore>>, Arc<InMemoryLedgerStore>) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let engine = LedgerEngine::open(store.clone(), LedgerPolicy::default()).unwrap();
        (engine, store)
    }

    #[test]
    fn commits_are_persisted_with_snapshots() {
        let (engine, store) = engine();
        let widget = key("widget");
        engine.acquire(&widget, 10, dec("2.00"), dec("5.00")).unwrap();
        engine.dispose(&widget, 4).unwrap();

        let log = store.load_transactions().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].sequence, 1);
        assert_eq!(log[1].sequence, 2);

        let items = store.load_items().unwrap();
        assert_eq!(items[&widget].quantity, 6);
        assert_eq!(engine.pending_snapshots().unwrap(), 0);
    }

    #[test]
    fn rejected_command_touches_nothing() {
        let (engine, store) = engine();
        let err = engine.dispose(&key("ghost"), 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownItem);
        assert!(store.load_transactions().unwrap().is_empty());
        assert!(engine.inventory_report().unwrap().is_empty());
    }

    #[test]
    fn failed_append_rolls_nothing_forward() {
        let (engine, store) = engine();
        let widget = key("widget");
        engine.acquire(&widget, 10, dec("2"), dec("5")).unwrap();

        store.fail_next_transaction_writes(1);
        let err = engine.dispose(&widget, 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);

        assert_eq!(engine.inventory_report().unwrap().get(&widget).unwrap().quantity, 10);
        assert_eq!(engine.pnl_report().unwrap().total_revenue, Decimal::ZERO);
        assert_eq!(store.load_transactions().unwrap().len(), 1);

        // Caller-driven retry succeeds with the same sequence slot.
        let tx = engine.dispose(&widget, 4).unwrap();
        assert_eq!(tx.sequence, 2);
    }

    #[test]
    fn failed_snapshot_write_is_retried() {
        let (engine, store) = engine();
        let widget = key("widget");
        store.fail_next_item_writes(1);

        engine.acquire(&widget, 3, dec("1"), dec("2")).unwrap();
        assert_eq!(engine.pending_snapshots().unwrap(), 1);
        assert!(store.load_items().unwrap().is_empty());

        engine.flush_snapshots().unwrap();
        assert_eq!(engine.pending_snapshots().unwrap(), 0);
        assert_eq!(store.load_items().unwrap()[&widget].quantity, 3);
    }

    #[test]
    fn batch_failures_are_reported_per_item() {
        let (engine, store) = engine();
        let widget = key("widget");
        engine.acquire(&widget, 5, dec("1"), dec("2")).unwrap();

        let mut batch = AdjustmentBatch::new();
        batch.insert(key("bolt"), StockAdjustment::quantity(3));
        batch.insert(key("ghost"), StockAdjustment::quantity(-1));
        batch.insert(widget.clone(), StockAdjustment::quantity(2));

        // The first adjustment append fails in the store; the rest still go through.
        store.fail_next_transaction_writes(1);
        let report = engine.apply_external_adjustments(&batch).unwrap();

        let failed: Vec<(&str, ErrorKind)> = report
            .failures
            .iter()
            .map(|f| (f.item.as_str(), f.error.kind()))
            .collect();
        assert_eq!(
            failed,
            vec![
                ("bolt", ErrorKind::PersistenceFailure),
                ("ghost", ErrorKind::InvalidInput),
            ]
        );
        assert_eq!(report.applied.len(), 1);
        assert_eq!(store.load_items().unwrap()[&widget].quantity, 7);
        assert_eq!(store.load_transactions().unwrap().len(), 2);
    }

    #[test]
    fn reopen_reproduces_state() {
        let (engine, store) = engine();
        let widget = key("widget");
        engine.acquire(&widget, 10, dec("2.00"), dec("5.00")).unwrap();
        engine.acquire(&widget, 10, dec("4.00"), dec("5.00")).unwrap();
        engine.dispose(&widget, 5).unwrap();
        let inventory = engine.inventory_report().unwrap();
        let pnl = engine.pnl_report().unwrap();
        engine.shutdown().unwrap();

        let reopened = LedgerEngine::open(store, LedgerPolicy::default()).unwrap();
        assert_eq!(reopened.inventory_report().unwrap(), inventory);
        assert_eq!(reopened.pnl_report().unwrap(), pnl);
        assert_eq!(reopened.transactions(None).unwrap().len(), 3);
    }

    #[test]
    fn open_repairs_stale_snapshots() {
        let (engine, store) = engine();
        let widget = key("widget");
        engine.acquire(&widget, 10, dec("2"), dec("5")).unwrap();
        store.fail_next_item_writes(1);
        engine.dispose(&widget, 4).unwrap();
        drop(engine);

        // Snapshot still shows the pre-disposal quantity.
        assert_eq!(store.load_items().unwrap()[&widget].quantity, 10);

        let reopened = LedgerEngine::open(store.clone(), LedgerPolicy::default()).unwrap();
        assert_eq!(reopened.pending_snapshots().unwrap(), 0);
        assert_eq!(store.load_items().unwrap()[&widget].quantity, 6);
    }

    #[test]
    fn open_refuses_log_inconsistent_with_state() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let phantom_sale = Transaction::new(
            1,
            LedgerEvent::ItemDisposed(ItemDisposed {
                item: key("ghost"),
                quantity: 5,
                unit_cost: dec("1"),
                unit_price: dec("2"),
                amount: dec("10"),
                cost_of_goods: dec("5"),
                occurred_at: Utc::now(),
            }),
        );
        store
            .persist_transaction(&phantom_sale, ExpectedVersion::Exact(0))
            .unwrap();

        let err = LedgerEngine::open(store, LedgerPolicy::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
        assert!(
            matches!(err, EngineError::Persistence(StoreError::Corrupt(_))),
            "{err}"
        );
    }

    #[test]
    fn execute_routes_reports() {
        let (engine, _store) = engine();
        engine
            .execute(Command::Acquire {
                item: key("widget"),
                quantity: 10,
                cost_price: dec("2.00"),
                sale_price: dec("5.00"),
            })
            .unwrap();

        let outcome = engine
            .execute(Command::GetReport {
                report: ReportKind::Inventory,
                item: None,
            })
            .unwrap();
        match outcome {
            Outcome::Inventory {
                total_units,
                total_value,
                ..
            } => {
                assert_eq!(total_units, 10);
                assert_eq!(total_value, dec("20.00"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
