//! Transaction log: ordered, immutable record of every stock-affecting event.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::{Event, ItemKey, TransactionId};

use crate::event::{AcquisitionSource, LedgerEvent};

/// Coarse classification of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Acquire,
    Dispose,
    Adjust,
}

/// A journaled event with its position in the log.
///
/// `sequence` is the logical timestamp: it starts at 1 and increases by one
/// per appended transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sequence: u64,
    pub transaction_id: TransactionId,
    pub event: LedgerEvent,
}

impl Transaction {
    pub fn new(sequence: u64, event: LedgerEvent) -> Self {
        Self {
            sequence,
            transaction_id: TransactionId::new(),
            event,
        }
    }

    pub fn kind(&self) -> TransactionKind {
        match &self.event {
            LedgerEvent::ItemAcquired(_) => TransactionKind::Acquire,
            LedgerEvent::ItemDisposed(_) => TransactionKind::Dispose,
            LedgerEvent::ItemAdjusted(_) => TransactionKind::Adjust,
        }
    }

    pub fn item(&self) -> &ItemKey {
        self.event.item()
    }

    /// Units moved. For adjustments this is the magnitude of the applied delta.
    pub fn quantity(&self) -> u64 {
        match &self.event {
            LedgerEvent::ItemAcquired(e) => e.quantity,
            LedgerEvent::ItemDisposed(e) => e.quantity,
            LedgerEvent::ItemAdjusted(e) => e.applied_quantity_delta.unsigned_abs(),
        }
    }

    /// Cost for acquisitions, revenue for disposals, zero for adjustments.
    pub fn amount(&self) -> Decimal {
        match &self.event {
            LedgerEvent::ItemAcquired(e) => e.amount,
            LedgerEvent::ItemDisposed(e) => e.amount,
            LedgerEvent::ItemAdjusted(_) => Decimal::ZERO,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.event.occurred_at()
    }

    /// True for every entry produced by the adjustment path, including item
    /// creation through an adjustment.
    pub fn is_adjustment(&self) -> bool {
        match &self.event {
            LedgerEvent::ItemAcquired(e) => e.source == AcquisitionSource::Adjustment,
            LedgerEvent::ItemDisposed(_) => false,
            LedgerEvent::ItemAdjusted(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("out-of-order transaction (expected sequence {expected}, found {found})")]
pub struct SequenceError {
    pub expected: u64,
    pub found: u64,
}

/// A persisted transaction that cannot be folded into the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    /// The event contradicts the state built from the entries before it.
    #[error("transaction {sequence} is inconsistent with ledger state: {reason}")]
    Inconsistent { sequence: u64, reason: String },
}

/// Append-only sequence of transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionLog {
    entries: Vec<Transaction>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_sequence(&self) -> u64 {
        self.entries.last().map(|t| t.sequence).unwrap_or(0)
    }

    pub fn next_sequence(&self) -> u64 {
        self.last_sequence() + 1
    }

    /// Check that `sequence` directly follows the last entry.
    pub fn check_next(&self, sequence: u64) -> Result<(), SequenceError> {
        let expected = self.next_sequence();
        if sequence != expected {
            return Err(SequenceError {
                expected,
                found: sequence,
            });
        }
        Ok(())
    }

    /// Append a transaction built from `next_sequence` by the owning ledger.
    pub(crate) fn push(&mut self, tx: Transaction) {
        debug_assert_eq!(tx.sequence, self.next_sequence());
        self.entries.push(tx);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Transaction] {
        &self.entries
    }

    /// Audit trail of one item, in append order.
    pub fn for_item<'a>(&'a self, item: &'a ItemKey) -> impl Iterator<Item = &'a Transaction> {
        self.entries.iter().filter(move |t| t.item() == item)
    }
}
