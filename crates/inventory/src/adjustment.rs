//! External (digital twin) stock corrections.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, ItemKey};

use crate::transaction::Transaction;

/// One out-of-band correction for an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    #[serde(default)]
    pub quantity_adjust: i64,
    #[serde(default)]
    pub cost_adjust: Option<Decimal>,
}

impl StockAdjustment {
    pub fn quantity(quantity_adjust: i64) -> Self {
        Self {
            quantity_adjust,
            cost_adjust: None,
        }
    }

    pub fn with_cost(mut self, cost_adjust: Decimal) -> Self {
        self.cost_adjust = Some(cost_adjust);
        self
    }

    pub fn is_noop(&self) -> bool {
        self.quantity_adjust == 0 && self.cost_adjust.is_none_or(|c| c.is_zero())
    }
}

/// Batch of corrections keyed by item. Processed in key order.
pub type AdjustmentBatch = BTreeMap<ItemKey, StockAdjustment>;

/// An adjustment that was journaled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedAdjustment {
    pub item: ItemKey,
    pub transaction: Transaction,
    /// Units dropped because the correction would have taken stock below zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underflow: Option<u64>,
}

/// An adjustment that was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentFailure<E = DomainError> {
    pub item: ItemKey,
    pub error: E,
}

/// Per-item outcome of a batch. Failures never roll back applied entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentReport<E = DomainError> {
    pub applied: Vec<AppliedAdjustment>,
    pub failures: Vec<AdjustmentFailure<E>>,
}

impl<E> Default for AdjustmentReport<E> {
    fn default() -> Self {
        Self {
            applied: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<E> AdjustmentReport<E> {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Applied entries that hit the zero floor.
    pub fn underflows(&self) -> impl Iterator<Item = &AppliedAdjustment> {
        self.applied.iter().filter(|a| a.underflow.is_some())
    }
}
