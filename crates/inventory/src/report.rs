//! P&L aggregation and inventory snapshots.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::ItemKey;

use crate::event::LedgerEvent;
use crate::item::ItemRecord;
use crate::transaction::Transaction;

/// Revenue and COGS accumulated over disposals.
///
/// This is a cache of the transaction log: folding the log from empty state
/// must always reproduce it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningTotals {
    pub total_revenue: Decimal,
    pub total_cogs: Decimal,
}

impl RunningTotals {
    pub fn record(&mut self, event: &LedgerEvent) {
        if let LedgerEvent::ItemDisposed(e) = event {
            self.total_revenue += e.amount;
            self.total_cogs += e.cost_of_goods;
        }
    }

    /// Whether adding a disposal would overflow the totals.
    pub fn can_record(&self, revenue: Decimal, cogs: Decimal) -> bool {
        self.total_revenue.checked_add(revenue).is_some()
            && self.total_cogs.checked_add(cogs).is_some()
    }

    pub fn fold<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Self {
        let mut totals = Self::default();
        for tx in transactions {
            totals.record(&tx.event);
        }
        totals
    }
}

/// Profit and loss statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnlReport {
    pub total_revenue: Decimal,
    pub total_cogs: Decimal,
    pub gross_profit: Decimal,
    /// Equal to gross profit: no operating expenses are modelled.
    pub net_profit: Decimal,
    pub is_profit: bool,
}

impl PnlReport {
    pub fn from_totals(totals: &RunningTotals) -> Self {
        let gross_profit = totals.total_revenue - totals.total_cogs;
        let net_profit = gross_profit;
        Self {
            total_revenue: totals.total_revenue,
            total_cogs: totals.total_cogs,
            gross_profit,
            net_profit,
            is_profit: net_profit > Decimal::ZERO,
        }
    }

    /// Recompute the report from scratch by folding a transaction log.
    pub fn from_transactions<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Self {
        Self::from_totals(&RunningTotals::fold(transactions))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub quantity: u64,
    pub cost_price: Decimal,
    pub sale_price: Decimal,
}

impl From<&ItemRecord> for ItemSnapshot {
    fn from(record: &ItemRecord) -> Self {
        Self {
            quantity: record.quantity,
            cost_price: record.cost_price,
            sale_price: record.sale_price,
        }
    }
}

/// Point-in-time copy of every item record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryReport {
    items: BTreeMap<ItemKey, ItemSnapshot>,
}

impl InventoryReport {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ItemRecord>) -> Self {
        Self {
            items: records
                .into_iter()
                .map(|r| (r.item.clone(), ItemSnapshot::from(r)))
                .collect(),
        }
    }

    pub fn get(&self, item: &ItemKey) -> Option<&ItemSnapshot> {
        self.items.get(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemKey, &ItemSnapshot)> {
        self.items.iter()
    }

    pub fn total_units(&self) -> u64 {
        self.items
            .values()
            .fold(0u64, |acc, s| acc.saturating_add(s.quantity))
    }

    /// Stock valuation at average cost.
    pub fn total_value(&self) -> Decimal {
        self.items.values().fold(Decimal::ZERO, |acc, s| {
            acc.saturating_add(s.cost_price.saturating_mul(Decimal::from(s.quantity)))
        })
    }

    pub fn into_inner(self) -> BTreeMap<ItemKey, ItemSnapshot> {
        self.items
    }
}
