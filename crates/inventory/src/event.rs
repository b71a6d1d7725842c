use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{Event, ItemKey};

/// How stock entered the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionSource {
    Purchase,
    /// Item created by an external adjustment naming an unseen item.
    Adjustment,
}

/// Event: ItemAcquired.
///
/// `cost_price` and `sale_price` are the item's values *after* the
/// acquisition; `unit_cost` is the price paid for this lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAcquired {
    pub item: ItemKey,
    pub quantity: u64,
    pub unit_cost: Decimal,
    /// `unit_cost * quantity`: the lot's historical cost basis.
    pub amount: Decimal,
    pub cost_price: Decimal,
    pub sale_price: Decimal,
    pub source: AcquisitionSource,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemDisposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDisposed {
    pub item: ItemKey,
    pub quantity: u64,
    /// Average cost at disposal time.
    pub unit_cost: Decimal,
    /// Sale price at disposal time.
    pub unit_price: Decimal,
    /// Revenue: `unit_price * quantity`.
    pub amount: Decimal,
    /// `unit_cost * quantity`.
    pub cost_of_goods: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemAdjusted (out-of-band correction to an existing item).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAdjusted {
    pub item: ItemKey,
    pub requested_quantity_delta: i64,
    /// Differs from the requested delta only when the adjustment was clamped at zero.
    pub applied_quantity_delta: i64,
    pub cost_delta: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

impl ItemAdjusted {
    /// Units requested below zero and dropped by clamping.
    pub fn underflow(&self) -> Option<u64> {
        let dropped = self.applied_quantity_delta.abs_diff(self.requested_quantity_delta);
        (dropped > 0).then_some(dropped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    ItemAcquired(ItemAcquired),
    ItemDisposed(ItemDisposed),
    ItemAdjusted(ItemAdjusted),
}

impl LedgerEvent {
    pub fn item(&self) -> &ItemKey {
        match self {
            LedgerEvent::ItemAcquired(e) => &e.item,
            LedgerEvent::ItemDisposed(e) => &e.item,
            LedgerEvent::ItemAdjusted(e) => &e.item,
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::ItemAcquired(_) => "ledger.item.acquired",
            LedgerEvent::ItemDisposed(_) => "ledger.item.disposed",
            LedgerEvent::ItemAdjusted(_) => "ledger.item.adjusted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::ItemAcquired(e) => e.occurred_at,
            LedgerEvent::ItemDisposed(e) => e.occurred_at,
            LedgerEvent::ItemAdjusted(e) => e.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_and_time_follow_the_variant() {
        let at = Utc::now();
        let event = LedgerEvent::ItemAdjusted(ItemAdjusted {
            item: ItemKey::new("widget").unwrap(),
            requested_quantity_delta: -5,
            applied_quantity_delta: -3,
            cost_delta: None,
            occurred_at: at,
        });
        assert_eq!(event.event_type(), "ledger.item.adjusted");
        assert_eq!(event.occurred_at(), at);
        assert_eq!(event.item().as_str(), "widget");

        if let LedgerEvent::ItemAdjusted(adjusted) = &event {
            assert_eq!(adjusted.underflow(), Some(2));
        }
    }
}
