use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::ItemKey;

use crate::adjustment::StockAdjustment;
use crate::event::AcquisitionSource;

/// Command: AcquireStock.
///
/// Quantities are signed so that non-positive input reaches validation and is
/// reported as invalid instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireStock {
    pub item: ItemKey,
    pub quantity: i64,
    pub unit_cost: Decimal,
    pub sale_price: Decimal,
    pub source: AcquisitionSource,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DisposeStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisposeStock {
    pub item: ItemKey,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock (one entry of an external correction batch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub item: ItemKey,
    pub adjustment: StockAdjustment,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    AcquireStock(AcquireStock),
    DisposeStock(DisposeStock),
    AdjustStock(AdjustStock),
}

impl LedgerCommand {
    pub fn item(&self) -> &ItemKey {
        match self {
            LedgerCommand::AcquireStock(c) => &c.item,
            LedgerCommand::DisposeStock(c) => &c.item,
            LedgerCommand::AdjustStock(c) => &c.item,
        }
    }
}
