//! Ledger policies for behaviour the business rules leave open.

use serde::{Deserialize, Serialize};

/// What happens to an item's sale price when more stock is acquired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalePricePolicy {
    /// The price set when the item was created stays in force.
    #[default]
    KeepExisting,
    /// A non-zero sale price supplied with an acquisition replaces the current one.
    LatestNonZero,
}

/// What happens when an adjustment would take stock below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderflowPolicy {
    /// Stop at zero and report the dropped units.
    #[default]
    Clamp,
    /// Fail the adjustment.
    Reject,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPolicy {
    pub sale_price: SalePricePolicy,
    pub underflow: UnderflowPolicy,
}
