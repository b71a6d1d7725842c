//! Caller-facing command surface.
//!
//! One JSON object per command, tagged by `op`:
//!
//! ```json
//! {"op":"acquire","item":"widget","quantity":10,"cost_price":"2.00","sale_price":"5.00"}
//! {"op":"dispose","item":"widget","quantity":4}
//! {"op":"adjust_batch","adjustments":{"widget":{"quantity_adjust":-2}}}
//! {"op":"get_report","report":"pnl"}
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::ItemKey;
use stockledger_inventory::{
    AdjustmentBatch, AdjustmentFailure, AppliedAdjustment, InventoryReport, PnlReport, Transaction,
};

use crate::engine::{EngineError, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Acquire {
        item: ItemKey,
        quantity: i64,
        cost_price: Decimal,
        /// Zero (or absent) means "not supplied".
        #[serde(default)]
        sale_price: Decimal,
    },
    Dispose {
        item: ItemKey,
        quantity: i64,
    },
    AdjustBatch {
        adjustments: AdjustmentBatch,
    },
    GetReport {
        report: ReportKind,
        /// Only used by the transactions report.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item: Option<ItemKey>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Pnl,
    Inventory,
    Transactions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Recorded {
        transaction: Transaction,
    },
    Adjusted {
        applied: Vec<AppliedAdjustment>,
        failures: Vec<ItemFailure>,
    },
    Pnl(PnlReport),
    Inventory {
        items: InventoryReport,
        total_units: u64,
        total_value: Decimal,
    },
    Transactions {
        transactions: Vec<Transaction>,
    },
}

/// Serializable view of an engine error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&EngineError> for ErrorReport {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item: ItemKey,
    pub error: ErrorReport,
}

impl From<&AdjustmentFailure<EngineError>> for ItemFailure {
    fn from(failure: &AdjustmentFailure<EngineError>) -> Self {
        Self {
            item: failure.item.clone(),
            error: ErrorReport::from(&failure.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;
    use stockledger_core::DomainError;

    #[test]
    fn parses_tagged_commands() {
        let cmd: Command = serde_json::from_str(
            r#"{"op":"acquire","item":"widget","quantity":10,"cost_price":"2.50"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::Acquire {
                item: ItemKey::new("widget").unwrap(),
                quantity: 10,
                cost_price: Decimal::from_str("2.50").unwrap(),
                sale_price: Decimal::ZERO,
            }
        );

        let cmd: Command = serde_json::from_str(
            r#"{"op":"adjust_batch","adjustments":{"bolt":{"quantity_adjust":-3,"cost_adjust":"1.5"}}}"#,
        )
        .unwrap();
        match cmd {
            Command::AdjustBatch { adjustments } => {
                let adj = &adjustments[&ItemKey::new("bolt").unwrap()];
                assert_eq!(adj.quantity_adjust, -3);
                assert_eq!(adj.cost_adjust, Some(Decimal::from_str("1.5").unwrap()));
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cmd: Command =
            serde_json::from_str(r#"{"op":"get_report","report":"transactions","item":"bolt"}"#)
                .unwrap();
        assert_eq!(
            cmd,
            Command::GetReport {
                report: ReportKind::Transactions,
                item: Some(ItemKey::new("bolt").unwrap()),
            }
        );
    }

    #[test]
    fn rejects_blank_item_keys() {
        let res: Result<Command, _> =
            serde_json::from_str(r#"{"op":"dispose","item":"   ","quantity":1}"#);
        assert!(res.is_err());
    }

    #[test]
    fn error_report_carries_kind() {
        let err = EngineError::from(DomainError::InsufficientStock {
            item: ItemKey::new("widget").unwrap(),
            requested: 5,
            available: 2,
        });
        let json = serde_json::to_value(ErrorReport::from(&err)).unwrap();
        assert_eq!(json["kind"], "insufficient_stock");
        assert!(json["message"].as_str().unwrap().contains("widget"));
    }
}
