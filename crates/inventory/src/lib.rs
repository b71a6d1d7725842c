//! Inventory ledger domain module (event-sourced).
//!
//! Stock levels, weighted-average cost, the append-only transaction log and
//! the P&L derived from it. Pure, deterministic domain logic: no IO, no
//! storage, no clocks beyond the convenience entry points.

pub mod adjustment;
pub mod command;
pub mod event;
pub mod item;
pub mod ledger;
pub mod policy;
pub mod report;
pub mod transaction;

pub use adjustment::{
    AdjustmentBatch, AdjustmentFailure, AdjustmentReport, AppliedAdjustment, StockAdjustment,
};
pub use command::{AcquireStock, AdjustStock, DisposeStock, LedgerCommand};
pub use event::{AcquisitionSource, ItemAcquired, ItemAdjusted, ItemDisposed, LedgerEvent};
pub use item::{weighted_average_cost, ItemRecord};
pub use ledger::InventoryLedger;
pub use policy::{LedgerPolicy, SalePricePolicy, UnderflowPolicy};
pub use report::{InventoryReport, ItemSnapshot, PnlReport, RunningTotals};
pub use transaction::{ReplayError, SequenceError, Transaction, TransactionKind, TransactionLog};
