//! Infrastructure layer: ledger storage, the engine that drives the domain
//! ledger against it, and the caller-facing command surface.

pub mod command;
pub mod engine;
pub mod ledger_store;


pub use command::{Command, ErrorReport, ItemFailure, Outcome, ReportKind};
pub use engine::{EngineError, ErrorKind, LedgerEngine};
pub use ledger_store::{InMemoryLedgerStore, JsonlLedgerStore, LedgerStore, StoreError};
