//! Command-line front end: configuration and the JSON-lines session loop.

pub mod config;
pub mod session;

pub use config::Cli;
pub use session::{run_session, Response, SessionSummary};
