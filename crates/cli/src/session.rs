//! JSON-lines session: one command in, one response out.

use std::io::{BufRead, Write};

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, warn};

use stockledger_infra::{Command, ErrorKind, ErrorReport, LedgerEngine, LedgerStore, Outcome};

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Ok(Outcome),
    Error(ErrorReport),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Run every command in `input` against `engine`, writing one response line each.
///
/// Blank lines and lines starting with `#` are skipped. Command failures are
/// reported in-band; only IO failures end the session early.
pub fn run_session<S, R, W>(
    engine: &LedgerEngine<S>,
    input: R,
    mut output: W,
) -> anyhow::Result<SessionSummary>
where
    S: LedgerStore,
    R: BufRead,
    W: Write,
{
    let mut summary = SessionSummary::default();

    for (idx, line) in input.lines().enumerate() {
        let line = line.context("reading command input")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let response = match serde_json::from_str::<Command>(trimmed) {
            Ok(command) => {
                debug!(line = idx + 1, ?command, "executing command");
                match engine.execute(command) {
                    Ok(outcome) => Response::Ok(outcome),
                    Err(err) => Response::Error(ErrorReport::from(&err)),
                }
            }
            Err(err) => {
                warn!(line = idx + 1, error = %err, "unparseable command");
                Response::Error(ErrorReport {
                    kind: ErrorKind::InvalidInput,
                    message: format!("line {}: {err}", idx + 1),
                })
            }
        };

        match response {
            Response::Ok(_) => summary.succeeded += 1,
            Response::Error(_) => summary.failed += 1,
        }
        serde_json::to_writer(&mut output, &response).context("writing response")?;
        output.write_all(b"\n").context("writing response")?;
    }

    output.flush().context("flushing output")?;
    Ok(summary)
}
