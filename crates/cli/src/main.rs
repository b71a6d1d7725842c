use std::fs::File;
use std::io::{self, BufRead, BufReader};

use anyhow::Context;
use clap::Parser;

use stockledger_cli::{run_session, Cli};
use stockledger_infra::{InMemoryLedgerStore, JsonlLedgerStore, LedgerEngine, LedgerStore};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    stockledger_observability::init_with(&cli.log_config());

    match &cli.data_dir {
        Some(dir) => {
            let store = JsonlLedgerStore::open(dir)
                .with_context(|| format!("opening ledger store in {}", dir.display()))?;
            serve(store, &cli)
        }
        None => {
            tracing::warn!("no data directory configured; ledger is kept in memory only");
            serve(InMemoryLedgerStore::new(), &cli)
        }
    }
}

fn serve<S: LedgerStore>(store: S, cli: &Cli) -> anyhow::Result<()> {
    let engine = LedgerEngine::open(store, cli.policy()).context("opening ledger engine")?;

    let input: Box<dyn BufRead> = match &cli.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let summary = run_session(&engine, input, io::stdout().lock())?;
    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        "session finished"
    );

    engine.shutdown().context("shutting down ledger engine")?;
    Ok(())
}
