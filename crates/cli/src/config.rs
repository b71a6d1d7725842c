//! Process configuration (flags with environment fallbacks).

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use stockledger_inventory::{LedgerPolicy, SalePricePolicy, UnderflowPolicy};
use stockledger_observability::{LogConfig, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "stockledger")]
#[command(about = "Inventory ledger: stock levels, average cost and P&L from a transaction log")]
pub struct Cli {
    /// Directory holding the ledger files (also read from `STOCKLEDGER_DATA_DIR`).
    /// Without it the ledger lives in memory for the duration of the run.
    #[arg(long, env = "STOCKLEDGER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Behaviour when an adjustment would take stock below zero.
    #[arg(long, env = "STOCKLEDGER_UNDERFLOW", value_enum, default_value_t = UnderflowArg::Clamp)]
    pub underflow: UnderflowArg,

    /// Behaviour when an acquisition supplies a new sale price.
    #[arg(long, env = "STOCKLEDGER_SALE_PRICE", value_enum, default_value_t = SalePriceArg::Keep)]
    pub sale_price: SalePriceArg,

    /// Read commands from this file instead of stdin.
    #[arg(long)]
    pub input: Option<PathBuf>,

    #[arg(long, env = "STOCKLEDGER_LOG_FORMAT", value_enum, default_value_t = LogFormatArg::Json)]
    pub log_format: LogFormatArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UnderflowArg {
    Clamp,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SalePriceArg {
    Keep,
    LatestNonZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Json,
    Pretty,
}

impl Cli {
    pub fn policy(&self) -> LedgerPolicy {
        LedgerPolicy {
            sale_price: match self.sale_price {
                SalePriceArg::Keep => SalePricePolicy::KeepExisting,
                SalePriceArg::LatestNonZero => SalePricePolicy::LatestNonZero,
            },
            underflow: match self.underflow {
                UnderflowArg::Clamp => UnderflowPolicy::Clamp,
                UnderflowArg::Reject => UnderflowPolicy::Reject,
            },
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            format: match self.log_format {
                LogFormatArg::Json => LogFormat::Json,
                LogFormatArg::Pretty => LogFormat::Pretty,
            },
            ..LogConfig::default()
        }
    }
}
