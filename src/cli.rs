use clap::{Parser, ValueEnum};

use crate::config::FetchStrategy;

#[derive(Parser)]
#[command(name = "market-feed")]
#[command(about = "Batch pipeline that enriches index tickers and emits the market data asset")]
#[command(version)]
pub struct Cli {
    /// Segments to process (default: every built-in segment).
    #[arg(short, long, value_delimiter = ',')]
    pub segments: Vec<String>,

    /// Path of the JS asset to write.
    #[arg(short, long, default_value = "market_data.js")]
    pub out: String,

    /// Variable name the consuming page reads.
    #[arg(long, default_value = "marketData")]
    pub var_name: String,

    /// How to talk to the quote provider.
    #[arg(long, value_enum, default_value_t = StrategyArg::PerSymbol)]
    pub strategy: StrategyArg,

    /// Upper bound on simultaneous in-flight requests.
    #[arg(long, default_value_t = crate::config::DEFAULT_WORKER_POOL)]
    pub concurrency: usize,

    /// Symbols per batched quote request.
    #[arg(long, default_value_t = crate::fetch::PROVIDER_BATCH_MAX)]
    pub chunk_size: usize,

    /// Also write one CSV per segment into this directory.
    #[arg(long)]
    pub csv_dir: Option<String>,

    /// Rows per segment in the terminal summary (0 disables it).
    #[arg(long, default_value_t = 10)]
    pub summary: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    PerSymbol,
    Batched,
}

impl From<StrategyArg> for FetchStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::PerSymbol => FetchStrategy::PerSymbol,
            StrategyArg::Batched => FetchStrategy::Batched,
        }
    }
}
