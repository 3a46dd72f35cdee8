use std::fs;
use std::path::Path;

use chrono::Utc;
use clap::Parser;
use log::{info, warn};

use market_feed::aggregate::SegmentAggregator;
use market_feed::cli::Cli;
use market_feed::config::Config;
use market_feed::error::Context;
use market_feed::fetch::MarketDataClient;
use market_feed::output::{self, MarketData};
use market_feed::{clock, universe, AppError, Result};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = Config::builtin();
    config.strategy = cli.strategy.into();
    config.worker_pool = cli.concurrency;
    config.chunk_size = cli.chunk_size;

    let requested = if cli.segments.is_empty() {
        config.segment_codes()
    } else {
        cli.segments.clone()
    };

    let client = MarketDataClient::new()?;

    // One reference instant for the whole run; the per-segment session flag
    // and the ATH day arithmetic both derive from it.
    let now_utc = Utc::now();
    let now = now_utc.naive_utc();

    let mut market_data = MarketData::new();

    for code in &requested {
        let Some(segment) = config.segment(code).cloned() else {
            warn!("unknown segment {code}; skipping");
            continue;
        };

        let market_open = clock::is_regular_session(now_utc, segment.timezone);
        info!(
            "{}: regular session {}",
            segment.code,
            if market_open { "open" } else { "closed" }
        );

        let universe = match universe::load_universe(client.http(), &segment).await {
            Ok(refs) => refs,
            Err(err) => {
                warn!("{}: universe unavailable ({err})", segment.code);
                continue;
            }
        };

        let aggregator = SegmentAggregator::new(&client, &config, market_open, now);
        match aggregator.run(&segment, universe).await {
            Ok(records) => {
                if cli.summary > 0 && !records.is_empty() {
                    println!("{}: top {} by proximity to ATH", segment.name, cli.summary);
                    print!("{}", output::render_summary_table(&records, cli.summary));
                }

                if let Some(dir) = &cli.csv_dir {
                    fs::create_dir_all(dir)
                        .with_context(|| format!("failed to create CSV directory {dir}"))?;
                    let path = Path::new(dir).join(format!("{}.csv", segment.code.to_lowercase()));
                    output::write_segment_csv(&path, &records)?;
                }

                market_data.insert(segment.code.clone(), records);
            }
            Err(err) => {
                warn!("{}: segment failed ({err})", segment.code);
            }
        }
    }

    if market_data.is_empty() {
        return Err(AppError::message("every requested segment failed"));
    }

    output::write_js_asset(Path::new(&cli.out), &cli.var_name, &market_data)?;
    info!("wrote {} with {} segment(s)", cli.out, market_data.len());

    Ok(())
}
