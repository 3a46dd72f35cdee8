use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDateTime;
use futures::stream::{self, StreamExt};
use log::{info, warn};

use crate::config::{Config, FetchStrategy, SegmentConfig};
use crate::error::{AppError, Result};
use crate::fetch::{ensure_concurrency_limit, symbols, MarketDataClient, TickerBundle};
use crate::indicators::{enrich, EnrichedRecord};
use crate::universe::TickerRef;

/// Why a ticker fell out of the enriched set. Kept as data rather than a
/// swallowed exception so failure reasons stay inspectable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The provider call failed; one attempt only, no retries.
    Fetch(String),
    /// The provider answered but returned no bars for a required horizon.
    EmptySeries,
    /// Histories existed but no usable current price could be resolved.
    NoUsablePrice,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Fetch(err) => write!(f, "fetch failed: {err}"),
            SkipReason::EmptySeries => write!(f, "empty price history"),
            SkipReason::NoUsablePrice => write!(f, "no usable current price"),
        }
    }
}

/// Outcome of one unit of fetch+derive work.
#[derive(Debug, Clone)]
pub enum TickerOutcome {
    Enriched(EnrichedRecord),
    Skipped { symbol: String, reason: SkipReason },
}

/// Fans fetch+derive work out across a segment's universe and collects the
/// survivors, sorted for publication.
pub struct SegmentAggregator<'a> {
    client: &'a MarketDataClient,
    strategy: FetchStrategy,
    worker_pool: usize,
    chunk_size: usize,
    market_open: bool,
    now: NaiveDateTime,
    pub progress: Arc<AtomicUsize>,
}

impl<'a> SegmentAggregator<'a> {
    pub fn new(
        client: &'a MarketDataClient,
        config: &Config,
        market_open: bool,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            client,
            strategy: config.strategy,
            worker_pool: config.worker_pool,
            chunk_size: config.effective_chunk_size(),
            market_open,
            now,
            progress: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Process one segment's universe. A per-ticker failure never aborts the
    /// segment; an empty universe does.
    pub async fn run(
        &self,
        segment: &SegmentConfig,
        universe: Vec<TickerRef>,
    ) -> Result<Vec<EnrichedRecord>> {
        if universe.is_empty() {
            return Err(AppError::EmptyUniverse(segment.code.clone()));
        }

        self.progress.store(0, Ordering::SeqCst);

        let outcomes = match self.strategy {
            FetchStrategy::PerSymbol => self.run_per_symbol(universe).await,
            FetchStrategy::Batched => self.run_batched(universe).await,
        };

        Ok(finalize(&segment.code, outcomes))
    }

    async fn run_per_symbol(&self, universe: Vec<TickerRef>) -> Vec<TickerOutcome> {
        let client = self.client;
        let market_open = self.market_open;
        let now = self.now;

        collect_outcomes(
            universe,
            self.worker_pool,
            Arc::clone(&self.progress),
            move |ticker| {
                let symbol = symbols::to_provider(&ticker.symbol);
                async move {
                    match client.fetch_symbol(&symbol).await {
                        Ok(bundle) => derive_outcome(&ticker, &symbol, bundle, market_open, now),
                        Err(err) => TickerOutcome::Skipped {
                            symbol,
                            reason: SkipReason::Fetch(err.to_string()),
                        },
                    }
                }
            },
        )
        .await
    }

    async fn run_batched(&self, universe: Vec<TickerRef>) -> Vec<TickerOutcome> {
        let limit = ensure_concurrency_limit(self.worker_pool);
        let client = self.client;
        let market_open = self.market_open;
        let now = self.now;
        let progress = Arc::clone(&self.progress);

        let chunks: Vec<Vec<TickerRef>> = universe
            .chunks(self.chunk_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        let nested: Vec<Vec<TickerOutcome>> = stream::iter(chunks.into_iter())
            .map(|chunk| {
                let progress = Arc::clone(&progress);
                async move {
                    let provider_symbols: Vec<String> = chunk
                        .iter()
                        .map(|ticker| symbols::to_provider(&ticker.symbol))
                        .collect();

                    let mut bundles = client.fetch_chunk(&provider_symbols).await;

                    chunk
                        .iter()
                        .zip(&provider_symbols)
                        .map(|(ticker, symbol)| {
                            progress.fetch_add(1, Ordering::SeqCst);
                            match bundles.remove(symbol) {
                                Some(bundle) => {
                                    derive_outcome(ticker, symbol, bundle, market_open, now)
                                }
                                None => TickerOutcome::Skipped {
                                    symbol: symbol.clone(),
                                    reason: SkipReason::Fetch(
                                        "absent from batch response".to_string(),
                                    ),
                                },
                            }
                        })
                        .collect::<Vec<_>>()
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        nested.into_iter().flatten().collect()
    }
}

/// Fan the work list out while honouring the concurrency guard, one unit of
/// work per ticker. Completion order is irrelevant; order is imposed later by
/// the final sort.
pub async fn collect_outcomes<F, Fut>(
    universe: Vec<TickerRef>,
    limit: usize,
    progress: Arc<AtomicUsize>,
    work: F,
) -> Vec<TickerOutcome>
where
    F: Fn(TickerRef) -> Fut,
    Fut: Future<Output = TickerOutcome>,
{
    let limit = ensure_concurrency_limit(limit);
    let semaphore = Arc::new(tokio::sync::Semaphore::new(limit));
    let work = &work;

    stream::iter(universe.into_iter())
        .map(|ticker| {
            let semaphore = Arc::clone(&semaphore);
            let progress = Arc::clone(&progress);
            async move {
                let _permit = semaphore.acquire().await.unwrap();
                let outcome = work(ticker).await;
                progress.fetch_add(1, Ordering::SeqCst);
                outcome
            }
        })
        .buffer_unordered(limit)
        .collect()
        .await
}

/// Turn one fetched bundle into an outcome.
fn derive_outcome(
    ticker: &TickerRef,
    symbol: &str,
    bundle: TickerBundle,
    market_open: bool,
    now: NaiveDateTime,
) -> TickerOutcome {
    if bundle.long.is_empty() || bundle.short.is_empty() {
        return TickerOutcome::Skipped {
            symbol: symbol.to_string(),
            reason: SkipReason::EmptySeries,
        };
    }

    match enrich(
        ticker,
        symbol,
        &bundle.long,
        &bundle.short,
        &bundle.fundamentals,
        market_open,
        now,
    ) {
        Some(record) => TickerOutcome::Enriched(record),
        None => TickerOutcome::Skipped {
            symbol: symbol.to_string(),
            reason: SkipReason::NoUsablePrice,
        },
    }
}

/// Drop skips, log them, and sort the survivors for publication.
pub fn finalize(segment: &str, outcomes: Vec<TickerOutcome>) -> Vec<EnrichedRecord> {
    let total = outcomes.len();
    let mut records = Vec::with_capacity(total);

    for outcome in outcomes {
        match outcome {
            TickerOutcome::Enriched(record) => records.push(record),
            TickerOutcome::Skipped { symbol, reason } => {
                warn!("{segment}: dropped {symbol} ({reason})");
            }
        }
    }

    sort_for_publication(&mut records);
    info!("{segment}: enriched {}/{} tickers", records.len(), total);
    records
}

/// Single sort over the complete set, by `price_to_ath` descending. Stable,
/// so ties keep collection order.
pub fn sort_for_publication(records: &mut [EnrichedRecord]) {
    records.sort_by(|a, b| {
        b.price_to_ath
            .partial_cmp(&a.price_to_ath)
            .unwrap_or(CmpOrdering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(symbol: &str, price_to_ath: f64) -> EnrichedRecord {
        EnrichedRecord {
            ticker: symbol.to_string(),
            name: symbol.to_string(),
            industry: "Testing".to_string(),
            ath: 100.0,
            lowest_after_ath: 50.0,
            price: price_to_ath * 100.0,
            correction_ratio: 0.5,
            price_to_ath,
            days_since_ath: 10,
            ma_spread_percentile: -1.0,
            eps_q0: 0.0,
            eps_q1: 0.0,
            eps_q2: 0.0,
            eps_q3: 0.0,
            per: 0.0,
            roe: 0.0,
        }
    }

    fn universe(count: usize) -> Vec<TickerRef> {
        (0..count)
            .map(|i| TickerRef {
                symbol: format!("T{i}"),
                display_name: format!("Ticker {i}"),
                sector_or_industry: "Testing".to_string(),
            })
            .collect()
    }

    #[test]
    fn finalize_drops_skips_and_sorts_descending() {
        let outcomes = vec![
            TickerOutcome::Enriched(record("LOW", 0.25)),
            TickerOutcome::Skipped {
                symbol: "BAD".to_string(),
                reason: SkipReason::EmptySeries,
            },
            TickerOutcome::Enriched(record("HIGH", 0.95)),
            TickerOutcome::Enriched(record("MID", 0.60)),
        ];

        let records = finalize("TEST", outcomes);

        let tickers: Vec<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["HIGH", "MID", "LOW"]);
        for pair in records.windows(2) {
            assert!(pair[0].price_to_ath >= pair[1].price_to_ath);
        }
    }

    #[test]
    fn sort_is_stable_on_ties() {
        let mut records = vec![record("A", 0.5), record("B", 0.5), record("C", 0.9)];

        sort_for_publication(&mut records);

        let tickers: Vec<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["C", "A", "B"]);
    }

    #[tokio::test]
    async fn one_failing_ticker_leaves_the_other_nine() {
        let progress = Arc::new(AtomicUsize::new(0));

        let outcomes = collect_outcomes(universe(10), 4, Arc::clone(&progress), |ticker| {
            let fails = ticker.symbol == "T3";
            async move {
                if fails {
                    TickerOutcome::Skipped {
                        symbol: ticker.symbol,
                        reason: SkipReason::Fetch("connection reset".to_string()),
                    }
                } else {
                    TickerOutcome::Enriched(record(&ticker.symbol, 0.5))
                }
            }
        })
        .await;

        assert_eq!(outcomes.len(), 10);
        assert_eq!(progress.load(Ordering::SeqCst), 10);

        let records = finalize("TEST", outcomes);
        assert_eq!(records.len(), 9);
        assert!(records.iter().all(|r| r.ticker != "T3"));
    }

    #[tokio::test]
    async fn completion_order_does_not_change_the_published_order() {
        let progress = Arc::new(AtomicUsize::new(0));

        // Later tickers finish first; the final sort alone imposes order.
        let outcomes = collect_outcomes(universe(6), 6, progress, |ticker| {
            let index: u64 = ticker.symbol[1..].parse().unwrap();
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(20 - index * 3)).await;
                TickerOutcome::Enriched(record(&ticker.symbol, index as f64 / 10.0))
            }
        })
        .await;

        let records = finalize("TEST", outcomes);

        let tickers: Vec<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["T5", "T4", "T3", "T2", "T1", "T0"]);
    }

    #[test]
    fn skip_reasons_render_for_the_log() {
        assert_eq!(
            SkipReason::Fetch("timeout".to_string()).to_string(),
            "fetch failed: timeout"
        );
        assert_eq!(SkipReason::EmptySeries.to_string(), "empty price history");
    }
}
