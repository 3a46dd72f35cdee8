use std::collections::HashMap;
use std::time::Duration;

use log::warn;
use reqwest::Client;

use crate::error::Context;
use crate::fetch::chart::{self, Horizon};
use crate::fetch::fundamentals::{self, FundamentalBag};
use crate::fetch::symbols;
use crate::fetch::{FetchResult, PriceSeries, PROVIDER_BATCH_MAX};

const QUOTE_SUMMARY_ENDPOINT: &str = "https://query1.finance.yahoo.com/v10/finance/quoteSummary";
const BATCH_QUOTE_ENDPOINT: &str = "https://query1.finance.yahoo.com/v7/finance/quote";
const SUMMARY_MODULES: &str = "summaryDetail,defaultKeyStatistics,financialData";

const CLIENT_TIMEOUT_SECS: u64 = 10;
const CLIENT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Everything the indicator engine needs for one ticker.
#[derive(Debug, Clone, Default)]
pub struct TickerBundle {
    pub fundamentals: FundamentalBag,
    pub long: PriceSeries,
    pub short: PriceSeries,
}

/// Thin wrapper over the quote provider's HTTP endpoints.
///
/// Exposes the per-symbol and batched fetch shapes; which one the pipeline
/// uses is decided by configuration in the aggregator. A hung upstream call
/// is bounded by the client timeout and surfaces as an error for that symbol
/// only.
pub struct MarketDataClient {
    client: Client,
}

impl MarketDataClient {
    pub fn new() -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(CLIENT_TIMEOUT_SECS))
            .user_agent(CLIENT_USER_AGENT)
            .build()
            .context("failed to construct market data HTTP client")?;

        Ok(Self { client })
    }

    /// Shared HTTP client, reused for listing-page downloads.
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// One symbol, three round trips: fundamentals plus both histories.
    /// The symbol must already be in provider notation.
    pub async fn fetch_symbol(&self, symbol: &str) -> FetchResult<TickerBundle> {
        let fundamentals = match self.fetch_fundamentals(symbol).await {
            Ok(bag) => bag,
            Err(err) => {
                // Fundamentals degrade to the absent bag; only a missing
                // price history disqualifies the ticker.
                warn!("{symbol}: fundamentals unavailable ({err})");
                FundamentalBag::default()
            }
        };

        let long = chart::fetch_series(&self.client, symbol, Horizon::LongWeekly).await?;
        let short = chart::fetch_series(&self.client, symbol, Horizon::ShortDaily).await?;

        Ok(TickerBundle {
            fundamentals,
            long,
            short,
        })
    }

    /// One chunk of symbols, one shared quote round trip; histories stay per
    /// symbol. A failure for one symbol leaves it out of the returned map
    /// without failing the chunk.
    pub async fn fetch_chunk(&self, chunk: &[String]) -> HashMap<String, TickerBundle> {
        debug_assert!(chunk.len() <= PROVIDER_BATCH_MAX);

        let mut bags = match self.fetch_batch_quotes(chunk).await {
            Ok(bags) => bags,
            Err(err) => {
                warn!("batch quote request failed ({err}); continuing without fundamentals");
                HashMap::new()
            }
        };

        let mut bundles = HashMap::with_capacity(chunk.len());
        for symbol in chunk {
            // The provider occasionally echoes the display form of a symbol;
            // fall back to it before declaring the bag absent.
            let fundamentals = bags
                .remove(symbol)
                .or_else(|| bags.remove(&symbols::to_display(symbol)))
                .unwrap_or_default();

            let long = match chart::fetch_series(&self.client, symbol, Horizon::LongWeekly).await {
                Ok(series) => series,
                Err(err) => {
                    warn!("{symbol}: long history unavailable ({err})");
                    continue;
                }
            };
            let short = match chart::fetch_series(&self.client, symbol, Horizon::ShortDaily).await
            {
                Ok(series) => series,
                Err(err) => {
                    warn!("{symbol}: short history unavailable ({err})");
                    continue;
                }
            };

            bundles.insert(
                symbol.clone(),
                TickerBundle {
                    fundamentals,
                    long,
                    short,
                },
            );
        }

        bundles
    }

    async fn fetch_fundamentals(&self, symbol: &str) -> FetchResult<FundamentalBag> {
        let url = format!("{QUOTE_SUMMARY_ENDPOINT}/{symbol}");

        let response = self
            .client
            .get(&url)
            .query(&[("modules", SUMMARY_MODULES)])
            .send()
            .await
            .with_context(|| format!("fundamentals request failed for {symbol}"))?
            .error_for_status()
            .with_context(|| format!("fundamentals request returned error status for {symbol}"))?;

        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read fundamentals body for {symbol}"))?;

        fundamentals::parse_quote_summary(&body, symbol)
    }

    async fn fetch_batch_quotes(
        &self,
        chunk: &[String],
    ) -> FetchResult<HashMap<String, FundamentalBag>> {
        let joined = chunk.join(",");

        let response = self
            .client
            .get(BATCH_QUOTE_ENDPOINT)
            .query(&[("symbols", joined.as_str())])
            .send()
            .await
            .context("batch quote request failed")?
            .error_for_status()
            .context("batch quote request returned error status")?;

        let body = response
            .text()
            .await
            .context("failed to read batch quote body")?;

        fundamentals::parse_batch_quotes(&body)
    }
}
