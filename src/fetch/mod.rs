use crate::error::Result;

pub mod chart;
pub mod client;
pub mod fundamentals;
pub mod symbols;

pub use chart::{Candle, Horizon, PriceSeries};
pub use client::{MarketDataClient, TickerBundle};
pub use fundamentals::FundamentalBag;

/// Upper bound on symbols the provider accepts in one batched quote call.
pub const PROVIDER_BATCH_MAX: usize = 50;

pub type FetchResult<T> = Result<T>;

#[inline]
pub fn ensure_concurrency_limit(limit: usize) -> usize {
    limit.max(1)
}
