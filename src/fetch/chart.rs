use chrono::{DateTime, LocalResult, TimeZone, Utc};
use reqwest::Client;
use serde_json::Value;

use crate::error::Context;
use crate::fetch::FetchResult;

const CHART_ENDPOINT: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// The two lookback shapes the pipeline requests per ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    /// Years of weekly bars, for all-time-high detection.
    LongWeekly,
    /// One year of daily bars, for the moving-average indicators.
    ShortDaily,
}

impl Horizon {
    fn query(self) -> (&'static str, &'static str) {
        match self {
            Horizon::LongWeekly => ("20y", "1wk"),
            Horizon::ShortDaily => ("1y", "1d"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Bars in ascending timestamp order. May be empty when the provider has no
/// history for the requested window; emptiness is handled by the caller, not
/// raised as an error.
pub type PriceSeries = Vec<Candle>;

pub async fn fetch_series(
    client: &Client,
    symbol: &str,
    horizon: Horizon,
) -> FetchResult<PriceSeries> {
    let (range, interval) = horizon.query();
    let url = format!("{CHART_ENDPOINT}/{symbol}");

    let response = client
        .get(&url)
        .query(&[("range", range), ("interval", interval)])
        .send()
        .await
        .with_context(|| format!("history request failed for {symbol}"))?
        .error_for_status()
        .with_context(|| format!("history request returned error status for {symbol}"))?;

    let body = response
        .text()
        .await
        .with_context(|| format!("failed to read history body for {symbol}"))?;

    parse_chart_payload(&body, symbol)
}

/// Decode the chart payload into candles, skipping rows with null fields.
pub(crate) fn parse_chart_payload(body: &str, symbol: &str) -> FetchResult<PriceSeries> {
    let root: Value = serde_json::from_str(body)
        .with_context(|| format!("failed to parse history JSON for {symbol}"))?;

    let result = &root["chart"]["result"][0];
    let timestamps = result["timestamp"].as_array().cloned().unwrap_or_default();
    let quote = &result["indicators"]["quote"][0];

    let field = |key: &str| -> Vec<Value> { quote[key].as_array().cloned().unwrap_or_default() };
    let opens = field("open");
    let highs = field("high");
    let lows = field("low");
    let closes = field("close");

    let mut candles = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let Some(secs) = ts.as_i64() else {
            continue;
        };
        let Some(open) = opens.get(i).and_then(Value::as_f64) else {
            continue;
        };
        let Some(high) = highs.get(i).and_then(Value::as_f64) else {
            continue;
        };
        let Some(low) = lows.get(i).and_then(Value::as_f64) else {
            continue;
        };
        let Some(close) = closes.get(i).and_then(Value::as_f64) else {
            continue;
        };

        let timestamp = match Utc.timestamp_opt(secs, 0) {
            LocalResult::Single(dt) => dt,
            _ => continue,
        };

        candles.push(Candle {
            timestamp,
            open,
            high,
            low,
            close,
        });
    }

    candles.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(candles)
}
