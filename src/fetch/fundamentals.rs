use std::collections::HashMap;

use serde_json::Value;

use crate::error::Context;
use crate::fetch::FetchResult;

/// Normalized fundamental fields for one ticker.
///
/// This is the typed boundary between the provider's loose key/value modules
/// and the indicator engine: every field is either a number or absent, never
/// an error string or a wrapped object. Absent means unknown, not zero; the
/// engine's fallback chains assign defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FundamentalBag {
    pub summary_trailing_pe: Option<f64>,
    pub summary_forward_pe: Option<f64>,
    pub stats_trailing_pe: Option<f64>,
    pub stats_forward_pe: Option<f64>,
    pub stats_return_on_equity: Option<f64>,
    pub stats_earnings_quarterly_growth: Option<f64>,
    pub fin_return_on_equity: Option<f64>,
    pub fin_earnings_growth: Option<f64>,
    pub regular_market_price: Option<f64>,
    pub previous_close: Option<f64>,
}

impl FundamentalBag {
    /// Quote-field fallback for "current price" when the short series cannot
    /// provide one: the live/last price during the regular session, the
    /// previous close otherwise, falling through whichever is absent.
    pub fn quote_price(&self, market_open: bool) -> Option<f64> {
        if market_open {
            self.regular_market_price.or(self.previous_close)
        } else {
            self.previous_close.or(self.regular_market_price)
        }
    }
}

/// Decode a per-symbol quote-summary payload.
///
/// A missing result entry (unknown symbol, delisted ticker) normalizes to the
/// all-absent bag rather than an error; history fetching decides whether the
/// ticker survives.
pub(crate) fn parse_quote_summary(body: &str, symbol: &str) -> FetchResult<FundamentalBag> {
    let root: Value = serde_json::from_str(body)
        .with_context(|| format!("failed to parse fundamentals JSON for {symbol}"))?;

    let result = &root["quoteSummary"]["result"][0];
    if result.is_null() {
        return Ok(FundamentalBag::default());
    }

    let summary = &result["summaryDetail"];
    let stats = &result["defaultKeyStatistics"];
    let fin = &result["financialData"];

    Ok(FundamentalBag {
        summary_trailing_pe: numeric_field(summary, "trailingPE"),
        summary_forward_pe: numeric_field(summary, "forwardPE"),
        stats_trailing_pe: numeric_field(stats, "trailingPE"),
        stats_forward_pe: numeric_field(stats, "forwardPE"),
        stats_return_on_equity: numeric_field(stats, "returnOnEquity"),
        stats_earnings_quarterly_growth: numeric_field(stats, "earningsQuarterlyGrowth"),
        fin_return_on_equity: numeric_field(fin, "returnOnEquity"),
        fin_earnings_growth: numeric_field(fin, "earningsGrowth"),
        regular_market_price: numeric_field(fin, "currentPrice")
            .or_else(|| numeric_field(summary, "regularMarketPrice")),
        previous_close: numeric_field(summary, "previousClose")
            .or_else(|| numeric_field(summary, "regularMarketPreviousClose")),
    })
}

/// Decode a multi-symbol quote payload into one bag per returned symbol.
///
/// Symbols the provider dropped from the response are simply absent from the
/// map; the caller marks them as missing without failing the batch. The flat
/// quote rows carry price and P/E fields only, so the remaining fundamentals
/// stay unknown and resolve through the engine's fallback chains.
pub(crate) fn parse_batch_quotes(body: &str) -> FetchResult<HashMap<String, FundamentalBag>> {
    let root: Value =
        serde_json::from_str(body).context("failed to parse batch quote JSON")?;

    let entries = root["quoteResponse"]["result"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    let mut bags = HashMap::with_capacity(entries.len());
    for entry in &entries {
        let Some(symbol) = entry["symbol"].as_str() else {
            continue;
        };

        bags.insert(
            symbol.to_string(),
            FundamentalBag {
                summary_trailing_pe: numeric_field(entry, "trailingPE"),
                summary_forward_pe: numeric_field(entry, "forwardPE"),
                regular_market_price: numeric_field(entry, "regularMarketPrice"),
                previous_close: numeric_field(entry, "regularMarketPreviousClose"),
                ..FundamentalBag::default()
            },
        );
    }

    Ok(bags)
}

/// The provider emits numbers bare, `{ "raw": .. }`-wrapped, or as strings
/// depending on module and symbol; anything else normalizes to absent.
fn numeric_field(module: &Value, key: &str) -> Option<f64> {
    match module.get(key)? {
        Value::Number(num) => num.as_f64(),
        Value::Object(map) => map.get("raw").and_then(Value::as_f64),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_wrapped_and_bare_numbers_parse_identically() {
        let sample = r#"{
            "quoteSummary": {
                "result": [{
                    "summaryDetail": {
                        "trailingPE": {"raw": 24.5, "fmt": "24.50"},
                        "forwardPE": 21.0,
                        "previousClose": {"raw": 181.2}
                    },
                    "defaultKeyStatistics": {
                        "earningsQuarterlyGrowth": {"raw": 0.062}
                    },
                    "financialData": {
                        "returnOnEquity": "0.475",
                        "currentPrice": {"raw": 184.4}
                    }
                }],
                "error": null
            }
        }"#;

        let bag = parse_quote_summary(sample, "AAPL").unwrap();

        assert_eq!(bag.summary_trailing_pe, Some(24.5));
        assert_eq!(bag.summary_forward_pe, Some(21.0));
        assert_eq!(bag.stats_earnings_quarterly_growth, Some(0.062));
        assert_eq!(bag.fin_return_on_equity, Some(0.475));
        assert_eq!(bag.regular_market_price, Some(184.4));
        assert_eq!(bag.previous_close, Some(181.2));
    }

    #[test]
    fn error_string_modules_normalize_to_the_absent_bag() {
        let sample = r#"{
            "quoteSummary": {
                "result": [{
                    "summaryDetail": "Quote not found for ticker symbol",
                    "defaultKeyStatistics": {},
                    "financialData": {}
                }],
                "error": null
            }
        }"#;

        let bag = parse_quote_summary(sample, "GONE").unwrap();
        assert_eq!(bag, FundamentalBag::default());
    }

    #[test]
    fn missing_result_entry_normalizes_to_the_absent_bag() {
        let sample = r#"{"quoteSummary": {"result": null, "error": null}}"#;
        let bag = parse_quote_summary(sample, "GONE").unwrap();
        assert_eq!(bag, FundamentalBag::default());
    }

    #[test]
    fn batch_payload_maps_bags_by_symbol() {
        let sample = r#"{
            "quoteResponse": {
                "result": [
                    {"symbol": "AAPL", "trailingPE": 24.5, "regularMarketPrice": 184.4},
                    {"symbol": "005930.KS", "regularMarketPreviousClose": 71000.0}
                ],
                "error": null
            }
        }"#;

        let bags = parse_batch_quotes(sample).unwrap();

        assert_eq!(bags.len(), 2);
        assert_eq!(bags["AAPL"].summary_trailing_pe, Some(24.5));
        assert_eq!(bags["005930.KS"].previous_close, Some(71000.0));
        assert!(!bags.contains_key("MSFT"));
    }

    #[test]
    fn quote_price_prefers_the_session_appropriate_field() {
        let bag = FundamentalBag {
            regular_market_price: Some(10.0),
            previous_close: Some(9.0),
            ..FundamentalBag::default()
        };

        assert_eq!(bag.quote_price(true), Some(10.0));
        assert_eq!(bag.quote_price(false), Some(9.0));

        let live_only = FundamentalBag {
            regular_market_price: Some(10.0),
            ..FundamentalBag::default()
        };
        assert_eq!(live_only.quote_price(false), Some(10.0));
        assert_eq!(FundamentalBag::default().quote_price(true), None);
    }
}
