use chrono::NaiveDateTime;
use serde::Serialize;

use crate::fetch::{FundamentalBag, PriceSeries};
use crate::universe::TickerRef;

/// Sentinel meaning "not enough daily history to rank the spread."
pub const MA_SPREAD_UNAVAILABLE: f64 = -1.0;

/// The spread needs a complete 50-bar window plus at least one extra bar.
const MA_MIN_BARS: usize = 50;

/// One fully derived row of the published asset. Built once per ticker and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRecord {
    pub ticker: String,
    pub name: String,
    pub industry: String,
    pub ath: f64,
    pub lowest_after_ath: f64,
    pub price: f64,
    pub correction_ratio: f64,
    pub price_to_ath: f64,
    pub days_since_ath: i64,
    pub ma_spread_percentile: f64,
    pub eps_q0: f64,
    pub eps_q1: f64,
    pub eps_q2: f64,
    pub eps_q3: f64,
    pub per: f64,
    pub roe: f64,
}

/// Derive one ticker's record from its histories and fundamentals.
///
/// Pure: identical inputs give a bit-identical record. Returns `None` when
/// either series is empty or no usable current price exists; the caller drops
/// the ticker.
pub fn enrich(
    ticker: &TickerRef,
    provider_symbol: &str,
    long: &PriceSeries,
    short: &PriceSeries,
    bag: &FundamentalBag,
    market_open: bool,
    now: NaiveDateTime,
) -> Option<EnrichedRecord> {
    if long.is_empty() || short.is_empty() {
        return None;
    }

    let last_close = short.last().map(|c| c.close)?;
    let price = if last_close.is_finite() {
        last_close
    } else {
        bag.quote_price(market_open)?
    };

    let (raw_ath, ath_index) = all_time_high(long);
    let raw_ath = if raw_ath.is_finite() { raw_ath } else { 0.0 };
    let raw_trough = trough_after(long, ath_index).unwrap_or(price);

    // Whole days, timezone-naive on both sides.
    let days_since_ath = (now - long[ath_index].timestamp.naive_utc()).num_days();

    // Ratios derive from the published (rounded) figures so the record stays
    // internally consistent: price_to_ath == round(price / ath, 3).
    let ath = round2(raw_ath);
    let lowest_after_ath = round2(raw_trough);
    let price = round2(price);

    let (correction_ratio, price_to_ath) = if ath > 0.0 {
        (
            round3((ath - lowest_after_ath) / ath),
            round3(price / ath),
        )
    } else {
        (0.0, 0.0)
    };

    let ma_spread_percentile = ma_spread_percentile(short);

    let per = bag
        .summary_trailing_pe
        .or(bag.stats_trailing_pe)
        .or(bag.summary_forward_pe)
        .or(bag.stats_forward_pe)
        .unwrap_or(0.0);
    let roe = bag
        .fin_return_on_equity
        .or(bag.stats_return_on_equity)
        .map(|v| v * 100.0)
        .unwrap_or(0.0);
    let eps_curr = round2(
        bag.stats_earnings_quarterly_growth
            .or(bag.fin_earnings_growth)
            .map(|v| v * 100.0)
            .unwrap_or(0.0),
    );

    Some(EnrichedRecord {
        ticker: provider_symbol.to_string(),
        name: ticker.display_name.clone(),
        industry: ticker.sector_or_industry.clone(),
        ath,
        lowest_after_ath,
        price,
        correction_ratio,
        price_to_ath,
        days_since_ath,
        ma_spread_percentile,
        eps_q0: eps_curr,
        // Synthetic decay placeholder, not observed quarters: each step back
        // is 10% of the current reading, derived from the rounded value.
        eps_q1: round2(eps_curr * 0.9),
        eps_q2: round2(eps_curr * 0.8),
        eps_q3: round2(eps_curr * 0.7),
        per: round2(per),
        roe: round2(roe),
    })
}

/// Maximum `high` and its index; ties resolve to the earliest bar.
fn all_time_high(series: &PriceSeries) -> (f64, usize) {
    let mut best = f64::NEG_INFINITY;
    let mut index = 0;

    for (i, candle) in series.iter().enumerate() {
        if candle.high > best {
            best = candle.high;
            index = i;
        }
    }

    (best, index)
}

/// Minimum `low` from `start` to the end of the series, inclusive.
fn trough_after(series: &PriceSeries, start: usize) -> Option<f64> {
    let mut lowest: Option<f64> = None;

    for candle in series.iter().skip(start) {
        if !candle.low.is_finite() {
            continue;
        }
        lowest = Some(match lowest {
            Some(current) if current <= candle.low => current,
            _ => candle.low,
        });
    }

    lowest
}

/// Percentile rank of today's moving-average spread within its own trailing
/// distribution. Requires strictly more than 50 daily bars.
fn ma_spread_percentile(short: &PriceSeries) -> f64 {
    if short.len() <= MA_MIN_BARS {
        return MA_SPREAD_UNAVAILABLE;
    }

    let closes: Vec<f64> = short.iter().map(|c| c.close).collect();
    let ma10 = simple_moving_average(&closes, 10);
    let ma20 = simple_moving_average(&closes, 20);
    let ma50 = simple_moving_average(&closes, 50);

    // The spread is defined only where all three windows are complete, i.e.
    // from the 50th bar onwards.
    let mut spreads = Vec::with_capacity(closes.len() - MA_MIN_BARS + 1);
    for t in (MA_MIN_BARS - 1)..closes.len() {
        let (Some(m10), Some(m20), Some(m50)) = (ma10[t], ma20[t], ma50[t]) else {
            continue;
        };
        spreads.push((m10 - m50).abs() + (m20 - m50).abs());
    }

    let Some(&today) = spreads.last() else {
        return MA_SPREAD_UNAVAILABLE;
    };

    let lower = spreads.iter().filter(|&&spread| spread < today).count();
    round2(lower as f64 / spreads.len() as f64 * 100.0)
}

/// Trailing simple moving average; the first `window - 1` slots are undefined.
fn simple_moving_average(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    let mut sum: f64 = values[..window].iter().sum();
    out[window - 1] = Some(sum / window as f64);

    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out[i] = Some(sum / window as f64);
    }

    out
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
