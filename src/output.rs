use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use unicode_width::UnicodeWidthStr;

use crate::error::{Context, Result};
use crate::indicators::EnrichedRecord;

/// Aggregated pipeline output, keyed by segment code.
pub type MarketData = BTreeMap<String, Vec<EnrichedRecord>>;

/// Render the front end's static asset: `const <var> = <json>;`.
pub fn render_js_asset(var_name: &str, data: &MarketData) -> Result<Vec<u8>> {
    let mut json = Vec::new();
    // The consuming page was written against 4-space-indented JSON; keep the
    // diff-friendly layout stable across runs.
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut json, formatter);
    data.serialize(&mut serializer)
        .context("failed to serialize market data")?;

    let mut content = Vec::with_capacity(json.len() + var_name.len() + 16);
    content.extend_from_slice(b"const ");
    content.extend_from_slice(var_name.as_bytes());
    content.extend_from_slice(b" = ");
    content.append(&mut json);
    content.extend_from_slice(b";\n");
    Ok(content)
}

pub fn write_js_asset(path: &Path, var_name: &str, data: &MarketData) -> Result<()> {
    let content = render_js_asset(var_name, data)?;
    fs::write(path, content)
        .with_context(|| format!("failed to write asset {}", path.display()))?;
    Ok(())
}

/// Flat per-segment export for offline inspection.
pub fn write_segment_csv(path: &Path, records: &[EnrichedRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create CSV writer for {}", path.display()))?;

    writer.write_record([
        "ticker",
        "name",
        "industry",
        "ath",
        "lowestAfterAth",
        "price",
        "correctionRatio",
        "priceToAth",
        "daysSinceAth",
        "maSpreadPercentile",
        "epsQ0",
        "epsQ1",
        "epsQ2",
        "epsQ3",
        "per",
        "roe",
    ])?;

    for record in records {
        writer.write_record(&[
            record.ticker.clone(),
            record.name.clone(),
            record.industry.clone(),
            record.ath.to_string(),
            record.lowest_after_ath.to_string(),
            record.price.to_string(),
            record.correction_ratio.to_string(),
            record.price_to_ath.to_string(),
            record.days_since_ath.to_string(),
            record.ma_spread_percentile.to_string(),
            record.eps_q0.to_string(),
            record.eps_q1.to_string(),
            record.eps_q2.to_string(),
            record.eps_q3.to_string(),
            record.per.to_string(),
            record.roe.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

const SUMMARY_HEADERS: [&str; 8] = [
    "Ticker", "Name", "Price", "ATH", "P/ATH", "Days", "PER", "ROE",
];

/// Aligned plain-text preview of the top records, for terminal inspection.
pub fn render_summary_table(records: &[EnrichedRecord], limit: usize) -> String {
    let rows: Vec<Vec<String>> = records
        .iter()
        .take(limit)
        .map(|record| {
            vec![
                record.ticker.clone(),
                record.name.clone(),
                format!("{:.2}", record.price),
                format!("{:.2}", record.ath),
                format!("{:.3}", record.price_to_ath),
                record.days_since_ath.to_string(),
                format!("{:.2}", record.per),
                format!("{:.2}", record.roe),
            ]
        })
        .collect();

    let all_rows: Vec<Vec<String>> =
        std::iter::once(SUMMARY_HEADERS.iter().map(|h| h.to_string()).collect())
            .chain(rows)
            .collect();

    let mut col_widths = vec![0; SUMMARY_HEADERS.len()];
    for row in &all_rows {
        for (i, cell) in row.iter().enumerate() {
            col_widths[i] = col_widths[i].max(cell.width());
        }
    }

    let border = format!(
        "+{}+",
        col_widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );

    let mut out = String::new();
    out.push_str(&border);
    out.push('\n');

    for (row_idx, row) in all_rows.iter().enumerate() {
        let formatted: Vec<String> = row
            .iter()
            .zip(&col_widths)
            .map(|(cell, width)| format!(" {}{} ", " ".repeat(width - cell.width()), cell))
            .collect();
        out.push('|');
        out.push_str(&formatted.join("|"));
        out.push_str("|\n");

        if row_idx == 0 {
            out.push_str(&border);
            out.push('\n');
        }
    }

    out.push_str(&border);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(symbol: &str) -> EnrichedRecord {
        EnrichedRecord {
            ticker: symbol.to_string(),
            name: "Test Corp".to_string(),
            industry: "Testing".to_string(),
            ath: 120.0,
            lowest_after_ath: 60.0,
            price: 90.0,
            correction_ratio: 0.5,
            price_to_ath: 0.75,
            days_since_ath: 42,
            ma_spread_percentile: 12.5,
            eps_q0: 6.25,
            eps_q1: 5.63,
            eps_q2: 5.0,
            eps_q3: 4.38,
            per: 24.5,
            roe: 47.55,
        }
    }

    #[test]
    fn js_asset_wraps_pretty_json_in_a_const_declaration() {
        let mut data = MarketData::new();
        data.insert("SP500".to_string(), vec![record("AAPL")]);

        let bytes = render_js_asset("marketData", &data).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.starts_with("const marketData = {"));
        assert!(text.ends_with(";\n"));
        assert!(text.contains("    \"SP500\": ["));
        assert!(text.contains("\"price_to_ath\": 0.75"));
    }

    #[test]
    fn empty_data_still_renders_a_valid_asset() {
        let text =
            String::from_utf8(render_js_asset("marketData", &MarketData::new()).unwrap()).unwrap();
        assert_eq!(text, "const marketData = {};\n");
    }

    #[test]
    fn summary_table_is_aligned_and_limited() {
        let records = vec![record("AAPL"), record("MSFT"), record("GOOG")];

        let table = render_summary_table(&records, 2);
        let lines: Vec<&str> = table.lines().collect();

        // Border, header, border, two rows, border.
        assert_eq!(lines.len(), 6);
        let width = lines[0].len();
        assert!(lines.iter().all(|line| line.len() == width));
        assert!(table.contains("AAPL"));
        assert!(table.contains("MSFT"));
        assert!(!table.contains("GOOG"));
    }
}
