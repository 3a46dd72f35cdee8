use std::collections::HashSet;
use std::path::Path;

use log::info;
use reqwest::Client;

use crate::config::{SegmentConfig, UniverseSource};
use crate::error::{AppError, Context, Result};

const LISTING_USER_AGENT: &str = "Mozilla/5.0";
const DEFAULT_SECTOR: &str = "N/A";

/// One membership row of a segment universe, in display notation.
#[derive(Debug, Clone)]
pub struct TickerRef {
    pub symbol: String,
    pub display_name: String,
    pub sector_or_industry: String,
}

/// Resolve the ticker universe for one segment.
///
/// Zero resolved tickers is a hard failure for the segment; other segments
/// are unaffected by it.
pub async fn load_universe(client: &Client, segment: &SegmentConfig) -> Result<Vec<TickerRef>> {
    let refs = match &segment.source {
        UniverseSource::WikipediaIndex {
            url,
            table_marker,
            symbol_col,
            name_col,
            sector_col,
        } => {
            let html = fetch_listing_page(client, url).await?;
            parse_index_table(&html, table_marker, *symbol_col, *name_col, *sector_col)
        }
        UniverseSource::CsvFile { path } => load_csv_universe(Path::new(path))?,
    };

    if refs.is_empty() {
        return Err(AppError::EmptyUniverse(segment.code.clone()));
    }

    info!("{}: resolved {} tickers", segment.code, refs.len());
    Ok(refs)
}

async fn fetch_listing_page(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, LISTING_USER_AGENT)
        .send()
        .await
        .with_context(|| format!("listing request failed for {url}"))?;

    if !response.status().is_success() {
        return Err(AppError::message(format!(
            "listing request for {url} failed with status {}",
            response.status()
        )));
    }

    Ok(response.text().await?)
}

/// Walk the constituents table and collect one entry per distinct symbol.
///
/// The first row after the table marker is the header and is skipped; rows
/// missing the symbol or name cell are skipped too.
pub(crate) fn parse_index_table(
    html: &str,
    table_marker: &str,
    symbol_col: usize,
    name_col: usize,
    sector_col: usize,
) -> Vec<TickerRef> {
    let Some(start) = html.find(table_marker) else {
        return Vec::new();
    };

    let table = &html[start..];
    let table = match table.find("</table>") {
        Some(end) => &table[..end],
        None => table,
    };

    let mut seen = HashSet::new();
    let mut refs = Vec::new();

    for row in table.split("<tr").skip(2) {
        let cells: Vec<Option<String>> = row.split("<td").skip(1).map(cell_text).collect();

        let Some(symbol) = cells.get(symbol_col).cloned().flatten() else {
            continue;
        };
        let Some(name) = cells.get(name_col).cloned().flatten() else {
            continue;
        };
        let sector = cells
            .get(sector_col)
            .cloned()
            .flatten()
            .unwrap_or_else(|| DEFAULT_SECTOR.to_string());

        if seen.insert(symbol.clone()) {
            refs.push(TickerRef {
                symbol,
                display_name: name,
                sector_or_industry: sector,
            });
        }
    }

    refs
}

fn load_csv_universe(path: &Path) -> Result<Vec<TickerRef>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open universe listing {}", path.display()))?;

    let mut seen = HashSet::new();
    let mut refs = Vec::new();

    for result in reader.records() {
        let record = result.context("failed to read universe listing record")?;

        let Some(symbol) = record.get(0).map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        let Some(name) = record.get(1).map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        let sector = record
            .get(2)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SECTOR);

        if seen.insert(symbol.to_string()) {
            refs.push(TickerRef {
                symbol: symbol.to_string(),
                display_name: name.to_string(),
                sector_or_industry: sector.to_string(),
            });
        }
    }

    Ok(refs)
}

/// Extract the visible text of one `<td` chunk.
fn cell_text(chunk: &str) -> Option<String> {
    let rest = chunk.split_once('>')?.1;
    let inner = rest.split("</td>").next().unwrap_or(rest);

    let text = strip_tags(inner);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn strip_tags(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;

    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    out.replace("&amp;", "&")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TABLE: &str = r#"
        <table class="wikitable sortable" id="constituents">
        <tbody><tr><th>Symbol</th><th>Security</th><th>Sector</th></tr>
        <tr>
        <td><a href="/wiki/MMM">MMM</a></td>
        <td><a href="/wiki/3M">3M</a></td>
        <td>Industrials</td>
        </tr>
        <tr>
        <td>BRK.B</td>
        <td>Berkshire Hathaway</td>
        <td>Financials</td>
        </tr>
        <tr>
        <td>MMM</td>
        <td>Duplicate row</td>
        <td>Industrials</td>
        </tr>
        <tr>
        <td>AES</td>
        <td>AES Corp &amp; Co</td>
        </tr>
        </tbody></table>
        <table><tr><td>unrelated</td></tr></table>
    "#;

    #[test]
    fn parses_rows_and_drops_duplicate_symbols() {
        let refs = parse_index_table(SAMPLE_TABLE, "id=\"constituents\"", 0, 1, 2);

        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].symbol, "MMM");
        assert_eq!(refs[0].display_name, "3M");
        assert_eq!(refs[1].symbol, "BRK.B");
        assert_eq!(refs[1].sector_or_industry, "Financials");
    }

    #[test]
    fn missing_sector_cell_falls_back_to_placeholder() {
        let refs = parse_index_table(SAMPLE_TABLE, "id=\"constituents\"", 0, 1, 2);

        let aes = refs.iter().find(|r| r.symbol == "AES").unwrap();
        assert_eq!(aes.display_name, "AES Corp & Co");
        assert_eq!(aes.sector_or_industry, DEFAULT_SECTOR);
    }

    #[test]
    fn missing_marker_yields_no_rows() {
        let refs = parse_index_table(SAMPLE_TABLE, "id=\"components\"", 0, 1, 2);
        assert!(refs.is_empty());
    }

    #[test]
    fn strips_nested_tags_and_entities() {
        assert_eq!(strip_tags("<a href=\"x\"><b>A&amp;B</b></a>"), "A&B");
        assert_eq!(strip_tags("plain"), "plain");
    }
}
