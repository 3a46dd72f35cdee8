use std::collections::HashMap;

use chrono_tz::Tz;

use crate::fetch::PROVIDER_BATCH_MAX;

/// Default upper bound on simultaneous in-flight provider requests.
pub const DEFAULT_WORKER_POOL: usize = 30;

/// How the pipeline talks to the quote provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// One round trip per symbol; simplest, highest call count.
    PerSymbol,
    /// One quote round trip per chunk of symbols; preferred at scale.
    Batched,
}

/// Where a segment's ticker list comes from.
#[derive(Debug, Clone)]
pub enum UniverseSource {
    /// An index-membership page whose constituents live in an HTML table.
    WikipediaIndex {
        url: String,
        /// Substring that anchors the constituents table within the page.
        table_marker: String,
        symbol_col: usize,
        name_col: usize,
        sector_col: usize,
    },
    /// Local `symbol,name,sector` listing.
    CsvFile { path: String },
}

#[derive(Debug, Clone)]
pub struct SegmentConfig {
    pub code: String,
    pub name: String,
    /// IANA timezone of the reference exchange, for the session clock.
    pub timezone: Tz,
    pub source: UniverseSource,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub segments: HashMap<String, SegmentConfig>,
    pub strategy: FetchStrategy,
    pub worker_pool: usize,
    pub chunk_size: usize,
}

impl Config {
    /// Built-in segment registry; no external config files required.
    pub fn builtin() -> Self {
        let mut segments = HashMap::new();

        segments.insert(
            "SP500".to_string(),
            SegmentConfig {
                code: "SP500".to_string(),
                name: "S&P 500".to_string(),
                timezone: chrono_tz::America::New_York,
                source: UniverseSource::WikipediaIndex {
                    url: "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies"
                        .to_string(),
                    table_marker: "id=\"constituents\"".to_string(),
                    symbol_col: 0,
                    name_col: 1,
                    sector_col: 2,
                },
            },
        );

        segments.insert(
            "NASDAQ".to_string(),
            SegmentConfig {
                code: "NASDAQ".to_string(),
                name: "NASDAQ-100".to_string(),
                timezone: chrono_tz::America::New_York,
                // The constituents table on this page lists the company
                // before the ticker.
                source: UniverseSource::WikipediaIndex {
                    url: "https://en.wikipedia.org/wiki/Nasdaq-100".to_string(),
                    table_marker: "id=\"constituents\"".to_string(),
                    symbol_col: 1,
                    name_col: 0,
                    sector_col: 2,
                },
            },
        );

        segments.insert(
            "KOSPI".to_string(),
            SegmentConfig {
                code: "KOSPI".to_string(),
                name: "KOSPI 100".to_string(),
                timezone: chrono_tz::Asia::Seoul,
                source: UniverseSource::CsvFile {
                    path: "data/kospi100.csv".to_string(),
                },
            },
        );

        Self {
            segments,
            strategy: FetchStrategy::PerSymbol,
            worker_pool: DEFAULT_WORKER_POOL,
            chunk_size: PROVIDER_BATCH_MAX,
        }
    }

    /// Case-insensitive segment lookup.
    pub fn segment(&self, code: &str) -> Option<&SegmentConfig> {
        self.segments.get(&code.to_uppercase())
    }

    /// All built-in segment codes, in stable order.
    pub fn segment_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.segments.keys().cloned().collect();
        codes.sort();
        codes
    }

    /// Chunk size clamped to what the provider accepts in one batched call.
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.clamp(1, PROVIDER_BATCH_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_segments_resolve_case_insensitively() {
        let config = Config::builtin();

        assert!(config.segment("sp500").is_some());
        assert!(config.segment("Kospi").is_some());
        assert!(config.segment("FTSE").is_none());
        assert_eq!(config.segment_codes(), vec!["KOSPI", "NASDAQ", "SP500"]);
    }

    #[test]
    fn chunk_size_is_clamped_to_provider_limit() {
        let mut config = Config::builtin();

        config.chunk_size = 500;
        assert_eq!(config.effective_chunk_size(), PROVIDER_BATCH_MAX);

        config.chunk_size = 0;
        assert_eq!(config.effective_chunk_size(), 1);
    }
}
