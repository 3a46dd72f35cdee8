//! Translation between the universe's display notation and the provider's
//! symbol notation. Applied once, when a ticker enters the client layer.

/// Country suffixes that keep the provider's dotted form (`005930.KS`).
const MARKET_SUFFIXES: &[&str] = &["KS"];

/// Display notation to provider notation.
///
/// Punctuation inside the base symbol becomes a hyphen (`BRK.B` → `BRK-B`),
/// while a recognized market suffix keeps its dot so the provider routes the
/// symbol to the right exchange.
pub fn to_provider(symbol: &str) -> String {
    let cleaned = symbol.trim().replace('.', "-");

    for suffix in MARKET_SUFFIXES {
        let alias = format!("-{suffix}");
        if let Some(base) = cleaned.strip_suffix(alias.as_str()) {
            return format!("{base}.{suffix}");
        }
    }

    cleaned
}

/// Provider notation back to display notation.
pub fn to_display(symbol: &str) -> String {
    for suffix in MARKET_SUFFIXES {
        let dotted = format!(".{suffix}");
        if let Some(base) = symbol.strip_suffix(dotted.as_str()) {
            return format!("{}{dotted}", base.replace('-', "."));
        }
    }

    symbol.replace('-', ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_symbols_pass_through() {
        assert_eq!(to_provider("AAPL"), "AAPL");
        assert_eq!(to_display("AAPL"), "AAPL");
    }

    #[test]
    fn share_class_dots_become_hyphens() {
        assert_eq!(to_provider("BRK.B"), "BRK-B");
        assert_eq!(to_provider("BF.B"), "BF-B");
    }

    #[test]
    fn market_suffix_keeps_its_dot() {
        assert_eq!(to_provider("005930.KS"), "005930.KS");
        assert_eq!(to_provider("035420.KS"), "035420.KS");
    }

    #[test]
    fn display_round_trips_index_style_symbols() {
        for symbol in ["AAPL", "BRK.B", "005930.KS"] {
            assert_eq!(to_display(&to_provider(symbol)), symbol);
        }
    }
}
