//! Symbol universe: the tracked tickers and their provider spellings.
//!
//! Users supply "original" symbols (e.g. `RELIANCE`); the provider wants an
//! exchange-suffixed spelling (`RELIANCE.NS`). The universe keeps both sides
//! in order so fetched columns can be renamed back.

use super::provider::DataError;
use crate::config::FetchConfig;
use std::collections::HashMap;
use std::path::Path;

/// Header names recognised as the symbol column, in priority order.
pub const SYMBOL_HEADERS: [&str; 6] = ["symbol", "Symbol", "SYMBOL", "ticker", "Ticker", "TICKER"];

/// Convert a symbol to the provider's spelling.
///
/// Trims and uppercases; keeps the symbol as-is if it already ends with a
/// recognised exchange suffix, otherwise appends the default suffix. Blank
/// input stays blank.
pub fn normalize_symbol(symbol: &str, default_suffix: &str, known_suffixes: &[String]) -> String {
    let s = symbol.trim().to_uppercase();
    if s.is_empty() {
        return s;
    }
    let default_suffix = default_suffix.to_uppercase();
    let has_suffix = s.ends_with(&default_suffix)
        || known_suffixes
            .iter()
            .any(|suffix| s.ends_with(&suffix.to_uppercase()));
    if has_suffix {
        s
    } else {
        format!("{s}{default_suffix}")
    }
}

/// Ordered, duplicate-free mapping between original and provider symbols.
#[derive(Debug, Clone, Default)]
pub struct Universe {
    originals: Vec<String>,
    providers: Vec<String>,
    by_provider: HashMap<String, usize>,
}

impl Universe {
    /// Build the universe from user-supplied symbols.
    ///
    /// Originals are trimmed and uppercased; blanks are dropped. When two
    /// originals map to the same provider symbol the first one wins.
    pub fn from_symbols<S: AsRef<str>>(symbols: &[S], config: &FetchConfig) -> Self {
        let mut universe = Self::default();
        for raw in symbols {
            let original = raw.as_ref().trim().to_uppercase();
            if original.is_empty() {
                continue;
            }
            let provider =
                normalize_symbol(&original, &config.exchange_suffix, &config.known_suffixes);
            if universe.by_provider.contains_key(&provider) {
                tracing::debug!(%original, %provider, "duplicate provider symbol, keeping first");
                continue;
            }
            universe
                .by_provider
                .insert(provider.clone(), universe.providers.len());
            universe.originals.push(original);
            universe.providers.push(provider);
        }
        universe
    }

    /// Provider symbols in input order.
    pub fn provider_symbols(&self) -> &[String] {
        &self.providers
    }

    /// Original symbols in input order.
    pub fn original_symbols(&self) -> &[String] {
        &self.originals
    }

    /// Original spelling for a provider symbol, if it belongs to the universe.
    pub fn original_for(&self, provider: &str) -> Option<&str> {
        self.by_provider
            .get(provider)
            .map(|&i| self.originals[i].as_str())
    }

    /// Provider spelling for an original symbol.
    pub fn provider_for(&self, original: &str) -> Option<&str> {
        self.originals
            .iter()
            .position(|o| o == original)
            .map(|i| self.providers[i].as_str())
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }
}

/// Read symbols from a CSV file.
///
/// Uses the first recognised symbol header (see [`SYMBOL_HEADERS`]), falling
/// back to the first column. Values are trimmed and blank entries dropped.
/// A missing file or an empty result is an input error.
pub fn read_symbols_csv(path: &Path) -> Result<Vec<String>, DataError> {
    if !path.exists() {
        return Err(DataError::SymbolsFileMissing(path.display().to_string()));
    }
    let file = std::fs::File::open(path)
        .map_err(|e| DataError::SymbolsRead(format!("{}: {e}", path.display())))?;
    let symbols = read_symbols(file)?;
    if symbols.is_empty() {
        return Err(DataError::NoSymbols(path.display().to_string()));
    }
    Ok(symbols)
}

/// Read symbols from any CSV source (same rules as [`read_symbols_csv`]).
pub fn read_symbols<R: std::io::Read>(reader: R) -> Result<Vec<String>, DataError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| DataError::SymbolsRead(e.to_string()))?
        .clone();
    let column = SYMBOL_HEADERS
        .iter()
        .find_map(|name| headers.iter().position(|h| h.trim() == *name))
        .unwrap_or(0);

    let mut symbols = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| DataError::SymbolsRead(e.to_string()))?;
        if let Some(value) = record.get(column) {
            let value = value.trim();
            if !value.is_empty() {
                symbols.push(value.to_string());
            }
        }
    }
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<String> {
        vec![".NS".into(), ".BO".into()]
    }

    #[test]
    fn appends_default_suffix() {
        assert_eq!(normalize_symbol("RELIANCE", ".NS", &known()), "RELIANCE.NS");
        assert_eq!(normalize_symbol("  tcs ", ".NS", &known()), "TCS.NS");
    }

    #[test]
    fn keeps_recognised_suffix() {
        assert_eq!(normalize_symbol("RELIANCE.BO", ".NS", &known()), "RELIANCE.BO");
        assert_eq!(normalize_symbol("infy.ns", ".NS", &known()), "INFY.NS");
    }

    #[test]
    fn blank_stays_blank() {
        assert_eq!(normalize_symbol("   ", ".NS", &known()), "");
    }

    #[test]
    fn universe_maps_both_ways() {
        let u = Universe::from_symbols(&["RELIANCE", "RELIANCE.BO"], &FetchConfig::default());
        assert_eq!(u.provider_symbols(), ["RELIANCE.NS", "RELIANCE.BO"]);
        assert_eq!(u.original_for("RELIANCE.NS"), Some("RELIANCE"));
        assert_eq!(u.original_for("RELIANCE.BO"), Some("RELIANCE.BO"));
        assert_eq!(u.provider_for("RELIANCE"), Some("RELIANCE.NS"));
        assert_eq!(u.original_for("TCS.NS"), None);
    }

    #[test]
    fn collisions_keep_first_occurrence() {
        let u = Universe::from_symbols(
            &["INFY", "infy", "INFY.NS", "", "TCS"],
            &FetchConfig::default(),
        );
        assert_eq!(u.original_symbols(), ["INFY", "TCS"]);
        assert_eq!(u.provider_symbols(), ["INFY.NS", "TCS.NS"]);
        assert_eq!(u.len(), 2);
    }

    #[test]
    fn reads_recognised_header() {
        let csv = "Company,Ticker\nReliance Industries, RELIANCE \nTata,TCS\nBlank,\n";
        let symbols = read_symbols(csv.as_bytes()).unwrap();
        assert_eq!(symbols, vec!["RELIANCE", "TCS"]);
    }

    #[test]
    fn lowercase_header_wins_over_later_variants() {
        let csv = "TICKER,symbol\nX,A\nY,B\n";
        let symbols = read_symbols(csv.as_bytes()).unwrap();
        assert_eq!(symbols, vec!["A", "B"]);
    }

    #[test]
    fn falls_back_to_first_column() {
        let csv = "Name,Industry\nHDFCBANK,Banks\n  \nITC,FMCG\n";
        let symbols = read_symbols(csv.as_bytes()).unwrap();
        assert_eq!(symbols, vec!["HDFCBANK", "ITC"]);
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let err = read_symbols_csv(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, DataError::SymbolsFileMissing(_)));
    }

    #[test]
    fn empty_file_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbols.csv");
        std::fs::write(&path, "Symbol\n \n").unwrap();
        let err = read_symbols_csv(&path).unwrap_err();
        assert!(matches!(err, DataError::NoSymbols(_)));
    }
}
