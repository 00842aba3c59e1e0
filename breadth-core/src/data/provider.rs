//! Data provider trait, batch response shapes and structured error types.
//!
//! The DataProvider trait abstracts over price sources (Yahoo Finance, test
//! doubles) so the fetcher can batch, back off and merge without knowing how
//! a batch is actually downloaded.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured error types for data operations.
///
/// Displayable as-is in CLI output.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("symbols file not found: {0}")]
    SymbolsFileMissing(String),

    #[error("no symbols found in {0}")]
    NoSymbols(String),

    #[error("failed to read symbols: {0}")]
    SymbolsRead(String),

    #[error("no data downloaded ({0}); check symbol format, provider availability or rate limits")]
    NoData(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Daily closing prices for one provider symbol.
///
/// `close` and `adj_close` are parallel to `dates`. `adj_close` is `None`
/// when the provider did not report an adjusted series at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub dates: Vec<NaiveDate>,
    pub close: Vec<Option<f64>>,
    pub adj_close: Option<Vec<Option<f64>>>,
}

impl PriceSeries {
    /// The preferred closing price per date: adjusted close when the series
    /// has one, raw close otherwise. NaN is reported as missing.
    pub fn preferred_closes(&self) -> Vec<Option<f64>> {
        let source = self.adj_close.as_ref().unwrap_or(&self.close);
        self.dates
            .iter()
            .enumerate()
            .map(|(i, _)| source.get(i).copied().flatten().filter(|v| !v.is_nan()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// What a provider hands back for one batch request.
///
/// A one-symbol batch comes back as a bare series; anything larger comes back
/// as a table keyed by provider symbol, where a symbol the provider could not
/// deliver is present with `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchResponse {
    Single(PriceSeries),
    Multi(Vec<(String, Option<PriceSeries>)>),
}

impl BatchResponse {
    /// Assemble a batch response from per-symbol outcomes, in request order.
    ///
    /// A symbol the provider does not know ([`DataError::SymbolNotFound`])
    /// still gets an empty slot, whatever the batch size, so the panel keeps
    /// one column per requested symbol. The batch is an error only when some
    /// request really failed and no symbol delivered data.
    pub fn from_symbol_results(
        results: Vec<(String, Result<PriceSeries, DataError>)>,
    ) -> Result<Self, DataError> {
        let single = results.len() == 1;
        let mut delivered = false;
        let mut first_error = None;
        let mut table = Vec::with_capacity(results.len());

        for (symbol, result) in results {
            match result {
                Ok(series) => {
                    delivered = true;
                    table.push((symbol, Some(series)));
                }
                Err(DataError::SymbolNotFound { .. }) => {
                    tracing::debug!(%symbol, "symbol not found, keeping an empty column");
                    table.push((symbol, None));
                }
                Err(e) => {
                    tracing::debug!(%symbol, "no data: {e}");
                    first_error.get_or_insert(e);
                    table.push((symbol, None));
                }
            }
        }

        if let Some(e) = first_error {
            if !delivered {
                return Err(e);
            }
        }
        if single {
            if let Some((_, series)) = table.pop() {
                return Ok(Self::Single(series.unwrap_or_default()));
            }
        }
        Ok(Self::Multi(table))
    }
}

/// Trait for batch price providers.
///
/// One call covers every symbol of the batch over the full date range at
/// daily resolution. How the provider parallelises internally is its own
/// business; callers treat the call as a single blocking request.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily closes for a batch of provider symbols.
    fn fetch_batch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BatchResponse, DataError>;

    /// Check if the provider is currently available (not rate-limited, not blocked).
    fn is_available(&self) -> bool;
}

/// Progress callback for batched downloads.
pub trait FetchProgress {
    /// Called before a batch request is issued.
    fn on_batch_start(&self, index: usize, total: usize, symbols: &[String]);

    /// Called when a batch request finishes, successfully or not.
    fn on_batch_complete(
        &self,
        index: usize,
        total: usize,
        symbols: &[String],
        result: Result<usize, &DataError>,
    );

    /// Called once all batches have been attempted.
    fn on_finish(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that logs through `tracing`.
pub struct TracingProgress;

impl FetchProgress for TracingProgress {
    fn on_batch_start(&self, index: usize, total: usize, symbols: &[String]) {
        tracing::info!(
            batch = index + 1,
            total,
            tickers = symbols.len(),
            "fetching batch"
        );
    }

    fn on_batch_complete(
        &self,
        index: usize,
        total: usize,
        symbols: &[String],
        result: Result<usize, &DataError>,
    ) {
        match result {
            Ok(columns) => tracing::info!(batch = index + 1, total, columns, "batch ok"),
            Err(e) => {
                let head: Vec<&str> = symbols.iter().take(5).map(String::as_str).collect();
                tracing::warn!(
                    batch = index + 1,
                    total,
                    "error downloading batch {:?}... ({} tickers): {e}",
                    head,
                    symbols.len()
                );
            }
        }
    }

    fn on_finish(&self, succeeded: usize, failed: usize, total: usize) {
        tracing::info!(succeeded, failed, total, "download complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn preferred_closes_use_adjusted_when_present() {
        let series = PriceSeries {
            dates: vec![d(2), d(3)],
            close: vec![Some(10.0), Some(11.0)],
            adj_close: Some(vec![Some(9.5), None]),
        };
        assert_eq!(series.preferred_closes(), vec![Some(9.5), None]);
    }

    #[test]
    fn preferred_closes_fall_back_to_close() {
        let series = PriceSeries {
            dates: vec![d(2), d(3)],
            close: vec![Some(10.0), Some(f64::NAN)],
            adj_close: None,
        };
        assert_eq!(series.preferred_closes(), vec![Some(10.0), None]);
    }

    fn ok(days: &[u32]) -> Result<PriceSeries, DataError> {
        Ok(PriceSeries {
            dates: days.iter().map(|&day| d(day)).collect(),
            close: days.iter().map(|_| Some(1.0)).collect(),
            adj_close: None,
        })
    }

    fn not_found(symbol: &str) -> Result<PriceSeries, DataError> {
        Err(DataError::SymbolNotFound {
            symbol: symbol.into(),
        })
    }

    #[test]
    fn unknown_lone_symbol_is_an_empty_series_not_an_error() {
        let response =
            BatchResponse::from_symbol_results(vec![("GONE.NS".into(), not_found("GONE.NS"))])
                .unwrap();
        assert_eq!(response, BatchResponse::Single(PriceSeries::default()));
    }

    #[test]
    fn unknown_symbols_in_a_table_keep_their_slot() {
        let response = BatchResponse::from_symbol_results(vec![
            ("A.NS".into(), not_found("A.NS")),
            ("B.NS".into(), not_found("B.NS")),
        ])
        .unwrap();
        assert_eq!(
            response,
            BatchResponse::Multi(vec![("A.NS".into(), None), ("B.NS".into(), None)])
        );
    }

    #[test]
    fn request_failures_fail_the_batch_only_without_any_data() {
        let rate_limited = || Err(DataError::RateLimited { retry_after_secs: 1 });

        let err = BatchResponse::from_symbol_results(vec![
            ("A.NS".into(), rate_limited()),
            ("B.NS".into(), not_found("B.NS")),
        ])
        .unwrap_err();
        assert!(matches!(err, DataError::RateLimited { .. }));

        let lone = BatchResponse::from_symbol_results(vec![("A.NS".into(), rate_limited())]);
        assert!(lone.is_err());

        let partial = BatchResponse::from_symbol_results(vec![
            ("A.NS".into(), rate_limited()),
            ("B.NS".into(), ok(&[2, 3])),
        ])
        .unwrap();
        match partial {
            BatchResponse::Multi(table) => {
                assert!(table[0].1.is_none());
                assert_eq!(table[1].1.as_ref().map(|s| s.dates.len()), Some(2));
            }
            other => panic!("expected a table, got {other:?}"),
        }
    }

    #[test]
    fn short_value_vectors_read_as_missing() {
        let series = PriceSeries {
            dates: vec![d(2), d(3), d(4)],
            close: vec![Some(10.0)],
            adj_close: None,
        };
        assert_eq!(series.preferred_closes(), vec![Some(10.0), None, None]);
    }
}
