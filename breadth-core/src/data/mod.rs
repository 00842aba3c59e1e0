//! Price panel fetching: symbol universe, providers, batched download.

pub mod align;
pub mod circuit_breaker;
pub mod download;
pub mod provider;
pub mod universe;
pub mod yahoo;

pub use align::align_batch;
pub use circuit_breaker::CircuitBreaker;
pub use download::{download_panel, history_range, BatchFailure, DownloadOutcome, DownloadSummary};
pub use provider::{
    BatchResponse, DataError, DataProvider, FetchProgress, PriceSeries, TracingProgress,
};
pub use universe::{normalize_symbol, read_symbols_csv, Universe};
pub use yahoo::YahooProvider;
