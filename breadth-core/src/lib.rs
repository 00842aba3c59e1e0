//! Breadth Core: price panel, breadth engine, configuration and data fetching.
//!
//! This crate contains:
//! - The wide date × symbol price panel and its CSV format
//! - The breadth engine (row-offset lookback, coverage filter)
//! - Run configuration shared by the fetcher and the engine
//! - Symbol normalization, the Yahoo provider and the batched downloader

pub mod breadth;
pub mod config;
pub mod data;
pub mod fingerprint;
pub mod panel;

pub use breadth::{compute_breadth, row_counts, BreadthReport, BreadthRow, RowCounts};
pub use config::{AppConfig, BreadthConfig, ConfigError, FetchConfig};
pub use fingerprint::DatasetHash;
pub use panel::{PanelError, PricePanel, DATE_COLUMN};
