//! Breadth Report: persisted outputs of a breadth run.
//!
//! This crate builds on `breadth-core` to provide:
//! - The result CSV artifact (write and read back)
//! - A JSON run manifest written beside the result
//! - An SVG line chart of the breadth series

pub mod artifact;
pub mod chart;
pub mod manifest;

pub use artifact::{read_breadth_csv, write_breadth_csv};
pub use chart::{render_breadth_chart, ChartOptions};
pub use manifest::{manifest_path_for, read_manifest, write_manifest, RunManifest};

use thiserror::Error;

/// Errors from writing or reading report artifacts.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed breadth result at line {line}: {reason}")]
    Malformed { line: u64, reason: String },

    #[error("nothing to plot: the breadth result has no rows")]
    EmptyResult,

    #[error("chart rendering failed: {0}")]
    Chart(String),
}
