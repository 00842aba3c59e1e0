//! Breadth result CSV export and import.
//!
//! Columns are [`RESULT_HEADER`], one row per retained date.

use crate::ReportError;
use breadth_core::panel::parse_date;
use breadth_core::BreadthRow;
use serde::Deserialize;
use std::io::{Read, Write};
use std::path::Path;

pub const RESULT_HEADER: [&str; 6] = [
    "Date",
    "breadth_pct",
    "positive_stocks",
    "available_stocks",
    "coverage",
    "total_stocks",
];

/// Result row as it appears on disk; older files may lack `total_stocks`.
#[derive(Debug, Deserialize)]
struct StoredRow {
    #[serde(rename = "Date", alias = "date")]
    date: String,
    breadth_pct: f64,
    positive_stocks: usize,
    available_stocks: usize,
    coverage: f64,
    #[serde(default)]
    total_stocks: Option<usize>,
}

pub fn write_breadth_csv(path: &Path, rows: &[BreadthRow]) -> Result<(), ReportError> {
    let file = std::fs::File::create(path)?;
    write_breadth(file, rows)?;
    tracing::info!(path = %path.display(), rows = rows.len(), "breadth result written");
    Ok(())
}

pub fn write_breadth<W: Write>(writer: W, rows: &[BreadthRow]) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    // serde only emits the header alongside the first row
    if rows.is_empty() {
        wtr.write_record(RESULT_HEADER)?;
    }
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_breadth_csv(path: &Path) -> Result<Vec<BreadthRow>, ReportError> {
    let file = std::fs::File::open(path)?;
    read_breadth(file)
}

/// Parse a breadth result.
///
/// A missing `total_stocks` is recovered from `available_stocks / coverage`.
pub fn read_breadth<R: Read>(reader: R) -> Result<Vec<BreadthRow>, ReportError> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());
        let stored: StoredRow = record.deserialize(Some(&headers))?;

        let date = parse_date(&stored.date).ok_or_else(|| ReportError::Malformed {
            line,
            reason: format!("unparseable date '{}'", stored.date),
        })?;
        if stored.positive_stocks > stored.available_stocks {
            return Err(ReportError::Malformed {
                line,
                reason: "positive_stocks exceeds available_stocks".into(),
            });
        }
        let total_stocks = stored.total_stocks.unwrap_or_else(|| {
            if stored.coverage > 0.0 {
                (stored.available_stocks as f64 / stored.coverage).round() as usize
            } else {
                stored.available_stocks
            }
        });

        rows.push(BreadthRow {
            date,
            breadth_pct: stored.breadth_pct,
            positive_stocks: stored.positive_stocks,
            available_stocks: stored.available_stocks,
            coverage: stored.coverage,
            total_stocks,
        });
    }
    Ok(rows)
}
