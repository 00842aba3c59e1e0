//! Wide price panel: one row per trading date, one column per symbol.
//!
//! Invariants held by every `PricePanel`:
//! - dates are sorted ascending (stable with respect to input order)
//! - symbol names are unique (first occurrence wins)
//! - every column has exactly one cell per date
//! - a cell is either a number or missing; NaN is never stored

use crate::fingerprint::DatasetHash;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

/// Name of the date axis in panel CSV files.
pub const DATE_COLUMN: &str = "Date";

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("panel CSV has no header row")]
    MissingHeader,

    #[error("panel shape mismatch: {0}")]
    Shape(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricePanel {
    dates: Vec<NaiveDate>,
    symbols: Vec<String>,
    columns: Vec<Vec<Option<f64>>>,
}

impl PricePanel {
    /// Build a panel from column-major data.
    ///
    /// Rows are stably sorted by date, duplicate symbols keep their first
    /// column, and NaN cells become missing.
    pub fn new(
        dates: Vec<NaiveDate>,
        symbols: Vec<String>,
        columns: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, PanelError> {
        if symbols.len() != columns.len() {
            return Err(PanelError::Shape(format!(
                "{} symbols but {} columns",
                symbols.len(),
                columns.len()
            )));
        }
        if let Some((symbol, column)) = symbols
            .iter()
            .zip(&columns)
            .find(|(_, c)| c.len() != dates.len())
        {
            return Err(PanelError::Shape(format!(
                "column '{symbol}' has {} cells for {} dates",
                column.len(),
                dates.len()
            )));
        }

        let mut seen = HashSet::new();
        let mut kept_symbols = Vec::with_capacity(symbols.len());
        let mut kept_columns = Vec::with_capacity(columns.len());
        for (symbol, column) in symbols.into_iter().zip(columns) {
            if !seen.insert(symbol.clone()) {
                tracing::warn!(%symbol, "duplicate column dropped, keeping first occurrence");
                continue;
            }
            kept_symbols.push(symbol);
            kept_columns.push(
                column
                    .into_iter()
                    .map(|v| v.filter(|x| !x.is_nan()))
                    .collect::<Vec<_>>(),
            );
        }

        let mut order: Vec<usize> = (0..dates.len()).collect();
        order.sort_by_key(|&i| dates[i]);
        let (dates, columns) = if order.iter().enumerate().all(|(pos, &i)| pos == i) {
            (dates, kept_columns)
        } else {
            let dates = order.iter().map(|&i| dates[i]).collect();
            let columns = kept_columns
                .iter()
                .map(|c| order.iter().map(|&i| c[i]).collect())
                .collect();
            (dates, columns)
        };

        Ok(Self {
            dates,
            symbols: kept_symbols,
            columns,
        })
    }

    /// A panel with no rows and no columns.
    pub fn empty() -> Self {
        Self {
            dates: Vec::new(),
            symbols: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn columns(&self) -> &[Vec<Option<f64>>] {
        &self.columns
    }

    /// Prices for one symbol, aligned with [`dates`](Self::dates).
    pub fn column(&self, symbol: &str) -> Option<&[Option<f64>]> {
        self.symbols
            .iter()
            .position(|s| s == symbol)
            .map(|i| self.columns[i].as_slice())
    }

    pub fn value(&self, row: usize, symbol: &str) -> Option<f64> {
        self.column(symbol).and_then(|c| c.get(row).copied().flatten())
    }

    pub fn n_rows(&self) -> usize {
        self.dates.len()
    }

    pub fn n_symbols(&self) -> usize {
        self.symbols.len()
    }

    /// True when the panel has no rows.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Append a column; fails if the symbol already exists or the length is wrong.
    pub fn push_column(
        &mut self,
        symbol: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<(), PanelError> {
        let symbol = symbol.into();
        if self.symbols.contains(&symbol) {
            return Err(PanelError::Shape(format!("column '{symbol}' already exists")));
        }
        if values.len() != self.dates.len() {
            return Err(PanelError::Shape(format!(
                "column '{symbol}' has {} cells for {} dates",
                values.len(),
                self.dates.len()
            )));
        }
        self.symbols.push(symbol);
        self.columns
            .push(values.into_iter().map(|v| v.filter(|x| !x.is_nan())).collect());
        Ok(())
    }

    /// Outer join on date: union of dates, union of columns in part order.
    ///
    /// A symbol that appears in more than one part keeps the first part's column.
    pub fn outer_join<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = PricePanel>,
    {
        let parts: Vec<PricePanel> = parts.into_iter().collect();
        let dates: Vec<NaiveDate> = parts
            .iter()
            .flat_map(|p| p.dates.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let row_of: HashMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        let mut seen = HashSet::new();
        let mut symbols = Vec::new();
        let mut columns = Vec::new();
        for part in parts {
            for (symbol, column) in part.symbols.into_iter().zip(part.columns) {
                if !seen.insert(symbol.clone()) {
                    tracing::warn!(%symbol, "duplicate column dropped, keeping first occurrence");
                    continue;
                }
                let mut aligned = vec![None; dates.len()];
                for (date, value) in part.dates.iter().zip(column) {
                    aligned[row_of[date]] = value;
                }
                symbols.push(symbol);
                columns.push(aligned);
            }
        }

        Self {
            dates,
            symbols,
            columns,
        }
    }

    /// Load a panel from a CSV file. See [`from_reader`](Self::from_reader).
    pub fn read_csv(path: &Path) -> Result<Self, PanelError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Load a panel from CSV.
    ///
    /// The date axis is the `Date` column if present, otherwise the first
    /// column. Rows whose date does not parse are dropped; cells that are
    /// blank or not numeric become missing.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PanelError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        if headers.is_empty() {
            return Err(PanelError::MissingHeader);
        }
        let date_idx = headers
            .iter()
            .position(|h| h.trim() == DATE_COLUMN)
            .unwrap_or(0);

        let mut symbols = Vec::new();
        let mut source_idx = Vec::new();
        for (i, header) in headers.iter().enumerate() {
            if i != date_idx {
                symbols.push(header.trim().to_string());
                source_idx.push(i);
            }
        }

        let mut dates = Vec::new();
        let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::new(); symbols.len()];
        let mut dropped = 0usize;
        for record in rdr.records() {
            let record = record?;
            let Some(date) = record.get(date_idx).and_then(parse_date) else {
                dropped += 1;
                continue;
            };
            dates.push(date);
            for (column, &i) in columns.iter_mut().zip(&source_idx) {
                column.push(record.get(i).and_then(parse_price));
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped, "rows with unparseable dates dropped");
        }

        Self::new(dates, symbols, columns)
    }

    /// Write the panel as CSV to a file.
    pub fn write_csv(&self, path: &Path) -> Result<(), PanelError> {
        let file = std::fs::File::create(path)?;
        self.to_writer(std::io::BufWriter::new(file))
    }

    /// Write the panel as CSV: `Date` then one column per symbol, missing cells empty.
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), PanelError> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = Vec::with_capacity(self.symbols.len() + 1);
        header.push(DATE_COLUMN);
        header.extend(self.symbols.iter().map(String::as_str));
        wtr.write_record(&header)?;

        for (row, date) in self.dates.iter().enumerate() {
            let mut record = Vec::with_capacity(self.symbols.len() + 1);
            record.push(date.format("%Y-%m-%d").to_string());
            for column in &self.columns {
                record.push(column[row].map(|v| v.to_string()).unwrap_or_default());
            }
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Content hash over dates, symbols and values (bit-exact).
    pub fn fingerprint(&self) -> DatasetHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.dates.len() as u64).to_le_bytes());
        for date in &self.dates {
            hasher.update(date.format("%Y-%m-%d").to_string().as_bytes());
        }
        for (symbol, column) in self.symbols.iter().zip(&self.columns) {
            hasher.update(symbol.as_bytes());
            hasher.update(&[0]);
            for value in column {
                match value {
                    Some(v) => {
                        hasher.update(&[1]);
                        hasher.update(&v.to_bits().to_le_bytes());
                    }
                    None => {
                        hasher.update(&[0]);
                    }
                }
            }
        }
        DatasetHash::from_hash(hasher.finalize().to_hex().as_str())
    }
}

/// Parse a date cell. Accepts ISO dates with or without a time part and UTC
/// offset, RFC 3339, `YYYY/MM/DD` and `MM/DD/YYYY`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.date_naive());
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Parse a price cell; blank, non-numeric and NaN cells are missing.
pub fn parse_price(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_supported_date_spellings() {
        let expected = Some(d(2024, 3, 5));
        assert_eq!(parse_date("2024-03-05"), expected);
        assert_eq!(parse_date(" 2024-03-05 00:00:00 "), expected);
        assert_eq!(parse_date("2024-03-05T09:15:00"), expected);
        assert_eq!(parse_date("2024-03-05 00:00:00+05:30"), expected);
        assert_eq!(parse_date("2024-03-05T00:00:00+05:30"), expected);
        assert_eq!(parse_date("2024/03/05"), expected);
        assert_eq!(parse_date("03/05/2024"), expected);
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn parses_prices_leniently() {
        assert_eq!(parse_price(" 101.5 "), Some(101.5));
        assert_eq!(parse_price("1e2"), Some(100.0));
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("n/a"), None);
        assert_eq!(parse_price("NaN"), None);
    }

    #[test]
    fn new_sorts_rows_and_drops_duplicate_symbols() {
        let panel = PricePanel::new(
            vec![d(2024, 1, 3), d(2024, 1, 2)],
            vec!["A".into(), "B".into(), "A".into()],
            vec![
                vec![Some(2.0), Some(1.0)],
                vec![None, Some(f64::NAN)],
                vec![Some(9.0), Some(9.0)],
            ],
        )
        .unwrap();
        assert_eq!(panel.dates(), [d(2024, 1, 2), d(2024, 1, 3)]);
        assert_eq!(panel.symbols(), ["A", "B"]);
        assert_eq!(panel.column("A").unwrap(), [Some(1.0), Some(2.0)]);
        assert_eq!(panel.column("B").unwrap(), [None, None]);
    }

    #[test]
    fn new_rejects_ragged_columns() {
        let err = PricePanel::new(vec![d(2024, 1, 2)], vec!["A".into()], vec![vec![]]).unwrap_err();
        assert!(matches!(err, PanelError::Shape(_)));
    }

    #[test]
    fn reads_csv_with_date_column_not_first() {
        let csv = "A,Date,B\n1.0,2024-01-03,x\n2.0,garbage,3\n,2024-01-02,4.5\n";
        let panel = PricePanel::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(panel.symbols(), ["A", "B"]);
        assert_eq!(panel.dates(), [d(2024, 1, 2), d(2024, 1, 3)]);
        assert_eq!(panel.column("A").unwrap(), [None, Some(1.0)]);
        assert_eq!(panel.column("B").unwrap(), [Some(4.5), None]);
    }

    #[test]
    fn first_column_is_the_date_axis_without_date_header() {
        let csv = "when,X\n2024-01-02,10\n2024-01-03,11\n";
        let panel = PricePanel::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(panel.symbols(), ["X"]);
        assert_eq!(panel.n_rows(), 2);
    }

    #[test]
    fn short_rows_read_as_missing() {
        let csv = "Date,A,B\n2024-01-02,1\n";
        let panel = PricePanel::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(panel.value(0, "A"), Some(1.0));
        assert_eq!(panel.value(0, "B"), None);
    }

    #[test]
    fn empty_input_has_no_header() {
        let err = PricePanel::from_reader("".as_bytes()).unwrap_err();
        assert!(matches!(err, PanelError::MissingHeader));
    }

    #[test]
    fn csv_roundtrip_preserves_values() {
        let panel = PricePanel::new(
            vec![d(2024, 1, 2), d(2024, 1, 3)],
            vec!["RELIANCE".into(), "TCS".into()],
            vec![vec![Some(2901.35), None], vec![Some(3890.0), Some(3902.25)]],
        )
        .unwrap();
        let mut buf = Vec::new();
        panel.to_writer(&mut buf).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("Date,RELIANCE,TCS\n2024-01-02,2901.35,3890\n"));
        let back = PricePanel::from_reader(buf.as_slice()).unwrap();
        assert_eq!(back, panel);
    }

    #[test]
    fn outer_join_unions_dates_and_keeps_first_duplicate() {
        let a = PricePanel::new(
            vec![d(2024, 1, 2), d(2024, 1, 3)],
            vec!["A".into()],
            vec![vec![Some(1.0), Some(2.0)]],
        )
        .unwrap();
        let b = PricePanel::new(
            vec![d(2024, 1, 3), d(2024, 1, 4)],
            vec!["B".into(), "A".into()],
            vec![vec![Some(5.0), Some(6.0)], vec![Some(99.0), Some(99.0)]],
        )
        .unwrap();
        let joined = PricePanel::outer_join([a, b]);
        assert_eq!(joined.dates(), [d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 4)]);
        assert_eq!(joined.symbols(), ["A", "B"]);
        assert_eq!(joined.column("A").unwrap(), [Some(1.0), Some(2.0), None]);
        assert_eq!(joined.column("B").unwrap(), [None, Some(5.0), Some(6.0)]);
    }

    #[test]
    fn push_column_checks_shape() {
        let mut panel =
            PricePanel::new(vec![d(2024, 1, 2)], vec!["A".into()], vec![vec![Some(1.0)]]).unwrap();
        assert!(panel.push_column("A", vec![None]).is_err());
        assert!(panel.push_column("B", vec![None, None]).is_err());
        panel.push_column("B", vec![None]).unwrap();
        assert_eq!(panel.n_symbols(), 2);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = PricePanel::new(vec![d(2024, 1, 2)], vec!["A".into()], vec![vec![Some(1.0)]]).unwrap();
        let b = PricePanel::new(vec![d(2024, 1, 2)], vec!["A".into()], vec![vec![Some(1.5)]]).unwrap();
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
