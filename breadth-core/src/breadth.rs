//! Breadth engine: share of the universe trading above its level N rows ago.
//!
//! The lookback is a row offset into the date-sorted panel, never a calendar
//! offset: with `lookback_rows = 20`, row `t` is compared with row `t - 20`
//! whatever the dates in between. Weekends and exchange holidays therefore
//! never shift the comparison.
//!
//! For each row:
//! - a symbol is *available* when both the current and the lookback price exist
//! - a symbol is *positive* when available and the current price is strictly higher
//! - `coverage = available / total_stocks`, `breadth_pct = 100 * positive / available`
//!
//! Rows with no available symbol, or with coverage below `min_coverage`, are
//! dropped from the result.

use crate::config::BreadthConfig;
use crate::panel::PricePanel;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Unfiltered per-row tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCounts {
    pub date: NaiveDate,
    pub positive: usize,
    pub available: usize,
}

/// One qualifying day of the breadth series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreadthRow {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    pub breadth_pct: f64,
    pub positive_stocks: usize,
    pub available_stocks: usize,
    pub coverage: f64,
    pub total_stocks: usize,
}

/// Output of one engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct BreadthReport {
    /// Retained rows, ascending by date.
    pub rows: Vec<BreadthRow>,
    /// Panel rows the engine looked at.
    pub evaluated_rows: usize,
    /// Column count of the panel.
    pub total_stocks: usize,
    pub config: BreadthConfig,
}

impl BreadthReport {
    /// Rows excluded by the availability/coverage filter.
    pub fn dropped_rows(&self) -> usize {
        self.evaluated_rows - self.rows.len()
    }

    pub fn latest(&self) -> Option<&BreadthRow> {
        self.rows.last()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Count available and positive symbols for every row of the panel.
///
/// The first `lookback_rows` rows have no comparison row and report zero for both.
pub fn row_counts(panel: &PricePanel, lookback_rows: usize) -> Vec<RowCounts> {
    let n = panel.n_rows();
    let mut positive = vec![0usize; n];
    let mut available = vec![0usize; n];

    for column in panel.columns() {
        for t in lookback_rows..n {
            if let (Some(now), Some(then)) = (column[t], column[t - lookback_rows]) {
                available[t] += 1;
                if now > then {
                    positive[t] += 1;
                }
            }
        }
    }

    panel
        .dates()
        .iter()
        .zip(positive.into_iter().zip(available))
        .map(|(&date, (positive, available))| RowCounts {
            date,
            positive,
            available,
        })
        .collect()
}

/// Compute the breadth series for a panel.
///
/// Pure function of its inputs: the same panel and config always give the
/// same report. A panel without columns yields an empty report.
pub fn compute_breadth(panel: &PricePanel, config: &BreadthConfig) -> BreadthReport {
    let total_stocks = panel.n_symbols();
    let evaluated_rows = panel.n_rows();

    let rows = if total_stocks == 0 {
        Vec::new()
    } else {
        row_counts(panel, config.lookback_rows)
            .into_iter()
            .filter_map(|counts| qualify(counts, total_stocks, config.min_coverage))
            .collect()
    };

    let report = BreadthReport {
        rows,
        evaluated_rows,
        total_stocks,
        config: config.clone(),
    };
    tracing::info!(
        evaluated = report.evaluated_rows,
        retained = report.rows.len(),
        dropped = report.dropped_rows(),
        total_stocks,
        lookback_rows = config.lookback_rows,
        min_coverage = config.min_coverage,
        "breadth computed"
    );
    report
}

fn qualify(counts: RowCounts, total_stocks: usize, min_coverage: f64) -> Option<BreadthRow> {
    if counts.available == 0 {
        return None;
    }
    let coverage = counts.available as f64 / total_stocks as f64;
    if coverage < min_coverage {
        return None;
    }
    Some(BreadthRow {
        date: counts.date,
        breadth_pct: (counts.positive as f64 / counts.available as f64) * 100.0,
        positive_stocks: counts.positive,
        available_stocks: counts.available,
        coverage,
        total_stocks,
    })
}
