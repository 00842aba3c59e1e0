//! Run manifest export (JSON).
//!
//! The manifest sits next to the result CSV and records what produced it:
//! the dataset fingerprint, the breadth parameters and what the filter kept.

use crate::ReportError;
use breadth_core::{BreadthConfig, BreadthReport, BreadthRow, DatasetHash, PricePanel};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelShape {
    pub rows: usize,
    pub symbols: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowSummary {
    pub evaluated: usize,
    pub retained: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub dataset_hash: DatasetHash,
    pub breadth: BreadthConfig,
    pub panel: PanelShape,
    pub rows: RowSummary,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub latest: Option<BreadthRow>,
}

impl RunManifest {
    pub fn new(panel: &PricePanel, report: &BreadthReport) -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            generated_at: Utc::now(),
            dataset_hash: panel.fingerprint(),
            breadth: report.config.clone(),
            panel: PanelShape {
                rows: panel.n_rows(),
                symbols: panel.n_symbols(),
            },
            rows: RowSummary {
                evaluated: report.evaluated_rows,
                retained: report.rows.len(),
                dropped: report.dropped_rows(),
            },
            first_date: report.rows.first().map(|r| r.date),
            last_date: report.rows.last().map(|r| r.date),
            latest: report.latest().cloned(),
        }
    }
}

/// Manifest location for a result CSV: same stem, `.manifest.json` extension.
pub fn manifest_path_for(result_csv: &Path) -> PathBuf {
    result_csv.with_extension("manifest.json")
}

pub fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(path, json)?;
    tracing::info!(
        path = %path.display(),
        dataset = manifest.dataset_hash.short(),
        "run manifest written"
    );
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<RunManifest, ReportError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use breadth_core::compute_breadth;

    fn panel() -> PricePanel {
        let dates = (1..=4)
            .map(|d| NaiveDate::from_ymd_opt(2024, 4, d).unwrap())
            .collect();
        PricePanel::new(
            dates,
            vec!["A".into(), "B".into()],
            vec![
                vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)],
                vec![Some(4.0), Some(3.0), None, Some(1.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn manifest_summarises_the_run() {
        let panel = panel();
        let config = BreadthConfig {
            lookback_rows: 1,
            min_coverage: 0.8,
        };
        let report = compute_breadth(&panel, &config);
        let manifest = RunManifest::new(&panel, &report);

        assert_eq!(manifest.schema_version, MANIFEST_SCHEMA_VERSION);
        assert_eq!(manifest.panel, PanelShape { rows: 4, symbols: 2 });
        // Row 0 has no lookback; rows 2 and 3 lose B to the gap.
        assert_eq!(
            manifest.rows,
            RowSummary {
                evaluated: 4,
                retained: 1,
                dropped: 3
            }
        );
        assert_eq!(manifest.first_date, NaiveDate::from_ymd_opt(2024, 4, 2));
        assert_eq!(manifest.last_date, manifest.first_date);
        assert_eq!(manifest.latest.as_ref().map(|r| r.breadth_pct), Some(50.0));
        assert_eq!(manifest.dataset_hash, panel.fingerprint());
        assert_eq!(manifest.breadth, config);
    }

    #[test]
    fn manifest_sits_beside_the_result() {
        assert_eq!(
            manifest_path_for(Path::new("output/breadth_20d.csv")),
            PathBuf::from("output/breadth_20d.manifest.json")
        );
    }
}
