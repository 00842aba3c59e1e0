//! Download orchestrator: batched fetch of a wide closing-price panel.
//!
//! The universe is split into fixed-size batches, one provider request per
//! batch. A failed batch is logged and skipped after a backoff pause; the
//! panel is the outer join of every batch that succeeded. Only a run where
//! nothing came back is an error.

use super::align::align_batch;
use super::provider::{DataError, DataProvider, FetchProgress};
use super::universe::Universe;
use crate::config::FetchConfig;
use crate::panel::PricePanel;
use chrono::{Duration, NaiveDate};

/// A batch that produced no data.
#[derive(Debug)]
pub struct BatchFailure {
    pub index: usize,
    pub symbols: Vec<String>,
    pub error: DataError,
}

/// Summary of a batched download.
#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub total_batches: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<BatchFailure>,
}

impl DownloadSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// The merged panel plus what happened along the way.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub panel: PricePanel,
    pub summary: DownloadSummary,
}

/// Date range covering `years` of history up to and including `today`.
///
/// The end is one day past `today` so the latest session is included.
pub fn history_range(today: NaiveDate, years: u32) -> (NaiveDate, NaiveDate) {
    let days = (f64::from(years) * 365.25).floor() as i64;
    (today - Duration::days(days), today + Duration::days(1))
}

/// Download closing prices for every symbol of the universe.
///
/// Returns [`DataError::NoData`] when every batch failed or the merged panel
/// has no rows.
pub fn download_panel(
    provider: &dyn DataProvider,
    universe: &Universe,
    start: NaiveDate,
    end: NaiveDate,
    config: &FetchConfig,
    progress: &dyn FetchProgress,
) -> Result<DownloadOutcome, DataError> {
    let batches: Vec<&[String]> = universe
        .provider_symbols()
        .chunks(config.batch_size.max(1))
        .collect();
    let total = batches.len();
    let mut summary = DownloadSummary {
        total_batches: total,
        ..DownloadSummary::default()
    };
    let mut parts = Vec::with_capacity(total);

    tracing::info!(
        provider = provider.name(),
        symbols = universe.len(),
        batches = total,
        %start,
        %end,
        "starting download"
    );

    for (index, batch) in batches.iter().enumerate() {
        progress.on_batch_start(index, total, batch);

        let result = provider
            .fetch_batch(batch, start, end)
            .and_then(|response| {
                align_batch(response, batch, universe)
                    .map_err(|e| DataError::ResponseFormatChanged(e.to_string()))
            });
        progress.on_batch_complete(
            index,
            total,
            batch,
            result.as_ref().map(PricePanel::n_symbols),
        );

        let failed = match result {
            Ok(slice) => {
                summary.succeeded += 1;
                parts.push(slice);
                false
            }
            Err(error) => {
                summary.failed += 1;
                summary.failures.push(BatchFailure {
                    index,
                    symbols: batch.to_vec(),
                    error,
                });
                true
            }
        };

        let is_last = index + 1 == total;
        if failed && !provider.is_available() && !is_last {
            tracing::warn!(
                remaining = total - index - 1,
                "provider unavailable, skipping remaining batches"
            );
            for (skipped, rest) in batches.iter().enumerate().skip(index + 1) {
                summary.failed += 1;
                summary.failures.push(BatchFailure {
                    index: skipped,
                    symbols: rest.to_vec(),
                    error: DataError::CircuitBreakerTripped,
                });
            }
            break;
        }
        if !is_last {
            let pause = if failed {
                config.failure_pause()
            } else {
                config.pause()
            };
            std::thread::sleep(pause);
        }
    }

    progress.on_finish(summary.succeeded, summary.failed, total);

    if parts.is_empty() {
        return Err(DataError::NoData(format!(
            "all {total} batch(es) failed"
        )));
    }
    let panel = PricePanel::outer_join(parts);
    if panel.is_empty() {
        return Err(DataError::NoData("merged panel has no rows".into()));
    }

    tracing::info!(
        rows = panel.n_rows(),
        columns = panel.n_symbols(),
        failed_batches = summary.failed,
        "panel assembled"
    );
    Ok(DownloadOutcome { panel, summary })
}
