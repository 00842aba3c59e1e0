//! Batch response normalization.
//!
//! Turns either provider response shape into a panel slice keyed by original
//! symbol, on the union of the dates the batch returned. Missing cells stay
//! missing; prices are never forward-filled.

use super::provider::{BatchResponse, PriceSeries};
use super::universe::Universe;
use crate::panel::{PanelError, PricePanel};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

/// Normalize one batch response into a column-per-original-symbol slice.
///
/// `batch` is the list of provider symbols the request was issued for; a
/// `Single` response belongs to its first entry. Columns are named with the
/// original spelling when the universe knows the provider symbol, else the
/// provider symbol itself.
pub fn align_batch(
    response: BatchResponse,
    batch: &[String],
    universe: &Universe,
) -> Result<PricePanel, PanelError> {
    let named: Vec<(String, Option<PriceSeries>)> = match response {
        BatchResponse::Single(series) => {
            let symbol = batch.first().cloned().unwrap_or_default();
            vec![(symbol, Some(series))]
        }
        BatchResponse::Multi(table) => table,
    };

    let dates: Vec<NaiveDate> = named
        .iter()
        .filter_map(|(_, series)| series.as_ref())
        .flat_map(|series| series.dates.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let row_of: HashMap<NaiveDate, usize> =
        dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

    let mut symbols = Vec::with_capacity(named.len());
    let mut columns = Vec::with_capacity(named.len());
    for (provider_symbol, series) in named {
        let mut column = vec![None; dates.len()];
        if let Some(series) = series {
            for (date, value) in series.dates.iter().zip(series.preferred_closes()) {
                column[row_of[date]] = value;
            }
        }
        let original = universe
            .original_for(&provider_symbol)
            .map(str::to_string)
            .unwrap_or(provider_symbol);
        symbols.push(original);
        columns.push(column);
    }

    PricePanel::new(dates, symbols, columns)
}
