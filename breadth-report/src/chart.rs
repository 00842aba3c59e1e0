//! SVG line chart of the breadth series.

use crate::ReportError;
use breadth_core::BreadthRow;
use chrono::{Datelike, Months, NaiveDate};
use plotters::coord::ranged1d::{DefaultFormatting, KeyPointHint, Ranged};
use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;

/// Chart appearance.
#[derive(Debug, Clone)]
pub struct ChartOptions {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl ChartOptions {
    /// Default title naming the lookback window.
    pub fn for_lookback(lookback_rows: usize) -> Self {
        Self {
            title: format!("Sentiment Breadth: % of stocks above their {lookback_rows}-day-ago close"),
            ..Self::default()
        }
    }
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: "Sentiment Breadth".into(),
            width: 1200,
            height: 600,
        }
    }
}

fn day_number(date: NaiveDate) -> i32 {
    date.num_days_from_ce()
}

fn format_day(day: &i32) -> String {
    NaiveDate::from_num_days_from_ce_opt(*day)
        .map(|d| d.format("%b %Y").to_string())
        .unwrap_or_default()
}

/// Month starts in `[first, last]` whose zero-based month is a multiple of
/// `step`, so a step of 2 gives Jan, Mar, May and so on.
fn month_ticks(first: i32, last: i32, step: u32) -> Vec<i32> {
    let (Some(start), Some(end)) = (
        NaiveDate::from_num_days_from_ce_opt(first),
        NaiveDate::from_num_days_from_ce_opt(last),
    ) else {
        return Vec::new();
    };

    let mut ticks = Vec::new();
    let mut month = NaiveDate::from_ymd_opt(start.year(), start.month(), 1);
    while let Some(m) = month.filter(|m| *m <= end) {
        if m >= start && m.month0() % step == 0 {
            ticks.push(day_number(m));
        }
        month = m.checked_add_months(Months::new(1));
    }
    ticks
}

/// Day-number x axis whose ticks sit on month starts: labelled every second
/// month, grid lines every month.
struct MonthAxis {
    first: i32,
    last: i32,
}

impl Ranged for MonthAxis {
    type FormatOption = DefaultFormatting;
    type ValueType = i32;

    fn map(&self, value: &i32, limit: (i32, i32)) -> i32 {
        let span = f64::from(self.last - self.first).max(1.0);
        let frac = f64::from(*value - self.first) / span;
        limit.0 + (frac * f64::from(limit.1 - limit.0)).round() as i32
    }

    fn key_points<Hint: KeyPointHint>(&self, hint: Hint) -> Vec<i32> {
        let base = if hint.weight().allow_light_points() { 1 } else { 2 };
        let ticks = [base, 3, 6, 12]
            .into_iter()
            .filter(|&step| step >= base)
            .map(|step| month_ticks(self.first, self.last, step))
            .find(|ticks| ticks.len() <= hint.max_num_points())
            .unwrap_or_default();
        if ticks.is_empty() {
            vec![self.first]
        } else {
            ticks
        }
    }

    fn range(&self) -> Range<i32> {
        self.first..self.last
    }
}

/// Draw `breadth_pct` over date into an SVG file.
///
/// The y-axis is fixed to 0..100 so charts from different runs compare
/// directly. An empty series is an error.
pub fn render_breadth_chart(
    path: &Path,
    rows: &[BreadthRow],
    options: &ChartOptions,
) -> Result<(), ReportError> {
    let days = rows.iter().map(|r| day_number(r.date));
    let (first, last) = match (days.clone().min(), days.max()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(ReportError::EmptyResult),
    };
    let x_axis = MonthAxis {
        first,
        last: last.max(first + 1),
    };

    let root = SVGBackend::new(path, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(&options.title, ("sans-serif", 24).into_font())
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_axis, 0.0..100.0)
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .y_labels(11)
        .x_label_formatter(&format_day)
        .y_desc("% of stocks")
        .light_line_style(&RGBColor(235, 235, 235))
        .draw()
        .map_err(chart_err)?;

    chart
        .draw_series(LineSeries::new(
            rows.iter().map(|r| (day_number(r.date), r.breadth_pct)),
            BLUE.stroke_width(2),
        ))
        .map_err(chart_err)?;

    root.present().map_err(chart_err)?;
    tracing::info!(path = %path.display(), points = rows.len(), "breadth chart rendered");
    Ok(())
}

fn chart_err<E: std::fmt::Display>(e: E) -> ReportError {
    ReportError::Chart(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_labels_show_month_and_year() {
        let day = day_number(NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        assert_eq!(format_day(&day), "Mar 2025");
    }

    fn day(y: i32, m: u32, d: u32) -> i32 {
        day_number(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn ticks_sit_on_month_starts() {
        let (first, last) = (day(2024, 1, 10), day(2024, 6, 20));
        assert_eq!(
            month_ticks(first, last, 2),
            [day(2024, 3, 1), day(2024, 5, 1)]
        );
        assert_eq!(
            month_ticks(first, last, 1),
            [
                day(2024, 2, 1),
                day(2024, 3, 1),
                day(2024, 4, 1),
                day(2024, 5, 1),
                day(2024, 6, 1),
            ]
        );
        let labels: Vec<String> = month_ticks(first, last, 2).iter().map(format_day).collect();
        assert_eq!(labels, ["Mar 2024", "May 2024"]);
    }

    #[test]
    fn ticks_cross_year_boundaries() {
        let ticks = month_ticks(day(2024, 11, 1), day(2025, 2, 28), 2);
        assert_eq!(ticks, [day(2024, 11, 1), day(2025, 1, 1)]);
    }

    #[test]
    fn axis_maps_range_ends_to_pixel_limits() {
        let axis = MonthAxis {
            first: day(2024, 1, 1),
            last: day(2024, 1, 11),
        };
        assert_eq!(axis.map(&axis.first, (0, 100)), 0);
        assert_eq!(axis.map(&day(2024, 1, 6), (0, 100)), 50);
        assert_eq!(axis.map(&axis.last, (0, 100)), 100);
    }

    #[test]
    fn chart_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("breadth.svg");
        let rows: Vec<BreadthRow> = (0..90)
            .map(|i| BreadthRow {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i),
                breadth_pct: 50.0,
                positive_stocks: 1,
                available_stocks: 2,
                total_stocks: 2,
                coverage: 1.0,
            })
            .collect();
        render_breadth_chart(&path, &rows, &ChartOptions::default()).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn title_names_the_lookback() {
        assert!(ChartOptions::for_lookback(20).title.contains("20-day"));
    }

    #[test]
    fn empty_series_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.svg");
        let err = render_breadth_chart(&path, &[], &ChartOptions::default()).unwrap_err();
        assert!(matches!(err, ReportError::EmptyResult));
        assert!(!path.exists());
    }
}
