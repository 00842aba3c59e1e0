//! Breadth CLI: fetch prices, compute breadth, plot the series.
//!
//! Commands:
//! - `fetch`: download a wide closing-price panel from Yahoo Finance
//! - `compute`: compute the breadth series and write it with a run manifest
//! - `plot`: render a result CSV as an SVG chart
//! - `run`: compute then plot

use anyhow::{bail, Context, Result};
use breadth_core::data::{
    download_panel, history_range, read_symbols_csv, CircuitBreaker, TracingProgress, Universe,
    YahooProvider,
};
use breadth_core::{compute_breadth, AppConfig, BreadthReport, PricePanel};
use breadth_report::{
    manifest_path_for, read_breadth_csv, read_manifest, render_breadth_chart, write_breadth_csv,
    write_manifest, ChartOptions, RunManifest,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_SYMBOLS_CSV: &str = "data/nifty500/nifty500_symbols.csv";
const DEFAULT_PANEL_CSV: &str = "data/nifty500/close.csv";
const DEFAULT_RESULT_CSV: &str = "output/nifty500_sentiment_breadth_20d.csv";
const DEFAULT_CHART_SVG: &str = "images/nifty500_sentiment_breadth_20d.svg";

#[derive(Parser)]
#[command(
    name = "breadth",
    about = "Market breadth: share of a stock universe above its close N trading days ago"
)]
struct Cli {
    /// TOML config file; command-line flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download daily closes for every symbol in a CSV and save the panel.
    Fetch {
        /// CSV with a symbol/ticker column (first column otherwise).
        #[arg(long, default_value = DEFAULT_SYMBOLS_CSV)]
        symbols_csv: PathBuf,

        /// Where to write the wide closing-price panel.
        #[arg(long, default_value = DEFAULT_PANEL_CSV)]
        out_csv: PathBuf,

        /// Years of history to request.
        #[arg(long)]
        years: Option<u32>,

        /// Symbols per provider request.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Pause between requests, in seconds.
        #[arg(long)]
        pause_secs: Option<f64>,
    },
    /// Compute the breadth series from a price panel.
    Compute {
        #[command(flatten)]
        args: ComputeArgs,
    },
    /// Render a breadth result CSV as an SVG line chart.
    Plot {
        #[command(flatten)]
        args: PlotArgs,
    },
    /// Compute the breadth series, then plot it.
    Run {
        #[command(flatten)]
        compute: ComputeArgs,

        /// Where to write the SVG chart.
        #[arg(long, default_value = DEFAULT_CHART_SVG)]
        out: PathBuf,

        /// Chart title. Defaults to one naming the lookback window.
        #[arg(long)]
        title: Option<String>,
    },
}

#[derive(clap::Args)]
struct ComputeArgs {
    /// Wide closing-price panel (Date column plus one column per symbol).
    #[arg(long, default_value = DEFAULT_PANEL_CSV)]
    panel: PathBuf,

    /// Where to write the breadth result. The manifest goes beside it.
    #[arg(long, default_value = DEFAULT_RESULT_CSV)]
    out_csv: PathBuf,

    /// Lookback window in trading rows.
    #[arg(long)]
    lookback: Option<usize>,

    /// Minimum share of the universe with both prices, in [0, 1].
    #[arg(long)]
    min_coverage: Option<f64>,
}

#[derive(clap::Args)]
struct PlotArgs {
    /// Breadth result CSV.
    #[arg(long, default_value = DEFAULT_RESULT_CSV)]
    result: PathBuf,

    /// Where to write the SVG chart.
    #[arg(long, default_value = DEFAULT_CHART_SVG)]
    out: PathBuf,

    /// Chart title. Defaults to one naming the lookback window.
    #[arg(long)]
    title: Option<String>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Fetch {
            symbols_csv,
            out_csv,
            years,
            batch_size,
            pause_secs,
        } => {
            apply_fetch_overrides(&mut config, years, batch_size, pause_secs)?;
            run_fetch(&config, &symbols_csv, &out_csv)
        }
        Commands::Compute { args } => {
            apply_breadth_overrides(&mut config, args.lookback, args.min_coverage)?;
            run_compute(&config, &args.panel, &args.out_csv).map(|_| ())
        }
        Commands::Plot { args } => run_plot(&config, &args.result, &args.out, args.title),
        Commands::Run {
            compute,
            out,
            title,
        } => {
            apply_breadth_overrides(&mut config, compute.lookback, compute.min_coverage)?;
            let report = run_compute(&config, &compute.panel, &compute.out_csv)?;
            let options = chart_options(title, config.breadth.lookback_rows);
            plot_rows(&report.rows, &out, &options)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(AppConfig::default()),
    }
}

fn apply_fetch_overrides(
    config: &mut AppConfig,
    years: Option<u32>,
    batch_size: Option<usize>,
    pause_secs: Option<f64>,
) -> Result<()> {
    if let Some(years) = years {
        config.fetch.years = years;
    }
    if let Some(batch_size) = batch_size {
        config.fetch.batch_size = batch_size;
    }
    if let Some(pause_secs) = pause_secs {
        config.fetch.pause_secs = pause_secs;
    }
    config.fetch.validate().context("Invalid fetch settings")
}

fn apply_breadth_overrides(
    config: &mut AppConfig,
    lookback: Option<usize>,
    min_coverage: Option<f64>,
) -> Result<()> {
    if let Some(lookback) = lookback {
        config.breadth.lookback_rows = lookback;
    }
    if let Some(min_coverage) = min_coverage {
        config.breadth.min_coverage = min_coverage;
    }
    config.breadth.validate().context("Invalid breadth settings")
}

/// Create the parent directory of an output path if it has one.
fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display())),
        _ => Ok(()),
    }
}

fn run_fetch(config: &AppConfig, symbols_csv: &Path, out_csv: &Path) -> Result<()> {
    let symbols = read_symbols_csv(symbols_csv)?;
    let universe = Universe::from_symbols(symbols.as_slice(), &config.fetch);
    if universe.is_empty() {
        bail!("no usable symbols in {}", symbols_csv.display());
    }

    let (start, end) = history_range(chrono::Utc::now().date_naive(), config.fetch.years);
    let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
    let provider = YahooProvider::new(circuit_breaker)?;

    let outcome = download_panel(
        &provider,
        &universe,
        start,
        end,
        &config.fetch,
        &TracingProgress,
    )?;

    ensure_parent(out_csv)?;
    outcome
        .panel
        .write_csv(out_csv)
        .with_context(|| format!("Failed to write price panel {}", out_csv.display()))?;

    println!();
    println!("=== Price Panel ===");
    println!("Symbols requested: {}", universe.len());
    println!("Columns saved:     {}", outcome.panel.n_symbols());
    println!("Trading days:      {}", outcome.panel.n_rows());
    if let (Some(first), Some(last)) = (outcome.panel.dates().first(), outcome.panel.dates().last())
    {
        println!("Date range:        {first} to {last}");
    }
    println!(
        "Batches:           {} ok, {} failed of {}",
        outcome.summary.succeeded, outcome.summary.failed, outcome.summary.total_batches
    );
    println!("Saved to:          {}", out_csv.display());
    println!();
    println!("Last rows:");
    print!("{}", format_tail(&outcome.panel, 3, 5));
    Ok(())
}

/// The last `rows` rows of the panel as a small text table, limited to the
/// first `max_cols` symbols. Missing cells print as `-`.
fn format_tail(panel: &PricePanel, rows: usize, max_cols: usize) -> String {
    let shown = &panel.symbols()[..panel.n_symbols().min(max_cols)];
    let mut out = format!("{:<10}", "Date");
    for symbol in shown {
        out.push_str(&format!(" {symbol:>12}"));
    }
    if panel.n_symbols() > shown.len() {
        out.push_str(&format!(" (+{} more)", panel.n_symbols() - shown.len()));
    }
    out.push('\n');

    for row in panel.n_rows().saturating_sub(rows)..panel.n_rows() {
        out.push_str(&format!("{:<10}", panel.dates()[row].to_string()));
        for symbol in shown {
            match panel.value(row, symbol) {
                Some(v) => out.push_str(&format!(" {v:>12.2}")),
                None => out.push_str(&format!(" {:>12}", "-")),
            }
        }
        out.push('\n');
    }
    out
}

fn run_compute(config: &AppConfig, panel_csv: &Path, out_csv: &Path) -> Result<BreadthReport> {
    let panel = PricePanel::read_csv(panel_csv)
        .with_context(|| format!("Failed to read price panel {}", panel_csv.display()))?;
    let report = compute_breadth(&panel, &config.breadth);
    if report.is_empty() {
        tracing::warn!(
            rows = panel.n_rows(),
            symbols = panel.n_symbols(),
            "no row met the coverage threshold"
        );
    }

    ensure_parent(out_csv)?;
    write_breadth_csv(out_csv, &report.rows)
        .with_context(|| format!("Failed to write breadth result {}", out_csv.display()))?;
    let manifest_path = manifest_path_for(out_csv);
    write_manifest(&manifest_path, &RunManifest::new(&panel, &report))
        .with_context(|| format!("Failed to write manifest {}", manifest_path.display()))?;

    print_summary(&report, out_csv);
    Ok(report)
}

fn run_plot(config: &AppConfig, result: &Path, out: &Path, title: Option<String>) -> Result<()> {
    let rows = read_breadth_csv(result)
        .with_context(|| format!("Failed to read breadth result {}", result.display()))?;
    // The manifest knows the lookback the result was computed with.
    let lookback = read_manifest(&manifest_path_for(result))
        .map(|m| m.breadth.lookback_rows)
        .unwrap_or(config.breadth.lookback_rows);
    plot_rows(&rows, out, &chart_options(title, lookback))
}

fn chart_options(title: Option<String>, lookback_rows: usize) -> ChartOptions {
    let mut options = ChartOptions::for_lookback(lookback_rows);
    if let Some(title) = title {
        options.title = title;
    }
    options
}

fn plot_rows(rows: &[breadth_core::BreadthRow], out: &Path, options: &ChartOptions) -> Result<()> {
    ensure_parent(out)?;
    render_breadth_chart(out, rows, options)
        .with_context(|| format!("Failed to render chart {}", out.display()))?;
    println!("Chart saved to: {}", out.display());
    Ok(())
}

fn print_summary(report: &BreadthReport, out_csv: &Path) {
    println!();
    println!("=== Sentiment Breadth ===");
    println!("Lookback:       {} rows", report.config.lookback_rows);
    println!("Min coverage:   {:.2}", report.config.min_coverage);
    println!("Universe:       {} symbols", report.total_stocks);
    println!(
        "Rows:           {} kept, {} dropped of {}",
        report.rows.len(),
        report.dropped_rows(),
        report.evaluated_rows
    );
    if let Some(latest) = report.latest() {
        println!(
            "Latest:         {} {:.2}% ({} of {} up, coverage {:.2})",
            latest.date,
            latest.breadth_pct,
            latest.positive_stocks,
            latest.available_stocks,
            latest.coverage
        );
    }
    println!("Saved to:       {}", out_csv.display());
}
