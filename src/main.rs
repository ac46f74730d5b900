//! signal-backtest CLI
//!
//! # Usage
//!
//! ```bash
//! # Run a backtest with the given configuration
//! signal-backtest run --config config/default.toml --data data/processed_features.parquet
//!
//! # Print the report of a saved run
//! signal-backtest report --result output/csv_results/backtest_result.json
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use signal_backtest::backtest::{BacktestObserver, TracingObserver};
use signal_backtest::output::{load_result, ResultWriter};
use signal_backtest::portfolio::TradeExecutionError;
use signal_backtest::{run_strategy, BacktestResult, PanelLoader, ReportGenerator, Settings};

#[derive(Parser)]
#[command(name = "signal-backtest")]
#[command(about = "Walk-forward backtest of a periodically retrained return signal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest with given configuration
    Run {
        /// Path to configuration file (TOML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Panel file, overrides data.path
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Output directory, overrides output.dir
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Disable the progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print the report of a saved run
    Report {
        /// Path to backtest_result.json
        #[arg(short, long)]
        result: PathBuf,
    },
}

/// Progress bar over the backtest window, forwarding events to tracing.
struct ProgressObserver {
    bar: ProgressBar,
    inner: TracingObserver,
}

impl ProgressObserver {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
                .progress_chars("=>-"),
        );
        Ok(Self {
            bar,
            inner: TracingObserver,
        })
    }
}

impl BacktestObserver for ProgressObserver {
    fn on_start(&mut self, dates: usize, start: NaiveDate, end: NaiveDate) {
        self.bar.set_length(dates as u64);
        self.inner.on_start(dates, start, end);
    }

    fn on_date(&mut self, _index: usize, date: NaiveDate) {
        self.bar.set_message(date.to_string());
        self.bar.inc(1);
    }

    fn on_retrain(&mut self, date: NaiveDate, success: bool) {
        self.inner.on_retrain(date, success);
    }

    fn on_trade_failed(&mut self, date: NaiveDate, error: &TradeExecutionError) {
        self.inner.on_trade_failed(date, error);
    }

    fn on_complete(&mut self, result: &BacktestResult) {
        self.bar.finish_and_clear();
        self.inner.on_complete(result);
    }
}

fn cmd_run(
    config: PathBuf,
    data: Option<PathBuf>,
    output: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    let settings = Settings::from_file(&config)
        .with_context(|| format!("Failed to load config {}", config.display()))?;

    let Some(data_path) = data.or_else(|| settings.data.path.clone()) else {
        bail!("No panel file given: pass --data or set data.path");
    };

    let panel = PanelLoader::new(&data_path)
        .with_date_column(&settings.data.date_column)
        .with_target_column(&settings.data.target_column)
        .load()
        .with_context(|| format!("Failed to load panel {}", data_path.display()))?;

    let missing: usize = panel.missing_counts().iter().map(|(_, n)| n).sum();
    if missing > 0 {
        warn!("Panel has {} missing cells, applying fill policy", missing);
    }
    let panel = settings.data.fill.apply(&panel);

    let observer: Box<dyn BacktestObserver> = if quiet {
        Box::new(TracingObserver)
    } else {
        Box::new(ProgressObserver::new()?)
    };

    let run = run_strategy(&settings, &panel, observer).context("Strategy run failed")?;
    println!("{}", ReportGenerator::for_result(&run.result));

    let output_dir = output.unwrap_or_else(|| settings.output.dir.clone());
    let written = ResultWriter::new(&output_dir)
        .write_all(&run.result, &run.prediction_history)
        .with_context(|| format!("Failed to write results to {}", output_dir.display()))?;
    info!("Wrote {} files", written.len());

    Ok(())
}

fn cmd_report(result: PathBuf) -> Result<()> {
    let saved = load_result(&result)
        .with_context(|| format!("Failed to read result {}", result.display()))?;
    println!("{}", ReportGenerator::for_result(&saved));
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("signal_backtest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            data,
            output,
            quiet,
        } => cmd_run(config, data, output, quiet)?,
        Commands::Report { result } => cmd_report(result)?,
    }

    Ok(())
}
