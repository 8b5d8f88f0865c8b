//! SentiLab CLI: sentiment-to-price causality and forecast comparison.
//!
//! Commands:
//! - `granger` runs the Granger sweep and writes the causality table
//! - `arimax` runs order search and ARMA vs ARMAX comparison
//! - `run` does both in sequence

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sentilab_core::comparison::COEFFICIENT_ALPHA;
use sentilab_runner::{run_comparison, run_granger, run_pipeline, AnalysisConfig, RunSummary};

#[derive(Parser)]
#[command(
    name = "sentilab",
    about = "SentiLab CLI: does news sentiment lead price moves?"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Granger causality tests for every ticker in the merged table.
    Granger(RunArgs),
    /// ARMA order search and ARMA vs ARMAX comparison for the working set.
    Arimax(RunArgs),
    /// Granger tests followed by the model comparison.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `econometrics.max_lag_days`.
    #[arg(long)]
    max_lag: Option<usize>,

    /// Override `econometrics.significance_level`.
    #[arg(long)]
    alpha: Option<f64>,

    /// Override `econometrics.workers` (0 = one per core).
    #[arg(long)]
    workers: Option<usize>,
}

impl RunArgs {
    fn load_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => AnalysisConfig::default(),
        };
        if let Some(max_lag) = self.max_lag {
            config.econometrics.max_lag_days = max_lag;
        }
        if let Some(alpha) = self.alpha {
            config.econometrics.significance_level = alpha;
        }
        if let Some(workers) = self.workers {
            config.econometrics.workers = workers;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let summary = match cli.command {
        Commands::Granger(args) => {
            let config = args.load_config()?;
            run_granger(&config).context("Granger stage failed")?
        }
        Commands::Arimax(args) => {
            let config = args.load_config()?;
            run_comparison(&config).context("comparison stage failed")?
        }
        Commands::Run(args) => {
            let config = args.load_config()?;
            run_pipeline(&config).context("pipeline failed")?
        }
    };

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    info!(
        dataset = %summary.dataset_hash,
        tickers = summary.instruments_loaded,
        "run complete"
    );
    if let Some(granger) = &summary.granger {
        let significant = granger.results.iter().filter(|r| r.significant).count();
        info!(
            rows = granger.results.len(),
            significant,
            skipped = granger.skips.len(),
            "causality"
        );
    }
    if let Some(comparison) = &summary.comparison {
        info!(
            recorded = comparison.results.len(),
            skipped = comparison.skips.len(),
            fallback = comparison.working_set.fallback,
            "comparison"
        );
        for row in &comparison.results {
            let marker = if row.sentiment_pvalue < COEFFICIENT_ALPHA {
                "sentiment significant"
            } else {
                "sentiment not significant"
            };
            info!(
                ticker = %row.ticker,
                order = %row.order,
                lag = row.best_sentiment_lag,
                improvement_pct = row.rmse_improvement_pct,
                p = row.sentiment_pvalue,
                "{marker}"
            );
        }
    }
}
