use crate::backtester::{BacktestOutput, DailyBacktester};
use crate::balance::balance_sectors;
use crate::commands::input_files::ensure_input_file;
use crate::config::{validate_cost_bps, BacktestConfig, SelectionPolicy};
use crate::context::{AppContext, OutputPaths, RunVariant};
use crate::data_context::{load_predictions, write_json, write_table};
use crate::error::EngineError;
use crate::models::{PortfolioMetrics, PredictionRow, SectorStatsRow};
use crate::report;
use crate::sector_aggregator::{aggregate, per_sector_metrics, SectorDailyGrid};
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct BacktestOptions {
    pub predictions: PathBuf,
    pub variant: RunVariant,
    pub policy: Option<SelectionPolicy>,
    pub cost_bps: Option<f64>,
    pub show_progress: bool,
}

impl BacktestOptions {
    pub fn new(predictions: PathBuf, variant: RunVariant) -> Self {
        Self {
            predictions,
            variant,
            policy: None,
            cost_bps: None,
            show_progress: false,
        }
    }
}

/// Everything one backtest produces, held in memory until it is written.
#[derive(Debug, Clone)]
pub struct BacktestArtifacts {
    pub config: BacktestConfig,
    pub output: BacktestOutput,
    pub grid: SectorDailyGrid,
    pub sector_stats: Vec<SectorStatsRow>,
    pub metrics: PortfolioMetrics,
}

pub fn run(app: &AppContext, options: &BacktestOptions) -> Result<BacktestArtifacts> {
    info!(
        "Received backtest command ({} mode) for {}",
        options.variant.label(),
        options.predictions.display()
    );
    ensure_input_file(
        &options.predictions,
        "Provide the prediction table produced by the scoring step.",
    )?;

    let predictions = load_predictions(&options.predictions)?;
    let artifacts = compute(app, options, &predictions)?;
    let paths = app.outputs(options.variant);
    write(&paths, &artifacts)?;

    print!(
        "{}",
        report::portfolio_summary(options.variant.label(), &artifacts.output.summary)
    );
    print!(
        "{}",
        report::sector_extremes("Sector performance (selected picks):", &artifacts.sector_stats, 3)
    );
    Ok(artifacts)
}

pub fn resolve_config(app: &AppContext, options: &BacktestOptions) -> Result<BacktestConfig> {
    let mut config = app.settings().backtest_config();
    if let Some(policy) = options.policy {
        config.policy = policy;
    }
    if let Some(cost_bps) = options.cost_bps {
        config.cost_bps = validate_cost_bps(cost_bps)?;
    }
    Ok(config)
}

/// Runs selection and sector aggregation without touching the filesystem.
pub fn compute(
    app: &AppContext,
    options: &BacktestOptions,
    predictions: &[PredictionRow],
) -> Result<BacktestArtifacts> {
    let config = resolve_config(app, options)?;

    let balanced_rows;
    let feed: &[PredictionRow] = if options.variant.is_balanced() {
        let (rows, _summary) = balance_sectors(predictions, app.settings().balance_seed);
        balanced_rows = rows;
        &balanced_rows
    } else {
        predictions
    };

    let mut backtester = DailyBacktester::new(&config);
    if options.show_progress {
        backtester = backtester.with_progress(progress_bar());
    }
    let output = backtester.run(feed);

    let grid = aggregate(&output.picks, &output.calendar, &config.sectors)?;
    let sector_stats: Vec<SectorStatsRow> = per_sector_metrics(&grid)
        .iter()
        .map(SectorStatsRow::from_performance)
        .collect();
    if sector_stats.len() != config.sectors.len() {
        return Err(EngineError::InvariantViolation(format!(
            "sector stats cover {} sector(s), expected {}",
            sector_stats.len(),
            config.sectors.len()
        ))
        .into());
    }

    let metrics = PortfolioMetrics {
        policy: config.policy.label(),
        cost_bps: config.cost_bps,
        balanced: options.variant.is_balanced(),
        sectors: config.sectors.names().to_vec(),
        start_date: output.calendar.first().copied(),
        end_date: output.calendar.last().copied(),
        summary: output.summary.clone(),
    };

    Ok(BacktestArtifacts {
        config,
        output,
        grid,
        sector_stats,
        metrics,
    })
}

pub fn write(paths: &OutputPaths, artifacts: &BacktestArtifacts) -> Result<()> {
    write_table(&paths.equity_curve(), &artifacts.output.equity_curve)?;
    write_table(&paths.sector_stats(), &artifacts.sector_stats)?;
    write_table(&paths.sector_daily_returns(), artifacts.grid.rows())?;
    write_json(&paths.portfolio_metrics(), &artifacts.metrics)?;
    info!(
        "Saved {} mode backtest outputs to {}",
        paths.variant().label(),
        paths.equity_curve().parent().map(|dir| dir.display().to_string()).unwrap_or_default()
    );
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} days ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
