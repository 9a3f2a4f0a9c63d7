use crate::calendar::build_calendar;
use crate::commands::input_files::ensure_input_file;
use crate::context::{AppContext, RunVariant};
use crate::data_context::{load_predictions, write_table};
use crate::models::{PredictionRow, SectorStatsRow};
use crate::report;
use crate::sector_aggregator::{aggregate_universe, per_sector_metrics};
use anyhow::Result;
use log::info;
use std::path::Path;

/// Equal-weight sector performance of the whole candidate universe, independent of the
/// selection policy. Written next to the backtest outputs as `sector_universe_stats.csv`.
pub fn run(app: &AppContext, predictions_file: &Path) -> Result<Vec<SectorStatsRow>> {
    info!(
        "Received sector-baseline command for {}",
        predictions_file.display()
    );
    ensure_input_file(
        predictions_file,
        "Provide the prediction table produced by the scoring step.",
    )?;

    let predictions = load_predictions(predictions_file)?;
    let stats = compute(app, &predictions)?;

    let path = app.outputs(RunVariant::Unbalanced).sector_universe_stats();
    write_table(&path, &stats)?;
    print!(
        "{}",
        report::sector_extremes("Sector performance (all candidates):", &stats, 3)
    );
    Ok(stats)
}

pub fn compute(app: &AppContext, predictions: &[PredictionRow]) -> Result<Vec<SectorStatsRow>> {
    let sectors = &app.settings().sectors;
    let first = predictions.iter().map(|row| row.date).min();
    let last = predictions.iter().map(|row| row.date).max();
    let calendar = match (first, last) {
        (Some(first), Some(last)) => build_calendar(first, last),
        _ => Vec::new(),
    };
    info!(
        "Averaging forward returns of {} candidate row(s) over {} trading day(s) and {} sector(s)",
        predictions.len(),
        calendar.len(),
        sectors.len()
    );

    let grid = aggregate_universe(predictions, &calendar, sectors)?;
    Ok(per_sector_metrics(&grid)
        .iter()
        .map(SectorStatsRow::from_performance)
        .collect())
}
