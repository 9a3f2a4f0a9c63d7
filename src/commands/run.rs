use crate::commands::backtest::{self, BacktestArtifacts, BacktestOptions};
use crate::commands::input_files::ensure_input_file;
use crate::commands::stats_tests;
use crate::context::AppContext;
use crate::data_context::load_predictions;
use crate::report;
use crate::significance::SignificanceReport;
use anyhow::Result;
use log::info;

#[derive(Debug)]
pub struct PipelineOutput {
    pub backtest: BacktestArtifacts,
    pub significance: Vec<SignificanceReport>,
}

/// Backtest followed by the significance batteries for one variant. Both stages are
/// computed before any artifact is written.
pub fn run(app: &AppContext, options: &BacktestOptions) -> Result<PipelineOutput> {
    info!(
        "Received run command ({} mode) for {}",
        options.variant.label(),
        options.predictions.display()
    );
    ensure_input_file(
        &options.predictions,
        "Provide the prediction table produced by the scoring step.",
    )?;

    let predictions = load_predictions(&options.predictions)?;
    let artifacts = backtest::compute(app, options, &predictions)?;
    let significance = stats_tests::compute(artifacts.grid.rows())?;

    let paths = app.outputs(options.variant);
    backtest::write(&paths, &artifacts)?;
    stats_tests::write(&paths, &significance)?;

    print!(
        "{}",
        report::portfolio_summary(options.variant.label(), &artifacts.output.summary)
    );
    print!(
        "{}",
        report::sector_extremes("Sector performance (selected picks):", &artifacts.sector_stats, 3)
    );
    for batch in &significance {
        print!("{}", report::significance_tables(batch));
    }

    Ok(PipelineOutput {
        backtest: artifacts,
        significance,
    })
}
