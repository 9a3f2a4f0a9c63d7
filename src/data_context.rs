use crate::models::{
    EquityCurvePoint, PairwiseResult, PredictionRow, SectorDailyReturn, SectorStatsRow,
    SignificanceResult,
};
use crate::prediction_utils::normalize_ticker_symbol;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// A row type with a fixed CSV header. Headers are written explicitly so an empty table
/// still carries its schema.
pub trait CsvTable: Serialize + DeserializeOwned {
    const HEADERS: &'static [&'static str];
    const NAME: &'static str;
}

impl CsvTable for PredictionRow {
    const HEADERS: &'static [&'static str] = &[
        "date",
        "ticker",
        "sector",
        "predicted_probability",
        "forward_return",
    ];
    const NAME: &'static str = "predictions";
}

impl CsvTable for EquityCurvePoint {
    const HEADERS: &'static [&'static str] = &[
        "date",
        "return",
        "cumulative_equity",
        "cumulative_return",
        "selected_tickers",
    ];
    const NAME: &'static str = "equity curve";
}

impl CsvTable for SectorStatsRow {
    const HEADERS: &'static [&'static str] = &[
        "sector",
        "days",
        "non_zero_days",
        "ann_return_arith",
        "ann_return_geom",
        "ann_vol",
        "sharpe",
        "max_drawdown",
    ];
    const NAME: &'static str = "sector stats";
}

impl CsvTable for SectorDailyReturn {
    const HEADERS: &'static [&'static str] = &["date", "sector", "return"];
    const NAME: &'static str = "sector daily returns";
}

impl CsvTable for SignificanceResult {
    const HEADERS: &'static [&'static str] = &[
        "sector",
        "n",
        "mean",
        "std",
        "t_statistic",
        "p_value",
        "p_value_fdr_adjusted",
        "ci_low",
        "ci_high",
        "ann_mean_arith",
        "ann_ci_low",
        "ann_ci_high",
    ];
    const NAME: &'static str = "one-sample t-tests";
}

impl CsvTable for PairwiseResult {
    const HEADERS: &'static [&'static str] = &[
        "best_sector",
        "other_sector",
        "t_statistic",
        "p_value",
        "p_value_fdr_adjusted",
        "mean_best",
        "mean_other",
        "n_best",
        "n_other",
        "ann_mean_best",
        "ann_mean_other",
    ];
    const NAME: &'static str = "pairwise t-tests";
}

pub fn read_table<T: CsvTable>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)
        .with_context(|| format!("Unable to open {} table at {}", T::NAME, path.display()))?;
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(BufReader::new(file));

    let mut rows = Vec::new();
    for (idx, record) in reader.deserialize::<T>().enumerate() {
        let row = record.with_context(|| {
            format!(
                "Malformed {} row {} in {}",
                T::NAME,
                idx + 2,
                path.display()
            )
        })?;
        rows.push(row);
    }
    Ok(rows)
}

pub fn write_table<T: CsvTable>(path: &Path, rows: &[T]) -> Result<()> {
    create_parent_dir(path)?;
    let file = File::create(path)
        .with_context(|| format!("Unable to create {} table at {}", T::NAME, path.display()))?;
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(file));

    writer
        .write_record(T::HEADERS)
        .with_context(|| format!("Failed to write {} header", T::NAME))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("Failed to serialize {} row", T::NAME))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {} table to {}", T::NAME, path.display()))?;
    info!("Wrote {} {} row(s) to {}", rows.len(), T::NAME, path.display());
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    create_parent_dir(path)?;
    let file = File::create(path)
        .with_context(|| format!("Unable to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to serialize JSON to {}", path.display()))?;
    writer.write_all(b"\n")?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Loads the prediction table. Tickers are normalized and sectors trimmed; rows without
/// a ticker are dropped. Rows with a non-numeric probability are kept and later treated
/// as ineligible by the selection engine.
pub fn load_predictions(path: &Path) -> Result<Vec<PredictionRow>> {
    let raw: Vec<PredictionRow> = read_table(path)?;
    let total = raw.len();

    let mut rows = Vec::with_capacity(total);
    let mut missing_ticker = 0usize;
    for mut row in raw {
        let Some(ticker) = normalize_ticker_symbol(&row.ticker) else {
            missing_ticker += 1;
            continue;
        };
        row.ticker = ticker;
        row.sector = row.sector.trim().to_string();
        rows.push(row);
    }

    if missing_ticker > 0 {
        warn!(
            "Dropped {} prediction row(s) without a ticker from {}",
            missing_ticker,
            path.display()
        );
    }
    let unscored = rows
        .iter()
        .filter(|row| !row.predicted_probability.is_finite())
        .count();
    if unscored > 0 {
        warn!(
            "{} prediction row(s) have no numeric probability and cannot be selected",
            unscored
        );
    }
    info!(
        "Loaded {} prediction row(s) from {}",
        rows.len(),
        path.display()
    );
    Ok(rows)
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory {}", parent.display())
            })?;
        }
    }
    Ok(())
}
