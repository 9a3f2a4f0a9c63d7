use crate::calendar::normalize_date;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// One model prediction for a ticker on a trading day, with the realized forward return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    #[serde(deserialize_with = "deserialize_normalized_date")]
    pub date: NaiveDate,
    pub ticker: String,
    pub sector: String,
    #[serde(alias = "p_up", deserialize_with = "deserialize_f64_or_nan")]
    pub predicted_probability: f64,
    #[serde(alias = "fwd_ret", deserialize_with = "deserialize_return")]
    pub forward_return: f64,
}

impl PredictionRow {
    pub fn new(
        date: NaiveDate,
        ticker: &str,
        sector: &str,
        predicted_probability: f64,
        forward_return: f64,
    ) -> Self {
        Self {
            date,
            ticker: ticker.to_string(),
            sector: sector.to_string(),
            predicted_probability,
            forward_return: coerce_return(forward_return),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReturn {
    pub date: NaiveDate,
    #[serde(rename = "return", deserialize_with = "deserialize_return")]
    pub ret: f64,
}

/// A selected position on a day. An empty ticker marks a sector with no eligible candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickRecord {
    pub date: NaiveDate,
    pub ticker: String,
    pub sector: String,
    pub net_return: f64,
}

impl PickRecord {
    pub fn empty(date: NaiveDate, sector: &str) -> Self {
        Self {
            date,
            ticker: String::new(),
            sector: sector.to_string(),
            net_return: 0.0,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.ticker.is_empty()
    }
}

/// One cell of the dense (date x sector) return grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorDailyReturn {
    #[serde(deserialize_with = "deserialize_normalized_date")]
    pub date: NaiveDate,
    pub sector: String,
    #[serde(rename = "return", deserialize_with = "deserialize_return")]
    pub ret: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityCurvePoint {
    pub date: NaiveDate,
    #[serde(rename = "return")]
    pub ret: f64,
    pub cumulative_equity: f64,
    pub cumulative_return: f64,
    pub selected_tickers: String,
}

/// Annualized summary of a return series. `None` marks a figure that is undefined
/// for the series (empty input, no variance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub days: usize,
    pub non_zero_days: usize,
    pub ann_return_arith: Option<f64>,
    pub ann_return_geom: Option<f64>,
    pub ann_vol: Option<f64>,
    pub sharpe: Option<f64>,
    pub max_drawdown: Option<f64>,
}

/// Portfolio summary together with the run configuration that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub policy: String,
    pub cost_bps: f64,
    pub balanced: bool,
    pub sectors: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub summary: PerformanceSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectorPerformance {
    pub sector: String,
    pub summary: PerformanceSummary,
}

/// Sector statistics as written for reporting; undefined figures are flattened to 0.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorStatsRow {
    pub sector: String,
    pub days: usize,
    pub non_zero_days: usize,
    #[serde(deserialize_with = "deserialize_f64_or_nan")]
    pub ann_return_arith: f64,
    #[serde(deserialize_with = "deserialize_f64_or_nan")]
    pub ann_return_geom: f64,
    #[serde(deserialize_with = "deserialize_f64_or_nan")]
    pub ann_vol: f64,
    #[serde(deserialize_with = "deserialize_f64_or_nan")]
    pub sharpe: f64,
    #[serde(deserialize_with = "deserialize_f64_or_nan")]
    pub max_drawdown: f64,
}

impl SectorStatsRow {
    pub fn from_performance(performance: &SectorPerformance) -> Self {
        let summary = &performance.summary;
        Self {
            sector: performance.sector.clone(),
            days: summary.days,
            non_zero_days: summary.non_zero_days,
            ann_return_arith: summary.ann_return_arith.unwrap_or(0.0),
            ann_return_geom: summary.ann_return_geom.unwrap_or(0.0),
            ann_vol: summary.ann_vol.unwrap_or(0.0),
            sharpe: summary.sharpe.unwrap_or(0.0),
            max_drawdown: summary.max_drawdown.unwrap_or(0.0),
        }
    }
}

/// One-sample t-test of a sector's mean return against zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceResult {
    pub sector: String,
    pub n: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub t_statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub p_value_fdr_adjusted: Option<f64>,
    pub ci_low: Option<f64>,
    pub ci_high: Option<f64>,
    pub ann_mean_arith: Option<f64>,
    pub ann_ci_low: Option<f64>,
    pub ann_ci_high: Option<f64>,
}

/// Welch test of the best-mean sector against one other sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseResult {
    pub best_sector: String,
    pub other_sector: String,
    pub t_statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub p_value_fdr_adjusted: Option<f64>,
    pub mean_best: f64,
    pub mean_other: f64,
    pub n_best: usize,
    pub n_other: usize,
    pub ann_mean_best: f64,
    pub ann_mean_other: f64,
}

/// Non-finite returns are treated as a flat day.
pub fn coerce_return(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn deserialize_normalized_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    normalize_date(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_return<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .and_then(|value| value.trim().parse::<f64>().ok())
        .map(coerce_return)
        .unwrap_or(0.0))
}

fn deserialize_f64_or_nan<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .and_then(|value| value.trim().parse::<f64>().ok())
        .unwrap_or(f64::NAN))
}
