use crate::error::EngineError;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

pub const DEFAULT_COST_BPS: f64 = 10.0;
pub const DEFAULT_BALANCE_SEED: u64 = 42;
pub const DEFAULT_TOP_N: usize = 1;
pub const BENCHMARK_SECTOR: &str = "Benchmark";
pub const DEFAULT_SECTORS: [&str; 11] = [
    "Communication Services",
    "Consumer Discretionary",
    "Consumer Staples",
    "Energy",
    "Financials",
    "Healthcare",
    "Industrials",
    "Materials",
    "Real Estate",
    "Technology",
    "Utilities",
];

/// How positions are chosen from a day's candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// The single highest-probability candidate of every sector.
    TopPerSector,
    /// The `n` highest-probability candidates across all sectors.
    TopNGlobal { n: usize },
}

impl SelectionPolicy {
    pub fn parse(raw: &str, top_n: usize) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "top_per_sector" | "per_sector" => Ok(Self::TopPerSector),
            "top_n" | "top_n_global" => {
                if top_n == 0 {
                    return Err(invalid_setting("TOP_N", "0", "must be >= 1"));
                }
                Ok(Self::TopNGlobal { n: top_n })
            }
            other => Err(invalid_setting(
                "SELECTION_POLICY",
                other,
                "must be top_per_sector or top_n",
            )),
        }
    }

    pub fn label(self) -> String {
        match self {
            Self::TopPerSector => "top-1 per sector".to_string(),
            Self::TopNGlobal { n } => format!("top-{} global", n),
        }
    }
}

/// Fixed, lexically ordered sector enumeration shared by every stage of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SectorUniverse {
    names: Vec<String>,
}

impl SectorUniverse {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique = BTreeSet::new();
        for name in names {
            let trimmed = name.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.eq_ignore_ascii_case(BENCHMARK_SECTOR) {
                return Err(invalid_setting(
                    "SECTORS",
                    trimmed,
                    "the benchmark category is not a tradable sector",
                ));
            }
            unique.insert(trimmed.to_string());
        }

        if unique.is_empty() {
            return Err(invalid_setting("SECTORS", "", "must list at least one sector"));
        }

        Ok(Self {
            names: unique.into_iter().collect(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, sector: &str) -> bool {
        self.names
            .binary_search_by(|name| name.as_str().cmp(sector))
            .is_ok()
    }
}

impl Default for SectorUniverse {
    fn default() -> Self {
        Self {
            names: DEFAULT_SECTORS.iter().map(|name| name.to_string()).collect(),
        }
    }
}

/// Everything the selection and aggregation engines need for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestConfig {
    pub policy: SelectionPolicy,
    pub cost_bps: f64,
    pub sectors: SectorUniverse,
}

impl BacktestConfig {
    /// Round-trip cost charged once per trading day.
    pub fn cost_rate(&self) -> f64 {
        self.cost_bps / 10_000.0
    }
}

pub fn validate_cost_bps(value: f64) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid_setting(
            "COST_BPS_RT",
            &value.to_string(),
            "must be a finite number >= 0",
        ));
    }
    Ok(value)
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::TopPerSector,
            cost_bps: DEFAULT_COST_BPS,
            sectors: SectorUniverse::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Frequency {
    Daily,
    Weekly,
}

impl Frequency {
    pub const ALL: [Frequency; 2] = [Frequency::Daily, Frequency::Weekly];

    pub fn periods_per_year(self) -> f64 {
        match self {
            Frequency::Daily => 252.0,
            Frequency::Weekly => 52.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BacktestSettings {
    pub cost_bps: f64,
    pub policy: SelectionPolicy,
    /// TOP_N, kept even when SELECTION_POLICY is not top_n.
    pub top_n: usize,
    pub sectors: SectorUniverse,
    pub balance_seed: u64,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            cost_bps: DEFAULT_COST_BPS,
            policy: SelectionPolicy::TopPerSector,
            top_n: DEFAULT_TOP_N,
            sectors: SectorUniverse::default(),
            balance_seed: DEFAULT_BALANCE_SEED,
        }
    }
}

impl BacktestSettings {
    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();

        let cost_bps = optional_setting_f64(settings, "COST_BPS_RT", Some(0.0), None)?
            .unwrap_or(defaults.cost_bps);
        let top_n = optional_setting_usize(settings, "TOP_N", 1)?.unwrap_or(defaults.top_n);
        let policy = match optional_setting(settings, "SELECTION_POLICY") {
            Some(raw) => SelectionPolicy::parse(raw, top_n)?,
            None => defaults.policy,
        };
        let sectors = match optional_setting(settings, "SECTORS") {
            Some(raw) => SectorUniverse::new(raw.split(','))?,
            None => defaults.sectors,
        };
        let balance_seed = optional_setting_usize(settings, "BALANCE_SEED", 0)?
            .map(|seed| seed as u64)
            .unwrap_or(defaults.balance_seed);

        Ok(Self {
            cost_bps,
            policy,
            top_n,
            sectors,
            balance_seed,
        })
    }

    /// Top-n policy sized by `top_n` when given, otherwise by the configured TOP_N.
    pub fn top_n_policy(&self, top_n: Option<usize>) -> Result<SelectionPolicy> {
        SelectionPolicy::parse("top_n", top_n.unwrap_or(self.top_n))
    }

    pub fn backtest_config(&self) -> BacktestConfig {
        BacktestConfig {
            policy: self.policy,
            cost_bps: self.cost_bps,
            sectors: self.sectors.clone(),
        }
    }
}

/// Reads a flat JSON object of settings. Numbers and booleans are kept in their
/// textual form so every value goes through the same validation.
pub fn load_settings_file(path: &Path) -> Result<HashMap<String, String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    let parsed: HashMap<String, Value> = serde_json::from_str(&raw)
        .with_context(|| format!("Settings file {} must be a JSON object", path.display()))?;

    let mut settings = HashMap::with_capacity(parsed.len());
    for (key, value) in parsed {
        let text = match value {
            Value::String(text) => text,
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Null => continue,
            Value::Object(_) => {
                return Err(invalid_setting(&key, "{...}", "nested objects are not supported"))
            }
        };
        settings.insert(key, text);
    }

    Ok(settings)
}

fn invalid_setting(key: &str, value: &str, reason: &str) -> anyhow::Error {
    EngineError::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn optional_setting_f64(
    settings: &HashMap<String, String>,
    key: &str,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<Option<f64>> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(None);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| invalid_setting(key, raw, "must be a number"))?;
    if !value.is_finite() {
        return Err(invalid_setting(key, raw, "must be finite"));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(invalid_setting(key, raw, &format!("must be >= {}", min_value)));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(invalid_setting(key, raw, &format!("must be <= {}", max_value)));
        }
    }
    Ok(Some(value))
}

fn optional_setting_usize(
    settings: &HashMap<String, String>,
    key: &str,
    min: usize,
) -> Result<Option<usize>> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(None);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| invalid_setting(key, raw, "must be a number"))?;
    if !value.is_finite() {
        return Err(invalid_setting(key, raw, "must be finite"));
    }
    if value.fract() != 0.0 {
        return Err(invalid_setting(key, raw, "must be an integer"));
    }
    if value < min as f64 {
        return Err(invalid_setting(key, raw, &format!("must be >= {}", min)));
    }
    Ok(Some(value as usize))
}
