use crate::config::{load_settings_file, BacktestSettings, Frequency};
use anyhow::Result;
use log::info;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Unbalanced runs use the prediction feed as-is; balanced runs use the sector-downsampled
/// feed and write every artifact under a `_balanced` stem.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunVariant {
    Unbalanced,
    Balanced,
}

impl RunVariant {
    pub fn from_flag(balanced: bool) -> Self {
        if balanced {
            RunVariant::Balanced
        } else {
            RunVariant::Unbalanced
        }
    }

    pub fn is_balanced(self) -> bool {
        matches!(self, RunVariant::Balanced)
    }

    pub fn label(self) -> &'static str {
        match self {
            RunVariant::Unbalanced => "unbalanced",
            RunVariant::Balanced => "balanced",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            RunVariant::Unbalanced => "",
            RunVariant::Balanced => "_balanced",
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppContext {
    data_dir: PathBuf,
    settings: BacktestSettings,
}

impl AppContext {
    pub fn initialize(data_dir: PathBuf, settings_file: Option<&Path>) -> Result<Self> {
        let settings_map = match settings_file {
            Some(path) => {
                info!("Loading settings from {}", path.display());
                load_settings_file(path)?
            }
            None => HashMap::new(),
        };
        let settings = BacktestSettings::from_settings_map(&settings_map)?;
        Ok(Self::with_settings(data_dir, settings))
    }

    pub fn with_settings(data_dir: PathBuf, settings: BacktestSettings) -> Self {
        Self { data_dir, settings }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn settings(&self) -> &BacktestSettings {
        &self.settings
    }

    pub fn outputs(&self, variant: RunVariant) -> OutputPaths {
        OutputPaths {
            data_dir: self.data_dir.clone(),
            variant,
        }
    }
}

/// File locations of every artifact for one run variant.
#[derive(Clone, Debug)]
pub struct OutputPaths {
    data_dir: PathBuf,
    variant: RunVariant,
}

impl OutputPaths {
    pub fn variant(&self) -> RunVariant {
        self.variant
    }

    pub fn equity_curve(&self) -> PathBuf {
        self.file("equity_curve", "csv")
    }

    pub fn portfolio_metrics(&self) -> PathBuf {
        self.file("portfolio_metrics", "json")
    }

    pub fn sector_stats(&self) -> PathBuf {
        self.file("sector_stats", "csv")
    }

    pub fn sector_daily_returns(&self) -> PathBuf {
        self.file("sector_daily_returns", "csv")
    }

    pub fn sector_universe_stats(&self) -> PathBuf {
        self.file("sector_universe_stats", "csv")
    }

    pub fn one_sample_tests(&self, frequency: Frequency) -> PathBuf {
        match frequency {
            Frequency::Daily => self.file("sector_ttest", "csv"),
            Frequency::Weekly => self.file("sector_ttest_weekly", "csv"),
        }
    }

    pub fn pairwise_tests(&self, frequency: Frequency) -> PathBuf {
        match frequency {
            Frequency::Daily => self.file("sector_pairwise_best_vs_rest", "csv"),
            Frequency::Weekly => self.file("sector_pairwise_best_vs_rest_weekly", "csv"),
        }
    }

    fn file(&self, stem: &str, extension: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}{}.{}", stem, self.variant.suffix(), extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_outputs_carry_suffix() {
        let app = AppContext::with_settings(PathBuf::from("data"), BacktestSettings::default());
        let unbalanced = app.outputs(RunVariant::Unbalanced);
        let balanced = app.outputs(RunVariant::Balanced);

        assert_eq!(unbalanced.equity_curve(), Path::new("data/equity_curve.csv"));
        assert_eq!(
            balanced.sector_stats(),
            Path::new("data/sector_stats_balanced.csv")
        );
        assert_eq!(
            balanced.one_sample_tests(Frequency::Weekly),
            Path::new("data/sector_ttest_weekly_balanced.csv")
        );
        assert_eq!(
            unbalanced.pairwise_tests(Frequency::Daily),
            Path::new("data/sector_pairwise_best_vs_rest.csv")
        );
    }

    #[test]
    fn missing_settings_file_is_an_error() {
        let result = AppContext::initialize(
            PathBuf::from("data"),
            Some(Path::new("definitely/not/here.json")),
        );
        assert!(result.is_err());
    }
}
