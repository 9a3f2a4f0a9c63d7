use crate::commands::input_files::ensure_input_file;
use crate::config::SectorUniverse;
use crate::context::{AppContext, RunVariant};
use crate::data_context::read_table;
use crate::models::SectorStatsRow;
use crate::report;
use anyhow::{anyhow, Result};
use log::{info, warn};
use std::collections::BTreeSet;

/// Checks applied to the sector-stats artifacts of one or both variants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub checked_variants: Vec<&'static str>,
    pub failures: Vec<String>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn run(app: &AppContext) -> Result<VerificationReport> {
    info!("Received verify command for {}", app.data_dir().display());
    let unbalanced_path = app.outputs(RunVariant::Unbalanced).sector_stats();
    ensure_input_file(&unbalanced_path, "Run the `backtest` command first.")?;

    let unbalanced: Vec<SectorStatsRow> = read_table(&unbalanced_path)?;
    let balanced_path = app.outputs(RunVariant::Balanced).sector_stats();
    let balanced: Option<Vec<SectorStatsRow>> = if balanced_path.is_file() {
        Some(read_table(&balanced_path)?)
    } else {
        info!(
            "No balanced sector stats at {}; checking the unbalanced run only",
            balanced_path.display()
        );
        None
    };

    let outcome = verify(&app.settings().sectors, &unbalanced, balanced.as_deref());
    print!(
        "{}",
        report::sector_extremes("Unbalanced sector stats:", &unbalanced, 3)
    );
    if let Some(rows) = balanced.as_deref() {
        print!("{}", report::sector_extremes("Balanced sector stats:", rows, 3));
    }

    if !outcome.passed() {
        for failure in &outcome.failures {
            warn!("Verification failure: {}", failure);
        }
        return Err(anyhow!(
            "Verification failed with {} problem(s): {}",
            outcome.failures.len(),
            outcome.failures.join("; ")
        ));
    }
    info!(
        "Verification passed for {} variant(s)",
        outcome.checked_variants.len()
    );
    Ok(outcome)
}

pub fn verify(
    sectors: &SectorUniverse,
    unbalanced: &[SectorStatsRow],
    balanced: Option<&[SectorStatsRow]>,
) -> VerificationReport {
    let mut report = VerificationReport::default();
    check_variant("unbalanced", sectors, unbalanced, &mut report);
    if let Some(rows) = balanced {
        check_variant("balanced", sectors, rows, &mut report);
        let left = sector_set(unbalanced);
        let right = sector_set(rows);
        if left != right {
            let only_unbalanced: Vec<&str> = left.difference(&right).copied().collect();
            let only_balanced: Vec<&str> = right.difference(&left).copied().collect();
            report.failures.push(format!(
                "variants cover different sectors (only unbalanced: {:?}, only balanced: {:?})",
                only_unbalanced, only_balanced
            ));
        }
    }
    report
}

fn check_variant(
    label: &'static str,
    sectors: &SectorUniverse,
    rows: &[SectorStatsRow],
    report: &mut VerificationReport,
) {
    report.checked_variants.push(label);

    if rows.len() != sectors.len() {
        report.failures.push(format!(
            "{}: {} sector row(s), expected {}",
            label,
            rows.len(),
            sectors.len()
        ));
    }

    let present = sector_set(rows);
    let missing: Vec<&str> = sectors.iter().filter(|s| !present.contains(s)).collect();
    if !missing.is_empty() {
        report
            .failures
            .push(format!("{}: missing sectors {:?}", label, missing));
    }
    let unexpected: Vec<&str> = present
        .iter()
        .copied()
        .filter(|s| !sectors.contains(s))
        .collect();
    if !unexpected.is_empty() {
        report
            .failures
            .push(format!("{}: unexpected sectors {:?}", label, unexpected));
    }

    for row in rows {
        let values = [
            row.ann_return_arith,
            row.ann_return_geom,
            row.ann_vol,
            row.sharpe,
            row.max_drawdown,
        ];
        if values.iter().any(|value| !value.is_finite()) {
            report
                .failures
                .push(format!("{}: {} has missing values", label, row.sector));
        }
    }
}

fn sector_set(rows: &[SectorStatsRow]) -> BTreeSet<&str> {
    rows.iter().map(|row| row.sector.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(sector: &str, sharpe: f64) -> SectorStatsRow {
        SectorStatsRow {
            sector: sector.to_string(),
            days: 5,
            non_zero_days: 2,
            ann_return_arith: 0.1,
            ann_return_geom: 0.09,
            ann_vol: 0.2,
            sharpe,
            max_drawdown: -0.01,
        }
    }

    #[test]
    fn complete_stats_pass() {
        let sectors = SectorUniverse::new(["Energy", "Utilities"]).unwrap();
        let rows = vec![stats("Energy", 1.0), stats("Utilities", 0.0)];
        let report = verify(&sectors, &rows, Some(rows.as_slice()));
        assert!(report.passed(), "{:?}", report.failures);
        assert_eq!(report.checked_variants, vec!["unbalanced", "balanced"]);
    }

    #[test]
    fn flags_missing_sectors_and_values() {
        let sectors = SectorUniverse::new(["Energy", "Utilities"]).unwrap();
        let unbalanced = vec![stats("Energy", f64::NAN)];
        let balanced = vec![stats("Energy", 1.0), stats("Utilities", 0.5)];
        let report = verify(&sectors, &unbalanced, Some(balanced.as_slice()));

        assert!(!report.passed());
        assert!(report.failures.iter().any(|f| f.contains("missing sectors")));
        assert!(report.failures.iter().any(|f| f.contains("missing values")));
        assert!(report.failures.iter().any(|f| f.contains("different sectors")));
    }
}
