use crate::models::PredictionRow;
use crate::prediction_utils::sector_counts;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSummary {
    pub original: BTreeMap<String, usize>,
    pub balanced: BTreeMap<String, usize>,
    pub per_sector: usize,
}

/// Stratified downsampling: every sector keeps as many rows as the smallest sector has.
/// Sampling is seeded so the same input and seed always keep the same rows. Output is in
/// input order, stably sorted by date.
pub fn balance_sectors(rows: &[PredictionRow], seed: u64) -> (Vec<PredictionRow>, BalanceSummary) {
    let original = sector_counts(rows);
    let per_sector = original.values().copied().min().unwrap_or(0);

    let mut indices_by_sector: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, row) in rows.iter().enumerate() {
        indices_by_sector
            .entry(row.sector.as_str())
            .or_default()
            .push(idx);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut kept: Vec<usize> = Vec::with_capacity(per_sector * indices_by_sector.len());
    for (_sector, mut indices) in indices_by_sector {
        indices.shuffle(&mut rng);
        kept.extend(indices.into_iter().take(per_sector));
    }
    kept.sort_unstable();

    let mut balanced: Vec<PredictionRow> = kept.into_iter().map(|idx| rows[idx].clone()).collect();
    balanced.sort_by_key(|row| row.date);

    let summary = BalanceSummary {
        balanced: sector_counts(&balanced),
        original,
        per_sector,
    };
    log_summary(&summary, rows.len(), balanced.len());
    (balanced, summary)
}

fn log_summary(summary: &BalanceSummary, before: usize, after: usize) {
    if summary.original.is_empty() {
        warn!("No prediction rows to balance");
        return;
    }
    info!(
        "Balanced {} sector(s) to {} row(s) each ({} -> {} rows)",
        summary.original.len(),
        summary.per_sector,
        before,
        after
    );
    for (sector, count) in &summary.original {
        info!("  {:<24} {:>8} -> {}", sector, count, summary.per_sector);
    }
}
