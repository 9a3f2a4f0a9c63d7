use crate::calendar::week_ending_friday;
use crate::config::Frequency;
use crate::models::{coerce_return, PairwiseResult, SectorDailyReturn, SignificanceResult};
use crate::performance::{finite, sample_std_dev};
use chrono::NaiveDate;
use log::{info, warn};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::cmp::Ordering;
use std::collections::BTreeMap;

const CONFIDENCE_QUANTILE: f64 = 0.975;

/// One-sample and best-vs-rest results for one resampling frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct SignificanceReport {
    pub frequency: Frequency,
    pub one_sample: Vec<SignificanceResult>,
    pub pairwise: Vec<PairwiseResult>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OneSampleStats {
    pub n: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub t_statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub ci_low: Option<f64>,
    pub ci_high: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WelchStats {
    pub t_statistic: Option<f64>,
    pub p_value: Option<f64>,
}

/// Runs the per-sector one-sample battery and the best-vs-rest Welch battery on a daily
/// sector grid, compounding to Friday-ending weeks first when `frequency` is weekly.
pub fn test_sectors(rows: &[SectorDailyReturn], frequency: Frequency) -> SignificanceReport {
    let resampled;
    let rows = match frequency {
        Frequency::Daily => rows,
        Frequency::Weekly => {
            resampled = aggregate_weekly(rows);
            &resampled[..]
        }
    };

    let by_sector = returns_by_sector(rows);
    let periods_per_year = frequency.periods_per_year();
    info!(
        "Testing {} sector(s) on {} returns ({} observation(s))",
        by_sector.len(),
        frequency.label(),
        rows.len()
    );

    SignificanceReport {
        frequency,
        one_sample: run_one_sample_tests(&by_sector, periods_per_year),
        pairwise: run_pairwise_tests(&by_sector, periods_per_year),
    }
}

/// Compounds daily returns into weekly simple returns per sector: product(1 + r) - 1 over
/// each Monday-Friday week, labeled by the Friday that closes it.
pub fn aggregate_weekly(rows: &[SectorDailyReturn]) -> Vec<SectorDailyReturn> {
    let mut weeks: BTreeMap<(NaiveDate, &str), f64> = BTreeMap::new();
    for row in rows {
        let key = (week_ending_friday(row.date), row.sector.as_str());
        let growth = weeks.entry(key).or_insert(1.0);
        *growth *= 1.0 + coerce_return(row.ret);
    }

    weeks
        .into_iter()
        .map(|((date, sector), growth)| SectorDailyReturn {
            date,
            sector: sector.to_string(),
            ret: growth - 1.0,
        })
        .collect()
}

/// Tests mean(x) != 0 with Student's t on n - 1 degrees of freedom. The statistic, p-value
/// and 95% interval are undefined with fewer than two observations or zero variance.
pub fn one_sample_t_test(returns: &[f64]) -> OneSampleStats {
    let n = returns.len();
    let mean = mean(returns);
    let std = sample_std_dev(returns);

    let undefined = OneSampleStats {
        n,
        mean,
        std,
        t_statistic: None,
        p_value: None,
        ci_low: None,
        ci_high: None,
    };

    let (Some(mean_value), Some(std_value)) = (mean, std) else {
        return undefined;
    };
    if n < 2 || std_value <= 0.0 {
        return undefined;
    }

    let std_error = std_value / (n as f64).sqrt();
    let t_statistic = mean_value / std_error;
    let Ok(distribution) = StudentsT::new(0.0, 1.0, (n - 1) as f64) else {
        return undefined;
    };
    let p_value = two_sided_p_value(&distribution, t_statistic);
    let critical = distribution.inverse_cdf(CONFIDENCE_QUANTILE);

    OneSampleStats {
        n,
        mean,
        std,
        t_statistic: finite(t_statistic),
        p_value,
        ci_low: finite(mean_value - critical * std_error),
        ci_high: finite(mean_value + critical * std_error),
    }
}

/// Welch's unequal-variance two-sample t-test of mean(a) != mean(b).
pub fn welch_t_test(a: &[f64], b: &[f64]) -> WelchStats {
    let undefined = WelchStats {
        t_statistic: None,
        p_value: None,
    };

    let (Some(mean_a), Some(mean_b)) = (mean(a), mean(b)) else {
        return undefined;
    };
    let (Some(std_a), Some(std_b)) = (sample_std_dev(a), sample_std_dev(b)) else {
        return undefined;
    };

    let n_a = a.len() as f64;
    let n_b = b.len() as f64;
    let share_a = std_a * std_a / n_a;
    let share_b = std_b * std_b / n_b;
    let pooled = share_a + share_b;
    if pooled <= 0.0 || !pooled.is_finite() {
        return undefined;
    }

    let t_statistic = (mean_a - mean_b) / pooled.sqrt();
    let degrees_of_freedom =
        pooled * pooled / (share_a * share_a / (n_a - 1.0) + share_b * share_b / (n_b - 1.0));
    let Ok(distribution) = StudentsT::new(0.0, 1.0, degrees_of_freedom) else {
        return undefined;
    };

    WelchStats {
        t_statistic: finite(t_statistic),
        p_value: two_sided_p_value(&distribution, t_statistic),
    }
}

/// Benjamini-Hochberg adjusted p-values, aligned with the input. Undefined p-values are
/// left out of the family and stay undefined.
pub fn benjamini_hochberg(p_values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut order: Vec<(usize, f64)> = p_values
        .iter()
        .enumerate()
        .filter_map(|(idx, p)| p.filter(|value| value.is_finite()).map(|value| (idx, value)))
        .collect();
    order.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    let family_size = order.len() as f64;
    let mut adjusted = vec![None; p_values.len()];
    let mut running_min = f64::INFINITY;
    for (position, (idx, p_value)) in order.iter().enumerate().rev() {
        let rank = (position + 1) as f64;
        running_min = running_min.min(p_value * family_size / rank);
        adjusted[*idx] = Some(running_min.clamp(0.0, 1.0));
    }

    adjusted
}

fn run_one_sample_tests(
    by_sector: &BTreeMap<String, Vec<f64>>,
    periods_per_year: f64,
) -> Vec<SignificanceResult> {
    let mut results: Vec<SignificanceResult> = by_sector
        .iter()
        .map(|(sector, returns)| {
            let stats = one_sample_t_test(returns);
            if stats.t_statistic.is_none() {
                warn!(
                    "One-sample test undefined for {} ({} observation(s), std {:?})",
                    sector, stats.n, stats.std
                );
            }
            SignificanceResult {
                sector: sector.clone(),
                n: stats.n,
                mean: stats.mean,
                std: stats.std,
                t_statistic: stats.t_statistic,
                p_value: stats.p_value,
                p_value_fdr_adjusted: None,
                ci_low: stats.ci_low,
                ci_high: stats.ci_high,
                ann_mean_arith: stats.mean.map(|value| value * periods_per_year),
                ann_ci_low: stats.ci_low.map(|value| value * periods_per_year),
                ann_ci_high: stats.ci_high.map(|value| value * periods_per_year),
            }
        })
        .collect();

    let p_values: Vec<Option<f64>> = results.iter().map(|result| result.p_value).collect();
    for (result, adjusted) in results.iter_mut().zip(benjamini_hochberg(&p_values)) {
        result.p_value_fdr_adjusted = adjusted;
    }

    results.sort_by(|a, b| compare_defined_first(a.p_value_fdr_adjusted, b.p_value_fdr_adjusted));
    results
}

fn run_pairwise_tests(
    by_sector: &BTreeMap<String, Vec<f64>>,
    periods_per_year: f64,
) -> Vec<PairwiseResult> {
    let mut means: Vec<(&str, f64)> = by_sector
        .iter()
        .map(|(sector, returns)| (sector.as_str(), mean(returns).unwrap_or(0.0)))
        .collect();
    if means.len() < 2 {
        info!("Not enough sectors for a best-vs-rest comparison");
        return Vec::new();
    }
    means.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let (best, mean_best) = means[0];
    let best_returns = by_sector.get(best).map(Vec::as_slice).unwrap_or(&[]);
    let mut results: Vec<PairwiseResult> = means[1..]
        .iter()
        .map(|(other, mean_other)| {
            let other_returns = by_sector.get(*other).map(Vec::as_slice).unwrap_or(&[]);
            let stats = welch_t_test(best_returns, other_returns);
            PairwiseResult {
                best_sector: best.to_string(),
                other_sector: other.to_string(),
                t_statistic: stats.t_statistic,
                p_value: stats.p_value,
                p_value_fdr_adjusted: None,
                mean_best,
                mean_other: *mean_other,
                n_best: best_returns.len(),
                n_other: other_returns.len(),
                ann_mean_best: mean_best * periods_per_year,
                ann_mean_other: mean_other * periods_per_year,
            }
        })
        .collect();

    let p_values: Vec<Option<f64>> = results.iter().map(|result| result.p_value).collect();
    for (result, adjusted) in results.iter_mut().zip(benjamini_hochberg(&p_values)) {
        result.p_value_fdr_adjusted = adjusted;
    }

    results.sort_by(|a, b| compare_defined_first(a.p_value_fdr_adjusted, b.p_value_fdr_adjusted));
    results
}

fn returns_by_sector(rows: &[SectorDailyReturn]) -> BTreeMap<String, Vec<f64>> {
    let mut ordered: Vec<&SectorDailyReturn> = rows.iter().collect();
    ordered.sort_by(|a, b| a.date.cmp(&b.date));

    let mut by_sector: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in ordered {
        by_sector
            .entry(row.sector.clone())
            .or_default()
            .push(coerce_return(row.ret));
    }
    by_sector
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    finite(values.iter().sum::<f64>() / values.len() as f64)
}

fn two_sided_p_value(distribution: &StudentsT, t_statistic: f64) -> Option<f64> {
    if t_statistic.is_nan() {
        return None;
    }
    finite((2.0 * distribution.cdf(-t_statistic.abs())).min(1.0))
}

fn compare_defined_first(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
