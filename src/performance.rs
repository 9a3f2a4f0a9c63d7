use crate::models::{coerce_return, PerformanceSummary};
use statrs::statistics::Statistics;

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    /// Summarizes a simple-return series. `periods_per_year` must match the sampling of the
    /// series (252 daily, 52 weekly); it is never inferred from the data.
    pub fn compute_metrics(returns: &[f64], periods_per_year: f64) -> PerformanceSummary {
        let returns: Vec<f64> = returns.iter().copied().map(coerce_return).collect();
        let days = returns.len();
        let non_zero_days = returns.iter().filter(|value| **value != 0.0).count();

        if returns.is_empty() {
            return PerformanceSummary {
                days: 0,
                non_zero_days: 0,
                ann_return_arith: None,
                ann_return_geom: None,
                ann_vol: None,
                sharpe: None,
                max_drawdown: None,
            };
        }

        let mean_return = returns.iter().mean();
        let ann_return_arith = finite(mean_return * periods_per_year);
        let ann_vol =
            sample_std_dev(&returns).and_then(|std_dev| finite(std_dev * periods_per_year.sqrt()));
        let sharpe = Self::calculate_sharpe_ratio(ann_return_arith, ann_vol);

        let equity = Self::equity_curve(&returns);
        let total_return = equity.last().copied().unwrap_or(1.0) - 1.0;
        let ann_return_geom =
            finite((1.0 + total_return).powf(periods_per_year / days as f64) - 1.0);
        let max_drawdown = Self::calculate_max_drawdown(&equity);

        PerformanceSummary {
            days,
            non_zero_days,
            ann_return_arith,
            ann_return_geom,
            ann_vol,
            sharpe,
            max_drawdown,
        }
    }

    /// Cumulative product of (1 + r).
    pub fn equity_curve(returns: &[f64]) -> Vec<f64> {
        returns
            .iter()
            .scan(1.0, |equity, value| {
                *equity *= 1.0 + value;
                Some(*equity)
            })
            .collect()
    }

    fn calculate_sharpe_ratio(ann_return: Option<f64>, ann_vol: Option<f64>) -> Option<f64> {
        match (ann_return, ann_vol) {
            (Some(ann_return), Some(ann_vol)) if ann_vol > 0.0 => finite(ann_return / ann_vol),
            _ => None,
        }
    }

    fn calculate_max_drawdown(equity: &[f64]) -> Option<f64> {
        let mut peak = f64::NEG_INFINITY;
        let mut max_drawdown: Option<f64> = None;

        for value in equity.iter().copied() {
            if value > peak {
                peak = value;
            }
            let drawdown = if peak != 0.0 { value / peak - 1.0 } else { 0.0 };
            max_drawdown = Some(match max_drawdown {
                Some(current) if current <= drawdown => current,
                _ => drawdown,
            });
        }

        max_drawdown
    }
}

/// Unbiased (n - 1) standard deviation. A constant series is exactly 0.0 so that
/// rounding in the running sums never masquerades as variance.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let first = values[0];
    if values.iter().all(|value| *value == first) {
        return Some(0.0);
    }
    finite(values.iter().std_dev())
}

pub(crate) fn finite(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAILY: f64 = 252.0;

    #[test]
    fn empty_series_reports_undefined_figures() {
        let summary = PerformanceCalculator::compute_metrics(&[], DAILY);
        assert_eq!(summary.days, 0);
        assert_eq!(summary.non_zero_days, 0);
        assert!(summary.ann_return_arith.is_none());
        assert!(summary.ann_return_geom.is_none());
        assert!(summary.ann_vol.is_none());
        assert!(summary.sharpe.is_none());
        assert!(summary.max_drawdown.is_none());
    }

    #[test]
    fn drawdown_measured_from_running_peak() {
        let returns = [0.01, -0.02, 0.0, 0.03, 0.0];
        let equity = PerformanceCalculator::equity_curve(&returns);
        let expected = [1.01, 0.9898, 0.9898, 1.019494, 1.019494];
        for (value, want) in equity.iter().zip(expected.iter()) {
            assert!((value - want).abs() < 1e-9, "equity={value} expected={want}");
        }

        let summary = PerformanceCalculator::compute_metrics(&returns, DAILY);
        let max_drawdown = summary.max_drawdown.unwrap();
        assert!((max_drawdown - (0.9898 / 1.01 - 1.0)).abs() < 1e-12);
        assert_eq!(summary.days, 5);
        assert_eq!(summary.non_zero_days, 3);
    }

    #[test]
    fn geometric_return_uses_compounded_total() {
        let returns = [0.01, -0.02, 0.0, 0.03, 0.0];
        let summary = PerformanceCalculator::compute_metrics(&returns, DAILY);
        let total: f64 = returns.iter().map(|r| 1.0 + r).product::<f64>() - 1.0;
        let expected = (1.0 + total).powf(DAILY / 5.0) - 1.0;
        assert!((summary.ann_return_geom.unwrap() - expected).abs() < 1e-9);

        let mean = returns.iter().sum::<f64>() / 5.0;
        assert!((summary.ann_return_arith.unwrap() - mean * DAILY).abs() < 1e-12);
    }

    #[test]
    fn annualization_follows_supplied_period() {
        let returns = [0.01, 0.02, -0.01, 0.005];
        let daily = PerformanceCalculator::compute_metrics(&returns, 252.0);
        let weekly = PerformanceCalculator::compute_metrics(&returns, 52.0);
        let ratio = daily.ann_vol.unwrap() / weekly.ann_vol.unwrap();
        assert!((ratio - (252.0_f64 / 52.0).sqrt()).abs() < 1e-9);
        let sharpe_ratio = daily.sharpe.unwrap() / weekly.sharpe.unwrap();
        assert!((sharpe_ratio - (252.0_f64 / 52.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn constant_series_has_no_sharpe() {
        let summary = PerformanceCalculator::compute_metrics(&[0.01, 0.01, 0.01], DAILY);
        assert_eq!(summary.ann_vol, Some(0.0));
        assert!(summary.sharpe.is_none());
        assert_eq!(summary.max_drawdown, Some(0.0));
    }

    #[test]
    fn single_observation_has_no_volatility() {
        let summary = PerformanceCalculator::compute_metrics(&[0.01], DAILY);
        assert!(summary.ann_vol.is_none());
        assert!(summary.sharpe.is_none());
        assert!(summary.ann_return_arith.is_some());
        assert_eq!(summary.max_drawdown, Some(0.0));
    }

    #[test]
    fn non_finite_values_count_as_flat_days() {
        let summary =
            PerformanceCalculator::compute_metrics(&[0.01, f64::NAN, f64::INFINITY, -0.01], DAILY);
        assert_eq!(summary.days, 4);
        assert_eq!(summary.non_zero_days, 2);
        assert!(summary.ann_return_arith.unwrap().abs() < 1e-12);
    }

    #[test]
    fn drawdown_is_never_positive() {
        let series = [
            vec![0.05, 0.04, 0.03],
            vec![-0.1, 0.2, -0.3, 0.4],
            vec![0.0, 0.0],
            vec![-0.5, -0.5, 1.0],
            vec![-0.1, 0.05],
        ];
        for returns in series {
            let max_drawdown = PerformanceCalculator::compute_metrics(&returns, DAILY)
                .max_drawdown
                .unwrap();
            assert!(max_drawdown <= 0.0);
            // equity is compared against its own running peak, so only moves after the
            // first observation can open a drawdown
            let monotone = returns.iter().skip(1).all(|r| *r >= 0.0);
            assert_eq!(max_drawdown == 0.0, monotone, "returns={returns:?}");
        }
    }
}
