use crate::calendar::{align, build_calendar};
use crate::config::{BacktestConfig, SelectionPolicy};
use crate::models::{DailyReturn, EquityCurvePoint, PerformanceSummary, PickRecord, PredictionRow};
use crate::performance::PerformanceCalculator;
use crate::prediction_utils::{group_predictions_by_date, group_predictions_by_sector};
use chrono::NaiveDate;
use indicatif::ProgressBar;
use log::{info, warn};
use std::cmp::Ordering;

pub const DAILY_PERIODS_PER_YEAR: f64 = 252.0;

/// Result of one backtest run. Daily returns and the equity curve cover every business
/// day between the first and last prediction date.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestOutput {
    pub calendar: Vec<NaiveDate>,
    pub daily_returns: Vec<DailyReturn>,
    pub picks: Vec<PickRecord>,
    pub equity_curve: Vec<EquityCurvePoint>,
    pub summary: PerformanceSummary,
}

struct DaySelection<'a> {
    selected: Vec<&'a PredictionRow>,
    missing_sectors: Vec<String>,
}

pub struct DailyBacktester<'a> {
    config: &'a BacktestConfig,
    progress: ProgressBar,
}

impl<'a> DailyBacktester<'a> {
    pub fn new(config: &'a BacktestConfig) -> Self {
        Self {
            config,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(&self, predictions: &[PredictionRow]) -> BacktestOutput {
        let by_date = group_predictions_by_date(predictions);
        let calendar = match (by_date.keys().next(), by_date.keys().next_back()) {
            (Some(first), Some(last)) => build_calendar(*first, *last),
            _ => Vec::new(),
        };

        info!(
            "Running {} backtest over {} prediction row(s), {} trading day(s), cost {} bps",
            self.config.policy.label(),
            predictions.len(),
            calendar.len(),
            self.config.cost_bps
        );

        let cost = self.config.cost_rate();
        let mut sparse_days: Vec<(NaiveDate, (f64, String))> = Vec::with_capacity(by_date.len());
        let mut picks = Vec::new();
        let mut ineligible_rows = 0usize;

        self.progress.set_length(by_date.len() as u64);
        for (date, rows) in &by_date {
            let eligible: Vec<&PredictionRow> = rows
                .iter()
                .copied()
                .filter(|row| self.is_eligible(row))
                .collect();
            ineligible_rows += rows.len() - eligible.len();

            let selection = self.select(&eligible);
            if selection.selected.is_empty() {
                sparse_days.push((*date, (0.0, String::new())));
                picks.extend(
                    self.config
                        .sectors
                        .iter()
                        .map(|sector| PickRecord::empty(*date, sector)),
                );
                self.progress.inc(1);
                continue;
            }

            let gross = selection
                .selected
                .iter()
                .map(|row| row.forward_return)
                .sum::<f64>()
                / selection.selected.len() as f64;
            let net = gross - cost;
            let tickers = selection
                .selected
                .iter()
                .map(|row| row.ticker.as_str())
                .collect::<Vec<_>>()
                .join(",");
            sparse_days.push((*date, (net, tickers)));

            for row in &selection.selected {
                picks.push(PickRecord {
                    date: *date,
                    ticker: row.ticker.clone(),
                    sector: row.sector.clone(),
                    net_return: row.forward_return - cost,
                });
            }
            for sector in &selection.missing_sectors {
                picks.push(PickRecord::empty(*date, sector));
            }
            self.progress.inc(1);
        }
        self.progress.finish_and_clear();

        if ineligible_rows > 0 {
            warn!(
                "Skipped {} prediction row(s) with a sector outside the enumeration or a non-numeric probability",
                ineligible_rows
            );
        }

        let aligned = align(sparse_days, &calendar, (0.0, String::new()));
        let daily_returns: Vec<DailyReturn> = aligned
            .iter()
            .map(|(date, (ret, _))| DailyReturn {
                date: *date,
                ret: *ret,
            })
            .collect();
        let equity_curve = build_equity_curve(&aligned);
        let returns: Vec<f64> = daily_returns.iter().map(|day| day.ret).collect();
        let summary = PerformanceCalculator::compute_metrics(&returns, DAILY_PERIODS_PER_YEAR);

        BacktestOutput {
            calendar,
            daily_returns,
            picks,
            equity_curve,
            summary,
        }
    }

    fn is_eligible(&self, row: &PredictionRow) -> bool {
        row.predicted_probability.is_finite() && self.config.sectors.contains(&row.sector)
    }

    fn select<'r>(&self, eligible: &[&'r PredictionRow]) -> DaySelection<'r> {
        match self.config.policy {
            SelectionPolicy::TopNGlobal { n } => DaySelection {
                selected: select_top_n(eligible, n),
                missing_sectors: Vec::new(),
            },
            SelectionPolicy::TopPerSector => {
                let grouped = group_predictions_by_sector(eligible, Some(self.config.sectors.names()));
                let mut selected = Vec::new();
                let mut missing_sectors = Vec::new();
                for sector in self.config.sectors.iter() {
                    match grouped.get(sector).and_then(|rows| highest_probability(rows)) {
                        Some(row) => selected.push(row),
                        None => missing_sectors.push(sector.to_string()),
                    }
                }
                DaySelection {
                    selected,
                    missing_sectors,
                }
            }
        }
    }
}

/// Runs the daily selection policy and returns the calendarized daily returns together
/// with the per-position pick records.
pub fn run_backtest(
    predictions: &[PredictionRow],
    config: &BacktestConfig,
) -> (Vec<DailyReturn>, Vec<PickRecord>) {
    let output = DailyBacktester::new(config).run(predictions);
    (output.daily_returns, output.picks)
}

/// Candidates ranked by probability, highest first. Ties keep input row order.
fn select_top_n<'r>(eligible: &[&'r PredictionRow], n: usize) -> Vec<&'r PredictionRow> {
    let mut ranked = eligible.to_vec();
    ranked.sort_by(|a, b| {
        b.predicted_probability
            .partial_cmp(&a.predicted_probability)
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(n);
    ranked
}

fn highest_probability<'r>(rows: &[&'r PredictionRow]) -> Option<&'r PredictionRow> {
    let mut best: Option<&PredictionRow> = None;
    for row in rows.iter().copied() {
        match best {
            Some(current) if current.predicted_probability >= row.predicted_probability => {}
            _ => best = Some(row),
        }
    }
    best
}

fn build_equity_curve(aligned: &[(NaiveDate, (f64, String))]) -> Vec<EquityCurvePoint> {
    let mut equity = 1.0;
    aligned
        .iter()
        .map(|(date, (ret, tickers))| {
            equity *= 1.0 + ret;
            EquityCurvePoint {
                date: *date,
                ret: *ret,
                cumulative_equity: equity,
                cumulative_return: equity - 1.0,
                selected_tickers: tickers.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SectorUniverse;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn row(day: u32, ticker: &str, sector: &str, p: f64, fwd: f64) -> PredictionRow {
        PredictionRow::new(date(day), ticker, sector, p, fwd)
    }

    fn config(policy: SelectionPolicy, cost_bps: f64) -> BacktestConfig {
        BacktestConfig {
            policy,
            cost_bps,
            sectors: SectorUniverse::new(["Energy", "Technology", "Utilities"]).unwrap(),
        }
    }

    #[test]
    fn top_per_sector_emits_placeholder_for_missing_sector() {
        let predictions = vec![
            row(2, "XOM", "Energy", 0.7, 0.02),
            row(2, "CVX", "Energy", 0.8, -0.01),
            row(2, "AAPL", "Technology", 0.6, 0.03),
        ];
        let cfg = config(SelectionPolicy::TopPerSector, 10.0);
        let (daily, picks) = run_backtest(&predictions, &cfg);

        assert_eq!(picks.len(), 3);
        let placeholder: Vec<&PickRecord> = picks.iter().filter(|p| p.is_placeholder()).collect();
        assert_eq!(placeholder.len(), 1);
        assert_eq!(placeholder[0].sector, "Utilities");
        assert_eq!(placeholder[0].net_return, 0.0);

        assert_eq!(daily.len(), 1);
        let expected = (-0.01 + 0.03) / 2.0 - 0.001;
        assert!((daily[0].ret - expected).abs() < 1e-12);

        let energy = picks.iter().find(|p| p.sector == "Energy").unwrap();
        assert_eq!(energy.ticker, "CVX");
        assert!((energy.net_return - (-0.011)).abs() < 1e-12);
    }

    #[test]
    fn top_n_ranks_globally_with_stable_ties() {
        let predictions = vec![
            row(2, "AAA", "Energy", 0.5, 0.01),
            row(2, "BBB", "Technology", 0.9, 0.02),
            row(2, "CCC", "Utilities", 0.5, 0.03),
            row(2, "DDD", "Technology", 0.1, 0.04),
        ];
        let cfg = config(SelectionPolicy::TopNGlobal { n: 2 }, 0.0);
        let output = DailyBacktester::new(&cfg).run(&predictions);

        let tickers: Vec<&str> = output.picks.iter().map(|p| p.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["BBB", "AAA"]);
        assert_eq!(output.equity_curve[0].selected_tickers, "BBB,AAA");
        assert!((output.daily_returns[0].ret - 0.015).abs() < 1e-12);
    }

    #[test]
    fn top_n_takes_all_when_fewer_candidates() {
        let predictions = vec![row(2, "AAA", "Energy", 0.5, 0.01)];
        let cfg = config(SelectionPolicy::TopNGlobal { n: 10 }, 0.0);
        let (daily, picks) = run_backtest(&predictions, &cfg);
        assert_eq!(picks.len(), 1);
        assert!((daily[0].ret - 0.01).abs() < 1e-12);
    }

    #[test]
    fn cost_is_charged_once_per_day() {
        let predictions = vec![
            row(2, "AAA", "Energy", 0.5, 0.01),
            row(2, "BBB", "Technology", 0.6, 0.01),
            row(2, "CCC", "Utilities", 0.7, 0.01),
        ];
        let cfg = config(SelectionPolicy::TopPerSector, 25.0);
        let (daily, _) = run_backtest(&predictions, &cfg);
        assert!((daily[0].ret - (0.01 - 0.0025)).abs() < 1e-12);
    }

    #[test]
    fn gaps_and_ineligible_days_are_flat() {
        // 2024-01-02 (Tue) traded, 01-03 only benchmark rows, 01-04 missing, 01-05 traded
        let predictions = vec![
            row(2, "AAA", "Energy", 0.5, 0.01),
            row(3, "SPY", "Benchmark", 0.9, 0.05),
            row(5, "BBB", "Technology", 0.6, 0.02),
        ];
        let cfg = config(SelectionPolicy::TopPerSector, 0.0);
        let output = DailyBacktester::new(&cfg).run(&predictions);

        assert_eq!(output.calendar.len(), 4);
        let returns: Vec<f64> = output.daily_returns.iter().map(|d| d.ret).collect();
        assert_eq!(returns, vec![0.01, 0.0, 0.0, 0.02]);

        let flat_day: Vec<&PickRecord> = output.picks.iter().filter(|p| p.date == date(3)).collect();
        assert_eq!(flat_day.len(), 3);
        assert!(flat_day.iter().all(|p| p.is_placeholder() && p.net_return == 0.0));

        assert_eq!(output.equity_curve.len(), 4);
        assert_eq!(output.equity_curve[2].selected_tickers, "");
        let last = output.equity_curve.last().unwrap();
        assert!((last.cumulative_equity - 1.01 * 1.02).abs() < 1e-12);
        assert!((last.cumulative_return - (1.01 * 1.02 - 1.0)).abs() < 1e-12);
        assert_eq!(output.summary.days, 4);
        assert_eq!(output.summary.non_zero_days, 2);
    }

    #[test]
    fn non_numeric_probability_is_ineligible() {
        let predictions = vec![
            row(2, "AAA", "Energy", f64::NAN, 0.5),
            row(2, "BBB", "Energy", 0.2, 0.01),
        ];
        let cfg = config(SelectionPolicy::TopPerSector, 0.0);
        let (daily, picks) = run_backtest(&predictions, &cfg);
        assert!(picks.iter().any(|p| p.ticker == "BBB"));
        assert!((daily[0].ret - 0.01).abs() < 1e-12);
    }

    #[test]
    fn empty_predictions_produce_empty_run() {
        let cfg = config(SelectionPolicy::TopPerSector, 10.0);
        let output = DailyBacktester::new(&cfg).run(&[]);
        assert!(output.calendar.is_empty());
        assert!(output.daily_returns.is_empty());
        assert!(output.picks.is_empty());
        assert!(output.summary.sharpe.is_none());
    }

    #[test]
    fn repeated_runs_are_identical() {
        let predictions = vec![
            row(2, "AAA", "Energy", 0.5, 0.01),
            row(2, "BBB", "Technology", 0.9, -0.02),
            row(3, "CCC", "Utilities", 0.4, 0.03),
            row(4, "DDD", "Technology", 0.3, 0.04),
        ];
        for policy in [SelectionPolicy::TopPerSector, SelectionPolicy::TopNGlobal { n: 2 }] {
            let cfg = config(policy, 10.0);
            assert_eq!(run_backtest(&predictions, &cfg), run_backtest(&predictions, &cfg));
        }
    }
}
