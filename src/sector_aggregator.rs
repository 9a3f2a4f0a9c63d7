use crate::backtester::DAILY_PERIODS_PER_YEAR;
use crate::config::SectorUniverse;
use crate::error::EngineError;
use crate::models::{PickRecord, PredictionRow, SectorDailyReturn, SectorPerformance};
use crate::performance::PerformanceCalculator;
use chrono::NaiveDate;
use log::warn;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Dense (date x sector) return table: one row for every calendar day and every sector,
/// ordered by date then sector.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorDailyGrid {
    sectors: Vec<String>,
    rows: Vec<SectorDailyReturn>,
}

impl SectorDailyGrid {
    pub fn rows(&self) -> &[SectorDailyReturn] {
        &self.rows
    }

    /// Return series of one sector in calendar order.
    pub fn sector_returns(&self, sector: &str) -> Vec<f64> {
        self.rows
            .iter()
            .filter(|row| row.sector == sector)
            .map(|row| row.ret)
            .collect()
    }
}

/// Averages pick returns per (date, sector) and spreads them over the full calendar x
/// sector skeleton, filling absent cells with 0.0.
pub fn aggregate(
    picks: &[PickRecord],
    calendar: &[NaiveDate],
    sectors: &SectorUniverse,
) -> Result<SectorDailyGrid, EngineError> {
    build_grid(
        picks
            .iter()
            .map(|pick| (pick.date, pick.sector.as_str(), pick.net_return)),
        calendar,
        sectors,
    )
}

/// Equal-weight sector returns over every candidate, regardless of selection. Serves as
/// the universe baseline the selected picks are compared against.
pub fn aggregate_universe(
    predictions: &[PredictionRow],
    calendar: &[NaiveDate],
    sectors: &SectorUniverse,
) -> Result<SectorDailyGrid, EngineError> {
    build_grid(
        predictions
            .iter()
            .map(|row| (row.date, row.sector.as_str(), row.forward_return)),
        calendar,
        sectors,
    )
}

/// Summarizes every sector of the grid, best Sharpe first. Undefined Sharpe ratios rank
/// as 0.0; ties keep sector order.
pub fn per_sector_metrics(grid: &SectorDailyGrid) -> Vec<SectorPerformance> {
    let mut performances: Vec<SectorPerformance> = grid
        .sectors
        .iter()
        .map(|sector| {
            let returns = grid.sector_returns(sector);
            SectorPerformance {
                sector: sector.clone(),
                summary: PerformanceCalculator::compute_metrics(&returns, DAILY_PERIODS_PER_YEAR),
            }
        })
        .collect();

    performances.sort_by(|a, b| {
        let a_sharpe = a.summary.sharpe.unwrap_or(0.0);
        let b_sharpe = b.summary.sharpe.unwrap_or(0.0);
        b_sharpe.partial_cmp(&a_sharpe).unwrap_or(Ordering::Equal)
    });
    performances
}

fn build_grid<'a, I>(
    entries: I,
    calendar: &[NaiveDate],
    sectors: &SectorUniverse,
) -> Result<SectorDailyGrid, EngineError>
where
    I: Iterator<Item = (NaiveDate, &'a str, f64)>,
{
    if calendar.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(EngineError::InvariantViolation(
            "calendar must be strictly ascending".to_string(),
        ));
    }

    let entries: Vec<(NaiveDate, &str, f64)> = entries.collect();
    let off_calendar = off_calendar_count(entries.iter().map(|(date, _, _)| *date), calendar);
    if off_calendar > 0 {
        warn!(
            "Skipped {} sector return(s) dated outside the business-day calendar",
            off_calendar
        );
    }

    let mut sums: HashMap<(NaiveDate, &str), (f64, usize)> = HashMap::new();
    for (date, sector, ret) in entries {
        let cell = sums.entry((date, sector)).or_insert((0.0, 0));
        cell.0 += ret;
        cell.1 += 1;
    }

    let mut rows = Vec::with_capacity(calendar.len() * sectors.len());
    for date in calendar {
        for sector in sectors.iter() {
            let ret = sums
                .get(&(*date, sector))
                .map(|(sum, count)| sum / *count as f64)
                .unwrap_or(0.0);
            rows.push(SectorDailyReturn {
                date: *date,
                sector: sector.to_string(),
                ret,
            });
        }
    }

    let expected = calendar.len() * sectors.len();
    if rows.len() != expected {
        return Err(EngineError::InvariantViolation(format!(
            "sector grid has {} rows, expected {} days x {} sectors = {}",
            rows.len(),
            calendar.len(),
            sectors.len(),
            expected
        )));
    }

    Ok(SectorDailyGrid {
        sectors: sectors.names().to_vec(),
        rows,
    })
}

fn off_calendar_count<I>(dates: I, calendar: &[NaiveDate]) -> usize
where
    I: IntoIterator<Item = NaiveDate>,
{
    dates
        .into_iter()
        .filter(|date| calendar.binary_search(date).is_err())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::build_calendar;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn pick(day: u32, ticker: &str, sector: &str, ret: f64) -> PickRecord {
        PickRecord {
            date: date(day),
            ticker: ticker.to_string(),
            sector: sector.to_string(),
            net_return: ret,
        }
    }

    #[test]
    fn sparse_picks_fill_the_whole_grid() {
        let sectors = SectorUniverse::new(["Energy", "Technology", "Utilities"]).unwrap();
        let calendar = build_calendar(date(1), date(12));
        let picks = vec![pick(3, "XOM", "Energy", 0.01)];

        let grid = aggregate(&picks, &calendar, &sectors).unwrap();

        assert_eq!(calendar.len(), 10);
        assert_eq!(grid.rows().len(), calendar.len() * sectors.len());
        assert_eq!(grid.rows()[0].sector, "Energy");
        assert_eq!(grid.rows()[1].sector, "Technology");
        let energy = grid.sector_returns("Energy");
        assert_eq!(energy.len(), 10);
        assert_eq!(energy.iter().filter(|r| **r != 0.0).count(), 1);
    }

    #[test]
    fn same_day_picks_in_a_sector_are_averaged() {
        let sectors = SectorUniverse::new(["Energy", "Technology"]).unwrap();
        let calendar = build_calendar(date(2), date(2));
        let picks = vec![
            pick(2, "XOM", "Energy", 0.01),
            pick(2, "CVX", "Energy", 0.03),
            pick(2, "", "Technology", 0.0),
        ];

        let grid = aggregate(&picks, &calendar, &sectors).unwrap();
        assert!((grid.sector_returns("Energy")[0] - 0.02).abs() < 1e-12);
        assert_eq!(grid.sector_returns("Technology"), vec![0.0]);
    }

    #[test]
    fn picks_outside_the_enumeration_or_calendar_are_ignored() {
        let sectors = SectorUniverse::new(["Energy"]).unwrap();
        let calendar = build_calendar(date(2), date(3));
        let picks = vec![pick(2, "SPY", "Benchmark", 0.05), pick(6, "XOM", "Energy", 0.02)];

        let grid = aggregate(&picks, &calendar, &sectors).unwrap();
        assert_eq!(grid.rows().len(), 2);
        assert!(grid.rows().iter().all(|row| row.ret == 0.0 && row.sector == "Energy"));
    }

    #[test]
    fn weekend_entries_are_counted_as_off_calendar() {
        let calendar = build_calendar(date(5), date(8));
        // Jan 6 and 7 fall on the weekend
        let dates = [date(5), date(6), date(7), date(8), date(8)];
        assert_eq!(off_calendar_count(dates, &calendar), 2);

        let sectors = SectorUniverse::new(["Energy"]).unwrap();
        let predictions = vec![
            PredictionRow::new(date(5), "XOM", "Energy", 0.9, 0.01),
            PredictionRow::new(date(6), "XOM", "Energy", 0.9, 0.50),
        ];
        let grid = aggregate_universe(&predictions, &calendar, &sectors).unwrap();
        assert_eq!(grid.sector_returns("Energy"), vec![0.01, 0.0]);
    }

    #[test]
    fn unordered_calendar_is_an_invariant_violation() {
        let sectors = SectorUniverse::new(["Energy"]).unwrap();
        let calendar = vec![date(3), date(2)];
        let err = aggregate(&[], &calendar, &sectors).unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
    }

    #[test]
    fn metrics_rank_by_sharpe_with_undefined_last() {
        let sectors = SectorUniverse::new(["Energy", "Technology", "Utilities"]).unwrap();
        let calendar = build_calendar(date(1), date(5));
        let picks = vec![
            pick(1, "XOM", "Energy", 0.01),
            pick(2, "XOM", "Energy", -0.02),
            pick(1, "AAPL", "Technology", 0.03),
            pick(2, "AAPL", "Technology", 0.01),
        ];

        let grid = aggregate(&picks, &calendar, &sectors).unwrap();
        let ranked = per_sector_metrics(&grid);

        let order: Vec<&str> = ranked.iter().map(|p| p.sector.as_str()).collect();
        assert_eq!(order, vec!["Technology", "Utilities", "Energy"]);
        assert!(ranked[1].summary.sharpe.is_none());
        assert!(ranked.iter().all(|p| p.summary.days == 5));
    }

    #[test]
    fn non_zero_days_round_trip_from_grid() {
        let sectors = SectorUniverse::new(["Energy", "Technology"]).unwrap();
        let calendar = build_calendar(date(1), date(12));
        let picks = vec![
            pick(1, "XOM", "Energy", 0.01),
            pick(4, "XOM", "Energy", -0.01),
            pick(9, "AAPL", "Technology", 0.02),
        ];

        let grid = aggregate(&picks, &calendar, &sectors).unwrap();
        for performance in per_sector_metrics(&grid) {
            let direct = grid
                .rows()
                .iter()
                .filter(|row| row.sector == performance.sector && row.ret != 0.0)
                .count();
            assert_eq!(performance.summary.non_zero_days, direct);
        }
    }

    #[test]
    fn universe_baseline_averages_all_candidates() {
        let sectors = SectorUniverse::new(["Energy"]).unwrap();
        let calendar = build_calendar(date(2), date(2));
        let predictions = vec![
            PredictionRow::new(date(2), "XOM", "Energy", 0.9, 0.04),
            PredictionRow::new(date(2), "CVX", "Energy", 0.1, -0.02),
        ];
        let grid = aggregate_universe(&predictions, &calendar, &sectors).unwrap();
        assert!((grid.sector_returns("Energy")[0] - 0.01).abs() < 1e-12);
    }
}
