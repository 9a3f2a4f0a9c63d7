use crate::models::PredictionRow;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

/// Groups prediction rows (by reference) keyed by date, ascending. Rows keep their
/// original relative order within a day.
pub fn group_predictions_by_date(rows: &[PredictionRow]) -> BTreeMap<NaiveDate, Vec<&PredictionRow>> {
    let mut grouped: BTreeMap<NaiveDate, Vec<&PredictionRow>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.date).or_default().push(row);
    }
    grouped
}

/// Groups rows keyed by sector, optionally restricting to a known sector list.
pub fn group_predictions_by_sector<'a>(
    rows: &[&'a PredictionRow],
    sectors: Option<&[String]>,
) -> HashMap<String, Vec<&'a PredictionRow>> {
    let mut grouped: HashMap<String, Vec<&PredictionRow>> = if let Some(list) = sectors {
        list.iter().map(|sector| (sector.clone(), Vec::new())).collect()
    } else {
        HashMap::new()
    };
    let restrict_to_known = sectors.is_some();

    for row in rows.iter().copied() {
        if let Some(bucket) = grouped.get_mut(&row.sector) {
            bucket.push(row);
            continue;
        }
        if !restrict_to_known {
            grouped.entry(row.sector.clone()).or_default().push(row);
        }
    }

    grouped
}

/// Count of rows per sector, in sector order.
pub fn sector_counts(rows: &[PredictionRow]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        *counts.entry(row.sector.clone()).or_insert(0) += 1;
    }
    counts
}

/// Normalizes a ticker string by trimming whitespace and uppercasing.
pub fn normalize_ticker_symbol(value: &str) -> Option<String> {
    let normalized = value.trim().to_uppercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(day: u32, ticker: &str, sector: &str, p: f64) -> PredictionRow {
        PredictionRow::new(
            NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            ticker,
            sector,
            p,
            0.0,
        )
    }

    #[test]
    fn groups_dates_ascending_and_keeps_row_order() {
        let rows = vec![
            row(3, "BBB", "Energy", 0.4),
            row(2, "AAA", "Energy", 0.6),
            row(3, "CCC", "Utilities", 0.7),
        ];
        let grouped = group_predictions_by_date(&rows);
        let dates: Vec<u32> = grouped.keys().map(|d| chrono::Datelike::day(d)).collect();
        assert_eq!(dates, vec![2, 3]);
        let day3: Vec<&str> = grouped.values().nth(1).unwrap().iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(day3, vec!["BBB", "CCC"]);
    }

    #[test]
    fn sector_grouping_filters_to_known_sectors() {
        let rows = vec![
            row(2, "AAA", "Energy", 0.6),
            row(2, "SPY", "Benchmark", 0.9),
        ];
        let refs: Vec<&PredictionRow> = rows.iter().collect();
        let known = vec!["Energy".to_string(), "Utilities".to_string()];
        let grouped = group_predictions_by_sector(&refs, Some(&known));
        assert_eq!(grouped.get("Energy").map(Vec::len), Some(1));
        assert_eq!(grouped.get("Utilities").map(Vec::len), Some(0));
        assert!(grouped.get("Benchmark").is_none());

        let unrestricted = group_predictions_by_sector(&refs, None);
        assert_eq!(unrestricted.len(), 2);
    }

    #[test]
    fn normalizes_tickers() {
        assert_eq!(normalize_ticker_symbol(" aapl "), Some("AAPL".to_string()));
        assert_eq!(normalize_ticker_symbol("   "), None);
    }
}
