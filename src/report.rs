use crate::models::{PerformanceSummary, SectorStatsRow};
use crate::significance::SignificanceReport;

const UNDEFINED: &str = "n/a";

pub fn percent(value: Option<f64>) -> String {
    match value {
        Some(value) if value.is_finite() => format!("{:.2}%", value * 100.0),
        _ => UNDEFINED.to_string(),
    }
}

pub fn decimal(value: Option<f64>, places: usize) -> String {
    match value {
        Some(value) if value.is_finite() => format!("{:.*}", places, value),
        _ => UNDEFINED.to_string(),
    }
}

pub fn portfolio_summary(label: &str, summary: &PerformanceSummary) -> String {
    render(vec![
        format!("=== Portfolio Metrics ({} mode, daily-based) ===", label),
        format!(
            "Days: {}  |  Non-zero days: {}",
            summary.days, summary.non_zero_days
        ),
        format!("Annualized Return (arith): {}", percent(summary.ann_return_arith)),
        format!("Annualized Return (geom):  {}", percent(summary.ann_return_geom)),
        format!("Annualized Volatility:     {}", percent(summary.ann_vol)),
        format!("Sharpe Ratio:              {}", decimal(summary.sharpe, 2)),
        format!("Max Drawdown:              {}", percent(summary.max_drawdown)),
    ])
}

/// Sharpe leaders and laggards of an already ranked sector-stats table.
pub fn sector_extremes(title: &str, rows: &[SectorStatsRow], count: usize) -> String {
    let mut lines = vec![title.to_string()];
    if rows.is_empty() {
        lines.push("  (no sectors)".to_string());
        return render(lines);
    }

    let count = count.min(rows.len());
    lines.push(format!("  Top {} by Sharpe:", count));
    lines.extend(rows.iter().take(count).map(|row| format!("    {}", sector_line(row))));
    lines.push(format!("  Bottom {} by Sharpe:", count));
    lines.extend(
        rows.iter()
            .rev()
            .take(count)
            .map(|row| format!("    {}", sector_line(row))),
    );
    render(lines)
}

fn sector_line(row: &SectorStatsRow) -> String {
    format!(
        "{:<24} sharpe {:>7.3}  ann {:>8}  days {:>5}  non-zero {:>5}",
        row.sector,
        row.sharpe,
        percent(Some(row.ann_return_arith)),
        row.days,
        row.non_zero_days
    )
}

pub fn significance_tables(report: &SignificanceReport) -> String {
    let frequency = report.frequency.label();
    let mut lines = vec![
        format!("Per-sector one-sample t-tests vs 0 ({} returns):", frequency),
        format!(
            "{:<24} {:>5} {:>9} {:>8} {:>9} {:>9} {:>10} {:>21}",
            "sector", "n", "mean", "t", "p", "p_fdr", "ann_mean", "ann_95%_ci"
        ),
    ];
    for result in &report.one_sample {
        let interval = match (result.ann_ci_low, result.ann_ci_high) {
            (Some(low), Some(high)) => format!("[{}, {}]", percent(Some(low)), percent(Some(high))),
            _ => UNDEFINED.to_string(),
        };
        lines.push(format!(
            "{:<24} {:>5} {:>9} {:>8} {:>9} {:>9} {:>10} {:>21}",
            result.sector,
            result.n,
            percent(result.mean),
            decimal(result.t_statistic, 2),
            decimal(result.p_value, 4),
            decimal(result.p_value_fdr_adjusted, 4),
            percent(result.ann_mean_arith),
            interval
        ));
    }

    let Some(best) = report.pairwise.first() else {
        lines.push(format!("Not enough sectors for pairwise {} tests.", frequency));
        return render(lines);
    };
    lines.push(format!(
        "Best-vs-rest Welch t-tests ({} returns, best = {}, mean {}):",
        frequency,
        best.best_sector,
        percent(Some(best.mean_best))
    ));
    lines.push(format!(
        "{:<24} {:>9} {:>8} {:>9} {:>9}",
        "other_sector", "mean", "t", "p", "p_fdr"
    ));
    for result in &report.pairwise {
        lines.push(format!(
            "{:<24} {:>9} {:>8} {:>9} {:>9}",
            result.other_sector,
            percent(Some(result.mean_other)),
            decimal(result.t_statistic, 2),
            decimal(result.p_value, 4),
            decimal(result.p_value_fdr_adjusted, 4)
        ));
    }
    render(lines)
}

fn render(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
