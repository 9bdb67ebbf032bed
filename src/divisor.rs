//! Elapsed-day denominators for monthly daily averages.
//!
//! Source files often pre-fill every day of a month with zero-sales
//! placeholder rows, so the largest day indicator is not the number of days
//! that actually elapsed. The estimator looks at the largest day that carried
//! sales instead, and treats a lone day-1 row as a monthly summary.

use crate::periods::PeriodKey;
use crate::schema::{LedgerRow, LedgerTable};
use log::debug;
use std::collections::BTreeSet;

/// How the divisor for one period was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivisorDecision {
    /// No day-indicator column in the file.
    NoDayColumn,
    /// The period has no rows at all.
    NoRows,
    /// Largest day indicator among rows with positive sales.
    LastDayWithSales(u32),
    /// Only day 1 carried sales; read as one summary row for the month.
    MonthlySummary,
    /// No positive sales; largest day indicator over all rows of the period.
    RawMaximum(u32),
    /// No usable day indicator.
    Calendar,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DaysDivisor {
    /// One entry per requested period.
    pub days: Vec<u32>,
    pub decisions: Vec<DivisorDecision>,
    /// Human-readable decision trail.
    pub trace: Vec<String>,
}

fn decide(rows: &[&LedgerRow], period: PeriodKey, trace: &mut Vec<String>) -> (u32, DivisorDecision) {
    let calendar = period.days_in_month();
    if rows.is_empty() {
        trace.push(format!("Month {}: No data found. Using {} calendar days.", period, calendar));
        return (calendar, DivisorDecision::NoRows);
    }

    let with_sales: Vec<&&LedgerRow> = rows.iter().filter(|r| r.sales > 0.0).collect();
    if !with_sales.is_empty() {
        let max_day = with_sales.iter().filter_map(|r| r.day_number()).max();
        let distinct: BTreeSet<Option<u32>> = with_sales.iter().map(|r| r.day_number()).collect();
        trace.push(format!(
            "Month {}: Max day with sales>0 is {}",
            period,
            max_day.map_or_else(|| "unknown".to_string(), |d| d.to_string())
        ));

        return match max_day {
            Some(1) if distinct.len() == 1 => {
                trace.push(format!(
                    "Month {}: Monthly summary detected (day 1 only). Using {} days.",
                    period, calendar
                ));
                (calendar, DivisorDecision::MonthlySummary)
            }
            Some(day) if day > 0 => (day, DivisorDecision::LastDayWithSales(day)),
            _ => {
                trace.push(format!("Month {}: Unusable day values. Using {} calendar days.", period, calendar));
                (calendar, DivisorDecision::Calendar)
            }
        };
    }

    let raw_max = rows.iter().filter_map(|r| r.day_number()).max();
    match raw_max {
        Some(day) if day > 0 => {
            trace.push(format!("Month {}: No sales > 0. Using raw max {}", period, day));
            (day, DivisorDecision::RawMaximum(day))
        }
        _ => {
            trace.push(format!(
                "Month {}: No sales > 0 and no usable day values. Using {} calendar days.",
                period, calendar
            ));
            (calendar, DivisorDecision::Calendar)
        }
    }
}

/// One divisor per entry of `periods`, computed over every row of `table`.
pub fn estimate_days(table: &LedgerTable, periods: &[PeriodKey]) -> DaysDivisor {
    estimate_days_for_rows(table, &table.rows.iter().collect::<Vec<_>>(), periods)
}

/// Like [`estimate_days`], but restricted to an already filtered row subset.
/// `table` only supplies the column metadata.
pub fn estimate_days_for_rows(
    table: &LedgerTable,
    rows: &[&LedgerRow],
    periods: &[PeriodKey],
) -> DaysDivisor {
    let mut result = DaysDivisor::default();
    result
        .trace
        .push(format!("Columns found: {:?}", table.columns.iter().collect::<Vec<_>>()));

    let Some(day_column) = table.day_column.as_deref() else {
        result.trace.push(
            "Day column not found among candidates. Using calendar days for every month.".to_string(),
        );
        for period in periods {
            result.days.push(period.days_in_month());
            result.decisions.push(DivisorDecision::NoDayColumn);
        }
        debug!("No day column; {} months use calendar days", periods.len());
        return result;
    };
    result.trace.push(format!("Using '{}' as day column.", day_column));

    for period in periods {
        let in_period: Vec<&LedgerRow> = rows
            .iter()
            .copied()
            .filter(|r| r.period == Some(*period))
            .collect();
        let (days, decision) = decide(&in_period, *period, &mut result.trace);
        debug!("Month {}: divisor {} ({:?})", period, days, decision);
        result.days.push(days);
        result.decisions.push(decision);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::columns;

    fn key(value: i64) -> PeriodKey {
        PeriodKey::from_encoded(value).unwrap()
    }

    fn row(period: i64, day: &str, sales: f64) -> LedgerRow {
        LedgerRow {
            period: PeriodKey::from_encoded(period),
            day: Some(day.to_string()),
            sales,
            ..Default::default()
        }
    }

    fn table(rows: Vec<LedgerRow>) -> LedgerTable {
        LedgerTable {
            columns: [columns::PERIOD, columns::SALES, "일구분"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            day_column: Some("일구분".to_string()),
            rows,
        }
    }

    #[test]
    fn test_placeholder_days_are_ignored() {
        let mut rows: Vec<LedgerRow> = (1..=9).map(|d| row(2501, &d.to_string(), 1000.0)).collect();
        rows.extend((10..=31).map(|d| row(2501, &d.to_string(), 0.0)));

        let result = estimate_days(&table(rows), &[key(2501)]);
        assert_eq!(result.days, vec![9]);
        assert_eq!(result.decisions, vec![DivisorDecision::LastDayWithSales(9)]);
    }

    #[test]
    fn test_single_day_one_row_is_monthly_summary() {
        let result = estimate_days(&table(vec![row(2501, "1", 5000.0)]), &[key(2501)]);
        assert_eq!(result.days, vec![31]);
        assert_eq!(result.decisions, vec![DivisorDecision::MonthlySummary]);
        assert!(result.trace.iter().any(|l| l.contains("Monthly summary")));
    }

    #[test]
    fn test_day_noise_and_numeric_max() {
        // "10일" must beat "9일" numerically.
        let rows = vec![row(2502, "9일", 10.0), row(2502, "10일", 10.0)];
        let result = estimate_days(&table(rows), &[key(2502)]);
        assert_eq!(result.days, vec![10]);
    }

    #[test]
    fn test_no_sales_falls_back_to_raw_max_then_calendar() {
        let rows = vec![row(2502, "1", 0.0), row(2502, "15", 0.0), row(2503, "x", 0.0)];
        let result = estimate_days(&table(rows), &[key(2502), key(2503), key(2504)]);
        assert_eq!(result.days, vec![15, 31, 30]);
        assert_eq!(
            result.decisions,
            vec![
                DivisorDecision::RawMaximum(15),
                DivisorDecision::Calendar,
                DivisorDecision::NoRows
            ]
        );
    }

    #[test]
    fn test_missing_day_column_uses_calendar() {
        let mut t = table(vec![row(2402, "3", 10.0)]);
        t.day_column = None;
        let result = estimate_days(&t, &[key(2402), key(202403)]);
        assert_eq!(result.days, vec![29, 31]);
        assert!(result.trace.iter().any(|l| l.contains("Day column not found")));
    }

    #[test]
    fn test_mixed_width_periods_match() {
        let rows = vec![row(202501, "5", 10.0)];
        let result = estimate_days(&table(rows), &[key(2501)]);
        assert_eq!(result.days, vec![5]);
    }
}
