use crate::aggregate::{finite_or_zero, growth_rate, margin_pct, round1};
use crate::alerts::{dated, month_of, segment_rows};
use crate::config::SegmentSpec;
use crate::error::Result;
use crate::periods::{day_range, month_range, PeriodKey};
use crate::schema::{columns, LedgerRow, LedgerTable};
use chrono::{Months, NaiveDate};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SummaryMeta {
    /// `YYYY-MM`
    pub current_month: String,
    pub prev_month: Option<String>,
    /// `YYYY-MM-DD`, the latest date in the file.
    pub max_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentSummary {
    pub name: String,
    pub current_total: i64,
    pub current_daily_avg: i64,
    pub current_days: usize,
    /// Sales on the file's latest date.
    pub latest_day_sales: i64,
    /// Change of the daily average against the previous month, in percent.
    pub growth_rate: f64,
    pub prev_total: i64,
    pub prev_daily_avg: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthlySummary {
    pub meta: SummaryMeta,
    pub segments: Vec<SegmentSummary>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct MonthStats {
    total: f64,
    daily_avg: f64,
    days: usize,
}

fn month_stats(rows: &[&LedgerRow], month: PeriodKey) -> MonthStats {
    let in_month: Vec<&&LedgerRow> = rows.iter().filter(|r| month_of(r) == Some(month)).collect();
    let total: f64 = in_month.iter().map(|r| r.sales).sum();
    let days = in_month.iter().filter_map(|r| r.date).collect::<BTreeSet<_>>().len();
    let daily_avg = if days > 0 { total / days as f64 } else { 0.0 };
    MonthStats {
        total,
        daily_avg,
        days,
    }
}

/// Current and previous month figures per segment. Both months are the two
/// latest months present in the resolved date column. Returns `None` when
/// no row has a usable date.
pub fn monthly_summary(table: &LedgerTable, segments: &[SegmentSpec]) -> Result<Option<MonthlySummary>> {
    table.require(&[columns::DATE, columns::SALES])?;

    let months: BTreeSet<PeriodKey> = table.rows.iter().filter_map(month_of).collect();
    let (Some(current), Some(max_date)) = (months.last().copied(), table.max_date()) else {
        return Ok(None);
    };
    let previous = months.range(..current).next_back().copied();

    let mut summaries = Vec::with_capacity(segments.len());
    for segment in segments {
        let Some(rows) = segment_rows(table, segment)? else {
            continue;
        };
        let rows = dated(rows);

        let curr = month_stats(&rows, current);
        let prev = previous.map(|p| month_stats(&rows, p)).unwrap_or_default();
        let latest_day_sales: f64 = rows
            .iter()
            .filter(|r| r.date == Some(max_date))
            .map(|r| r.sales)
            .sum();

        summaries.push(SegmentSummary {
            name: segment.name.clone(),
            current_total: finite_or_zero(curr.total) as i64,
            current_daily_avg: finite_or_zero(curr.daily_avg) as i64,
            current_days: curr.days,
            latest_day_sales: finite_or_zero(latest_day_sales) as i64,
            growth_rate: round1(growth_rate(curr.daily_avg, prev.daily_avg)),
            prev_total: finite_or_zero(prev.total) as i64,
            prev_daily_avg: finite_or_zero(prev.daily_avg) as i64,
        });
    }

    Ok(Some(MonthlySummary {
        meta: SummaryMeta {
            current_month: current.iso_month(),
            prev_month: previous.map(|p| p.iso_month()),
            max_date: max_date.format("%Y-%m-%d").to_string(),
        },
        segments: summaries,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthlyStat {
    /// `YYYY-MM`
    pub month: String,
    pub sales: i64,
    pub margin: f64,
    pub daily_avg: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DailyStat {
    /// `YYYY-MM-DD`
    pub date: String,
    pub sales: f64,
    pub profit: f64,
    pub margin: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentStats {
    pub monthly: Vec<MonthlyStat>,
    pub daily: Vec<DailyStat>,
}

fn monthly_stats(rows: &[&LedgerRow], months: &[PeriodKey]) -> Vec<MonthlyStat> {
    let mut grouped: BTreeMap<PeriodKey, (f64, f64, BTreeSet<NaiveDate>)> = BTreeMap::new();
    for row in rows {
        let (Some(month), Some(date)) = (month_of(row), row.date) else {
            continue;
        };
        let entry = grouped.entry(month).or_default();
        entry.0 += row.sales;
        entry.1 += row.profit;
        entry.2.insert(date);
    }

    months
        .iter()
        .map(|month| {
            let (sales, profit, days) = grouped
                .get(month)
                .map(|(s, p, d)| (*s, *p, d.len() as u32))
                .unwrap_or((0.0, 0.0, 0));
            // One day or fewer usually means a monthly summary row.
            let divisor = if days <= 1 { month.days_in_month() } else { days };
            MonthlyStat {
                month: month.iso_month(),
                sales: finite_or_zero(sales) as i64,
                margin: round1(margin_pct(sales, profit)),
                daily_avg: finite_or_zero(sales / f64::from(divisor)) as i64,
            }
        })
        .collect()
}

fn daily_stats(rows: &[&LedgerRow], days: &[NaiveDate]) -> Vec<DailyStat> {
    let mut grouped: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for row in rows {
        if let Some(date) = row.date {
            let entry = grouped.entry(date).or_default();
            entry.0 += row.sales;
            entry.1 += row.profit;
        }
    }

    days.iter()
        .map(|day| {
            let (sales, profit) = grouped.get(day).copied().unwrap_or_default();
            DailyStat {
                date: day.format("%Y-%m-%d").to_string(),
                sales: finite_or_zero(sales),
                profit: finite_or_zero(profit),
                margin: round1(margin_pct(sales, profit)),
            }
        })
        .collect()
}

/// Monthly stats over the file's full calendar-month span plus a daily
/// series over the trailing `window_months` ending at the latest date, for
/// each configured segment.
pub fn segment_details(
    table: &LedgerTable,
    segments: &[SegmentSpec],
    window_months: u32,
) -> Result<BTreeMap<String, SegmentStats>> {
    table.require(&[columns::DATE, columns::SALES, columns::PROFIT])?;

    let (Some(min_date), Some(max_date)) = (table.min_date(), table.max_date()) else {
        return Ok(BTreeMap::new());
    };
    let months = month_range(
        Some(PeriodKey::from_date(min_date)),
        Some(PeriodKey::from_date(max_date)),
    );
    let window_start = max_date
        .checked_sub_months(Months::new(window_months))
        .unwrap_or(min_date);
    let days = day_range(Some(window_start), Some(max_date));
    debug!(
        "Segment details over {} months, daily window {} to {}",
        months.len(),
        window_start,
        max_date
    );

    let mut details = BTreeMap::new();
    for segment in segments {
        let Some(rows) = segment_rows(table, segment)? else {
            continue;
        };
        let rows = dated(rows);
        details.insert(
            segment.name.clone(),
            SegmentStats {
                monthly: monthly_stats(&rows, &months),
                daily: daily_stats(&rows, &days),
            },
        );
    }
    Ok(details)
}
