//! Period-over-period comparisons per configured segment.
//!
//! Months here come from resolved dates, not from the period-key column.
//! Each segment is compared against its previous month, the average of the
//! three months before it, and the same month one year earlier. Daily sales
//! are total sales divided by the number of distinct dates with rows.

use crate::aggregate::{growth_rate, margin_pct, round1};
use crate::config::SegmentSpec;
use crate::error::{LedgerError, Result};
use crate::periods::PeriodKey;
use crate::schema::{columns, LedgerRow, LedgerTable};
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Changes smaller than this (in % or %p) are reported as unchanged.
const CHANGE_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Good,
    Bad,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    PreviousMonth,
    TrailingThreeMonths,
    YearOverYear,
}

impl Comparison {
    pub const ALL: [Comparison; 3] = [
        Comparison::PreviousMonth,
        Comparison::TrailingThreeMonths,
        Comparison::YearOverYear,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Comparison::PreviousMonth => "전월",
            Comparison::TrailingThreeMonths => "3개월 평균",
            Comparison::YearOverYear => "전년 동월",
        }
    }

    /// Months forming the baseline for `target`.
    pub fn months(&self, target: PeriodKey) -> Vec<PeriodKey> {
        match self {
            Comparison::PreviousMonth => vec![target.offset(-1)],
            Comparison::TrailingThreeMonths => (1..=3).rev().map(|i| target.offset(-i)).collect(),
            Comparison::YearOverYear => vec![target.offset(-12)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AlertMetrics {
    pub curr_sales: i64,
    pub curr_margin: f64,
    pub base_sales: i64,
    pub base_margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SalesAlert {
    /// Segment name, suffixed with `(YY.MM)` when the segment's latest month
    /// is older than the dataset's.
    pub context: String,
    /// Comparison label.
    pub target: String,
    pub status: AlertStatus,
    pub message: String,
    /// Daily-sales change in percent.
    pub sales_change: f64,
    /// Margin change in percentage points.
    pub margin_change: f64,
    pub metrics: AlertMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PeriodStats {
    daily_sales: f64,
    margin: f64,
}

/// Rows with a resolved date.
pub(crate) fn dated(rows: Vec<&LedgerRow>) -> Vec<&LedgerRow> {
    rows.into_iter().filter(|r| r.date.is_some()).collect()
}

pub(crate) fn month_of(row: &LedgerRow) -> Option<PeriodKey> {
    row.date.map(PeriodKey::from_date)
}

/// Rows of one configured segment. A segment whose filter column is absent
/// from the file is skipped rather than failing the whole report.
pub(crate) fn segment_rows<'a>(
    table: &'a LedgerTable,
    segment: &SegmentSpec,
) -> Result<Option<Vec<&'a LedgerRow>>> {
    match table.filtered(&segment.filters) {
        Ok(rows) => Ok(Some(rows)),
        Err(LedgerError::MissingColumn { column }) => {
            warn!("Skipping segment '{}': column '{}' not in data", segment.name, column);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn period_stats(rows: &[&LedgerRow], months: &[PeriodKey]) -> Option<PeriodStats> {
    let selected: Vec<&&LedgerRow> = rows
        .iter()
        .filter(|r| month_of(r).is_some_and(|m| months.contains(&m)))
        .collect();
    if selected.is_empty() {
        return None;
    }

    let sales: f64 = selected.iter().map(|r| r.sales).sum();
    let profit: f64 = selected.iter().map(|r| r.profit).sum();
    let days: BTreeSet<_> = selected.iter().filter_map(|r| r.date).collect();
    let daily_sales = if days.is_empty() {
        0.0
    } else {
        sales / days.len() as f64
    };

    Some(PeriodStats {
        daily_sales,
        margin: margin_pct(sales, profit),
    })
}

fn describe(sales_change: f64, margin_change: f64) -> String {
    let mut parts = Vec::new();
    if sales_change.abs() > CHANGE_THRESHOLD {
        let direction = if sales_change > 0.0 { "증가" } else { "감소" };
        parts.push(format!("일평균 매출 {:.1}% {}", sales_change.abs(), direction));
    } else {
        parts.push("일평균 매출 동일".to_string());
    }
    if margin_change.abs() > CHANGE_THRESHOLD {
        let direction = if margin_change > 0.0 { "개선" } else { "하락" };
        parts.push(format!("이익률 {:.1}%p {}", margin_change.abs(), direction));
    }
    parts.join(", ")
}

fn segment_alerts(
    name: &str,
    rows: &[&LedgerRow],
    global_current: PeriodKey,
    first_month: PeriodKey,
    alerts: &mut Vec<SalesAlert>,
) {
    let months: BTreeSet<PeriodKey> = rows.iter().filter_map(|r| month_of(r)).collect();
    let Some(local_latest) = months.last().copied() else {
        return;
    };

    let (target, context) = if months.contains(&global_current) {
        (global_current, name.to_string())
    } else {
        (local_latest, format!("{} ({})", name, local_latest.label_yy_mm()))
    };

    let Some(current) = period_stats(rows, &[target]) else {
        return;
    };

    for comparison in Comparison::ALL {
        let baseline_months = comparison.months(target);
        if comparison == Comparison::YearOverYear && baseline_months.iter().any(|m| *m < first_month) {
            debug!("{}: not enough history for {}", context, comparison.label());
            continue;
        }

        let base = period_stats(rows, &baseline_months);
        let base_sales = base.map_or(0.0, |b| b.daily_sales);
        let base_margin = base.map_or(0.0, |b| b.margin);

        let sales_change = growth_rate(current.daily_sales, base_sales);
        let margin_change = current.margin - base_margin;
        let status = if sales_change > 0.0 {
            AlertStatus::Good
        } else if sales_change < 0.0 {
            AlertStatus::Bad
        } else {
            AlertStatus::Neutral
        };

        alerts.push(SalesAlert {
            context: context.clone(),
            target: comparison.label().to_string(),
            status,
            message: describe(sales_change, margin_change),
            sales_change: round1(sales_change),
            margin_change: round1(margin_change),
            metrics: AlertMetrics {
                curr_sales: current.daily_sales as i64,
                curr_margin: round1(current.margin),
                base_sales: base_sales as i64,
                base_margin: round1(base_margin),
            },
        });
    }
}

/// Comparison alerts for every segment in order. Segments without dated
/// rows produce nothing; an empty table produces an empty list.
pub fn sales_alerts(table: &LedgerTable, segments: &[SegmentSpec]) -> Result<Vec<SalesAlert>> {
    table.require(&[columns::DATE, columns::SALES, columns::PROFIT])?;

    let months: BTreeSet<PeriodKey> = table.rows.iter().filter_map(month_of).collect();
    let (Some(first_month), Some(global_current)) = (months.first().copied(), months.last().copied())
    else {
        return Ok(Vec::new());
    };

    let mut alerts = Vec::new();
    for segment in segments {
        let Some(rows) = segment_rows(table, segment)? else {
            continue;
        };
        let rows = dated(rows);
        segment_alerts(&segment.name, &rows, global_current, first_month, &mut alerts);
    }
    debug!("Generated {} alerts for {} segments", alerts.len(), segments.len());
    Ok(alerts)
}
