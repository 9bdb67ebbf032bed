use crate::divisor::{estimate_days, estimate_days_for_rows, DaysDivisor};
use crate::error::Result;
use crate::periods::{day_range, month_range, PeriodKey};
use crate::schema::{columns, Dimension, Filter, LedgerRow, LedgerTable, UNKNOWN};
use chrono::NaiveDate;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label used when no product-first filter is active.
pub const DEFAULT_LABEL: &str = "전체";

/// Label used when no channel-first filter is active.
pub const DEFAULT_CHANNEL_LABEL: &str = "전체 채널";

/// Replaces NaN and infinities so output always serializes as plain numbers.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Rounds to one decimal place.
pub fn round1(value: f64) -> f64 {
    finite_or_zero((value * 10.0).round() / 10.0)
}

/// Percentage change from `base` to `current`. A zero (or negative) base
/// reports 0 when `current` is also zero and 100 otherwise.
pub fn growth_rate(current: f64, base: f64) -> f64 {
    if base > 0.0 {
        (current - base) / base * 100.0
    } else if current == 0.0 {
        0.0
    } else {
        100.0
    }
}

/// Profit as a percentage of sales; 0 when there are no sales.
pub fn margin_pct(sales: f64, profit: f64) -> f64 {
    if sales != 0.0 {
        finite_or_zero(profit / sales * 100.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricSeries {
    pub sales: Vec<f64>,
    pub profit: Vec<f64>,
}

impl MetricSeries {
    fn zeros(len: usize) -> Self {
        Self {
            sales: vec![0.0; len],
            profit: vec![0.0; len],
        }
    }

    fn scrubbed(mut self) -> Self {
        self.sales.iter_mut().for_each(|v| *v = finite_or_zero(*v));
        self.profit.iter_mut().for_each(|v| *v = finite_or_zero(*v));
        self
    }

    fn plus(&self, other: &MetricSeries) -> MetricSeries {
        MetricSeries {
            sales: self.sales.iter().zip(&other.sales).map(|(a, b)| a + b).collect(),
            profit: self.profit.iter().zip(&other.profit).map(|(a, b)| a + b).collect(),
        }
    }

    pub fn total_sales(&self) -> f64 {
        self.sales.iter().sum()
    }
}

/// A gap-filled monthly result. Every series has one value per entry of `periods`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeriesRecord {
    /// Month keys in the ledger's own encoding (`2501` or `202501`).
    pub periods: Vec<String>,
    pub series_by_dimension: BTreeMap<String, MetricSeries>,
    /// Keys of `series_by_dimension` in presentation order.
    pub ranking: Vec<String>,
    pub label: String,
    pub days_divisor: Vec<u32>,
    pub debug_logs: Vec<String>,
}

impl SeriesRecord {
    fn new(periods: &[PeriodKey], label: String, divisor: DaysDivisor) -> Self {
        Self {
            periods: periods.iter().map(|p| p.to_string()).collect(),
            series_by_dimension: BTreeMap::new(),
            ranking: Vec::new(),
            label,
            days_divisor: divisor.days,
            debug_logs: divisor.trace,
        }
    }

    fn push_series(&mut self, name: impl Into<String>, series: MetricSeries) {
        let name = name.into();
        self.ranking.push(name.clone());
        self.series_by_dimension.insert(name, series.scrubbed());
    }

    pub fn series(&self, name: &str) -> Option<&MetricSeries> {
        self.series_by_dimension.get(name)
    }
}

/// Gap-filled daily result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DailySeriesRecord {
    /// `YYYY-MM-DD`
    pub dates: Vec<String>,
    pub sales: Vec<f64>,
    pub profit: Vec<f64>,
    pub label: String,
}

/// Nested option tree: first level -> second level -> third-level values.
pub type HierarchyOptions = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Drill-down selection. `None` or `"all"` leaves a dimension unfiltered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LedgerQuery {
    pub group: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub part: Option<String>,
    pub channel: Option<String>,
    pub account: Option<String>,
}

impl LedgerQuery {
    fn filter(&self, dimension: Dimension) -> Filter {
        let value = match dimension {
            Dimension::Group => &self.group,
            Dimension::Category => &self.category,
            Dimension::SubCategory => &self.sub_category,
            Dimension::Part => &self.part,
            Dimension::Channel => &self.channel,
            Dimension::Account => &self.account,
            Dimension::MainChannel => return Filter::optional(dimension, None),
        };
        Filter::optional(dimension, value.as_deref())
    }

    /// Product hierarchy first, then channel hierarchy.
    pub fn product_first(&self) -> Vec<Filter> {
        Dimension::PRODUCT_HIERARCHY
            .iter()
            .chain(Dimension::CHANNEL_HIERARCHY.iter())
            .map(|d| self.filter(*d))
            .collect()
    }

    /// Channel hierarchy first, then product hierarchy.
    pub fn channel_first(&self) -> Vec<Filter> {
        Dimension::CHANNEL_HIERARCHY
            .iter()
            .chain(Dimension::PRODUCT_HIERARCHY.iter())
            .map(|d| self.filter(*d))
            .collect()
    }
}

/// Joins the active filter values with `" > "`, or returns `default` when none are active.
pub fn filter_label(filters: &[Filter], default: &str) -> String {
    let parts: Vec<String> = filters
        .iter()
        .filter(|f| f.is_active())
        .map(Filter::label)
        .collect();
    if parts.is_empty() {
        default.to_string()
    } else {
        parts.join(" > ")
    }
}

/// Full month range of the unfiltered table.
pub fn table_months(table: &LedgerTable) -> Vec<PeriodKey> {
    month_range(table.min_period(), table.max_period())
}

/// Sums sales and profit per period and lays them onto `periods`, zero-filling gaps.
/// Rows whose period falls outside `periods` are ignored.
pub fn monthly_totals(rows: &[&LedgerRow], periods: &[PeriodKey]) -> MetricSeries {
    let mut grouped: BTreeMap<PeriodKey, (f64, f64)> = BTreeMap::new();
    for row in rows {
        if let Some(period) = row.period {
            let entry = grouped.entry(period).or_insert((0.0, 0.0));
            entry.0 += row.sales;
            entry.1 += row.profit;
        }
    }

    let mut series = MetricSeries::zeros(periods.len());
    for (i, period) in periods.iter().enumerate() {
        if let Some((sales, profit)) = grouped.get(period) {
            series.sales[i] = *sales;
            series.profit[i] = *profit;
        }
    }
    series
}

/// Daily counterpart of [`monthly_totals`]; rows without a resolved date are skipped.
pub fn daily_totals(rows: &[&LedgerRow], days: &[NaiveDate]) -> MetricSeries {
    let mut grouped: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for row in rows {
        if let Some(date) = row.date {
            let entry = grouped.entry(date).or_insert((0.0, 0.0));
            entry.0 += row.sales;
            entry.1 += row.profit;
        }
    }

    let mut series = MetricSeries::zeros(days.len());
    for (i, day) in days.iter().enumerate() {
        if let Some((sales, profit)) = grouped.get(day) {
            series.sales[i] = *sales;
            series.profit[i] = *profit;
        }
    }
    series
}

/// The shared monthly aggregation: unfiltered range, sequential filters,
/// per-period sums, zero-filled reindex.
pub fn aggregate_monthly(
    table: &LedgerTable,
    filters: &[Filter],
    default_label: &str,
) -> Result<SeriesRecord> {
    table.require(&[columns::PERIOD, columns::SALES, columns::PROFIT])?;

    let periods = table_months(table);
    let rows = table.filtered(filters)?;
    let label = filter_label(filters, default_label);
    debug!("'{}': {} of {} rows over {} months", label, rows.len(), table.len(), periods.len());

    let divisor = estimate_days_for_rows(table, &rows, &periods);
    let mut record = SeriesRecord::new(&periods, label.clone(), divisor);
    record.push_series(label, monthly_totals(&rows, &periods));
    Ok(record)
}

/// Monthly e-commerce, offline and combined totals.
pub fn monthly_by_channel(
    table: &LedgerTable,
    ecommerce: &str,
    offline: &str,
) -> Result<SeriesRecord> {
    table.require(&[columns::PERIOD, columns::PART, columns::SALES, columns::PROFIT])?;

    let periods = table_months(table);
    let ecommerce_rows = table.filtered(&[Filter::new(Dimension::Part, ecommerce)])?;
    let offline_rows = table.filtered(&[Filter::new(Dimension::Part, offline)])?;

    let ecommerce_series = monthly_totals(&ecommerce_rows, &periods);
    let offline_series = monthly_totals(&offline_rows, &periods);
    let total = ecommerce_series.plus(&offline_series);

    let mut record = SeriesRecord::new(&periods, DEFAULT_LABEL.to_string(), estimate_days(table, &periods));
    record.push_series("ecommerce", ecommerce_series);
    record.push_series("offline", offline_series);
    record.push_series("total", total);
    Ok(record)
}

/// Monthly series for the `limit` product groups with the highest total sales.
pub fn monthly_by_product_group(table: &LedgerTable, limit: usize) -> Result<SeriesRecord> {
    table.require(&[columns::PERIOD, columns::GROUP, columns::SALES, columns::PROFIT])?;

    let periods = table_months(table);
    let mut by_group: BTreeMap<&str, Vec<&LedgerRow>> = BTreeMap::new();
    for row in &table.rows {
        if let Some(group) = row.group.as_deref() {
            by_group.entry(group).or_default().push(row);
        }
    }

    let mut ranked: Vec<(&str, MetricSeries)> = by_group
        .into_iter()
        .map(|(group, rows)| (group, monthly_totals(&rows, &periods)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_sales().total_cmp(&a.1.total_sales()));
    ranked.truncate(limit);

    let mut record = SeriesRecord::new(&periods, DEFAULT_LABEL.to_string(), estimate_days(table, &periods));
    for (group, series) in ranked {
        record.push_series(group, series);
    }
    Ok(record)
}

/// Drill-down along product hierarchy then channel hierarchy.
pub fn filtered_monthly_sales(table: &LedgerTable, query: &LedgerQuery) -> Result<SeriesRecord> {
    aggregate_monthly(table, &query.product_first(), DEFAULT_LABEL)
}

/// Drill-down along channel hierarchy then product hierarchy.
pub fn channel_layer_sales(table: &LedgerTable, query: &LedgerQuery) -> Result<SeriesRecord> {
    aggregate_monthly(table, &query.channel_first(), DEFAULT_CHANNEL_LABEL)
}

/// Daily totals over the unfiltered table's date span.
pub fn daily_series(table: &LedgerTable, query: &LedgerQuery) -> Result<DailySeriesRecord> {
    table.require(&[columns::DATE, columns::SALES, columns::PROFIT])?;

    let filters = query.channel_first();
    let rows = table.filtered(&filters)?;
    let days = day_range(table.min_date(), table.max_date());
    let series = daily_totals(&rows, &days).scrubbed();

    Ok(DailySeriesRecord {
        dates: days.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect(),
        sales: series.sales,
        profit: series.profit,
        label: filter_label(&filters, DEFAULT_LABEL),
    })
}

/// Distinct value tree over three dimensions. Blank values show as `Unknown`;
/// leaf lists keep first-seen order.
pub fn hierarchy_options(table: &LedgerTable, levels: [Dimension; 3]) -> Result<HierarchyOptions> {
    table.require_dimensions(&levels)?;

    let mut options = HierarchyOptions::new();
    for row in &table.rows {
        let [first, second, third] = levels.map(|d| row.dimension(d).unwrap_or(UNKNOWN).to_string());
        let leaves = options.entry(first).or_default().entry(second).or_default();
        if !leaves.contains(&third) {
            leaves.push(third);
        }
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;

    fn row(period: i64, part: &str, group: &str, sales: f64, profit: f64) -> LedgerRow {
        LedgerRow {
            period: PeriodKey::from_encoded(period),
            part: Some(part.to_string()),
            group: Some(group.to_string()),
            category: Some("기저귀".to_string()),
            sales,
            profit,
            ..Default::default()
        }
    }

    fn table() -> LedgerTable {
        LedgerTable {
            columns: [
                columns::PERIOD,
                columns::SALES,
                columns::PROFIT,
                columns::PART,
                columns::GROUP,
                columns::CATEGORY,
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            day_column: None,
            rows: vec![
                row(2501, "이커머스", "마이비", 100.0, 10.0),
                row(2501, "오프라인", "누비", 50.0, 5.0),
                row(2503, "이커머스", "누비", 300.0, 30.0),
                row(2503, "해외", "쏭레브", 7.0, 1.0),
            ],
        }
    }

    #[test]
    fn test_channel_breakdown_is_gap_filled() {
        let record = monthly_by_channel(&table(), "이커머스", "오프라인").unwrap();
        assert_eq!(record.periods, vec!["2501", "2502", "2503"]);
        assert_eq!(record.ranking, vec!["ecommerce", "offline", "total"]);

        let total = record.series("total").unwrap();
        assert_eq!(total.sales, vec![150.0, 0.0, 300.0]);
        assert_eq!(total.profit, vec![15.0, 0.0, 30.0]);
        assert_eq!(record.days_divisor, vec![31, 28, 31]);
    }

    #[test]
    fn test_series_lengths_match_periods() {
        let t = table();
        let query = LedgerQuery {
            part: Some("오프라인".to_string()),
            ..Default::default()
        };
        for record in [
            filtered_monthly_sales(&t, &query).unwrap(),
            channel_layer_sales(&t, &query).unwrap(),
            monthly_by_product_group(&t, 10).unwrap(),
        ] {
            for series in record.series_by_dimension.values() {
                assert_eq!(series.sales.len(), record.periods.len());
                assert_eq!(series.profit.len(), record.periods.len());
            }
            assert_eq!(record.days_divisor.len(), record.periods.len());
        }
    }

    #[test]
    fn test_filtered_range_comes_from_unfiltered_table() {
        let query = LedgerQuery {
            part: Some("오프라인".to_string()),
            ..Default::default()
        };
        let record = filtered_monthly_sales(&table(), &query).unwrap();
        assert_eq!(record.periods.len(), 3);
        assert_eq!(record.label, "오프라인");
        assert_eq!(record.series("오프라인").unwrap().sales, vec![50.0, 0.0, 0.0]);
    }

    #[test]
    fn test_labels_follow_dimension_order() {
        let query = LedgerQuery {
            group: Some("누비".to_string()),
            part: Some("이커머스".to_string()),
            ..Default::default()
        };
        let product = filtered_monthly_sales(&table(), &query).unwrap();
        assert_eq!(product.label, "누비 > 이커머스");

        let channel = channel_layer_sales(&table(), &query).unwrap();
        assert_eq!(channel.label, "이커머스 > 누비");

        let none = channel_layer_sales(&table(), &LedgerQuery::default()).unwrap();
        assert_eq!(none.label, DEFAULT_CHANNEL_LABEL);
        let all = LedgerQuery {
            group: Some("all".to_string()),
            ..Default::default()
        };
        assert_eq!(filtered_monthly_sales(&table(), &all).unwrap().label, DEFAULT_LABEL);
    }

    #[test]
    fn test_empty_filter_result_is_all_zero() {
        let query = LedgerQuery {
            group: Some("없는그룹".to_string()),
            ..Default::default()
        };
        let record = filtered_monthly_sales(&table(), &query).unwrap();
        let series = record.series("없는그룹").unwrap();
        assert!(series.sales.iter().all(|v| *v == 0.0));
        assert_eq!(series.sales.len(), 3);
    }

    #[test]
    fn test_product_groups_ranked_and_limited() {
        let record = monthly_by_product_group(&table(), 2).unwrap();
        assert_eq!(record.ranking, vec!["누비", "마이비"]);
        assert_eq!(record.series("누비").unwrap().sales, vec![50.0, 0.0, 300.0]);
        assert!(record.series("쏭레브").is_none());
    }

    #[test]
    fn test_missing_dimension_column_is_error() {
        let query = LedgerQuery {
            account: Some("이마트".to_string()),
            ..Default::default()
        };
        let err = filtered_monthly_sales(&table(), &query).unwrap_err();
        assert!(matches!(err, LedgerError::MissingColumn { ref column } if column == columns::ACCOUNT));

        let err = hierarchy_options(&table(), Dimension::CHANNEL_HIERARCHY).unwrap_err();
        assert!(matches!(err, LedgerError::MissingColumn { .. }));
    }

    #[test]
    fn test_hierarchy_options_fill_unknown() {
        let mut t = table();
        t.columns.insert(columns::SUB_CATEGORY.to_string());
        t.rows[0].sub_category = Some("밴드형".to_string());

        let options = hierarchy_options(&t, Dimension::PRODUCT_HIERARCHY).unwrap();
        assert_eq!(options["마이비"]["기저귀"], vec!["밴드형"]);
        assert_eq!(options["누비"]["기저귀"], vec![UNKNOWN]);
    }

    #[test]
    fn test_daily_series_spans_all_days() {
        let mut t = table();
        t.columns.insert(columns::DATE.to_string());
        t.rows[0].date = NaiveDate::from_ymd_opt(2025, 1, 30);
        t.rows[2].date = NaiveDate::from_ymd_opt(2025, 2, 2);
        t.rows[3].date = NaiveDate::from_ymd_opt(2025, 2, 1);

        let query = LedgerQuery {
            part: Some("이커머스".to_string()),
            ..Default::default()
        };
        let record = daily_series(&t, &query).unwrap();
        assert_eq!(record.dates, vec!["2025-01-30", "2025-01-31", "2025-02-01", "2025-02-02"]);
        assert_eq!(record.sales, vec![100.0, 0.0, 0.0, 300.0]);
        assert_eq!(record.label, "이커머스");
    }

    #[test]
    fn test_growth_rate_conventions() {
        assert_eq!(growth_rate(150.0, 100.0), 50.0);
        assert_eq!(growth_rate(500.0, 0.0), 100.0);
        assert_eq!(growth_rate(0.0, 0.0), 0.0);
        assert_eq!(round1(12.345), 12.3);
        assert_eq!(margin_pct(0.0, 10.0), 0.0);
        assert_eq!(margin_pct(200.0, 50.0), 25.0);
    }

    #[test]
    fn test_non_finite_values_are_scrubbed() {
        assert_eq!(finite_or_zero(f64::NAN), 0.0);
        let mut t = table();
        t.rows[0].sales = f64::INFINITY;
        let record = monthly_by_channel(&t, "이커머스", "오프라인").unwrap();
        assert_eq!(record.series("ecommerce").unwrap().sales[0], 0.0);
    }
}
