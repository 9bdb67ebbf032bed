use crate::config::EngineConfig;
use crate::dates::resolve_dates;
use crate::periods::PeriodKey;
use crate::schema::{columns, CellValue, LedgerRow, LedgerTable, RawTable};
use log::{debug, info};
use std::collections::BTreeMap;

const AMOUNT_COLUMNS: [&str; 2] = [columns::SALES, columns::PROFIT];

/// Strips tab characters and surrounding whitespace from a header.
pub fn clean_header(header: &str) -> String {
    header.replace('\t', "").trim().to_string()
}

/// Cleans a sales/profit cell. Thousands separators are removed; anything
/// that still does not parse, or is not finite, becomes zero.
pub fn clean_amount(cell: &CellValue) -> f64 {
    let value = match cell {
        CellValue::Number(n) => *n,
        CellValue::Text(s) => s.replace(',', "").trim().parse::<f64>().unwrap_or(0.0),
        CellValue::Empty => 0.0,
    };
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Schema normalization on the raw table: header cleanup, alias repair and
/// amount coercion. Running it on its own output changes nothing.
pub fn normalize_raw(mut table: RawTable, aliases: &BTreeMap<String, String>) -> RawTable {
    for header in table.headers.iter_mut() {
        let cleaned = clean_header(header);
        *header = match aliases.get(&cleaned) {
            Some(canonical) => {
                debug!("Renaming column '{}' to '{}'", cleaned, canonical);
                canonical.clone()
            }
            None => cleaned,
        };
    }

    for column in AMOUNT_COLUMNS {
        let Some(idx) = table.column_index(column) else {
            continue;
        };
        for row in table.rows.iter_mut() {
            if let Some(cell) = row.get_mut(idx) {
                *cell = CellValue::Number(clean_amount(cell));
            }
        }
    }

    table
}

/// First candidate that names an existing column.
pub fn resolve_day_column(table: &RawTable, candidates: &[String]) -> Option<String> {
    candidates
        .iter()
        .find(|c| table.column_index(c).is_some())
        .cloned()
}

fn period_of(cell: &CellValue) -> Option<PeriodKey> {
    match cell {
        CellValue::Number(n) => PeriodKey::from_float(*n),
        CellValue::Text(s) => PeriodKey::parse(s),
        CellValue::Empty => None,
    }
}

/// Runs the full normalization pipeline and builds the typed table.
pub fn normalize(raw: RawTable, config: &EngineConfig) -> LedgerTable {
    let raw = normalize_raw(raw, &config.column_aliases);
    let day_column = resolve_day_column(&raw, &config.day_column_candidates);
    match &day_column {
        Some(name) => debug!("Using '{}' as day column", name),
        None => debug!(
            "No day column among {:?}; divisors will use calendar days",
            config.day_column_candidates
        ),
    }

    let index_of = |name: &str| raw.column_index(name);
    let period_idx = index_of(columns::PERIOD);
    let date_idx = index_of(columns::DATE);
    let sales_idx = index_of(columns::SALES);
    let profit_idx = index_of(columns::PROFIT);
    let part_idx = index_of(columns::PART);
    let channel_idx = index_of(columns::CHANNEL);
    let account_idx = index_of(columns::ACCOUNT);
    let group_idx = index_of(columns::GROUP);
    let category_idx = index_of(columns::CATEGORY);
    let sub_category_idx = index_of(columns::SUB_CATEGORY);
    let main_channel_idx = index_of(columns::MAIN_CHANNEL);
    let day_idx = day_column.as_deref().and_then(index_of);

    let dates = match date_idx {
        Some(idx) => {
            let cells: Vec<&CellValue> = raw
                .rows
                .iter()
                .map(|row| row.get(idx).unwrap_or(&CellValue::Empty))
                .collect();
            resolve_dates(cells).0
        }
        None => vec![None; raw.rows.len()],
    };

    let rows: Vec<LedgerRow> = raw
        .rows
        .iter()
        .zip(dates)
        .map(|(row, date)| {
            let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i));
            let text = |idx: Option<usize>| cell(idx).and_then(CellValue::as_text);
            LedgerRow {
                period: cell(period_idx).and_then(period_of),
                day: text(day_idx),
                date,
                sales: cell(sales_idx).map(clean_amount).unwrap_or(0.0),
                profit: cell(profit_idx).map(clean_amount).unwrap_or(0.0),
                part: text(part_idx),
                channel: text(channel_idx),
                account: text(account_idx),
                group: text(group_idx),
                category: text(category_idx),
                sub_category: text(sub_category_idx),
                main_channel: text(main_channel_idx),
            }
        })
        .collect();

    let unmatched_periods = rows.iter().filter(|r| r.period.is_none()).count();
    if period_idx.is_some() && unmatched_periods > 0 {
        debug!("{} rows have an unparseable period key", unmatched_periods);
    }
    info!(
        "Normalized {} rows across {} columns",
        rows.len(),
        raw.headers.len()
    );

    LedgerTable {
        columns: raw.headers.iter().cloned().collect(),
        day_column,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn raw() -> RawTable {
        RawTable::new(
            vec![
                "월구분".to_string(),
                " 판매액\t".to_string(),
                "이익".to_string(),
                "거래쳐명".to_string(),
                "일구분".to_string(),
                "일별".to_string(),
            ],
            vec![
                vec![
                    CellValue::Number(2501.0),
                    text("1,234,567"),
                    CellValue::Number(1000.0),
                    text("이마트"),
                    CellValue::Number(9.0),
                    CellValue::Number(45658.0),
                ],
                vec![
                    text("2502"),
                    text("N/A"),
                    text(" -2,500 "),
                    CellValue::Empty,
                    text("3일"),
                    text("2025-02-03"),
                ],
            ],
        )
    }

    #[test]
    fn test_amount_cleaning() {
        assert_eq!(clean_amount(&text("1,234,567")), 1_234_567.0);
        assert_eq!(clean_amount(&text("N/A")), 0.0);
        assert_eq!(clean_amount(&CellValue::Empty), 0.0);
        assert_eq!(clean_amount(&CellValue::Number(f64::INFINITY)), 0.0);
    }

    #[test]
    fn test_headers_cleaned_and_aliases_repaired() {
        let config = EngineConfig::default();
        let table = normalize_raw(raw(), &config.column_aliases);
        assert_eq!(table.headers[1], "판매액");
        assert_eq!(table.headers[3], columns::ACCOUNT);
        assert_eq!(table.rows[0][1], CellValue::Number(1_234_567.0));
        assert_eq!(table.rows[1][1], CellValue::Number(0.0));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let config = EngineConfig::default();
        let once = normalize_raw(raw(), &config.column_aliases);
        let twice = normalize_raw(once.clone(), &config.column_aliases);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_typed_rows() {
        let table = normalize(raw(), &EngineConfig::default());

        assert_eq!(table.day_column.as_deref(), Some("일구분"));
        assert!(table.has_column(columns::ACCOUNT));
        assert!(!table.has_column("거래쳐명"));

        let first = &table.rows[0];
        assert_eq!(first.period, PeriodKey::from_encoded(2501));
        assert_eq!(first.sales, 1_234_567.0);
        assert_eq!(first.day.as_deref(), Some("9"));
        assert_eq!(first.account.as_deref(), Some("이마트"));
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2025, 1, 1));

        let second = &table.rows[1];
        assert_eq!(second.sales, 0.0);
        assert_eq!(second.profit, -2500.0);
        assert_eq!(second.day_number(), Some(3));
        assert_eq!(second.account, None);
        assert_eq!(second.date, NaiveDate::from_ymd_opt(2025, 2, 3));
    }

    #[test]
    fn test_day_column_candidates_in_order() {
        let table = RawTable::new(vec!["day".to_string(), "일자".to_string()], Vec::new());
        let candidates = EngineConfig::default().day_column_candidates;
        assert_eq!(resolve_day_column(&table, &candidates).as_deref(), Some("일자"));
        assert_eq!(resolve_day_column(&RawTable::default(), &candidates), None);
    }
}
