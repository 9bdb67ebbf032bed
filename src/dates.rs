//! Resolution of the mixed-format date column.
//!
//! Values are tried against an ordered list of strategies and the first
//! success wins. Nothing here fails: an unresolvable value is reported as
//! [`DateResolution::Missing`] and the row is left out of date-based
//! aggregations only.

use crate::schema::CellValue;
use chrono::{Days, NaiveDate, NaiveDateTime};
use log::debug;

/// Largest serial a spreadsheet can hold (9999-12-31).
const MAX_SERIAL: f64 = 2_958_465.0;

const CALENDAR_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d"];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateResolution {
    /// Spreadsheet day-count serial.
    Serial(NaiveDate),
    /// Calendar text such as `2025-01-01`.
    Calendar(NaiveDate),
    Missing,
}

impl DateResolution {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            DateResolution::Serial(d) | DateResolution::Calendar(d) => Some(*d),
            DateResolution::Missing => None,
        }
    }
}

/// Day 0 of the spreadsheet serial convention, so serial 1 is 1899-12-31.
pub fn serial_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default()
}

pub fn from_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..=MAX_SERIAL).contains(&serial) {
        return None;
    }
    serial_epoch().checked_add_days(Days::new(serial.floor() as u64))
}

fn serial_strategy(cell: &CellValue) -> Option<DateResolution> {
    let serial = match cell {
        CellValue::Number(n) => *n,
        CellValue::Text(s) => s.trim().parse::<f64>().ok()?,
        CellValue::Empty => return None,
    };
    from_serial(serial).map(DateResolution::Serial)
}

fn calendar_strategy(cell: &CellValue) -> Option<DateResolution> {
    let CellValue::Text(text) = cell else {
        return None;
    };
    parse_calendar(text).map(DateResolution::Calendar)
}

pub fn parse_calendar(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    CALENDAR_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
}

const STRATEGIES: [fn(&CellValue) -> Option<DateResolution>; 2] =
    [serial_strategy, calendar_strategy];

pub fn resolve_date(cell: &CellValue) -> DateResolution {
    STRATEGIES
        .iter()
        .find_map(|strategy| strategy(cell))
        .unwrap_or(DateResolution::Missing)
}

/// How many values each strategy resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    pub serial: usize,
    pub calendar: usize,
    pub missing: usize,
    pub empty: usize,
}

pub fn resolve_dates<'a, I>(cells: I) -> (Vec<Option<NaiveDate>>, ResolutionStats)
where
    I: IntoIterator<Item = &'a CellValue>,
{
    let mut stats = ResolutionStats::default();
    let dates = cells
        .into_iter()
        .map(|cell| {
            if cell.is_empty() {
                stats.empty += 1;
                return None;
            }
            let resolution = resolve_date(cell);
            match resolution {
                DateResolution::Serial(_) => stats.serial += 1,
                DateResolution::Calendar(_) => stats.calendar += 1,
                DateResolution::Missing => stats.missing += 1,
            }
            resolution.date()
        })
        .collect();

    debug!(
        "Date resolution: {} serial, {} calendar, {} unparseable, {} empty",
        stats.serial, stats.calendar, stats.missing, stats.empty
    );
    (dates, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_serial_and_string_agree() {
        let serial = resolve_date(&CellValue::Number(45658.0));
        let text = resolve_date(&CellValue::Text("2025-01-01".to_string()));
        assert_eq!(serial, DateResolution::Serial(ymd(2025, 1, 1)));
        assert_eq!(text, DateResolution::Calendar(ymd(2025, 1, 1)));
    }

    #[test]
    fn test_serial_epoch_convention() {
        assert_eq!(from_serial(1.0), Some(ymd(1899, 12, 31)));
        assert_eq!(from_serial(45658.75), Some(ymd(2025, 1, 1)));
        assert_eq!(from_serial(0.0), None);
        assert_eq!(from_serial(f64::NAN), None);
    }

    #[test]
    fn test_numeric_text_is_serial_first() {
        let resolved = resolve_date(&CellValue::Text(" 45659 ".to_string()));
        assert_eq!(resolved, DateResolution::Serial(ymd(2025, 1, 2)));
    }

    #[test]
    fn test_compact_digits_fall_through_to_calendar() {
        // Too large to be a serial, so the calendar pass reads it as YYYYMMDD.
        let resolved = resolve_date(&CellValue::Text("20250101".to_string()));
        assert_eq!(resolved, DateResolution::Calendar(ymd(2025, 1, 1)));
    }

    #[test]
    fn test_unparseable_is_missing_not_default() {
        assert_eq!(
            resolve_date(&CellValue::Text("2025-13-45".to_string())),
            DateResolution::Missing
        );
        assert_eq!(
            resolve_date(&CellValue::Text("soon".to_string())),
            DateResolution::Missing
        );
        assert_eq!(resolve_date(&CellValue::Empty), DateResolution::Missing);
    }

    #[test]
    fn test_mixed_column_with_stats() {
        let cells = vec![
            CellValue::Number(45658.0),
            CellValue::Text("2025-01-02".to_string()),
            CellValue::Text("2025-01-03 10:30:00".to_string()),
            CellValue::Text("bad".to_string()),
            CellValue::Empty,
        ];
        let (dates, stats) = resolve_dates(&cells);
        assert_eq!(
            dates,
            vec![
                Some(ymd(2025, 1, 1)),
                Some(ymd(2025, 1, 2)),
                Some(ymd(2025, 1, 3)),
                None,
                None
            ]
        );
        assert_eq!(
            stats,
            ResolutionStats {
                serial: 1,
                calendar: 2,
                missing: 1,
                empty: 1
            }
        );
    }
}
