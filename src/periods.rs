use chrono::{Datelike, Days, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Digit width of a month key as it appears in the source ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PeriodWidth {
    /// `YYMM`, century assumed to be 2000.
    Short,
    /// `YYYYMM`.
    Long,
}

/// A calendar month in the ledger's native integer encoding.
///
/// Equality and ordering only look at the calendar month, so `2501` and
/// `202501` compare equal even though they print differently.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct PeriodKey {
    year: i32,
    month: u32,
    width: PeriodWidth,
}

impl PeriodKey {
    pub fn new(year: i32, month: u32, width: PeriodWidth) -> Option<Self> {
        if !(1..=12).contains(&month) {
            return None;
        }
        if width == PeriodWidth::Short && !(2000..=2099).contains(&year) {
            return None;
        }
        Some(Self { year, month, width })
    }

    /// Decodes `YYMM` or `YYYYMM`. Any other digit count is rejected.
    pub fn from_encoded(value: i64) -> Option<Self> {
        if value < 0 {
            return None;
        }
        let digits = value.to_string();
        match digits.len() {
            4 => Self::new(2000 + (value / 100) as i32, (value % 100) as u32, PeriodWidth::Short),
            6 => Self::new((value / 100) as i32, (value % 100) as u32, PeriodWidth::Long),
            _ => None,
        }
    }

    /// Parses a period cell rendered as text: `"2501"`, `"202501"` or `"2501.0"`.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let integral = match trimmed.split_once('.') {
            Some((head, tail)) if tail.chars().all(|c| c == '0') => head,
            Some(_) => return None,
            None => trimmed,
        };
        if integral.is_empty() || !integral.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        integral.parse::<i64>().ok().and_then(Self::from_encoded)
    }

    pub fn from_float(value: f64) -> Option<Self> {
        if !value.is_finite() || value.fract() != 0.0 {
            return None;
        }
        Self::from_encoded(value as i64)
    }

    /// Month containing `date`, in `YYYYMM` encoding.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            width: PeriodWidth::Long,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn width(&self) -> PeriodWidth {
        self.width
    }

    pub fn encoded(&self) -> i64 {
        match self.width {
            PeriodWidth::Short => i64::from(self.year - 2000) * 100 + i64::from(self.month),
            PeriodWidth::Long => i64::from(self.year) * 100 + i64::from(self.month),
        }
    }

    pub fn with_width(self, width: PeriodWidth) -> Self {
        Self { width, ..self }
    }

    /// Shifts by a signed number of months, keeping the encoding width.
    pub fn offset(&self, months: i32) -> Self {
        let index = self.year * 12 + self.month as i32 - 1 + months;
        Self {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
            width: self.width,
        }
    }

    pub fn next(&self) -> Self {
        self.offset(1)
    }

    pub fn days_in_month(&self) -> u32 {
        days_in_month(self.year, self.month)
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// `YYYY-MM`
    pub fn iso_month(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    /// `YY.MM`, used to tag stale segments in alert contexts.
    pub fn label_yy_mm(&self) -> String {
        format!("{:02}.{:02}", self.year.rem_euclid(100), self.month)
    }

    fn ordinal(&self) -> i32 {
        self.year * 12 + self.month as i32
    }
}

impl PartialEq for PeriodKey {
    fn eq(&self, other: &Self) -> bool {
        self.ordinal() == other.ordinal()
    }
}

impl Eq for PeriodKey {}

impl Hash for PeriodKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ordinal().hash(state);
    }
}

impl PartialOrd for PeriodKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PeriodKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.width {
            PeriodWidth::Short => write!(f, "{:04}", self.encoded()),
            PeriodWidth::Long => write!(f, "{:06}", self.encoded()),
        }
    }
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.checked_sub_days(Days::new(1))
}

/// Number of calendar days in the month. Falls back to 30 for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    last_day_of_month(year, month)
        .map(|d| d.day())
        .unwrap_or(30)
}

pub fn months_between(start: PeriodKey, end: PeriodKey) -> i32 {
    end.ordinal() - start.ordinal()
}

/// Every month from `min` to `max` inclusive, encoded like `min`.
///
/// Returns an empty list when either bound is missing or `max < min`.
pub fn month_range(min: Option<PeriodKey>, max: Option<PeriodKey>) -> Vec<PeriodKey> {
    let (Some(start), Some(end)) = (min, max) else {
        return Vec::new();
    };
    let width = start.width();
    let end = end.with_width(width);

    let mut months = Vec::new();
    let mut current = start;
    while current <= end {
        months.push(current);
        current = current.next();
    }
    months
}

/// Every calendar day from `min` to `max` inclusive.
pub fn day_range(min: Option<NaiveDate>, max: Option<NaiveDate>) -> Vec<NaiveDate> {
    let (Some(start), Some(end)) = (min, max) else {
        return Vec::new();
    };
    start.iter_days().take_while(|d| *d <= end).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(value: i64) -> PeriodKey {
        PeriodKey::from_encoded(value).unwrap()
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2023, 2),
            NaiveDate::from_ymd_opt(2023, 2, 28)
        );
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(days_in_month(2025, 1), 31);
        assert_eq!(days_in_month(2025, 4), 30);
        assert_eq!(days_in_month(2025, 13), 30);
    }

    #[test]
    fn test_decode_both_widths() {
        let short = key(2501);
        assert_eq!((short.year(), short.month()), (2025, 1));
        assert_eq!(short.width(), PeriodWidth::Short);
        assert_eq!(short.to_string(), "2501");

        let long = key(202412);
        assert_eq!((long.year(), long.month()), (2024, 12));
        assert_eq!(long.to_string(), "202412");

        assert_eq!(short, key(202501));
        assert!(PeriodKey::from_encoded(2513).is_none());
        assert!(PeriodKey::from_encoded(25011).is_none());
    }

    #[test]
    fn test_parse_text_forms() {
        assert_eq!(PeriodKey::parse(" 2503 "), Some(key(2503)));
        assert_eq!(PeriodKey::parse("202503.0"), Some(key(202503)));
        assert_eq!(PeriodKey::parse("2503.5"), None);
        assert_eq!(PeriodKey::parse("March"), None);
        assert_eq!(PeriodKey::from_float(2412.0), Some(key(2412)));
    }

    #[test]
    fn test_month_range_short_encoding() {
        let range = month_range(Some(key(2501)), Some(key(2503)));
        let encoded: Vec<i64> = range.iter().map(|p| p.encoded()).collect();
        assert_eq!(encoded, vec![2501, 2502, 2503]);
    }

    #[test]
    fn test_month_range_crosses_year_in_long_encoding() {
        let range = month_range(Some(key(202411)), Some(key(202502)));
        let rendered: Vec<String> = range.iter().map(|p| p.to_string()).collect();
        assert_eq!(rendered, vec!["202411", "202412", "202501", "202502"]);
    }

    #[test]
    fn test_month_range_missing_bound_is_empty() {
        assert!(month_range(None, Some(key(2503))).is_empty());
        assert!(month_range(Some(key(2503)), None).is_empty());
        assert!(month_range(Some(key(2503)), Some(key(2501))).is_empty());
    }

    #[test]
    fn test_month_range_has_no_gaps() {
        let range = month_range(Some(key(2207)), Some(key(2506)));
        assert_eq!(range.len(), 36);
        for pair in range.windows(2) {
            assert_eq!(months_between(pair[0], pair[1]), 1);
        }
    }

    #[test]
    fn test_offset_and_labels() {
        let p = key(2501);
        assert_eq!(p.offset(-1).to_string(), "2412");
        assert_eq!(p.offset(-12).to_string(), "2401");
        assert_eq!(p.offset(14).to_string(), "2603");
        assert_eq!(p.iso_month(), "2025-01");
        assert_eq!(key(202512).label_yy_mm(), "25.12");
    }

    #[test]
    fn test_day_range() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 27);
        let end = NaiveDate::from_ymd_opt(2024, 3, 1);
        let days = day_range(start, end);
        assert_eq!(days.len(), 4);
        assert_eq!(days[2], NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert!(day_range(None, end).is_empty());
    }
}
