use crate::error::{LedgerError, Result};
use crate::periods::PeriodKey;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Canonical ledger column names, after misspellings have been repaired.
pub mod columns {
    pub const PERIOD: &str = "월구분";
    pub const DATE: &str = "일별";
    pub const SALES: &str = "판매액";
    pub const PROFIT: &str = "이익";
    pub const PART: &str = "파트구분";
    pub const CHANNEL: &str = "채널구분";
    pub const ACCOUNT: &str = "거래처명";
    pub const GROUP: &str = "품목그룹1";
    pub const CATEGORY: &str = "품목 구분";
    pub const SUB_CATEGORY: &str = "품목 구분_2";
    pub const MAIN_CHANNEL: &str = "주력 채널";
}

/// Sentinel filter value meaning "do not filter on this dimension".
pub const ALL: &str = "all";

/// Value placed in hierarchy options for blank categorical cells.
pub const UNKNOWN: &str = "Unknown";

/// A decoded spreadsheet/CSV cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// Text form with whole numbers rendered without a fraction (`9.0` -> `"9"`).
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Number(n) if n.is_finite() && n.fract() == 0.0 => {
                Some(format!("{}", *n as i64))
            }
            CellValue::Number(n) => Some(n.to_string()),
            CellValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// A table exactly as decoded from the source file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { headers, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cells of one column; short rows yield `Empty`.
    pub fn column(&self, name: &str) -> Option<Vec<&CellValue>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).unwrap_or(&CellValue::Empty))
                .collect(),
        )
    }
}

/// Categorical columns a query can filter or break down by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Top-level channel segment (e-commerce / offline / ...).
    Part,
    /// Sub-channel.
    Channel,
    /// Account / customer name.
    Account,
    /// Product group (brand).
    Group,
    Category,
    SubCategory,
    /// "Main channel" flag column.
    MainChannel,
}

impl Dimension {
    pub fn column(&self) -> &'static str {
        match self {
            Dimension::Part => columns::PART,
            Dimension::Channel => columns::CHANNEL,
            Dimension::Account => columns::ACCOUNT,
            Dimension::Group => columns::GROUP,
            Dimension::Category => columns::CATEGORY,
            Dimension::SubCategory => columns::SUB_CATEGORY,
            Dimension::MainChannel => columns::MAIN_CHANNEL,
        }
    }

    pub const PRODUCT_HIERARCHY: [Dimension; 3] =
        [Dimension::Group, Dimension::Category, Dimension::SubCategory];

    pub const CHANNEL_HIERARCHY: [Dimension; 3] =
        [Dimension::Part, Dimension::Channel, Dimension::Account];
}

/// Restricts rows to those whose `dimension` value is one of `values`.
/// A filter whose only value is [`ALL`] (or that is empty) matches everything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Filter {
    pub dimension: Dimension,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new(dimension: Dimension, value: impl Into<String>) -> Self {
        Self {
            dimension,
            values: vec![value.into()],
        }
    }

    pub fn any_of(dimension: Dimension, values: &[&str]) -> Self {
        Self {
            dimension,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Builds a filter from an optional query parameter; `None` and `"all"` are inactive.
    pub fn optional(dimension: Dimension, value: Option<&str>) -> Self {
        Self::new(dimension, value.unwrap_or(ALL))
    }

    pub fn is_active(&self) -> bool {
        self.values.iter().any(|v| v != ALL && !v.is_empty())
    }

    pub fn matches(&self, row: &LedgerRow) -> bool {
        if !self.is_active() {
            return true;
        }
        match row.dimension(self.dimension) {
            Some(value) => self.values.iter().any(|v| v == value),
            None => false,
        }
    }

    pub fn label(&self) -> String {
        self.values.join(" + ")
    }
}

/// One cleaned ledger record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LedgerRow {
    pub period: Option<PeriodKey>,
    /// Day-of-month indicator as found in the file, possibly with noise such as `"9일"`.
    pub day: Option<String>,
    pub date: Option<NaiveDate>,
    pub sales: f64,
    pub profit: f64,
    pub part: Option<String>,
    pub channel: Option<String>,
    pub account: Option<String>,
    pub group: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub main_channel: Option<String>,
}

impl LedgerRow {
    pub fn dimension(&self, dimension: Dimension) -> Option<&str> {
        let value = match dimension {
            Dimension::Part => &self.part,
            Dimension::Channel => &self.channel,
            Dimension::Account => &self.account,
            Dimension::Group => &self.group,
            Dimension::Category => &self.category,
            Dimension::SubCategory => &self.sub_category,
            Dimension::MainChannel => &self.main_channel,
        };
        value.as_deref()
    }

    /// Day indicator with every non-digit stripped, e.g. `"9일"` -> `9`.
    pub fn day_number(&self) -> Option<u32> {
        let digits: String = self
            .day
            .as_deref()?
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    }
}

/// The normalized table. Consumers only ever read it; filtered views are
/// collected into new vectors of row references.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LedgerTable {
    /// Canonical names of the columns present in the source file.
    pub columns: BTreeSet<String>,
    /// Name of the column the day indicator was read from, if any.
    pub day_column: Option<String>,
    pub rows: Vec<LedgerRow>,
}

impl LedgerTable {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    pub fn require(&self, names: &[&str]) -> Result<()> {
        for name in names {
            if !self.has_column(name) {
                return Err(LedgerError::missing_column(name));
            }
        }
        Ok(())
    }

    pub fn require_dimensions(&self, dimensions: &[Dimension]) -> Result<()> {
        for dimension in dimensions {
            self.require(&[dimension.column()])?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn min_period(&self) -> Option<PeriodKey> {
        self.rows.iter().filter_map(|r| r.period).min()
    }

    pub fn max_period(&self) -> Option<PeriodKey> {
        self.rows.iter().filter_map(|r| r.period).max()
    }

    pub fn min_date(&self) -> Option<NaiveDate> {
        self.rows.iter().filter_map(|r| r.date).min()
    }

    pub fn max_date(&self) -> Option<NaiveDate> {
        self.rows.iter().filter_map(|r| r.date).max()
    }

    /// Rows passing every filter, after checking that each active filter's column exists.
    pub fn filtered<'a>(&'a self, filters: &[Filter]) -> Result<Vec<&'a LedgerRow>> {
        for filter in filters.iter().filter(|f| f.is_active()) {
            self.require(&[filter.dimension.column()])?;
        }
        Ok(self
            .rows
            .iter()
            .filter(|row| filters.iter().all(|f| f.matches(row)))
            .collect())
    }
}
