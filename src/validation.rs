use crate::error::{LedgerError, Result};
use crate::normalize::clean_header;
use crate::schema::{columns, CellValue, RawTable};
use chrono::NaiveDate;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The only date layout accepted on upload.
pub const EXPECTED_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}$";

/// Offending samples quoted in the message.
const MAX_QUOTED: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Validation {
    pub ok: bool,
    pub message: Option<String>,
}

impl Validation {
    fn passed() -> Self {
        Self {
            ok: true,
            message: None,
        }
    }
}

fn is_strict_date(text: &str, pattern: &Regex) -> bool {
    pattern.is_match(text) && NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
}

fn sample_text(cell: &CellValue) -> Option<String> {
    match cell {
        CellValue::Empty => None,
        CellValue::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
        CellValue::Number(n) => Some(n.to_string()),
        CellValue::Text(s) if s.trim().is_empty() => None,
        CellValue::Text(s) => Some(s.trim().to_string()),
    }
}

/// Strict gate for new uploads: the first `sample_size` non-empty values of
/// the date column must be literal `YYYY-MM-DD` calendar dates.
///
/// A file without a date column, or with no values in it, passes.
pub fn validate_upload(table: &RawTable, sample_size: usize) -> Validation {
    let Some(idx) = table
        .headers
        .iter()
        .position(|h| clean_header(h) == columns::DATE)
    else {
        return Validation::passed();
    };

    let samples: Vec<String> = table
        .rows
        .iter()
        .filter_map(|row| row.get(idx).and_then(sample_text))
        .take(sample_size)
        .collect();
    if samples.is_empty() {
        return Validation::passed();
    }

    let pattern = match Regex::new(EXPECTED_PATTERN) {
        Ok(p) => p,
        Err(e) => {
            return Validation {
                ok: false,
                message: Some(format!("Date pattern failed to compile: {}", e)),
            }
        }
    };

    let invalid_total = samples
        .iter()
        .filter(|s| !is_strict_date(s, &pattern))
        .count();
    if invalid_total == 0 {
        return Validation::passed();
    }

    let examples: Vec<String> = samples
        .iter()
        .filter(|s| !is_strict_date(s, &pattern))
        .take(MAX_QUOTED)
        .map(|s| format!("\"{}\"", s))
        .collect();

    let message = format!(
        "Date format error: column '{}' contains values that are not valid dates.\n\
         \n\
         Expected format: YYYY-MM-DD (e.g. 2025-01-01, 2026-01-06)\n\
         Found: {}\n\
         \n\
         Please fix the data and upload again.\n\
         {} of {} sampled values have an invalid format.",
        columns::DATE,
        examples.join(", "),
        invalid_total,
        samples.len()
    );

    Validation {
        ok: false,
        message: Some(message),
    }
}

/// [`validate_upload`] as a `Result`, for callers that propagate errors.
pub fn ensure_valid_upload(table: &RawTable, sample_size: usize) -> Result<()> {
    let validation = validate_upload(table, sample_size);
    if validation.ok {
        Ok(())
    } else {
        Err(LedgerError::DateFormat(
            validation.message.unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_dates(values: &[&str]) -> RawTable {
        RawTable::new(
            vec!["일별\t".to_string(), "판매액".to_string()],
            values
                .iter()
                .map(|v| vec![CellValue::from(*v), CellValue::Number(1.0)])
                .collect(),
        )
    }

    #[test]
    fn test_well_formed_dates_pass() {
        let validation = validate_upload(&table_with_dates(&["2025-01-01", "2025-01-02"]), 20);
        assert!(validation.ok);
        assert!(validation.message.is_none());
    }

    #[test]
    fn test_bad_dates_are_listed() {
        let validation = validate_upload(&table_with_dates(&["2025-13-45", "20250101"]), 20);
        assert!(!validation.ok);
        let message = validation.message.unwrap();
        assert!(message.contains("\"2025-13-45\""), "{}", message);
        assert!(message.contains("\"20250101\""), "{}", message);
        assert!(message.contains("YYYY-MM-DD"));
        assert!(message.contains("2 of 2"));
        assert!(message.lines().count() > 1);
    }

    #[test]
    fn test_at_most_three_examples_quoted() {
        let validation = validate_upload(
            &table_with_dates(&["1/1/2025", "1/2/2025", "1/3/2025", "1/4/2025", "2025-01-05"]),
            20,
        );
        let message = validation.message.unwrap();
        assert!(message.contains("\"1/3/2025\""));
        assert!(!message.contains("\"1/4/2025\""));
        assert!(message.contains("4 of 5"));
    }

    #[test]
    fn test_every_invalid_sample_is_counted() {
        let dates = ["x1", "x2", "x3", "x4", "x5", "x6", "x7"];
        let message = validate_upload(&table_with_dates(&dates), 20).message.unwrap();
        assert!(message.contains("Found: \"x1\", \"x2\", \"x3\"\n"));
        assert!(message.contains("7 of 7"));
    }

    #[test]
    fn test_only_sample_is_inspected() {
        let validation = validate_upload(&table_with_dates(&["2025-01-01", "", "bad"]), 1);
        assert!(validation.ok);
    }

    #[test]
    fn test_missing_column_or_values_pass() {
        let no_column = RawTable::new(vec!["판매액".to_string()], vec![vec![CellValue::Number(1.0)]]);
        assert!(validate_upload(&no_column, 20).ok);
        assert!(validate_upload(&table_with_dates(&["", " "]), 20).ok);
    }

    #[test]
    fn test_serial_numbers_are_rejected_on_upload() {
        let table = RawTable::new(
            vec!["일별".to_string()],
            vec![vec![CellValue::Number(45658.0)]],
        );
        let err = ensure_valid_upload(&table, 20).unwrap_err();
        assert!(matches!(err, LedgerError::DateFormat(ref m) if m.contains("\"45658\"")));
    }
}
