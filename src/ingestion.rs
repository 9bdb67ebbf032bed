use crate::error::{LedgerError, Result};
use crate::schema::{CellValue, RawTable};
use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Reader, Sheets};
use log::{debug, info};
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Spreadsheet,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();
        Self::from_extension(&extension)
            .ok_or_else(|| LedgerError::UnsupportedFormat(path.display().to_string()))
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_lowercase().as_str() {
            "csv" | "txt" => Some(Self::Csv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(Self::Spreadsheet),
            _ => None,
        }
    }
}

/// Decodes a ledger file from disk, picking the reader from its extension.
pub fn read_table(path: &Path) -> Result<RawTable> {
    if !path.exists() {
        return Err(LedgerError::FileNotFound(path.display().to_string()));
    }
    let format = SourceFormat::from_path(path)?;
    let started = Instant::now();

    let table = match format {
        SourceFormat::Csv => read_csv(std::fs::File::open(path)?)?,
        SourceFormat::Spreadsheet => {
            let mut workbook = open_workbook_auto(path)?;
            read_first_sheet(&mut workbook)?
        }
    };

    info!(
        "Loaded {} ({} rows) in {:.2}s",
        path.display(),
        table.rows.len(),
        started.elapsed().as_secs_f64()
    );
    Ok(table)
}

/// Decodes an uploaded byte stream.
pub fn read_table_from_bytes(bytes: &[u8], format: SourceFormat) -> Result<RawTable> {
    match format {
        SourceFormat::Csv => read_csv(bytes),
        SourceFormat::Spreadsheet => {
            let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
            read_first_sheet(&mut workbook)
        }
    }
}

pub fn read_csv<R: Read>(reader: R) -> Result<RawTable> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        rows.push(record.iter().map(CellValue::from).collect());
    }

    Ok(RawTable::new(headers, rows))
}

fn read_first_sheet<RS: Read + Seek>(workbook: &mut Sheets<RS>) -> Result<RawTable> {
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| LedgerError::SpreadsheetError("workbook has no sheets".to_string()))?;
    let range = workbook.worksheet_range(&sheet_name)?;

    let mut rows = range.rows().skip_while(|row| row.iter().all(|c| matches!(c, Data::Empty)));
    let Some(header_row) = rows.next() else {
        return Ok(RawTable::default());
    };

    let headers: Vec<String> = header_row
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell_value(cell).as_text() {
            Some(name) => name,
            None => format!("col_{}", i + 1),
        })
        .collect();

    let body: Vec<Vec<CellValue>> = rows.map(|row| row.iter().map(cell_value).collect()).collect();
    debug!("Sheet '{}': {} columns, {} rows", sheet_name, headers.len(), body.len());

    Ok(RawTable::new(headers, body))
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::Int(v) => CellValue::Number(*v as f64),
        Data::Float(v) => CellValue::Number(*v),
        // Spreadsheet dates stay as serial numbers; the date resolver interprets them.
        Data::DateTime(v) => CellValue::Number(v.as_f64()),
        Data::Bool(v) => CellValue::Text(v.to_string()),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}
