use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Required column '{column}' not found in data")]
    MissingColumn { column: String },

    #[error("{0}")]
    DateFormat(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid filename '{0}': must be a plain file name inside the uploads directory")]
    InvalidFilename(String),

    #[error("Spreadsheet error: {0}")]
    SpreadsheetError(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl LedgerError {
    pub fn missing_column(column: &str) -> Self {
        Self::MissingColumn {
            column: column.to_string(),
        }
    }
}

impl From<calamine::Error> for LedgerError {
    fn from(err: calamine::Error) -> Self {
        Self::SpreadsheetError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
