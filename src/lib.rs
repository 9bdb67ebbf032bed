//! # Sales Ledger Analytics
//!
//! Normalization and aggregation engine for periodic sales-ledger spreadsheets.
//!
//! Uploaded ledgers arrive as Excel or CSV files with inconsistently spelled
//! headers, comma-formatted amounts, mixed date encodings and zero-sales
//! placeholder rows. This crate turns them into a typed, cached table and
//! answers gap-filled monthly and daily queries over it.
//!
//! ## Core Concepts
//!
//! - **Period key**: a month encoded as `YYMM` or `YYYYMM`, kept in the file's own width
//! - **Gap-filling**: every month (or day) between the table's first and last appears in
//!   output, zero when no rows match
//! - **Days divisor**: the number of elapsed days a month's total is divided by for a
//!   daily average, ignoring future placeholder rows
//! - **Segments**: named filter sets used by the summary, alert and detail reports
//!
//! ## Example
//!
//! ```rust,ignore
//! use sales_ledger_analytics::*;
//!
//! let analytics = SalesAnalytics::new(EngineConfig::with_uploads_dir("uploads"))?;
//!
//! let validation = analytics.validate_upload_file("2025_sales.xlsx")?;
//! assert!(validation.ok, "{:?}", validation.message);
//!
//! let by_channel = analytics.monthly_by_channel("2025_sales.xlsx")?;
//! println!("{}", serde_json::to_string_pretty(&by_channel)?);
//!
//! let query = LedgerQuery {
//!     group: Some("마이비".to_string()),
//!     part: Some("이커머스".to_string()),
//!     ..Default::default()
//! };
//! let drill_down = analytics.filtered_monthly_sales("2025_sales.xlsx", &query)?;
//! assert_eq!(drill_down.label, "마이비 > 이커머스");
//! ```

pub mod aggregate;
pub mod alerts;
pub mod cache;
pub mod config;
pub mod dates;
pub mod divisor;
pub mod error;
pub mod ingestion;
pub mod normalize;
pub mod periods;
pub mod schema;
pub mod summary;
pub mod validation;

pub use aggregate::{
    DailySeriesRecord, HierarchyOptions, LedgerQuery, MetricSeries, SeriesRecord,
    DEFAULT_CHANNEL_LABEL, DEFAULT_LABEL,
};
pub use alerts::{AlertMetrics, AlertStatus, Comparison, SalesAlert};
pub use cache::{LedgerCache, Loader, TableCache};
pub use config::{ChannelValues, EngineConfig, SegmentSpec};
pub use dates::{resolve_date, DateResolution};
pub use divisor::{estimate_days, DaysDivisor, DivisorDecision};
pub use error::{LedgerError, Result};
pub use ingestion::{read_table, read_table_from_bytes, SourceFormat};
pub use normalize::normalize;
pub use periods::{month_range, PeriodKey, PeriodWidth};
pub use schema::{CellValue, Dimension, Filter, LedgerRow, LedgerTable, RawTable};
pub use summary::{MonthlySummary, SegmentStats, SegmentSummary};
pub use validation::{validate_upload, Validation};

use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Query entry point used by the hosting service. Every query names an
/// upload by filename and reads the cached normalized table.
pub struct SalesAnalytics {
    config: EngineConfig,
    cache: Arc<dyn TableCache>,
}

impl SalesAnalytics {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let cache = Arc::new(LedgerCache::new(&config));
        Self::with_cache(config, cache)
    }

    pub fn with_cache(config: EngineConfig, cache: Arc<dyn TableCache>) -> Result<Self> {
        config.validate()?;
        info!(
            "Sales analytics over {} (snapshots in {})",
            config.uploads_dir.display(),
            config.cache_dir().display()
        );
        Ok(Self { config, cache })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn table(&self, filename: &str) -> Result<Arc<LedgerTable>> {
        self.cache.get(filename)
    }

    pub fn monthly_by_channel(&self, filename: &str) -> Result<SeriesRecord> {
        let channels = &self.config.channel_values;
        aggregate::monthly_by_channel(&*self.table(filename)?, &channels.ecommerce, &channels.offline)
    }

    pub fn monthly_by_product_group(&self, filename: &str) -> Result<SeriesRecord> {
        aggregate::monthly_by_product_group(&*self.table(filename)?, self.config.top_group_limit)
    }

    pub fn filtered_monthly_sales(&self, filename: &str, query: &LedgerQuery) -> Result<SeriesRecord> {
        aggregate::filtered_monthly_sales(&*self.table(filename)?, query)
    }

    pub fn channel_layer_sales(&self, filename: &str, query: &LedgerQuery) -> Result<SeriesRecord> {
        aggregate::channel_layer_sales(&*self.table(filename)?, query)
    }

    pub fn daily_series(&self, filename: &str, query: &LedgerQuery) -> Result<DailySeriesRecord> {
        aggregate::daily_series(&*self.table(filename)?, query)
    }

    /// Product group -> category -> sub-categories.
    pub fn product_options(&self, filename: &str) -> Result<HierarchyOptions> {
        aggregate::hierarchy_options(&*self.table(filename)?, Dimension::PRODUCT_HIERARCHY)
    }

    /// Channel segment -> sub-channel -> accounts.
    pub fn channel_options(&self, filename: &str) -> Result<HierarchyOptions> {
        aggregate::hierarchy_options(&*self.table(filename)?, Dimension::CHANNEL_HIERARCHY)
    }

    pub fn monthly_summary(&self, filename: &str) -> Result<Option<MonthlySummary>> {
        summary::monthly_summary(&*self.table(filename)?, &self.config.summary_segments())
    }

    pub fn sales_alerts(&self, filename: &str) -> Result<Vec<SalesAlert>> {
        alerts::sales_alerts(&*self.table(filename)?, &self.config.alert_segments())
    }

    pub fn segment_details(&self, filename: &str) -> Result<BTreeMap<String, SegmentStats>> {
        summary::segment_details(
            &*self.table(filename)?,
            &self.config.detail_segments(),
            self.config.daily_window_months,
        )
    }

    /// Runs the strict date-format check on an uploaded file before it is queried.
    pub fn validate_upload_file(&self, filename: &str) -> Result<Validation> {
        let path = cache::source_path(&self.config.uploads_dir, filename)?;
        let raw = read_table(&path)?;
        let validation = validate_upload(&raw, self.config.validation_sample_size);
        debug!("Upload {} valid: {}", filename, validation.ok);
        Ok(validation)
    }

    pub fn validate_upload_bytes(&self, bytes: &[u8], format: SourceFormat) -> Result<Validation> {
        let raw = read_table_from_bytes(bytes, format)?;
        Ok(validate_upload(&raw, self.config.validation_sample_size))
    }

    pub fn invalidate(&self, filename: Option<&str>) {
        self.cache.invalidate(filename);
    }
}

/// JSON schemas of the query records, for collaborators that describe them.
pub struct QuerySchema;

impl QuerySchema {
    pub fn generate() -> BTreeMap<&'static str, schemars::schema::RootSchema> {
        BTreeMap::from([
            ("series", schemars::schema_for!(SeriesRecord)),
            ("daily_series", schemars::schema_for!(DailySeriesRecord)),
            ("hierarchy_options", schemars::schema_for!(HierarchyOptions)),
            ("monthly_summary", schemars::schema_for!(MonthlySummary)),
            ("sales_alerts", schemars::schema_for!(Vec<SalesAlert>)),
            ("segment_details", schemars::schema_for!(BTreeMap<String, SegmentStats>)),
            ("validation", schemars::schema_for!(Validation)),
            ("query", schemars::schema_for!(LedgerQuery)),
            ("config", schemars::schema_for!(EngineConfig)),
        ])
    }

    pub fn as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let json = QuerySchema::as_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["series"]["properties"]["days_divisor"].is_object());
        assert!(parsed["sales_alerts"].is_object());
        assert!(json.contains("series_by_dimension"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            validation_sample_size: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(SalesAnalytics::new(config), Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_filenames_cannot_escape_uploads() {
        let analytics = SalesAnalytics::new(EngineConfig::with_uploads_dir("uploads")).unwrap();
        assert!(matches!(
            analytics.monthly_by_channel("../etc/passwd"),
            Err(LedgerError::InvalidFilename(_))
        ));
        assert!(matches!(
            analytics.validate_upload_file("../x.csv"),
            Err(LedgerError::InvalidFilename(_))
        ));
    }
}
