use crate::error::{LedgerError, Result};
use crate::schema::{columns, Dimension, Filter};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A named row subset used by the alert, summary and detail reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentSpec {
    pub name: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

impl SegmentSpec {
    pub fn new(name: impl Into<String>, filters: Vec<Filter>) -> Self {
        Self {
            name: name.into(),
            filters,
        }
    }
}

/// Raw values of the top-level channel segment column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ChannelValues {
    pub ecommerce: String,
    pub offline: String,
}

impl Default for ChannelValues {
    fn default() -> Self {
        Self {
            ecommerce: "이커머스".to_string(),
            offline: "오프라인".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding uploaded ledger files.
    pub uploads_dir: PathBuf,

    /// Directory for normalized snapshots. Defaults to `<uploads_dir>/cache`.
    pub cache_dir: Option<PathBuf>,

    /// How many product groups the group breakdown keeps, ranked by total sales.
    pub top_group_limit: usize,

    /// Column names probed, in order, for the day-of-month indicator.
    pub day_column_candidates: Vec<String>,

    /// Known misspelled headers mapped to their canonical name.
    pub column_aliases: BTreeMap<String, String>,

    pub channel_values: ChannelValues,

    /// Value of the main-channel column that marks a main channel.
    pub main_channel_flag: String,

    /// Number of non-empty date values inspected by the upload validator.
    pub validation_sample_size: usize,

    /// Length of the trailing daily window in segment details.
    pub daily_window_months: u32,

    /// Segment overrides. When absent, the lists are built from `channel_values`
    /// and `main_channel_flag`.
    pub alert_segments: Option<Vec<SegmentSpec>>,
    pub summary_segments: Option<Vec<SegmentSpec>>,
    pub detail_segments: Option<Vec<SegmentSpec>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("uploads"),
            cache_dir: None,
            top_group_limit: 10,
            day_column_candidates: ["일구분", "일자", "일", "Day", "day", "Date", "date"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            column_aliases: BTreeMap::from([(
                "거래쳐명".to_string(),
                columns::ACCOUNT.to_string(),
            )]),
            channel_values: ChannelValues::default(),
            main_channel_flag: "주력".to_string(),
            validation_sample_size: 20,
            daily_window_months: 6,
            alert_segments: None,
            summary_segments: None,
            detail_segments: None,
        }
    }
}

impl EngineConfig {
    pub fn with_uploads_dir(uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `LEDGER_UPLOADS_DIR`, `LEDGER_CACHE_DIR` and `LEDGER_TOP_GROUPS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("LEDGER_UPLOADS_DIR") {
            config.uploads_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("LEDGER_CACHE_DIR") {
            config.cache_dir = Some(PathBuf::from(dir));
        }
        if let Ok(limit) = std::env::var("LEDGER_TOP_GROUPS") {
            config.top_group_limit = limit.trim().parse().map_err(|_| {
                LedgerError::Config(format!("LEDGER_TOP_GROUPS must be an integer, got '{}'", limit))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_group_limit == 0 {
            return Err(LedgerError::Config(
                "top_group_limit must be at least 1".to_string(),
            ));
        }
        if self.validation_sample_size == 0 {
            return Err(LedgerError::Config(
                "validation_sample_size must be at least 1".to_string(),
            ));
        }
        if self.daily_window_months == 0 {
            return Err(LedgerError::Config(
                "daily_window_months must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn alert_segments(&self) -> Vec<SegmentSpec> {
        self.alert_segments.clone().unwrap_or_else(|| {
            default_alert_segments(&self.channel_values, &self.main_channel_flag)
        })
    }

    pub fn summary_segments(&self) -> Vec<SegmentSpec> {
        self.summary_segments
            .clone()
            .unwrap_or_else(|| default_summary_segments(&self.channel_values))
    }

    pub fn detail_segments(&self) -> Vec<SegmentSpec> {
        self.detail_segments.clone().unwrap_or_else(|| {
            default_detail_segments(&self.channel_values, &self.main_channel_flag)
        })
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.uploads_dir.join("cache"))
    }
}

fn default_alert_segments(channels: &ChannelValues, main_flag: &str) -> Vec<SegmentSpec> {
    let ecommerce = Filter::new(Dimension::Part, channels.ecommerce.as_str());
    let mut segments = vec![
        SegmentSpec::new(format!("{} - 전체", channels.ecommerce), vec![ecommerce.clone()]),
        SegmentSpec::new(
            format!("{} - 주력 채널 (쿠팡 제외)", channels.ecommerce),
            vec![ecommerce.clone(), Filter::new(Dimension::MainChannel, main_flag)],
        ),
    ];

    for account in [
        "쿠팡(로켓)",
        "스팜(제제지크)",
        "스팜(쏭레브)",
        "11st",
        "이베이",
        "카카오",
        "CJ",
        "베이비빌리(주식회사 빌리지베이비)",
    ] {
        segments.push(SegmentSpec::new(
            format!("{} - {}", channels.ecommerce, account),
            vec![ecommerce.clone(), Filter::new(Dimension::Account, account)],
        ));
    }

    segments.push(SegmentSpec::new(
        "해외",
        vec![Filter::new(Dimension::Channel, "해외")],
    ));
    segments.push(SegmentSpec::new(
        channels.offline.as_str(),
        vec![Filter::new(Dimension::Part, channels.offline.as_str())],
    ));
    for account in ["이마트", "롯데마트", "다이소"] {
        segments.push(SegmentSpec::new(
            account,
            vec![Filter::new(Dimension::Account, account)],
        ));
    }
    segments.push(SegmentSpec::new(
        "오프라인 대리점",
        vec![Filter::new(Dimension::Channel, "오프라인 대리점")],
    ));
    segments
}

fn default_summary_segments(channels: &ChannelValues) -> Vec<SegmentSpec> {
    let mut segments = vec![
        SegmentSpec::new("전체", Vec::new()),
        SegmentSpec::new(
            channels.ecommerce.as_str(),
            vec![Filter::new(Dimension::Part, channels.ecommerce.as_str())],
        ),
        SegmentSpec::new(
            channels.offline.as_str(),
            vec![Filter::new(Dimension::Part, channels.offline.as_str())],
        ),
    ];
    for brand in ["마이비", "누비", "쏭레브"] {
        segments.push(SegmentSpec::new(
            brand,
            vec![Filter::new(Dimension::Group, brand)],
        ));
    }
    segments
}

fn default_detail_segments(channels: &ChannelValues, main_flag: &str) -> Vec<SegmentSpec> {
    let ecommerce = Filter::new(Dimension::Part, channels.ecommerce.as_str());
    let offline = Filter::new(Dimension::Part, channels.offline.as_str());
    let both = Filter::any_of(
        Dimension::Part,
        &[channels.ecommerce.as_str(), channels.offline.as_str()],
    );
    let main = Filter::new(Dimension::MainChannel, main_flag);

    let mut segments = vec![
        SegmentSpec::new("ecommerce", vec![ecommerce.clone()]),
        SegmentSpec::new("offline", vec![offline.clone()]),
        SegmentSpec::new("total", vec![both.clone()]),
        SegmentSpec::new("main_overall", vec![ecommerce.clone(), main.clone()]),
    ];

    for (key, brand) in [("myb", "마이비"), ("nubi", "누비"), ("sonreve", "쏭레브")] {
        let brand_filter = Filter::new(Dimension::Group, brand);
        segments.push(SegmentSpec::new(key, vec![brand_filter.clone()]));
        for (prefix, channel) in [
            ("ecommerce", &ecommerce),
            ("offline", &offline),
            ("total", &both),
        ] {
            segments.push(SegmentSpec::new(
                format!("{}_{}", prefix, key),
                vec![channel.clone(), brand_filter.clone()],
            ));
        }
        segments.push(SegmentSpec::new(
            format!("main_{}", key),
            vec![ecommerce.clone(), main.clone(), brand_filter],
        ));
    }
    segments
}
