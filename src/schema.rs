use crate::error::{PnlError, Result};
use crate::utils::validate_threshold;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Header keywords that mark the line-item column, in priority order.
pub const DEFAULT_LINE_ITEM_KEYWORDS: [&str; 7] = [
    "Line Item",
    "Account",
    "Item",
    "Description",
    "Name",
    "Service",
    "Product",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum HeaderCase {
    #[schemars(description = "Keep column headers as written (after trimming whitespace).")]
    Preserve,

    #[schemars(description = "Lowercase every column header after trimming whitespace.")]
    Lowercase,
}

impl Default for HeaderCase {
    fn default() -> Self {
        Self::Preserve
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum RetentionPolicy {
    #[schemars(
        description = "Keep a column as numeric when at least one non-empty cell parses. Cells that fail become missing."
    )]
    Lenient,

    #[schemars(description = "Keep a column as numeric only when every non-empty cell parses.")]
    Strict,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::Lenient
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum PercentScale {
    #[schemars(description = "Store percentages as percentage points: \"12.5%\" becomes 12.5.")]
    Points,

    #[schemars(description = "Store percentages as fractions: \"12.5%\" becomes 0.125.")]
    Fraction,
}

impl Default for PercentScale {
    fn default() -> Self {
        Self::Points
    }
}

impl PercentScale {
    /// Converts a stored percent value to percentage points.
    pub fn to_points(self, value: f64) -> f64 {
        match self {
            Self::Points => value,
            Self::Fraction => value * 100.0,
        }
    }

    /// Converts percentage points to this scale.
    pub fn from_points(self, points: f64) -> f64 {
        match self {
            Self::Points => points,
            Self::Fraction => points / 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum MissingPolicy {
    #[schemars(description = "Empty or unparseable numeric cells become an explicit missing value.")]
    Missing,

    #[schemars(description = "Empty or unparseable numeric cells become 0.0.")]
    ZeroFill,
}

impl Default for MissingPolicy {
    fn default() -> Self {
        Self::Missing
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum ChangeMode {
    #[schemars(
        description = "Flag cells of change/percent columns whose magnitude meets the threshold (in percentage points, e.g. 5.0)."
    )]
    ExplicitPercent,

    #[schemars(
        description = "Compute the relative change between adjacent period columns and flag changes meeting the threshold (as a fraction, e.g. 0.05)."
    )]
    PeriodOverPeriod,

    #[schemars(
        description = "Standardize each row across its period columns and flag cells whose z-score exceeds the threshold (e.g. 2.0)."
    )]
    Statistical,
}

impl Default for ChangeMode {
    fn default() -> Self {
        Self::PeriodOverPeriod
    }
}

impl ChangeMode {
    pub fn default_threshold(self) -> f64 {
        match self {
            Self::ExplicitPercent => 5.0,
            Self::PeriodOverPeriod => 0.05,
            Self::Statistical => 2.0,
        }
    }
}

impl fmt::Display for ChangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ExplicitPercent => "explicit-percent",
            Self::PeriodOverPeriod => "period-over-period",
            Self::Statistical => "statistical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum MatchPolicy {
    #[schemars(description = "Report every offending metric of a row.")]
    AllMatches,

    #[schemars(description = "Report only the first offending metric of each row.")]
    FirstPerRow,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self::AllMatches
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct NormalizerOptions {
    #[serde(default)]
    #[schemars(description = "How column headers are cased after trimming. Matching is always case-insensitive.")]
    pub header_case: HeaderCase,

    #[serde(default)]
    #[schemars(description = "When a column counts as numeric. Columns that fail are dropped.")]
    pub retention: RetentionPolicy,

    #[serde(default)]
    #[schemars(description = "Representation of values in change/percent columns.")]
    pub percent_scale: PercentScale,

    #[serde(default)]
    #[schemars(description = "What empty or unparseable numeric cells become.")]
    pub missing: MissingPolicy,

    #[serde(default = "default_line_item_keywords")]
    #[schemars(
        description = "Header keywords identifying the line-item column, in priority order. Matched case-insensitively, exact match before substring match."
    )]
    pub line_item_keywords: Vec<String>,

    #[serde(default = "default_min_distinct_labels")]
    #[schemars(
        description = "Minimum number of distinct values a text column needs to be picked as the line-item column when no header keyword matches."
    )]
    pub min_distinct_labels: usize,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            header_case: HeaderCase::default(),
            retention: RetentionPolicy::default(),
            percent_scale: PercentScale::default(),
            missing: MissingPolicy::default(),
            line_item_keywords: default_line_item_keywords(),
            min_distinct_labels: default_min_distinct_labels(),
        }
    }
}

fn default_line_item_keywords() -> Vec<String> {
    DEFAULT_LINE_ITEM_KEYWORDS
        .iter()
        .map(|k| k.to_string())
        .collect()
}

fn default_min_distinct_labels() -> usize {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema, Default)]
pub struct DetectorOptions {
    #[serde(default)]
    #[schemars(description = "Which detection algorithm to run.")]
    pub mode: ChangeMode,

    #[serde(default)]
    #[schemars(
        description = "Flagging threshold. Units depend on the mode. Defaults: ExplicitPercent 5.0, PeriodOverPeriod 0.05, Statistical 2.0."
    )]
    pub threshold: Option<f64>,

    #[serde(default)]
    #[schemars(description = "Whether a row reports all offending metrics or only the first.")]
    pub match_policy: MatchPolicy,
}

impl DetectorOptions {
    pub fn new(mode: ChangeMode, threshold: f64) -> Self {
        Self {
            mode,
            threshold: Some(threshold),
            match_policy: MatchPolicy::default(),
        }
    }

    pub fn with_match_policy(mut self, match_policy: MatchPolicy) -> Self {
        self.match_policy = match_policy;
        self
    }

    pub fn effective_threshold(&self) -> f64 {
        self.threshold
            .unwrap_or_else(|| self.mode.default_threshold())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema, Default)]
pub struct AnalysisConfig {
    #[serde(default)]
    #[schemars(description = "Table cleaning options")]
    pub normalizer: NormalizerOptions,

    #[serde(default)]
    #[schemars(description = "Irregularity detection options")]
    pub detector: DetectorOptions,
}

impl AnalysisConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.detector.effective_threshold())?;

        if self.normalizer.min_distinct_labels == 0 {
            return Err(PnlError::InvalidConfig(
                "min_distinct_labels must be at least 1".to_string(),
            ));
        }

        if self
            .normalizer
            .line_item_keywords
            .iter()
            .any(|k| k.trim().is_empty())
        {
            return Err(PnlError::InvalidConfig(
                "line_item_keywords must not contain blank entries".to_string(),
            ));
        }

        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalysisConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
