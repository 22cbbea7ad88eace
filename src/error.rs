use crate::schema::ChangeMode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PnlError {
    #[error("No numeric columns were found to analyze. Please upload a file with actual numeric figures.")]
    NoNumericData,

    #[error("{mode} detection requires {required} columns")]
    NoMetricColumns {
        mode: ChangeMode,
        required: &'static str,
    },

    #[error("Invalid threshold {0}: must be a finite, non-negative number")]
    InvalidThreshold(f64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed table: {0}")]
    MalformedTable(String),

    #[error("Table extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PnlError>;
