//! # P&L Irregularities
//!
//! A library for cleaning Profit & Loss tables of unknown shape (from CSV
//! exports or PDF extraction) and flagging line items whose figures move more
//! than expected.
//!
//! ## Core Concepts
//!
//! - **Raw Table**: named columns of untyped cells, exactly as ingested
//! - **Cleaned Table**: one column of line-item labels plus numeric columns whose
//!   cells are finite numbers or missing
//! - **Period Columns**: figures at a point in time (months, quarters, years)
//! - **Percent Columns**: relative changes supplied by the source document
//! - **Anomalies**: (line item, metric) pairs whose change meets a threshold
//!
//! ## Example
//!
//! ```rust,ignore
//! use pnl_irregularities::*;
//!
//! let raw = read_csv("Line Item,Jan,Feb\nRevenue,\"$12,000\",\"$11,500\"\n".as_bytes())?;
//!
//! let config = AnalysisConfig {
//!     detector: DetectorOptions::new(ChangeMode::PeriodOverPeriod, 0.03),
//!     ..Default::default()
//! };
//!
//! let report = PnlAnalyzer::analyze(&raw, &config)?;
//! println!("{}", render_anomaly_table(&report.anomalies));
//! ```

pub mod detector;
pub mod error;
pub mod export;
pub mod ingestion;
pub mod line_items;
pub mod normalizer;
pub mod schema;
pub mod table;
pub mod utils;

#[cfg(feature = "gemini")]
pub mod extraction;

pub use detector::{detect, Anomaly, Direction, IrregularityDetector};
pub use error::{PnlError, Result};
pub use export::{render_anomaly_table, write_anomalies_csv, write_cleaned_csv};
pub use ingestion::*;
pub use line_items::{LineItemLocator, LineItemSource, LineItemStrategy};
pub use normalizer::{normalize, CleaningStats, ColumnStats, TableNormalizer};
pub use schema::*;
pub use table::*;
pub use utils::*;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub mode: ChangeMode,
    pub threshold: f64,
    pub cleaned: CleanedTable,
    pub stats: CleaningStats,
    pub anomalies: Vec<Anomaly>,
}

impl AnalysisReport {
    pub fn has_anomalies(&self) -> bool {
        !self.anomalies.is_empty()
    }

    /// Distinct flagged line items, in table order.
    pub fn flagged_line_items(&self) -> Vec<&str> {
        let mut rows: Vec<usize> = self.anomalies.iter().map(|a| a.row).collect();
        rows.dedup();
        rows.into_iter()
            .filter_map(|row| self.cleaned.labels.get(row).map(String::as_str))
            .collect()
    }

    /// One-paragraph plain-text summary for reports.
    pub fn summary(&self) -> String {
        let scope = format!(
            "Analyzed {} line items across {} numeric columns using {} detection ({}).",
            self.cleaned.row_count(),
            self.cleaned.columns.len(),
            self.mode,
            threshold_label(self.mode, self.threshold)
        );

        if !self.has_anomalies() {
            return format!("{} {}", scope, export::NO_ANOMALIES_MESSAGE);
        }

        let items = self.flagged_line_items();
        format!(
            "{} Found {} {} in {} line {}: {}.",
            scope,
            self.anomalies.len(),
            if self.anomalies.len() == 1 {
                "irregularity"
            } else {
                "irregularities"
            },
            items.len(),
            if items.len() == 1 { "item" } else { "items" },
            items.join(", ")
        )
    }
}

fn threshold_label(mode: ChangeMode, threshold: f64) -> String {
    match mode {
        ChangeMode::ExplicitPercent => format!("threshold {:.2} percentage points", threshold),
        ChangeMode::PeriodOverPeriod => format!("threshold {}", format_percent(threshold * 100.0)),
        ChangeMode::Statistical => format!("z-score above {:.2}", threshold),
    }
}

pub struct PnlAnalyzer;

impl PnlAnalyzer {
    pub fn analyze(raw: &RawTable, config: &AnalysisConfig) -> Result<AnalysisReport> {
        config.validate()?;

        let normalizer = TableNormalizer::new(config.normalizer.clone());
        let (cleaned, stats) = normalizer.normalize_with_stats(raw)?;
        debug!(
            "Line items identified by {:?}; dropped columns: {:?}",
            stats.line_item_source, stats.dropped_columns
        );

        let detector = IrregularityDetector::new(config.detector.clone());
        let anomalies = detector.run(&cleaned)?;

        let report = AnalysisReport {
            generated_at: Utc::now(),
            mode: config.detector.mode,
            threshold: config.detector.effective_threshold(),
            cleaned,
            stats,
            anomalies,
        };
        info!("{}", report.summary());

        Ok(report)
    }

    pub fn analyze_csv_path(
        path: impl AsRef<Path>,
        config: &AnalysisConfig,
    ) -> Result<AnalysisReport> {
        let raw = read_csv_path(path)?;
        Self::analyze(&raw, config)
    }
}

pub fn analyze(raw: &RawTable, config: &AnalysisConfig) -> Result<AnalysisReport> {
    PnlAnalyzer::analyze(raw, config)
}
