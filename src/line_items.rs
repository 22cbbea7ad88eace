//! Discovery of the column that labels each row of the statement.
//!
//! Strategies are tried in a fixed order and the first one that names a
//! column wins. When none does, the normalizer synthesizes positional labels.

use crate::schema::NormalizerOptions;
use crate::table::{RawColumn, RawTable};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Header used for synthesized labels.
pub const SYNTHESIZED_COLUMN: &str = "Line Item";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemSource {
    /// Header matched one of the configured keywords.
    Keyword,
    /// First text column with enough distinct values.
    TextHeuristic,
    /// No column qualified; labels are "Row 1", "Row 2", ...
    Synthesized,
}

pub trait LineItemStrategy: Send + Sync {
    fn source(&self) -> LineItemSource;

    /// Index of the line-item column, if this strategy can identify one.
    fn locate(&self, table: &RawTable) -> Option<usize>;
}

/// Matches headers against keywords, case-insensitively.
///
/// Keywords are tried in order. For each keyword an exact header match wins
/// over a substring match, and a substring match is ignored when the column
/// holds nothing but numbers (e.g. "Service Revenue").
pub struct KeywordMatch {
    keywords: Vec<String>,
}

impl KeywordMatch {
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.trim().to_lowercase()).collect(),
        }
    }
}

impl LineItemStrategy for KeywordMatch {
    fn source(&self) -> LineItemSource {
        LineItemSource::Keyword
    }

    fn locate(&self, table: &RawTable) -> Option<usize> {
        let headers: Vec<String> = table
            .columns()
            .iter()
            .map(|c| c.name.trim().to_lowercase())
            .collect();

        for keyword in &self.keywords {
            if let Some(idx) = headers.iter().position(|h| h == keyword) {
                return Some(idx);
            }

            let substring_match = headers.iter().enumerate().position(|(idx, h)| {
                h.contains(keyword.as_str()) && !is_all_numeric(&table.columns()[idx])
            });
            if substring_match.is_some() {
                return substring_match;
            }
        }

        None
    }
}

/// Picks the first mostly-text column with enough distinct values to tell rows apart.
pub struct TextColumnHeuristic {
    min_distinct: usize,
}

impl TextColumnHeuristic {
    pub fn new(min_distinct: usize) -> Self {
        Self { min_distinct }
    }
}

impl LineItemStrategy for TextColumnHeuristic {
    fn source(&self) -> LineItemSource {
        LineItemSource::TextHeuristic
    }

    fn locate(&self, table: &RawTable) -> Option<usize> {
        let required = self.min_distinct.min(table.row_count()).max(1);

        table.columns().iter().position(|column| {
            is_text_column(column) && distinct_labels(column) >= required
        })
    }
}

/// Runs the strategy chain in priority order.
pub struct LineItemLocator {
    strategies: Vec<Box<dyn LineItemStrategy>>,
}

impl LineItemLocator {
    pub fn new(strategies: Vec<Box<dyn LineItemStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn from_options(options: &NormalizerOptions) -> Self {
        Self::new(vec![
            Box::new(KeywordMatch::new(&options.line_item_keywords)),
            Box::new(TextColumnHeuristic::new(options.min_distinct_labels)),
        ])
    }

    /// First strategy hit as `(column index, source)`; `None` means synthesize.
    pub fn locate(&self, table: &RawTable) -> Option<(usize, LineItemSource)> {
        self.strategies
            .iter()
            .find_map(|s| s.locate(table).map(|idx| (idx, s.source())))
    }
}

/// Positional labels for tables without a usable label column.
pub fn synthesize_labels(rows: usize) -> Vec<String> {
    (1..=rows).map(|i| format!("Row {}", i)).collect()
}

fn is_all_numeric(column: &RawColumn) -> bool {
    let mut saw_value = false;
    for cell in column.cells.iter().filter(|c| !c.is_blank()) {
        match cell.parse_number() {
            Ok(Some(_)) => saw_value = true,
            _ => return false,
        }
    }
    saw_value
}

/// Fewer than half of the non-blank cells parse as numbers.
fn is_text_column(column: &RawColumn) -> bool {
    let mut non_blank = 0usize;
    let mut numeric = 0usize;
    for cell in column.cells.iter().filter(|c| !c.is_blank()) {
        non_blank += 1;
        if matches!(cell.parse_number(), Ok(Some(_))) {
            numeric += 1;
        }
    }
    non_blank > 0 && numeric * 2 < non_blank
}

fn distinct_labels(column: &RawColumn) -> usize {
    column
        .cells
        .iter()
        .filter(|c| !c.is_blank())
        .map(|c| c.label())
        .collect::<HashSet<_>>()
        .len()
}
