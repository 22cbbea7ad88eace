use crate::error::{PnlError, Result};
use crate::line_items::{synthesize_labels, LineItemLocator, LineItemSource, SYNTHESIZED_COLUMN};
use crate::schema::{HeaderCase, MissingPolicy, NormalizerOptions, PercentScale, RetentionPolicy};
use crate::table::{CleanedTable, ColumnKind, NumericColumn, RawColumn, RawTable};
use crate::utils::is_change_header;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

/// Per-column coercion counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub name: String,
    pub kind: ColumnKind,
    /// Cells that parsed to a number.
    pub coerced: usize,
    /// Blank cells.
    pub blank: usize,
    /// Non-blank cells that did not parse.
    pub failed: usize,
    /// Cells set to 0.0 under [`MissingPolicy::ZeroFill`].
    pub zero_filled: usize,
}

/// What the normalizer did to a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningStats {
    pub line_item_source: LineItemSource,
    pub rows_in: usize,
    pub dropped_rows: usize,
    pub dropped_columns: Vec<String>,
    pub columns: Vec<ColumnStats>,
}

impl CleaningStats {
    pub fn total_coerced(&self) -> usize {
        self.columns.iter().map(|c| c.coerced).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.columns.iter().map(|c| c.failed).sum()
    }
}

struct Coerced {
    values: Vec<Option<f64>>,
    coerced: usize,
    blank: usize,
    failed: usize,
    percent_cells: bool,
}

pub struct TableNormalizer {
    options: NormalizerOptions,
    locator: LineItemLocator,
}

impl Default for TableNormalizer {
    fn default() -> Self {
        Self::new(NormalizerOptions::default())
    }
}

impl TableNormalizer {
    pub fn new(options: NormalizerOptions) -> Self {
        let locator = LineItemLocator::from_options(&options);
        Self { options, locator }
    }

    pub fn options(&self) -> &NormalizerOptions {
        &self.options
    }

    pub fn normalize(&self, raw: &RawTable) -> Result<CleanedTable> {
        self.normalize_with_stats(raw).map(|(table, _)| table)
    }

    pub fn normalize_with_stats(&self, raw: &RawTable) -> Result<(CleanedTable, CleaningStats)> {
        info!(
            "Normalizing table with {} columns and {} rows",
            raw.columns().len(),
            raw.row_count()
        );

        let table = raw
            .map_headers(|name| self.apply_header_case(name.trim()))
            .without_blank_rows();
        let mut dropped_rows = raw.row_count() - table.row_count();

        let located = self.locator.locate(&table);
        let (line_item_column, mut labels, line_item_source) = match located {
            Some((idx, source)) => {
                let column = &table.columns()[idx];
                debug!("Line-item column '{}' found by {:?}", column.name, source);
                (
                    column.name.clone(),
                    column.cells.iter().map(|c| c.label()).collect::<Vec<_>>(),
                    source,
                )
            }
            None => {
                debug!("No line-item column found, synthesizing row labels");
                (
                    self.apply_header_case(SYNTHESIZED_COLUMN),
                    synthesize_labels(table.row_count()),
                    LineItemSource::Synthesized,
                )
            }
        };
        let label_idx = located.map(|(idx, _)| idx);

        let mut columns = Vec::new();
        let mut column_stats = Vec::new();
        let mut dropped_columns = Vec::new();

        for (idx, raw_column) in table.columns().iter().enumerate() {
            if Some(idx) == label_idx {
                continue;
            }

            let coerced = coerce_column(raw_column);
            if !self.retains(&coerced) {
                debug!(
                    "Dropping column '{}' ({} parsed, {} failed)",
                    raw_column.name, coerced.coerced, coerced.failed
                );
                dropped_columns.push(raw_column.name.clone());
                continue;
            }

            let kind = if is_change_header(&raw_column.name) || coerced.percent_cells {
                ColumnKind::Percent
            } else {
                ColumnKind::Period
            };

            let mut values = coerced.values;
            if kind == ColumnKind::Percent && self.options.percent_scale == PercentScale::Fraction {
                for value in values.iter_mut().flatten() {
                    *value = PercentScale::Fraction.from_points(*value);
                }
            }

            let mut zero_filled = 0;
            if self.options.missing == MissingPolicy::ZeroFill {
                for value in values.iter_mut().filter(|v| v.is_none()) {
                    *value = Some(0.0);
                    zero_filled += 1;
                }
            }

            debug!("Column '{}' classified as {:?}", raw_column.name, kind);
            column_stats.push(ColumnStats {
                name: raw_column.name.clone(),
                kind,
                coerced: coerced.coerced,
                blank: coerced.blank,
                failed: coerced.failed,
                zero_filled,
            });
            columns.push(NumericColumn {
                name: raw_column.name.clone(),
                kind,
                values,
            });
        }

        if columns.is_empty() {
            return Err(PnlError::NoNumericData);
        }

        // A row with no label and no surviving value carries nothing.
        let keep: Vec<bool> = (0..labels.len())
            .map(|row| {
                !labels[row].is_empty() || columns.iter().any(|c| c.values[row].is_some())
            })
            .collect();
        if keep.iter().any(|k| !k) {
            let mut flags = keep.iter();
            labels.retain(|_| *flags.next().unwrap_or(&true));
            for column in &mut columns {
                let mut flags = keep.iter();
                column.values.retain(|_| *flags.next().unwrap_or(&true));
            }
            dropped_rows += keep.iter().filter(|k| !**k).count();
        }

        let cleaned = CleanedTable {
            line_item_column,
            labels,
            columns,
            percent_scale: self.options.percent_scale,
        };
        let stats = CleaningStats {
            line_item_source,
            rows_in: raw.row_count(),
            dropped_rows,
            dropped_columns,
            columns: column_stats,
        };

        info!(
            "Cleaned table has {} line items and {} numeric columns ({} cells coerced, {} failed)",
            cleaned.row_count(),
            cleaned.columns.len(),
            stats.total_coerced(),
            stats.total_failed()
        );

        Ok((cleaned, stats))
    }

    fn apply_header_case(&self, name: &str) -> String {
        match self.options.header_case {
            HeaderCase::Preserve => name.to_string(),
            HeaderCase::Lowercase => name.to_lowercase(),
        }
    }

    fn retains(&self, coerced: &Coerced) -> bool {
        match self.options.retention {
            RetentionPolicy::Lenient => coerced.coerced > 0,
            RetentionPolicy::Strict => coerced.coerced > 0 && coerced.failed == 0,
        }
    }
}

fn coerce_column(column: &RawColumn) -> Coerced {
    let mut coerced = Coerced {
        values: Vec::with_capacity(column.cells.len()),
        coerced: 0,
        blank: 0,
        failed: 0,
        percent_cells: false,
    };

    for (row, cell) in column.cells.iter().enumerate() {
        coerced.percent_cells |= cell.has_percent_suffix();
        let value = match cell.parse_number() {
            Ok(Some(v)) => {
                coerced.coerced += 1;
                Some(v)
            }
            Ok(None) => {
                coerced.blank += 1;
                None
            }
            Err(e) => {
                trace!("Column '{}', row {}: {}", column.name, row + 1, e);
                coerced.failed += 1;
                None
            }
        };
        coerced.values.push(value);
    }

    coerced
}

/// Cleans a raw table with the default options.
pub fn normalize(raw: &RawTable) -> Result<CleanedTable> {
    TableNormalizer::default().normalize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::RawCell;

    fn table(columns: &[(&str, &[&str])]) -> RawTable {
        RawTable::new(
            columns
                .iter()
                .map(|(name, cells)| {
                    RawColumn::new(*name, cells.iter().map(|c| RawCell::from_text(c)).collect())
                })
                .collect(),
        )
        .unwrap()
    }

    fn with_options(f: impl FnOnce(&mut NormalizerOptions)) -> TableNormalizer {
        let mut options = NormalizerOptions::default();
        f(&mut options);
        TableNormalizer::new(options)
    }

    #[test]
    fn test_currency_and_separators_are_stripped() {
        let raw = table(&[
            ("Line Item", &["Revenue", "COGS"]),
            ("Jan", &["$12,000", "$4,000"]),
            ("Feb", &["$11,500", "(3,900)"]),
        ]);

        let cleaned = normalize(&raw).unwrap();
        assert_eq!(cleaned.labels, vec!["Revenue", "COGS"]);
        assert_eq!(cleaned.value(0, "Jan"), Some(12000.0));
        assert_eq!(cleaned.value(1, "Feb"), Some(-3900.0));
        assert_eq!(cleaned.period_columns().len(), 2);
    }

    #[test]
    fn test_headers_are_trimmed_and_case_preserved() {
        let raw = table(&[("  Account ", &["Revenue"]), (" Jan ", &["1"])]);
        let cleaned = normalize(&raw).unwrap();
        assert_eq!(cleaned.line_item_column, "Account");
        assert!(cleaned.column("Jan").is_some());
    }

    #[test]
    fn test_lowercase_headers() {
        let normalizer = with_options(|o| o.header_case = HeaderCase::Lowercase);
        let raw = table(&[("Jan", &["1", "2"]), ("FEB", &["3", "4"])]);

        let cleaned = normalizer.normalize(&raw).unwrap();
        assert_eq!(cleaned.line_item_column, "line item");
        assert!(cleaned.column("feb").is_some());
    }

    #[test]
    fn test_blank_rows_dropped() {
        let raw = table(&[
            ("Item", &["Revenue", "", "COGS"]),
            ("Jan", &["100", " ", "40"]),
        ]);

        let (cleaned, stats) = TableNormalizer::default().normalize_with_stats(&raw).unwrap();
        assert_eq!(cleaned.labels, vec!["Revenue", "COGS"]);
        assert_eq!(stats.dropped_rows, 1);
        assert_eq!(stats.rows_in, 3);
    }

    #[test]
    fn test_lenient_keeps_partially_numeric_columns() {
        let raw = table(&[
            ("Item", &["Revenue", "COGS", "Opex"]),
            ("Jan", &["100", "n/a", "30"]),
            ("Notes", &["ok", "check", "fine"]),
        ]);

        let (cleaned, stats) = TableNormalizer::default().normalize_with_stats(&raw).unwrap();
        assert_eq!(cleaned.column("Jan").unwrap().values, vec![Some(100.0), None, Some(30.0)]);
        assert!(cleaned.column("Notes").is_none());
        assert_eq!(stats.dropped_columns, vec!["Notes"]);
        assert_eq!(stats.columns[0].failed, 1);
        assert_eq!(stats.columns[0].coerced, 2);
    }

    #[test]
    fn test_strict_drops_columns_with_failures() {
        let normalizer = with_options(|o| o.retention = RetentionPolicy::Strict);
        let raw = table(&[
            ("Item", &["Revenue", "COGS"]),
            ("Jan", &["100", "n/a"]),
            ("Feb", &["110", ""]),
        ]);

        let (cleaned, stats) = normalizer.normalize_with_stats(&raw).unwrap();
        assert!(cleaned.column("Jan").is_none());
        assert_eq!(cleaned.column("Feb").unwrap().values, vec![Some(110.0), None]);
        assert_eq!(stats.dropped_columns, vec!["Jan"]);
    }

    #[test]
    fn test_percent_columns_points_and_fraction() {
        let raw = table(&[
            ("Item", &["Revenue", "COGS"]),
            ("Growth", &["12.5%", "-3.0%"]),
            ("YoY Change", &["4", "2"]),
        ]);

        let points = normalize(&raw).unwrap();
        assert_eq!(points.percent_columns().len(), 2);
        assert_eq!(points.value(0, "Growth"), Some(12.5));
        assert_eq!(points.percent_scale, PercentScale::Points);

        let fraction = with_options(|o| o.percent_scale = PercentScale::Fraction)
            .normalize(&raw)
            .unwrap();
        assert_eq!(fraction.value(0, "Growth"), Some(0.125));
        assert_eq!(fraction.value(1, "YoY Change"), Some(0.02));
        assert_eq!(fraction.percent_scale, PercentScale::Fraction);
    }

    #[test]
    fn test_zero_fill_is_distinct_from_missing() {
        let raw = table(&[("Item", &["Revenue", "COGS"]), ("Jan", &["100", ""])]);

        let missing = normalize(&raw).unwrap();
        assert_eq!(missing.value(1, "Jan"), None);

        let (filled, stats) = with_options(|o| o.missing = MissingPolicy::ZeroFill)
            .normalize_with_stats(&raw)
            .unwrap();
        assert_eq!(filled.value(1, "Jan"), Some(0.0));
        assert_eq!(stats.columns[0].zero_filled, 1);
    }

    #[test]
    fn test_no_numeric_columns() {
        let raw = table(&[
            ("Item", &["Revenue", "COGS"]),
            ("Notes", &["high", "low"]),
        ]);
        assert!(matches!(normalize(&raw), Err(PnlError::NoNumericData)));
    }

    #[test]
    fn test_synthesized_labels() {
        let raw = table(&[("Jan", &["1", "2", "3"]), ("Feb", &["4", "5", "6"])]);
        let (cleaned, stats) = TableNormalizer::default().normalize_with_stats(&raw).unwrap();

        assert_eq!(cleaned.line_item_column, "Line Item");
        assert_eq!(cleaned.labels, vec!["Row 1", "Row 2", "Row 3"]);
        assert_eq!(stats.line_item_source, LineItemSource::Synthesized);
        assert_eq!(cleaned.columns.len(), 2);
    }

    #[test]
    fn test_unlabelled_rows_without_values_dropped() {
        let raw = table(&[
            ("Item", &["Revenue", "", "COGS"]),
            ("Jan", &["100", "oops", "40"]),
        ]);

        let (cleaned, stats) = TableNormalizer::default().normalize_with_stats(&raw).unwrap();
        assert_eq!(cleaned.labels, vec!["Revenue", "COGS"]);
        assert_eq!(cleaned.column("Jan").unwrap().values, vec![Some(100.0), Some(40.0)]);
        assert_eq!(stats.dropped_rows, 1);
    }

    #[test]
    fn test_raw_table_untouched() {
        let raw = table(&[("Item", &["Revenue", ""]), ("Jan", &["$1", ""])]);
        let before = raw.clone();
        normalize(&raw).unwrap();
        assert_eq!(raw, before);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let raw = table(&[
            ("Notes", &["a", "b", "c"]),
            ("Description", &["Revenue", "COGS", "Opex"]),
            ("Jan", &["$1,000", "oops", ""]),
            ("Feb", &["1,100", "410", "95"]),
            ("% Change", &["10%", "", "-5%"]),
        ]);

        let once = normalize(&raw).unwrap();
        let twice = normalize(&once.to_raw()).unwrap();
        assert_eq!(once, twice);
    }
}
