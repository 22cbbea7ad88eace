//! Raw and cleaned table representations.
//!
//! A [`RawTable`] is whatever a CSV reader or an extraction service handed us:
//! named columns of untyped cells. A [`CleanedTable`] is the normalizer's output:
//! one column of line-item labels plus numeric columns whose cells are either a
//! finite `f64` or missing.

use crate::error::{PnlError, Result};
use crate::schema::PercentScale;
use crate::utils::{parse_numeric_text, CellParseError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCell {
    Empty,
    Number(f64),
    Text(String),
}

impl RawCell {
    /// Builds a cell from CSV/text input; whitespace-only text is empty.
    pub fn from_text(text: &str) -> Self {
        if text.trim().is_empty() {
            Self::Empty
        } else {
            Self::Text(text.to_string())
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Number(_) => false,
            Self::Text(text) => text.trim().is_empty(),
        }
    }

    /// Coerces the cell to a number. Blank cells are `Ok(None)`.
    pub fn parse_number(&self) -> std::result::Result<Option<f64>, CellParseError> {
        match self {
            Self::Empty => Ok(None),
            Self::Number(value) if value.is_finite() => Ok(Some(*value)),
            Self::Number(value) => Err(CellParseError::NonFinite(value.to_string())),
            Self::Text(text) => parse_numeric_text(text),
        }
    }

    pub fn has_percent_suffix(&self) -> bool {
        matches!(self, Self::Text(text) if crate::utils::has_percent_suffix(text))
    }

    /// Human-readable label for line-item use.
    pub fn label(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Number(value) => value.to_string(),
            Self::Text(text) => text.trim().to_string(),
        }
    }
}

impl From<&Value> for RawCell {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::Number(n) => n.as_f64().map_or(Self::Empty, Self::Number),
            Value::String(s) => Self::from_text(s),
            Value::Bool(b) => Self::Text(b.to_string()),
            other => Self::Text(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawColumn {
    pub name: String,
    pub cells: Vec<RawCell>,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, cells: Vec<RawCell>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }
}

/// Column-major table of untyped cells. Every column has the same length.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawTableData")]
pub struct RawTable {
    columns: Vec<RawColumn>,
}

#[derive(Deserialize)]
struct RawTableData {
    columns: Vec<RawColumn>,
}

impl TryFrom<RawTableData> for RawTable {
    type Error = PnlError;

    fn try_from(data: RawTableData) -> Result<Self> {
        Self::new(data.columns)
    }
}

impl RawTable {
    pub fn new(columns: Vec<RawColumn>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let expected = first.cells.len();
            if let Some(bad) = columns.iter().find(|c| c.cells.len() != expected) {
                return Err(PnlError::MalformedTable(format!(
                    "Column '{}' has {} cells but '{}' has {}",
                    bad.name,
                    bad.cells.len(),
                    first.name,
                    expected
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Builds a table from a header row and data rows.
    ///
    /// Short rows are padded with empty cells. Surplus cells are tolerated only
    /// when they are blank (e.g. trailing delimiters).
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<RawCell>>) -> Result<Self> {
        let width = headers.len();
        let mut columns: Vec<RawColumn> = headers
            .into_iter()
            .map(|name| RawColumn::new(name, Vec::with_capacity(rows.len())))
            .collect();

        for (row_idx, mut row) in rows.into_iter().enumerate() {
            if row.len() > width {
                if row[width..].iter().any(|cell| !cell.is_blank()) {
                    return Err(PnlError::MalformedTable(format!(
                        "Row {} has {} values but the header has {} columns",
                        row_idx + 1,
                        row.len(),
                        width
                    )));
                }
                row.truncate(width);
            }
            row.resize(width, RawCell::Empty);

            for (column, cell) in columns.iter_mut().zip(row) {
                column.cells.push(cell);
            }
        }

        Ok(Self { columns })
    }

    /// Parses a JSON array of row objects.
    pub fn from_json_rows(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json_value(&value)
    }

    /// Converts a JSON array of row objects into a table.
    ///
    /// Column order follows the first appearance of each key; keys missing from
    /// a row yield empty cells.
    pub fn from_json_value(value: &Value) -> Result<Self> {
        let rows = value.as_array().ok_or_else(|| {
            PnlError::MalformedTable("Expected a JSON array of row objects".to_string())
        })?;

        let mut headers: Vec<String> = Vec::new();
        for (idx, row) in rows.iter().enumerate() {
            let object = row.as_object().ok_or_else(|| {
                PnlError::MalformedTable(format!("Row {} is not a JSON object", idx + 1))
            })?;
            for key in object.keys() {
                if !headers.iter().any(|h| h == key) {
                    headers.push(key.clone());
                }
            }
        }

        let columns = headers
            .into_iter()
            .map(|name| {
                let cells = rows
                    .iter()
                    .map(|row| row.get(&name).map_or(RawCell::Empty, RawCell::from))
                    .collect();
                RawColumn::new(name, cells)
            })
            .collect();

        Ok(Self { columns })
    }

    /// Stacks tables vertically, e.g. one table per extracted PDF page.
    ///
    /// The result has the union of all column names in first-seen order.
    pub fn concat(tables: &[RawTable]) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for table in tables {
            for column in &table.columns {
                if !headers.contains(&column.name) {
                    headers.push(column.name.clone());
                }
            }
        }

        let columns = headers
            .into_iter()
            .map(|name| {
                let mut cells = Vec::new();
                for table in tables {
                    match table.column(&name) {
                        Some(column) => cells.extend(column.cells.iter().cloned()),
                        None => cells.extend(
                            std::iter::repeat(RawCell::Empty).take(table.row_count()),
                        ),
                    }
                }
                RawColumn::new(name, cells)
            })
            .collect();

        Self { columns }
    }

    pub fn columns(&self) -> &[RawColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Exact-name lookup of the first column called `name`.
    pub fn column(&self, name: &str) -> Option<&RawColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.cells.len())
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn is_blank_row(&self, row: usize) -> bool {
        self.columns
            .iter()
            .all(|c| c.cells.get(row).map_or(true, RawCell::is_blank))
    }

    /// A copy of the table without rows that are blank in every column.
    pub fn without_blank_rows(&self) -> Self {
        let keep: Vec<usize> = (0..self.row_count())
            .filter(|&row| !self.is_blank_row(row))
            .collect();

        let columns = self
            .columns
            .iter()
            .map(|column| {
                RawColumn::new(
                    column.name.clone(),
                    keep.iter()
                        .map(|&row| column.cells.get(row).cloned().unwrap_or(RawCell::Empty))
                        .collect(),
                )
            })
            .collect();

        Self { columns }
    }

    /// A copy of the table with every header passed through `rename`.
    pub fn map_headers(&self, rename: impl Fn(&str) -> String) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|column| RawColumn::new(rename(&column.name), column.cells.clone()))
            .collect();
        Self { columns }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// A value at one point in time (a month, quarter, year).
    Period,
    /// A relative change, stored on the table's [`PercentScale`].
    Percent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub name: String,
    pub kind: ColumnKind,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CleanedTableData")]
pub struct CleanedTable {
    pub line_item_column: String,
    pub labels: Vec<String>,
    pub columns: Vec<NumericColumn>,
    pub percent_scale: PercentScale,
}

#[derive(Deserialize)]
struct CleanedTableData {
    line_item_column: String,
    labels: Vec<String>,
    columns: Vec<NumericColumn>,
    percent_scale: PercentScale,
}

impl TryFrom<CleanedTableData> for CleanedTable {
    type Error = PnlError;

    fn try_from(data: CleanedTableData) -> Result<Self> {
        let table = Self {
            line_item_column: data.line_item_column,
            labels: data.labels,
            columns: data.columns,
            percent_scale: data.percent_scale,
        };
        table.validate()?;
        Ok(table)
    }
}

impl CleanedTable {
    /// Checks that every numeric column has one value per label.
    ///
    /// The fields are public, so a table built by hand can be ragged.
    pub fn validate(&self) -> Result<()> {
        match self
            .columns
            .iter()
            .find(|c| c.values.len() != self.labels.len())
        {
            Some(bad) => Err(PnlError::MalformedTable(format!(
                "Column '{}' has {} values but there are {} line items",
                bad.name,
                bad.values.len(),
                self.labels.len()
            ))),
            None => Ok(()),
        }
    }

    pub fn row_count(&self) -> usize {
        self.labels.len()
    }

    pub fn column(&self, name: &str) -> Option<&NumericColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        self.column(column)
            .and_then(|c| c.values.get(row).copied().flatten())
    }

    /// Row index of the first line item with this label.
    pub fn row_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn period_columns(&self) -> Vec<&NumericColumn> {
        self.columns_of_kind(ColumnKind::Period)
    }

    pub fn percent_columns(&self) -> Vec<&NumericColumn> {
        self.columns_of_kind(ColumnKind::Percent)
    }

    fn columns_of_kind(&self, kind: ColumnKind) -> Vec<&NumericColumn> {
        self.columns.iter().filter(|c| c.kind == kind).collect()
    }

    /// Converts back to a raw table, line-item column first.
    ///
    /// Percent columns are rendered as `"<points>%"` text so that re-cleaning
    /// classifies them the same way.
    pub fn to_raw(&self) -> RawTable {
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push(RawColumn::new(
            self.line_item_column.clone(),
            self.labels.iter().map(|l| RawCell::from_text(l)).collect(),
        ));

        for column in &self.columns {
            let cells = (0..self.labels.len())
                .map(|row| match (column.values.get(row).copied().flatten(), column.kind) {
                    (None, _) => RawCell::Empty,
                    (Some(v), ColumnKind::Period) => RawCell::Number(v),
                    (Some(v), ColumnKind::Percent) => {
                        RawCell::Text(format!("{}%", self.percent_scale.to_points(v)))
                    }
                })
                .collect();
            columns.push(RawColumn::new(column.name.clone(), cells));
        }

        RawTable { columns }
    }
}
