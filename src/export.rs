//! Human-facing renderings of cleaned tables and anomalies.
//!
//! Figures are written with their decoration restored (`$12,000.00`,
//! `12.50%`). Missing values are written as empty fields.

use crate::detector::Anomaly;
use crate::error::Result;
use crate::table::{CleanedTable, ColumnKind};
use crate::utils::{format_currency, format_percent};
use csv::Writer;
use std::io::Write;

pub const NO_ANOMALIES_MESSAGE: &str = "No significant irregularities found.";

const ANOMALY_HEADERS: [&str; 6] = [
    "Line Item",
    "Metric",
    "Change",
    "Direction",
    "Previous",
    "Current",
];

pub fn format_cell(table: &CleanedTable, kind: ColumnKind, value: Option<f64>) -> String {
    match (value, kind) {
        (None, _) => String::new(),
        (Some(v), ColumnKind::Period) => format_currency(v),
        (Some(v), ColumnKind::Percent) => format_percent(table.percent_scale.to_points(v)),
    }
}

pub fn write_cleaned_csv<W: Write>(table: &CleanedTable, writer: W) -> Result<()> {
    table.validate()?;
    let mut wtr = Writer::from_writer(writer);

    let mut header = vec![table.line_item_column.as_str()];
    header.extend(table.columns.iter().map(|c| c.name.as_str()));
    wtr.write_record(&header)?;

    for (row, label) in table.labels.iter().enumerate() {
        let mut record = vec![label.clone()];
        record.extend(
            table
                .columns
                .iter()
                .map(|c| format_cell(table, c.kind, c.values[row])),
        );
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_anomalies_csv<W: Write>(anomalies: &[Anomaly], writer: W) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(ANOMALY_HEADERS)?;

    for anomaly in anomalies {
        wtr.write_record(anomaly_fields(anomaly))?;
    }

    wtr.flush()?;
    Ok(())
}

/// Renders anomalies as an aligned plain-text table.
pub fn render_anomaly_table(anomalies: &[Anomaly]) -> String {
    if anomalies.is_empty() {
        return NO_ANOMALIES_MESSAGE.to_string();
    }

    let rows: Vec<[String; 6]> = anomalies.iter().map(anomaly_fields).collect();
    let mut widths = ANOMALY_HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, field) in widths.iter_mut().zip(row) {
            *width = (*width).max(field.chars().count());
        }
    }

    let mut out = String::new();
    let header = ANOMALY_HEADERS.map(|h| h.to_string());
    push_line(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, &rule, &widths);
    for row in &rows {
        push_line(&mut out, row, &widths);
    }
    out
}

fn push_line(out: &mut String, fields: &[String], widths: &[usize]) {
    let line: Vec<String> = fields
        .iter()
        .zip(widths)
        .map(|(field, width)| format!("{:<width$}", field, width = *width))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

fn anomaly_fields(anomaly: &Anomaly) -> [String; 6] {
    [
        anomaly.line_item.clone(),
        anomaly.metric.clone(),
        anomaly.formatted_change.clone(),
        anomaly
            .direction
            .map(|d| d.to_string())
            .unwrap_or_default(),
        anomaly.previous.map(format_currency).unwrap_or_default(),
        anomaly.current.map(format_currency).unwrap_or_default(),
    ]
}
