use crate::error::{PnlError, Result};
use crate::table::{RawCell, RawTable};
use csv::{ReaderBuilder, Trim};
use log::debug;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Reads a CSV statement. The first record is the header row.
pub fn read_csv<R: Read>(reader: R) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(record.iter().map(RawCell::from_text).collect());
    }

    debug!(
        "Read CSV with {} columns and {} rows",
        headers.len(),
        rows.len()
    );
    RawTable::from_rows(headers, rows)
}

pub fn read_csv_path(path: impl AsRef<Path>) -> Result<RawTable> {
    let file = File::open(path.as_ref())?;
    read_csv(file)
}

/// Returns the longest `[...]` span of `text`, or the trimmed text when there is none.
///
/// Extraction services tend to wrap the JSON they were asked for in prose or
/// code fences.
pub fn extract_json_array(text: &str) -> &str {
    match (text.find('['), text.rfind(']')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text.trim(),
    }
}

/// Parses the text returned by a table-extraction service into a raw table.
pub fn table_from_extraction_text(text: &str) -> Result<RawTable> {
    let json = extract_json_array(text);
    let table = RawTable::from_json_rows(json).map_err(|e| {
        PnlError::ExtractionFailed(format!("Could not parse extracted table: {}", e))
    })?;

    if table.is_empty() {
        return Err(PnlError::ExtractionFailed(
            "No table rows were extracted".to_string(),
        ));
    }

    Ok(table)
}
