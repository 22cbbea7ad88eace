use crate::error::{PnlError, Result};
use thiserror::Error;

/// Why a single cell could not be coerced to a number.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CellParseError {
    #[error("'{0}' is not a number")]
    NotANumber(String),

    #[error("'{0}' is not a finite number")]
    NonFinite(String),
}

/// Parses the textual form of a cell, ignoring `$`, `,`, `%` and whitespace.
///
/// Accounting-style parentheses denote a negative amount: `"(1,200)"` is `-1200`.
/// Blank text is `Ok(None)`; anything else that does not yield a finite number
/// is an error.
pub fn parse_numeric_text(text: &str) -> std::result::Result<Option<f64>, CellParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let (negative, body) = match trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%') && !c.is_whitespace())
        .collect();

    let value: f64 = cleaned
        .parse()
        .map_err(|_| CellParseError::NotANumber(trimmed.to_string()))?;

    if !value.is_finite() {
        return Err(CellParseError::NonFinite(trimmed.to_string()));
    }

    Ok(Some(if negative { -value } else { value }))
}

pub fn has_percent_suffix(text: &str) -> bool {
    text.trim_end().ends_with('%')
}

/// A header names a change/percent column when it contains `%` or the word "change".
pub fn is_change_header(name: &str) -> bool {
    name.contains('%')
        || name
            .split(|c: char| !c.is_alphanumeric())
            .any(|token| token.eq_ignore_ascii_case("change"))
}

/// Formats an amount as dollars with thousands separators: `-$1,234.50`.
pub fn format_currency(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let digits: Vec<char> = whole.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*digit);
    }

    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}${}.{}", sign, grouped, cents)
}

/// Formats percentage points with an explicit sign: `+12.50%`.
pub fn format_signed_percent(points: f64) -> String {
    format!("{:+.2}%", points)
}

/// Formats percentage points without a forced sign: `12.50%`.
pub fn format_percent(points: f64) -> String {
    format!("{:.2}%", points)
}

/// Population mean and standard deviation.
///
/// Values are divided by the largest magnitude before squaring so that rows of
/// very large figures do not overflow.
pub fn mean_std(vals: &[f64]) -> (f64, f64) {
    if vals.is_empty() {
        return (0.0, 0.0);
    }
    let scale = vals.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return (0.0, 0.0);
    }

    let n = vals.len() as f64;
    let mean = vals.iter().map(|v| v / scale).sum::<f64>() / n;
    let sq_diff: f64 = vals.iter().map(|v| (v / scale - mean).powi(2)).sum();
    (mean * scale, (sq_diff / n).sqrt() * scale)
}

pub fn validate_threshold(threshold: f64) -> Result<()> {
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(PnlError::InvalidThreshold(threshold));
    }
    Ok(())
}
