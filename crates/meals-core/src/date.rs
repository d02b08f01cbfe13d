//! Strict parsing of the `YYYY-MM-DD` date parameter.

use chrono::NaiveDate;

use crate::error::WorkflowError;

/// Parse a date parameter in exactly `YYYY-MM-DD` form.
///
/// chrono alone accepts unpadded fields (`2025-3-7`), so the shape is
/// checked byte by byte first.
pub fn parse_date_param(raw: &str) -> Result<NaiveDate, WorkflowError> {
    let invalid = || WorkflowError::InvalidDateFormat(raw.to_owned());

    let bytes = raw.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !well_formed {
        return Err(invalid());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())
}

/// Format a date the way it travels in URLs and forms.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
