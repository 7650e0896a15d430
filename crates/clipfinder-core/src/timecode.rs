//! Conversions between whole seconds and `HH:MM:SS` text

use crate::error::{FinderError, Result};

/// Render seconds as `HH:MM:SS`. Hours are not wrapped at 24.
pub fn seconds_to_text(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Parse `H:M:S`, `M:S` or `S` into seconds.
///
/// Minute and second fields may exceed 59; the excess is carried.
pub fn text_to_seconds(text: &str) -> Result<u64> {
    let fields: Vec<&str> = text.trim().split(':').collect();
    if fields.len() > 3 {
        return Err(FinderError::timestamp(text, "expected at most three fields"));
    }

    let mut total: u64 = 0;
    for field in &fields {
        let field = field.trim();
        if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FinderError::timestamp(text, "fields must be non-empty digits"));
        }
        let value: u64 = field
            .parse()
            .map_err(|e| FinderError::timestamp(text, format!("{}", e)))?;
        total = total
            .checked_mul(60)
            .and_then(|t| t.checked_add(value))
            .ok_or_else(|| FinderError::timestamp(text, "value out of range"))?;
    }

    Ok(total)
}

/// Lenient timestamp parsing.
///
/// Every non-digit character is dropped and the remaining digits are read from
/// the right in pairs: seconds, minutes, then everything left over is hours.
/// `"1:40"` is 100 seconds, `"7090"` is 70 minutes 90 seconds.
pub fn parse_timestamp(text: &str) -> Result<u64> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    let n = digits.len();
    if n == 0 {
        return Err(FinderError::timestamp(text, "no digits"));
    }

    let field = |range: std::ops::Range<usize>| -> Result<u64> {
        digits[range]
            .parse::<u64>()
            .map_err(|e| FinderError::timestamp(text, format!("{}", e)))
    };

    let split_ss = n.saturating_sub(2);
    let split_mm = n.saturating_sub(4);

    let seconds = field(split_ss..n)?;
    let minutes = if split_ss > 0 { field(split_mm..split_ss)? } else { 0 };
    let hours = if split_mm > 0 { field(0..split_mm)? } else { 0 };

    hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes * 60))
        .and_then(|t| t.checked_add(seconds))
        .ok_or_else(|| FinderError::timestamp(text, "value out of range"))
}

/// Lenient parse rendered back as `HH:MM:SS`
pub fn normalize_timestamp(text: &str) -> Result<String> {
    parse_timestamp(text).map(seconds_to_text)
}
