//! Duration parser for the poll period.
//!
//! Supports:
//! - Plain seconds: `10`
//! - Unit suffix: `500ms`, `1s`, `2m`, `1h`
//! - Compound: `1m30s`

use std::time::Duration;

/// Error type for duration parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct DurationParseError {
    pub input: String,
    pub message: String,
}

impl std::fmt::Display for DurationParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Failed to parse duration '{}': {}",
            self.input, self.message
        )
    }
}

impl std::error::Error for DurationParseError {}

/// Parses a duration string.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use wmibeat::util::parse_duration;
///
/// assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
/// assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let input = input.trim();
    let error = |message: &str| DurationParseError {
        input: input.to_string(),
        message: message.to_string(),
    };

    if input.is_empty() {
        return Err(error("empty duration"));
    }

    // Plain number of seconds
    if input.chars().all(|c| c.is_ascii_digit()) {
        return input
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| error(&e.to_string()));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return Err(error("expected a number"));
        }
        let number: u64 = rest[..digits].parse().map_err(|_| error("number too large"))?;
        rest = &rest[digits..];

        let unit_len = rest.chars().take_while(|c| c.is_ascii_alphabetic()).count();
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "ms" => Duration::from_millis(number),
            "s" => Duration::from_secs(number),
            "m" => Duration::from_secs(number.saturating_mul(60)),
            "h" => Duration::from_secs(number.saturating_mul(3600)),
            "" => return Err(error("missing unit")),
            _ => return Err(error("unknown unit, use ms, s, m or h")),
        };
        total = total.saturating_add(part);
    }

    Ok(total)
}
