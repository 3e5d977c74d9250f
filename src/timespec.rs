//! Human time expression parsing for the idle threshold.
//!
//! Grammar: decimal digits with an optional single unit suffix (`s`, `m`,
//! `h`). A bare number is milliseconds.

use std::time::Duration;

use thiserror::Error;

/// Errors from parsing a time expression.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TimeSpecError {
    #[error("invalid time: '{0}'")]
    InvalidTime(String),
}

/// Upper bound on the threshold in milliseconds (exclusive).
///
/// The X server reports idle time as a 32-bit millisecond counter, so a
/// threshold at or above `i32::MAX` could never fire.
const MAX_MILLIS: i64 = i32::MAX as i64;

/// Parse a time expression into a millisecond duration.
///
/// `"5s"` is five seconds, `"2m"` two minutes, `"1h"` one hour, and a bare
/// `"1500"` is 1500 milliseconds. Anything else is rejected, including an
/// unrecognized suffix and results outside `0..i32::MAX` milliseconds.
#[allow(clippy::cast_sign_loss)]
pub fn parse_timespec(input: &str) -> Result<Duration, TimeSpecError> {
    let invalid = || TimeSpecError::InvalidTime(input.to_string());

    let digits_end = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    if digits_end == 0 {
        return Err(invalid());
    }

    let value: i64 = input[..digits_end].parse().map_err(|_| invalid())?;

    let multiplier: i64 = match &input[digits_end..] {
        "" => 1,
        "s" => 1000,
        "m" => 60 * 1000,
        "h" => 60 * 60 * 1000,
        _ => return Err(invalid()),
    };

    let millis = value.checked_mul(multiplier).ok_or_else(invalid)?;
    if !(0..MAX_MILLIS).contains(&millis) {
        return Err(invalid());
    }

    Ok(Duration::from_millis(millis as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(input: &str) -> u128 {
        parse_timespec(input).unwrap().as_millis()
    }

    #[test]
    fn test_bare_number_is_milliseconds() {
        assert_eq!(millis("1500"), 1500);
        assert_eq!(millis("0"), 0);
    }

    #[test]
    fn test_unit_suffixes() {
        assert_eq!(millis("5s"), 5_000);
        assert_eq!(millis("2m"), 120_000);
        assert_eq!(millis("1h"), 3_600_000);
    }

    #[test]
    fn test_empty_input_rejected() {
        assert_eq!(
            parse_timespec(""),
            Err(TimeSpecError::InvalidTime(String::new()))
        );
    }

    #[test]
    fn test_no_digits_rejected() {
        assert!(parse_timespec("s").is_err());
        assert!(parse_timespec("abc").is_err());
    }

    #[test]
    fn test_negative_rejected() {
        // The grammar has no sign, so a leading '-' means no digits consumed.
        assert!(parse_timespec("-5").is_err());
        assert!(parse_timespec("-5s").is_err());
    }

    #[test]
    fn test_unknown_suffix_rejected() {
        assert!(parse_timespec("5x").is_err());
        assert!(parse_timespec("5ss").is_err());
        assert!(parse_timespec("5 s").is_err());
        assert!(parse_timespec("5s ").is_err());
    }

    #[test]
    fn test_range_limits() {
        assert!(parse_timespec(&i32::MAX.to_string()).is_err());
        assert_eq!(millis(&(i32::MAX as i64 - 1).to_string()), i32::MAX as u128 - 1);

        // Scaled overflow past i32::MAX.
        assert!(parse_timespec("2147484s").is_err());
        assert!(parse_timespec("35792m").is_err());
        assert!(parse_timespec("597h").is_err());
        assert_eq!(millis("596h"), 596 * 3_600_000);

        // Overflow of the raw integer itself.
        assert!(parse_timespec("99999999999999999999").is_err());
    }
}
