//! Duration strings in the compact `1d 2h 30m 5s` form
//!
//! Components are optional but the order is fixed (days, hours, minutes,
//! seconds), suffixes are case-insensitive, and whitespace between tokens
//! is tolerated. Trailing garbage fails the whole parse rather than being
//! ignored.

use std::time::Duration;
use thiserror::Error;

/// Parse failures for duration strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimespecError {
    #[error("empty duration string")]
    Empty,

    #[error("unexpected input at '{0}'")]
    Unexpected(String),

    #[error("duration component out of order at '{0}'")]
    OutOfOrder(String),

    #[error("duration value too large")]
    Overflow,
}

/// Unit suffixes in the only order the grammar admits.
const UNITS: [(char, u64); 4] = [('d', 86_400), ('h', 3_600), ('m', 60), ('s', 1)];

/// Parse a string like `"1h 30m 10s"` into a duration.
///
/// Missing components default to zero; `"0s"` parses successfully and it is
/// the caller's job to reject zero where a usable duration is required.
pub fn parse_timespec(input: &str) -> Result<Duration, TimespecError> {
    let mut rest = input.trim();
    if rest.is_empty() {
        return Err(TimespecError::Empty);
    }

    let mut total: u64 = 0;
    // Index of the next unit slot still allowed; enforces both ordering
    // and at-most-once per component.
    let mut next_unit = 0usize;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(TimespecError::Unexpected(rest.to_string()));
        }
        let (digits, tail) = rest.split_at(digits_end);
        let value: u64 = digits.parse().map_err(|_| TimespecError::Overflow)?;

        // Whitespace between a number and its suffix is allowed ("1 h").
        let tail = tail.trim_start();
        let mut tail_chars = tail.chars();
        let unit_char = match tail_chars.next() {
            Some(c) => c.to_ascii_lowercase(),
            None => return Err(TimespecError::Unexpected(digits.to_string())),
        };

        let slot = UNITS
            .iter()
            .position(|(c, _)| *c == unit_char)
            .ok_or_else(|| TimespecError::Unexpected(tail.to_string()))?;
        if slot < next_unit {
            return Err(TimespecError::OutOfOrder(tail.to_string()));
        }
        next_unit = slot + 1;

        let seconds = value
            .checked_mul(UNITS[slot].1)
            .ok_or(TimespecError::Overflow)?;
        total = total.checked_add(seconds).ok_or(TimespecError::Overflow)?;

        rest = tail_chars.as_str().trim_start();
    }

    Ok(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(input: &str) -> u64 {
        parse_timespec(input).unwrap().as_secs()
    }

    #[test]
    fn parses_full_and_partial_component_sets() {
        assert_eq!(secs("1d 2h 30m 5s"), 86_400 + 7_200 + 1_800 + 5);
        assert_eq!(secs("1h 30m 10s"), 5_410);
        assert_eq!(secs("5s"), 5);
        assert_eq!(secs("2d"), 172_800);
        assert_eq!(secs("30m"), 1_800);
        assert_eq!(secs("1d 5s"), 86_405);
    }

    #[test]
    fn suffixes_are_case_insensitive() {
        assert_eq!(secs("1H 30M 10S"), 5_410);
        assert_eq!(secs("2D"), 172_800);
    }

    #[test]
    fn whitespace_between_tokens_is_tolerated() {
        assert_eq!(secs("  1h   30m 10s  "), 5_410);
        assert_eq!(secs("1h30m10s"), 5_410);
        assert_eq!(secs("1 h"), 3_600);
    }

    #[test]
    fn zero_parses_but_stays_zero() {
        assert_eq!(secs("0s"), 0);
        assert_eq!(secs("0h 0m 0s"), 0);
    }

    #[test]
    fn empty_input_fails() {
        assert_eq!(parse_timespec(""), Err(TimespecError::Empty));
        assert_eq!(parse_timespec("   "), Err(TimespecError::Empty));
    }

    #[test]
    fn out_of_order_components_fail() {
        assert!(matches!(
            parse_timespec("30m 1h"),
            Err(TimespecError::OutOfOrder(_))
        ));
        assert!(matches!(
            parse_timespec("5s 2d"),
            Err(TimespecError::OutOfOrder(_))
        ));
    }

    #[test]
    fn duplicate_components_fail() {
        assert!(matches!(
            parse_timespec("1h 2h"),
            Err(TimespecError::OutOfOrder(_))
        ));
    }

    #[test]
    fn garbage_fails_instead_of_being_ignored() {
        assert!(matches!(
            parse_timespec("10x"),
            Err(TimespecError::Unexpected(_))
        ));
        assert!(matches!(
            parse_timespec("1h banana"),
            Err(TimespecError::Unexpected(_))
        ));
        assert!(matches!(
            parse_timespec("10"),
            Err(TimespecError::Unexpected(_))
        ));
        assert!(matches!(
            parse_timespec("h"),
            Err(TimespecError::Unexpected(_))
        ));
    }

    #[test]
    fn overflow_is_a_parse_error() {
        assert_eq!(
            parse_timespec("99999999999999999999s"),
            Err(TimespecError::Overflow)
        );
        assert_eq!(
            parse_timespec("999999999999999999d"),
            Err(TimespecError::Overflow)
        );
    }
}
