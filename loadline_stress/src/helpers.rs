use std::ops::RangeInclusive;

use chrono::{DateTime, NaiveDate, Utc};
use snafu::{ResultExt, Snafu};

#[derive(Debug, Clone, Snafu)]
pub enum RangeParserError {
    #[snafu(display("Empty range string"))]
    Empty,
    #[snafu(display("Invalid range"))]
    Invalid,
    #[snafu(display("Failed to parse range"))]
    Parse { source: std::num::ParseIntError },
}

#[derive(Debug, Clone, Snafu)]
#[snafu(display("Expected a date (YYYY-MM-DD) or an RFC 3339 timestamp, got {value:?}"))]
pub struct TimeParserError {
    value: String,
}

/// Parse a row count (`1000`) or an inclusive range of row counts (`1000-2000`).
pub fn parse_range(range_str: &str) -> Result<RangeInclusive<usize>, RangeParserError> {
    let range_str = range_str.trim();

    if range_str.is_empty() {
        return Err(RangeParserError::Empty);
    }

    match range_str.split('-').collect::<Vec<_>>().as_slice() {
        [value] => {
            let value = value.trim().parse::<usize>().context(ParseSnafu {})?;

            if value == 0 {
                return Err(RangeParserError::Invalid);
            }

            Ok(value..=value)
        }
        [start, end] => {
            let start = start.trim().parse::<usize>().context(ParseSnafu {})?;
            let end = end.trim().parse::<usize>().context(ParseSnafu {})?;

            if start > end || start == 0 {
                return Err(RangeParserError::Invalid);
            }

            Ok(start..=end)
        }
        _ => Err(RangeParserError::Invalid),
    }
}

/// Parse the start of the generated time range.
///
/// A plain date is taken as midnight UTC.
pub fn parse_start_time(value: &str) -> Result<DateTime<Utc>, TimeParserError> {
    let value = value.trim();

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| TimeParserError {
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_value() {
        assert_eq!(parse_range("500").unwrap(), 500..=500);
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range(" 1000 - 5000 ").unwrap(), 1000..=5000);
    }

    #[test]
    fn test_parse_invalid_range() {
        assert!(matches!(parse_range(""), Err(RangeParserError::Empty)));
        assert!(matches!(
            parse_range("5000-1000"),
            Err(RangeParserError::Invalid)
        ));
        assert!(parse_range("1-2-3").is_err());
        assert!(parse_range("rows").is_err());
    }

    #[test]
    fn test_parse_start_time() {
        let expected = DateTime::from_timestamp_millis(1633046400000).unwrap();
        assert_eq!(parse_start_time("2021-10-01").unwrap(), expected);
        assert_eq!(parse_start_time("2021-10-01T00:00:00Z").unwrap(), expected);
        assert_eq!(
            parse_start_time("2021-10-01T02:00:00+02:00").unwrap(),
            expected
        );
        assert!(parse_start_time("yesterday").is_err());
    }
}
