use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Result, ZonalError};

/// Half-open date interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Parse two `YYYY-MM-DD` dates. `start == end` is a valid, empty range.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start_date = parse_date(start)?;
        let end_date = parse_date(end)?;
        if start_date > end_date {
            return Err(ZonalError::InvalidDateRange(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(DateRange {
            start: start_date,
            end: end_date,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn start_str(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        ZonalError::InvalidDateRange(format!("expected YYYY-MM-DD, got {value:?}: {e}"))
    })
}

/// Record key for a category code: integral codes print without a fraction (`1`, not `1.0`)
pub fn format_category_key(code: f64) -> String {
    if code.fract() == 0.0 && code.abs() < 1e15 {
        format!("{}", code as i64)
    } else {
        format!("{}", code)
    }
}

/// Milliseconds since the Unix epoch, as stored in `system:time_start`
pub fn millis_to_datetime(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_range_parse() {
        let range = DateRange::parse("2020-01-01", "2021-01-01").unwrap();
        assert_eq!(range.start_str(), "2020-01-01");
        assert_eq!(range.end_str(), "2021-01-01");
        assert!(!range.is_empty());
    }

    #[test]
    fn test_date_range_equal_bounds_is_empty() {
        let range = DateRange::parse("2020-06-01", "2020-06-01").unwrap();
        assert!(range.is_empty());
    }

    #[test]
    fn test_date_range_reversed() {
        assert!(matches!(
            DateRange::parse("2021-01-01", "2020-01-01"),
            Err(ZonalError::InvalidDateRange(_))
        ));
    }

    #[test]
    fn test_date_range_bad_format() {
        assert!(DateRange::parse("01/02/2020", "2021-01-01").is_err());
        assert!(DateRange::parse("2020-02-30", "2021-01-01").is_err());
    }

    #[test]
    fn test_format_category_key() {
        assert_eq!(format_category_key(1.0), "1");
        assert_eq!(format_category_key(-3.0), "-3");
        assert_eq!(format_category_key(2.5), "2.5");
    }

    #[test]
    fn test_millis_to_datetime() {
        let dt = millis_to_datetime(978307200000.0).unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2001-01-01");
        assert!(millis_to_datetime(f64::NAN).is_none());
    }
}
