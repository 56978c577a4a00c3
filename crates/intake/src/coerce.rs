//! Value coercion: numbers and timestamps from loosely typed cells.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use thiserror::Error;

use crate::row::RawValue;

/// How rows are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntakeOptions {
    /// Processing time; date-only cells take its time of day.
    pub processed_at: DateTime<Utc>,
    /// Offset of timestamps written without one.
    pub offset: FixedOffset,
    /// Reject rows that carry no date at all.
    pub require_date: bool,
}

impl IntakeOptions {
    pub fn new(processed_at: DateTime<Utc>) -> Self {
        Self {
            processed_at,
            offset: Utc.fix(),
            require_date: false,
        }
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn require_date(mut self, required: bool) -> Self {
        self.require_date = required;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoerceError {
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("'{0}' is not a whole number")]
    Fractional(String),
    #[error("'{0}' is out of range")]
    OutOfRange(String),
}

/// Coerce a cell to an integer.
///
/// Accepts integers, floats without a fractional part (`4.0`), and numeric
/// strings of either form (`" 4 "`, `"6.0000"`).
pub fn integer(value: &RawValue) -> Result<i64, CoerceError> {
    match value {
        RawValue::Int(i) => Ok(*i),
        RawValue::Float(f) => float_to_integer(*f, &f.to_string()),
        RawValue::Text(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(i);
            }
            let f = trimmed
                .parse::<f64>()
                .map_err(|_| CoerceError::NotANumber(trimmed.to_string()))?;
            float_to_integer(f, trimmed)
        }
    }
}

fn float_to_integer(f: f64, shown: &str) -> Result<i64, CoerceError> {
    if !f.is_finite() {
        return Err(CoerceError::NotANumber(shown.to_string()));
    }
    if f.fract() != 0.0 {
        return Err(CoerceError::Fractional(shown.to_string()));
    }
    if f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(CoerceError::OutOfRange(shown.to_string()));
    }
    Ok(f as i64)
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Parse a timestamp cell into UTC.
///
/// RFC 3339 values keep their own offset. Naive date-times are read in
/// `options.offset`. Date-only values are combined with the time of day of
/// `options.processed_at` in that offset.
pub fn timestamp(value: &RawValue, options: &IntakeOptions) -> Option<DateTime<Utc>> {
    let RawValue::Text(text) = value else {
        return None;
    };
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return localize(naive, options);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            let time_of_day = options.processed_at.with_timezone(&options.offset).time();
            return localize(date.and_time(time_of_day), options);
        }
    }

    None
}

fn localize(naive: NaiveDateTime, options: &IntakeOptions) -> Option<DateTime<Utc>> {
    options
        .offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn options() -> IntakeOptions {
        let processed = Utc.with_ymd_and_hms(2024, 5, 10, 15, 30, 0).unwrap();
        IntakeOptions::new(processed).with_offset(FixedOffset::west_opt(3 * 3600).unwrap())
    }

    #[test]
    fn integers_pass_through() {
        assert_eq!(integer(&RawValue::Int(-3)), Ok(-3));
    }

    #[test]
    fn whole_floats_and_numeric_strings_coerce() {
        assert_eq!(integer(&RawValue::Float(4.0)), Ok(4));
        assert_eq!(integer(&RawValue::from(" 12 ")), Ok(12));
        assert_eq!(integer(&RawValue::from("6.0000")), Ok(6));
    }

    #[test]
    fn fractional_values_are_refused() {
        assert!(matches!(integer(&RawValue::Float(2.5)), Err(CoerceError::Fractional(_))));
        assert!(matches!(integer(&RawValue::from("1.25")), Err(CoerceError::Fractional(_))));
    }

    #[test]
    fn garbage_is_not_a_number() {
        assert!(matches!(integer(&RawValue::from("ten")), Err(CoerceError::NotANumber(_))));
        assert!(matches!(integer(&RawValue::Float(f64::NAN)), Err(CoerceError::NotANumber(_))));
    }

    #[test]
    fn rfc3339_keeps_its_offset() {
        let ts = timestamp(&RawValue::from("2024-05-01T10:00:00-03:00"), &options()).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap());
    }

    #[test]
    fn naive_datetime_uses_configured_offset() {
        let ts = timestamp(&RawValue::from("2024-05-01 10:00:00"), &options()).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap());
    }

    #[test]
    fn date_only_takes_processing_time_of_day() {
        // 15:30 UTC is 12:30 at -03:00.
        let ts = timestamp(&RawValue::from("2024-05-01"), &options()).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 5, 1, 15, 30, 0).unwrap());

        let br = timestamp(&RawValue::from("01/05/2024"), &options()).unwrap();
        assert_eq!(br, ts);
    }

    #[test]
    fn unparseable_dates_yield_none() {
        assert_eq!(timestamp(&RawValue::from("yesterday"), &options()), None);
        assert_eq!(timestamp(&RawValue::Int(45000), &options()), None);
    }

    proptest! {
        #[test]
        fn integer_strings_round_trip(n in -1_000_000_000i64..1_000_000_000i64) {
            prop_assert_eq!(integer(&RawValue::Text(n.to_string())), Ok(n));
            prop_assert_eq!(integer(&RawValue::Float(n as f64)), Ok(n));
        }
    }
}
