use std::fmt::Debug;

use time::{Duration, OffsetDateTime};

use crate::error::{Error, invalid_argument};

/// Source of "now" for relative-to-absolute time conversions.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock frozen at one instant, for reproducible requests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// Parses a protobuf duration string such as `"86400s"` or `"1.5s"`.
pub fn parse_duration(raw: &str) -> Result<Duration, Error> {
    let seconds = raw
        .trim()
        .strip_suffix('s')
        .ok_or_else(|| invalid_argument(format!("duration '{raw}' must end with 's'")))?;
    let value: f64 = seconds
        .parse()
        .map_err(|_| invalid_argument(format!("duration '{raw}' is not a number of seconds")))?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid_argument(format!("duration '{raw}' must be a non-negative number")));
    }
    Ok(Duration::seconds_f64(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_seconds() {
        assert_eq!(parse_duration("86400s").unwrap(), Duration::days(1));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::milliseconds(1500));
    }

    #[test]
    fn rejects_missing_unit_and_negative_values() {
        assert!(parse_duration("86400").unwrap_err().is_invalid_argument());
        assert!(parse_duration("-1s").unwrap_err().is_invalid_argument());
        assert!(parse_duration("abcs").unwrap_err().is_invalid_argument());
    }
}
