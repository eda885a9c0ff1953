//! Microsecond timestamps and the miniSEED BTIME structure.
//!
//! Times are carried as `i64` microseconds since the Unix epoch, always UTC.
//! [`BTime`] is the packed 10-byte form found in the fixed header; it only
//! resolves 0.0001 s, the remaining microseconds travel in blockette 1001.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Microseconds per second.
pub const HPT_MODULUS: i64 = 1_000_000;

/// BTIME timestamp (10 bytes in the fixed header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTime {
    pub year: u16,
    pub day: u16, // 1-366
    pub hour: u8,
    pub minute: u8,
    pub second: u8, // 0-60
    pub fract: u16, // 0.0001 second units
}

impl BTime {
    /// Microseconds since the epoch, or `None` for an impossible calendar date.
    pub fn to_micros(&self) -> Option<i64> {
        let date = NaiveDate::from_yo_opt(i32::from(self.year), u32::from(self.day))?;
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
        let days = date.signed_duration_since(epoch).num_days();
        let seconds = days * 86_400
            + i64::from(self.hour) * 3_600
            + i64::from(self.minute) * 60
            + i64::from(self.second);
        Some(seconds * HPT_MODULUS + i64::from(self.fract) * 100)
    }

    /// Split a microsecond time into a BTIME plus the 0..=99 µs remainder
    /// that BTIME cannot hold.
    pub fn from_micros(micros: i64) -> Option<(Self, u8)> {
        let dt = micros_to_datetime(micros)?;
        let year = u16::try_from(dt.year()).ok()?;
        let sub = dt.timestamp_subsec_micros();
        Some((
            Self {
                year,
                day: dt.ordinal() as u16,
                hour: dt.hour() as u8,
                minute: dt.minute() as u8,
                second: dt.second() as u8,
                fract: (sub / 100) as u16,
            },
            (sub % 100) as u8,
        ))
    }
}

impl fmt::Display for BTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:03} {:02}:{:02}:{:02}.{:04}",
            self.year, self.day, self.hour, self.minute, self.second, self.fract
        )
    }
}

/// Convert microseconds since the epoch to a UTC calendar time.
pub fn micros_to_datetime(micros: i64) -> Option<DateTime<Utc>> {
    let secs = micros.div_euclid(HPT_MODULUS);
    let nanos = (micros.rem_euclid(HPT_MODULUS) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// Convert a UTC calendar time to microseconds since the epoch.
///
/// `seconds * 1_000_000 + microsecond remainder`; sub-microsecond parts are
/// truncated.
pub fn datetime_to_micros(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp() * HPT_MODULUS + i64::from(dt.timestamp_subsec_micros())
}

/// Seconds (possibly fractional) to whole microseconds, rounded.
pub fn seconds_to_micros(seconds: f64) -> i64 {
    (seconds * HPT_MODULUS as f64).round() as i64
}

/// Presentation of timestamps in reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeFormat {
    /// `2005,146,00:00:00.000000`
    #[default]
    Seed,
    /// `2005-05-26T00:00:00.000000`
    Iso,
    /// `1117065600.000000`
    Epoch,
}

impl TimeFormat {
    pub fn format(self, micros: i64) -> String {
        let Some(dt) = micros_to_datetime(micros) else {
            return format!("{micros}us");
        };
        match self {
            Self::Seed => format!(
                "{:04},{:03},{:02}:{:02}:{:02}.{:06}",
                dt.year(),
                dt.ordinal(),
                dt.hour(),
                dt.minute(),
                dt.second(),
                dt.timestamp_subsec_micros()
            ),
            Self::Iso => dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            Self::Epoch => format!(
                "{}.{:06}",
                micros.div_euclid(HPT_MODULUS),
                micros.rem_euclid(HPT_MODULUS)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_btime_epoch() {
        let bt = BTime {
            year: 1970,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            fract: 0,
        };
        assert_eq!(bt.to_micros(), Some(0));
    }

    #[test]
    fn test_btime_known_instant() {
        // 2005-05-26 is day 146
        let bt = BTime {
            year: 2005,
            day: 146,
            hour: 0,
            minute: 0,
            second: 0,
            fract: 5000,
        };
        assert_eq!(bt.to_micros(), Some(1_117_065_600_500_000));
    }

    #[test]
    fn test_btime_micros_roundtrip_keeps_remainder() {
        let micros = 1_117_065_600_123_456;
        let (bt, usec) = BTime::from_micros(micros).unwrap();
        assert_eq!(bt.fract, 1234);
        assert_eq!(usec, 56);
        assert_eq!(bt.to_micros().unwrap() + i64::from(usec), micros);
    }

    #[test]
    fn test_btime_invalid_day() {
        let bt = BTime {
            year: 2023,
            day: 366,
            hour: 0,
            minute: 0,
            second: 0,
            fract: 0,
        };
        assert_eq!(bt.to_micros(), None);
    }

    #[test]
    fn test_leap_second_rolls_forward() {
        let bt = BTime {
            year: 2016,
            day: 366,
            hour: 23,
            minute: 59,
            second: 60,
            fract: 0,
        };
        let next_year = Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(bt.to_micros(), Some(datetime_to_micros(&next_year)));
    }

    #[test]
    fn test_datetime_conversion() {
        let dt = Utc.with_ymd_and_hms(2005, 5, 26, 0, 0, 0).unwrap();
        let micros = datetime_to_micros(&dt) + 250;
        assert_eq!(micros, 1_117_065_600_000_250);
        let back = micros_to_datetime(micros).unwrap();
        assert_eq!(back.timestamp_subsec_micros(), 250);
    }

    #[test]
    fn test_time_formats() {
        let micros = 1_117_065_600_000_000;
        assert_eq!(TimeFormat::Seed.format(micros), "2005,146,00:00:00.000000");
        assert_eq!(TimeFormat::Iso.format(micros), "2005-05-26T00:00:00.000000");
        assert_eq!(TimeFormat::Epoch.format(micros), "1117065600.000000");
    }
}
