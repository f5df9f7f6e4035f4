//! ISO-8601 dates and durations.
//!
//! Dates are represented with `chrono::NaiveDateTime`. Durations are a small
//! calendar-aware struct rather than a fixed span, since adding "1 month" to a
//! date is not a fixed number of seconds.

use std::fmt;
use std::ops::Add;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub type Date = NaiveDateTime;

/// Errors parsing a date or duration string.
#[derive(thiserror::Error, Debug)]
pub enum TemporalError {
    #[error("invalid date \"{0}\"")]
    InvalidDate(String),

    #[error("invalid ISO-8601 duration \"{0}\"")]
    InvalidDuration(String),

    #[error("invalid walltime \"{0}\", expected HH:MM:SS")]
    InvalidWalltime(String),
}

/// Parses an ISO-8601 date-time, accepting bare dates (`2025-01-01`) by
/// assuming midnight.
pub fn parse_date(raw: &str) -> Result<Date, TemporalError> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).expect("midnight is always valid"));
    }
    raw.parse::<NaiveDateTime>()
        .map_err(|_| TemporalError::InvalidDate(raw.to_string()))
}

/// A calendar-aware ISO-8601 duration/period (`PnYnMnDTnHnMnS`), with sign.
///
/// Only one of the two forms is ever parsed at a time — this does not track
/// fractional seconds and treats weeks as a separate component (`P1W`),
/// following the reference format's `nW` shorthand.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsoDuration {
    pub negative: bool,
    pub years: i64,
    pub months: i64,
    pub weeks: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl IsoDuration {
    pub const ZERO: IsoDuration = IsoDuration {
        negative: false,
        years: 0,
        months: 0,
        weeks: 0,
        days: 0,
        hours: 0,
        minutes: 0,
        seconds: 0,
    };

    /// True if this duration is non-positive: zero, or negated with any
    /// non-zero component.
    pub fn is_non_positive(&self) -> bool {
        self.negative || self.is_zero()
    }

    pub fn is_zero(&self) -> bool {
        self.years == 0
            && self.months == 0
            && self.weeks == 0
            && self.days == 0
            && self.hours == 0
            && self.minutes == 0
            && self.seconds == 0
    }

    fn signed(&self, field: i64) -> i64 {
        if self.negative {
            -field
        } else {
            field
        }
    }
}

impl fmt::Display for IsoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "P")?;
        if self.years != 0 {
            write!(f, "{}Y", self.years)?;
        }
        if self.months != 0 {
            write!(f, "{}M", self.months)?;
        }
        if self.weeks != 0 {
            write!(f, "{}W", self.weeks)?;
        }
        if self.days != 0 {
            write!(f, "{}D", self.days)?;
        }
        if self.hours != 0 || self.minutes != 0 || self.seconds != 0 {
            write!(f, "T")?;
            if self.hours != 0 {
                write!(f, "{}H", self.hours)?;
            }
            if self.minutes != 0 {
                write!(f, "{}M", self.minutes)?;
            }
            if self.seconds != 0 {
                write!(f, "{}S", self.seconds)?;
            }
        }
        Ok(())
    }
}

/// Parses an ISO-8601 period string such as `P1Y2M3DT4H5M6S`, `P2M`, or
/// `-P1D`. Returns `ZERO` for an all-zero duration (`P0D`).
pub fn parse_duration(raw: &str) -> Result<IsoDuration, TemporalError> {
    let err = || TemporalError::InvalidDuration(raw.to_string());

    let (negative, rest) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let rest = rest.strip_prefix('P').ok_or_else(err)?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut dur = IsoDuration {
        negative,
        ..IsoDuration::ZERO
    };

    parse_components(date_part, &[('Y', 0), ('M', 1), ('W', 2), ('D', 3)], &mut [
        &mut dur.years,
        &mut dur.months,
        &mut dur.weeks,
        &mut dur.days,
    ])
    .ok_or_else(err)?;

    if let Some(time_part) = time_part {
        parse_components(time_part, &[('H', 0), ('M', 1), ('S', 2)], &mut [
            &mut dur.hours,
            &mut dur.minutes,
            &mut dur.seconds,
        ])
        .ok_or_else(err)?;
    }

    Ok(dur)
}

/// Scans `input` for runs of digits followed by one of the designator
/// letters in `designators`, writing each matched value into the
/// correspondingly-indexed output slot. Returns `None` on malformed input
/// (non-digit/non-designator characters, or an unrecognized designator).
fn parse_components(
    input: &str,
    designators: &[(char, usize)],
    outputs: &mut [&mut i64],
) -> Option<()> {
    if input.is_empty() {
        return Some(());
    }
    let mut num = String::new();
    for ch in input.chars() {
        if ch.is_ascii_digit() {
            num.push(ch);
            continue;
        }
        let (_, idx) = designators.iter().find(|(d, _)| *d == ch)?;
        let value: i64 = num.parse().ok()?;
        *outputs[*idx] = value;
        num.clear();
    }
    if !num.is_empty() {
        return None;
    }
    Some(())
}

impl Add<IsoDuration> for Date {
    type Output = Date;

    fn add(self, rhs: IsoDuration) -> Date {
        let sign = if rhs.negative { -1 } else { 1 };
        let mut date = self.date();
        let total_months = sign * (rhs.years * 12 + rhs.months);
        // chrono has no direct "add N months" on NaiveDate; walk year/month by hand.
        let mut year = date.year();
        let mut month = date.month() as i64 + total_months;
        while month > 12 {
            month -= 12;
            year += 1;
        }
        while month < 1 {
            month += 12;
            year -= 1;
        }
        date = chrono::NaiveDate::from_ymd_opt(year, month as u32, date.day())
            .unwrap_or_else(|| last_day_of_month(year, month as u32));

        let days = sign * (rhs.weeks * 7 + rhs.days);
        date += chrono::Duration::days(days);

        let seconds = sign * (rhs.hours * 3600 + rhs.minutes * 60 + rhs.seconds);
        let time = self.time();
        let naive = NaiveDateTime::new(date, time) + chrono::Duration::seconds(seconds);
        naive
    }
}

fn last_day_of_month(year: i32, month: u32) -> chrono::NaiveDate {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    chrono::NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .expect("valid next month")
        .pred_opt()
        .expect("day before the 1st always exists")
}

use chrono::Datelike;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_date() {
        let d = parse_date("2025-01-01").unwrap();
        assert_eq!(d.to_string(), "2025-01-01 00:00:00");
    }

    #[test]
    fn parses_datetime() {
        let d = parse_date("2025-01-01T12:30:00").unwrap();
        assert_eq!(d.hour(), 12);
    }

    #[test]
    fn parses_full_duration() {
        let dur = parse_duration("P1Y2M3DT4H5M6S").unwrap();
        assert_eq!(dur.years, 1);
        assert_eq!(dur.months, 2);
        assert_eq!(dur.days, 3);
        assert_eq!(dur.hours, 4);
        assert_eq!(dur.minutes, 5);
        assert_eq!(dur.seconds, 6);
    }

    #[test]
    fn parses_negative_duration() {
        let dur = parse_duration("-P2M").unwrap();
        assert!(dur.negative);
        assert_eq!(dur.months, 2);
        assert!(dur.is_non_positive());
    }

    #[test]
    fn zero_duration_is_non_positive() {
        let dur = parse_duration("P0D").unwrap();
        assert!(dur.is_non_positive());
    }

    #[test]
    fn rejects_malformed_duration() {
        assert!(parse_duration("P1X").is_err());
        assert!(parse_duration("not a duration").is_err());
    }

    #[test]
    fn adds_months_across_year_boundary() {
        let d = parse_date("2025-12-01").unwrap();
        let dur = parse_duration("P2M").unwrap();
        let sum = d + dur;
        assert_eq!(sum.date(), chrono::NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
    }

    #[test]
    fn adds_negative_lag() {
        let d = parse_date("2025-03-01").unwrap();
        let dur = parse_duration("-P2M").unwrap();
        let sum = d + dur;
        assert_eq!(sum.date(), chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }

    use chrono::Timelike;
}
