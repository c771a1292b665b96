//! # FHIRPath Date, Time and DateTime
//!
//! Partial-precision temporal values. Each value pairs a chrono timestamp with
//! a [`TemporalPrecision`] that says which components were actually stated;
//! components below the precision are zero-filled and carry no meaning.
//!
//! Comparison is precision aware: two values that agree on every component
//! they both state but differ in precision are incomparable, which FHIRPath
//! surfaces as an empty result. Seconds and milliseconds count as a single
//! precision for comparison.

use std::cmp::Ordering;
use std::fmt;

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::evaluation_error::EvaluationError;

/// The finest component a temporal value states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemporalPrecision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl TemporalPrecision {
    /// Number of leading components (year, month, day, hour, minute, second)
    /// that are meaningful at this precision. Milliseconds fold into seconds.
    fn component_count(self) -> usize {
        match self {
            TemporalPrecision::Year => 1,
            TemporalPrecision::Month => 2,
            TemporalPrecision::Day => 3,
            TemporalPrecision::Hour => 4,
            TemporalPrecision::Minute => 5,
            TemporalPrecision::Second | TemporalPrecision::Millisecond => 6,
        }
    }
}

static DATE_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})(?:-(\d{2})(?:-(\d{2}))?)?$").expect("date pattern")
});

static TIME_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2})(?::(\d{2})(?::(\d{2})(?:\.(\d+))?)?)?$").expect("time pattern")
});

static DATE_TIME_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})(?:-(\d{2})(?:-(\d{2}))?)?(?:T(?:(\d{2})(?::(\d{2})(?::(\d{2})(?:\.(\d+))?)?)?)?(Z|[+-]\d{2}:\d{2})?)?$",
    )
    .expect("datetime pattern")
});

fn out_of_range(kind: &str, text: &str) -> EvaluationError {
    EvaluationError::ConversionError(format!("'{}' is not a valid {}", text, kind))
}

fn capture_u32(caps: &regex::Captures<'_>, index: usize) -> Option<u32> {
    caps.get(index).and_then(|m| m.as_str().parse().ok())
}

/// Milliseconds from a fractional-second digit string; digits past the third
/// are dropped.
fn fraction_millis(digits: &str) -> u32 {
    let mut padded: String = digits.chars().take(3).collect();
    while padded.len() < 3 {
        padded.push('0');
    }
    padded.parse().unwrap_or(0)
}

fn parse_offset(text: &str) -> Option<FixedOffset> {
    if text == "Z" {
        return FixedOffset::east_opt(0);
    }
    let sign = if text.starts_with('-') { -1 } else { 1 };
    let hours: i32 = text.get(1..3)?.parse().ok()?;
    let minutes: i32 = text.get(4..6)?.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn write_offset(f: &mut fmt::Formatter<'_>, offset: &FixedOffset) -> fmt::Result {
    let seconds = offset.local_minus_utc();
    if seconds == 0 {
        return write!(f, "Z");
    }
    let sign = if seconds < 0 { '-' } else { '+' };
    let seconds = seconds.abs();
    write!(f, "{}{:02}:{:02}", sign, seconds / 3600, (seconds % 3600) / 60)
}

/// Compares the leading components both values state. Returns `None` when
/// they agree on all of those but one states more than the other.
fn compare_components(
    left: &[i64; 6],
    left_precision: TemporalPrecision,
    right: &[i64; 6],
    right_precision: TemporalPrecision,
) -> Option<Ordering> {
    let left_count = left_precision.component_count();
    let right_count = right_precision.component_count();
    let shared = left_count.min(right_count);
    for i in 0..shared {
        match left[i].cmp(&right[i]) {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    if left_count == right_count {
        Some(Ordering::Equal)
    } else {
        None
    }
}

fn date_time_components(value: &NaiveDateTime) -> [i64; 6] {
    [
        value.year() as i64,
        value.month() as i64,
        value.day() as i64,
        value.hour() as i64,
        value.minute() as i64,
        value.second() as i64 * 1000 + (value.nanosecond() / 1_000_000) as i64,
    ]
}

// ---------------------------------------------------------------------------
// Date
// ---------------------------------------------------------------------------

/// A calendar date with year, month or day precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Date {
    value: NaiveDate,
    precision: TemporalPrecision,
}

impl Date {
    /// Builds a date, truncating components below `precision`.
    /// Precisions finer than a day are clamped to a day.
    pub fn new(value: NaiveDate, precision: TemporalPrecision) -> Self {
        let precision = precision.min(TemporalPrecision::Day);
        let value = match precision {
            TemporalPrecision::Year => value.with_day(1).and_then(|d| d.with_month(1)),
            TemporalPrecision::Month => value.with_day(1),
            _ => Some(value),
        }
        .unwrap_or(value);
        Self { value, precision }
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(|d| Self::new(d, TemporalPrecision::Day))
    }

    /// Parses `YYYY`, `YYYY-MM` or `YYYY-MM-DD` (an optional leading `@` is ignored).
    ///
    /// Returns `Ok(None)` when the text does not have the shape of a date and
    /// an error when it has the shape but names an impossible date.
    pub fn parse(text: &str) -> Result<Option<Self>, EvaluationError> {
        let text = text.strip_prefix('@').unwrap_or(text);
        let Some(caps) = DATE_SHAPE.captures(text) else {
            return Ok(None);
        };
        let year = caps[1].parse::<i32>().map_err(|_| out_of_range("date", text))?;
        let month = capture_u32(&caps, 2);
        let day = capture_u32(&caps, 3);
        let precision = match (month, day) {
            (None, _) => TemporalPrecision::Year,
            (Some(_), None) => TemporalPrecision::Month,
            (Some(_), Some(_)) => TemporalPrecision::Day,
        };
        NaiveDate::from_ymd_opt(year, month.unwrap_or(1), day.unwrap_or(1))
            .map(|value| Some(Self { value, precision }))
            .ok_or_else(|| out_of_range("date", text))
    }

    pub fn value(&self) -> NaiveDate {
        self.value
    }

    pub fn precision(&self) -> TemporalPrecision {
        self.precision
    }

    pub fn year(&self) -> i32 {
        self.value.year()
    }

    pub fn month(&self) -> Option<u32> {
        (self.precision >= TemporalPrecision::Month).then(|| self.value.month())
    }

    pub fn day(&self) -> Option<u32> {
        (self.precision >= TemporalPrecision::Day).then(|| self.value.day())
    }

    fn components(&self) -> [i64; 6] {
        date_time_components(&self.value.and_time(NaiveTime::MIN))
    }

    /// Precision-aware ordering; `None` when the precisions make the
    /// comparison indeterminate.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        compare_components(&self.components(), self.precision, &other.components(), other.precision)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.value.year())?;
        if self.precision >= TemporalPrecision::Month {
            write!(f, "-{:02}", self.value.month())?;
        }
        if self.precision >= TemporalPrecision::Day {
            write!(f, "-{:02}", self.value.day())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A time of day with hour through millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Time {
    value: NaiveTime,
    precision: TemporalPrecision,
}

impl Time {
    /// Builds a time, truncating components below `precision`.
    /// Precisions coarser than an hour are clamped to an hour.
    pub fn new(value: NaiveTime, precision: TemporalPrecision) -> Self {
        let precision = precision.max(TemporalPrecision::Hour);
        let value = truncate_time(value, precision);
        Self { value, precision }
    }

    /// Parses `hh`, `hh:mm`, `hh:mm:ss` or `hh:mm:ss.fff` (an optional
    /// leading `@T` or `T` is ignored).
    pub fn parse(text: &str) -> Result<Option<Self>, EvaluationError> {
        let text = text.strip_prefix('@').unwrap_or(text);
        let text = text.strip_prefix('T').unwrap_or(text);
        let Some(caps) = TIME_SHAPE.captures(text) else {
            return Ok(None);
        };
        let (value, precision) = time_from_captures(&caps, 1).ok_or_else(|| out_of_range("time", text))?;
        Ok(Some(Self { value, precision }))
    }

    pub fn value(&self) -> NaiveTime {
        self.value
    }

    pub fn precision(&self) -> TemporalPrecision {
        self.precision
    }

    fn components(&self) -> [i64; 6] {
        let millis = (self.value.nanosecond() / 1_000_000) as i64;
        // Date components are constant so only the time part decides.
        [
            0,
            0,
            0,
            self.value.hour() as i64,
            self.value.minute() as i64,
            self.value.second() as i64 * 1000 + millis,
        ]
    }

    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        compare_components(&self.components(), self.precision, &other.components(), other.precision)
    }
}

fn truncate_time(value: NaiveTime, precision: TemporalPrecision) -> NaiveTime {
    let (h, m, s, ms) = (
        value.hour(),
        value.minute(),
        value.second(),
        value.nanosecond() / 1_000_000,
    );
    let truncated = match precision {
        TemporalPrecision::Year | TemporalPrecision::Month | TemporalPrecision::Day => {
            NaiveTime::from_hms_milli_opt(0, 0, 0, 0)
        }
        TemporalPrecision::Hour => NaiveTime::from_hms_milli_opt(h, 0, 0, 0),
        TemporalPrecision::Minute => NaiveTime::from_hms_milli_opt(h, m, 0, 0),
        TemporalPrecision::Second => NaiveTime::from_hms_milli_opt(h, m, s, 0),
        TemporalPrecision::Millisecond => NaiveTime::from_hms_milli_opt(h, m, s, ms.min(999)),
    };
    truncated.unwrap_or(value)
}

fn time_from_captures(
    caps: &regex::Captures<'_>,
    first: usize,
) -> Option<(NaiveTime, TemporalPrecision)> {
    let hour = capture_u32(caps, first)?;
    let minute = capture_u32(caps, first + 1);
    let second = capture_u32(caps, first + 2);
    let millis = caps.get(first + 3).map(|m| fraction_millis(m.as_str()));
    let precision = match (minute, second, millis) {
        (None, _, _) => TemporalPrecision::Hour,
        (Some(_), None, _) => TemporalPrecision::Minute,
        (Some(_), Some(_), None) => TemporalPrecision::Second,
        (Some(_), Some(_), Some(_)) => TemporalPrecision::Millisecond,
    };
    let value = NaiveTime::from_hms_milli_opt(
        hour,
        minute.unwrap_or(0),
        second.unwrap_or(0),
        millis.unwrap_or(0),
    )?;
    Some((value, precision))
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_time(f, &self.value, self.precision)
    }
}

fn write_time(f: &mut fmt::Formatter<'_>, value: &NaiveTime, precision: TemporalPrecision) -> fmt::Result {
    write!(f, "{:02}", value.hour())?;
    if precision >= TemporalPrecision::Minute {
        write!(f, ":{:02}", value.minute())?;
    }
    if precision >= TemporalPrecision::Second {
        write!(f, ":{:02}", value.second())?;
    }
    if precision >= TemporalPrecision::Millisecond {
        write!(f, ".{:03}", value.nanosecond() / 1_000_000)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// DateTime
// ---------------------------------------------------------------------------

/// A date and time with year through millisecond precision and an optional
/// timezone offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateTime {
    value: NaiveDateTime,
    offset: Option<FixedOffset>,
    precision: TemporalPrecision,
}

impl DateTime {
    /// Builds a datetime, truncating components below `precision`.
    pub fn new(value: NaiveDateTime, offset: Option<FixedOffset>, precision: TemporalPrecision) -> Self {
        let date = Date::new(value.date(), precision).value();
        let time = truncate_time(value.time(), precision);
        Self {
            value: date.and_time(time),
            offset,
            precision,
        }
    }

    /// Widens a date to a datetime of the same precision with no offset.
    pub fn from_date(date: &Date) -> Self {
        Self {
            value: date.value().and_time(NaiveTime::MIN),
            offset: None,
            precision: date.precision(),
        }
    }

    /// Parses `YYYY[-MM[-DD]][T[hh[:mm[:ss[.fff]]]][Z|(+|-)hh:mm]]`
    /// (an optional leading `@` is ignored).
    pub fn parse(text: &str) -> Result<Option<Self>, EvaluationError> {
        let text = text.strip_prefix('@').unwrap_or(text);
        let Some(caps) = DATE_TIME_SHAPE.captures(text) else {
            return Ok(None);
        };
        let year = caps[1]
            .parse::<i32>()
            .map_err(|_| out_of_range("datetime", text))?;
        let month = capture_u32(&caps, 2);
        let day = capture_u32(&caps, 3);
        let date = NaiveDate::from_ymd_opt(year, month.unwrap_or(1), day.unwrap_or(1))
            .ok_or_else(|| out_of_range("datetime", text))?;
        let date_precision = match (month, day) {
            (None, _) => TemporalPrecision::Year,
            (Some(_), None) => TemporalPrecision::Month,
            (Some(_), Some(_)) => TemporalPrecision::Day,
        };
        let (time, precision) = if caps.get(4).is_some() {
            if date_precision != TemporalPrecision::Day {
                return Err(out_of_range("datetime", text));
            }
            time_from_captures(&caps, 4).ok_or_else(|| out_of_range("datetime", text))?
        } else {
            (NaiveTime::MIN, date_precision)
        };
        let offset = match caps.get(8) {
            Some(m) => Some(parse_offset(m.as_str()).ok_or_else(|| out_of_range("datetime", text))?),
            None => None,
        };
        Ok(Some(Self {
            value: date.and_time(time),
            offset,
            precision,
        }))
    }

    pub fn value(&self) -> NaiveDateTime {
        self.value
    }

    pub fn offset(&self) -> Option<FixedOffset> {
        self.offset
    }

    pub fn precision(&self) -> TemporalPrecision {
        self.precision
    }

    /// The date part, at no finer than day precision.
    pub fn date(&self) -> Date {
        Date::new(self.value.date(), self.precision)
    }

    /// The time part, or `None` when no time components were stated.
    pub fn time(&self) -> Option<Time> {
        (self.precision >= TemporalPrecision::Hour).then(|| Time::new(self.value.time(), self.precision))
    }

    /// Same value with a different offset attached (the wall clock is kept).
    pub fn with_offset(&self, offset: Option<FixedOffset>) -> Self {
        Self { offset, ..*self }
    }

    /// The instant shifted to UTC. A missing offset is read as UTC.
    fn normalized(&self) -> NaiveDateTime {
        match self.offset {
            Some(offset) => self
                .value
                .checked_sub_signed(TimeDelta::seconds(offset.local_minus_utc() as i64))
                .unwrap_or(self.value),
            None => self.value,
        }
    }

    /// Precision-aware ordering. When both values state a time, they are
    /// compared as instants in UTC.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        let (left, right) = if self.precision >= TemporalPrecision::Hour
            && other.precision >= TemporalPrecision::Hour
        {
            (self.normalized(), other.normalized())
        } else {
            (self.value, other.value)
        };
        compare_components(
            &date_time_components(&left),
            self.precision,
            &date_time_components(&right),
            other.precision,
        )
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date())?;
        if self.precision >= TemporalPrecision::Hour {
            write!(f, "T")?;
            write_time(f, &self.value.time(), self.precision)?;
            if let Some(offset) = &self.offset {
                write_offset(f, offset)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(text: &str) -> Date {
        Date::parse(text).unwrap().unwrap()
    }

    fn date_time(text: &str) -> DateTime {
        DateTime::parse(text).unwrap().unwrap()
    }

    fn time(text: &str) -> Time {
        Time::parse(text).unwrap().unwrap()
    }

    #[test]
    fn test_date_parse_precision() {
        assert_eq!(date("2014").precision(), TemporalPrecision::Year);
        assert_eq!(date("@2014-02").precision(), TemporalPrecision::Month);
        assert_eq!(date("2014-02-03").precision(), TemporalPrecision::Day);
        assert_eq!(date("2014-02").to_string(), "2014-02");
        assert_eq!(date("2014-02").day(), None);
    }

    #[test]
    fn test_date_parse_shape_versus_range() {
        assert_eq!(Date::parse("hello").unwrap(), None);
        assert_eq!(Date::parse("14-02-03").unwrap(), None);
        assert!(Date::parse("2023-02-30").is_err());
        assert!(Date::parse("2023-13").is_err());
    }

    #[test]
    fn test_time_parse_and_display() {
        assert_eq!(time("@T14").precision(), TemporalPrecision::Hour);
        assert_eq!(time("14:30:15.5").to_string(), "14:30:15.500");
        assert_eq!(time("14:30").to_string(), "14:30");
        assert!(Time::parse("25:00").is_err());
    }

    #[test]
    fn test_date_time_parse_and_display() {
        let value = date_time("2015-02-04T14:34:28.123+09:00");
        assert_eq!(value.precision(), TemporalPrecision::Millisecond);
        assert_eq!(value.to_string(), "2015-02-04T14:34:28.123+09:00");
        assert_eq!(date_time("2015T").precision(), TemporalPrecision::Year);
        assert_eq!(date_time("2015-02-04T14Z").to_string(), "2015-02-04T14Z");
        assert!(DateTime::parse("2015-02T10:00").is_err());
    }

    #[test]
    fn test_precision_aware_comparison() {
        assert_eq!(date("2012").compare(&date("2013-01")), Some(Ordering::Less));
        assert_eq!(date("2012-01").compare(&date("2012-01-31")), None);
        assert_eq!(date("2012-01-01").compare(&date("2012-01-01")), Some(Ordering::Equal));
        assert_eq!(time("10:00:00").compare(&time("10:00:00.000")), Some(Ordering::Equal));
        assert_eq!(time("10:00").compare(&time("10:00:00")), None);
    }

    #[test]
    fn test_date_time_comparison_normalizes_offsets() {
        let a = date_time("2017-11-05T01:30:00.0-04:00");
        let b = date_time("2017-11-05T01:15:00.0-05:00");
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        let c = date_time("2017-11-05T05:30:00.0Z");
        assert_eq!(a.compare(&c), Some(Ordering::Equal));
    }
}
