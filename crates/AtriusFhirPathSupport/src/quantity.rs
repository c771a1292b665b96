//! # FHIRPath Quantity
//!
//! A decimal magnitude with a unit. The unit is a UCUM expression, one of the
//! calendar duration keywords, or the dimensionless unit `"1"`.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

/// Calendar duration keywords. Their real-world length varies (a month is
/// not a fixed number of days), unlike the definite UCUM time units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CalendarUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl CalendarUnit {
    /// Recognises singular and plural keywords (`day`, `days`).
    pub fn from_keyword(unit: &str) -> Option<Self> {
        match unit {
            "year" | "years" => Some(CalendarUnit::Year),
            "month" | "months" => Some(CalendarUnit::Month),
            "week" | "weeks" => Some(CalendarUnit::Week),
            "day" | "days" => Some(CalendarUnit::Day),
            "hour" | "hours" => Some(CalendarUnit::Hour),
            "minute" | "minutes" => Some(CalendarUnit::Minute),
            "second" | "seconds" => Some(CalendarUnit::Second),
            "millisecond" | "milliseconds" => Some(CalendarUnit::Millisecond),
            _ => None,
        }
    }

    /// Recognises the UCUM time codes that correspond to a calendar unit.
    pub fn from_ucum(code: &str) -> Option<Self> {
        match code {
            "a" => Some(CalendarUnit::Year),
            "mo" => Some(CalendarUnit::Month),
            "wk" => Some(CalendarUnit::Week),
            "d" => Some(CalendarUnit::Day),
            "h" => Some(CalendarUnit::Hour),
            "min" => Some(CalendarUnit::Minute),
            "s" => Some(CalendarUnit::Second),
            "ms" => Some(CalendarUnit::Millisecond),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            CalendarUnit::Year => "year",
            CalendarUnit::Month => "month",
            CalendarUnit::Week => "week",
            CalendarUnit::Day => "day",
            CalendarUnit::Hour => "hour",
            CalendarUnit::Minute => "minute",
            CalendarUnit::Second => "second",
            CalendarUnit::Millisecond => "millisecond",
        }
    }

    pub fn ucum_code(self) -> &'static str {
        match self {
            CalendarUnit::Year => "a",
            CalendarUnit::Month => "mo",
            CalendarUnit::Week => "wk",
            CalendarUnit::Day => "d",
            CalendarUnit::Hour => "h",
            CalendarUnit::Minute => "min",
            CalendarUnit::Second => "s",
            CalendarUnit::Millisecond => "ms",
        }
    }

    /// Whether a calendar keyword of this unit equals its UCUM counterpart.
    /// Years and months do not: `1 year` is not `1 'a'`.
    pub fn is_definite(self) -> bool {
        !matches!(self, CalendarUnit::Year | CalendarUnit::Month)
    }
}

static QUANTITY_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([+-]?\d+(?:\.\d+)?)\s*(?:'([^']+)'|([a-zA-Z]+))?\s*$").expect("quantity pattern")
});

/// Value and unit. `unit` is stored exactly as written: calendar keywords stay
/// keywords and UCUM codes stay codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Quantity {
    pub value: Decimal,
    pub unit: String,
}

impl Quantity {
    pub fn new(value: Decimal, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    /// A quantity with the dimensionless unit `'1'`.
    pub fn unitless(value: Decimal) -> Self {
        Self::new(value, "1")
    }

    /// Parses `<number>`, `<number> '<ucum>'` or `<number> <calendar keyword>`.
    /// A bare word that is not a calendar keyword is rejected.
    pub fn parse(text: &str) -> Option<Self> {
        let caps = QUANTITY_TEXT.captures(text)?;
        let value = Decimal::from_str(&caps[1]).ok()?;
        let unit = match (caps.get(2), caps.get(3)) {
            (Some(quoted), _) => quoted.as_str().to_string(),
            (None, Some(word)) => {
                CalendarUnit::from_keyword(word.as_str())?;
                word.as_str().to_string()
            }
            (None, None) => "1".to_string(),
        };
        Some(Self { value, unit })
    }

    /// The calendar keyword meaning of the unit, if the unit is a keyword.
    pub fn calendar_unit(&self) -> Option<CalendarUnit> {
        CalendarUnit::from_keyword(&self.unit)
    }

    /// The unit as a UCUM code: calendar keywords map to their UCUM symbol.
    pub fn ucum_unit(&self) -> &str {
        match self.calendar_unit() {
            Some(calendar) => calendar.ucum_code(),
            None => &self.unit,
        }
    }

    pub fn is_unitless(&self) -> bool {
        self.unit == "1"
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.calendar_unit().is_some() {
            write!(f, "{} {}", self.value, self.unit)
        } else {
            write!(f, "{} '{}'", self.value, self.unit)
        }
    }
}
