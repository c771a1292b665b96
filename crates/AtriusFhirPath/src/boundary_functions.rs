//! # FHIRPath Boundary Functions
//!
//! Implements `lowBoundary()`, `highBoundary()` and `precision()`.
//!
//! A value stands for the range of values that would be written the same at
//! its precision: `1.587` covers `[1.5865, 1.5875)` and `@2014-01` covers
//! every day of January 2014. The boundary functions return the ends of that
//! range, expressed at the requested precision:
//!
//! - Decimal 1.587 -> low 1.58650000, high 1.58750000 (precision 8)
//! - Date @2014-01 -> low @2014-01-01, high @2014-01-31
//! - DateTime @2014-01-01T08 -> low @2014-01-01T08:00:00.000+14:00,
//!   high @2014-01-01T08:59:59.999-12:00
//! - Time @T10:30 -> low @T10:30:00.000, high @T10:30:59.999
//!
//! Precision arguments count digits: 4/6/8 for dates, up to 17 for
//! datetimes, 2/4/6/9 for times and up to 28 decimal places for numbers.

use atrius_fhirpath_support::{
    Date, DateTime, EvaluationError, EvaluationResult, Quantity, TemporalPrecision, Time, Value,
};
use chrono::{Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::evaluator::{CallSite, Evaluator};
use crate::function_registry::FunctionRegistry;

const DEFAULT_DECIMAL_PRECISION: u32 = 8;
const MAX_DECIMAL_PRECISION: u32 = 28;

/// Offsets assumed for a datetime without a timezone: the earliest and the
/// latest offsets in use.
const LOW_OFFSET_SECONDS: i32 = 14 * 3600;
const HIGH_OFFSET_SECONDS: i32 = -12 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Low,
    High,
}

fn date_precision(digits: i64) -> Option<TemporalPrecision> {
    match digits {
        4 => Some(TemporalPrecision::Year),
        6 => Some(TemporalPrecision::Month),
        8 => Some(TemporalPrecision::Day),
        _ => None,
    }
}

fn date_time_precision(digits: i64) -> Option<TemporalPrecision> {
    match digits {
        10 => Some(TemporalPrecision::Hour),
        12 => Some(TemporalPrecision::Minute),
        14 => Some(TemporalPrecision::Second),
        17 => Some(TemporalPrecision::Millisecond),
        other => date_precision(other),
    }
}

fn time_precision(digits: i64) -> Option<TemporalPrecision> {
    match digits {
        2 => Some(TemporalPrecision::Hour),
        4 => Some(TemporalPrecision::Minute),
        6 => Some(TemporalPrecision::Second),
        9 => Some(TemporalPrecision::Millisecond),
        _ => None,
    }
}

fn date_digits(precision: TemporalPrecision) -> i32 {
    match precision {
        TemporalPrecision::Year => 4,
        TemporalPrecision::Month => 6,
        TemporalPrecision::Day => 8,
        TemporalPrecision::Hour => 10,
        TemporalPrecision::Minute => 12,
        TemporalPrecision::Second => 14,
        TemporalPrecision::Millisecond => 17,
    }
}

fn time_digits(precision: TemporalPrecision) -> i32 {
    match precision {
        TemporalPrecision::Millisecond => 9,
        TemporalPrecision::Second => 6,
        TemporalPrecision::Minute => 4,
        _ => 2,
    }
}

/// Decimal boundary at `digits` decimal places
///
/// The value is widened by half a unit in its last written digit, then
/// rounded away from the value at the requested scale.
fn decimal_boundary(value: Decimal, digits: u32, bound: Bound) -> Option<Decimal> {
    if digits > MAX_DECIMAL_PRECISION {
        return None;
    }
    let widened = match Decimal::try_new(5, value.scale() + 1) {
        Ok(half) if bound == Bound::Low => value.checked_sub(half)?,
        Ok(half) => value.checked_add(half)?,
        Err(_) => value,
    };
    let strategy = match bound {
        Bound::Low => RoundingStrategy::ToNegativeInfinity,
        Bound::High => RoundingStrategy::ToPositiveInfinity,
    };
    let mut result = widened.round_dp_with_strategy(digits, strategy);
    result.rescale(digits);
    Some(result)
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    (28..=31)
        .rev()
        .find(|day| NaiveDate::from_ymd_opt(year, month, *day).is_some())
        .unwrap_or(28)
}

/// Fills the date components below `stated` with their extreme values.
fn date_bound(value: NaiveDate, stated: TemporalPrecision, bound: Bound) -> NaiveDate {
    if bound == Bound::Low {
        return value;
    }
    let year = value.year();
    let month = if stated >= TemporalPrecision::Month { value.month() } else { 12 };
    let day = if stated >= TemporalPrecision::Day {
        value.day()
    } else {
        last_day_of_month(year, month)
    };
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(value)
}

/// Fills the time components below `stated` with their extreme values.
fn time_bound(value: NaiveTime, stated: TemporalPrecision, bound: Bound) -> NaiveTime {
    if bound == Bound::Low {
        return value;
    }
    let pick = |precision: TemporalPrecision, actual: u32, max: u32| {
        if stated >= precision { actual } else { max }
    };
    let hour = pick(TemporalPrecision::Hour, value.hour(), 23);
    let minute = pick(TemporalPrecision::Minute, value.minute(), 59);
    let second = pick(TemporalPrecision::Second, value.second(), 59);
    let milli = pick(TemporalPrecision::Millisecond, value.nanosecond() / 1_000_000, 999);
    NaiveTime::from_hms_milli_opt(hour, minute, second, milli).unwrap_or(value)
}

fn date_time_bound(value: &DateTime, target: TemporalPrecision, bound: Bound) -> Option<DateTime> {
    let stated = value.precision();
    let date = date_bound(value.value().date(), stated, bound);
    let time = time_bound(value.value().time(), stated, bound);
    let offset = match value.offset() {
        Some(offset) => offset,
        None => FixedOffset::east_opt(match bound {
            Bound::Low => LOW_OFFSET_SECONDS,
            Bound::High => HIGH_OFFSET_SECONDS,
        })?,
    };
    Some(DateTime::new(NaiveDateTime::new(date, time), Some(offset), target))
}

/// Computes one boundary of `value`, or `None` when the value has no
/// boundary at the requested precision.
fn boundary(value: &Value, digits: Option<i64>, bound: Bound) -> Result<Option<Value>, EvaluationError> {
    let decimal_digits = || -> Result<u32, EvaluationError> {
        let digits = digits.unwrap_or(i64::from(DEFAULT_DECIMAL_PRECISION));
        u32::try_from(digits)
            .map_err(|_| EvaluationError::InvalidArgument(format!("Boundary precision must be >= 0, got {}", digits)))
    };
    Ok(match value {
        Value::Integer(_) | Value::Long(_) | Value::Decimal(_) => value
            .numeric_value()
            .and_then(|d| decimal_boundary(d, decimal_digits().ok()?, bound))
            .map(Value::Decimal),
        Value::Quantity(q) => decimal_boundary(q.value, decimal_digits()?, bound)
            .map(|d| Value::Quantity(Quantity::new(d, q.unit.clone()))),
        Value::Date(date) => date_precision(digits.unwrap_or(8)).map(|target| {
            Value::Date(Date::new(date_bound(date.value(), date.precision(), bound), target))
        }),
        Value::DateTime(dt) => date_time_precision(digits.unwrap_or(17))
            .and_then(|target| date_time_bound(dt, target, bound))
            .map(Value::DateTime),
        Value::Time(time) => time_precision(digits.unwrap_or(9))
            .map(|target| Value::Time(Time::new(time_bound(time.value(), time.precision(), bound), target))),
        _ => None,
    })
}

fn boundary_function(
    bound: Bound,
) -> impl Fn(&mut Evaluator<'_>, &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    move |evaluator, site| {
        site.expect_args(0, 1)?;
        let Some(value) = site.singleton_input()? else {
            return Ok(EvaluationResult::empty());
        };
        let digits = if site.args.is_empty() {
            None
        } else {
            match evaluator.integer_argument(site, 0)? {
                None => return Ok(EvaluationResult::empty()),
                digits => digits,
            }
        };
        if matches!(value, Value::Integer(_) | Value::Long(_) | Value::Decimal(_)) && digits.is_some_and(|d| d < 0) {
            return Err(EvaluationError::InvalidArgument(format!(
                "{}() precision must be >= 0",
                site.name
            )));
        }
        Ok(boundary(value, digits, bound)?
            .map(EvaluationResult::single)
            .unwrap_or_else(EvaluationResult::empty))
    }
}

/// Implements the FHIRPath precision() function
///
/// # Returns
///
/// * Decimal places for numbers (`1.58700.precision()` is 5)
/// * Digits of the stated components for temporals (`@2014.precision()` is
///   4, `@T10:30.precision()` is 4)
fn precision_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    let digits = match site.singleton_input()? {
        None => None,
        Some(Value::Integer(_) | Value::Long(_)) => Some(0),
        Some(Value::Decimal(d)) => i32::try_from(d.scale()).ok(),
        Some(Value::Quantity(q)) => i32::try_from(q.value.scale()).ok(),
        Some(Value::Date(d)) => Some(date_digits(d.precision())),
        Some(Value::DateTime(dt)) => Some(date_digits(dt.precision())),
        Some(Value::Time(t)) => Some(time_digits(t.precision())),
        Some(_) => None,
    };
    Ok(digits
        .map(EvaluationResult::single)
        .unwrap_or_else(EvaluationResult::empty))
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("lowBoundary", boundary_function(Bound::Low));
    registry.register("highBoundary", boundary_function(Bound::High));
    registry.register("precision", precision_function);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluationContext;
    use crate::evaluate_expression;
    use atrius_fhirpath_support::Collection;
    use rust_decimal_macros::dec;

    fn eval(source: &str) -> Result<EvaluationResult, EvaluationError> {
        evaluate_expression(source, &Collection::new(), &EvaluationContext::new())
    }

    fn value(source: &str) -> Value {
        eval(source).unwrap().collection[0].clone()
    }

    fn text(source: &str) -> String {
        value(source).to_string()
    }

    #[test]
    fn test_decimal_boundaries() {
        assert_eq!(value("1.587.lowBoundary()"), Value::Decimal(dec!(1.5865)));
        assert_eq!(value("1.587.highBoundary()"), Value::Decimal(dec!(1.5875)));
        assert_eq!(value("1.587.lowBoundary(2)"), Value::Decimal(dec!(1.58)));
        assert_eq!(value("1.587.highBoundary(2)"), Value::Decimal(dec!(1.59)));
        assert_eq!(value("(-1.587).lowBoundary()"), Value::Decimal(dec!(-1.5875)));
        assert_eq!(value("(-1.587).highBoundary()"), Value::Decimal(dec!(-1.5865)));
        assert_eq!(value("1.lowBoundary()"), Value::Decimal(dec!(0.5)));
        assert_eq!(text("1.587.lowBoundary()"), "1.58650000");
    }

    #[test]
    fn test_decimal_precision_out_of_range() {
        assert!(eval("1.5.lowBoundary(29)").unwrap().is_empty());
        assert!(matches!(
            eval("1.5.lowBoundary(-1)"),
            Err(EvaluationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_date_boundaries() {
        assert_eq!(text("@2014-02.lowBoundary()"), "@2014-02-01");
        assert_eq!(text("@2016-02.highBoundary()"), "@2016-02-29");
        assert_eq!(text("@2014.highBoundary(6)"), "@2014-12");
        assert!(eval("@2014.lowBoundary(5)").unwrap().is_empty());
    }

    #[test]
    fn test_date_time_boundaries() {
        assert_eq!(
            text("@2014-01-01T08.lowBoundary()"),
            "@2014-01-01T08:00:00.000+14:00"
        );
        assert_eq!(
            text("@2014-01-01T08.highBoundary()"),
            "@2014-01-01T08:59:59.999-12:00"
        );
        assert_eq!(
            text("@2014-01-01T08:30Z.highBoundary()"),
            "@2014-01-01T08:30:59.999Z"
        );
    }

    #[test]
    fn test_time_boundaries() {
        assert_eq!(text("@T10:30.lowBoundary()"), "@T10:30:00.000");
        assert_eq!(text("@T10:30.highBoundary()"), "@T10:30:59.999");
    }

    #[test]
    fn test_precision() {
        assert_eq!(value("1.58700.precision()"), Value::Integer(5));
        assert_eq!(value("@2014.precision()"), Value::Integer(4));
        assert_eq!(value("@2014-01-05T10:30:00.000.precision()"), Value::Integer(17));
        assert_eq!(value("@T10:30.precision()"), Value::Integer(4));
        assert!(eval("'a'.precision()").unwrap().is_empty());
    }
}
