//! # FHIRPath Date and Time Operations
//!
//! Calendar arithmetic (`+`/`-` with a time-valued quantity), the clock
//! functions `now()`, `today()` and `timeOfDay()`, and the component
//! extractors (`yearOf()` through `timeOf()`).
//!
//! Adding months or years clamps the day to the end of the target month, so
//! `@2020-01-31 + 1 month` is `@2020-02-29`. Durations finer than the value's
//! precision are truncated to that precision before they are applied.

use atrius_fhirpath_support::{
    CalendarUnit, Date, DateTime, EvaluationError, EvaluationResult, Quantity, TemporalPrecision,
    Time, Value,
};
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::evaluator::{CallSite, Evaluator};
use crate::function_registry::FunctionRegistry;

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;
const DAYS_PER_MONTH: i64 = 30;
const DAYS_PER_YEAR: i64 = 365;

/// The calendar unit of a time-valued quantity. UCUM codes are accepted for
/// the definite units only; `'a'` and `'mo'` are not calendar durations.
fn duration_unit(quantity: &Quantity) -> Result<CalendarUnit, EvaluationError> {
    if let Some(unit) = quantity.calendar_unit() {
        return Ok(unit);
    }
    match CalendarUnit::from_ucum(&quantity.unit) {
        Some(unit) if unit.is_definite() => Ok(unit),
        _ => Err(EvaluationError::InvalidOperation(format!(
            "'{}' is not a calendar duration unit",
            quantity.unit
        ))),
    }
}

fn unit_allowed(value: &Value, unit: CalendarUnit) -> bool {
    match value {
        Value::Date(_) => matches!(
            unit,
            CalendarUnit::Year | CalendarUnit::Month | CalendarUnit::Week | CalendarUnit::Day
        ),
        Value::Time(_) => matches!(
            unit,
            CalendarUnit::Hour | CalendarUnit::Minute | CalendarUnit::Second | CalendarUnit::Millisecond
        ),
        _ => true,
    }
}

/// A duration split into whole months and milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Delta {
    months: i64,
    millis: i64,
}

fn to_i64(value: Decimal) -> Result<i64, EvaluationError> {
    value.trunc().to_i64().ok_or(EvaluationError::ArithmeticOverflow)
}

fn scaled(amount: Decimal, factor: i64) -> Result<Decimal, EvaluationError> {
    amount
        .checked_mul(Decimal::from(factor))
        .ok_or(EvaluationError::ArithmeticOverflow)
}

/// Splits `amount` of `unit` into months and milliseconds. Fractional months
/// carry into days at 30 days a month.
fn delta_of(amount: Decimal, unit: CalendarUnit) -> Result<Delta, EvaluationError> {
    let millis_of = |factor: i64| -> Result<Delta, EvaluationError> {
        Ok(Delta {
            months: 0,
            millis: to_i64(scaled(amount, factor)?)?,
        })
    };
    match unit {
        CalendarUnit::Year | CalendarUnit::Month => {
            let months = if unit == CalendarUnit::Year {
                scaled(amount, 12)?
            } else {
                amount
            };
            let whole = months.trunc();
            let remainder = scaled(months - whole, DAYS_PER_MONTH * MS_PER_DAY)?;
            Ok(Delta {
                months: to_i64(whole)?,
                millis: to_i64(remainder)?,
            })
        }
        CalendarUnit::Week => millis_of(7 * MS_PER_DAY),
        CalendarUnit::Day => millis_of(MS_PER_DAY),
        CalendarUnit::Hour => millis_of(MS_PER_HOUR),
        CalendarUnit::Minute => millis_of(MS_PER_MINUTE),
        CalendarUnit::Second => millis_of(MS_PER_SECOND),
        CalendarUnit::Millisecond => millis_of(1),
    }
}

/// Drops the part of `delta` finer than `precision`.
fn truncate_delta(delta: Delta, precision: TemporalPrecision) -> Delta {
    match precision {
        TemporalPrecision::Year => {
            let years = delta.months / 12 + delta.millis / (DAYS_PER_YEAR * MS_PER_DAY);
            Delta {
                months: years * 12,
                millis: 0,
            }
        }
        TemporalPrecision::Month => Delta {
            months: delta.months + delta.millis / (DAYS_PER_MONTH * MS_PER_DAY),
            millis: 0,
        },
        TemporalPrecision::Day => Delta {
            months: delta.months,
            millis: delta.millis / MS_PER_DAY * MS_PER_DAY,
        },
        TemporalPrecision::Hour => Delta {
            months: delta.months,
            millis: delta.millis / MS_PER_HOUR * MS_PER_HOUR,
        },
        TemporalPrecision::Minute => Delta {
            months: delta.months,
            millis: delta.millis / MS_PER_MINUTE * MS_PER_MINUTE,
        },
        TemporalPrecision::Second => Delta {
            months: delta.months,
            millis: delta.millis / MS_PER_SECOND * MS_PER_SECOND,
        },
        TemporalPrecision::Millisecond => delta,
    }
}

fn shift_months(value: NaiveDateTime, months: i64) -> Result<NaiveDateTime, EvaluationError> {
    let count = u32::try_from(months.unsigned_abs()).map_err(|_| EvaluationError::ArithmeticOverflow)?;
    let shifted = if months >= 0 {
        value.checked_add_months(Months::new(count))
    } else {
        value.checked_sub_months(Months::new(count))
    };
    shifted.ok_or(EvaluationError::ArithmeticOverflow)
}

fn shift(value: NaiveDateTime, delta: Delta) -> Result<NaiveDateTime, EvaluationError> {
    let value = shift_months(value, delta.months)?;
    let millis = TimeDelta::try_milliseconds(delta.millis).ok_or(EvaluationError::ArithmeticOverflow)?;
    let value = value
        .checked_add_signed(millis)
        .ok_or(EvaluationError::ArithmeticOverflow)?;
    if !(1..=9999).contains(&value.year()) {
        return Err(EvaluationError::ArithmeticOverflow);
    }
    Ok(value)
}

/// `temporal + quantity`, or `temporal - quantity` when `subtract` is set.
pub fn add_quantity(
    value: &Value,
    quantity: &Quantity,
    subtract: bool,
) -> Result<Value, EvaluationError> {
    let unit = duration_unit(quantity)?;
    if !unit_allowed(value, unit) {
        return Err(EvaluationError::InvalidOperation(format!(
            "Cannot add '{}' to a {}",
            quantity.unit,
            value.type_name()
        )));
    }
    let amount = if subtract { -quantity.value } else { quantity.value };
    let delta = delta_of(amount, unit)?;

    match value {
        Value::Date(date) => {
            let delta = truncate_delta(delta, date.precision());
            let start = date.value().and_time(chrono::NaiveTime::MIN);
            Ok(Value::Date(Date::new(shift(start, delta)?.date(), date.precision())))
        }
        Value::DateTime(date_time) => {
            let delta = truncate_delta(delta, date_time.precision());
            Ok(Value::DateTime(DateTime::new(
                shift(date_time.value(), delta)?,
                date_time.offset(),
                date_time.precision(),
            )))
        }
        Value::Time(time) => {
            let delta = truncate_delta(delta, time.precision());
            let millis =
                TimeDelta::try_milliseconds(delta.millis).ok_or(EvaluationError::ArithmeticOverflow)?;
            // Times wrap around midnight.
            let (shifted, _) = time.value().overflowing_add_signed(millis);
            Ok(Value::Time(Time::new(shifted, time.precision())))
        }
        other => Err(EvaluationError::TypeError(format!(
            "Cannot add a quantity to {}",
            other.type_name()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Clock functions
// ---------------------------------------------------------------------------

fn now_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    let now = evaluator.now();
    Ok(EvaluationResult::single(Value::DateTime(DateTime::new(
        now.naive_local(),
        Some(*now.offset()),
        TemporalPrecision::Millisecond,
    ))))
}

fn today_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    let today: NaiveDate = evaluator.now().date_naive();
    Ok(EvaluationResult::single(Value::Date(Date::new(
        today,
        TemporalPrecision::Day,
    ))))
}

fn time_of_day_function(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    Ok(EvaluationResult::single(Value::Time(Time::new(
        evaluator.now().time(),
        TemporalPrecision::Millisecond,
    ))))
}

// ---------------------------------------------------------------------------
// Component extraction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Component {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    TimezoneOffset,
    Date,
    Time,
}

fn integer(value: u32) -> Option<Value> {
    i32::try_from(value).ok().map(Value::Integer)
}

fn time_component(time: &Time, component: Component) -> Option<Value> {
    let precision = time.precision();
    let value = time.value();
    match component {
        Component::Hour => integer(value.hour()),
        Component::Minute if precision >= TemporalPrecision::Minute => integer(value.minute()),
        Component::Second if precision >= TemporalPrecision::Second => integer(value.second()),
        Component::Millisecond if precision >= TemporalPrecision::Millisecond => {
            integer(value.nanosecond() / 1_000_000)
        }
        _ => None,
    }
}

fn date_component(date: &Date, component: Component) -> Option<Value> {
    match component {
        Component::Year => Some(Value::Integer(date.year())),
        Component::Month => date.month().and_then(integer),
        Component::Day => date.day().and_then(integer),
        Component::Date => Some(Value::Date(*date)),
        _ => None,
    }
}

fn extract(value: &Value, component: Component) -> Result<Option<Value>, EvaluationError> {
    Ok(match value {
        Value::Date(date) => date_component(date, component),
        Value::DateTime(date_time) => match component {
            Component::TimezoneOffset => date_time.offset().map(|offset| {
                Value::Decimal(Decimal::from(offset.local_minus_utc()) / Decimal::from(3600))
            }),
            Component::Time => date_time.time().map(Value::Time),
            Component::Hour | Component::Minute | Component::Second | Component::Millisecond => {
                date_time.time().and_then(|time| time_component(&time, component))
            }
            _ => date_component(&date_time.date(), component),
        },
        Value::Time(time) => match component {
            Component::Time => Some(Value::Time(*time)),
            _ => time_component(time, component),
        },
        other => {
            return Err(EvaluationError::TypeError(format!(
                "Cannot extract a date/time component from {}",
                other.type_name()
            )));
        }
    })
}

fn component_function(
    component: Component,
) -> impl Fn(&mut Evaluator<'_>, &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    move |_evaluator, site| {
        site.expect_args(0, 0)?;
        let Some(value) = site.singleton_input()? else {
            return Ok(EvaluationResult::empty());
        };
        Ok(extract(value, component)?
            .map(EvaluationResult::single)
            .unwrap_or_else(EvaluationResult::empty))
    }
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("now", now_function);
    registry.register("today", today_function);
    registry.register("timeOfDay", time_of_day_function);
    for (name, component) in [
        ("yearOf", Component::Year),
        ("monthOf", Component::Month),
        ("dayOf", Component::Day),
        ("hourOf", Component::Hour),
        ("minuteOf", Component::Minute),
        ("secondOf", Component::Second),
        ("millisecondOf", Component::Millisecond),
        ("timezoneOffsetOf", Component::TimezoneOffset),
        ("dateOf", Component::Date),
        ("timeOf", Component::Time),
    ] {
        registry.register(name, component_function(component));
    }
}
