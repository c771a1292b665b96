//! # FHIRPath Type Conversion Functions
//!
//! Implements `iif()` and the `toX()`/`convertsToX()` pairs for Boolean,
//! Integer, Long, Decimal, String, Date, DateTime, Time and Quantity.
//!
//! A `toX()` function returns empty when the input has no representation as
//! `X` and fails when the input text has the right shape but names an
//! impossible value (`'2023-02-30'.toDate()`). The matching `convertsToX()`
//! reports `false` in both cases.

use atrius_fhirpath_support::{Element, EvaluationError, EvaluationResult, Quantity, Value};

use crate::collection_functions::criterion;
use crate::evaluator::{CallSite, Evaluator};
use crate::function_registry::FunctionRegistry;
use crate::ucum::calendar_to_ucum_unit;

type Converter = fn(&Value) -> Result<Option<Value>, EvaluationError>;

fn to_boolean(value: &Value) -> Result<Option<Value>, EvaluationError> {
    Ok(value.to_boolean(true)?.map(Value::Boolean))
}

fn to_integer(value: &Value) -> Result<Option<Value>, EvaluationError> {
    Ok(value.to_integer(true)?.map(Value::Integer))
}

fn to_long(value: &Value) -> Result<Option<Value>, EvaluationError> {
    Ok(value.to_long(true)?.map(Value::Long))
}

fn to_decimal(value: &Value) -> Result<Option<Value>, EvaluationError> {
    Ok(value.to_decimal(true)?.map(Value::Decimal))
}

fn to_string(value: &Value) -> Result<Option<Value>, EvaluationError> {
    Ok(value.to_string_value(true)?.map(Value::String))
}

fn to_date(value: &Value) -> Result<Option<Value>, EvaluationError> {
    Ok(value.to_date(true)?.map(Value::Date))
}

fn to_date_time(value: &Value) -> Result<Option<Value>, EvaluationError> {
    Ok(value.to_date_time(true)?.map(Value::DateTime))
}

fn to_time(value: &Value) -> Result<Option<Value>, EvaluationError> {
    Ok(value.to_time(true)?.map(Value::Time))
}

fn to_function(
    converter: Converter,
) -> impl Fn(&mut Evaluator<'_>, &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    move |_evaluator, site| {
        site.expect_args(0, 0)?;
        let Some(value) = site.singleton_input()? else {
            return Ok(EvaluationResult::empty());
        };
        Ok(converter(value)?
            .map(EvaluationResult::single)
            .unwrap_or_else(EvaluationResult::empty))
    }
}

fn converts_to_function(
    converter: Converter,
) -> impl Fn(&mut Evaluator<'_>, &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    move |_evaluator, site| {
        site.expect_args(0, 0)?;
        let Some(value) = site.singleton_input()? else {
            return Ok(EvaluationResult::empty());
        };
        Ok(EvaluationResult::single(matches!(converter(value), Ok(Some(_)))))
    }
}

/// Converts `value` to a Quantity, optionally expressed in `unit`.
///
/// A failed unit conversion gives `None` rather than an error so that
/// `convertsToQuantity(unit)` can report it as `false`.
fn quantity_in(
    evaluator: &Evaluator<'_>,
    value: &Value,
    unit: Option<&str>,
) -> Result<Option<Quantity>, EvaluationError> {
    let Some(quantity) = value.to_quantity(true)? else {
        return Ok(None);
    };
    let Some(unit) = unit else {
        return Ok(Some(quantity));
    };
    if quantity.unit == unit {
        return Ok(Some(quantity));
    }
    let context = evaluator.context();
    let converted = context.unit_converter().convert(
        quantity.value,
        quantity.ucum_unit(),
        calendar_to_ucum_unit(unit),
        context.decimal_context(),
    );
    Ok(converted.ok().map(|value| Quantity::new(value, unit)))
}

/// Implements the FHIRPath toQuantity() function
///
/// # Syntax
/// `toQuantity([unit: String]) : Quantity`
///
/// Numbers become unitless quantities and strings are parsed as quantity
/// literals. With `unit`, the result is converted into that unit and an
/// impossible conversion gives empty.
///
/// # Examples
///
/// ```text
/// 4000 'mg'.toQuantity('g')   // 4 'g'
/// '5 days'.toQuantity()        // 5 days
/// 1 'm'.toQuantity('kg')       // { }
/// ```
fn to_quantity_function(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 1)?;
    let Some(value) = site.singleton_input()? else {
        return Ok(EvaluationResult::empty());
    };
    let unit = evaluator.string_argument(site, 0)?;
    Ok(quantity_in(evaluator, value, unit.as_deref())?
        .map(EvaluationResult::single)
        .unwrap_or_else(EvaluationResult::empty))
}

fn converts_to_quantity_function(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 1)?;
    let Some(value) = site.singleton_input()? else {
        return Ok(EvaluationResult::empty());
    };
    let unit = evaluator.string_argument(site, 0)?;
    let converts = matches!(quantity_in(evaluator, value, unit.as_deref()), Ok(Some(_)));
    Ok(EvaluationResult::single(converts))
}

/// Implements the FHIRPath iif() function
///
/// # Syntax
/// `iif(criterion: expression, true-result: collection [, otherwise-result: collection]) : collection`
///
/// Only the selected branch is evaluated. An empty criterion selects the
/// otherwise branch.
///
/// # Returns
///
/// * `Err` - If the input has more than one item, or the criterion is not a
///   Boolean
fn iif_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(2, 3)?;
    if site.input.len() > 1 {
        return Err(EvaluationError::singleton("iif() input", site.input.len()));
    }
    let condition = evaluator.evaluate_argument_on_input(site, 0)?;
    let branch = if criterion(&condition, site.name)? == Some(true) { 1 } else { 2 };
    evaluator.evaluate_argument_on_input(site, branch)
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("iif", iif_function);
    let converters: [(&str, &str, Converter); 8] = [
        ("toBoolean", "convertsToBoolean", to_boolean),
        ("toInteger", "convertsToInteger", to_integer),
        ("toLong", "convertsToLong", to_long),
        ("toDecimal", "convertsToDecimal", to_decimal),
        ("toString", "convertsToString", to_string),
        ("toDate", "convertsToDate", to_date),
        ("toDateTime", "convertsToDateTime", to_date_time),
        ("toTime", "convertsToTime", to_time),
    ];
    for (to, converts_to, converter) in converters {
        registry.register(to, to_function(converter));
        registry.register(converts_to, converts_to_function(converter));
    }
    registry.register("toQuantity", to_quantity_function);
    registry.register("convertsToQuantity", converts_to_quantity_function);
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

    #[test]
    fn test_iif_short_circuits() {
        assert_eq!(value("iif(true, 'a', 1 / 0)"), Value::string("a"));
        assert_eq!(value("iif(false, (1 | 2).single(), 'b')"), Value::string("b"));
        assert!(eval("iif({}, 'a')").unwrap().is_empty());
    }

    #[test]
    fn test_iif_rejects_multiple_inputs_and_non_boolean_criteria() {
        assert!(matches!(
            eval("(1 | 2).iif(true, 1)"),
            Err(EvaluationError::SingletonEvaluationError(_))
        ));
        assert!(matches!(eval("iif('true', 1, 2)"), Err(EvaluationError::TypeError(_))));
    }

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(value("'true'.toBoolean()"), Value::Boolean(true));
        assert_eq!(value("'42'.toInteger()"), Value::Integer(42));
        assert_eq!(value("42.toLong()"), Value::Long(42));
        assert_eq!(value("'1.50'.toDecimal()"), Value::Decimal(dec!(1.50)));
        assert_eq!(value("true.toString()"), Value::string("true"));
        assert!(eval("'abc'.toInteger()").unwrap().is_empty());
    }

    #[test]
    fn test_converts_to() {
        assert_eq!(value("'12'.convertsToInteger()"), Value::Boolean(true));
        assert_eq!(value("'1.2'.convertsToInteger()"), Value::Boolean(false));
        assert_eq!(value("'2023-02-30'.convertsToDate()"), Value::Boolean(false));
        assert_eq!(value("'2023-02'.convertsToDate()"), Value::Boolean(true));
        assert!(eval("{}.convertsToString()").unwrap().is_empty());
    }

    #[test]
    fn test_impossible_date_text_fails_conversion() {
        assert!(eval("'2023-02-30'.toDate()").is_err());
        assert!(eval("'not a date'.toDate()").unwrap().is_empty());
    }

    #[test]
    fn test_to_quantity_with_unit() {
        assert_eq!(value("4000 'mg'.toQuantity('g')"), Value::Quantity(Quantity::new(dec!(4), "g")));
        assert!(eval("1 'm'.toQuantity('kg')").unwrap().is_empty());
        assert_eq!(value("'5 days'.toQuantity()"), Value::Quantity(Quantity::new(dec!(5), "days")));
        assert_eq!(value("1 'm'.convertsToQuantity('kg')"), Value::Boolean(false));
        assert_eq!(value("2.toQuantity()"), Value::Quantity(Quantity::unitless(dec!(2))));
    }
}
