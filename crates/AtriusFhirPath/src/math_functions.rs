//! # FHIRPath Math Functions
//!
//! Implements `abs()`, `ceiling()`, `floor()`, `truncate()`, `round()`,
//! `exp()`, `ln()`, `log()`, `power()` and `sqrt()` over Integer, Long and
//! Decimal input (`abs()` also accepts a Quantity).
//!
//! Results outside the domain of the function (the logarithm of a negative
//! number, an overflowing power) are empty rather than errors.

use atrius_fhirpath_support::{EvaluationError, EvaluationResult, Quantity, Value};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};

use crate::evaluator::{CallSite, Evaluator};
use crate::function_registry::FunctionRegistry;

fn numeric_input<'a>(site: &'a CallSite<'_>) -> Result<Option<&'a Value>, EvaluationError> {
    match site.singleton_input()? {
        None => Ok(None),
        Some(value @ (Value::Integer(_) | Value::Long(_) | Value::Decimal(_))) => Ok(Some(value)),
        Some(other) => Err(EvaluationError::TypeError(format!(
            "{}() requires a numeric input, got {}",
            site.name,
            other.type_name()
        ))),
    }
}

fn decimal_input(site: &CallSite<'_>) -> Result<Option<Decimal>, EvaluationError> {
    Ok(numeric_input(site)?.and_then(Value::numeric_value))
}

fn optional(value: Option<Value>) -> EvaluationResult {
    value
        .map(EvaluationResult::single)
        .unwrap_or_else(EvaluationResult::empty)
}

/// An integral Decimal as Integer, or Long when it does not fit.
fn integral(d: Decimal) -> Option<Value> {
    match d.to_i32() {
        Some(i) => Some(Value::Integer(i)),
        None => d.to_i64().map(Value::Long),
    }
}

fn finish(evaluator: &Evaluator<'_>, d: Option<Decimal>) -> EvaluationResult {
    optional(d.map(|d| Value::Decimal(evaluator.context().decimal_context().apply(d).normalize())))
}

/// Implements the FHIRPath abs() function
///
/// Integer, Long, Decimal and Quantity inputs keep their type; the unit of a
/// Quantity is preserved.
fn abs_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    let value = match site.singleton_input()? {
        None => None,
        Some(Value::Integer(i)) => i.checked_abs().map(Value::Integer),
        Some(Value::Long(l)) => l.checked_abs().map(Value::Long),
        Some(Value::Decimal(d)) => Some(Value::Decimal(d.abs())),
        Some(Value::Quantity(q)) => Some(Value::Quantity(Quantity::new(q.value.abs(), q.unit.clone()))),
        Some(other) => {
            return Err(EvaluationError::TypeError(format!(
                "abs() requires a numeric or Quantity input, got {}",
                other.type_name()
            )));
        }
    };
    Ok(optional(value))
}

fn rounding_function(
    round: fn(&Decimal) -> Decimal,
) -> impl Fn(&mut Evaluator<'_>, &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    move |_evaluator, site| {
        site.expect_args(0, 0)?;
        let value = match numeric_input(site)? {
            None => None,
            Some(integer @ (Value::Integer(_) | Value::Long(_))) => Some(integer.clone()),
            Some(other) => other.numeric_value().and_then(|d| integral(round(&d))),
        };
        Ok(optional(value))
    }
}

/// Implements the FHIRPath round() function
///
/// # Syntax
/// `round([precision: Integer]) : Decimal`
///
/// Rounds half away from zero to `precision` decimal places (default 0).
///
/// # Returns
///
/// * `Err` - If `precision` is negative
fn round_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 1)?;
    let Some(value) = decimal_input(site)? else {
        return Ok(EvaluationResult::empty());
    };
    let places = evaluator.integer_argument(site, 0)?.unwrap_or(0);
    let places = u32::try_from(places).map_err(|_| {
        EvaluationError::InvalidArgument(format!("round() precision must be non-negative, got {}", places))
    })?;
    let rounded = evaluator.context().decimal_context().round_dp(value, places);
    Ok(EvaluationResult::single(rounded))
}

fn exp_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    let result = decimal_input(site)?.and_then(|d| d.checked_exp());
    Ok(finish(evaluator, result))
}

/// Implements the FHIRPath ln() function; empty for non-positive input.
fn ln_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    let result = decimal_input(site)?
        .filter(|d| d.is_sign_positive() && !d.is_zero())
        .and_then(|d| d.checked_ln());
    Ok(finish(evaluator, result))
}

/// Implements the FHIRPath log() function
///
/// # Syntax
/// `log(base: Decimal) : Decimal`
fn log_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let Some(value) = decimal_input(site)? else {
        return Ok(EvaluationResult::empty());
    };
    let base = evaluator.evaluate_argument(site, 0)?;
    let Some(base) = base.singleton("log() base")?.and_then(Value::numeric_value) else {
        return Ok(EvaluationResult::empty());
    };
    let positive = |d: &Decimal| d.is_sign_positive() && !d.is_zero();
    if !positive(&value) || !positive(&base) || base == Decimal::ONE {
        return Ok(EvaluationResult::empty());
    }
    let result = match (value.checked_ln(), base.checked_ln()) {
        (Some(numerator), Some(denominator)) => numerator.checked_div(denominator),
        _ => None,
    };
    Ok(finish(evaluator, result))
}

/// Implements the FHIRPath power() function
///
/// # Syntax
/// `power(exponent: Integer | Decimal) : Integer | Decimal`
///
/// An Integer raised to a non-negative Integer stays an Integer; otherwise
/// the result is a Decimal. A negative base with a fractional exponent has
/// no real result and gives empty.
fn power_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let Some(base) = numeric_input(site)?.cloned() else {
        return Ok(EvaluationResult::empty());
    };
    let exponent = evaluator.evaluate_argument(site, 0)?;
    let exponent = match exponent.singleton("power() exponent")? {
        None => return Ok(EvaluationResult::empty()),
        Some(value @ (Value::Integer(_) | Value::Long(_) | Value::Decimal(_))) => value.clone(),
        Some(other) => {
            return Err(EvaluationError::TypeError(format!(
                "power() requires a numeric exponent, got {}",
                other.type_name()
            )));
        }
    };

    if let Some(e) = exponent_as_long(&exponent).filter(|e| *e >= 0) {
        let e = u32::try_from(e).ok();
        match &base {
            Value::Integer(b) => {
                return Ok(optional(e.and_then(|e| b.checked_pow(e)).map(Value::Integer)));
            }
            Value::Long(b) => {
                return Ok(optional(e.and_then(|e| b.checked_pow(e)).map(Value::Long)));
            }
            _ => {}
        }
    }

    let (Some(b), Some(e)) = (base.numeric_value(), exponent.numeric_value()) else {
        return Ok(EvaluationResult::empty());
    };
    let result = if e.fract().is_zero() {
        e.to_i64().and_then(|e| b.checked_powi(e))
    } else if b.is_sign_negative() && !b.is_zero() {
        None
    } else {
        b.checked_powd(e)
    };
    Ok(finish(evaluator, result))
}

fn exponent_as_long(exponent: &Value) -> Option<i64> {
    match exponent {
        Value::Integer(i) => Some(i64::from(*i)),
        Value::Long(l) => Some(*l),
        _ => None,
    }
}

/// Implements the FHIRPath sqrt() function; empty for negative input.
fn sqrt_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    let result = decimal_input(site)?.and_then(|d| d.sqrt());
    Ok(finish(evaluator, result))
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("abs", abs_function);
    registry.register("ceiling", rounding_function(Decimal::ceil));
    registry.register("floor", rounding_function(Decimal::floor));
    registry.register("truncate", rounding_function(Decimal::trunc));
    registry.register("round", round_function);
    registry.register("exp", exp_function);
    registry.register("ln", ln_function);
    registry.register("log", log_function);
    registry.register("power", power_function);
    registry.register("sqrt", sqrt_function);
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
    fn test_abs() {
        assert_eq!(value("(-5).abs()"), Value::Integer(5));
        assert_eq!(value("(-5.5).abs()"), Value::Decimal(dec!(5.5)));
        assert_eq!(value("(-5.5 'mg').abs()"), Value::Quantity(Quantity::new(dec!(5.5), "mg")));
        assert!(eval("'a'.abs()").is_err());
    }

    #[test]
    fn test_rounding_family_returns_integers() {
        assert_eq!(value("1.1.ceiling()"), Value::Integer(2));
        assert_eq!(value("(-1.1).ceiling()"), Value::Integer(-1));
        assert_eq!(value("1.9.floor()"), Value::Integer(1));
        assert_eq!(value("(-1.9).truncate()"), Value::Integer(-1));
        assert_eq!(value("5.truncate()"), Value::Integer(5));
    }

    #[test]
    fn test_round() {
        assert_eq!(value("3.14159.round(3)"), Value::Decimal(dec!(3.142)));
        assert_eq!(value("2.5.round()"), Value::Decimal(dec!(3)));
        assert!(matches!(
            eval("1.5.round(-1)"),
            Err(EvaluationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_power() {
        assert_eq!(value("2.power(10)"), Value::Integer(1024));
        assert_eq!(value("2.power(-1)"), Value::Decimal(dec!(0.5)));
        assert_eq!(value("2.5.power(2)"), Value::Decimal(dec!(6.25)));
        assert!(eval("(-8).power(0.5)").unwrap().is_empty());
        assert!(eval("2.power(100)").unwrap().is_empty());
    }

    #[test]
    fn test_logarithms_and_roots() {
        assert_eq!(value("16.sqrt().round(6)"), Value::Decimal(dec!(4)));
        assert!(eval("(-1).sqrt()").unwrap().is_empty());
        assert_eq!(value("0.exp()"), Value::Decimal(dec!(1)));
        assert!(eval("0.ln()").unwrap().is_empty());
        assert_eq!(value("100.log(10).round(6)"), Value::Decimal(dec!(2)));
        assert!(eval("{}.ln()").unwrap().is_empty());
    }
}
