//! # FHIRPath Aggregate Functions
//!
//! Implements `aggregate()`, the general-purpose fold over a collection, and
//! the `sum()`, `min()`, `max()` and `avg()` helpers built on the same
//! arithmetic and ordering as the operators.

use std::cmp::Ordering;

use atrius_fhirpath_support::{EvaluationError, EvaluationResult, Value};

use crate::ast::BinaryOperator;
use crate::evaluator::{CallSite, Evaluator};
use crate::function_registry::FunctionRegistry;
use crate::operators;

/// Implements the FHIRPath aggregate() function
///
/// # Syntax
/// `aggregate(aggregator: expression [, init: value]) : value`
///
/// Evaluates `aggregator` once per item with `$this` bound to the item and
/// `$total` bound to the running result, which starts as `init` (empty when
/// omitted).
///
/// # Examples
///
/// ```text
/// (1 | 2 | 3).aggregate($this + $total, 0)            // 6
/// (1 | 2 | 3).aggregate(iif($total.empty(), $this,
///     iif($this < $total, $this, $total)))              // 1
/// ```
fn aggregate_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 2)?;
    let aggregator = &site.args[0];
    let mut total = evaluator.evaluate_argument(site, 1)?;
    for (index, item) in site.input.collection.iter().enumerate() {
        total = evaluator.evaluate_for_item(aggregator, item, index, Some(total.collection))?;
    }
    Ok(total)
}

fn summable(site: &CallSite<'_>) -> Result<(), EvaluationError> {
    match site
        .input
        .collection
        .iter()
        .find(|item| !item.is_numeric() && !matches!(item, Value::Quantity(_)))
    {
        Some(item) => Err(EvaluationError::TypeError(format!(
            "{}() requires numeric or Quantity items, got {}",
            site.name,
            item.type_name()
        ))),
        None => Ok(()),
    }
}

fn total(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    let mut items = site.input.collection.iter();
    let Some(first) = items.next() else {
        return Ok(EvaluationResult::empty());
    };
    let mut acc = EvaluationResult::single(first.clone());
    for item in items {
        acc = operators::binary(evaluator, BinaryOperator::Add, &acc, &EvaluationResult::single(item.clone()))?;
        if acc.is_empty() {
            break;
        }
    }
    Ok(acc)
}

/// Implements the FHIRPath sum() function; `0` for empty input.
fn sum_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    summable(site)?;
    if site.input.is_empty() {
        return Ok(EvaluationResult::single(0));
    }
    total(evaluator, site)
}

/// Implements the FHIRPath avg() function: the sum divided by the count, as
/// a Decimal (or Quantity).
fn avg_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    summable(site)?;
    if site.input.is_empty() {
        return Ok(EvaluationResult::empty());
    }
    let sum = total(evaluator, site)?;
    let count = i32::try_from(site.input.len()).map_err(|_| EvaluationError::ArithmeticOverflow)?;
    operators::binary(evaluator, BinaryOperator::Divide, &sum, &EvaluationResult::single(count))
}

fn extreme(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
    wanted: Ordering,
) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    let context = evaluator.context();
    let mut items = site.input.collection.iter();
    let Some(mut best) = items.next() else {
        return Ok(EvaluationResult::empty());
    };
    for item in items {
        match operators::compare_values(context, item, best)? {
            Some(order) if order == wanted => best = item,
            Some(_) => {}
            None => return Ok(EvaluationResult::empty()),
        }
    }
    Ok(EvaluationResult::single(best.clone()))
}

/// Implements the FHIRPath min() function over comparable items. Items
/// whose ordering is undetermined (differing precisions) give empty.
fn min_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    extreme(evaluator, site, Ordering::Less)
}

fn max_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    extreme(evaluator, site, Ordering::Greater)
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("aggregate", aggregate_function);
    registry.register("sum", sum_function);
    registry.register("avg", avg_function);
    registry.register("min", min_function);
    registry.register("max", max_function);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluationContext;
    use crate::evaluate_expression;
    use atrius_fhirpath_support::{Collection, Quantity};
    use rust_decimal_macros::dec;

    fn eval(source: &str) -> Result<EvaluationResult, EvaluationError> {
        evaluate_expression(source, &Collection::new(), &EvaluationContext::new())
    }

    fn value(source: &str) -> Value {
        eval(source).unwrap().collection[0].clone()
    }

    #[test]
    fn test_aggregate_with_init() {
        assert_eq!(value("(1 | 2 | 3).aggregate($this + $total, 0)"), Value::Integer(6));
        assert_eq!(
            value("(1 | 2 | 3).aggregate($total + $index, 10)"),
            Value::Integer(13)
        );
    }

    #[test]
    fn test_aggregate_without_init() {
        assert_eq!(
            value("(5 | 2 | 8).aggregate(iif($total.empty(), $this, iif($this < $total, $this, $total)))"),
            Value::Integer(2)
        );
        assert!(eval("{}.aggregate($this + $total)").unwrap().is_empty());
    }

    #[test]
    fn test_sum_and_avg() {
        assert_eq!(value("(1 | 2 | 3).sum()"), Value::Integer(6));
        assert_eq!(value("(1 | 2.5).sum()"), Value::Decimal(dec!(3.5)));
        assert_eq!(value("{}.sum()"), Value::Integer(0));
        assert_eq!(value("(1 | 2 | 3 | 4).avg()"), Value::Decimal(dec!(2.5)));
        assert!(eval("{}.avg()").unwrap().is_empty());
        assert!(matches!(eval("('a' | 'b').sum()"), Err(EvaluationError::TypeError(_))));
    }

    #[test]
    fn test_quantity_sum() {
        assert_eq!(
            value("(1 'mg' | 2 'mg').sum()"),
            Value::Quantity(Quantity::new(dec!(3), "mg"))
        );
    }

    #[test]
    fn test_min_and_max() {
        assert_eq!(value("(3 | 1 | 2).min()"), Value::Integer(1));
        assert_eq!(value("(3 | 1 | 2).max()"), Value::Integer(3));
        assert_eq!(value("('b' | 'a').min()"), Value::string("a"));
        assert!(eval("{}.max()").unwrap().is_empty());
        assert!(eval("(1 | 'a').max()").is_err());
    }
}
