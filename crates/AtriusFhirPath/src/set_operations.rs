//! # FHIRPath Set Operations
//!
//! Implements `distinct()`, `isDistinct()`, `union()`, `combine()`,
//! `intersect()` and `exclude()`. Items are matched with `=` semantics.
//!
//! The results of `distinct`, `union`, `combine` and `intersect` carry no
//! meaningful order and are reported unordered; `exclude` keeps the input's
//! order.

use atrius_fhirpath_support::{Collection, EvaluationError, EvaluationResult, Value};

use crate::context::EvaluationContext;
use crate::evaluator::{CallSite, Evaluator};
use crate::function_registry::FunctionRegistry;
use crate::operators::contains_equal;

/// The items of `items` without later duplicates, first occurrence kept.
pub fn distinct_values(context: &EvaluationContext, items: &[Value]) -> Collection {
    let mut unique: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !contains_equal(context, &unique, item) {
            unique.push(item.clone());
        }
    }
    Collection::from_vec(unique)
}

/// Items of `left` then items of `right`, without duplicates.
pub fn union_values(context: &EvaluationContext, left: &[Value], right: &[Value]) -> Collection {
    let mut unique = distinct_values(context, left).into_vec();
    for item in right {
        if !contains_equal(context, &unique, item) {
            unique.push(item.clone());
        }
    }
    Collection::from_vec(unique)
}

fn distinct_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    Ok(EvaluationResult::unordered(distinct_values(
        evaluator.context(),
        &site.input.collection,
    )))
}

fn is_distinct_function(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    let unique = distinct_values(evaluator.context(), &site.input.collection);
    Ok(EvaluationResult::single(unique.len() == site.input.len()))
}

fn union_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let other = evaluator.evaluate_argument(site, 0)?;
    Ok(EvaluationResult::unordered(union_values(
        evaluator.context(),
        &site.input.collection,
        &other.collection,
    )))
}

/// Implements the FHIRPath combine() function: concatenation that keeps
/// duplicates.
fn combine_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let other = evaluator.evaluate_argument(site, 0)?;
    let mut combined = site.input.collection.clone();
    combined.extend(other.collection);
    Ok(EvaluationResult::unordered(combined))
}

fn intersect_function(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let other = evaluator.evaluate_argument(site, 0)?;
    let context = evaluator.context();
    let shared: Vec<Value> = site
        .input
        .collection
        .iter()
        .filter(|item| contains_equal(context, &other.collection, item))
        .cloned()
        .collect();
    Ok(EvaluationResult::unordered(distinct_values(context, &shared)))
}

/// Implements the FHIRPath exclude() function: the input minus every item
/// found in the argument, duplicates and order kept.
fn exclude_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let other = evaluator.evaluate_argument(site, 0)?;
    let context = evaluator.context();
    let remaining = site
        .input
        .collection
        .iter()
        .filter(|item| !contains_equal(context, &other.collection, item))
        .cloned()
        .collect();
    Ok(EvaluationResult::new(remaining, site.input.ordered))
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("distinct", distinct_function);
    registry.register("isDistinct", is_distinct_function);
    registry.register("union", union_function);
    registry.register("combine", combine_function);
    registry.register("intersect", intersect_function);
    registry.register("exclude", exclude_function);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate_expression;

    fn eval(source: &str) -> EvaluationResult {
        evaluate_expression(source, &Collection::new(), &EvaluationContext::new()).unwrap()
    }

    #[test]
    fn test_distinct_is_unordered_and_idempotent() {
        let once = eval("(1 | 2).combine(1 | 3).distinct()");
        let twice = eval("(1 | 2).combine(1 | 3).distinct().distinct()");
        assert!(!once.ordered);
        assert_eq!(once.collection, twice.collection);
        assert_eq!(once.len(), 3);
    }

    #[test]
    fn test_is_distinct() {
        assert_eq!(eval("(1 | 2).isDistinct()").collection[0], Value::Boolean(true));
        assert_eq!(eval("(1 | 2).combine(2).isDistinct()").collection[0], Value::Boolean(false));
    }

    #[test]
    fn test_union_function_and_operator() {
        let function = eval("(1 | 2).union(2 | 3)");
        assert_eq!(function.len(), 3);
        assert!(!function.ordered);
        let operator = eval("(1 | 1 | 2)");
        assert_eq!(operator.collection.to_vec(), vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn test_combine_keeps_duplicates() {
        assert_eq!(eval("(1 | 2).combine(1 | 2)").len(), 4);
    }

    #[test]
    fn test_intersect_and_exclude() {
        let shared = eval("(1 | 2 | 3).intersect(2 | 3 | 4)");
        assert_eq!(shared.collection.to_vec(), vec![Value::Integer(2), Value::Integer(3)]);
        let rest = eval("(1 | 2 | 3).combine(1).exclude(2)");
        assert_eq!(
            rest.collection.to_vec(),
            vec![Value::Integer(1), Value::Integer(3), Value::Integer(1)]
        );
    }
}
