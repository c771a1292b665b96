//! # FHIRPath Collection Functions
//!
//! Implements existence, filtering and projection functions: `empty()`,
//! `exists()`, `all()`, `count()`, `where()`, `select()`, `subsetOf()` and
//! `supersetOf()`.

use atrius_fhirpath_support::{Collection, Element, EvaluationError, EvaluationResult, Value};

use crate::evaluator::{CallSite, Evaluator};
use crate::function_registry::FunctionRegistry;
use crate::operators;

/// Reads a criteria result: `None` when empty, the Boolean otherwise.
///
/// # Returns
///
/// * `Err` - If the criteria produced several items or a non-Boolean item
pub fn criterion(result: &EvaluationResult, function: &str) -> Result<Option<bool>, EvaluationError> {
    match result.singleton(&format!("{}() criteria", function))? {
        None => Ok(None),
        Some(Value::Boolean(b)) => Ok(Some(*b)),
        Some(other) => other.to_boolean(false)?.map(Some).ok_or_else(|| {
            EvaluationError::TypeError(format!(
                "{}() criteria must evaluate to a Boolean, got {}",
                function,
                other.type_name()
            ))
        }),
    }
}

/// Items of the input for which `criteria` holds, in input order.
fn filter(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
    position: usize,
) -> Result<Collection, EvaluationError> {
    let criteria = &site.args[position];
    let mut kept = Collection::new();
    for (index, item) in site.input.collection.iter().enumerate() {
        let result = evaluator.evaluate_for_item(criteria, item, index, None)?;
        if criterion(&result, site.name)? == Some(true) {
            kept.push(item.clone());
        }
    }
    Ok(kept)
}

fn empty_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    Ok(EvaluationResult::single(site.input.is_empty()))
}

/// Implements the FHIRPath exists() function
///
/// Without an argument, true when the input has any item. With criteria,
/// true when some item satisfies it (`where(criteria).exists()`).
fn exists_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 1)?;
    if site.args.is_empty() {
        return Ok(EvaluationResult::single(!site.input.is_empty()));
    }
    Ok(EvaluationResult::single(!filter(evaluator, site, 0)?.is_empty()))
}

/// Implements the FHIRPath all() function
///
/// True when the criteria holds for every item; true for empty input.
fn all_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let criteria = &site.args[0];
    for (index, item) in site.input.collection.iter().enumerate() {
        let result = evaluator.evaluate_for_item(criteria, item, index, None)?;
        if criterion(&result, site.name)? != Some(true) {
            return Ok(EvaluationResult::single(false));
        }
    }
    Ok(EvaluationResult::single(true))
}

fn count_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    let count = i32::try_from(site.input.len()).map_err(|_| EvaluationError::ArithmeticOverflow)?;
    Ok(EvaluationResult::single(count))
}

/// Implements the FHIRPath where() function
///
/// Keeps the items for which the criteria evaluates to true. An empty
/// criteria result drops the item. The input's ordering is preserved.
fn where_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let kept = filter(evaluator, site, 0)?;
    Ok(EvaluationResult::new(kept, site.input.ordered))
}

/// Implements the FHIRPath select() function
///
/// Evaluates the projection for each item and flattens the results.
fn select_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let projection = &site.args[0];
    let mut projected = Collection::new();
    let mut ordered = site.input.ordered;
    for (index, item) in site.input.collection.iter().enumerate() {
        let result = evaluator.evaluate_for_item(projection, item, index, None)?;
        ordered &= result.ordered;
        projected.extend(result.collection);
    }
    Ok(EvaluationResult::new(projected, ordered))
}

fn is_subset(evaluator: &Evaluator<'_>, subset: &Collection, superset: &Collection) -> bool {
    subset
        .iter()
        .all(|item| operators::contains_equal(evaluator.context(), superset, item))
}

fn subset_of_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let other = evaluator.evaluate_argument(site, 0)?;
    Ok(EvaluationResult::single(is_subset(
        evaluator,
        &site.input.collection,
        &other.collection,
    )))
}

fn superset_of_function(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let other = evaluator.evaluate_argument(site, 0)?;
    Ok(EvaluationResult::single(is_subset(
        evaluator,
        &other.collection,
        &site.input.collection,
    )))
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("empty", empty_function);
    registry.register("exists", exists_function);
    registry.register("all", all_function);
    registry.register("count", count_function);
    registry.register("where", where_function);
    registry.register("select", select_function);
    registry.register("subsetOf", subset_of_function);
    registry.register("supersetOf", superset_of_function);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluationContext;
    use crate::evaluate_expression;

    fn eval(source: &str) -> Result<EvaluationResult, EvaluationError> {
        evaluate_expression(source, &Collection::new(), &EvaluationContext::new())
    }

    #[test]
    fn test_empty_and_exists() {
        assert_eq!(eval("{}.empty()").unwrap().collection[0], Value::Boolean(true));
        assert_eq!(eval("(1).empty()").unwrap().collection[0], Value::Boolean(false));
        assert_eq!(eval("(1 | 2).exists($this > 1)").unwrap().collection[0], Value::Boolean(true));
        assert_eq!(eval("(1 | 2).exists($this > 5)").unwrap().collection[0], Value::Boolean(false));
        assert!(eval("{}.empty(1)").is_err());
    }

    #[test]
    fn test_where_preserves_order_flag() {
        let result = eval("(1 | 2 | 3).where($this > 2)").unwrap();
        assert_eq!(result.collection.to_vec(), vec![Value::Integer(3)]);
        assert!(result.ordered);

        let result = eval("(1 | 2 | 3).distinct().where($this > 1)").unwrap();
        assert!(!result.ordered);
    }

    #[test]
    fn test_where_criteria_must_be_boolean() {
        assert!(matches!(
            eval("(1 | 2).where('yes')"),
            Err(EvaluationError::TypeError(_))
        ));
        assert!(eval("(1 | 2).where({})").unwrap().is_empty());
    }

    #[test]
    fn test_select_flattens() {
        let result = eval("(1 | 2).select($this | ($this * 10))").unwrap();
        assert_eq!(
            result.collection.to_vec(),
            vec![Value::Integer(1), Value::Integer(10), Value::Integer(2), Value::Integer(20)]
        );
    }

    #[test]
    fn test_all_and_count() {
        assert_eq!(eval("{}.all($this > 0)").unwrap().collection[0], Value::Boolean(true));
        assert_eq!(eval("(1 | 2).all($this > 1)").unwrap().collection[0], Value::Boolean(false));
        assert_eq!(eval("(1 | 2 | 3).count()").unwrap().collection[0], Value::Integer(3));
    }

    #[test]
    fn test_subset_and_superset() {
        assert_eq!(eval("(1 | 2).subsetOf(1 | 2 | 3)").unwrap().collection[0], Value::Boolean(true));
        assert_eq!(eval("(1 | 4).subsetOf(1 | 2 | 3)").unwrap().collection[0], Value::Boolean(false));
        assert_eq!(eval("(1 | 2 | 3).supersetOf(2)").unwrap().collection[0], Value::Boolean(true));
        assert_eq!(eval("{}.subsetOf(1)").unwrap().collection[0], Value::Boolean(true));
    }
}
