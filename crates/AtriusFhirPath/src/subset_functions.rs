//! # FHIRPath Subsetting Functions
//!
//! Implements the indexer `[n]` and `single()`, `first()`, `last()`,
//! `tail()`, `skip()` and `take()`. Apart from `single()`, these pick items
//! by position, so they reject unordered input while ordered-function checks
//! are enabled.

use atrius_fhirpath_support::{Collection, EvaluationError, EvaluationResult, Value};

use crate::evaluator::{CallSite, Evaluator};
use crate::function_registry::FunctionRegistry;

fn positional(items: &[Value], ordered: bool) -> EvaluationResult {
    EvaluationResult::new(Collection::from_vec(items.to_vec()), ordered)
}

/// Implements the indexer operator `collection[index]`
///
/// # Arguments
///
/// * `input` - The collection being indexed
/// * `index` - The evaluated index expression
///
/// # Returns
///
/// * The item at the zero-based position, or empty when out of range
/// * Empty when the index is empty
/// * `Err` - If the index is not a single Integer, or the input is unordered
///   while ordered-function checks are on
pub fn index(
    evaluator: &mut Evaluator<'_>,
    input: &EvaluationResult,
    index: &EvaluationResult,
) -> Result<EvaluationResult, EvaluationError> {
    let position = match index.singleton("Indexer")? {
        None => return Ok(EvaluationResult::empty()),
        Some(Value::Integer(i)) => i64::from(*i),
        Some(Value::Long(l)) => *l,
        Some(other) => {
            return Err(EvaluationError::InvalidIndex(format!(
                "Index must be an Integer, got {}",
                other.type_name()
            )));
        }
    };
    if evaluator.context().check_ordered_functions() && !input.ordered {
        return Err(EvaluationError::SemanticError(
            "Indexer operation on collection with undefined order is not allowed when checkOrderedFunctions is true."
                .to_string(),
        ));
    }
    Ok(usize::try_from(position)
        .ok()
        .and_then(|i| input.collection.get(i))
        .map(|item| EvaluationResult::single(item.clone()))
        .unwrap_or_else(EvaluationResult::empty))
}

/// Implements the FHIRPath single() function
///
/// Returns the only item of the input, empty for empty input, and fails when
/// the input holds more than one item.
fn single_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    Ok(site
        .singleton_input()?
        .map(|item| EvaluationResult::single(item.clone()))
        .unwrap_or_else(EvaluationResult::empty))
}

fn first_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    site.require_ordered(evaluator)?;
    let items = &site.input.collection;
    Ok(positional(&items[..items.len().min(1)], true))
}

fn last_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    site.require_ordered(evaluator)?;
    let items = &site.input.collection;
    Ok(positional(&items[items.len().saturating_sub(1)..], true))
}

/// Implements the FHIRPath tail() function: all but the first item.
fn tail_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    site.require_ordered(evaluator)?;
    let items = &site.input.collection;
    Ok(positional(&items[items.len().min(1)..], site.input.ordered))
}

fn count_argument(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<Option<usize>, EvaluationError> {
    Ok(evaluator
        .integer_argument(site, 0)?
        .map(|n| usize::try_from(n.max(0)).unwrap_or(usize::MAX)))
}

/// Implements the FHIRPath skip() function
///
/// # Syntax
/// `skip(num: Integer) : collection`
///
/// Drops the first `num` items. A non-positive `num` returns the input, and
/// an empty argument is treated as zero.
fn skip_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    site.require_ordered(evaluator)?;
    let count = count_argument(evaluator, site)?.unwrap_or(0);
    let items = &site.input.collection;
    Ok(positional(&items[count.min(items.len())..], site.input.ordered))
}

/// Implements the FHIRPath take() function
///
/// # Syntax
/// `take(num: Integer) : collection`
///
/// Keeps the first `num` items. A non-positive or empty `num` gives empty.
fn take_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    site.require_ordered(evaluator)?;
    let count = count_argument(evaluator, site)?.unwrap_or(0);
    let items = &site.input.collection;
    Ok(positional(&items[..count.min(items.len())], site.input.ordered))
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("single", single_function);
    registry.register("first", first_function);
    registry.register("last", last_function);
    registry.register("tail", tail_function);
    registry.register("skip", skip_function);
    registry.register("take", take_function);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluationContext;
    use crate::evaluate_expression;

    fn eval(source: &str) -> Result<EvaluationResult, EvaluationError> {
        evaluate_expression(source, &Collection::new(), &EvaluationContext::new())
    }

    fn integers(source: &str) -> Vec<Value> {
        eval(source).unwrap().collection.to_vec()
    }

    #[test]
    fn test_indexer() {
        assert_eq!(integers("(10 | 20 | 30)[1]"), vec![Value::Integer(20)]);
        assert!(integers("(10 | 20 | 30)[5]").is_empty());
        assert!(integers("(10 | 20 | 30)[{}]").is_empty());
        assert!(matches!(eval("(10 | 20)['a']"), Err(EvaluationError::InvalidIndex(_))));
    }

    #[test]
    fn test_indexer_rejects_unordered_input() {
        assert!(matches!(
            eval("(1 | 2).distinct()[0]"),
            Err(EvaluationError::SemanticError(_))
        ));
        let relaxed = EvaluationContext::new().with_ordered_function_checks(false);
        let result = evaluate_expression("(1 | 2).distinct()[0]", &Collection::new(), &relaxed).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_single() {
        assert_eq!(integers("(7).single()"), vec![Value::Integer(7)]);
        assert!(integers("{}.single()").is_empty());
        assert!(matches!(
            eval("(1 | 2).single()"),
            Err(EvaluationError::SingletonEvaluationError(_))
        ));
    }

    #[test]
    fn test_first_last_tail() {
        assert_eq!(integers("(1 | 2 | 3).first()"), vec![Value::Integer(1)]);
        assert_eq!(integers("(1 | 2 | 3).last()"), vec![Value::Integer(3)]);
        assert_eq!(integers("(1 | 2 | 3).tail()"), vec![Value::Integer(2), Value::Integer(3)]);
        assert!(integers("{}.first()").is_empty());
        assert!(eval("(1 | 2).distinct().first()").is_err());
    }

    #[test]
    fn test_skip_and_take() {
        assert_eq!(integers("(1 | 2 | 3).skip(2)"), vec![Value::Integer(3)]);
        assert_eq!(integers("(1 | 2 | 3).skip(-1)").len(), 3);
        assert!(integers("(1 | 2 | 3).skip(10)").is_empty());
        assert_eq!(integers("(1 | 2 | 3).take(2)"), vec![Value::Integer(1), Value::Integer(2)]);
        assert!(integers("(1 | 2 | 3).take(0)").is_empty());
        assert!(integers("(1 | 2 | 3).take({})").is_empty());
    }
}
