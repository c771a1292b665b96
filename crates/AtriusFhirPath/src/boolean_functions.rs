//! # FHIRPath Boolean Functions
//!
//! Implements `allTrue()`, `anyTrue()`, `allFalse()`, `anyFalse()` and `not()`.
//! The collection forms require every item to be a Boolean.

use atrius_fhirpath_support::{Element, EvaluationError, EvaluationResult, Value};

use crate::evaluator::{CallSite, Evaluator};
use crate::function_registry::FunctionRegistry;

fn booleans(site: &CallSite<'_>) -> Result<Vec<bool>, EvaluationError> {
    site.input
        .collection
        .iter()
        .map(|item| {
            item.to_boolean(false)?.ok_or_else(|| {
                EvaluationError::TypeError(format!(
                    "{}() expects a collection of Booleans, found {}",
                    site.name,
                    item.type_name()
                ))
            })
        })
        .collect()
}

/// Implements the FHIRPath allTrue() function
///
/// # Returns
///
/// * `true` - If every item is true, or the input is empty
/// * `false` - If any item is false
/// * `Err` - If any item is not a Boolean
fn all_true_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    Ok(EvaluationResult::single(booleans(site)?.iter().all(|b| *b)))
}

/// Implements the FHIRPath anyTrue() function; false for empty input.
fn any_true_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    Ok(EvaluationResult::single(booleans(site)?.iter().any(|b| *b)))
}

fn all_false_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    Ok(EvaluationResult::single(booleans(site)?.iter().all(|b| !*b)))
}

fn any_false_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    Ok(EvaluationResult::single(booleans(site)?.iter().any(|b| !*b)))
}

/// Implements the FHIRPath not() function
///
/// Negates a single Boolean. Empty input gives empty; a single non-Boolean
/// item counts as true, so its negation is false.
fn not_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    let value = match site.singleton_input()? {
        None => return Ok(EvaluationResult::empty()),
        Some(Value::Boolean(b)) => *b,
        Some(other) => other.to_boolean(false)?.unwrap_or(true),
    };
    Ok(EvaluationResult::single(!value))
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("allTrue", all_true_function);
    registry.register("anyTrue", any_true_function);
    registry.register("allFalse", all_false_function);
    registry.register("anyFalse", any_false_function);
    registry.register("not", not_function);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluationContext;
    use crate::evaluate_expression;
    use atrius_fhirpath_support::Collection;

    fn eval(source: &str) -> Result<EvaluationResult, EvaluationError> {
        evaluate_expression(source, &Collection::new(), &EvaluationContext::new())
    }

    fn boolean(source: &str) -> bool {
        eval(source).unwrap().collection[0].as_bool().unwrap()
    }

    #[test]
    fn test_all_true_any_true() {
        assert!(boolean("(true | true).allTrue()"));
        assert!(!boolean("(true | false).allTrue()"));
        assert!(boolean("{}.allTrue()"));
        assert!(boolean("(false | true).anyTrue()"));
        assert!(!boolean("{}.anyTrue()"));
    }

    #[test]
    fn test_all_false_any_false() {
        assert!(boolean("(false | false).allFalse()"));
        assert!(boolean("(true | false).anyFalse()"));
        assert!(!boolean("{}.anyFalse()"));
    }

    #[test]
    fn test_non_boolean_items_rejected() {
        assert!(matches!(eval("(1 | 2).allTrue()"), Err(EvaluationError::TypeError(_))));
    }

    #[test]
    fn test_not() {
        assert!(!boolean("true.not()"));
        assert!(boolean("(1 = 2).not()"));
        assert!(eval("{}.not()").unwrap().is_empty());
        assert!(eval("(true | false).not()").is_err());
    }
}
