//! # FHIRPath Utility Functions
//!
//! Implements `defineVariable()` and `comparable()`.

use atrius_fhirpath_support::{Element, EvaluationError, EvaluationResult, Quantity, Value};
use tracing::debug;

use crate::evaluator::{CallSite, Evaluator};
use crate::function_registry::FunctionRegistry;

/// Implements the FHIRPath defineVariable() function
///
/// # Syntax
/// `defineVariable(name: String [, expr: expression]) : collection`
///
/// Binds `%name` to the value of `expr` (evaluated with the input as
/// `$this`), or to the input itself when `expr` is omitted, and returns the
/// input unchanged. The binding is visible to the rest of the invocation
/// chain.
///
/// # Returns
///
/// * `Err(SemanticError)` - If `name` is a system variable or is already
///   defined
fn define_variable_function(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 2)?;
    let name = evaluator.string_argument(site, 0)?.ok_or_else(|| {
        EvaluationError::InvalidArgument("defineVariable() requires a variable name".to_string())
    })?;
    if evaluator.context().variable(&name).is_some() {
        return Err(EvaluationError::SemanticError(format!(
            "Variable '{}' is already defined",
            name
        )));
    }
    let value = if site.args.len() == 2 {
        evaluator.evaluate_argument_on_input(site, 1)?.into_collection()
    } else {
        site.input.collection.clone()
    };
    debug!(variable = %name, items = value.len(), "defining variable");
    evaluator.environment_mut().define(&name, value)?;
    Ok(site.input.clone())
}

fn quantity_of(value: &Value) -> Result<Option<Quantity>, EvaluationError> {
    value.to_quantity(false)
}

/// Implements the FHIRPath comparable() function
///
/// True when the input Quantity and the argument Quantity have units that
/// convert into each other.
fn comparable_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 1)?;
    let Some(input) = site.singleton_input()? else {
        return Ok(EvaluationResult::empty());
    };
    let other = evaluator.evaluate_argument(site, 0)?;
    let Some(other) = other.singleton("comparable() argument")? else {
        return Ok(EvaluationResult::empty());
    };
    let (Some(left), Some(right)) = (quantity_of(input)?, quantity_of(other)?) else {
        return Err(EvaluationError::TypeError(
            "comparable() requires Quantity input and argument".to_string(),
        ));
    };
    let converter = evaluator.context().unit_converter();
    Ok(EvaluationResult::single(
        converter.comparable(left.ucum_unit(), right.ucum_unit()),
    ))
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("defineVariable", define_variable_function);
    registry.register("comparable", comparable_function);
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

    #[test]
    fn test_define_variable_visible_downstream() {
        let result = eval("(1 | 2).defineVariable('n', 10).select($this + %n)").unwrap();
        assert_eq!(result.collection.to_vec(), vec![Value::Integer(11), Value::Integer(12)]);
    }

    #[test]
    fn test_define_variable_without_value_binds_input() {
        let result = eval("(1 | 2).defineVariable('xs').select(%xs.count())").unwrap();
        assert_eq!(result.collection.to_vec(), vec![Value::Integer(2), Value::Integer(2)]);
    }

    #[test]
    fn test_define_variable_scope_ends_with_operand() {
        assert!(matches!(
            eval("1.defineVariable('v', 2).select(%v) | %v"),
            Err(EvaluationError::UndefinedVariable(_))
        ));
    }

    #[test]
    fn test_define_variable_protection() {
        assert!(matches!(
            eval("1.defineVariable('context', 2)"),
            Err(EvaluationError::SemanticError(_))
        ));
        assert!(matches!(
            eval("1.defineVariable('v', 2).defineVariable('v', 3)"),
            Err(EvaluationError::SemanticError(_))
        ));
    }

    #[test]
    fn test_comparable() {
        assert_eq!(eval("1 'cm'.comparable(1 'm')").unwrap().collection[0], Value::Boolean(true));
        assert_eq!(eval("1 'cm'.comparable(1 'g')").unwrap().collection[0], Value::Boolean(false));
        assert!(eval("{}.comparable(1 'g')").unwrap().is_empty());
    }
}
