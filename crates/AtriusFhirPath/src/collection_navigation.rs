//! # FHIRPath Tree Navigation
//!
//! Implements `children()` and `descendants()`. Children come from
//! [`Element::children`]; System primitives have none. Both results are
//! reported unordered.

use atrius_fhirpath_support::{Collection, Element, EvaluationError, EvaluationResult};

use crate::evaluator::{CallSite, Evaluator};
use crate::function_registry::FunctionRegistry;
use crate::repeat_function::expand;

/// Implements the FHIRPath children() function: the direct child values of
/// every input item.
fn children_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    let mut children = Collection::new();
    for item in site.input.collection.iter() {
        children.extend(item.children());
    }
    Ok(EvaluationResult::unordered(children))
}

/// Implements the FHIRPath descendants() function
///
/// Equivalent to `repeat(children())`: every value below the input items,
/// without the input items themselves.
fn descendants_function(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    let found = expand(evaluator, site.name, &site.input.collection, true, |_, item| {
        Ok(item.children())
    })?;
    Ok(EvaluationResult::unordered(found))
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("children", children_function);
    registry.register("descendants", descendants_function);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluationContext;
    use crate::evaluate_expression;
    use crate::json_element::JsonElement;
    use atrius_fhirpath_support::Value;
    use serde_json::json;

    fn patient() -> Collection {
        Collection::single(JsonElement::value(json!({
            "resourceType": "Patient",
            "active": true,
            "name": [{"family": "Chalmers", "given": ["Peter", "James"]}]
        })))
    }

    #[test]
    fn test_children() {
        let result = evaluate_expression("children()", &patient(), &EvaluationContext::fhir()).unwrap();
        // resourceType is not a child; active and one name remain
        assert_eq!(result.len(), 2);
        assert!(!result.ordered);
    }

    #[test]
    fn test_descendants_reach_leaves() {
        let result = evaluate_expression(
            "descendants().where($this = 'James').count()",
            &patient(),
            &EvaluationContext::fhir(),
        )
        .unwrap();
        assert_eq!(result.collection[0], Value::Integer(1));
    }

    #[test]
    fn test_primitives_have_no_children() {
        let result = evaluate_expression("(1 | 'a').children()", &Collection::new(), &EvaluationContext::new()).unwrap();
        assert!(result.is_empty());
    }
}
