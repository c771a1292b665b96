#![allow(dead_code)]

use atrius_fhir_path::parser::parse;
use atrius_fhir_path::{
    Collection, EvaluationContext, EvaluationError, EvaluationResult, JsonElement, Value, evaluate,
};
use chrono::DateTime;
use serde_json::Value as Json;

/// Parses and evaluates `expression` against `root`.
pub fn run(
    expression: &str,
    root: &Collection,
    context: &EvaluationContext,
) -> Result<EvaluationResult, EvaluationError> {
    let parsed = parse(expression)?;
    evaluate(&parsed, root, context)
}

/// A FHIR context whose clock is pinned to 2024-02-29T10:00:00+01:00.
pub fn fixed_context() -> EvaluationContext {
    let instant = DateTime::parse_from_rfc3339("2024-02-29T10:00:00+01:00").expect("instant");
    EvaluationContext::fhir().with_evaluation_time(instant)
}

pub fn eval(expression: &str) -> Result<EvaluationResult, EvaluationError> {
    run(expression, &Collection::new(), &fixed_context())
}

pub fn eval_json(expression: &str, resource: &Json) -> Result<EvaluationResult, EvaluationError> {
    run(expression, &JsonElement::collection(resource), &fixed_context())
}

/// The items of a successful evaluation.
pub fn values(expression: &str) -> Vec<Value> {
    eval(expression)
        .unwrap_or_else(|e| panic!("'{}' failed: {}", expression, e))
        .collection
        .to_vec()
}

/// The rendered items of a successful evaluation.
pub fn texts(expression: &str) -> Vec<String> {
    values(expression).iter().map(ToString::to_string).collect()
}

pub fn assert_boolean(expression: &str, expected: bool) {
    assert_eq!(values(expression), vec![Value::Boolean(expected)], "{}", expression);
}

pub fn assert_empty(expression: &str) {
    assert_eq!(values(expression), Vec::<Value>::new(), "{}", expression);
}
