//! # FHIRPath Expression Engine
//!
//! This crate evaluates [FHIRPath](https://hl7.org/fhirpath/) expressions
//! against any data that implements the [`Element`] capability. FHIRPath is a
//! path-based navigation and extraction language in which every expression
//! maps an input collection to an output collection.
//!
//! ## Overview
//!
//! - **Navigate** with path expressions (`Patient.name.family`)
//! - **Filter** with predicates (`telecom.where(system = 'email')`)
//! - **Transform** with the function library (`name.given.first()`)
//! - **Calculate** with precision-aware decimals, quantities and dates
//!   (`birthDate + 18 years`)
//! - **Inspect types** with `is`, `as`, `ofType` and `type()`
//!
//! ## Architecture
//!
//! - **Parser** (`parser.rs`): turns FHIRPath text into an [`ast::Expression`]
//! - **Evaluator** (`evaluator.rs`): walks the tree, one invocation at a time
//! - **Context** (`context.rs`): types, functions, decimal precision, unit
//!   conversion, clock, trace sink, constants and limits
//! - **Operators** (`operators.rs`): arithmetic, comparison, equality,
//!   equivalence, boolean logic and membership
//! - **Function modules**: one module per function family, registered in a
//!   [`FunctionRegistry`]
//! - **JSON elements** (`json_element.rs`): JSON documents as navigable
//!   elements
//! - **Support types**: values, collections, temporals and quantities from
//!   the `atrius_fhirpath_support` crate
//!
//! ## Usage
//!
//! ```rust
//! use atrius_fhir_path::{EvaluationContext, JsonElement, Value, evaluate_expression};
//! use serde_json::json;
//!
//! let patient = JsonElement::collection(&json!({
//!     "resourceType": "Patient",
//!     "name": [{"family": "Chalmers", "given": ["Peter", "James"]}]
//! }));
//! let context = EvaluationContext::fhir();
//!
//! let result = evaluate_expression("Patient.name.given.first()", &patient, &context).unwrap();
//! assert_eq!(result.collection.to_vec(), vec![Value::string("Peter")]);
//! ```
//!
//! ## Error Handling
//!
//! Parse failures and fatal evaluation errors (wrong argument counts, type
//! mismatches, several items where one was required) are reported as
//! [`EvaluationError`]. Questions without an answer, such as navigating to a
//! missing field, produce an empty collection instead.

pub mod ast;
pub mod cli;
pub mod context;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod function_registry;
pub mod json_element;
pub mod operators;
pub mod parser;
pub mod trace_function;
pub mod ucum;

mod aggregate_function;
mod boolean_functions;
mod boundary_functions;
mod collection_functions;
mod collection_navigation;
mod conversion_functions;
// Public for internal testing only - not part of the public API
#[doc(hidden)]
pub mod date_operation;
mod math_functions;
mod repeat_function;
mod set_operations;
mod sort_function;
mod string_functions;
mod subset_functions;
mod type_function;
mod utility_functions;

pub use atrius_fhirpath_support::{
    Collection, Element, EvaluationError, EvaluationResult, TypeInfo, TypeRegistry, Value,
};
pub use context::{Clock, EvaluationContext, EvaluationLimits, FixedClock, SystemClock};
pub use evaluator::Evaluator;
pub use function_registry::FunctionRegistry;
pub use json_element::JsonElement;
pub use trace_function::{CollectingTraceLogger, TraceLogger};
pub use ucum::{UcumConverter, UnitConverter};

/// Evaluates a FHIRPath expression against a root collection.
///
/// Combines parsing and evaluation into a single call. Parse a long-lived
/// expression once with [`parser::parse`] and use [`evaluate`] when it is
/// evaluated repeatedly.
///
/// # Arguments
///
/// * `expression` - The FHIRPath expression text
/// * `root` - The initial focus, also bound to `%context` and `%resource`
/// * `context` - Types, functions, constants and limits for the evaluation
///
/// # Returns
///
/// * `Ok(EvaluationResult)` - The output collection and its ordered flag
/// * `Err(EvaluationError::Parse)` - If the text is not a valid expression
/// * `Err(_)` - Any fatal evaluation error
pub fn evaluate_expression(
    expression: &str,
    root: &Collection,
    context: &EvaluationContext,
) -> Result<EvaluationResult, EvaluationError> {
    let parsed = parser::parse(expression)?;
    evaluate(&parsed, root, context)
}

/// Evaluates an already parsed expression against a root collection.
pub fn evaluate(
    expression: &ast::Expression,
    root: &Collection,
    context: &EvaluationContext,
) -> Result<EvaluationResult, EvaluationError> {
    Evaluator::new(context, root.clone()).run(expression)
}
