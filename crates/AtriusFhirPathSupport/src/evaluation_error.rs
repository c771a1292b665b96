//! # FHIRPath Evaluation Errors
//!
//! One error type shared by the value model, the type registry and the engine.
//! Every variant is fatal: evaluation stops and the error travels back through
//! the recursive evaluation calls unchanged. Operations that merely have no
//! answer return an empty collection instead of an error.

use thiserror::Error;

/// Error type for FHIRPath evaluation failures.
///
/// # Error Categories
///
/// - **Arity**: wrong parameter count, or several items where one was required
/// - **Type**: operands or parameters of an unexpected kind
/// - **Conversion**: malformed text for an unconditional conversion or literal
/// - **Resolution**: unknown functions, variables or type specifiers
/// - **Scope**: attempts to rebind reserved or already defined variables
/// - **Resource**: fixed-point iterations exceeding the configured caps
///
/// # Examples
///
/// ```rust
/// use atrius_fhirpath_support::EvaluationError;
///
/// let error = EvaluationError::TypeError("Cannot add String and Integer".to_string());
/// assert_eq!(error.to_string(), "Type Error: Cannot add String and Integer");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    /// Mismatched operand or parameter type.
    ///
    /// Example: "Expected Boolean, found Integer"
    #[error("Type Error: {0}")]
    TypeError(String),
    /// A parameter value outside the domain the function accepts.
    #[error("Invalid Argument: {0}")]
    InvalidArgument(String),
    /// `%name` with no binding in the context or environment.
    #[error("Undefined Variable: {0}")]
    UndefinedVariable(String),
    /// Operator applied to operands it does not support.
    #[error("Invalid Operation: {0}")]
    InvalidOperation(String),
    /// Wrong number of parameters.
    ///
    /// Example: "Function 'substring' expects 1 or 2 arguments, got 3"
    #[error("Invalid Arity: {0}")]
    InvalidArity(String),
    /// Indexer used with something other than an integer.
    #[error("Invalid Index: {0}")]
    InvalidIndex(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,
    /// Regular expression that fails to compile.
    #[error("Invalid Regex: {0}")]
    InvalidRegex(String),
    /// Type specifier that the registry cannot resolve.
    #[error("Invalid Type Specifier: {0}")]
    InvalidTypeSpecifier(String),
    /// Collection with more than one item where a singleton was required.
    #[error("Singleton Evaluation Error: {0}")]
    SingletonEvaluationError(String),
    /// Violation of an evaluation rule, such as redefining a variable or
    /// calling an order-dependent function on unordered input.
    #[error("Semantic Error: {0}")]
    SemanticError(String),
    /// Function name missing from the context's function registry.
    #[error("Unsupported Function: {0}")]
    UnsupportedFunction(String),
    /// Text that has the shape of a value but does not denote a valid one,
    /// for example `'2023-02-30'` for a date.
    #[error("Conversion Error: {0}")]
    ConversionError(String),
    /// A fixed-point iteration exceeded the context's iteration or size cap.
    #[error("Resource Exhausted: {0}")]
    ResourceExhausted(String),
    /// A base-type chain in the type registry loops back onto itself.
    #[error("Cyclic Type Hierarchy: {0}")]
    CyclicType(String),
    /// Expression text rejected by the grammar front-end.
    #[error("Parse Error: {0}")]
    Parse(String),
    #[error("Evaluation Error: {0}")]
    Other(String),
}

impl EvaluationError {
    /// Standard arity failure for a named function.
    pub fn arity(function: &str, expected: &str, actual: usize) -> Self {
        EvaluationError::InvalidArity(format!(
            "Function '{}' expects {} argument(s), got {}",
            function, expected, actual
        ))
    }

    /// Standard failure for several input items where at most one is allowed.
    pub fn singleton(what: &str, actual: usize) -> Self {
        EvaluationError::SingletonEvaluationError(format!(
            "{} requires a single item, found {} items",
            what, actual
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        assert_eq!(
            EvaluationError::InvalidArity("x".into()).to_string(),
            "Invalid Arity: x"
        );
        assert_eq!(EvaluationError::DivisionByZero.to_string(), "Division by zero");
        assert_eq!(
            EvaluationError::ResourceExhausted("repeat".into()).to_string(),
            "Resource Exhausted: repeat"
        );
    }

    #[test]
    fn test_helpers() {
        let err = EvaluationError::arity("skip", "1", 0);
        assert_eq!(
            err,
            EvaluationError::InvalidArity("Function 'skip' expects 1 argument(s), got 0".into())
        );
        assert!(matches!(
            EvaluationError::singleton("toInteger()", 2),
            EvaluationError::SingletonEvaluationError(_)
        ));
    }
}
