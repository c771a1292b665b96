//! Error types for the FHIRPath command-line tool
//!
//! Wraps the evaluation error together with the I/O and JSON failures that
//! can happen while reading inputs and writing results.

use atrius_fhirpath_support::EvaluationError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    /// Parse or evaluation failure of the expression
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    /// File or stream failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource or variable JSON that does not parse
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid command-line input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let error = CliError::from(EvaluationError::TypeError("bad".to_string()));
        assert_eq!(error.to_string(), "Evaluation error: Type Error: bad");
        let error = CliError::InvalidInput("missing '='".to_string());
        assert_eq!(error.to_string(), "Invalid input: missing '='");
    }
}
