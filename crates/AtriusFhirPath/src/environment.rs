//! # Variable Environment
//!
//! Stack of frames holding the variables bound by `defineVariable`. The
//! evaluator pushes a frame for every operand and function argument it
//! evaluates, so a definition is visible to the rest of its invocation chain
//! and gone once the enclosing scope ends.

use std::collections::HashMap;

use atrius_fhirpath_support::{Collection, EvaluationError};

/// Names that `defineVariable` may never bind.
pub const SYSTEM_VARIABLES: [&str; 9] = [
    "this",
    "index",
    "total",
    "context",
    "resource",
    "rootResource",
    "ucum",
    "sct",
    "loinc",
];

pub fn is_system_variable(name: &str) -> bool {
    SYSTEM_VARIABLES.contains(&name)
}

#[derive(Debug, Clone)]
pub struct Environment {
    frames: Vec<HashMap<String, Collection>>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Drops the innermost frame. The outermost frame is never removed.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Innermost binding of `name`.
    pub fn lookup(&self, name: &str) -> Option<&Collection> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Binds `name` in the innermost frame.
    pub fn define(&mut self, name: &str, value: Collection) -> Result<(), EvaluationError> {
        if is_system_variable(name) {
            return Err(EvaluationError::SemanticError(format!(
                "Cannot override system variable '{}'",
                name
            )));
        }
        if self.lookup(name).is_some() {
            return Err(EvaluationError::SemanticError(format!(
                "Variable '{}' is already defined",
                name
            )));
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrius_fhirpath_support::Value;

    #[test]
    fn test_frames_scope_definitions() {
        let mut env = Environment::new();
        env.push();
        env.define("a", Collection::single(Value::Integer(1))).unwrap();
        assert!(env.lookup("a").is_some());
        env.pop();
        assert!(env.lookup("a").is_none());
        env.pop();
        assert_eq!(env.depth(), 1);
    }

    #[test]
    fn test_redefinition_rejected() {
        let mut env = Environment::new();
        env.define("a", Collection::new()).unwrap();
        env.push();
        let err = env.define("a", Collection::new()).unwrap_err();
        assert!(err.to_string().contains("already defined"));
        let err = env.define("context", Collection::new()).unwrap_err();
        assert!(err.to_string().contains("Cannot override system variable"));
    }
}
