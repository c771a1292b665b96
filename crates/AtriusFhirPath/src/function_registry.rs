//! # Function Registry
//!
//! Name-keyed table of function implementations. The built-in table is
//! assembled once and shared; contexts that add host functions get their own
//! merged copy, so registration never leaks between contexts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use atrius_fhirpath_support::{EvaluationError, EvaluationResult};
use once_cell::sync::Lazy;

use crate::evaluator::{CallSite, Evaluator};
use crate::{
    aggregate_function, boolean_functions, boundary_functions, collection_functions,
    collection_navigation, conversion_functions, date_operation, math_functions, repeat_function,
    set_operations, sort_function, string_functions, subset_functions, trace_function,
    type_function, utility_functions,
};

/// Signature shared by every function implementation.
pub type FunctionImpl = dyn for<'c, 's> Fn(&mut Evaluator<'c>, &CallSite<'s>) -> Result<EvaluationResult, EvaluationError>
    + Send
    + Sync;

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<FunctionImpl>>,
}

static STANDARD: Lazy<Arc<FunctionRegistry>> = Lazy::new(|| {
    let mut registry = FunctionRegistry::new();
    collection_functions::register(&mut registry);
    boolean_functions::register(&mut registry);
    subset_functions::register(&mut registry);
    set_operations::register(&mut registry);
    repeat_function::register(&mut registry);
    collection_navigation::register(&mut registry);
    conversion_functions::register(&mut registry);
    string_functions::register(&mut registry);
    math_functions::register(&mut registry);
    type_function::register(&mut registry);
    aggregate_function::register(&mut registry);
    date_operation::register(&mut registry);
    boundary_functions::register(&mut registry);
    sort_function::register(&mut registry);
    trace_function::register(&mut registry);
    utility_functions::register(&mut registry);
    Arc::new(registry)
});

impl FunctionRegistry {
    /// An empty table, for host additions.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in FHIRPath functions.
    pub fn standard() -> Arc<Self> {
        Arc::clone(&STANDARD)
    }

    pub fn register<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&mut Evaluator<'_>, &CallSite<'_>) -> Result<EvaluationResult, EvaluationError>
            + Send
            + Sync
            + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(function));
    }

    /// Builder form of [`FunctionRegistry::register`].
    pub fn with_function<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(&mut Evaluator<'_>, &CallSite<'_>) -> Result<EvaluationResult, EvaluationError>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<FunctionImpl>> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// `self` with every entry of `other` added, replacing same-named ones.
    pub fn merged(mut self, other: FunctionRegistry) -> Self {
        self.functions.extend(other.functions);
        self
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}
