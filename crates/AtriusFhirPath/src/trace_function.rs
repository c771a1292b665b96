//! # FHIRPath Trace Function
//!
//! Implements `trace(name, projection?)`, which reports intermediate values to
//! the context's [`TraceLogger`] and returns its input unchanged.

use std::fmt;

use atrius_fhirpath_support::{Collection, EvaluationError, EvaluationResult};
use parking_lot::Mutex;
use tracing::info;

use crate::evaluator::{CallSite, Evaluator};
use crate::function_registry::FunctionRegistry;

/// Receiver of `trace()` output.
pub trait TraceLogger: Send + Sync {
    fn log(&self, name: &str, values: &Collection);
}

/// Emits each trace as a `tracing` event with target `fhirpath::trace`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl TraceLogger for TracingLogger {
    fn log(&self, name: &str, values: &Collection) {
        let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
        info!(target: "fhirpath::trace", trace = name, count = values.len(), values = ?rendered, "trace");
    }
}

/// Keeps every trace in memory, in call order.
#[derive(Default)]
pub struct CollectingTraceLogger {
    entries: Mutex<Vec<(String, Collection)>>,
}

impl CollectingTraceLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the recorded `(name, values)` pairs.
    pub fn entries(&self) -> Vec<(String, Collection)> {
        self.entries.lock().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl TraceLogger for CollectingTraceLogger {
    fn log(&self, name: &str, values: &Collection) {
        self.entries.lock().push((name.to_string(), values.clone()));
    }
}

impl fmt::Debug for CollectingTraceLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectingTraceLogger")
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

/// Implements the FHIRPath trace() function
///
/// # Syntax
/// `trace(name : String [, projection: Expression]) : collection`
///
/// The name is evaluated once. When a projection is given, it is evaluated
/// for each input item and the concatenated projections are logged instead
/// of the input.
pub fn trace_function(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(1, 2)?;
    let name = evaluator.string_argument(site, 0)?.ok_or_else(|| {
        EvaluationError::InvalidArgument("trace() requires a name".to_string())
    })?;

    let logged = match site.args.get(1) {
        Some(projection) => {
            let mut projected = Collection::new();
            for (index, item) in site.input.collection.iter().enumerate() {
                let value = evaluator.evaluate_for_item(projection, item, index, None)?;
                projected.extend(value.collection);
            }
            projected
        }
        None => site.input.collection.clone(),
    };

    evaluator.context().trace_logger().log(&name, &logged);
    Ok(site.input.clone())
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("trace", trace_function);
}
