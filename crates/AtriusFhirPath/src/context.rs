//! # Evaluation Context
//!
//! Everything an evaluation reads besides the expression and its root:
//! type registry, function table, decimal precision, unit converter, clock,
//! trace sink, external constants and resource limits.
//!
//! A context is assembled once with the `with_*` builders and is never
//! mutated by evaluation, so one context can serve any number of concurrent
//! evaluations.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use atrius_fhirpath_support::type_info::FHIR_NAMESPACE;
use atrius_fhirpath_support::{Collection, DecimalContext, TypeRegistry};
use chrono::{DateTime, FixedOffset, Local};

use crate::function_registry::FunctionRegistry;
use crate::trace_function::{TraceLogger, TracingLogger};
use crate::ucum::{UcumConverter, UnitConverter};

/// Source of the evaluation instant used by `now()`, `today()` and
/// `timeOfDay()`.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Reads the host clock in the local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// Caps on the fixed-point loops of `repeat`, `repeatAll` and `descendants`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationLimits {
    /// Maximum number of expansion rounds.
    pub max_iterations: usize,
    /// Maximum number of items a single expansion may accumulate.
    pub max_collection_size: usize,
}

impl Default for EvaluationLimits {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            max_collection_size: 1_000_000,
        }
    }
}

/// Configuration for evaluating FHIRPath expressions.
///
/// ```
/// use atrius_fhir_path::{EvaluationContext, evaluate_expression};
/// use atrius_fhirpath_support::{Collection, Value};
///
/// let context = EvaluationContext::new()
///     .with_variable("limit", Collection::single(Value::Integer(2)));
/// let result = evaluate_expression("(1 | 2 | 3).where($this <= %limit).count()", &Collection::new(), &context).unwrap();
/// assert_eq!(result.collection.first(), Some(&Value::Integer(2)));
/// ```
#[derive(Clone)]
pub struct EvaluationContext {
    default_namespace: Option<String>,
    types: Arc<TypeRegistry>,
    functions: Arc<FunctionRegistry>,
    trace_logger: Arc<dyn TraceLogger>,
    decimal_context: DecimalContext,
    unit_converter: Arc<dyn UnitConverter>,
    clock: Arc<dyn Clock>,
    variables: HashMap<String, Collection>,
    limits: EvaluationLimits,
    check_ordered_functions: bool,
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("default_namespace", &self.default_namespace)
            .field("types", &self.types.len())
            .field("functions", &self.functions.len())
            .field("decimal_context", &self.decimal_context)
            .field("clock", &self.clock)
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("limits", &self.limits)
            .field("check_ordered_functions", &self.check_ordered_functions)
            .finish()
    }
}

impl EvaluationContext {
    /// A context that only knows the System types.
    pub fn new() -> Self {
        Self {
            default_namespace: None,
            types: Arc::new(TypeRegistry::system()),
            functions: FunctionRegistry::standard(),
            trace_logger: Arc::new(TracingLogger),
            decimal_context: DecimalContext::default(),
            unit_converter: Arc::new(UcumConverter),
            clock: Arc::new(SystemClock),
            variables: HashMap::new(),
            limits: EvaluationLimits::default(),
            check_ordered_functions: true,
        }
    }

    /// A context with the FHIR core type catalog and `FHIR` as the default
    /// namespace.
    pub fn fhir() -> Self {
        Self::new()
            .with_types(TypeRegistry::fhir())
            .with_default_namespace(FHIR_NAMESPACE)
    }

    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = Some(namespace.into());
        self
    }

    pub fn with_types(mut self, types: TypeRegistry) -> Self {
        self.types = Arc::new(types);
        self
    }

    /// Merges host functions over the built-in table. Only this context sees
    /// them.
    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = Arc::new(self.functions.as_ref().clone().merged(functions));
        self
    }

    pub fn with_trace_logger(mut self, logger: Arc<dyn TraceLogger>) -> Self {
        self.trace_logger = logger;
        self
    }

    pub fn with_decimal_context(mut self, decimal_context: DecimalContext) -> Self {
        self.decimal_context = decimal_context;
        self
    }

    pub fn with_unit_converter(mut self, converter: Arc<dyn UnitConverter>) -> Self {
        self.unit_converter = converter;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Pins `now()` and friends to `instant`.
    pub fn with_evaluation_time(self, instant: DateTime<FixedOffset>) -> Self {
        self.with_clock(Arc::new(FixedClock(instant)))
    }

    /// Binds an external constant, reachable as `%name`.
    pub fn with_variable(mut self, name: impl Into<String>, value: Collection) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn with_limits(mut self, limits: EvaluationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Controls whether order-dependent functions reject unordered input.
    pub fn with_ordered_function_checks(mut self, enabled: bool) -> Self {
        self.check_ordered_functions = enabled;
        self
    }

    pub fn default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn trace_logger(&self) -> &dyn TraceLogger {
        self.trace_logger.as_ref()
    }

    pub fn decimal_context(&self) -> &DecimalContext {
        &self.decimal_context
    }

    pub fn unit_converter(&self) -> &dyn UnitConverter {
        self.unit_converter.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn variable(&self, name: &str) -> Option<&Collection> {
        self.variables.get(name)
    }

    pub fn limits(&self) -> EvaluationLimits {
        self.limits
    }

    pub fn check_ordered_functions(&self) -> bool {
        self.check_ordered_functions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_builders_do_not_touch_other_contexts() {
        let base = EvaluationContext::new();
        let custom = base
            .clone()
            .with_default_namespace("FHIR")
            .with_ordered_function_checks(false);
        assert_eq!(base.default_namespace(), None);
        assert!(base.check_ordered_functions());
        assert_eq!(custom.default_namespace(), Some("FHIR"));
        assert!(!custom.check_ordered_functions());
    }

    #[test]
    fn test_fixed_clock() {
        let instant = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 6, 7, 8, 9)
            .unwrap();
        let context = EvaluationContext::new().with_evaluation_time(instant);
        assert_eq!(context.clock().now(), instant);
    }

    #[test]
    fn test_fhir_context_resolves_resource_types() {
        let context = EvaluationContext::fhir();
        assert_eq!(context.default_namespace(), Some("FHIR"));
        assert!(context.types().get("FHIR.Patient").is_some());
        assert_eq!(context.limits(), EvaluationLimits::default());
    }
}
