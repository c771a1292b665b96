//! # FHIRPath Expression Evaluator
//!
//! Walks an [`Expression`] tree against a root collection and produces an
//! [`EvaluationResult`]: the result collection plus whether its order is
//! meaningful.
//!
//! ## Scoping
//!
//! - `$this` is the focus passed into [`Evaluator::evaluate`]; functions that
//!   evaluate a parameter per input item pass that item as the new focus.
//! - `$index` and `$total` come from the [`FunctionScope`] installed by the
//!   function that is iterating.
//! - `defineVariable` writes into the innermost [`Environment`] frame. A
//!   frame is pushed for each operand and function argument, never for the
//!   steps of an invocation chain, so a definition stays visible to the
//!   remainder of its chain only.

use atrius_fhirpath_support::{
    Collection, Element, EvaluationError, EvaluationResult, TypeInfo, Value,
};
use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::ast::{Expression, Invocation, Literal, Term};
use crate::context::EvaluationContext;
use crate::environment::Environment;
use crate::{operators, subset_functions, type_function};

const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";
const SNOMED_SYSTEM: &str = "http://snomed.info/sct";
const LOINC_SYSTEM: &str = "http://loinc.org";

/// `$index` and `$total` of the function currently iterating.
#[derive(Debug, Clone, Default)]
pub struct FunctionScope {
    pub index: Option<usize>,
    pub total: Option<Collection>,
}

/// One function invocation as seen by its implementation.
#[derive(Debug)]
pub struct CallSite<'a> {
    pub name: &'a str,
    /// The collection the function was invoked on.
    pub input: &'a EvaluationResult,
    /// Unevaluated parameter expressions.
    pub args: &'a [Expression],
    /// Focus of the expression containing the call.
    pub this: &'a EvaluationResult,
    pub scope: &'a FunctionScope,
}

impl CallSite<'_> {
    /// Fails unless the call has between `min` and `max` arguments.
    pub fn expect_args(&self, min: usize, max: usize) -> Result<(), EvaluationError> {
        let count = self.args.len();
        if count < min || count > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{} to {}", min, max)
            };
            return Err(EvaluationError::arity(self.name, &expected, count));
        }
        Ok(())
    }

    /// The single input item, `None` for empty input.
    pub fn singleton_input(&self) -> Result<Option<&Value>, EvaluationError> {
        self.input
            .singleton(&format!("{}()", self.name))
    }

    /// Rejects unordered input when ordered-function checks are on.
    pub fn require_ordered(&self, evaluator: &Evaluator<'_>) -> Result<(), EvaluationError> {
        if evaluator.context().check_ordered_functions() && !self.input.ordered {
            return Err(EvaluationError::SemanticError(format!(
                "{}() operation on collection with undefined order is not allowed when checkOrderedFunctions is true.",
                self.name
            )));
        }
        Ok(())
    }
}

/// State of one evaluation: the context, the root, the variable frames and
/// the instant `now()` reports.
pub struct Evaluator<'c> {
    context: &'c EvaluationContext,
    root: EvaluationResult,
    environment: Environment,
    now: DateTime<FixedOffset>,
}

impl<'c> Evaluator<'c> {
    pub fn new(context: &'c EvaluationContext, root: Collection) -> Self {
        Self {
            context,
            root: EvaluationResult::ordered(root),
            environment: Environment::new(),
            now: context.clock().now(),
        }
    }

    pub fn context(&self) -> &'c EvaluationContext {
        self.context
    }

    pub fn root(&self) -> &EvaluationResult {
        &self.root
    }

    /// The evaluation instant, read from the clock once per evaluation.
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.now
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    /// Evaluates `expr` with the root as focus.
    pub fn run(&mut self, expr: &Expression) -> Result<EvaluationResult, EvaluationError> {
        let root = self.root.clone();
        self.evaluate(&root, expr, &FunctionScope::default())
    }

    /// Runs `f` inside a fresh variable frame.
    pub fn in_frame<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EvaluationError>,
    ) -> Result<T, EvaluationError> {
        self.environment.push();
        let result = f(self);
        self.environment.pop();
        result
    }

    pub fn evaluate(
        &mut self,
        this: &EvaluationResult,
        expr: &Expression,
        scope: &FunctionScope,
    ) -> Result<EvaluationResult, EvaluationError> {
        match expr {
            Expression::Term(term) => self.evaluate_term(this, term, scope),
            Expression::Invocation(left, invocation) => {
                let input = self.evaluate(this, left, scope)?;
                self.invoke(this, &input, invocation, scope, false)
            }
            Expression::Indexer(left, index) => {
                let input = self.evaluate(this, left, scope)?;
                let index = self.in_frame(|ev| ev.evaluate(this, index, scope))?;
                subset_functions::index(self, &input, &index)
            }
            Expression::Polarity(polarity, operand) => {
                let value = self.evaluate(this, operand, scope)?;
                operators::polarity(*polarity, &value)
            }
            Expression::Binary(left, op, right) => {
                let left = self.in_frame(|ev| ev.evaluate(this, left, scope))?;
                let right = self.in_frame(|ev| ev.evaluate(this, right, scope))?;
                operators::binary(self, *op, &left, &right)
            }
            Expression::Type(operand, op, specifier) => {
                let value = self.in_frame(|ev| ev.evaluate(this, operand, scope))?;
                type_function::apply_type_operator(self, &value, *op, specifier)
            }
            Expression::SortKey(..) => Err(EvaluationError::SemanticError(
                "'asc' and 'desc' may only qualify sort() arguments".to_string(),
            )),
        }
    }

    fn evaluate_term(
        &mut self,
        this: &EvaluationResult,
        term: &Term,
        scope: &FunctionScope,
    ) -> Result<EvaluationResult, EvaluationError> {
        match term {
            Term::Literal(literal) => Ok(literal_value(literal)
                .map(EvaluationResult::single)
                .unwrap_or_else(EvaluationResult::empty)),
            Term::ExternalConstant(name) => self.external_constant(name),
            Term::Parenthesized(inner) => self.evaluate(this, inner, scope),
            Term::Invocation(invocation) => self.invoke(this, this, invocation, scope, true),
        }
    }

    fn external_constant(&self, name: &str) -> Result<EvaluationResult, EvaluationError> {
        if let Some(value) = self.environment.lookup(name) {
            return Ok(EvaluationResult::ordered(value.clone()));
        }
        match name {
            "context" | "resource" | "rootResource" => return Ok(self.root.clone()),
            "ucum" => return Ok(EvaluationResult::single(UCUM_SYSTEM)),
            "sct" => return Ok(EvaluationResult::single(SNOMED_SYSTEM)),
            "loinc" => return Ok(EvaluationResult::single(LOINC_SYSTEM)),
            _ => {}
        }
        self.context
            .variable(name)
            .map(|value| EvaluationResult::ordered(value.clone()))
            .ok_or_else(|| EvaluationError::UndefinedVariable(format!("%{}", name)))
    }

    fn invoke(
        &mut self,
        this: &EvaluationResult,
        input: &EvaluationResult,
        invocation: &Invocation,
        scope: &FunctionScope,
        leading: bool,
    ) -> Result<EvaluationResult, EvaluationError> {
        match invocation {
            Invocation::Member(name) => Ok(member_access(input, name, leading)),
            Invocation::Function(name, args) => {
                let context = self.context;
                let Some(function) = context.functions().get(name) else {
                    return Err(EvaluationError::UnsupportedFunction(format!(
                        "Unknown function '{}'",
                        name
                    )));
                };
                debug!(function = %name, input = input.len(), args = args.len(), "invoking function");
                let site = CallSite {
                    name,
                    input,
                    args,
                    this,
                    scope,
                };
                function(self, &site)
            }
            Invocation::This => Ok(this.clone()),
            Invocation::Index => Ok(scope
                .index
                .and_then(|i| i32::try_from(i).ok())
                .map(|i| EvaluationResult::single(Value::Integer(i)))
                .unwrap_or_else(EvaluationResult::empty)),
            Invocation::Total => Ok(scope
                .total
                .clone()
                .map(EvaluationResult::ordered)
                .unwrap_or_else(EvaluationResult::empty)),
        }
    }

    /// Evaluates argument `position` once, with the caller's focus.
    pub fn evaluate_argument(
        &mut self,
        site: &CallSite<'_>,
        position: usize,
    ) -> Result<EvaluationResult, EvaluationError> {
        let Some(expr) = site.args.get(position) else {
            return Ok(EvaluationResult::empty());
        };
        self.in_frame(|ev| ev.evaluate(site.this, expr, site.scope))
    }

    /// Evaluates argument `position` once, with the function's input as focus.
    pub fn evaluate_argument_on_input(
        &mut self,
        site: &CallSite<'_>,
        position: usize,
    ) -> Result<EvaluationResult, EvaluationError> {
        let Some(expr) = site.args.get(position) else {
            return Ok(EvaluationResult::empty());
        };
        self.in_frame(|ev| ev.evaluate(site.input, expr, site.scope))
    }

    /// Evaluates `expr` with `item` as `$this`, binding `$index` and,
    /// when given, `$total`.
    pub fn evaluate_for_item(
        &mut self,
        expr: &Expression,
        item: &Value,
        index: usize,
        total: Option<Collection>,
    ) -> Result<EvaluationResult, EvaluationError> {
        let focus = EvaluationResult::single(item.clone());
        let scope = FunctionScope {
            index: Some(index),
            total,
        };
        self.in_frame(|ev| ev.evaluate(&focus, expr, &scope))
    }

    /// A singleton String argument, `None` when the argument is empty.
    pub fn string_argument(
        &mut self,
        site: &CallSite<'_>,
        position: usize,
    ) -> Result<Option<String>, EvaluationError> {
        let value = self.evaluate_argument(site, position)?;
        match value.singleton(&format!("argument {} of {}()", position + 1, site.name))? {
            None => Ok(None),
            Some(item) => item.to_string_value(false)?.map(Some).ok_or_else(|| {
                EvaluationError::TypeError(format!(
                    "{}() expects a String argument, got {}",
                    site.name,
                    item.type_name()
                ))
            }),
        }
    }

    /// A singleton Integer argument, `None` when the argument is empty.
    pub fn integer_argument(
        &mut self,
        site: &CallSite<'_>,
        position: usize,
    ) -> Result<Option<i64>, EvaluationError> {
        let value = self.evaluate_argument(site, position)?;
        match value.singleton(&format!("argument {} of {}()", position + 1, site.name))? {
            None => Ok(None),
            Some(item) => item.to_long(false)?.map(Some).ok_or_else(|| {
                EvaluationError::TypeError(format!(
                    "{}() expects an Integer argument, got {}",
                    site.name,
                    item.type_name()
                ))
            }),
        }
    }
}

/// The System value a literal denotes; `None` for `{}`.
pub fn literal_value(literal: &Literal) -> Option<Value> {
    Some(match literal {
        Literal::Empty => return None,
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Integer(i) => Value::Integer(*i),
        Literal::Long(l) => Value::Long(*l),
        Literal::Decimal(d) => Value::Decimal(*d),
        Literal::Date(d) => Value::Date(*d),
        Literal::DateTime(dt) => Value::DateTime(*dt),
        Literal::Time(t) => Value::Time(*t),
        Literal::Quantity(q) => Value::Quantity(q.clone()),
    })
}

/// Member access on every input item, flattened. A leading identifier that
/// names the type of a focus item (`Patient.name` on a Patient) selects the
/// item itself.
fn member_access(input: &EvaluationResult, name: &str, leading: bool) -> EvaluationResult {
    let mut result = Collection::new();
    for item in input.collection.iter() {
        let children = item.member(name);
        if leading && children.is_empty() && names_type_of(item, name) {
            result.push(item.clone());
        } else {
            result.extend(children);
        }
    }
    EvaluationResult::new(result, input.ordered)
}

fn names_type_of(item: &Value, name: &str) -> bool {
    if !name.starts_with(|c: char| c.is_ascii_uppercase()) {
        return false;
    }
    match item.type_info() {
        info @ TypeInfo::Class { .. } => info.name() == Some(name),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use atrius_fhirpath_support::Value;

    fn eval(source: &str, context: &EvaluationContext) -> Result<EvaluationResult, EvaluationError> {
        let expr = parse(source)?;
        Evaluator::new(context, Collection::new()).run(&expr)
    }

    #[test]
    fn test_literals_and_empty() {
        let context = EvaluationContext::new();
        let result = eval("42", &context).unwrap();
        assert_eq!(result.collection.first(), Some(&Value::Integer(42)));
        assert!(result.ordered);
        assert!(eval("{}", &context).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_function_is_fatal() {
        let context = EvaluationContext::new();
        let err = eval("1.frobnicate()", &context).unwrap_err();
        assert!(matches!(err, EvaluationError::UnsupportedFunction(_)));
    }

    #[test]
    fn test_external_constants() {
        let context = EvaluationContext::new().with_variable("x", Collection::single(Value::Integer(5)));
        let result = eval("%x + 1", &context).unwrap();
        assert_eq!(result.collection.first(), Some(&Value::Integer(6)));
        let result = eval("%ucum", &context).unwrap();
        assert_eq!(result.collection.first(), Some(&Value::string(UCUM_SYSTEM)));
        assert!(matches!(
            eval("%missing", &context).unwrap_err(),
            EvaluationError::UndefinedVariable(_)
        ));
    }

    #[test]
    fn test_index_and_this_inside_iteration() {
        let context = EvaluationContext::new();
        let result = eval("(10 | 20 | 30).select($this + $index)", &context).unwrap();
        assert_eq!(
            result.collection.to_vec(),
            vec![Value::Integer(10), Value::Integer(21), Value::Integer(32)]
        );
    }

    #[test]
    fn test_sort_key_outside_sort_is_rejected() {
        let context = EvaluationContext::new();
        assert!(eval("(1 | 2).where($this desc)", &context).is_err());
    }
}
