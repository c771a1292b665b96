//! # FHIRPath Type Functions
//!
//! Implements type checking and introspection: the `is` and `as` operators,
//! and the `is()`, `as()`, `ofType()` and `type()` functions. Type names are
//! resolved through the context's type registry, unqualified names in the
//! default namespace first and then in `System`.

use std::any::Any;

use atrius_fhirpath_support::type_info::FHIR_NAMESPACE;
use atrius_fhirpath_support::{
    Collection, Element, EvaluationError, EvaluationResult, TypeInfo, TypeSpecifier, Value,
};

use crate::ast::{Expression, TypeOperator};
use crate::context::EvaluationContext;
use crate::evaluator::{CallSite, Evaluator};
use crate::function_registry::FunctionRegistry;

/// The object `type()` returns for each item: a reflection of its
/// [`TypeInfo`] exposing `namespace`, `name` and `baseType`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfoElement {
    info: TypeInfo,
}

impl TypeInfoElement {
    pub fn new(info: TypeInfo) -> Self {
        Self { info }
    }

    pub fn info(&self) -> &TypeInfo {
        &self.info
    }
}

impl Element for TypeInfoElement {
    fn type_info(&self) -> TypeInfo {
        let reflected = match &self.info {
            TypeInfo::Simple { .. } => "SimpleTypeInfo",
            TypeInfo::Class { .. } => "ClassInfo",
            TypeInfo::List { .. } => "ListTypeInfo",
            TypeInfo::Tuple { .. } => "TupleTypeInfo",
        };
        TypeInfo::system(reflected)
    }

    fn member(&self, name: &str) -> Collection {
        let value = match name {
            "namespace" => self.info.namespace().map(Value::string),
            "name" => self.info.name().map(Value::string),
            "baseType" => self.info.base_type_name().map(Value::string),
            "elementType" => match &self.info {
                TypeInfo::List { element_type } => Some(Value::string(element_type.as_str())),
                _ => None,
            },
            _ => None,
        };
        value.map(Collection::single).unwrap_or_default()
    }

    fn equal(&self, other: &Value) -> Option<bool> {
        match other {
            Value::Element(element) => Some(
                element
                    .as_any()
                    .downcast_ref::<TypeInfoElement>()
                    .is_some_and(|other| other == self),
            ),
            _ => Some(false),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Resolves `specifier` in the context's registry or fails.
pub fn resolve_type<'a>(
    context: &'a EvaluationContext,
    specifier: &TypeSpecifier,
) -> Result<&'a TypeInfo, EvaluationError> {
    context
        .types()
        .resolve(specifier, context.default_namespace())
        .ok_or_else(|| EvaluationError::InvalidTypeSpecifier(format!("Unknown type '{}'", specifier)))
}

/// The FHIR primitive a System value is read from in a FHIR document.
fn fhir_primitive_name(value: &Value) -> Option<&'static str> {
    Some(match value {
        Value::Boolean(_) => "boolean",
        Value::String(_) => "string",
        Value::Integer(_) => "integer",
        Value::Long(_) => "integer64",
        Value::Decimal(_) => "decimal",
        Value::Date(_) => "date",
        Value::DateTime(_) => "dateTime",
        Value::Time(_) => "time",
        Value::Quantity(_) | Value::Element(_) => return None,
    })
}

/// Whether `value` is of type `target` or one of its subtypes.
///
/// A System primitive also satisfies a FHIR target through its FHIR
/// primitive, so `active is boolean` holds for a JSON `true`.
pub fn is_of_type(
    context: &EvaluationContext,
    value: &Value,
    target: &TypeInfo,
) -> Result<bool, EvaluationError> {
    let types = context.types();
    if types.sub_type_of(&value.type_info(), target)? {
        return Ok(true);
    }
    if target.namespace() != Some(FHIR_NAMESPACE) {
        return Ok(false);
    }
    match fhir_primitive_name(value).and_then(|name| types.get(&format!("{}.{}", FHIR_NAMESPACE, name))) {
        Some(primitive) => types.sub_type_of(primitive, target),
        None => Ok(false),
    }
}

/// The `is` and `as` operators.
pub fn apply_type_operator(
    evaluator: &mut Evaluator<'_>,
    operand: &EvaluationResult,
    op: TypeOperator,
    specifier: &TypeSpecifier,
) -> Result<EvaluationResult, EvaluationError> {
    let context = evaluator.context();
    let target = resolve_type(context, specifier)?;
    let what = match op {
        TypeOperator::Is => "Operator 'is'",
        TypeOperator::As => "Operator 'as'",
    };
    let Some(value) = operand.singleton(what)? else {
        return Ok(EvaluationResult::empty());
    };
    let matches = is_of_type(context, value, target)?;
    Ok(match op {
        TypeOperator::Is => EvaluationResult::single(matches),
        TypeOperator::As if matches => EvaluationResult::single(value.clone()),
        TypeOperator::As => EvaluationResult::empty(),
    })
}

fn specifier_argument(site: &CallSite<'_>) -> Result<TypeSpecifier, EvaluationError> {
    site.expect_args(1, 1)?;
    site.args
        .first()
        .and_then(Expression::as_type_specifier)
        .ok_or_else(|| {
            EvaluationError::InvalidTypeSpecifier(format!(
                "{}() expects a type name, got '{}'",
                site.name,
                site.args.first().map(ToString::to_string).unwrap_or_default()
            ))
        })
}

fn is_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    let specifier = specifier_argument(site)?;
    apply_type_operator(evaluator, site.input, TypeOperator::Is, &specifier)
}

fn as_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    let specifier = specifier_argument(site)?;
    apply_type_operator(evaluator, site.input, TypeOperator::As, &specifier)
}

/// Keeps the items of the given type, in input order.
fn of_type_function(
    evaluator: &mut Evaluator<'_>,
    site: &CallSite<'_>,
) -> Result<EvaluationResult, EvaluationError> {
    let specifier = specifier_argument(site)?;
    let context = evaluator.context();
    let target = resolve_type(context, &specifier)?;
    let mut kept = Collection::new();
    for item in site.input.collection.iter() {
        if is_of_type(context, item, target)? {
            kept.push(item.clone());
        }
    }
    Ok(EvaluationResult::new(kept, site.input.ordered))
}

fn type_function(_evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    site.expect_args(0, 0)?;
    let types = site
        .input
        .collection
        .iter()
        .map(|item| Value::element(TypeInfoElement::new(item.type_info())))
        .collect();
    Ok(EvaluationResult::new(types, site.input.ordered))
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("is", is_function);
    registry.register("as", as_function);
    registry.register("ofType", of_type_function);
    registry.register("type", type_function);
}
