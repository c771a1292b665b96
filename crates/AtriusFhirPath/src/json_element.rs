//! # JSON-backed Elements
//!
//! [`JsonElement`] lets FHIRPath navigate plain JSON documents such as FHIR
//! resources in their JSON representation. Objects stay elements; scalars
//! become System values as soon as they are reached:
//!
//! | JSON                         | FHIRPath value                   |
//! |------------------------------|----------------------------------|
//! | `true` / `false`             | `Boolean`                        |
//! | `"text"`                     | `String`                         |
//! | integer in `i32` range       | `Integer`                        |
//! | other integer                | `Long`                           |
//! | fractional number            | `Decimal` (from the literal text)|
//! | object                       | element                          |
//! | array                        | its items, flattened             |
//! | `null`                       | nothing                          |
//!
//! An object carrying `resourceType` reports the FHIR class of that
//! resource. Below the root, an object takes the FHIR type named by its
//! choice suffix (`valueQuantity`), by a well-known element name (`name` is a
//! `HumanName`) or by its shape (a numeric `value` with a `unit` or `code` is
//! a `Quantity`). Any other object is an anonymous tuple.
//!
//! Choice primitives are read by their suffix, so `effectiveDateTime`
//! surfaces as a `DateTime` rather than a `String`.

use std::any::Any;
use std::str::FromStr;
use std::sync::Arc;

use atrius_fhirpath_support::fhir_types::{fhir_type_info, resource_type_info};
use atrius_fhirpath_support::{
    Collection, Conversion, Date, DateTime, Element, FieldInfo, Quantity, Time, TypeInfo, Value,
};
use rust_decimal::Decimal;
use serde_json::Value as Json;

const RESOURCE_TYPE: &str = "resourceType";

/// Object-valued elements whose FHIR type is the same wherever they occur.
const ELEMENT_TYPES_BY_NAME: &[(&str, &str)] = &[
    ("address", "Address"),
    ("category", "CodeableConcept"),
    ("coding", "Coding"),
    ("encounter", "Reference"),
    ("extension", "Extension"),
    ("generalPractitioner", "Reference"),
    ("identifier", "Identifier"),
    ("managingOrganization", "Reference"),
    ("maritalStatus", "CodeableConcept"),
    ("meta", "Meta"),
    ("modifierExtension", "Extension"),
    ("name", "HumanName"),
    ("period", "Period"),
    ("photo", "Attachment"),
    ("subject", "Reference"),
    ("telecom", "ContactPoint"),
    ("text", "Narrative"),
];

#[derive(Debug, Clone)]
pub struct JsonElement {
    json: Arc<Json>,
    fhir_type: Option<String>,
}

impl JsonElement {
    pub fn new(json: Json) -> Self {
        Self::typed(json, None)
    }

    /// An element whose FHIR type is known from where it was found. Names
    /// the catalog does not list are ignored.
    fn typed(json: Json, hint: Option<&str>) -> Self {
        let fhir_type = object_type(&json, hint);
        Self {
            json: Arc::new(json),
            fhir_type,
        }
    }

    /// Converts one JSON value: scalars become System values, everything
    /// else is wrapped as an element.
    pub fn value(json: Json) -> Value {
        match primitive(&json) {
            Some(value) => value,
            None => Value::element(JsonElement::new(json)),
        }
    }

    /// Converts a JSON document into a collection, flattening arrays and
    /// dropping nulls.
    pub fn collection(json: &Json) -> Collection {
        let mut collection = Collection::new();
        push_json(json, None, &mut collection);
        collection
    }

    pub fn json(&self) -> &Json {
        &self.json
    }

    fn resource_type(&self) -> Option<&str> {
        self.json.get(RESOURCE_TYPE).and_then(Json::as_str)
    }
}

fn number(n: &serde_json::Number) -> Option<Value> {
    if let Some(i) = n.as_i64() {
        return Some(match i32::try_from(i) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Long(i),
        });
    }
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
        .map(Value::Decimal)
}

fn primitive(json: &Json) -> Option<Value> {
    match json {
        Json::Bool(b) => Some(Value::Boolean(*b)),
        Json::String(s) => Some(Value::String(s.clone())),
        Json::Number(n) => number(n),
        _ => None,
    }
}

/// A choice primitive read by its type suffix. Text that does not parse
/// stays a `String`.
fn choice_primitive(json: &Json, suffix: &str) -> Option<Value> {
    let Json::String(text) = json else {
        return primitive(json);
    };
    let converted = match suffix {
        "Date" => Date::parse(text).ok().flatten().map(Value::Date),
        "DateTime" | "Instant" => DateTime::parse(text).ok().flatten().map(Value::DateTime),
        "Time" => Time::parse(text).ok().flatten().map(Value::Time),
        _ => None,
    };
    converted.or_else(|| primitive(json))
}

fn is_quantity_shaped(object: &serde_json::Map<String, Json>) -> bool {
    object.get("value").is_some_and(Json::is_number)
        && (object.contains_key("unit") || object.contains_key("code"))
}

fn object_type(json: &Json, hint: Option<&str>) -> Option<String> {
    let object = json.as_object()?;
    if let Some(name) = hint.filter(|name| fhir_type_info(name).is_some()) {
        return Some(name.to_string());
    }
    is_quantity_shaped(object).then(|| "Quantity".to_string())
}

/// `hint` is the choice suffix or element type the value was found under.
fn push_json(json: &Json, hint: Option<&str>, out: &mut Collection) {
    match json {
        Json::Null => {}
        Json::Array(items) => {
            for item in items {
                push_json(item, hint, out);
            }
        }
        Json::Object(_) => out.push(Value::element(JsonElement::typed(json.clone(), hint))),
        scalar => {
            let value = match hint {
                Some(suffix) => choice_primitive(scalar, suffix),
                None => primitive(scalar),
            };
            if let Some(value) = value {
                out.push(value);
            }
        }
    }
}

/// The type suffix when `key` is a choice of `name`: `valueQuantity` gives
/// `Quantity` for `value`; `valueset` is not a choice of `value`.
fn choice_suffix<'a>(key: &'a str, name: &str) -> Option<&'a str> {
    key.strip_prefix(name)
        .filter(|suffix| suffix.chars().next().is_some_and(|c| c.is_ascii_uppercase()))
}

fn child_hint(key: &str) -> Option<&'static str> {
    ELEMENT_TYPES_BY_NAME
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, type_name)| *type_name)
}

impl Element for JsonElement {
    fn type_info(&self) -> TypeInfo {
        if let Some(resource_type) = self.resource_type() {
            return resource_type_info(resource_type);
        }
        if let Some(info) = self.fhir_type.as_deref().and_then(fhir_type_info) {
            return info;
        }
        let fields = match self.json.as_object() {
            Some(object) => object.keys().map(|key| FieldInfo::new(key, "System.Any")).collect(),
            None => Vec::new(),
        };
        TypeInfo::Tuple { fields }
    }

    fn member(&self, name: &str) -> Collection {
        let Some(object) = self.json.as_object() else {
            return Collection::new();
        };
        let mut result = Collection::new();
        match object.get(name) {
            Some(child) => push_json(child, child_hint(name), &mut result),
            None => {
                for (key, child) in object {
                    if let Some(suffix) = choice_suffix(key, name) {
                        push_json(child, Some(suffix), &mut result);
                    }
                }
            }
        }
        result
    }

    fn children(&self) -> Collection {
        let mut result = Collection::new();
        if let Some(object) = self.json.as_object() {
            for (key, child) in object.iter().filter(|(key, _)| key.as_str() != RESOURCE_TYPE) {
                push_json(child, child_hint(key), &mut result);
            }
        }
        result
    }

    /// A Quantity-shaped object: a numeric `value` with a `code` or `unit`.
    fn to_quantity(&self, _explicit: bool) -> Conversion<Quantity> {
        let Some(amount) = self.json.get("value").and_then(|v| match v {
            Json::Number(n) => number(n).and_then(|value| value.numeric_value()),
            _ => None,
        }) else {
            return Ok(None);
        };
        let unit = ["code", "unit"]
            .iter()
            .find_map(|key| self.json.get(*key).and_then(Json::as_str));
        Ok(Some(match unit {
            Some(unit) => Quantity::new(amount, unit),
            None => Quantity::unitless(amount),
        }))
    }

    fn equal(&self, other: &Value) -> Option<bool> {
        match other {
            Value::Element(element) => Some(
                element
                    .as_any()
                    .downcast_ref::<JsonElement>()
                    .is_some_and(|other| self.json == other.json),
            ),
            _ => Some(false),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluationContext;
    use crate::evaluate_expression;
    use atrius_fhirpath_support::{EvaluationError, EvaluationResult};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn observation() -> Collection {
        JsonElement::collection(&json!({
            "resourceType": "Observation",
            "status": "final",
            "code": {"coding": [{"system": "http://loinc.org", "code": "29463-7"}]},
            "valueQuantity": {"value": 72.50, "unit": "kg", "code": "kg"},
            "component": [
                {"valueInteger": 3},
                {"valueInteger": 3000000000i64},
                {"valueString": null}
            ]
        }))
    }

    fn eval(source: &str) -> Result<EvaluationResult, EvaluationError> {
        evaluate_expression(source, &observation(), &EvaluationContext::fhir())
    }

    #[test]
    fn test_scalars_become_system_values() {
        assert_eq!(eval("status").unwrap().collection.to_vec(), vec![Value::string("final")]);
        assert_eq!(
            eval("component.value").unwrap().collection.to_vec(),
            vec![Value::Integer(3), Value::Long(3_000_000_000)]
        );
        assert_eq!(
            JsonElement::value(json!(72.50)),
            Value::Decimal(dec!(72.50))
        );
    }

    #[test]
    fn test_arrays_flatten() {
        assert_eq!(
            eval("code.coding.code").unwrap().collection.to_vec(),
            vec![Value::string("29463-7")]
        );
        assert!(eval("missing").unwrap().is_empty());
    }

    #[test]
    fn test_choice_element_and_quantity() {
        let result = eval("value.toQuantity()").unwrap();
        assert_eq!(result.collection[0], Value::Quantity(Quantity::new(dec!(72.50), "kg")));
        assert_eq!(eval("value > 70 'kg'").unwrap().collection[0], Value::Boolean(true));
        assert!(eval("valu").unwrap().is_empty());
    }

    #[test]
    fn test_resource_type_info() {
        assert_eq!(eval("Observation.status").unwrap().len(), 1);
        assert_eq!(eval("$this is Observation").unwrap().collection[0], Value::Boolean(true));
        assert_eq!(eval("$this is Resource").unwrap().collection[0], Value::Boolean(true));
        let tuple = JsonElement::new(json!({"a": 1}));
        assert!(matches!(tuple.type_info(), TypeInfo::Tuple { .. }));
    }

    #[test]
    fn test_choice_suffix_types() {
        assert_eq!(eval("value.ofType(Quantity)").unwrap().len(), 1);
        assert_eq!(eval("value is Quantity").unwrap().collection[0], Value::Boolean(true));
        assert_eq!(eval("value is Age").unwrap().collection[0], Value::Boolean(false));
        assert_eq!(eval("value.type().name").unwrap().collection[0], Value::string("Quantity"));
        assert!(eval("component.value.ofType(Quantity)").unwrap().is_empty());
        assert_eq!(eval("code.coding is Coding").unwrap().collection[0], Value::Boolean(true));
    }

    #[test]
    fn test_choice_primitives_read_by_suffix() {
        let condition = JsonElement::collection(&json!({
            "resourceType": "Condition",
            "onsetDateTime": "2021-03-04T10:00:00Z",
            "abatementString": "2021-06-01",
            "recordedDate": "2021-03-05"
        }));
        let context = EvaluationContext::fhir();
        let onset = evaluate_expression("onset", &condition, &context).unwrap();
        assert!(matches!(onset.collection[0], Value::DateTime(_)));
        let abatement = evaluate_expression("abatement", &condition, &context).unwrap();
        assert_eq!(abatement.collection[0], Value::string("2021-06-01"));
        let recorded = evaluate_expression("recordedDate", &condition, &context).unwrap();
        assert_eq!(recorded.collection[0], Value::string("2021-03-05"));
    }

    #[test]
    fn test_quantity_shaped_objects() {
        let shaped = JsonElement::new(json!({"value": 5, "unit": "mg"}));
        assert_eq!(shaped.type_info().qualified_name().as_deref(), Some("FHIR.Quantity"));
        let coding = JsonElement::new(json!({"system": "s", "code": "c"}));
        assert!(matches!(coding.type_info(), TypeInfo::Tuple { .. }));
    }

    #[test]
    fn test_structural_equality() {
        let a = JsonElement::new(json!({"system": "s", "code": "c"}));
        let b = JsonElement::value(json!({"system": "s", "code": "c"}));
        let c = JsonElement::value(json!({"system": "s", "code": "d"}));
        assert_eq!(a.equal(&b), Some(true));
        assert_eq!(a.equal(&c), Some(false));
        assert_eq!(a.equal(&Value::string("c")), Some(false));
    }
}
