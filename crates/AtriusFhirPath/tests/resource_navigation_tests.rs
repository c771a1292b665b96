mod common;

use atrius_fhir_path::{Collection, EvaluationContext, EvaluationError, JsonElement, Value};
use common::{eval_json, run};
use serde_json::{Value as Json, json};

fn patient() -> Json {
    json!({
        "resourceType": "Patient",
        "id": "example",
        "active": true,
        "name": [
            {"use": "official", "family": "Chalmers", "given": ["Peter", "James"]},
            {"use": "usual", "given": ["Jim"]},
            {"use": "maiden", "family": "Windsor", "given": ["Peter", "James"]}
        ],
        "telecom": [
            {"system": "phone", "value": "(03) 5555 6473", "rank": 1},
            {"system": "email", "value": "p@example.org"}
        ],
        "gender": "male",
        "birthDate": "1974-12-25",
        "multipleBirthInteger": 2,
        "contact": [{"name": {"family": "du Marché", "given": ["Bénédicte"]}}]
    })
}

fn items(expression: &str) -> Vec<Value> {
    eval_json(expression, &patient())
        .unwrap_or_else(|e| panic!("'{}' failed: {}", expression, e))
        .collection
        .to_vec()
}

fn strings(values: &[&str]) -> Vec<Value> {
    values.iter().map(|s| Value::string(*s)).collect()
}

#[test]
fn test_path_navigation() {
    assert_eq!(items("Patient.name.family"), strings(&["Chalmers", "Windsor"]));
    assert_eq!(items("name.given"), strings(&["Peter", "James", "Jim", "Peter", "James"]));
    assert_eq!(items("Patient.contact.name.given"), strings(&["Bénédicte"]));
    assert!(items("Patient.deceased").is_empty());
}

#[test]
fn test_filtering_and_projection() {
    assert_eq!(items("telecom.where(system = 'email').value"), strings(&["p@example.org"]));
    assert_eq!(
        items("name.where(use = 'usual').given.first()"),
        strings(&["Jim"])
    );
    assert_eq!(items("name.select(given.count())"), vec![Value::Integer(2), Value::Integer(1), Value::Integer(2)]);
    assert_eq!(items("name.given.distinct().count()"), vec![Value::Integer(3)]);
    assert_eq!(items("name.exists(family = 'Windsor')"), vec![Value::Boolean(true)]);
    assert_eq!(items("name.all(given.exists())"), vec![Value::Boolean(true)]);
}

#[test]
fn test_indexer_and_subsetting() {
    assert_eq!(items("name[1].given"), strings(&["Jim"]));
    assert!(items("name[5]").is_empty());
    assert_eq!(items("name.given.skip(3).take(1)"), strings(&["Peter"]));
    assert_eq!(items("name.last().family"), strings(&["Windsor"]));
}

#[test]
fn test_choice_elements() {
    assert_eq!(items("multipleBirth"), vec![Value::Integer(2)]);
    assert_eq!(items("multipleBirth is Integer"), vec![Value::Boolean(true)]);
}

#[test]
fn test_types() {
    assert_eq!(items("$this is Patient"), vec![Value::Boolean(true)]);
    assert_eq!(items("$this is DomainResource"), vec![Value::Boolean(true)]);
    assert_eq!(items("$this is Observation"), vec![Value::Boolean(false)]);
    assert_eq!(items("Patient.type().name"), strings(&["Patient"]));
    assert_eq!(items("Patient.type().namespace"), strings(&["FHIR"]));
    assert_eq!(items("active.type().namespace"), strings(&["System"]));
    assert!(matches!(
        eval_json("$this is UnknownThing", &patient()),
        Err(EvaluationError::InvalidTypeSpecifier(_))
    ));
}

#[test]
fn test_fhir_types_below_the_root() {
    assert_eq!(items("name.first() is HumanName"), vec![Value::Boolean(true)]);
    assert_eq!(items("telecom.ofType(ContactPoint).count()"), vec![Value::Integer(2)]);
    assert_eq!(items("contact.name is HumanName"), vec![Value::Boolean(true)]);
    assert_eq!(items("active is boolean"), vec![Value::Boolean(true)]);
    assert_eq!(items("gender is string"), vec![Value::Boolean(true)]);
    assert_eq!(items("active is string"), vec![Value::Boolean(false)]);
    assert_eq!(items("name.first().as(HumanName).family"), strings(&["Chalmers"]));

    let deceased = JsonElement::collection(&json!({"resourceType": "Patient", "deceasedBoolean": false}));
    let result = run("deceased is boolean", &deceased, &EvaluationContext::fhir()).unwrap();
    assert_eq!(result.collection.to_vec(), vec![Value::Boolean(true)]);
}

#[test]
fn test_environment_variables() {
    assert_eq!(items("%resource.id"), strings(&["example"]));
    assert_eq!(items("name.select(%context.id)").len(), 3);
    assert_eq!(items("%ucum"), strings(&["http://unitsofmeasure.org"]));
    assert_eq!(items("name.given.select($index)").len(), 5);
}

#[test]
fn test_temporal_strings_compare_with_literals() {
    assert_eq!(items("birthDate < @2000-01-01"), vec![Value::Boolean(true)]);
    assert_eq!(items("birthDate = @1974-12-25"), vec![Value::Boolean(true)]);
}

#[test]
fn test_ordered_function_checks() {
    let root = JsonElement::collection(&patient());
    let checked = EvaluationContext::fhir();
    assert!(matches!(
        run("children().first()", &root, &checked),
        Err(EvaluationError::SemanticError(_))
    ));
    let relaxed = EvaluationContext::fhir().with_ordered_function_checks(false);
    assert_eq!(run("children().first()", &root, &relaxed).unwrap().len(), 1);
}

#[test]
fn test_descendants_and_repeat() {
    assert_eq!(
        items("descendants().where($this = 'Bénédicte').count()"),
        vec![Value::Integer(1)]
    );
    assert_eq!(
        items("repeat(name).family.distinct()").len(),
        2
    );
}

#[test]
fn test_external_constants() {
    let context = EvaluationContext::fhir().with_variable("wanted", Collection::single(Value::string("email")));
    let result = run(
        "telecom.where(system = %wanted).value",
        &JsonElement::collection(&patient()),
        &context,
    )
    .unwrap();
    assert_eq!(result.collection.to_vec(), strings(&["p@example.org"]));
}
