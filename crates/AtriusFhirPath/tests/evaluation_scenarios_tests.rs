mod common;

use atrius_fhir_path::{EvaluationError, Value};
use atrius_fhirpath_support::Quantity;
use common::{assert_boolean, assert_empty, eval, texts, values};
use rust_decimal_macros::dec;

#[test]
fn test_month_end_clamping() {
    assert_eq!(texts("@2020-01-31 + 1 month"), vec!["@2020-02-29"]);
    assert_eq!(texts("@2019-01-31 + 1 month"), vec!["@2019-02-28"]);
    assert_eq!(texts("@2020-03-31 - 1 month"), vec!["@2020-02-29"]);
}

#[test]
fn test_where_keeps_order() {
    let result = eval("(1 | 2 | 3).where($this > 2)").unwrap();
    assert_eq!(result.collection.to_vec(), vec![Value::Integer(3)]);
    assert!(result.ordered);
}

#[test]
fn test_empty() {
    assert_boolean("{}.empty()", true);
    assert_boolean("(1).empty()", false);
}

#[test]
fn test_quantity_conversion_and_equivalence() {
    assert_eq!(
        values("4000 'mg'.toQuantity('g')"),
        vec![Value::Quantity(Quantity::new(dec!(4), "g"))]
    );
    assert_boolean("4 'g' ~ 4040 'mg'", true);
    assert_boolean("4 'g' = 4040 'mg'", false);
    assert_boolean("4 'g' = 4000 'mg'", true);
}

#[test]
fn test_replace() {
    assert_eq!(values("'hello world'.replace('hello', 'hi')"), vec![Value::string("hi world")]);
    assert_eq!(values("''.replace('', 'X')"), vec![Value::string("X")]);
    assert_eq!(values("'abc'.replace('', 'X')"), vec![Value::string("XaXbXcX")]);
}

#[test]
fn test_iif_requires_singleton_input() {
    assert!(matches!(
        eval("(1 | 2).iif(true, 1)"),
        Err(EvaluationError::SingletonEvaluationError(_))
    ));
    assert_eq!(values("{}.iif(true, 1)"), vec![Value::Integer(1)]);
    assert_eq!(values("iif({}, 1, 2)"), vec![Value::Integer(2)]);
    assert_empty("iif(false, 1)");
}

#[test]
fn test_distinct_is_idempotent() {
    let once = eval("(1 | 1 | 2 | 2.0).combine(3 | 3).distinct()").unwrap();
    let twice = eval("(1 | 1 | 2 | 2.0).combine(3 | 3).distinct().distinct()").unwrap();
    assert_eq!(once.collection.len(), 3);
    assert_eq!(once.collection.to_vec(), twice.collection.to_vec());
    assert_boolean("(1 | 2 | 3).isDistinct()", true);
    assert_boolean("(1).combine(1).isDistinct()", false);
}

#[test]
fn test_define_variable_chain() {
    assert_eq!(
        values("5.defineVariable('base', 10).select(%base * 2) | 1"),
        vec![Value::Integer(20), Value::Integer(1)]
    );
    assert!(matches!(
        eval("defineVariable('resource', 1)"),
        Err(EvaluationError::SemanticError(_))
    ));
}

#[test]
fn test_unknown_names_are_fatal() {
    assert!(matches!(eval("1.nothing()"), Err(EvaluationError::UnsupportedFunction(_))));
    assert!(matches!(eval("%missing"), Err(EvaluationError::UndefinedVariable(_))));
    assert!(matches!(eval("1 +"), Err(EvaluationError::Parse(_))));
}

#[test]
fn test_singleton_operands() {
    assert!(matches!(
        eval("(1 | 2) + 1"),
        Err(EvaluationError::SingletonEvaluationError(_))
    ));
    assert_empty("{} + 1");
    assert!(matches!(eval("'a' + 1"), Err(EvaluationError::TypeError(_))));
}

#[test]
fn test_three_valued_logic() {
    assert_empty("{} and true");
    assert_boolean("{} and false", false);
    assert_boolean("{} or true", true);
    assert_boolean("false implies {}", true);
    assert_empty("true implies {}");
    assert_boolean("true xor false", true);
}

#[test]
fn test_arithmetic() {
    assert_eq!(values("7 div 2"), vec![Value::Integer(3)]);
    assert_eq!(values("7 mod 2"), vec![Value::Integer(1)]);
    assert_eq!(values("7 / 2"), vec![Value::Decimal(dec!(3.5))]);
    assert_empty("1 / 0");
    assert_eq!(values("'a' & {} & 'b'"), vec![Value::string("ab")]);
    assert_eq!(values("2147483647 + 1"), Vec::<Value>::new());
}
