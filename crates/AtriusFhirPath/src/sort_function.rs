//! # FHIRPath Sort Function
//!
//! Implements `sort()`. Without arguments items are compared directly; each
//! argument is a key expression evaluated per item, optionally suffixed with
//! `asc` or `desc`. Ties fall through to the next key and the sort is
//! stable. An item whose key is empty sorts before every item with a key,
//! whatever the direction. Two keys whose order is undetermined, such as
//! `@2020` and `@2020-06`, fail the sort.

use std::cmp::Ordering;

use atrius_fhirpath_support::{Collection, EvaluationError, EvaluationResult, Value};

use crate::ast::{Expression, SortDirection};
use crate::context::EvaluationContext;
use crate::evaluator::{CallSite, Evaluator};
use crate::function_registry::FunctionRegistry;
use crate::operators::compare_values;

fn split_key(arg: &Expression) -> (&Expression, SortDirection) {
    match arg {
        Expression::SortKey(key, direction) => (key.as_ref(), *direction),
        other => (other, SortDirection::Ascending),
    }
}

fn compare_keys(
    context: &EvaluationContext,
    left: Option<&Value>,
    right: Option<&Value>,
    direction: SortDirection,
) -> Result<Ordering, EvaluationError> {
    Ok(match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            let order = compare_values(context, a, b)?.ok_or_else(|| {
                EvaluationError::InvalidOperation(format!(
                    "sort() cannot order {} and {}: their precisions differ",
                    a, b
                ))
            })?;
            match direction {
                SortDirection::Ascending => order,
                SortDirection::Descending => order.reverse(),
            }
        }
    })
}

/// Implements the FHIRPath sort() function
///
/// # Syntax
/// `sort([key: expression [asc | desc], ...]) : collection`
///
/// # Returns
///
/// * The input items in sorted order, reported as ordered
/// * `Err` - If a key yields more than one item, or two keys cannot be
///   compared
fn sort_function(evaluator: &mut Evaluator<'_>, site: &CallSite<'_>) -> Result<EvaluationResult, EvaluationError> {
    let keys: Vec<(&Expression, SortDirection)> = site.args.iter().map(split_key).collect();

    // One row per item: the item and its key values.
    let mut rows: Vec<(Value, Vec<Option<Value>>)> = Vec::with_capacity(site.input.len());
    for (index, item) in site.input.collection.iter().enumerate() {
        let mut values = Vec::with_capacity(keys.len().max(1));
        if keys.is_empty() {
            values.push(Some(item.clone()));
        }
        for (key, _) in &keys {
            let result = evaluator.evaluate_for_item(key, item, index, None)?;
            values.push(result.singleton("sort() key")?.cloned());
        }
        rows.push((item.clone(), values));
    }

    let directions: Vec<SortDirection> = if keys.is_empty() {
        vec![SortDirection::Ascending]
    } else {
        keys.iter().map(|(_, direction)| *direction).collect()
    };
    let context = evaluator.context();
    let sorted = merge_sort(rows, &mut |(_, left), (_, right)| {
        for (position, direction) in directions.iter().enumerate() {
            match compare_keys(context, left[position].as_ref(), right[position].as_ref(), *direction)? {
                Ordering::Equal => continue,
                order => return Ok(order),
            }
        }
        Ok(Ordering::Equal)
    })?;
    let sorted: Collection = sorted.into_iter().map(|(item, _)| item).collect();
    Ok(EvaluationResult::ordered(sorted))
}

/// Stable merge sort whose comparator may fail. The first error stops the
/// sort.
fn merge_sort<T, F>(mut items: Vec<T>, compare: &mut F) -> Result<Vec<T>, EvaluationError>
where
    F: FnMut(&T, &T) -> Result<Ordering, EvaluationError>,
{
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, compare)?;
    let right = merge_sort(right, compare)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        // Equal keys keep the left run first.
        let next = if compare(l, r)? == Ordering::Greater {
            right.next()
        } else {
            left.next()
        };
        merged.extend(next);
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("sort", sort_function);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate_expression;
    use crate::json_element::JsonElement;
    use serde_json::json;

    fn eval(source: &str) -> Result<EvaluationResult, EvaluationError> {
        evaluate_expression(source, &Collection::new(), &EvaluationContext::new())
    }

    fn integers(values: &[i32]) -> Vec<Value> {
        values.iter().copied().map(Value::Integer).collect()
    }

    #[test]
    fn test_sort_without_keys() {
        let result = eval("(3 | 1 | 2).sort()").unwrap();
        assert_eq!(result.collection.to_vec(), integers(&[1, 2, 3]));
        assert!(result.ordered);
    }

    #[test]
    fn test_sort_descending_key() {
        assert_eq!(eval("(3 | 1 | 2).sort($this desc)").unwrap().collection.to_vec(), integers(&[3, 2, 1]));
        assert_eq!(eval("(3 | 1 | 2).sort(-$this)").unwrap().collection.to_vec(), integers(&[3, 2, 1]));
    }

    #[test]
    fn test_sort_unordered_input_becomes_ordered() {
        let result = eval("(2 | 1).distinct().sort()").unwrap();
        assert!(result.ordered);
    }

    #[test]
    fn test_sort_multiple_keys_and_empty_first() {
        let people = Collection::from_vec(vec![
            JsonElement::value(json!({"family": "Smith", "given": "Zoe"})),
            JsonElement::value(json!({"given": "Nobody"})),
            JsonElement::value(json!({"family": "Jones", "given": "Ann"})),
            JsonElement::value(json!({"family": "Smith", "given": "Adam"})),
        ]);
        let context = EvaluationContext::new();
        let result = evaluate_expression("sort(family desc, given).given", &people, &context).unwrap();
        assert_eq!(
            result.collection.to_vec(),
            vec![
                Value::string("Nobody"),
                Value::string("Adam"),
                Value::string("Zoe"),
                Value::string("Ann")
            ]
        );
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let rows = Collection::from_vec(vec![
            JsonElement::value(json!({"k": 2, "id": "a"})),
            JsonElement::value(json!({"k": 1, "id": "b"})),
            JsonElement::value(json!({"k": 2, "id": "c"})),
            JsonElement::value(json!({"k": 1, "id": "d"})),
            JsonElement::value(json!({"k": 2, "id": "e"})),
        ]);
        let result = evaluate_expression("sort(k).id", &rows, &EvaluationContext::new()).unwrap();
        assert_eq!(
            result.collection.to_vec(),
            ["b", "d", "a", "c", "e"].into_iter().map(Value::string).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_sort_rejects_mixed_precision_keys() {
        assert!(matches!(
            eval("(@2021-03 | @2020 | @2020-06).sort()"),
            Err(EvaluationError::InvalidOperation(_))
        ));
        let dates = (1..=40)
            .map(|day| format!("@2020-01-{:02}", (day % 28) + 1))
            .chain(std::iter::once("@2020".to_string()))
            .collect::<Vec<_>>()
            .join(" | ");
        assert!(eval(&format!("({}).sort()", dates)).is_err());
        assert_eq!(
            eval("(@2020-03 | @2019-01 | @2020-01).sort()").unwrap().collection.len(),
            3
        );
    }

    #[test]
    fn test_sort_key_must_be_singleton() {
        assert!(eval("(1 | 2).sort($this | 5)").is_err());
    }
}
