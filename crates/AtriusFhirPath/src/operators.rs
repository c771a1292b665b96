//! # FHIRPath Operators
//!
//! Equality, equivalence, comparison, arithmetic, string concatenation,
//! membership, union and three-valued logic over evaluated operands.
//!
//! Operators that need scalar operands apply the singleton rule: an empty
//! operand yields an empty result and more than one item is an error.

use std::cmp::Ordering;

use atrius_fhirpath_support::value::decimal_equivalent;
use atrius_fhirpath_support::{
    CalendarUnit, Element, EvaluationError, EvaluationResult, Quantity, Value,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::ast::{BinaryOperator, Polarity};
use crate::context::EvaluationContext;
use crate::date_operation;
use crate::evaluator::Evaluator;
use crate::set_operations;

pub fn binary(
    evaluator: &mut Evaluator<'_>,
    op: BinaryOperator,
    left: &EvaluationResult,
    right: &EvaluationResult,
) -> Result<EvaluationResult, EvaluationError> {
    let context = evaluator.context();
    match op {
        BinaryOperator::Equal => Ok(boolean_result(equality(context, left, right))),
        BinaryOperator::NotEqual => Ok(boolean_result(equality(context, left, right).map(|b| !b))),
        BinaryOperator::Equivalent => Ok(EvaluationResult::single(equivalence(context, left, right))),
        BinaryOperator::NotEquivalent => {
            Ok(EvaluationResult::single(!equivalence(context, left, right)))
        }
        BinaryOperator::LessThan
        | BinaryOperator::LessOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterOrEqual => comparison(context, op, left, right),
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Div
        | BinaryOperator::Mod => arithmetic(context, op, left, right),
        BinaryOperator::Concatenate => concatenate(left, right),
        BinaryOperator::Union => Ok(EvaluationResult::new(
            set_operations::union_values(context, &left.collection, &right.collection),
            left.ordered && right.ordered,
        )),
        BinaryOperator::In => membership(context, op, left, right),
        BinaryOperator::Contains => membership(context, op, right, left),
        BinaryOperator::And
        | BinaryOperator::Or
        | BinaryOperator::Xor
        | BinaryOperator::Implies => logic(op, left, right),
    }
}

fn boolean_result(value: Option<bool>) -> EvaluationResult {
    value
        .map(EvaluationResult::single)
        .unwrap_or_else(EvaluationResult::empty)
}

fn operand<'a>(
    result: &'a EvaluationResult,
    op: BinaryOperator,
) -> Result<Option<&'a Value>, EvaluationError> {
    result.singleton(&format!("Operator '{}'", op.symbol()))
}

/// Quantity-shaped elements take part in operators as System quantities.
fn comparable_form(value: &Value) -> Value {
    if let Value::Element(element) = value {
        if let Ok(Some(quantity)) = element.to_quantity(false) {
            return Value::Quantity(quantity);
        }
    }
    value.clone()
}

/// Reads a string operand as the temporal kind of the other operand.
fn string_as_temporal(text: &str, like: &Value) -> Option<Value> {
    match like {
        Value::Date(_) => Value::string(text).to_date(true).ok().flatten().map(Value::Date),
        Value::DateTime(_) => Value::string(text)
            .to_date_time(true)
            .ok()
            .flatten()
            .map(Value::DateTime),
        Value::Time(_) => Value::string(text).to_time(true).ok().flatten().map(Value::Time),
        _ => None,
    }
}

fn is_temporal(value: &Value) -> bool {
    matches!(value, Value::Date(_) | Value::DateTime(_) | Value::Time(_))
}

fn is_year_or_month(quantity: &Quantity) -> bool {
    matches!(
        quantity.calendar_unit(),
        Some(CalendarUnit::Year | CalendarUnit::Month)
    )
}

fn months(quantity: &Quantity) -> Option<Decimal> {
    match quantity.calendar_unit()? {
        CalendarUnit::Year => quantity.value.checked_mul(Decimal::from(12)),
        CalendarUnit::Month => Some(quantity.value),
        _ => None,
    }
}

/// Magnitudes of two quantities in a common unit, or `None` when the units
/// cannot be reconciled. Calendar years and months only reconcile with each
/// other unless `definite` is set, which reads them as the UCUM `a` and `mo`.
fn reconcile(
    context: &EvaluationContext,
    left: &Quantity,
    right: &Quantity,
    definite: bool,
) -> Option<(Decimal, Decimal)> {
    if left.unit == right.unit {
        return Some((left.value, right.value));
    }
    if !definite && (is_year_or_month(left) || is_year_or_month(right)) {
        return Some((months(left)?, months(right)?));
    }
    let (from, to) = (right.ucum_unit(), left.ucum_unit());
    if from == to {
        return Some((left.value, right.value));
    }
    let converter = context.unit_converter();
    if !converter.comparable(from, to) {
        return None;
    }
    let converted = converter
        .convert(right.value, from, to, context.decimal_context())
        .ok()?;
    Some((left.value, converted))
}

fn compare_quantities(
    context: &EvaluationContext,
    left: &Quantity,
    right: &Quantity,
) -> Option<Ordering> {
    let (a, b) = reconcile(context, left, right, false)?;
    Some(a.cmp(&b))
}

fn quantities_equivalent(context: &EvaluationContext, left: &Quantity, right: &Quantity) -> bool {
    let forward = reconcile(context, left, right, true)
        .is_some_and(|(a, b)| decimal_equivalent(a, b.normalize()));
    forward
        || reconcile(context, right, left, true)
            .is_some_and(|(a, b)| decimal_equivalent(a, b.normalize()))
}

/// `=` on single values. `None` when equality cannot be decided, for example
/// dates of different precision or quantities with unrelated units.
pub fn values_equal(context: &EvaluationContext, left: &Value, right: &Value) -> Option<bool> {
    let left = comparable_form(left);
    let right = comparable_form(right);
    match (&left, &right) {
        (Value::Quantity(a), Value::Quantity(b)) => {
            compare_quantities(context, a, b).map(|o| o.is_eq())
        }
        (Value::String(s), other) if is_temporal(other) => match string_as_temporal(s, other) {
            Some(parsed) => parsed.equal(other),
            None => Some(false),
        },
        (other, Value::String(s)) if is_temporal(other) => match string_as_temporal(s, other) {
            Some(parsed) => other.equal(&parsed),
            None => Some(false),
        },
        _ => left.equal(&right),
    }
}

/// `~` on single values.
pub fn values_equivalent(context: &EvaluationContext, left: &Value, right: &Value) -> bool {
    let left = comparable_form(left);
    let right = comparable_form(right);
    match (&left, &right) {
        (Value::Quantity(a), Value::Quantity(b)) => quantities_equivalent(context, a, b),
        (Value::String(s), other) | (other, Value::String(s)) if is_temporal(other) => {
            string_as_temporal(s, other).is_some_and(|parsed| parsed.equivalent(other))
        }
        _ => left.equivalent(&right),
    }
}

/// Whether some item of `collection` is `=` to `value`.
pub fn contains_equal(context: &EvaluationContext, collection: &[Value], value: &Value) -> bool {
    collection
        .iter()
        .any(|item| values_equal(context, item, value) == Some(true))
}

/// Collection `=`: empty when either side is empty, pairwise in order
/// otherwise.
pub fn equality(
    context: &EvaluationContext,
    left: &EvaluationResult,
    right: &EvaluationResult,
) -> Option<bool> {
    if left.is_empty() || right.is_empty() {
        return None;
    }
    if left.len() != right.len() {
        return Some(false);
    }
    let mut undecided = false;
    for (a, b) in left.collection.iter().zip(right.collection.iter()) {
        match values_equal(context, a, b) {
            Some(false) => return Some(false),
            None => undecided = true,
            Some(true) => {}
        }
    }
    if undecided { None } else { Some(true) }
}

/// Collection `~`: order-independent, never empty.
pub fn equivalence(
    context: &EvaluationContext,
    left: &EvaluationResult,
    right: &EvaluationResult,
) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut used = vec![false; right.len()];
    left.collection.iter().all(|a| {
        let found = right
            .collection
            .iter()
            .enumerate()
            .find(|(i, b)| !used[*i] && values_equivalent(context, a, b));
        match found {
            Some((i, _)) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

/// Ordering of two single values for the comparison operators and `sort`.
/// `Ok(None)` means the values are incomparable, which surfaces as empty.
pub fn compare_values(
    context: &EvaluationContext,
    left: &Value,
    right: &Value,
) -> Result<Option<Ordering>, EvaluationError> {
    let left = comparable_form(left);
    let right = comparable_form(right);
    Ok(match (&left, &right) {
        (a, b) if a.is_numeric() && b.is_numeric() => match (a.numeric_value(), b.numeric_value()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => None,
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => a.compare(b),
        (Value::DateTime(a), Value::DateTime(b)) => a.compare(b),
        (Value::Date(a), Value::DateTime(b)) => {
            atrius_fhirpath_support::DateTime::from_date(a).compare(b)
        }
        (Value::DateTime(a), Value::Date(b)) => {
            a.compare(&atrius_fhirpath_support::DateTime::from_date(b))
        }
        (Value::Time(a), Value::Time(b)) => a.compare(b),
        (Value::Quantity(a), Value::Quantity(b)) => compare_quantities(context, a, b),
        (Value::String(s), other) if is_temporal(other) => {
            let parsed = string_as_temporal(s, other).ok_or_else(|| incomparable(&left, &right))?;
            return compare_values(context, &parsed, other);
        }
        (other, Value::String(s)) if is_temporal(other) => {
            let parsed = string_as_temporal(s, other).ok_or_else(|| incomparable(&left, &right))?;
            return compare_values(context, other, &parsed);
        }
        _ => return Err(incomparable(&left, &right)),
    })
}

fn incomparable(left: &Value, right: &Value) -> EvaluationError {
    EvaluationError::TypeError(format!(
        "Cannot compare {} with {}",
        left.type_name(),
        right.type_name()
    ))
}

fn comparison(
    context: &EvaluationContext,
    op: BinaryOperator,
    left: &EvaluationResult,
    right: &EvaluationResult,
) -> Result<EvaluationResult, EvaluationError> {
    let (Some(a), Some(b)) = (operand(left, op)?, operand(right, op)?) else {
        return Ok(EvaluationResult::empty());
    };
    let result = compare_values(context, a, b)?.map(|ordering| match op {
        BinaryOperator::LessThan => ordering.is_lt(),
        BinaryOperator::LessOrEqual => ordering.is_le(),
        BinaryOperator::GreaterThan => ordering.is_gt(),
        _ => ordering.is_ge(),
    });
    Ok(boolean_result(result))
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

fn arithmetic(
    context: &EvaluationContext,
    op: BinaryOperator,
    left: &EvaluationResult,
    right: &EvaluationResult,
) -> Result<EvaluationResult, EvaluationError> {
    let (Some(a), Some(b)) = (operand(left, op)?, operand(right, op)?) else {
        return Ok(EvaluationResult::empty());
    };
    let a = comparable_form(a);
    let b = comparable_form(b);

    let value = match (op, &a, &b) {
        (BinaryOperator::Add, Value::String(x), Value::String(y)) => {
            Some(Value::String(format!("{}{}", x, y)))
        }
        (BinaryOperator::Add | BinaryOperator::Subtract, temporal, Value::Quantity(q))
            if is_temporal(temporal) =>
        {
            Some(date_operation::add_quantity(
                temporal,
                q,
                op == BinaryOperator::Subtract,
            )?)
        }
        (BinaryOperator::Add | BinaryOperator::Subtract, Value::Quantity(x), Value::Quantity(y)) => {
            quantity_sum(context, x, y, op == BinaryOperator::Subtract)?
        }
        (BinaryOperator::Multiply | BinaryOperator::Divide, Value::Quantity(_), _)
        | (BinaryOperator::Multiply | BinaryOperator::Divide, _, Value::Quantity(_)) => {
            quantity_product(context, op, &a, &b)?
        }
        (_, x, y) if x.is_numeric() && y.is_numeric() => numeric(context, op, x, y),
        _ => {
            return Err(EvaluationError::TypeError(format!(
                "Cannot apply '{}' to {} and {}",
                op.symbol(),
                a.type_name(),
                b.type_name()
            )));
        }
    };
    Ok(value
        .map(EvaluationResult::single)
        .unwrap_or_else(EvaluationResult::empty))
}

enum NumericKind {
    Integer,
    Long,
    Decimal,
}

fn numeric_kind(a: &Value, b: &Value) -> NumericKind {
    match (a, b) {
        (Value::Decimal(_), _) | (_, Value::Decimal(_)) => NumericKind::Decimal,
        (Value::Long(_), _) | (_, Value::Long(_)) => NumericKind::Long,
        _ => NumericKind::Integer,
    }
}

fn integral_value(d: Decimal) -> Option<Value> {
    if let Some(i) = d.to_i32() {
        Some(Value::Integer(i))
    } else {
        d.to_i64().map(Value::Long)
    }
}

/// Number arithmetic. Overflow and division by zero give `None`.
fn numeric(context: &EvaluationContext, op: BinaryOperator, a: &Value, b: &Value) -> Option<Value> {
    let decimal_context = context.decimal_context();
    let (x, y) = (a.numeric_value()?, b.numeric_value()?);
    if op == BinaryOperator::Divide {
        if y.is_zero() {
            return None;
        }
        return x.checked_div(y).map(|q| Value::Decimal(decimal_context.apply(q)));
    }
    if op == BinaryOperator::Div {
        if y.is_zero() {
            return None;
        }
        return integral_value(x.checked_div(y)?.trunc());
    }
    match numeric_kind(a, b) {
        NumericKind::Integer => {
            let (x, y) = (a.to_integer(false).ok()??, b.to_integer(false).ok()??);
            match op {
                BinaryOperator::Add => x.checked_add(y),
                BinaryOperator::Subtract => x.checked_sub(y),
                BinaryOperator::Multiply => x.checked_mul(y),
                _ => x.checked_rem(y),
            }
            .map(Value::Integer)
        }
        NumericKind::Long => {
            let (x, y) = (a.to_long(false).ok()??, b.to_long(false).ok()??);
            match op {
                BinaryOperator::Add => x.checked_add(y),
                BinaryOperator::Subtract => x.checked_sub(y),
                BinaryOperator::Multiply => x.checked_mul(y),
                _ => x.checked_rem(y),
            }
            .map(Value::Long)
        }
        NumericKind::Decimal => match op {
            BinaryOperator::Add => x.checked_add(y),
            BinaryOperator::Subtract => x.checked_sub(y),
            BinaryOperator::Multiply => x.checked_mul(y),
            _ => x.checked_rem(y),
        }
        .map(|d| Value::Decimal(decimal_context.apply(d))),
    }
}

fn quantity_sum(
    context: &EvaluationContext,
    left: &Quantity,
    right: &Quantity,
    subtract: bool,
) -> Result<Option<Value>, EvaluationError> {
    let (a, b) = reconcile(context, left, right, false).ok_or_else(|| {
        EvaluationError::InvalidOperation(format!(
            "Cannot combine quantities in '{}' and '{}'",
            left.unit, right.unit
        ))
    })?;
    let value = if subtract { a.checked_sub(b) } else { a.checked_add(b) };
    Ok(value.map(|v| {
        Value::Quantity(Quantity::new(
            context.decimal_context().apply(v),
            left.unit.clone(),
        ))
    }))
}

fn quantity_product(
    context: &EvaluationContext,
    op: BinaryOperator,
    left: &Value,
    right: &Value,
) -> Result<Option<Value>, EvaluationError> {
    let as_quantity = |v: &Value| -> Result<Quantity, EvaluationError> {
        v.to_quantity(false)?.ok_or_else(|| {
            EvaluationError::TypeError(format!(
                "Cannot apply '{}' to {}",
                op.symbol(),
                v.type_name()
            ))
        })
    };
    let (a, b) = (as_quantity(left)?, as_quantity(right)?);
    let converter = context.unit_converter();
    let (value, unit) = if op == BinaryOperator::Multiply {
        (
            a.value.checked_mul(b.value),
            converter.multiply(a.ucum_unit(), b.ucum_unit())?,
        )
    } else {
        if b.value.is_zero() {
            return Ok(None);
        }
        (
            a.value.checked_div(b.value),
            converter.divide(a.ucum_unit(), b.ucum_unit())?,
        )
    };
    Ok(value.map(|v| Value::Quantity(Quantity::new(context.decimal_context().apply(v), unit))))
}

/// Unary `+` and `-`.
pub fn polarity(
    polarity: Polarity,
    operand: &EvaluationResult,
) -> Result<EvaluationResult, EvaluationError> {
    let Some(value) = operand.singleton("Unary operator")? else {
        return Ok(EvaluationResult::empty());
    };
    let value = comparable_form(value);
    let negated = match (polarity, &value) {
        (Polarity::Plus, v) if v.is_numeric() || matches!(v, Value::Quantity(_)) => Some(value.clone()),
        (Polarity::Minus, Value::Integer(i)) => i.checked_neg().map(Value::Integer),
        (Polarity::Minus, Value::Long(l)) => l.checked_neg().map(Value::Long),
        (Polarity::Minus, Value::Decimal(d)) => Some(Value::Decimal(-*d)),
        (Polarity::Minus, Value::Quantity(q)) => {
            Some(Value::Quantity(Quantity::new(-q.value, q.unit.clone())))
        }
        _ => {
            return Err(EvaluationError::TypeError(format!(
                "Unary operator cannot be applied to {}",
                value.type_name()
            )));
        }
    };
    Ok(negated
        .map(EvaluationResult::single)
        .unwrap_or_else(EvaluationResult::empty))
}

fn concatenate(
    left: &EvaluationResult,
    right: &EvaluationResult,
) -> Result<EvaluationResult, EvaluationError> {
    let text = |result: &EvaluationResult| -> Result<String, EvaluationError> {
        match operand(result, BinaryOperator::Concatenate)? {
            None => Ok(String::new()),
            Some(value) => value.to_string_value(false)?.ok_or_else(|| {
                EvaluationError::TypeError(format!(
                    "Operator '&' expects String operands, got {}",
                    value.type_name()
                ))
            }),
        }
    };
    Ok(EvaluationResult::single(format!("{}{}", text(left)?, text(right)?)))
}

/// `item in collection`; `contains` calls it with the operands swapped.
fn membership(
    context: &EvaluationContext,
    op: BinaryOperator,
    item: &EvaluationResult,
    collection: &EvaluationResult,
) -> Result<EvaluationResult, EvaluationError> {
    let Some(value) = operand(item, op)? else {
        return Ok(EvaluationResult::empty());
    };
    Ok(EvaluationResult::single(contains_equal(
        context,
        &collection.collection,
        value,
    )))
}

fn logic_operand(
    result: &EvaluationResult,
    op: BinaryOperator,
) -> Result<Option<bool>, EvaluationError> {
    match operand(result, op)? {
        None => Ok(None),
        Some(Value::Boolean(b)) => Ok(Some(*b)),
        // A single non-Boolean item counts as true.
        Some(other) => Ok(Some(other.to_boolean(false)?.unwrap_or(true))),
    }
}

fn logic(
    op: BinaryOperator,
    left: &EvaluationResult,
    right: &EvaluationResult,
) -> Result<EvaluationResult, EvaluationError> {
    let a = logic_operand(left, op)?;
    let b = logic_operand(right, op)?;
    let result = match op {
        BinaryOperator::And => match (a, b) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        BinaryOperator::Or => match (a, b) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        BinaryOperator::Xor => match (a, b) {
            (Some(x), Some(y)) => Some(x != y),
            _ => None,
        },
        _ => match (a, b) {
            (Some(false), _) => Some(true),
            (Some(true), r) => r,
            (None, Some(true)) => Some(true),
            (None, _) => None,
        },
    };
    Ok(boolean_result(result))
}
