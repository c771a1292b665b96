//! # FHIRPath Values and Collections
//!
//! [`Value`] is the closed set of System primitives plus an open
//! [`Value::Element`] variant for domain data. [`Collection`] is the ordered
//! sequence every evaluation step produces.
//!
//! Values are immutable once built. Domain elements are shared through `Arc`
//! so collections can be cloned freely.

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::element::{Conversion, Element};
use crate::evaluation_error::EvaluationError;
use crate::quantity::Quantity;
use crate::temporal::{Date, DateTime, Time};
use crate::type_info::TypeInfo;

/// A single item of a FHIRPath collection.
#[derive(Debug, Clone)]
pub enum Value {
    Boolean(bool),
    String(String),
    /// 32-bit FHIRPath Integer.
    Integer(i32),
    /// 64-bit FHIRPath Long.
    Long(i64),
    Decimal(Decimal),
    Date(Date),
    Time(Time),
    DateTime(DateTime),
    Quantity(Quantity),
    Element(Arc<dyn Element>),
}

static INTEGER_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?\d+$").expect("integer pattern"));
static DECIMAL_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d+(\.\d+)?$").expect("decimal pattern"));

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn element(element: impl Element + 'static) -> Self {
        Value::Element(Arc::new(element))
    }

    /// The System type name used in error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Boolean(_) => "Boolean".into(),
            Value::String(_) => "String".into(),
            Value::Integer(_) => "Integer".into(),
            Value::Long(_) => "Long".into(),
            Value::Decimal(_) => "Decimal".into(),
            Value::Date(_) => "Date".into(),
            Value::Time(_) => "Time".into(),
            Value::DateTime(_) => "DateTime".into(),
            Value::Quantity(_) => "Quantity".into(),
            Value::Element(e) => e
                .type_info()
                .qualified_name()
                .unwrap_or_else(|| "Tuple".to_string()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Long(_) | Value::Decimal(_))
    }

    /// Integer, Long and Decimal widened to Decimal.
    pub fn numeric_value(&self) -> Option<Decimal> {
        match self {
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::Long(l) => Some(Decimal::from(*l)),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }
}

fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Equality of two decimals after rounding both to the scale of the less
/// precise one.
pub fn decimal_equivalent(a: Decimal, b: Decimal) -> bool {
    let scale = a.scale().min(b.scale());
    a.round_dp(scale) == b.round_dp(scale)
}

fn quantity_units_match(a: &Quantity, b: &Quantity) -> bool {
    if a.unit == b.unit {
        return true;
    }
    // Calendar keywords of a week or finer equal their UCUM code.
    fn definite(q: &Quantity) -> Option<&str> {
        match q.calendar_unit() {
            Some(unit) if unit.is_definite() => Some(unit.ucum_code()),
            Some(_) => None,
            None => Some(q.unit.as_str()),
        }
    }
    match (definite(a), definite(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

impl Element for Value {
    fn type_info(&self) -> TypeInfo {
        match self {
            Value::Element(e) => e.type_info(),
            other => TypeInfo::system(&other.type_name()),
        }
    }

    fn member(&self, name: &str) -> Collection {
        match self {
            Value::Element(e) => e.member(name),
            _ => Collection::new(),
        }
    }

    fn children(&self) -> Collection {
        match self {
            Value::Element(e) => e.children(),
            _ => Collection::new(),
        }
    }

    fn to_boolean(&self, explicit: bool) -> Conversion<bool> {
        Ok(match self {
            Value::Boolean(b) => Some(*b),
            Value::Element(e) => return e.to_boolean(explicit),
            _ if !explicit => None,
            Value::String(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" | "1.0" => Some(true),
                "false" | "f" | "no" | "n" | "0" | "0.0" => Some(false),
                _ => None,
            },
            Value::Integer(1) | Value::Long(1) => Some(true),
            Value::Integer(0) | Value::Long(0) => Some(false),
            Value::Decimal(d) if *d == Decimal::ONE => Some(true),
            Value::Decimal(d) if d.is_zero() => Some(false),
            _ => None,
        })
    }

    fn to_string_value(&self, explicit: bool) -> Conversion<String> {
        Ok(match self {
            Value::String(s) => Some(s.clone()),
            Value::Element(e) => return e.to_string_value(explicit),
            _ if !explicit => None,
            Value::Boolean(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Long(l) => Some(l.to_string()),
            Value::Decimal(d) => Some(d.to_string()),
            Value::Date(d) => Some(d.to_string()),
            Value::Time(t) => Some(t.to_string()),
            Value::DateTime(dt) => Some(dt.to_string()),
            Value::Quantity(q) => Some(q.to_string()),
        })
    }

    fn to_integer(&self, explicit: bool) -> Conversion<i32> {
        Ok(match self {
            Value::Integer(i) => Some(*i),
            Value::Element(e) => return e.to_integer(explicit),
            _ if !explicit => None,
            Value::Long(l) => i32::try_from(*l).ok(),
            Value::String(s) if INTEGER_TEXT.is_match(s) => s.trim_start_matches('+').parse().ok(),
            Value::Boolean(b) => Some(i32::from(*b)),
            _ => None,
        })
    }

    fn to_long(&self, explicit: bool) -> Conversion<i64> {
        Ok(match self {
            Value::Long(l) => Some(*l),
            Value::Integer(i) => Some(i64::from(*i)),
            Value::Element(e) => return e.to_long(explicit),
            _ if !explicit => None,
            Value::String(s) if INTEGER_TEXT.is_match(s) => s.trim_start_matches('+').parse().ok(),
            Value::Boolean(b) => Some(i64::from(*b)),
            _ => None,
        })
    }

    fn to_decimal(&self, explicit: bool) -> Conversion<Decimal> {
        Ok(match self {
            Value::Decimal(d) => Some(*d),
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::Long(l) => Some(Decimal::from(*l)),
            Value::Element(e) => return e.to_decimal(explicit),
            _ if !explicit => None,
            Value::String(s) if DECIMAL_TEXT.is_match(s) => Decimal::from_str(s.trim_start_matches('+')).ok(),
            Value::Boolean(true) => Some(Decimal::new(10, 1)),
            Value::Boolean(false) => Some(Decimal::new(0, 1)),
            _ => None,
        })
    }

    fn to_date(&self, explicit: bool) -> Conversion<Date> {
        Ok(match self {
            Value::Date(d) => Some(*d),
            Value::Element(e) => return e.to_date(explicit),
            _ if !explicit => None,
            Value::DateTime(dt) => Some(dt.date()),
            Value::String(s) => return Date::parse(s),
            _ => None,
        })
    }

    fn to_time(&self, explicit: bool) -> Conversion<Time> {
        Ok(match self {
            Value::Time(t) => Some(*t),
            Value::Element(e) => return e.to_time(explicit),
            _ if !explicit => None,
            Value::String(s) => return Time::parse(s),
            _ => None,
        })
    }

    fn to_date_time(&self, explicit: bool) -> Conversion<DateTime> {
        Ok(match self {
            Value::DateTime(dt) => Some(*dt),
            Value::Date(d) => Some(DateTime::from_date(d)),
            Value::Element(e) => return e.to_date_time(explicit),
            _ if !explicit => None,
            Value::String(s) => return DateTime::parse(s),
            _ => None,
        })
    }

    fn to_quantity(&self, explicit: bool) -> Conversion<Quantity> {
        Ok(match self {
            Value::Quantity(q) => Some(q.clone()),
            Value::Integer(_) | Value::Long(_) | Value::Decimal(_) => {
                self.numeric_value().map(Quantity::unitless)
            }
            Value::Element(e) => return e.to_quantity(explicit),
            _ if !explicit => None,
            Value::String(s) => Quantity::parse(s),
            Value::Boolean(b) => Some(Quantity::unitless(if *b { Decimal::new(10, 1) } else { Decimal::new(0, 1) })),
            _ => None,
        })
    }

    fn equal(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Element(e), _) => e.equal(other),
            (_, Value::Element(e)) => e.equal(self),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a == b),
            (Value::String(a), Value::String(b)) => Some(a == b),
            (a, b) if a.is_numeric() && b.is_numeric() => Some(a.numeric_value() == b.numeric_value()),
            (Value::Date(a), Value::Date(b)) => a.compare(b).map(|o| o.is_eq()),
            (Value::DateTime(a), Value::DateTime(b)) => a.compare(b).map(|o| o.is_eq()),
            (Value::Date(a), Value::DateTime(b)) => DateTime::from_date(a).compare(b).map(|o| o.is_eq()),
            (Value::DateTime(a), Value::Date(b)) => a.compare(&DateTime::from_date(b)).map(|o| o.is_eq()),
            (Value::Time(a), Value::Time(b)) => a.compare(b).map(|o| o.is_eq()),
            (Value::Quantity(a), Value::Quantity(b)) => {
                if quantity_units_match(a, b) {
                    Some(a.value == b.value)
                } else {
                    None
                }
            }
            _ => Some(false),
        }
    }

    fn equivalent(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Element(e), _) => e.equivalent(other),
            (_, Value::Element(e)) => e.equivalent(self),
            (Value::String(a), Value::String(b)) => normalize_text(a) == normalize_text(b),
            (a, b) if a.is_numeric() && b.is_numeric() => match (a.numeric_value(), b.numeric_value()) {
                (Some(x), Some(y)) => decimal_equivalent(x, y),
                _ => false,
            },
            (Value::Quantity(a), Value::Quantity(b)) => {
                quantity_units_match(a, b) && decimal_equivalent(a.value, b.value)
            }
            _ => self.equal(other) == Some(true),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl PartialEq for Value {
    /// Structural identity: same variant and same payload. Unlike `=`, an
    /// Integer never equals a Decimal here.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Quantity(a), Value::Quantity(b)) => a == b,
            (Value::Element(a), Value::Element(b)) => {
                Arc::ptr_eq(a, b) || a.equal(other) == Some(true)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Long(l) => write!(f, "{}L", l),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Date(d) => write!(f, "@{}", d),
            Value::Time(t) => write!(f, "@T{}", t),
            Value::DateTime(dt) => write!(f, "@{}", dt),
            Value::Quantity(q) => write!(f, "{}", q),
            Value::Element(e) => write!(f, "{:?}", e),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Quantity> for Value {
    fn from(q: Quantity) -> Self {
        Value::Quantity(q)
    }
}

/// Ordered sequence of values. Whether the order is meaningful travels
/// separately, in [`crate::EvaluationResult`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection(Vec<Value>);

impl Collection {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn single(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(items)
    }

    pub fn push(&mut self, value: Value) {
        self.0.push(value);
    }

    pub fn extend(&mut self, other: Collection) {
        self.0.extend(other.0);
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }

    /// The only item, `None` when empty, or a singleton error naming `what`.
    pub fn singleton(&self, what: &str) -> Result<Option<&Value>, EvaluationError> {
        match self.0.len() {
            0 => Ok(None),
            1 => Ok(self.0.first()),
            n => Err(EvaluationError::singleton(what, n)),
        }
    }

    /// Whether some item is `=`-equal to `value`.
    pub fn contains_equal(&self, value: &Value) -> bool {
        self.0.iter().any(|item| item.equal(value) == Some(true))
    }
}

impl Deref for Collection {
    type Target = [Value];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Value>> for Collection {
    fn from(items: Vec<Value>) -> Self {
        Self(items)
    }
}

impl From<Value> for Collection {
    fn from(value: Value) -> Self {
        Self(vec![value])
    }
}

impl FromIterator<Value> for Collection {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Collection {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Converts a decimal to `i64` when it has no fractional part.
pub fn decimal_to_integral(d: Decimal) -> Option<i64> {
    if d.fract().is_zero() { d.to_i64() } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_implicit_conversions_are_lossless_only() {
        assert_eq!(Value::Integer(3).to_decimal(false).unwrap(), Some(dec!(3)));
        assert_eq!(Value::string("1").to_boolean(false).unwrap(), None);
        assert_eq!(Value::Decimal(dec!(1.5)).to_integer(true).unwrap(), None);
        let date = Value::Date(Date::parse("2020-01-02").unwrap().unwrap());
        assert!(date.to_date_time(false).unwrap().is_some());
    }

    #[test]
    fn test_explicit_string_conversions() {
        assert_eq!(Value::string("Yes").to_boolean(true).unwrap(), Some(true));
        assert_eq!(Value::string("+42").to_integer(true).unwrap(), Some(42));
        assert_eq!(Value::string("42.0").to_integer(true).unwrap(), None);
        assert_eq!(Value::string("9999999999").to_integer(true).unwrap(), None);
        assert_eq!(Value::string("9999999999").to_long(true).unwrap(), Some(9_999_999_999));
        assert_eq!(Value::string("1.50").to_decimal(true).unwrap(), Some(dec!(1.50)));
        assert!(Value::string("2023-02-30").to_date(true).is_err());
        assert_eq!(Value::string("hello").to_date(true).unwrap(), None);
        assert_eq!(
            Value::Decimal(dec!(1.5)).to_string_value(true).unwrap().as_deref(),
            Some("1.5")
        );
    }

    #[test]
    fn test_equality_and_equivalence() {
        assert_eq!(Value::Integer(1).equal(&Value::Decimal(dec!(1.0))), Some(true));
        assert_eq!(Value::string("a").equal(&Value::Integer(1)), Some(false));
        assert!(Value::string("Hello  World").equivalent(&Value::string("hello world")));
        assert!(Value::Decimal(dec!(1.2)).equivalent(&Value::Decimal(dec!(1.23))));
        assert!(!Value::Decimal(dec!(1.2)).equivalent(&Value::Decimal(dec!(1.3))));
        let y2012 = Value::Date(Date::parse("2012").unwrap().unwrap());
        let d2012 = Value::Date(Date::parse("2012-01-01").unwrap().unwrap());
        assert_eq!(y2012.equal(&d2012), None);
        assert!(!y2012.equivalent(&d2012));
    }

    #[test]
    fn test_quantity_equality_by_unit() {
        let a = Value::Quantity(Quantity::new(dec!(1), "second"));
        let b = Value::Quantity(Quantity::new(dec!(1), "s"));
        assert_eq!(a.equal(&b), Some(true));
        let year = Value::Quantity(Quantity::new(dec!(1), "year"));
        let annum = Value::Quantity(Quantity::new(dec!(1), "a"));
        assert_eq!(year.equal(&annum), None);
        let weeks = Value::Quantity(Quantity::new(dec!(2), "weeks"));
        let wk = Value::Quantity(Quantity::new(dec!(2), "wk"));
        assert!(weeks.equivalent(&wk));
    }

    #[test]
    fn test_collection_singleton() {
        let empty = Collection::new();
        assert_eq!(empty.singleton("x").unwrap(), None);
        let two: Collection = vec![Value::Integer(1), Value::Integer(2)].into();
        assert!(two.singleton("x").is_err());
        assert!(two.contains_equal(&Value::Decimal(dec!(2))));
    }
}
