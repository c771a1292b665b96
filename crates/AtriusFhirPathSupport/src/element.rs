//! # Element Capability
//!
//! The open half of the value model. Domain types (resources, data types,
//! JSON documents) implement [`Element`] to take part in evaluation; the
//! closed set of System primitives implements it through [`Value`].
//!
//! Conversions follow the value/present/error shape: `Ok(Some(v))` converted,
//! `Ok(None)` not convertible, `Err(_)` malformed input that must abort an
//! unconditional conversion.

use std::any::Any;
use std::fmt;

use rust_decimal::Decimal;

use crate::evaluation_error::EvaluationError;
use crate::quantity::Quantity;
use crate::temporal::{Date, DateTime, Time};
use crate::type_info::TypeInfo;
use crate::value::{Collection, Value};

/// Result of converting an element to a System type.
pub type Conversion<T> = Result<Option<T>, EvaluationError>;

/// Capability set required of anything a FHIRPath expression can navigate.
///
/// `explicit` distinguishes the `toX()` functions (true) from the implicit
/// conversions operators apply on their own (false); implementations should
/// only offer lossless conversions when it is false.
pub trait Element: fmt::Debug + Send + Sync {
    fn type_info(&self) -> TypeInfo;

    /// Values of the named child, flattened into one collection.
    fn member(&self, name: &str) -> Collection;

    /// All child values in document order.
    fn children(&self) -> Collection {
        Collection::new()
    }

    fn to_boolean(&self, _explicit: bool) -> Conversion<bool> {
        Ok(None)
    }

    fn to_string_value(&self, _explicit: bool) -> Conversion<String> {
        Ok(None)
    }

    fn to_integer(&self, _explicit: bool) -> Conversion<i32> {
        Ok(None)
    }

    fn to_long(&self, _explicit: bool) -> Conversion<i64> {
        Ok(None)
    }

    fn to_decimal(&self, _explicit: bool) -> Conversion<Decimal> {
        Ok(None)
    }

    fn to_date(&self, _explicit: bool) -> Conversion<Date> {
        Ok(None)
    }

    fn to_time(&self, _explicit: bool) -> Conversion<Time> {
        Ok(None)
    }

    fn to_date_time(&self, _explicit: bool) -> Conversion<DateTime> {
        Ok(None)
    }

    fn to_quantity(&self, _explicit: bool) -> Conversion<Quantity> {
        Ok(None)
    }

    /// `=` semantics: `None` when equality cannot be decided.
    fn equal(&self, other: &Value) -> Option<bool>;

    /// `~` semantics; never indeterminate.
    fn equivalent(&self, other: &Value) -> bool {
        self.equal(other) == Some(true)
    }

    fn as_any(&self) -> &dyn Any;
}
