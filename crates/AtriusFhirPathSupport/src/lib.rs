//! # FHIRPath Support Types
//!
//! The value model shared by the FHIRPath engine and anything that wants to
//! be evaluated by it.
//!
//! ## Core Types
//!
//! - [`Value`] and [`Collection`]: System primitives, domain elements and the
//!   ordered sequences every evaluation step produces
//! - [`Element`]: capability trait domain data implements to be navigable
//! - [`TypeInfo`], [`TypeSpecifier`], [`TypeRegistry`]: type descriptors and
//!   the context-scoped registry behind `is`, `as` and `ofType`
//! - [`Date`], [`Time`], [`DateTime`], [`Quantity`]: precision-aware temporal
//!   values and unit-bearing decimals
//! - [`EvaluationError`]: the single error type of evaluation
//!
//! ## Usage Example
//!
//! ```rust
//! use atrius_fhirpath_support::{Collection, Element, Value};
//!
//! let items: Collection = vec![Value::Integer(1), Value::string("two")].into();
//! assert_eq!(items.len(), 2);
//! assert_eq!(Value::string("true").to_boolean(true).unwrap(), Some(true));
//! ```

pub mod element;
pub mod evaluation_error;
pub mod evaluation_result;
pub mod fhir_types;
pub mod numeric;
pub mod quantity;
pub mod temporal;
pub mod type_info;
pub mod value;

pub use element::{Conversion, Element};
pub use evaluation_error::EvaluationError;
pub use evaluation_result::EvaluationResult;
pub use numeric::DecimalContext;
pub use quantity::{CalendarUnit, Quantity};
pub use temporal::{Date, DateTime, TemporalPrecision, Time};
pub use type_info::{FieldInfo, TypeInfo, TypeRegistry, TypeSpecifier};
pub use value::{Collection, Value};
