//! UCUM integration module for FHIRPath
//!
//! Quantity unit conversion and unit algebra, delegated to the octofhir-ucum
//! crate. Calendar duration keywords are mapped to their UCUM symbols before
//! any lookup, and the dimensionless unit `'1'` only converts to itself.

use std::fmt;
use std::str::FromStr;

use atrius_fhirpath_support::{CalendarUnit, DecimalContext, EvaluationError};
use octofhir_ucum::fhir::{FhirQuantity, convert_quantity};
use octofhir_ucum::{analyse, is_comparable, unit_divide, unit_multiply};
use rust_decimal::Decimal;

/// Unit conversion and unit algebra used by quantity comparison, arithmetic
/// and `toQuantity(unit)`.
pub trait UnitConverter: Send + Sync + fmt::Debug {
    /// Converts `value` from `from` to `to`, rounding with `decimal_context`.
    fn convert(
        &self,
        value: Decimal,
        from: &str,
        to: &str,
        decimal_context: &DecimalContext,
    ) -> Result<Decimal, EvaluationError>;

    /// Whether the two units measure the same dimension.
    fn comparable(&self, left: &str, right: &str) -> bool;

    /// Unit of the product of two quantities.
    fn multiply(&self, left: &str, right: &str) -> Result<String, EvaluationError>;

    /// Unit of the quotient of two quantities.
    fn divide(&self, numerator: &str, denominator: &str) -> Result<String, EvaluationError>;
}

/// [`UnitConverter`] backed by the UCUM unit tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct UcumConverter;

/// Maps calendar duration keywords to their UCUM equivalents; other units are
/// returned unchanged.
pub fn calendar_to_ucum_unit(unit: &str) -> &str {
    match CalendarUnit::from_keyword(unit) {
        Some(calendar) => calendar.ucum_code(),
        None => unit,
    }
}

fn ucum_error(action: &str, err: impl fmt::Display) -> EvaluationError {
    EvaluationError::InvalidOperation(format!("UCUM {} failed: {}", action, err))
}

/// Significant digits an `f64` factor carries reliably.
const FACTOR_SIGNIFICANT_DIGITS: u32 = 15;

/// Decimal form of a conversion factor. `f64` display never uses exponent
/// notation, so the text parse succeeds for all but extreme magnitudes.
fn factor_to_decimal(factor: f64) -> Result<Decimal, EvaluationError> {
    Decimal::from_str(&factor.to_string())
        .or_else(|_| Decimal::try_from(factor))
        .map_err(|e| ucum_error("factor conversion", e))
}

/// Like [`factor_to_decimal`], with the binary noise past the reliable digits
/// removed (`0.0010000000000000002` becomes `0.001`).
fn exact_factor(factor: f64) -> Result<Decimal, EvaluationError> {
    let decimal = factor_to_decimal(factor)?;
    Ok(decimal
        .round_sf(FACTOR_SIGNIFICANT_DIGITS)
        .unwrap_or(decimal)
        .normalize())
}

fn to_f64(value: Decimal) -> Result<f64, EvaluationError> {
    value
        .to_string()
        .parse::<f64>()
        .map_err(|e| ucum_error("value conversion", e))
}

impl UnitConverter for UcumConverter {
    fn convert(
        &self,
        value: Decimal,
        from: &str,
        to: &str,
        decimal_context: &DecimalContext,
    ) -> Result<Decimal, EvaluationError> {
        let from = calendar_to_ucum_unit(from);
        let to = calendar_to_ucum_unit(to);
        if from == to {
            return Ok(value);
        }
        if from == "1" || to == "1" {
            return Err(EvaluationError::InvalidOperation(format!(
                "Cannot convert between '{}' and '{}'",
                from, to
            )));
        }
        if !self.comparable(from, to) {
            return Err(EvaluationError::InvalidOperation(format!(
                "Units '{}' and '{}' are not comparable",
                from, to
            )));
        }

        let source = analyse(from).map_err(|e| ucum_error("analysis", e))?;
        let target = analyse(to).map_err(|e| ucum_error("analysis", e))?;
        let converted = if source.offset == 0.0 && target.offset == 0.0 {
            // Multiplicative units convert exactly through the factor ratio.
            let ratio = exact_factor(source.factor)?
                .checked_div(exact_factor(target.factor)?)
                .ok_or(EvaluationError::ArithmeticOverflow)?;
            value
                .checked_mul(ratio)
                .ok_or(EvaluationError::ArithmeticOverflow)?
        } else {
            // Offset units such as Cel and [degF].
            let quantity = FhirQuantity::with_ucum_code(to_f64(value)?, from);
            let result = convert_quantity(&quantity, to).map_err(|e| ucum_error("conversion", e))?;
            let rounded = (result.value * 1e10).round() / 1e10;
            factor_to_decimal(rounded)?
        };
        Ok(decimal_context.apply(converted).normalize())
    }

    fn comparable(&self, left: &str, right: &str) -> bool {
        let left = calendar_to_ucum_unit(left);
        let right = calendar_to_ucum_unit(right);
        if left == right {
            return true;
        }
        if left == "1" || right == "1" {
            return false;
        }
        is_comparable(left, right).unwrap_or(false)
    }

    fn multiply(&self, left: &str, right: &str) -> Result<String, EvaluationError> {
        let left = calendar_to_ucum_unit(left);
        let right = calendar_to_ucum_unit(right);
        match (left, right) {
            ("1", other) | (other, "1") => Ok(other.to_string()),
            _ => unit_multiply(left, right)
                .map(|result| result.expression)
                .map_err(|e| ucum_error("multiplication", e)),
        }
    }

    fn divide(&self, numerator: &str, denominator: &str) -> Result<String, EvaluationError> {
        let numerator = calendar_to_ucum_unit(numerator);
        let denominator = calendar_to_ucum_unit(denominator);
        if numerator == denominator {
            return Ok("1".to_string());
        }
        if denominator == "1" {
            return Ok(numerator.to_string());
        }
        unit_divide(numerator, denominator)
            .map(|result| result.expression)
            .map_err(|e| ucum_error("division", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_calendar_to_ucum_unit() {
        assert_eq!(calendar_to_ucum_unit("years"), "a");
        assert_eq!(calendar_to_ucum_unit("week"), "wk");
        assert_eq!(calendar_to_ucum_unit("mg"), "mg");
    }

    #[test]
    fn test_mass_conversion() {
        let converter = UcumConverter;
        let ctx = DecimalContext::default();
        assert_eq!(converter.convert(dec!(4000), "mg", "g", &ctx).unwrap(), dec!(4));
        assert_eq!(converter.convert(dec!(1.5), "kg", "g", &ctx).unwrap(), dec!(1500));
        assert_eq!(converter.convert(dec!(500), "mg", "g", &ctx).unwrap(), dec!(0.5));
        assert_eq!(converter.convert(dec!(1), "g", "mg", &ctx).unwrap(), dec!(1000));
        assert_eq!(converter.convert(dec!(1), "[lb_av]", "g", &ctx).unwrap(), dec!(453.59237));
    }

    #[test]
    fn test_exact_factor_drops_binary_noise() {
        assert_eq!(exact_factor(0.0010000000000000002).unwrap(), dec!(0.001));
        assert_eq!(exact_factor(1000.0).unwrap(), dec!(1000));
        assert_eq!(exact_factor(453.59237).unwrap(), dec!(453.59237));
    }

    #[test]
    fn test_dimensionless_only_converts_to_itself() {
        let converter = UcumConverter;
        let ctx = DecimalContext::default();
        assert_eq!(converter.convert(dec!(3), "1", "1", &ctx).unwrap(), dec!(3));
        assert!(converter.convert(dec!(3), "1", "g", &ctx).is_err());
        assert!(!converter.comparable("1", "mg"));
    }

    #[test]
    fn test_incompatible_units() {
        let converter = UcumConverter;
        assert!(!converter.comparable("mg", "m"));
        assert!(converter.comparable("second", "ms"));
        assert!(
            converter
                .convert(dec!(1), "mg", "m", &DecimalContext::default())
                .is_err()
        );
    }

    #[test]
    fn test_unit_algebra_identities() {
        let converter = UcumConverter;
        assert_eq!(converter.divide("mg", "mg").unwrap(), "1");
        assert_eq!(converter.multiply("1", "cm").unwrap(), "cm");
        assert_eq!(converter.divide("cm", "1").unwrap(), "cm");
    }
}
