//! # Decimal Context
//!
//! Precision and rounding for decimal results, carried per evaluation
//! context instead of process-wide.

use rust_decimal::{Decimal, RoundingStrategy};

/// Significant-digit precision plus a rounding strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalContext {
    pub precision: u32,
    pub rounding: RoundingStrategy,
}

impl Default for DecimalContext {
    fn default() -> Self {
        Self {
            precision: 28,
            rounding: RoundingStrategy::MidpointAwayFromZero,
        }
    }
}

impl DecimalContext {
    pub fn new(precision: u32, rounding: RoundingStrategy) -> Self {
        Self { precision, rounding }
    }

    /// Rounds `value` to the context's significant digits. Values that
    /// already fit are returned unchanged, trailing zeros included.
    pub fn apply(&self, value: Decimal) -> Decimal {
        let digits = value.mantissa().unsigned_abs().to_string().len() as u32;
        if digits <= self.precision {
            return value;
        }
        value
            .round_sf_with_strategy(self.precision, self.rounding)
            .unwrap_or(value)
    }

    /// Rounds to a fixed number of decimal places with the context's strategy.
    pub fn round_dp(&self, value: Decimal, places: u32) -> Decimal {
        value.round_dp_with_strategy(places, self.rounding)
    }
}
