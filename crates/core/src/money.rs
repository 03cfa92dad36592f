//! Money arithmetic rules.
//!
//! All monetary values are [`rust_decimal::Decimal`]. There is exactly one
//! rounding rule in the system — two decimal places, round-half-up — and it
//! lives here so every caller quantizes the same way.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::DomainError;

/// Decimal places carried by every stored monetary value.
pub const SCALE: u32 = 2;

/// Quantize to two decimal places, rounding half-up.
///
/// Half-up on exact decimals, not binary floats: `0.015` rounds to `0.02`.
pub fn quantize(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse user-supplied text into a valid price.
pub fn parse_price(raw: &str) -> Result<Decimal, DomainError> {
    let value: Decimal = raw
        .trim()
        .parse()
        .map_err(|_| DomainError::validation("Price must be a valid number."))?;
    validate_price(value)
}

/// Quantize and check that a price is positive (at least 0.01 after rounding).
pub fn validate_price(price: Decimal) -> Result<Decimal, DomainError> {
    let quantized = quantize(price);
    if quantized <= Decimal::ZERO {
        return Err(DomainError::validation("Price must be positive."));
    }
    Ok(quantized)
}
