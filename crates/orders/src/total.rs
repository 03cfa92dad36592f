//! Total Recalculation Rule.
//!
//! `total_amount` is a derived value: the sum over an order's lines of
//! `unit_price × quantity`, quantized once to 2 decimal places, half-up.
//! Line contributions stay exact until the final quantize, so the stored
//! total never accumulates per-line rounding drift.
//!
//! Every write path that touches lines calls this rule explicitly — it is
//! an invariant-maintenance call, not a reactive hook.

use rust_decimal::Decimal;

use anvilcrm_core::money;

use crate::order::OrderLine;

/// Sum of `unit_price × quantity` over `lines`, rounded half-up to 2dp.
///
/// Re-entrant and idempotent: the same lines always produce the same value.
pub fn recompute_total(lines: &[OrderLine]) -> Decimal {
    let sum: Decimal = lines.iter().map(OrderLine::line_total).sum();
    money::quantize(sum)
}
