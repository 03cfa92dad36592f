use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use anvilcrm_core::{CustomerId, DomainError, OrderId, OrderLineId, ProductId};

use crate::total::recompute_total;

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "shipped" => Ok(OrderStatus::Shipped),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order line: product, quantity, unit price snapshotted at creation.
///
/// `unit_price` is a durable historical value. Later changes to the
/// product's price never touch existing lines or past totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl OrderLine {
    /// Exact (unrounded) contribution of this line to the order total.
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Aggregate root: Order.
///
/// Owns its line collection exclusively; at most one line per product.
/// `total_amount` is derived from the lines — every mutating method below
/// re-applies the recalculation rule before returning, so the field is
/// never observably stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// A fresh, empty order (status pending, total zero).
    pub fn new(id: OrderId, customer_id: CustomerId, order_date: DateTime<Utc>) -> Self {
        Self {
            id,
            customer_id,
            status: OrderStatus::Pending,
            order_date,
            total_amount: Decimal::ZERO,
            lines: Vec::new(),
        }
    }

    pub fn line_for(&self, product_id: ProductId) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Add quantity of a product. A repeated product merges into the
    /// existing line (its price snapshot is kept); a new product gets a
    /// fresh line with `unit_price` snapshotted now.
    pub fn upsert_line(
        &mut self,
        id: OrderLineId,
        product_id: ProductId,
        quantity: i32,
        unit_price: Decimal,
    ) -> Result<(), DomainError> {
        if quantity < 1 {
            return Err(DomainError::validation("quantity must be >= 1"));
        }
        match self.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => {
                line.quantity = line
                    .quantity
                    .checked_add(quantity)
                    .ok_or_else(|| DomainError::invariant("line quantity overflow"))?;
            }
            None => self.lines.push(OrderLine {
                id,
                product_id,
                quantity,
                unit_price,
            }),
        }
        self.apply_total();
        Ok(())
    }

    /// Replace the quantity of an existing line.
    pub fn set_line_quantity(
        &mut self,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<(), DomainError> {
        if quantity < 1 {
            return Err(DomainError::validation("quantity must be >= 1"));
        }
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or(DomainError::NotFound)?;
        line.quantity = quantity;
        self.apply_total();
        Ok(())
    }

    /// Remove the line for a product.
    pub fn remove_line(&mut self, product_id: ProductId) -> Result<(), DomainError> {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        if self.lines.len() == before {
            return Err(DomainError::NotFound);
        }
        self.apply_total();
        Ok(())
    }

    /// Recompute the total from the current lines without mutating.
    pub fn recompute(&self) -> Decimal {
        recompute_total(&self.lines)
    }

    /// Re-derive `total_amount` from the current lines.
    pub fn apply_total(&mut self) -> Decimal {
        self.total_amount = self.recompute();
        self.total_amount
    }
}
