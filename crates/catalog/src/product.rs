use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use anvilcrm_core::{money, DomainError, ProductId};

/// Products with stock strictly below this are picked up by the restock pass.
pub const LOW_STOCK_THRESHOLD: i32 = 10;

/// Quantity added to each product by the low-stock restock pass.
pub const RESTOCK_INCREMENT: i32 = 10;

/// A product row: catalog identity plus current stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Always positive, quantized to 2 decimal places.
    pub price: Decimal,
    /// Never negative.
    pub stock: i32,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn is_low_stock(&self) -> bool {
        self.stock < LOW_STOCK_THRESHOLD
    }

    /// Reserve `quantity` units, decrementing stock.
    ///
    /// Fails with the shortage (product, available, requested) when stock
    /// does not cover the request; stock is left untouched in that case.
    pub fn reserve(&mut self, quantity: i32) -> Result<(), StockShortage> {
        debug_assert!(quantity >= 1);
        if quantity > self.stock {
            return Err(StockShortage {
                product_id: self.id,
                name: self.name.clone(),
                available: self.stock,
                requested: quantity,
            });
        }
        self.stock -= quantity;
        Ok(())
    }

    /// Administrative restock: additive, no upper bound.
    pub fn restock(&mut self, quantity: i32) -> Result<(), DomainError> {
        if quantity < 1 {
            return Err(DomainError::validation("Restock quantity must be positive."));
        }
        self.stock = self
            .stock
            .checked_add(quantity)
            .ok_or_else(|| DomainError::invariant("stock counter overflow"))?;
        Ok(())
    }
}

/// A requested quantity that exceeds the available stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortage {
    pub product_id: ProductId,
    pub name: String,
    pub available: i32,
    pub requested: i32,
}

impl core::fmt::Display for StockShortage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Product {} (id={}) has insufficient stock ({} < {}).",
            self.name, self.product_id, self.available, self.requested
        )
    }
}

/// Incoming product data before validation. Price arrives as text so the
/// transport layer never forces values through binary floats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    pub price: String,
    pub stock: Option<i32>,
}

/// A validated product draft, ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
}

impl ProductDraft {
    pub fn new(name: impl Into<String>, price: impl Into<String>, stock: Option<i32>) -> Self {
        Self {
            name: name.into(),
            price: price.into(),
            stock,
        }
    }

    /// Validate, collecting every problem instead of stopping at the first.
    pub fn validate(&self) -> Result<NewProduct, Vec<DomainError>> {
        let mut errs = Vec::new();

        let name = self.name.trim().to_string();
        if name.is_empty() {
            errs.push(DomainError::validation("Name is required."));
        }

        let price = match money::parse_price(&self.price) {
            Ok(price) => Some(price),
            Err(e) => {
                errs.push(e);
                None
            }
        };

        let stock = self.stock.unwrap_or(0);
        if stock < 0 {
            errs.push(DomainError::validation("Stock cannot be negative."));
        }

        match (price, errs.is_empty()) {
            (Some(price), true) => Ok(NewProduct { name, price, stock }),
            _ => Err(errs),
        }
    }
}
