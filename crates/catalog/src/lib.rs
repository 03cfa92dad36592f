//! `anvilcrm-catalog` — products and the Inventory Ledger domain rules.
//!
//! A product row carries both its catalog identity (name, price) and its
//! stock level. Stock invariants (never negative, reservation vs restock)
//! are stated here; the store layer enforces the same rules under row
//! locks for concurrent writers.

pub mod product;

pub use product::{
    NewProduct, Product, ProductDraft, StockShortage, LOW_STOCK_THRESHOLD, RESTOCK_INCREMENT,
};
