//! Placement requests, normalization, and the placement error taxonomy.
//!
//! Everything here is pure: the store's placement transaction feeds a
//! request through [`normalize_items`] and maps its own failures onto
//! [`PlacementError`], so callers see one uniform outcome shape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use anvilcrm_catalog::StockShortage;
use anvilcrm_core::ProductId;

use crate::order::Order;

/// One requested line, as handed over by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemRequest {
    /// Raw product identifier; validated during normalization.
    pub product_id: String,
    pub quantity: i64,
}

impl LineItemRequest {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// A full placement request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrderRequest {
    /// Raw customer identifier; an unparseable or unknown ID is reported
    /// verbatim back to the caller.
    pub customer_id: String,
    /// Defaults to the placement time when absent.
    pub order_date: Option<DateTime<Utc>>,
    pub items: Vec<LineItemRequest>,
}

/// Why a placement request was rejected.
///
/// `Display` renders the user-facing message; the outcome's error list is
/// these messages in the order the problems were found.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("Customer ID {0} not found.")]
    CustomerNotFound(String),

    #[error("At least one item is required.")]
    EmptyOrder,

    #[error("Item {index}: invalid productId '{raw}'.")]
    InvalidProductId { index: usize, raw: String },

    #[error("Item {index}: quantity must be >= 1.")]
    InvalidQuantity { index: usize },

    #[error("Item {index}: quantity is out of range.")]
    QuantityOutOfRange { index: usize },

    #[error("Invalid product ID(s): {}", format_ids(.0))]
    ProductsNotFound(Vec<ProductId>),

    #[error("{0}")]
    InsufficientStock(StockShortage),

    #[error("Inventory is busy; the order was not placed. Retry may succeed.")]
    LockTimeout,

    #[error("Order could not be placed due to an internal error.")]
    Internal,
}

fn format_ids(ids: &[ProductId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl PlacementError {
    /// Whether retrying the identical request may succeed. Transient
    /// failures carry no verdict on the business input.
    pub fn is_transient(&self) -> bool {
        matches!(self, PlacementError::LockTimeout)
    }
}

/// Result envelope for order placement.
///
/// Exactly one of the two sides is populated: a persisted order with its
/// lines and resolved total, or a non-empty list of rejections with no
/// state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementOutcome {
    pub order: Option<Order>,
    pub errors: Vec<PlacementError>,
}

impl PlacementOutcome {
    pub fn placed(order: Order) -> Self {
        Self {
            order: Some(order),
            errors: Vec::new(),
        }
    }

    pub fn rejected(errors: Vec<PlacementError>) -> Self {
        debug_assert!(!errors.is_empty());
        Self {
            order: None,
            errors,
        }
    }

    pub fn ok(&self) -> bool {
        self.order.is_some() && self.errors.is_empty()
    }

    /// Human-readable error strings, in the order the problems were found.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    pub fn is_transient(&self) -> bool {
        self.errors.iter().any(PlacementError::is_transient)
    }
}

/// Merge and validate requested items.
///
/// Duplicate product IDs merge by summing quantities. Problems are batched:
/// every bad item is reported (1-based index), and any problem rejects the
/// entire request. The returned map iterates in ascending product-ID order,
/// which is also the order row locks are taken in.
pub fn normalize_items(
    items: &[LineItemRequest],
) -> Result<BTreeMap<ProductId, i32>, Vec<PlacementError>> {
    let mut errors = Vec::new();
    let mut requested: BTreeMap<ProductId, i32> = BTreeMap::new();

    for (index, item) in items.iter().enumerate() {
        let index = index + 1;
        let product_id = match item.product_id.parse::<ProductId>() {
            Ok(id) => id,
            Err(_) => {
                errors.push(PlacementError::InvalidProductId {
                    index,
                    raw: item.product_id.clone(),
                });
                continue;
            }
        };
        if item.quantity < 1 {
            errors.push(PlacementError::InvalidQuantity { index });
            continue;
        }
        let quantity = match i32::try_from(item.quantity) {
            Ok(q) => q,
            Err(_) => {
                errors.push(PlacementError::QuantityOutOfRange { index });
                continue;
            }
        };
        let merged = requested.entry(product_id).or_insert(0);
        match merged.checked_add(quantity) {
            Some(total) => *merged = total,
            None => errors.push(PlacementError::QuantityOutOfRange { index }),
        }
    }

    if errors.is_empty() {
        Ok(requested)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: &str, quantity: i64) -> LineItemRequest {
        LineItemRequest::new(product_id, quantity)
    }

    #[test]
    fn merges_duplicate_products() {
        let id = ProductId::new();
        let requested =
            normalize_items(&[item(&id.to_string(), 2), item(&id.to_string(), 3)]).unwrap();
        assert_eq!(requested.len(), 1);
        assert_eq!(requested[&id], 5);
    }

    #[test]
    fn iterates_in_ascending_product_id_order() {
        let mut ids = vec![ProductId::new(), ProductId::new(), ProductId::new()];
        let items: Vec<LineItemRequest> = ids
            .iter()
            .rev()
            .map(|id| item(&id.to_string(), 1))
            .collect();
        let requested = normalize_items(&items).unwrap();
        ids.sort();
        let keys: Vec<ProductId> = requested.keys().copied().collect();
        assert_eq!(keys, ids);
    }

    #[test]
    fn batches_every_item_problem() {
        let good = ProductId::new();
        let errors = normalize_items(&[
            item("nope", 1),
            item(&good.to_string(), 0),
            item(&good.to_string(), -3),
            item(&good.to_string(), 2),
        ])
        .unwrap_err();

        assert_eq!(
            errors,
            vec![
                PlacementError::InvalidProductId {
                    index: 1,
                    raw: "nope".to_string()
                },
                PlacementError::InvalidQuantity { index: 2 },
                PlacementError::InvalidQuantity { index: 3 },
            ]
        );
    }

    #[test]
    fn oversized_quantity_is_malformed_not_a_crash() {
        let id = ProductId::new();
        let errors =
            normalize_items(&[item(&id.to_string(), i64::from(i32::MAX) + 1)]).unwrap_err();
        assert_eq!(errors, vec![PlacementError::QuantityOutOfRange { index: 1 }]);
    }

    #[test]
    fn merged_quantities_cannot_overflow() {
        let id = ProductId::new();
        let errors = normalize_items(&[
            item(&id.to_string(), i64::from(i32::MAX)),
            item(&id.to_string(), 1),
        ])
        .unwrap_err();
        assert_eq!(errors, vec![PlacementError::QuantityOutOfRange { index: 2 }]);
    }

    #[test]
    fn empty_input_normalizes_to_empty_map() {
        // The empty-order rejection happens before normalization; an empty
        // slice here is simply an empty result.
        assert!(normalize_items(&[]).unwrap().is_empty());
    }

    #[test]
    fn error_messages_match_the_published_texts() {
        let shortage = StockShortage {
            product_id: ProductId::new(),
            name: "Laptop".to_string(),
            available: 2,
            requested: 3,
        };
        let cases: Vec<(PlacementError, String)> = vec![
            (
                PlacementError::CustomerNotFound("42".to_string()),
                "Customer ID 42 not found.".to_string(),
            ),
            (
                PlacementError::EmptyOrder,
                "At least one item is required.".to_string(),
            ),
            (
                PlacementError::InvalidProductId {
                    index: 2,
                    raw: "xyz".to_string(),
                },
                "Item 2: invalid productId 'xyz'.".to_string(),
            ),
            (
                PlacementError::InvalidQuantity { index: 1 },
                "Item 1: quantity must be >= 1.".to_string(),
            ),
            (
                PlacementError::InsufficientStock(shortage.clone()),
                format!(
                    "Product Laptop (id={}) has insufficient stock (2 < 3).",
                    shortage.product_id
                ),
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn missing_products_render_sorted_and_comma_separated() {
        let mut ids = vec![ProductId::new(), ProductId::new()];
        ids.sort();
        let error = PlacementError::ProductsNotFound(ids.clone());
        assert_eq!(
            error.to_string(),
            format!("Invalid product ID(s): {}, {}", ids[0], ids[1])
        );
    }

    #[test]
    fn only_lock_timeout_is_transient() {
        assert!(PlacementError::LockTimeout.is_transient());
        assert!(!PlacementError::EmptyOrder.is_transient());
        assert!(!PlacementError::Internal.is_transient());
    }

    #[test]
    fn outcome_shape_is_mutually_exclusive() {
        let rejected = PlacementOutcome::rejected(vec![PlacementError::EmptyOrder]);
        assert!(!rejected.ok());
        assert_eq!(
            rejected.error_messages(),
            vec!["At least one item is required."]
        );
        assert!(rejected.order.is_none());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Normalized quantities equal the per-product sums of the input.
            #[test]
            fn merge_preserves_sums(
                quantities in proptest::collection::vec(1..500i64, 1..20),
            ) {
                let id = ProductId::new();
                let items: Vec<LineItemRequest> = quantities
                    .iter()
                    .map(|q| LineItemRequest::new(id.to_string(), *q))
                    .collect();
                let requested = normalize_items(&items).unwrap();
                let expected: i64 = quantities.iter().sum();
                prop_assert_eq!(i64::from(requested[&id]), expected);
            }

            /// Normalization never panics on arbitrary raw input.
            #[test]
            fn total_function_on_garbage(
                raw in proptest::collection::vec((".{0,40}", any::<i64>()), 0..20),
            ) {
                let items: Vec<LineItemRequest> = raw
                    .into_iter()
                    .map(|(id, q)| LineItemRequest::new(id, q))
                    .collect();
                let _ = normalize_items(&items);
            }
        }
    }
}
