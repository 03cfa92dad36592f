//! The Order Placement Transaction.
//!
//! Validates a placement request, reserves stock under exclusive product-row
//! locks, snapshots unit prices, derives the total, and commits — or rolls
//! back leaving no observable change. Every early exit before `commit`
//! (explicit rollback, `?`, or panic) drops the transaction handle, which
//! rolls the transaction back.
//!
//! Concurrency: two requests for overlapping products serialize on the row
//! locks taken in ascending product-ID order. The waiter re-reads stock
//! after the holder commits, so combined demand can never oversell a
//! product. Requests for disjoint products run fully in parallel.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use anvilcrm_core::{CustomerId, OrderId, OrderLineId, ProductId};
use anvilcrm_orders::{
    normalize_items, Order, OrderLine, PlaceOrderRequest, PlacementError, PlacementOutcome,
};

use crate::catalog::{self, LedgerError};
use crate::config::StoreConfig;
use crate::customers::CustomerStore;
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::orders;

/// Executes placement requests against the shared store.
#[derive(Clone)]
pub struct OrderPlacement {
    pool: Arc<PgPool>,
    customers: CustomerStore,
    lock_timeout_ms: u64,
}

impl OrderPlacement {
    pub fn new(pool: PgPool, config: &StoreConfig) -> Self {
        Self {
            customers: CustomerStore::new(pool.clone()),
            pool: Arc::new(pool),
            lock_timeout_ms: config.lock_timeout.as_millis() as u64,
        }
    }

    /// Place an order.
    ///
    /// Business rejections (unknown customer, bad items, missing products,
    /// insufficient stock, lock timeout) come back inside the outcome with
    /// no state change; only a store that cannot be reached at all surfaces
    /// as `Err`.
    #[instrument(
        skip(self, request),
        fields(customer_id = %request.customer_id, items = request.items.len())
    )]
    pub async fn place_order(&self, request: &PlaceOrderRequest) -> StoreResult<PlacementOutcome> {
        // The customer must exist; nothing else is validated if it does not.
        // A malformed ID is indistinguishable from an unknown one here and
        // is reported verbatim.
        let customer_id = match request.customer_id.parse::<CustomerId>() {
            Ok(id) => id,
            Err(_) => {
                return Ok(PlacementOutcome::rejected(vec![
                    PlacementError::CustomerNotFound(request.customer_id.clone()),
                ]));
            }
        };
        if self.customers.find_by_id(customer_id).await?.is_none() {
            return Ok(PlacementOutcome::rejected(vec![
                PlacementError::CustomerNotFound(request.customer_id.clone()),
            ]));
        }

        // No transaction is opened for an empty request.
        if request.items.is_empty() {
            return Ok(PlacementOutcome::rejected(vec![PlacementError::EmptyOrder]));
        }

        // Merge duplicates and collect every per-item problem.
        let requested = match normalize_items(&request.items) {
            Ok(requested) => requested,
            Err(errors) => return Ok(PlacementOutcome::rejected(errors)),
        };

        // All products must exist before any lock is taken.
        let ids: Vec<ProductId> = requested.keys().copied().collect();
        let missing = self.missing_products(&ids).await?;
        if !missing.is_empty() {
            return Ok(PlacementOutcome::rejected(vec![
                PlacementError::ProductsNotFound(missing),
            ]));
        }

        let order_date = request.order_date.unwrap_or_else(Utc::now);
        match self.run_transaction(customer_id, order_date, &requested).await {
            Ok(outcome) => Ok(outcome),
            Err(StoreError::LockTimeout(detail)) => {
                tracing::warn!(detail = %detail, "placement timed out waiting for inventory locks");
                Ok(PlacementOutcome::rejected(vec![PlacementError::LockTimeout]))
            }
            Err(err @ StoreError::Unavailable(_)) => Err(err),
            Err(err) => {
                tracing::error!(error = %err, "placement failed unexpectedly; rolled back");
                Ok(PlacementOutcome::rejected(vec![PlacementError::Internal]))
            }
        }
    }

    /// Requested IDs with no product row, ascending (the input is already
    /// sorted and deduplicated).
    async fn missing_products(&self, ids: &[ProductId]) -> StoreResult<Vec<ProductId>> {
        let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query("SELECT id FROM products WHERE id = ANY($1)")
            .bind(&uuids)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("resolve_products", e))?;

        let mut found = std::collections::BTreeSet::new();
        for row in rows {
            use sqlx::Row;
            let id: uuid::Uuid = row
                .try_get("id")
                .map_err(|e| crate::error::decode_err("products.id", e))?;
            found.insert(ProductId::from_uuid(id));
        }
        Ok(ids.iter().copied().filter(|id| !found.contains(id)).collect())
    }

    async fn run_transaction(
        &self,
        customer_id: CustomerId,
        order_date: DateTime<Utc>,
        requested: &BTreeMap<ProductId, i32>,
    ) -> StoreResult<PlacementOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_placement", e))?;

        self.set_lock_timeout(&mut tx).await?;

        // Re-read under exclusive locks; every stock check below sees the
        // value current after any contending transaction finished.
        let ids: Vec<ProductId> = requested.keys().copied().collect();
        let locked = catalog::lock_and_fetch(&mut tx, &ids).await?;

        // A product deleted between the existence check and the lock shows
        // up as missing here.
        let vanished: Vec<ProductId> = ids
            .iter()
            .copied()
            .filter(|id| !locked.contains_key(id))
            .collect();
        if !vanished.is_empty() {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback_placement", e))?;
            return Ok(PlacementOutcome::rejected(vec![
                PlacementError::ProductsNotFound(vanished),
            ]));
        }

        // Shortages are batched so the caller sees all of them at once; a
        // partial reservation is never committed.
        let mut shortages = Vec::new();
        for (product_id, quantity) in requested {
            let mut probe = locked[product_id].clone();
            if let Err(shortage) = probe.reserve(*quantity) {
                shortages.push(PlacementError::InsufficientStock(shortage));
            }
        }
        if !shortages.is_empty() {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback_placement", e))?;
            return Ok(PlacementOutcome::rejected(shortages));
        }

        let mut order = Order::new(OrderId::new(), customer_id, order_date);
        orders::insert_order(&mut tx, &order).await?;

        for (product_id, quantity) in requested {
            let product = &locked[product_id];
            let line = OrderLine {
                id: OrderLineId::new(),
                product_id: *product_id,
                quantity: *quantity,
                unit_price: product.price,
            };
            orders::insert_line(&mut tx, order.id, &line).await?;
            match catalog::decrement_stock(&mut tx, product, *quantity).await {
                Ok(()) => {}
                Err(LedgerError::Insufficient(shortage)) => {
                    tx.rollback()
                        .await
                        .map_err(|e| map_sqlx_error("rollback_placement", e))?;
                    return Ok(PlacementOutcome::rejected(vec![
                        PlacementError::InsufficientStock(shortage),
                    ]));
                }
                Err(LedgerError::Store(e)) => return Err(e),
            }
            order.lines.push(line);
        }

        order.total_amount = orders::apply_total(&mut tx, order.id).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_placement", e))?;
        Ok(PlacementOutcome::placed(order))
    }

    /// Bound the wait on contended rows for this transaction only. Expiry
    /// surfaces as 55P03, mapped to the transient placement error.
    async fn set_lock_timeout(&self, tx: &mut Transaction<'_, Postgres>) -> StoreResult<()> {
        // SET LOCAL takes no bind parameters; the value is a config integer.
        let statement = format!("SET LOCAL lock_timeout = {}", self.lock_timeout_ms);
        sqlx::query(&statement)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;
        Ok(())
    }
}
