//! Order store: aggregate persistence and the persisted side of the Total
//! Recalculation Rule.
//!
//! `apply_total` is called from every code path that writes order lines —
//! placement and each maintenance mutation below — inside that path's own
//! transaction, so `total_amount` is never observably stale relative to
//! the lines.

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use anvilcrm_core::{CustomerId, OrderId, OrderLineId, ProductId};
use anvilcrm_orders::{recompute_total, Order, OrderLine, OrderStatus};

use crate::error::{decode_err, map_sqlx_error, StoreError, StoreResult};
use crate::filters::{self, OrderFilter};

/// Postgres-backed order store.
#[derive(Debug, Clone)]
pub struct OrderStore {
    pool: Arc<PgPool>,
}

impl OrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Load an order with its lines.
    #[instrument(skip(self), fields(order_id = %id), err)]
    pub async fn get(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let header = sqlx::query(
            "SELECT id, customer_id, status, order_date, total_amount FROM orders WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_order", e))?;

        let Some(header) = header else {
            return Ok(None);
        };
        let mut order = order_from_row(&header)?;

        let rows = sqlx::query(
            r#"
            SELECT id, product_id, quantity, unit_price
            FROM order_lines
            WHERE order_id = $1
            ORDER BY product_id
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_order_lines", e))?;

        order.lines = rows
            .iter()
            .map(line_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Some(order))
    }

    /// Find orders matching `filter`, lines hydrated.
    pub async fn find(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        filters::find_orders(&self.pool, filter).await
    }

    /// Add (or merge) a line on an existing order, snapshotting the
    /// product's current price for a new line, then re-derive the total in
    /// the same transaction.
    #[instrument(skip(self), fields(order_id = %order_id, product_id = %product_id), err)]
    pub async fn add_line(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i32,
    ) -> StoreResult<Order> {
        if quantity < 1 {
            return Err(StoreError::CheckViolation(
                "quantity must be >= 1".to_string(),
            ));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_add_line", e))?;

        let price_row = sqlx::query("SELECT price FROM products WHERE id = $1")
            .bind(product_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("snapshot_price", e))?;
        let unit_price: Decimal = match price_row {
            Some(row) => row
                .try_get("price")
                .map_err(|e| decode_err("products.price", e))?,
            None => return Err(StoreError::NotFound),
        };

        // A repeated product merges into the existing line; the original
        // price snapshot is kept (DO UPDATE leaves unit_price untouched).
        let line_id = OrderLineId::new();
        let result = sqlx::query(
            r#"
            INSERT INTO order_lines (id, order_id, product_id, quantity, unit_price)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id, product_id)
            DO UPDATE SET quantity = order_lines.quantity + EXCLUDED.quantity
            "#,
        )
        .bind(line_id.as_uuid())
        .bind(order_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(quantity)
        .bind(unit_price)
        .execute(&mut *tx)
        .await
        .map_err(|e| match map_sqlx_error("insert_line", e) {
            // The order FK failing means the order does not exist.
            StoreError::ForeignKeyViolation(_) => StoreError::NotFound,
            other => other,
        })?;
        debug_assert_eq!(result.rows_affected(), 1);

        apply_total(&mut tx, order_id).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_add_line", e))?;

        self.get(order_id).await?.ok_or(StoreError::NotFound)
    }

    /// Replace the quantity of an existing line, then re-derive the total.
    #[instrument(skip(self), fields(order_id = %order_id, product_id = %product_id), err)]
    pub async fn set_line_quantity(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i32,
    ) -> StoreResult<Order> {
        if quantity < 1 {
            return Err(StoreError::CheckViolation(
                "quantity must be >= 1".to_string(),
            ));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_set_quantity", e))?;

        let result = sqlx::query(
            "UPDATE order_lines SET quantity = $3 WHERE order_id = $1 AND product_id = $2",
        )
        .bind(order_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(quantity)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("set_line_quantity", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        apply_total(&mut tx, order_id).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_set_quantity", e))?;

        self.get(order_id).await?.ok_or(StoreError::NotFound)
    }

    /// Remove the line for a product, then re-derive the total.
    #[instrument(skip(self), fields(order_id = %order_id, product_id = %product_id), err)]
    pub async fn remove_line(
        &self,
        order_id: OrderId,
        product_id: ProductId,
    ) -> StoreResult<Order> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_remove_line", e))?;

        let result = sqlx::query(
            "DELETE FROM order_lines WHERE order_id = $1 AND product_id = $2",
        )
        .bind(order_id.as_uuid())
        .bind(product_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("remove_line", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        apply_total(&mut tx, order_id).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_remove_line", e))?;

        self.get(order_id).await?.ok_or(StoreError::NotFound)
    }
}

/// Insert the order header inside the caller's transaction.
pub(crate) async fn insert_order(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (id, customer_id, status, order_date, total_amount)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(order.id.as_uuid())
    .bind(order.customer_id.as_uuid())
    .bind(order.status.as_str())
    .bind(order.order_date)
    .bind(order.total_amount)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_order", e))?;
    Ok(())
}

/// Insert one line inside the caller's transaction.
pub(crate) async fn insert_line(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
    line: &OrderLine,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO order_lines (id, order_id, product_id, quantity, unit_price)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(line.id.as_uuid())
    .bind(order_id.as_uuid())
    .bind(line.product_id.as_uuid())
    .bind(line.quantity)
    .bind(line.unit_price)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_line", e))?;
    Ok(())
}

/// Recompute the order's total from its current lines and persist it,
/// inside the caller's transaction.
///
/// Idempotent: unchanged lines store the same value again. Returns the
/// stored total.
pub async fn apply_total(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
) -> StoreResult<Decimal> {
    let rows = sqlx::query(
        r#"
        SELECT id, product_id, quantity, unit_price
        FROM order_lines
        WHERE order_id = $1
        ORDER BY product_id
        "#,
    )
    .bind(order_id.as_uuid())
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("read_lines_for_total", e))?;

    let lines = rows
        .iter()
        .map(line_from_row)
        .collect::<StoreResult<Vec<_>>>()?;
    let total = recompute_total(&lines);

    sqlx::query("UPDATE orders SET total_amount = $2 WHERE id = $1")
        .bind(order_id.as_uuid())
        .bind(total)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("write_total", e))?;

    Ok(total)
}

pub(crate) fn order_from_row(row: &PgRow) -> StoreResult<Order> {
    let status: String = row
        .try_get("status")
        .map_err(|e| decode_err("orders.status", e))?;
    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id").map_err(|e| decode_err("orders.id", e))?),
        customer_id: CustomerId::from_uuid(
            row.try_get("customer_id")
                .map_err(|e| decode_err("orders.customer_id", e))?,
        ),
        status: OrderStatus::parse(&status).map_err(|e| StoreError::Decode(e.to_string()))?,
        order_date: row
            .try_get("order_date")
            .map_err(|e| decode_err("orders.order_date", e))?,
        total_amount: row
            .try_get("total_amount")
            .map_err(|e| decode_err("orders.total_amount", e))?,
        lines: Vec::new(),
    })
}

pub(crate) fn line_from_row(row: &PgRow) -> StoreResult<OrderLine> {
    Ok(OrderLine {
        id: OrderLineId::from_uuid(
            row.try_get("id")
                .map_err(|e| decode_err("order_lines.id", e))?,
        ),
        product_id: ProductId::from_uuid(
            row.try_get("product_id")
                .map_err(|e| decode_err("order_lines.product_id", e))?,
        ),
        quantity: row
            .try_get("quantity")
            .map_err(|e| decode_err("order_lines.quantity", e))?,
        unit_price: row
            .try_get("unit_price")
            .map_err(|e| decode_err("order_lines.unit_price", e))?,
    })
}
