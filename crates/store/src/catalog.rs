//! Product catalog store and the Inventory Ledger operations.
//!
//! The ledger primitives (`lock_and_fetch`, `decrement_stock`, `restock`)
//! execute inside a caller-supplied transaction and never manage their own
//! transaction boundaries — the placement transaction and the maintenance
//! mutations decide where commit points are.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use thiserror::Error;
use tracing::instrument;

use anvilcrm_catalog::{Product, ProductDraft, StockShortage, LOW_STOCK_THRESHOLD, RESTOCK_INCREMENT};
use anvilcrm_core::{DomainError, ProductId};

use crate::error::{decode_err, map_sqlx_error, StoreError, StoreResult};
use crate::filters::{self, ProductFilter};

/// Why a product creation was rejected.
#[derive(Debug, Error)]
pub enum ProductCreateError {
    /// Validation problems; the full list of user-facing messages.
    #[error("product rejected: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(" "))]
    Rejected(Vec<DomainError>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of a stock-mutating ledger operation.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The decrement guard found less stock than requested.
    #[error("{0}")]
    Insufficient(StockShortage),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Postgres-backed product store.
#[derive(Debug, Clone)]
pub struct ProductStore {
    pool: Arc<PgPool>,
}

impl ProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create a product from a validated draft.
    #[instrument(skip(self, draft), err(Debug))]
    pub async fn create(&self, draft: &ProductDraft) -> Result<Product, ProductCreateError> {
        let new = draft.validate().map_err(ProductCreateError::Rejected)?;
        let product = Product {
            id: ProductId::new(),
            name: new.name,
            price: new.price,
            stock: new.stock,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO products (id, name, price, stock, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| ProductCreateError::Store(map_sqlx_error("insert_product", e)))?;
        Ok(product)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    pub async fn find_by_id(&self, id: ProductId) -> StoreResult<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, price, stock, created_at FROM products WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_product", e))?;
        row.map(|r| product_from_row(&r)).transpose()
    }

    pub async fn find_by_name(&self, name: &str) -> StoreResult<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, price, stock, created_at FROM products WHERE name = $1 LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_product_by_name", e))?;
        row.map(|r| product_from_row(&r)).transpose()
    }

    /// Delete a product. Rejected while any order line references it.
    #[instrument(skip(self), fields(product_id = %id), err)]
    pub async fn delete(&self, id: ProductId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| match map_sqlx_error("delete_product", e) {
                StoreError::ForeignKeyViolation(_) => StoreError::ForeignKeyViolation(format!(
                    "product {id} is referenced by existing order lines"
                )),
                other => other,
            })?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Find products matching `filter`.
    pub async fn find(&self, filter: &ProductFilter) -> StoreResult<Vec<Product>> {
        filters::find_products(&self.pool, filter).await
    }

    /// Lock every product below the low-stock threshold and add the restock
    /// increment, in one transaction. Returns the updated rows, ascending by ID.
    #[instrument(skip(self), err)]
    pub async fn restock_low_stock(&self) -> StoreResult<Vec<Product>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_restock", e))?;

        let rows = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock + $1
            WHERE id IN (
                SELECT id FROM products WHERE stock < $2 ORDER BY id FOR UPDATE
            )
            RETURNING id, name, price, stock, created_at
            "#,
        )
        .bind(RESTOCK_INCREMENT)
        .bind(LOW_STOCK_THRESHOLD)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("restock_low_stock", e))?;

        let mut updated = rows
            .iter()
            .map(product_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        updated.sort_by_key(|p| p.id);

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_restock", e))?;
        Ok(updated)
    }
}

/// Re-read and exclusively lock the given product rows.
///
/// Rows are locked in ascending ID order; callers iterate the returned map
/// in that same order, so overlapping transactions always acquire locks in
/// one global sequence and cannot deadlock on each other.
pub async fn lock_and_fetch(
    tx: &mut Transaction<'_, Postgres>,
    ids: &[ProductId],
) -> StoreResult<BTreeMap<ProductId, Product>> {
    let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
    let rows = sqlx::query(
        r#"
        SELECT id, name, price, stock, created_at
        FROM products
        WHERE id = ANY($1)
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .bind(&uuids)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_products", e))?;

    let mut products = BTreeMap::new();
    for row in &rows {
        let product = product_from_row(row)?;
        products.insert(product.id, product);
    }
    Ok(products)
}

/// Decrement stock inside the caller's transaction.
///
/// The `stock >= quantity` guard re-checks availability at decrement time,
/// independently of any pre-check, so a lost update can never drive stock
/// negative.
pub async fn decrement_stock(
    tx: &mut Transaction<'_, Postgres>,
    product: &Product,
    quantity: i32,
) -> Result<(), LedgerError> {
    let result = sqlx::query("UPDATE products SET stock = stock - $2 WHERE id = $1 AND stock >= $2")
        .bind(product.id.as_uuid())
        .bind(quantity)
        .execute(&mut **tx)
        .await
        .map_err(|e| LedgerError::Store(map_sqlx_error("decrement_stock", e)))?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::Insufficient(StockShortage {
            product_id: product.id,
            name: product.name.clone(),
            available: product.stock,
            requested: quantity,
        }));
    }
    Ok(())
}

/// Administrative restock inside the caller's transaction: additive, no
/// upper bound.
pub async fn restock(
    tx: &mut Transaction<'_, Postgres>,
    id: ProductId,
    quantity: i32,
) -> StoreResult<Product> {
    if quantity < 1 {
        return Err(StoreError::CheckViolation(
            "restock quantity must be positive".to_string(),
        ));
    }
    let row = sqlx::query(
        r#"
        UPDATE products
        SET stock = stock + $2
        WHERE id = $1
        RETURNING id, name, price, stock, created_at
        "#,
    )
    .bind(id.as_uuid())
    .bind(quantity)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("restock", e))?;

    match row {
        Some(row) => product_from_row(&row),
        None => Err(StoreError::NotFound),
    }
}

pub(crate) fn product_from_row(row: &PgRow) -> StoreResult<Product> {
    Ok(Product {
        id: ProductId::from_uuid(
            row.try_get("id").map_err(|e| decode_err("products.id", e))?,
        ),
        name: row
            .try_get("name")
            .map_err(|e| decode_err("products.name", e))?,
        price: row
            .try_get("price")
            .map_err(|e| decode_err("products.price", e))?,
        stock: row
            .try_get("stock")
            .map_err(|e| decode_err("products.stock", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| decode_err("products.created_at", e))?,
    })
}
