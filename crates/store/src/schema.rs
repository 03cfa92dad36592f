//! Idempotent schema bootstrap.
//!
//! The constraints carry real invariants, not just shape: the partial
//! uniqueness of emails is case-insensitive and enforced at commit time,
//! stock can never be negative even if application guards are bypassed,
//! and a product referenced by order lines cannot be deleted.

use sqlx::PgPool;

use crate::error::{map_sqlx_error, StoreResult};

const DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS customers (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    // Commit-time guard for case-insensitive email uniqueness.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS customers_email_lower_idx
        ON customers ((LOWER(email)))
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        price NUMERIC(10, 2) NOT NULL CHECK (price >= 0.01),
        stock INTEGER NOT NULL DEFAULT 0 CHECK (stock >= 0),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        customer_id UUID NOT NULL REFERENCES customers (id) ON DELETE CASCADE,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'paid', 'shipped', 'cancelled')),
        order_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        total_amount NUMERIC(12, 2) NOT NULL DEFAULT 0 CHECK (total_amount >= 0)
    )
    "#,
    // Lines are owned by their order (CASCADE) but only borrow the product
    // (RESTRICT); at most one line per (order, product).
    r#"
    CREATE TABLE IF NOT EXISTS order_lines (
        id UUID PRIMARY KEY,
        order_id UUID NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
        product_id UUID NOT NULL REFERENCES products (id) ON DELETE RESTRICT,
        quantity INTEGER NOT NULL CHECK (quantity >= 1),
        unit_price NUMERIC(10, 2) NOT NULL,
        UNIQUE (order_id, product_id)
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS orders_customer_idx ON orders (customer_id)"#,
    r#"CREATE INDEX IF NOT EXISTS order_lines_order_idx ON order_lines (order_id)"#,
    r#"CREATE INDEX IF NOT EXISTS order_lines_product_idx ON order_lines (product_id)"#,
];

/// Create all tables and indexes if they do not exist yet.
pub async fn init_schema(pool: &PgPool) -> StoreResult<()> {
    for statement in DDL {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("init_schema", e))?;
    }
    Ok(())
}
