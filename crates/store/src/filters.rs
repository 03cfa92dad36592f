//! Query/filter layer: find records matching a predicate set, optionally
//! ordered.
//!
//! Each filter compiles to a single parameterized query using the
//! `$n IS NULL OR column <op> $n` shape, so absent predicates cost nothing
//! and the statement text stays stable per ordering.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use anvilcrm_catalog::Product;
use anvilcrm_core::{OrderId, ProductId};
use anvilcrm_customers::Customer;
use anvilcrm_orders::{Order, OrderStatus};

use crate::catalog::product_from_row;
use crate::customers::customer_from_row;
use crate::error::{decode_err, map_sqlx_error, StoreResult};
use crate::orders::{line_from_row, order_from_row};

/// Predicates over customers. All fields are optional; an empty filter
/// matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerFilter {
    /// Case-insensitive substring match on the name.
    pub name_contains: Option<String>,
    /// Case-insensitive substring match on the email.
    pub email_contains: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// Prefix match on the phone (e.g. `+1`).
    pub phone_prefix: Option<String>,
    pub sort: CustomerSort,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CustomerSort {
    #[default]
    CreatedDesc,
    NameAsc,
}

/// Predicates over products.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub name_contains: Option<String>,
    pub price_min: Option<Decimal>,
    pub price_max: Option<Decimal>,
    pub stock: Option<i32>,
    pub stock_min: Option<i32>,
    pub stock_max: Option<i32>,
    /// Strictly-below probe (low-stock reporting).
    pub stock_below: Option<i32>,
    pub sort: ProductSort,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProductSort {
    #[default]
    NameAsc,
    PriceAsc,
    PriceDesc,
    StockAsc,
}

/// Predicates over orders. Joined predicates (customer name, product name,
/// contains-product) deduplicate with DISTINCT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub total_min: Option<Decimal>,
    pub total_max: Option<Decimal>,
    pub placed_after: Option<DateTime<Utc>>,
    pub placed_before: Option<DateTime<Utc>>,
    pub status: Option<OrderStatus>,
    /// Case-insensitive substring match on the customer's name.
    pub customer_name_contains: Option<String>,
    /// Case-insensitive substring match on any line's product name.
    pub product_name_contains: Option<String>,
    /// Orders containing this product.
    pub product_id: Option<ProductId>,
    pub sort: OrderSort,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderSort {
    #[default]
    DateDesc,
    TotalDesc,
    TotalAsc,
}

pub(crate) async fn find_customers(
    pool: &PgPool,
    filter: &CustomerFilter,
) -> StoreResult<Vec<Customer>> {
    let order_by = match filter.sort {
        CustomerSort::CreatedDesc => "created_at DESC",
        CustomerSort::NameAsc => "name ASC",
    };
    let sql = format!(
        r#"
        SELECT id, name, email, phone, created_at
        FROM customers
        WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
          AND ($2::text IS NULL OR email ILIKE '%' || $2 || '%')
          AND ($3::timestamptz IS NULL OR created_at >= $3)
          AND ($4::timestamptz IS NULL OR created_at <= $4)
          AND ($5::text IS NULL OR phone LIKE $5 || '%')
        ORDER BY {order_by}
        "#
    );

    let rows = sqlx::query(&sql)
        .bind(filter.name_contains.as_deref())
        .bind(filter.email_contains.as_deref())
        .bind(filter.created_after)
        .bind(filter.created_before)
        .bind(filter.phone_prefix.as_deref())
        .fetch_all(pool)
        .await
        .map_err(|e| map_sqlx_error("find_customers", e))?;

    rows.iter().map(customer_from_row).collect()
}

pub(crate) async fn find_products(
    pool: &PgPool,
    filter: &ProductFilter,
) -> StoreResult<Vec<Product>> {
    let order_by = match filter.sort {
        ProductSort::NameAsc => "name ASC",
        ProductSort::PriceAsc => "price ASC",
        ProductSort::PriceDesc => "price DESC",
        ProductSort::StockAsc => "stock ASC",
    };
    let sql = format!(
        r#"
        SELECT id, name, price, stock, created_at
        FROM products
        WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
          AND ($2::numeric IS NULL OR price >= $2)
          AND ($3::numeric IS NULL OR price <= $3)
          AND ($4::integer IS NULL OR stock = $4)
          AND ($5::integer IS NULL OR stock >= $5)
          AND ($6::integer IS NULL OR stock <= $6)
          AND ($7::integer IS NULL OR stock < $7)
        ORDER BY {order_by}
        "#
    );

    let rows = sqlx::query(&sql)
        .bind(filter.name_contains.as_deref())
        .bind(filter.price_min)
        .bind(filter.price_max)
        .bind(filter.stock)
        .bind(filter.stock_min)
        .bind(filter.stock_max)
        .bind(filter.stock_below)
        .fetch_all(pool)
        .await
        .map_err(|e| map_sqlx_error("find_products", e))?;

    rows.iter().map(product_from_row).collect()
}

pub(crate) async fn find_orders(pool: &PgPool, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
    let order_by = match filter.sort {
        OrderSort::DateDesc => "o.order_date DESC",
        OrderSort::TotalDesc => "o.total_amount DESC",
        OrderSort::TotalAsc => "o.total_amount ASC",
    };
    let sql = format!(
        r#"
        SELECT DISTINCT o.id, o.customer_id, o.status, o.order_date, o.total_amount
        FROM orders o
        JOIN customers c ON c.id = o.customer_id
        LEFT JOIN order_lines l ON l.order_id = o.id
        LEFT JOIN products p ON p.id = l.product_id
        WHERE ($1::numeric IS NULL OR o.total_amount >= $1)
          AND ($2::numeric IS NULL OR o.total_amount <= $2)
          AND ($3::timestamptz IS NULL OR o.order_date >= $3)
          AND ($4::timestamptz IS NULL OR o.order_date <= $4)
          AND ($5::text IS NULL OR o.status = $5)
          AND ($6::text IS NULL OR c.name ILIKE '%' || $6 || '%')
          AND ($7::text IS NULL OR p.name ILIKE '%' || $7 || '%')
          AND ($8::uuid IS NULL OR l.product_id = $8)
        ORDER BY {order_by}
        "#
    );

    let rows = sqlx::query(&sql)
        .bind(filter.total_min)
        .bind(filter.total_max)
        .bind(filter.placed_after)
        .bind(filter.placed_before)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.customer_name_contains.as_deref())
        .bind(filter.product_name_contains.as_deref())
        .bind(filter.product_id.map(|id| *id.as_uuid()))
        .fetch_all(pool)
        .await
        .map_err(|e| map_sqlx_error("find_orders", e))?;

    let mut orders = rows
        .iter()
        .map(order_from_row)
        .collect::<StoreResult<Vec<_>>>()?;
    hydrate_lines(pool, &mut orders).await?;
    Ok(orders)
}

/// Attach lines to a batch of order headers with one query.
async fn hydrate_lines(pool: &PgPool, orders: &mut [Order]) -> StoreResult<()> {
    if orders.is_empty() {
        return Ok(());
    }
    let ids: Vec<uuid::Uuid> = orders.iter().map(|o| *o.id.as_uuid()).collect();
    let rows = sqlx::query(
        r#"
        SELECT order_id, id, product_id, quantity, unit_price
        FROM order_lines
        WHERE order_id = ANY($1)
        ORDER BY product_id
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("hydrate_lines", e))?;

    let mut by_order: std::collections::HashMap<OrderId, Vec<anvilcrm_orders::OrderLine>> =
        std::collections::HashMap::new();
    for row in &rows {
        let order_id: uuid::Uuid = row
            .try_get("order_id")
            .map_err(|e| decode_err("order_lines.order_id", e))?;
        by_order
            .entry(OrderId::from_uuid(order_id))
            .or_default()
            .push(line_from_row(row)?);
    }
    for order in orders {
        order.lines = by_order.remove(&order.id).unwrap_or_default();
    }
    Ok(())
}
