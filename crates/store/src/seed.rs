//! Idempotent demo data.
//!
//! Safe to run repeatedly: customers and products are looked up before
//! being created, and the sample order is only placed when no order exists.
//! The sample order goes through the real placement transaction so seeded
//! data obeys the same invariants as production writes.

use sqlx::PgPool;

use anvilcrm_catalog::ProductDraft;
use anvilcrm_customers::{Customer, CustomerDraft};

use crate::catalog::{ProductCreateError, ProductStore};
use crate::config::StoreConfig;
use crate::customers::{CustomerCreateError, CustomerStore};
use crate::error::{StoreError, StoreResult};
use crate::placement::OrderPlacement;
use crate::stats;

/// Row counts after seeding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    pub customers: i64,
    pub products: i64,
    pub orders: i64,
}

/// Seed the demo data set and return the resulting counts.
pub async fn seed_demo_data(pool: &PgPool, config: &StoreConfig) -> StoreResult<SeedSummary> {
    let customers = CustomerStore::new(pool.clone());
    let products = ProductStore::new(pool.clone());

    let alice = ensure_customer(&customers, "Alice", "alice@example.com", Some("+1234567890")).await?;
    ensure_customer(&customers, "Bob", "bob@example.com", Some("123-456-7890")).await?;

    let laptop = ensure_product(&products, "Laptop", "999.99", 10).await?;
    ensure_product(&products, "Phone", "499.50", 25).await?;
    let headphones = ensure_product(&products, "Headphones", "79.90", 50).await?;

    let totals = stats::report_totals(pool).await?;
    if totals.orders == 0 {
        let placement = OrderPlacement::new(pool.clone(), config);
        let request = anvilcrm_orders::PlaceOrderRequest {
            customer_id: alice.id.to_string(),
            order_date: None,
            items: vec![
                anvilcrm_orders::LineItemRequest::new(laptop.id.to_string(), 1),
                anvilcrm_orders::LineItemRequest::new(headphones.id.to_string(), 1),
            ],
        };
        let outcome = placement.place_order(&request).await?;
        if !outcome.ok() {
            return Err(StoreError::Query(format!(
                "seed order rejected: {}",
                outcome.error_messages().join(" ")
            )));
        }
    }

    let totals = stats::report_totals(pool).await?;
    let product_count = products
        .find(&crate::filters::ProductFilter::default())
        .await?
        .len() as i64;
    Ok(SeedSummary {
        customers: totals.customers,
        products: product_count,
        orders: totals.orders,
    })
}

async fn ensure_customer(
    store: &CustomerStore,
    name: &str,
    email: &str,
    phone: Option<&str>,
) -> StoreResult<Customer> {
    if let Some(existing) = store.find_by_email(email).await? {
        return Ok(existing);
    }
    match store.create(&CustomerDraft::new(name, email, phone)).await {
        Ok(customer) => Ok(customer),
        // Lost a race or already present; the row must exist now.
        Err(CustomerCreateError::Rejected(_)) => {
            store.find_by_email(email).await?.ok_or(StoreError::NotFound)
        }
        Err(CustomerCreateError::Store(e)) => Err(e),
    }
}

async fn ensure_product(
    store: &ProductStore,
    name: &str,
    price: &str,
    stock: i32,
) -> StoreResult<anvilcrm_catalog::Product> {
    if let Some(existing) = store.find_by_name(name).await? {
        return Ok(existing);
    }
    match store
        .create(&ProductDraft::new(name, price, Some(stock)))
        .await
    {
        Ok(product) => Ok(product),
        Err(ProductCreateError::Rejected(errs)) => Err(StoreError::Query(format!(
            "seed product rejected: {errs:?}"
        ))),
        Err(ProductCreateError::Store(e)) => Err(e),
    }
}
