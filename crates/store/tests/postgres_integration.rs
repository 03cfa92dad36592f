//! End-to-end tests against a real Postgres.
//!
//! Set `TEST_DATABASE_URL` to run these; without it every test logs a skip
//! and passes. Each test works on freshly created rows (UUID keys), so the
//! suite can run repeatedly against the same database.

use std::time::Duration;

use rust_decimal::Decimal;
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use anvilcrm_catalog::{Product, ProductDraft};
use anvilcrm_core::{CustomerId, ProductId};
use anvilcrm_customers::CustomerDraft;
use anvilcrm_orders::{LineItemRequest, OrderStatus, PlaceOrderRequest};
use anvilcrm_store::catalog::ProductStore;
use anvilcrm_store::customers::CustomerStore;
use anvilcrm_store::filters::{OrderFilter, ProductFilter};
use anvilcrm_store::orders::OrderStore;
use anvilcrm_store::{schema, StoreConfig, StoreError};

async fn test_pool() -> Option<PgPool> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set; skipping postgres integration test");
            return None;
        }
    };
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .expect("connect to test database");
    schema::init_schema(&pool).await.expect("bootstrap schema");
    Some(pool)
}

struct Fixture {
    customers: CustomerStore,
    products: ProductStore,
    orders: OrderStore,
    placement: anvilcrm_store::OrderPlacement,
}

impl Fixture {
    fn new(pool: PgPool) -> Self {
        let config = StoreConfig {
            database_url: String::new(),
            ..StoreConfig::default()
        };
        Self {
            customers: CustomerStore::new(pool.clone()),
            products: ProductStore::new(pool.clone()),
            orders: OrderStore::new(pool.clone()),
            placement: anvilcrm_store::OrderPlacement::new(pool, &config),
        }
    }

    async fn customer(&self) -> CustomerId {
        let email = format!("{}@example.com", uuid::Uuid::now_v7().simple());
        self.customers
            .create(&CustomerDraft::new("Test Customer", email, None))
            .await
            .expect("create customer")
            .id
    }

    async fn product(&self, price: &str, stock: i32) -> Product {
        let name = format!("product-{}", uuid::Uuid::now_v7().simple());
        self.products
            .create(&ProductDraft::new(name, price, Some(stock)))
            .await
            .expect("create product")
    }

    async fn stock_of(&self, id: ProductId) -> i32 {
        self.products
            .find_by_id(id)
            .await
            .expect("find product")
            .expect("product exists")
            .stock
    }
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn request(customer: CustomerId, items: Vec<LineItemRequest>) -> PlaceOrderRequest {
    PlaceOrderRequest {
        customer_id: customer.to_string(),
        order_date: None,
        items,
    }
}

#[tokio::test]
#[serial]
async fn placement_happy_path_reserves_stock_and_totals() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool);

    let customer = fx.customer().await;
    let product = fx.product("10.00", 5).await;

    let outcome = fx
        .placement
        .place_order(&request(
            customer,
            vec![LineItemRequest::new(product.id.to_string(), 3)],
        ))
        .await
        .unwrap();

    assert!(outcome.ok(), "errors: {:?}", outcome.error_messages());
    let order = outcome.order.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_amount, dec("30.00"));
    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.lines[0].quantity, 3);
    assert_eq!(order.lines[0].unit_price, dec("10.00"));
    assert_eq!(fx.stock_of(product.id).await, 2);

    // The persisted row agrees with the returned aggregate.
    let stored = fx.orders.get(order.id).await.unwrap().unwrap();
    assert_eq!(stored.total_amount, dec("30.00"));
    assert_eq!(stored.lines, order.lines);
}

#[tokio::test]
#[serial]
async fn placement_rejects_insufficient_stock_without_writes() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool);

    let customer = fx.customer().await;
    let product = fx.product("10.00", 2).await;

    let outcome = fx
        .placement
        .place_order(&request(
            customer,
            vec![LineItemRequest::new(product.id.to_string(), 3)],
        ))
        .await
        .unwrap();

    assert!(!outcome.ok());
    let messages = outcome.error_messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("insufficient stock"), "{messages:?}");
    assert_eq!(fx.stock_of(product.id).await, 2);

    let orders = fx
        .orders
        .find(&OrderFilter {
            product_id: Some(product.id),
            ..OrderFilter::default()
        })
        .await
        .unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
#[serial]
async fn placement_merges_duplicate_items_into_one_line() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool);

    let customer = fx.customer().await;
    let product = fx.product("4.50", 10).await;

    let outcome = fx
        .placement
        .place_order(&request(
            customer,
            vec![
                LineItemRequest::new(product.id.to_string(), 2),
                LineItemRequest::new(product.id.to_string(), 3),
            ],
        ))
        .await
        .unwrap();

    assert!(outcome.ok(), "errors: {:?}", outcome.error_messages());
    let order = outcome.order.unwrap();
    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.lines[0].quantity, 5);
    assert_eq!(order.total_amount, dec("22.50"));
    assert_eq!(fx.stock_of(product.id).await, 5);
}

#[tokio::test]
#[serial]
async fn placement_reports_unknown_customer_verbatim() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool);

    let ghost = CustomerId::new();
    let outcome = fx
        .placement
        .place_order(&request(ghost, vec![LineItemRequest::new("ignored", 1)]))
        .await
        .unwrap();

    assert!(!outcome.ok());
    assert_eq!(
        outcome.error_messages(),
        vec![format!("Customer ID {ghost} not found.")]
    );
}

#[tokio::test]
#[serial]
async fn placement_rejects_empty_item_list() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool);

    let customer = fx.customer().await;
    let outcome = fx
        .placement
        .place_order(&request(customer, vec![]))
        .await
        .unwrap();

    assert_eq!(
        outcome.error_messages(),
        vec!["At least one item is required."]
    );
}

#[tokio::test]
#[serial]
async fn placement_lists_missing_products_sorted_and_deduplicated() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool);

    let customer = fx.customer().await;
    let mut ghosts = vec![ProductId::new(), ProductId::new()];
    let outcome = fx
        .placement
        .place_order(&request(
            customer,
            vec![
                LineItemRequest::new(ghosts[1].to_string(), 1),
                LineItemRequest::new(ghosts[0].to_string(), 1),
                LineItemRequest::new(ghosts[1].to_string(), 2),
            ],
        ))
        .await
        .unwrap();

    ghosts.sort();
    assert_eq!(
        outcome.error_messages(),
        vec![format!("Invalid product ID(s): {}, {}", ghosts[0], ghosts[1])]
    );
}

#[tokio::test]
#[serial]
async fn placement_is_atomic_across_lines() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool);

    let customer = fx.customer().await;
    let plenty = fx.product("5.00", 100).await;
    let scarce = fx.product("7.00", 1).await;

    let outcome = fx
        .placement
        .place_order(&request(
            customer,
            vec![
                LineItemRequest::new(plenty.id.to_string(), 10),
                LineItemRequest::new(scarce.id.to_string(), 2),
            ],
        ))
        .await
        .unwrap();

    assert!(!outcome.ok());
    // The well-stocked product is untouched too: no partial reservation.
    assert_eq!(fx.stock_of(plenty.id).await, 100);
    assert_eq!(fx.stock_of(scarce.id).await, 1);
}

#[tokio::test]
#[serial]
async fn concurrent_placements_for_full_stock_serialize() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool);

    let product = fx.product("10.00", 5).await;
    let customer_a = fx.customer().await;
    let customer_b = fx.customer().await;

    let req_a = request(customer_a, vec![LineItemRequest::new(product.id.to_string(), 5)]);
    let req_b = request(customer_b, vec![LineItemRequest::new(product.id.to_string(), 5)]);

    let (a, b) = tokio::join!(
        fx.placement.place_order(&req_a),
        fx.placement.place_order(&req_b)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(
        a.ok() != b.ok(),
        "exactly one placement must win: a={:?} b={:?}",
        a.error_messages(),
        b.error_messages()
    );
    let loser = if a.ok() { &b } else { &a };
    assert!(
        loser.error_messages()[0].contains("insufficient stock"),
        "{:?}",
        loser.error_messages()
    );
    assert_eq!(fx.stock_of(product.id).await, 0);
}

#[tokio::test]
#[serial]
async fn contended_lock_times_out_with_transient_error() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool.clone());

    let customer = fx.customer().await;
    let product = fx.product("10.00", 5).await;

    let impatient = anvilcrm_store::OrderPlacement::new(
        pool.clone(),
        &StoreConfig {
            lock_timeout: Duration::from_millis(200),
            ..StoreConfig::default()
        },
    );

    // Hold the row lock from a competing transaction for the duration.
    let mut blocker = pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM products WHERE id = $1 FOR UPDATE")
        .bind(product.id.as_uuid())
        .fetch_all(&mut *blocker)
        .await
        .unwrap();

    let outcome = impatient
        .place_order(&request(
            customer,
            vec![LineItemRequest::new(product.id.to_string(), 1)],
        ))
        .await
        .unwrap();

    assert!(!outcome.ok());
    assert!(outcome.is_transient());
    assert_eq!(
        outcome.error_messages(),
        vec!["Inventory is busy; the order was not placed. Retry may succeed."]
    );

    blocker.rollback().await.unwrap();
    assert_eq!(fx.stock_of(product.id).await, 5);
}

#[tokio::test]
#[serial]
async fn ledger_restock_runs_in_the_callers_transaction() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool.clone());

    let product = fx.product("2.00", 14).await;

    let mut tx = pool.begin().await.unwrap();
    let updated = anvilcrm_store::catalog::restock(&mut tx, product.id, 100)
        .await
        .unwrap();
    assert_eq!(updated.stock, 114);
    tx.commit().await.unwrap();
    assert_eq!(fx.stock_of(product.id).await, 114);

    // No self-managed transaction boundaries: a caller rollback undoes it.
    let mut tx = pool.begin().await.unwrap();
    anvilcrm_store::catalog::restock(&mut tx, product.id, 1)
        .await
        .unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(fx.stock_of(product.id).await, 114);

    let mut tx = pool.begin().await.unwrap();
    let err = anvilcrm_store::catalog::restock(&mut tx, ProductId::new(), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound));
}

#[tokio::test]
#[serial]
async fn recalculation_is_idempotent_and_tracks_line_changes() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool.clone());

    let customer = fx.customer().await;
    let first = fx.product("10.00", 20).await;
    let second = fx.product("2.25", 20).await;

    let outcome = fx
        .placement
        .place_order(&request(
            customer,
            vec![LineItemRequest::new(first.id.to_string(), 2)],
        ))
        .await
        .unwrap();
    let order = outcome.order.unwrap();
    assert_eq!(order.total_amount, dec("20.00"));

    // A second recomputation with unchanged lines stores the same value.
    let mut tx = pool.begin().await.unwrap();
    let again = anvilcrm_store::orders::apply_total(&mut tx, order.id).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(again, dec("20.00"));

    // Every maintenance path re-derives the total.
    let after_add = fx.orders.add_line(order.id, second.id, 4).await.unwrap();
    assert_eq!(after_add.total_amount, dec("29.00"));

    let after_set = fx
        .orders
        .set_line_quantity(order.id, second.id, 1)
        .await
        .unwrap();
    assert_eq!(after_set.total_amount, dec("22.25"));

    let after_remove = fx.orders.remove_line(order.id, second.id).await.unwrap();
    assert_eq!(after_remove.total_amount, dec("20.00"));
    assert_eq!(after_remove.lines.len(), 1);
}

#[tokio::test]
#[serial]
async fn add_line_merges_and_keeps_the_price_snapshot() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool.clone());

    let customer = fx.customer().await;
    let product = fx.product("10.00", 50).await;

    let order = fx
        .placement
        .place_order(&request(
            customer,
            vec![LineItemRequest::new(product.id.to_string(), 1)],
        ))
        .await
        .unwrap()
        .order
        .unwrap();

    // Drift the catalog price; the existing snapshot must not move.
    sqlx::query("UPDATE products SET price = $2 WHERE id = $1")
        .bind(product.id.as_uuid())
        .bind(dec("99.00"))
        .execute(&pool)
        .await
        .unwrap();

    let merged = fx.orders.add_line(order.id, product.id, 2).await.unwrap();
    assert_eq!(merged.lines.len(), 1);
    assert_eq!(merged.lines[0].quantity, 3);
    assert_eq!(merged.lines[0].unit_price, dec("10.00"));
    assert_eq!(merged.total_amount, dec("30.00"));
}

#[tokio::test]
#[serial]
async fn product_price_drift_never_touches_past_orders() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool.clone());

    let customer = fx.customer().await;
    let product = fx.product("10.00", 10).await;

    let order = fx
        .placement
        .place_order(&request(
            customer,
            vec![LineItemRequest::new(product.id.to_string(), 2)],
        ))
        .await
        .unwrap()
        .order
        .unwrap();

    sqlx::query("UPDATE products SET price = $2 WHERE id = $1")
        .bind(product.id.as_uuid())
        .bind(dec("500.00"))
        .execute(&pool)
        .await
        .unwrap();

    let stored = fx.orders.get(order.id).await.unwrap().unwrap();
    assert_eq!(stored.lines[0].unit_price, dec("10.00"));
    assert_eq!(stored.total_amount, dec("20.00"));
}

#[tokio::test]
#[serial]
async fn referenced_products_cannot_be_deleted() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool);

    let customer = fx.customer().await;
    let product = fx.product("10.00", 10).await;

    fx.placement
        .place_order(&request(
            customer,
            vec![LineItemRequest::new(product.id.to_string(), 1)],
        ))
        .await
        .unwrap();

    let err = fx.products.delete(product.id).await.unwrap_err();
    assert!(matches!(err, StoreError::ForeignKeyViolation(_)), "{err}");

    // An unreferenced product deletes fine.
    let lonely = fx.product("1.00", 1).await;
    fx.products.delete(lonely.id).await.unwrap();
}

#[tokio::test]
#[serial]
async fn email_uniqueness_is_case_insensitive() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool);

    let email = format!("{}@Example.com", uuid::Uuid::now_v7().simple());
    fx.customers
        .create(&CustomerDraft::new("First", &email, None))
        .await
        .unwrap();

    let err = fx
        .customers
        .create(&CustomerDraft::new("Second", email.to_uppercase(), None))
        .await
        .unwrap_err();
    let messages = format!("{err}");
    assert!(messages.contains("Email already exists."), "{messages}");
}

#[tokio::test]
#[serial]
async fn bulk_create_supports_partial_success() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool);

    let taken = format!("{}@example.com", uuid::Uuid::now_v7().simple());
    fx.customers
        .create(&CustomerDraft::new("Taken", &taken, None))
        .await
        .unwrap();

    let fresh = format!("{}@example.com", uuid::Uuid::now_v7().simple());
    let outcome = fx
        .customers
        .bulk_create(&[
            CustomerDraft::new("Ada", &fresh, Some("+1234567890")),
            CustomerDraft::new("", &taken, None),
            CustomerDraft::new("Dup", &fresh, None),
        ])
        .await
        .unwrap();

    assert_eq!(outcome.created.len(), 1);
    assert_eq!(outcome.created[0].name, "Ada");
    assert!(outcome.errors.iter().any(|e| e == "Row 2: name is required."));
    assert!(outcome
        .errors
        .iter()
        .any(|e| e == &format!("Row 2: email already exists ({taken}).")));
    assert!(outcome
        .errors
        .iter()
        .any(|e| e == &format!("Row 3: duplicate email within payload ({fresh}).")));
}

#[tokio::test]
#[serial]
async fn low_stock_restock_tops_up_only_low_products() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool);

    let low = fx.product("1.00", 3).await;
    let high = fx.product("1.00", 50).await;

    let updated = fx.products.restock_low_stock().await.unwrap();
    let ours: Vec<_> = updated.iter().filter(|p| p.id == low.id).collect();
    assert_eq!(ours.len(), 1);
    assert_eq!(ours[0].stock, 13);
    assert!(updated.iter().all(|p| p.id != high.id));
    assert_eq!(fx.stock_of(high.id).await, 50);
}

#[tokio::test]
#[serial]
async fn filters_narrow_by_predicates() {
    let Some(pool) = test_pool().await else { return };
    let fx = Fixture::new(pool);

    let customer = fx.customer().await;
    let cheap = fx.product("3.00", 30).await;
    let pricey = fx.product("300.00", 30).await;

    fx.placement
        .place_order(&request(
            customer,
            vec![LineItemRequest::new(pricey.id.to_string(), 2)],
        ))
        .await
        .unwrap();

    let expensive_products = fx
        .products
        .find(&ProductFilter {
            price_min: Some(dec("100.00")),
            name_contains: Some(pricey.name.clone()),
            ..ProductFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(expensive_products.len(), 1);
    assert_eq!(expensive_products[0].id, pricey.id);

    let by_product = fx
        .orders
        .find(&OrderFilter {
            product_id: Some(pricey.id),
            total_min: Some(dec("500.00")),
            ..OrderFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(by_product.len(), 1);
    assert_eq!(by_product[0].total_amount, dec("600.00"));
    assert_eq!(by_product[0].lines.len(), 1);

    let none = fx
        .orders
        .find(&OrderFilter {
            product_id: Some(cheap.id),
            ..OrderFilter::default()
        })
        .await
        .unwrap();
    assert!(none.is_empty());
}
