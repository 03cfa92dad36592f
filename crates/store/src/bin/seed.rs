//! Seed the database with demo data.
//!
//! Usage: `DATABASE_URL=postgres://... cargo run -p anvilcrm-store --bin seed`

use anyhow::Result;

use anvilcrm_store::{schema, seed, StoreConfig};

#[tokio::main]
async fn main() -> Result<()> {
    anvilcrm_observability::init();

    let config = StoreConfig::from_env();
    let pool = config.connect().await?;
    schema::init_schema(&pool).await?;

    let summary = seed::seed_demo_data(&pool, &config).await?;
    println!("Seed complete.");
    println!(
        "Customers: {}, Products: {}, Orders: {}",
        summary.customers, summary.products, summary.orders
    );
    Ok(())
}
