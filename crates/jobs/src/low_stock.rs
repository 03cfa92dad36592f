//! Low-stock restock job.
//!
//! Runs the catalog's restock pass (every product with stock below the
//! threshold gains the restock increment, all in one locked transaction)
//! and logs each updated product as `<ts> <name> -> <stock>`.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use anvilcrm_store::catalog::ProductStore;

use crate::log;
use crate::runner::Job;
use crate::types::{JobKind, JobOutcome};

/// Delay before retrying when the restock pass lost a lock race.
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_secs(30);

pub struct LowStockRestockJob {
    products: ProductStore,
    log_path: PathBuf,
}

impl LowStockRestockJob {
    pub fn new(products: ProductStore, log_path: PathBuf) -> Self {
        Self { products, log_path }
    }
}

#[async_trait]
impl Job for LowStockRestockJob {
    fn kind(&self) -> JobKind {
        JobKind::LowStockRestock
    }

    async fn run(&self) -> JobOutcome {
        let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        match self.products.restock_low_stock().await {
            Ok(updated) if updated.is_empty() => {
                match log::append_line(
                    &self.log_path,
                    &format!("{stamp} No low-stock products to update"),
                ) {
                    Ok(()) => JobOutcome::Success,
                    Err(e) => JobOutcome::Failure(format!("low-stock log write failed: {e}")),
                }
            }
            Ok(updated) => {
                for product in &updated {
                    if let Err(e) = log::append_line(
                        &self.log_path,
                        &format!("{stamp} {} -> {}", product.name, product.stock),
                    ) {
                        return JobOutcome::Failure(format!("low-stock log write failed: {e}"));
                    }
                }
                tracing::info!(updated = updated.len(), "low-stock products restocked");
                JobOutcome::Success
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, "restock pass hit transient store error");
                JobOutcome::RetryAfter(TRANSIENT_RETRY_DELAY)
            }
            Err(e) => {
                let _ = log::append_line(&self.log_path, &format!("{stamp} ERROR: {e}"));
                JobOutcome::Failure(format!("restock pass failed: {e}"))
            }
        }
    }
}
