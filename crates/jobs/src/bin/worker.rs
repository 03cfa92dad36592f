//! Maintenance worker: schedules the CRM's recurring jobs.
//!
//! Usage: `DATABASE_URL=postgres://... cargo run -p anvilcrm-jobs --bin worker`
//!
//! Log files land under `CRM_JOB_LOG_DIR` (default `/tmp`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use anvilcrm_jobs::{
    HeartbeatJob, JobRunner, LowStockRestockJob, OrderRemindersJob, ReportJob, RetryPolicy,
    Schedule,
};
use anvilcrm_store::catalog::ProductStore;
use anvilcrm_store::{schema, StoreConfig};

#[tokio::main]
async fn main() -> Result<()> {
    anvilcrm_observability::init();

    let config = StoreConfig::from_env();
    let pool = config.connect().await?;
    schema::init_schema(&pool).await?;

    let log_dir = PathBuf::from(
        std::env::var("CRM_JOB_LOG_DIR").unwrap_or_else(|_| "/tmp".to_string()),
    );

    let mut runner = JobRunner::new();
    runner.register(
        HeartbeatJob::new(pool.clone(), log_dir.join("crm_heartbeat_log.txt")),
        Schedule {
            every: Duration::from_secs(5 * 60),
            retry: RetryPolicy::no_retry(),
        },
    );
    runner.register(
        ReportJob::new(pool.clone(), log_dir.join("crm_report_log.txt")),
        Schedule {
            every: Duration::from_secs(60 * 60),
            retry: RetryPolicy::fixed(2, Duration::from_secs(30)),
        },
    );
    runner.register(
        LowStockRestockJob::new(
            ProductStore::new(pool.clone()),
            log_dir.join("low_stock_updates_log.txt"),
        ),
        Schedule {
            every: Duration::from_secs(12 * 60 * 60),
            retry: RetryPolicy::exponential(3, Duration::from_secs(5), Duration::from_secs(60)),
        },
    );
    runner.register(
        OrderRemindersJob::new(pool, log_dir.join("order_reminders_log.txt")),
        Schedule {
            every: Duration::from_secs(24 * 60 * 60),
            retry: RetryPolicy::no_retry(),
        },
    );

    tracing::info!("maintenance worker started");
    runner.run().await;
    Ok(())
}
