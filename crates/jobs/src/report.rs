//! CRM report job: periodic aggregate counts and revenue.
//!
//! Line format: `YYYY-MM-DD HH:MM:SS - Report: X customers, Y orders,
//! Z revenue`.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use anvilcrm_store::stats;

use crate::log;
use crate::runner::Job;
use crate::types::{JobKind, JobOutcome};

pub struct ReportJob {
    pool: PgPool,
    log_path: PathBuf,
}

impl ReportJob {
    pub fn new(pool: PgPool, log_path: PathBuf) -> Self {
        Self { pool, log_path }
    }
}

#[async_trait]
impl Job for ReportJob {
    fn kind(&self) -> JobKind {
        JobKind::Report
    }

    async fn run(&self) -> JobOutcome {
        let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        match stats::report_totals(&self.pool).await {
            Ok(totals) => {
                let line = format!(
                    "{stamp} - Report: {} customers, {} orders, {} revenue",
                    totals.customers, totals.orders, totals.revenue
                );
                match log::append_line(&self.log_path, &line) {
                    Ok(()) => JobOutcome::Success,
                    Err(e) => JobOutcome::Failure(format!("report log write failed: {e}")),
                }
            }
            Err(e) => {
                let _ = log::append_line(&self.log_path, &format!("{stamp} - ERROR: {e}"));
                JobOutcome::Failure(format!("report totals query failed: {e}"))
            }
        }
    }
}
