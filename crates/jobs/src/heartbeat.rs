//! Heartbeat job: proves the process and the store are alive.
//!
//! Always writes the heartbeat line; the store ping result is logged as a
//! second line but never fails the run — a down store is the store's
//! problem, a silent heartbeat would be ours.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use anvilcrm_store::stats;

use crate::log;
use crate::runner::Job;
use crate::types::{JobKind, JobOutcome};

pub struct HeartbeatJob {
    pool: PgPool,
    log_path: PathBuf,
}

impl HeartbeatJob {
    pub fn new(pool: PgPool, log_path: PathBuf) -> Self {
        Self { pool, log_path }
    }
}

#[async_trait]
impl Job for HeartbeatJob {
    fn kind(&self) -> JobKind {
        JobKind::Heartbeat
    }

    async fn run(&self) -> JobOutcome {
        let stamp = Utc::now().format("%d/%m/%Y-%H:%M:%S");
        if let Err(e) = log::append_line(&self.log_path, &format!("{stamp} CRM is alive")) {
            return JobOutcome::Failure(format!("heartbeat log write failed: {e}"));
        }

        match stats::ping(&self.pool).await {
            Ok(()) => {
                let _ = log::append_line(&self.log_path, "store ping OK");
            }
            Err(e) => {
                tracing::warn!(error = %e, "heartbeat store ping failed");
                let _ = log::append_line(&self.log_path, "store ping FAILED");
            }
        }
        JobOutcome::Success
    }
}
