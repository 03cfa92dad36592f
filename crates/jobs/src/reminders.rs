//! Order reminder job: pending orders from the reminder window get one
//! `<ts> Reminder -> Order <id> / <email>` line each.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;

use anvilcrm_store::stats;

use crate::log;
use crate::runner::Job;
use crate::types::{JobKind, JobOutcome};

/// How far back an order still counts as "recent".
const REMINDER_WINDOW_DAYS: i64 = 7;

pub struct OrderRemindersJob {
    pool: PgPool,
    log_path: PathBuf,
}

impl OrderRemindersJob {
    pub fn new(pool: PgPool, log_path: PathBuf) -> Self {
        Self { pool, log_path }
    }
}

#[async_trait]
impl Job for OrderRemindersJob {
    fn kind(&self) -> JobKind {
        JobKind::OrderReminders
    }

    async fn run(&self) -> JobOutcome {
        let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        let since = Utc::now() - ChronoDuration::days(REMINDER_WINDOW_DAYS);

        let pending = match stats::recent_pending_orders(&self.pool, since).await {
            Ok(pending) => pending,
            Err(e) => return JobOutcome::Failure(format!("reminder query failed: {e}")),
        };

        for reminder in &pending {
            let line = format!(
                "{stamp} Reminder -> Order {} / {}",
                reminder.order_id, reminder.email
            );
            if let Err(e) = log::append_line(&self.log_path, &line) {
                return JobOutcome::Failure(format!("reminder log write failed: {e}"));
            }
        }

        tracing::info!(count = pending.len(), "order reminders processed");
        JobOutcome::Success
    }
}
