//! Interval scheduler for maintenance jobs.
//!
//! Each registered job gets its own tokio task ticking on its interval;
//! a run that fails is retried per the schedule's policy before the next
//! tick is waited on.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;

use crate::types::{JobKind, JobOutcome, RetryPolicy};

/// A scheduled maintenance job.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn kind(&self) -> JobKind;

    async fn run(&self) -> JobOutcome;
}

/// When and how persistently a job runs.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub every: std::time::Duration,
    pub retry: RetryPolicy,
}

/// Drives registered jobs on their intervals.
#[derive(Default)]
pub struct JobRunner {
    entries: Vec<(Schedule, Arc<dyn Job>)>,
}

impl JobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job: impl Job, schedule: Schedule) {
        self.entries.push((schedule, Arc::new(job)));
    }

    /// Run all registered jobs until the process stops.
    pub async fn run(self) {
        let mut handles = Vec::with_capacity(self.entries.len());
        for (schedule, job) in self.entries {
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(schedule.every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    run_with_retries(job.as_ref(), &schedule.retry).await;
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// One scheduled firing: run the job, retrying per `policy` on failure.
async fn run_with_retries(job: &dyn Job, policy: &RetryPolicy) {
    let kind = job.kind().name();
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let started = Instant::now();
        match job.run().await {
            JobOutcome::Success => {
                tracing::info!(
                    job = kind,
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "job completed"
                );
                return;
            }
            JobOutcome::RetryAfter(delay) if policy.should_retry(attempt) => {
                tracing::warn!(job = kind, attempt, ?delay, "transient failure; retrying");
                tokio::time::sleep(delay).await;
            }
            JobOutcome::Failure(error) if policy.should_retry(attempt) => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(job = kind, attempt, error = %error, ?delay, "job failed; retrying");
                tokio::time::sleep(delay).await;
            }
            JobOutcome::RetryAfter(_) => {
                tracing::error!(job = kind, attempt, "transient failure; giving up");
                return;
            }
            JobOutcome::Failure(error) => {
                tracing::error!(job = kind, attempt, error = %error, "job failed; giving up");
                return;
            }
        }
    }
}
