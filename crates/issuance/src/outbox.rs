//! Outbox worker driving post-commit side effects.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use policy_store::{OutboxTask, PolicyStore, TaskKind};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::agent::CourierBookingAgent;
use crate::config::OutboxConfig;
use crate::error::Result;
use crate::services::{CourierService, NotificationService};

/// Wakes the outbox worker when a task is enqueued.
///
/// A wake-up sent while the worker is busy is kept and consumed by its next
/// wait, so none are lost.
#[derive(Debug, Clone, Default)]
pub struct OutboxSignal {
    notify: Arc<Notify>,
}

impl OutboxSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.notify.notify_one();
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Tally of one pass over due tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
}

impl RunReport {
    pub fn processed(&self) -> usize {
        self.completed + self.retried + self.failed
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::hours(1))
}

/// Claims due outbox tasks and runs them, retrying with exponential backoff.
pub struct OutboxWorker<S, C, N> {
    store: S,
    agent: CourierBookingAgent<S, C, N>,
    signal: OutboxSignal,
    config: OutboxConfig,
}

impl<S, C, N> OutboxWorker<S, C, N>
where
    S: PolicyStore + Clone + 'static,
    C: CourierService + 'static,
    N: NotificationService + 'static,
{
    pub fn new(
        store: S,
        agent: CourierBookingAgent<S, C, N>,
        signal: OutboxSignal,
        config: OutboxConfig,
    ) -> Self {
        Self {
            store,
            agent,
            signal,
            config,
        }
    }

    /// Runs every task due at `now` once, up to `batch_size` tasks.
    ///
    /// Tasks are claimed one at a time so each lease only has to cover a
    /// single booking.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<RunReport> {
        let started = Instant::now();
        let mut report = RunReport::default();

        for _ in 0..self.config.batch_size {
            let claimed_at = now + to_chrono(started.elapsed());
            let Some(task) = self
                .store
                .claim_due_tasks(claimed_at, to_chrono(self.config.lease), 1)
                .await?
                .pop()
            else {
                break;
            };

            match self.run_task(&task).await {
                Ok(()) => {
                    self.store.complete_task(task.id).await?;
                    report.completed += 1;
                }
                Err(e) if !e.is_retryable() || task.attempts >= self.config.max_attempts => {
                    tracing::error!(
                        task_id = %task.id,
                        order_id = %task.order_id,
                        attempts = task.attempts,
                        error_kind = e.kind(),
                        error = %e,
                        "outbox task failed permanently"
                    );
                    metrics::counter!("outbox_tasks_failed_total", "kind" => task.kind.as_str())
                        .increment(1);
                    self.store.fail_task(task.id, &e.to_string(), None).await?;
                    report.failed += 1;
                }
                Err(e) => {
                    let delay = self.config.retry_delay(task.attempts);
                    tracing::warn!(
                        task_id = %task.id,
                        order_id = %task.order_id,
                        attempts = task.attempts,
                        retry_in = ?delay,
                        error = %e,
                        "outbox task failed, will retry"
                    );
                    self.store
                        .fail_task(task.id, &e.to_string(), Some(claimed_at + to_chrono(delay)))
                        .await?;
                    report.retried += 1;
                }
            }
        }

        if report.processed() > 0 {
            tracing::info!(
                completed = report.completed,
                retried = report.retried,
                failed = report.failed,
                "outbox pass finished"
            );
        }
        Ok(report)
    }

    async fn run_task(&self, task: &OutboxTask) -> Result<()> {
        match task.kind {
            TaskKind::CourierBooking => self.agent.book(task.order_id).await.map(|_| ()),
        }
    }

    /// Runs the worker until the returned handle is aborted.
    ///
    /// Each pass starts on a wake-up from the signal or after the poll
    /// interval, whichever comes first.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(poll_interval = ?self.config.poll_interval, "outbox worker started");
            loop {
                if let Err(e) = self.run_once(Utc::now()).await {
                    tracing::error!(error = %e, "outbox pass failed");
                }
                tokio::select! {
                    _ = self.signal.notified() => {}
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        })
    }
}
