//! Outbox rows: persisted intents for side effects that run after commit.

use chrono::{DateTime, Utc};
use common::{OrderId, TaskId};
use serde::{Deserialize, Serialize};

/// The side effect an outbox task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Book a courier for a cash-on-delivery order.
    CourierBooking,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::CourierBooking => "courier_booking",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "courier_booking" => Some(TaskKind::CourierBooking),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of an outbox task.
///
/// ```text
/// Pending ──┬──► Done
///           └──► Failed (attempts exhausted) ──► Pending (explicit requeue)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TaskStatus::Pending),
            "done" => Some(TaskStatus::Done),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted outbox task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxTask {
    pub id: TaskId,
    pub kind: TaskKind,
    pub order_id: OrderId,
    pub status: TaskStatus,
    /// Number of times the task has been claimed.
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Earliest time the task may be claimed again.
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl OutboxTask {
    /// Creates a pending task that is due immediately.
    pub fn new(kind: TaskKind, order_id: OrderId, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::new(),
            kind,
            order_id,
            status: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: now,
            created_at: now,
        }
    }

    /// Returns true if the task may be claimed at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.next_attempt_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_task_is_due_immediately() {
        let now = Utc::now();
        let task = OutboxTask::new(TaskKind::CourierBooking, OrderId::new(1), now);
        assert!(task.is_due(now));
        assert_eq!(task.attempts, 0);
    }

    #[test]
    fn future_or_finished_tasks_are_not_due() {
        let now = Utc::now();
        let mut task = OutboxTask::new(TaskKind::CourierBooking, OrderId::new(1), now);
        task.next_attempt_at = now + Duration::seconds(30);
        assert!(!task.is_due(now));

        task.next_attempt_at = now;
        task.status = TaskStatus::Done;
        assert!(!task.is_due(now));
    }

    #[test]
    fn kind_and_status_round_trip_stored_names() {
        assert_eq!(
            TaskKind::parse(TaskKind::CourierBooking.as_str()),
            Some(TaskKind::CourierBooking)
        );
        assert_eq!(TaskStatus::parse("failed"), Some(TaskStatus::Failed));
        assert_eq!(TaskStatus::parse("running"), None);
    }
}
