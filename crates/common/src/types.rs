use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Surrogate key of an order row.
///
/// Wraps the database-assigned integer so order and policy keys
/// cannot be mixed up at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(i64);

impl OrderId {
    /// Creates an order ID from a raw key.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw key.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OrderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Surrogate key of a policy row.
///
/// Policy keys are assigned in insertion order and feed the sequence
/// segment of the policy code, so they must never be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(i64);

impl PolicyId {
    /// Creates a policy ID from a raw key.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw key.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for PolicyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PolicyId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Unique identifier for an outbox task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a task ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_id_preserves_raw_key() {
        let id = PolicyId::new(42);
        assert_eq!(id.as_i64(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn order_ids_order_by_key() {
        assert!(OrderId::new(1) < OrderId::new(2));
    }

    #[test]
    fn task_id_new_creates_unique_ids() {
        assert_ne!(TaskId::new(), TaskId::new());
    }

    #[test]
    fn ids_serialize_transparently() {
        assert_eq!(serde_json::to_string(&PolicyId::new(7)).unwrap(), "7");
        let id: OrderId = serde_json::from_str("19").unwrap();
        assert_eq!(id, OrderId::new(19));
    }
}
