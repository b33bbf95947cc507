use common::TaskId;
use thiserror::Error;

/// Errors that can occur when interacting with the policy store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An order with this code already exists.
    #[error("Order code already exists: {0}")]
    DuplicateOrderCode(String),

    /// A row the operation depends on does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A stored value could not be mapped onto the domain model.
    #[error("Invalid stored value for {column}: {value}")]
    InvalidValue { column: &'static str, value: String },

    /// A status update would move a record backwards.
    #[error("Invalid {entity} status transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// An outbox task does not exist.
    #[error("Outbox task not found: {0}")]
    TaskNotFound(TaskId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

/// Result type for policy store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
