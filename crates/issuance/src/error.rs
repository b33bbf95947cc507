//! Issuance error types.

use std::time::Duration;

use domain::ValidationError;
use policy_store::StoreError;
use thiserror::Error;

/// Errors that can occur while issuing, activating or fulfilling a policy.
#[derive(Debug, Error)]
pub enum IssuanceError {
    /// The request fails a product-type or payment-mode rule.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The order code is taken or the order is in the wrong state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A referenced row does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// The creating transaction exceeded its budget and was rolled back.
    #[error("Transaction timed out after {0:?}")]
    TransactionTimeout(Duration),

    /// Courier or notification failure.
    #[error("{service} service error: {reason}")]
    ExternalService {
        service: &'static str,
        reason: String,
    },

    /// The courier accepted a booking but the order could not be moved to
    /// `pendingCOD`. Retrying would book a second consignment.
    #[error("Order {order_code} booked as {tracking_number} but not recorded: {reason}")]
    BookingUnrecorded {
        order_code: String,
        tracking_number: String,
        reason: String,
    },

    /// Store error.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl IssuanceError {
    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        IssuanceError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub(crate) fn external(service: &'static str, reason: impl ToString) -> Self {
        IssuanceError::ExternalService {
            service,
            reason: reason.to_string(),
        }
    }

    /// Short label used in metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            IssuanceError::Validation(_) => "validation",
            IssuanceError::Conflict(_) => "conflict",
            IssuanceError::NotFound { .. } => "not_found",
            IssuanceError::TransactionTimeout(_) => "timeout",
            IssuanceError::ExternalService { .. } => "external_service",
            IssuanceError::BookingUnrecorded { .. } => "booking_unrecorded",
            IssuanceError::Store(_) => "store",
        }
    }

    /// Whether running the same outbox task again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IssuanceError::ExternalService { .. }
                | IssuanceError::TransactionTimeout(_)
                | IssuanceError::Store(_)
        )
    }
}

impl From<StoreError> for IssuanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateOrderCode(code) => {
                IssuanceError::Conflict(format!("order code already exists: {code}"))
            }
            StoreError::NotFound { entity, key } => IssuanceError::NotFound { entity, key },
            err @ StoreError::InvalidTransition { .. } => IssuanceError::Conflict(err.to_string()),
            other => IssuanceError::Store(other),
        }
    }
}

/// Convenience type alias for issuance results.
pub type Result<T> = std::result::Result<T, IssuanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_order_code_maps_to_conflict() {
        let err: IssuanceError = StoreError::DuplicateOrderCode("ORD-1".to_string()).into();
        assert!(matches!(err, IssuanceError::Conflict(ref msg) if msg.contains("ORD-1")));
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn test_store_not_found_keeps_entity() {
        let err: IssuanceError = StoreError::NotFound {
            entity: "order",
            key: "ORD-9".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "order not found: ORD-9");
    }

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(IssuanceError::external("courier", "timeout").is_retryable());
        assert!(!IssuanceError::Conflict("already verified".to_string()).is_retryable());

        let unrecorded = IssuanceError::BookingUnrecorded {
            order_code: "ORD-1".to_string(),
            tracking_number: "TRK-0001".to_string(),
            reason: "database unavailable".to_string(),
        };
        assert!(!unrecorded.is_retryable());
        assert_eq!(unrecorded.kind(), "booking_unrecorded");
    }
}
