//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use issuance::IssuanceError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Issuance, activation or fulfillment error.
    Issuance(IssuanceError),
}

impl ApiError {
    fn status_and_message(self) -> (StatusCode, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Issuance(err) => {
                let status = match &err {
                    IssuanceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    IssuanceError::Conflict(_) => StatusCode::CONFLICT,
                    IssuanceError::NotFound { .. } => StatusCode::NOT_FOUND,
                    IssuanceError::TransactionTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    IssuanceError::ExternalService { .. }
                    | IssuanceError::BookingUnrecorded { .. }
                    | IssuanceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(error = %message, status = status.as_u16(), "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<IssuanceError> for ApiError {
    fn from(err: IssuanceError) -> Self {
        ApiError::Issuance(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn status_of(err: IssuanceError) -> StatusCode {
        ApiError::from(err).status_and_message().0
    }

    #[test]
    fn test_issuance_errors_map_to_statuses() {
        assert_eq!(
            status_of(IssuanceError::Conflict("taken".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(IssuanceError::NotFound {
                entity: "order",
                key: "ORD-1".to_string()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(IssuanceError::TransactionTimeout(Duration::from_secs(30))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(IssuanceError::ExternalService {
                service: "courier",
                reason: "down".to_string()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
