//! Order issuance, card verification and courier re-push endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{CardTransactionRequest, CardVerificationResult, IssuanceResult, OrderRequest};
use issuance::{IssuanceService, OrderSummary};
use policy_store::PolicyStore;
use serde::Serialize;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub issuance: IssuanceService<S>,
}

#[derive(Serialize)]
pub struct RepushResponse {
    pub task_id: String,
    pub status: String,
    pub attempts: u32,
}

fn require_order_code(code: &str) -> Result<&str, ApiError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ApiError::BadRequest("order_code must not be empty".to_string()));
    }
    Ok(code)
}

/// POST /orders — create an order and its policy.
#[tracing::instrument(skip(state, req), fields(order_code = %req.order_code))]
pub async fn create<S: PolicyStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<OrderRequest>,
) -> Result<(StatusCode, Json<IssuanceResult>), ApiError> {
    require_order_code(&req.order_code)?;
    let result = state.issuance.issue(req).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// POST /orders/cc-transaction — card gateway callback.
#[tracing::instrument(skip(state, req), fields(order_code = %req.order_code))]
pub async fn cc_transaction<S: PolicyStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CardTransactionRequest>,
) -> Result<Json<CardVerificationResult>, ApiError> {
    require_order_code(&req.order_code)?;
    let result = state.issuance.verify_card_transaction(&req).await?;
    Ok(Json(result))
}

/// GET /orders/{order_code} — stored order, policy, details and outbox tasks.
#[tracing::instrument(skip(state))]
pub async fn get<S: PolicyStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(order_code): Path<String>,
) -> Result<Json<OrderSummary>, ApiError> {
    let order_code = require_order_code(&order_code)?;
    let summary = state.issuance.order_summary(order_code).await?;
    Ok(Json(summary))
}

/// POST /orders/{order_code}/courier/repush — queue a fresh courier booking.
#[tracing::instrument(skip(state))]
pub async fn repush<S: PolicyStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(order_code): Path<String>,
) -> Result<(StatusCode, Json<RepushResponse>), ApiError> {
    let order_code = require_order_code(&order_code)?;
    let task = state.issuance.repush_courier(order_code).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RepushResponse {
            task_id: task.id.to_string(),
            status: task.status.to_string(),
            attempts: task.attempts,
        }),
    ))
}
