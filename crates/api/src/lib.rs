//! HTTP API server for the policy issuance engine.
//!
//! Exposes order creation, card verification, order lookup and courier
//! re-push over REST, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use issuance::{IssuanceConfig, IssuanceService, OutboxSignal};
use metrics_exporter_prometheus::PrometheusHandle;
use policy_store::PolicyStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: PolicyStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S>))
        .route(
            "/orders/cc-transaction",
            post(routes::orders::cc_transaction::<S>),
        )
        .route("/orders/{order_code}", get(routes::orders::get::<S>))
        .route(
            "/orders/{order_code}/courier/repush",
            post(routes::orders::repush::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around a store.
///
/// `signal` must be the one handed to the outbox worker so that queued
/// courier bookings wake it.
pub fn create_default_state<S: PolicyStore + Clone + 'static>(
    store: S,
    config: IssuanceConfig,
    signal: OutboxSignal,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        issuance: IssuanceService::new(store, config, signal),
    })
}

/// Registers descriptions for the metrics the engine emits.
pub fn describe_metrics() {
    metrics::describe_counter!("policies_issued_total", "Policies issued, by payment mode");
    metrics::describe_counter!(
        "issuance_failures_total",
        "Failed issuance requests, by error kind"
    );
    metrics::describe_histogram!(
        "issuance_duration_seconds",
        metrics::Unit::Seconds,
        "Time to issue a policy"
    );
    metrics::describe_counter!("courier_bookings_total", "Successful courier bookings");
    metrics::describe_counter!(
        "courier_booking_failures_total",
        "Courier booking attempts that failed"
    );
    metrics::describe_counter!(
        "outbox_tasks_failed_total",
        "Outbox tasks that exhausted their attempts"
    );
    metrics::describe_counter!(
        "card_verifications_total",
        "Card gateway callbacks, by outcome"
    );
    metrics::describe_counter!(
        "policy_code_unmapped_plan_total",
        "Health policy codes generated without a plan code mapping"
    );
}
