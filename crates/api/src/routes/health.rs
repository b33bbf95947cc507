//! Liveness endpoint.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// GET /health — reports that the issuance API is up.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "policy-issuance",
        version: env!("CARGO_PKG_VERSION"),
    })
}
