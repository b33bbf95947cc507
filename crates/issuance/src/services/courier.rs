//! Courier booking service trait, HTTP client and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::config::{CourierAccount, CourierConfig};
use crate::error::{IssuanceError, Result};
use crate::services::http::{build_http_agent, error_from_ureq};

const SERVICE: &str = "courier";

/// One product line on a consignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingProduct {
    /// The policy code.
    pub product_code: String,
    pub sku: String,
    pub quantity: u32,
    /// Unit price as a decimal string.
    pub price: String,
}

/// The fixed booking payload sent to the courier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPayload {
    pub shipper_name: String,
    pub shipper_phone: String,
    pub shipper_address: String,
    pub shipper_city: String,
    pub consignee_name: String,
    pub consignee_phone: String,
    pub consignee_address: String,
    pub consignee_city: String,
    pub order_ref: String,
    pub pieces: u32,
    pub declared_value: String,
    pub cod_amount: String,
    pub products: Vec<BookingProduct>,
}

/// Raw courier response. `status` arrives as either `"1"` or `1`.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingResponse {
    pub status: serde_json::Value,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl BookingResponse {
    pub fn is_success(&self) -> bool {
        match &self.status {
            serde_json::Value::String(s) => s.trim() == "1",
            serde_json::Value::Number(n) => n.as_i64() == Some(1),
            _ => false,
        }
    }

    /// Converts the response into a booking result, failing unless the
    /// courier accepted the consignment and returned a tracking number.
    pub fn into_result(self) -> Result<BookingResult> {
        if !self.is_success() {
            let reason = self
                .message
                .unwrap_or_else(|| format!("booking rejected with status {}", self.status));
            return Err(IssuanceError::external(SERVICE, reason));
        }
        match self.tracking_number.filter(|t| !t.trim().is_empty()) {
            Some(tracking_number) => Ok(BookingResult { tracking_number }),
            None => Err(IssuanceError::external(
                SERVICE,
                "booking accepted without a tracking number",
            )),
        }
    }
}

/// A successful booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingResult {
    pub tracking_number: String,
}

/// Trait for courier booking.
#[async_trait]
pub trait CourierService: Send + Sync {
    /// Books a consignment on the given account.
    async fn book(&self, account: &CourierAccount, payload: &BookingPayload)
    -> Result<BookingResult>;
}

/// Courier client speaking JSON over HTTP with basic auth.
///
/// The blocking `ureq` call runs on the blocking pool.
#[derive(Clone)]
pub struct HttpCourierService {
    agent: ureq::Agent,
    booking_url: String,
}

impl HttpCourierService {
    pub fn new(config: &CourierConfig) -> Self {
        Self {
            agent: build_http_agent(config.timeout),
            booking_url: format!("{}/api/bookings", config.base_url.trim_end_matches('/')),
        }
    }
}

fn basic_auth(account: &CourierAccount) -> String {
    let credentials = format!("{}:{}", account.username, account.password);
    format!("Basic {}", STANDARD.encode(credentials))
}

#[async_trait]
impl CourierService for HttpCourierService {
    #[tracing::instrument(skip(self, account, payload), fields(order_ref = %payload.order_ref))]
    async fn book(
        &self,
        account: &CourierAccount,
        payload: &BookingPayload,
    ) -> Result<BookingResult> {
        let agent = self.agent.clone();
        let url = self.booking_url.clone();
        let auth = basic_auth(account);
        let body = serde_json::to_value(payload)
            .map_err(|e| IssuanceError::external(SERVICE, e))?;

        let response = tokio::task::spawn_blocking(move || -> Result<BookingResponse> {
            agent
                .post(&url)
                .set("Content-Type", "application/json")
                .set("Accept", "application/json")
                .set("Authorization", &auth)
                .send_json(body)
                .map_err(|e| error_from_ureq(SERVICE, e))?
                .into_json::<BookingResponse>()
                .map_err(|e| IssuanceError::external(SERVICE, e))
        })
        .await
        .map_err(|e| IssuanceError::external(SERVICE, e))??;

        response.into_result()
    }
}

#[derive(Debug, Default)]
struct InMemoryCourierState {
    bookings: Vec<(CourierAccount, BookingPayload, String)>,
    next_id: u32,
    fail_on_book: bool,
}

/// In-memory courier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCourierService {
    state: Arc<RwLock<InMemoryCourierState>>,
}

impl InMemoryCourierService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the courier to reject bookings until reset.
    pub fn set_fail_on_book(&self, fail: bool) {
        self.state.write().unwrap().fail_on_book = fail;
    }

    pub fn booking_count(&self) -> usize {
        self.state.read().unwrap().bookings.len()
    }

    /// Returns the payloads booked so far, with the shipping account's username.
    pub fn bookings(&self) -> Vec<(String, BookingPayload)> {
        self.state
            .read()
            .unwrap()
            .bookings
            .iter()
            .map(|(account, payload, _)| (account.username.clone(), payload.clone()))
            .collect()
    }
}

#[async_trait]
impl CourierService for InMemoryCourierService {
    async fn book(
        &self,
        account: &CourierAccount,
        payload: &BookingPayload,
    ) -> Result<BookingResult> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_book {
            return Err(IssuanceError::external(SERVICE, "courier unavailable"));
        }

        state.next_id += 1;
        let tracking_number = format!("TRK-{:04}", state.next_id);
        state
            .bookings
            .push((account.clone(), payload.clone(), tracking_number.clone()));

        Ok(BookingResult { tracking_number })
    }
}
