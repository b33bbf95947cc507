//! Customer notifications and partner callbacks.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{IssuanceError, Result};
use crate::services::http::{build_http_agent, error_from_ureq};

const SERVICE: &str = "notification";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
    WhatsApp,
    StatusCallback,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::Sms => "sms",
            NotificationChannel::WhatsApp => "whatsapp",
            NotificationChannel::StatusCallback => "status_callback",
        }
    }
}

/// What a customer is told once their policy ships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub order_code: String,
    pub customer_name: String,
    pub product_name: String,
    pub plan_name: String,
    /// Received premium as a decimal string.
    pub premium: String,
    pub policy_code: String,
    pub document_link: String,
    pub tracking_number: Option<String>,
    /// Partner message template, WhatsApp only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub channel: NotificationChannel,
    /// Email address, phone number or callback URL.
    pub recipient: String,
    pub payload: NotificationPayload,
}

/// Trait for delivering notifications.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Builds the document link sent for digital delivery.
///
/// The signature is the URL-safe HMAC-SHA256 of the order code and policy
/// code keyed by `secret`, so links cannot be forged for other orders.
pub fn signed_document_link(
    base_url: &str,
    secret: &str,
    order_code: &str,
    policy_code: &str,
) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| IssuanceError::external(SERVICE, e))?;
    mac.update(order_code.as_bytes());
    mac.update(b":");
    mac.update(policy_code.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!(
        "{}/documents/{order_code}/{policy_code}?sig={signature}",
        base_url.trim_end_matches('/')
    ))
}

/// Notification sink that only logs; used when no gateway is wired in.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotificationService;

#[async_trait]
impl NotificationService for LoggingNotificationService {
    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            channel = notification.channel.as_str(),
            recipient = %notification.recipient,
            order_code = %notification.payload.order_code,
            policy_code = %notification.payload.policy_code,
            "notification sent"
        );
        Ok(())
    }
}

/// Pushes status callbacks to the partner's upstream URL over HTTP and logs
/// every other channel.
///
/// Email, SMS and WhatsApp gateways are not wired in; those notifications
/// only reach the log.
#[derive(Clone)]
pub struct CallbackNotificationService {
    agent: ureq::Agent,
    fallback: LoggingNotificationService,
}

impl CallbackNotificationService {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: build_http_agent(timeout),
            fallback: LoggingNotificationService,
        }
    }
}

#[async_trait]
impl NotificationService for CallbackNotificationService {
    async fn send(&self, notification: &Notification) -> Result<()> {
        if notification.channel != NotificationChannel::StatusCallback {
            return self.fallback.send(notification).await;
        }

        let agent = self.agent.clone();
        let url = notification.recipient.clone();
        let body = serde_json::to_value(&notification.payload)
            .map_err(|e| IssuanceError::external(SERVICE, e))?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            agent
                .post(&url)
                .set("Content-Type", "application/json")
                .send_json(body)
                .map_err(|e| error_from_ureq(SERVICE, e))?;
            Ok(())
        })
        .await
        .map_err(|e| IssuanceError::external(SERVICE, e))??;

        tracing::info!(
            url = %notification.recipient,
            order_code = %notification.payload.order_code,
            "status callback delivered"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    sent: Vec<Notification>,
    fail_on_send: bool,
}

/// In-memory notification service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationService {
    state: Arc<RwLock<InMemoryNotificationState>>,
}

impl InMemoryNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.state.read().unwrap().sent.clone()
    }

    pub fn sent_on(&self, channel: NotificationChannel) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.channel == channel)
            .collect()
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_send {
            return Err(IssuanceError::external(
                "notification",
                format!("{} gateway unavailable", notification.channel.as_str()),
            ));
        }
        state.sent.push(notification.clone());
        Ok(())
    }
}
