//! Order records.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::state::OrderStatus;

/// Customer identity and contact fields carried on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: String,
    pub email: Option<String>,
    pub phone: String,
    pub cnic: Option<String>,
    pub address: Option<String>,
}

/// Shipping fields; present on every cash-on-delivery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub recipient_name: String,
    pub address: String,
    pub phone: String,
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_code: String,
    pub customer: CustomerContact,
    pub channel: String,
    pub payment_mode_id: i64,
    pub branch_id: i64,
    pub city_id: i64,
    pub received_premium: Money,
    pub discount_amount: Money,
    pub shipping: Option<ShippingDetails>,
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub transaction_id: Option<String>,
    pub approval_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Returns true once the order has been verified.
    pub fn is_verified(&self) -> bool {
        self.status == OrderStatus::Verified
    }
}
