//! Inbound requests and outbound results of the issuance engine.
//!
//! Requests arrive already schema-checked; fields that only some product
//! types need are optional here and enforced by [`crate::rules`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::policy::InsuredPartyKind;

fn default_channel() -> String {
    "web".to_string()
}

fn default_quantity() -> u32 {
    1
}

/// A purchase request to turn into an order and a policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub order_code: String,
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    pub customer_phone: String,
    #[serde(default)]
    pub customer_cnic: Option<String>,
    #[serde(default)]
    pub customer_address: Option<String>,
    /// City id.
    pub customer_city: i64,
    pub payment_method_id: i64,
    #[serde(default)]
    pub branch_id: Option<i64>,
    #[serde(default = "default_channel")]
    pub channel: String,
    pub received_premium: Money,
    #[serde(default)]
    pub discount_amount: Money,
    #[serde(default)]
    pub shipping: Option<ShippingInput>,
    pub product_details: ProductDetails,
    pub customer_details: Vec<CustomerDetailInput>,
    #[serde(default)]
    pub travel_details: Option<TravelInput>,
    #[serde(default)]
    pub homecare_details: Option<Vec<HomecareInput>>,
    #[serde(default)]
    pub purchase_protection: Option<PurchaseProtectionInput>,
    #[serde(default)]
    pub takaful_policy: bool,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShippingInput {
    pub recipient_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDetails {
    pub parent_sku: String,
    pub sku: String,
    pub item_price: Money,
    pub sum_insured: Money,
    /// Informational; the resolved product's type is authoritative.
    #[serde(default)]
    pub product_type: Option<String>,
}

/// One insured party as submitted, prefixed `insurance_*` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerDetailInput {
    #[serde(rename = "type")]
    pub kind: InsuredPartyKind,
    pub insurance_name: String,
    #[serde(default)]
    pub insurance_cnic: Option<String>,
    #[serde(default)]
    pub insurance_dob: Option<NaiveDate>,
    #[serde(default)]
    pub insurance_gender: Option<String>,
    #[serde(default)]
    pub insurance_relation: Option<String>,
    #[serde(default)]
    pub insurance_phone: Option<String>,
    #[serde(default)]
    pub insurance_email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TravelInput {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub travel_days: Option<u32>,
    pub tuition_fee: Option<bool>,
    pub travel_start_date: Option<NaiveDate>,
    pub travel_end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HomecareInput {
    pub ownership_status: Option<String>,
    pub structure_type: Option<String>,
    pub plot_area: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurchaseProtectionInput {
    pub name: Option<String>,
    pub duration: Option<u32>,
    pub duration_type: Option<String>,
    pub total_price: Option<Money>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
}

/// Card gateway callback, keyed by order code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardTransactionRequest {
    pub order_code: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub approval_code: Option<String>,
    #[serde(default)]
    pub reason_code: Option<String>,
}

impl CardTransactionRequest {
    /// Gateway reason code signalling an approved transaction.
    pub const APPROVED_REASON_CODE: &'static str = "100";

    /// Returns true if the gateway approved the transaction.
    pub fn is_approved(&self) -> bool {
        self.reason_code.as_deref().map(str::trim) == Some(Self::APPROVED_REASON_CODE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceResult {
    pub policy_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardVerificationResult {
    pub policy_code: Option<String>,
}
