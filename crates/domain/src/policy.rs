//! Policy records and their detail rows.

use chrono::{Datelike, NaiveDate};
use common::{OrderId, PolicyId};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::state::PolicyStatus;

/// A persisted policy, owned 1:1 by its order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub order_id: OrderId,
    pub plan_id: i64,
    pub product_id: i64,
    pub option_id: i64,
    pub parent_sku: String,
    pub sku: String,
    /// Stays `None` until fulfillment or card verification writes it.
    pub policy_code: Option<String>,
    pub status: PolicyStatus,
    pub takaful_policy: bool,
    pub sum_insured: Money,
    pub received_premium: Money,
    pub item_price: Money,
    pub quantity: u32,
}

/// Which insured party a detail row describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InsuredPartyKind {
    Customer,
    Spouse,
    /// Kid slot 1 through 8.
    Kid(u8),
    Beneficiary,
    Parent,
    Other(String),
}

impl InsuredPartyKind {
    pub const MAX_KIDS: u8 = 8;

    /// Returns the tag as stored.
    pub fn as_tag(&self) -> String {
        match self {
            InsuredPartyKind::Customer => "customer".to_string(),
            InsuredPartyKind::Spouse => "spouse".to_string(),
            InsuredPartyKind::Kid(n) => format!("kid{n}"),
            InsuredPartyKind::Beneficiary => "beneficiary".to_string(),
            InsuredPartyKind::Parent => "parent".to_string(),
            InsuredPartyKind::Other(tag) => tag.clone(),
        }
    }
}

impl TryFrom<String> for InsuredPartyKind {
    type Error = String;

    fn try_from(tag: String) -> Result<Self, Self::Error> {
        let normalized = tag.trim().to_ascii_lowercase();
        if let Some(slot) = normalized.strip_prefix("kid") {
            return match slot.parse::<u8>() {
                Ok(n) if (1..=Self::MAX_KIDS).contains(&n) => Ok(InsuredPartyKind::Kid(n)),
                _ => Err(format!("invalid kid slot in detail type `{tag}`")),
            };
        }
        Ok(match normalized.as_str() {
            "customer" => InsuredPartyKind::Customer,
            "spouse" => InsuredPartyKind::Spouse,
            "beneficiary" => InsuredPartyKind::Beneficiary,
            "parent" => InsuredPartyKind::Parent,
            "" => return Err("detail type must not be empty".to_string()),
            _ => InsuredPartyKind::Other(normalized),
        })
    }
}

impl From<InsuredPartyKind> for String {
    fn from(kind: InsuredPartyKind) -> Self {
        kind.as_tag()
    }
}

/// One insured party on a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDetail {
    pub kind: InsuredPartyKind,
    pub name: String,
    pub cnic: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    /// Derived from `date_of_birth` when the row is written.
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub relation: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Completed years between `date_of_birth` and `today`.
///
/// Future birth dates yield zero.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> u32 {
    if date_of_birth > today {
        return 0;
    }
    let mut years = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelDetail {
    pub origin: String,
    pub destination: String,
    pub travel_days: u32,
    pub tuition_fee: bool,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomecareDetail {
    pub ownership_status: String,
    pub structure_type: String,
    pub plot_area: String,
    pub address: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseProtectionDetail {
    pub name: String,
    pub duration: u32,
    pub duration_type: String,
    pub total_price: Money,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
}

/// The one type-specific detail set written with a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum TypeSpecificDetail {
    Travel(TravelDetail),
    Home(Vec<HomecareDetail>),
    PurchaseProtection(PurchaseProtectionDetail),
    /// Health and other products carry no extra table.
    None,
}
