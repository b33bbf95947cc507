//! Order and policy status machines.

use serde::{Deserialize, Serialize};

use crate::reference::ProductType;

/// The status of an order.
///
/// Status transitions:
/// ```text
/// Pending ──► Unverified ──┬──────────────► Verified
///                          └──► PendingCod ──┘
///
/// any non-terminal ──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Row inserted, creating transaction still open.
    #[default]
    #[serde(rename = "pending")]
    Pending,

    /// Order committed, awaiting payment-specific activation.
    #[serde(rename = "unverified")]
    Unverified,

    /// Courier booked, awaiting cash collection.
    #[serde(rename = "pendingCOD")]
    PendingCod,

    /// Payment or channel verified (terminal state).
    #[serde(rename = "verified")]
    Verified,

    /// Order was cancelled (terminal state).
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    fn stage(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Unverified => 1,
            OrderStatus::PendingCod => 2,
            OrderStatus::Verified => 3,
            OrderStatus::Cancelled => 4,
        }
    }

    /// Returns true if moving to `next` keeps the order moving forward.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == OrderStatus::Cancelled || next.stage() > self.stage()
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Verified | OrderStatus::Cancelled)
    }

    /// Returns the status as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Unverified => "unverified",
            OrderStatus::PendingCod => "pendingCOD",
            OrderStatus::Verified => "verified",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Parses a stored status.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "unverified" => Some(OrderStatus::Unverified),
            "pendingCOD" => Some(OrderStatus::PendingCod),
            "verified" => Some(OrderStatus::Verified),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The status of a policy.
///
/// Status transitions:
/// ```text
/// Unverified ──┬──► PendingCod ──┬──► PendingCbo  (health)
///              └─────────────────┴──► PendingIgis (other)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PolicyStatus {
    #[default]
    #[serde(rename = "unverified")]
    Unverified,

    #[serde(rename = "pendingCOD")]
    PendingCod,

    /// Handed to the CBO system (health products).
    #[serde(rename = "pendingCBO")]
    PendingCbo,

    /// Handed to the IGIS system (all other products).
    #[serde(rename = "pendingIGIS")]
    PendingIgis,

    #[serde(rename = "cancelled")]
    Cancelled,
}

impl PolicyStatus {
    /// Returns the downstream pending status a verified policy moves to.
    pub fn activated_for(product_type: &ProductType) -> Self {
        if product_type.is_health() {
            PolicyStatus::PendingCbo
        } else {
            PolicyStatus::PendingIgis
        }
    }

    fn stage(&self) -> u8 {
        match self {
            PolicyStatus::Unverified => 0,
            PolicyStatus::PendingCod => 1,
            PolicyStatus::PendingCbo | PolicyStatus::PendingIgis => 2,
            PolicyStatus::Cancelled => 3,
        }
    }

    /// Returns true if moving to `next` keeps the policy moving forward.
    pub fn can_transition_to(&self, next: PolicyStatus) -> bool {
        if *self == PolicyStatus::Cancelled {
            return false;
        }
        next == PolicyStatus::Cancelled || next.stage() > self.stage()
    }

    /// Returns the status as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyStatus::Unverified => "unverified",
            PolicyStatus::PendingCod => "pendingCOD",
            PolicyStatus::PendingCbo => "pendingCBO",
            PolicyStatus::PendingIgis => "pendingIGIS",
            PolicyStatus::Cancelled => "cancelled",
        }
    }

    /// Parses a stored status.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unverified" => Some(PolicyStatus::Unverified),
            "pendingCOD" => Some(PolicyStatus::PendingCod),
            "pendingCBO" => Some(PolicyStatus::PendingCbo),
            "pendingIGIS" => Some(PolicyStatus::PendingIgis),
            "cancelled" => Some(PolicyStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
