//! Read-only reference entities consumed during issuance.

use serde::{Deserialize, Serialize};

/// Branch codes used in non-health policy codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCodes {
    /// Code used for conventional policies.
    pub conventional: String,

    /// Code used for takaful (PMD) policies.
    pub takaful: String,
}

impl BranchCodes {
    /// Creates a new pair of branch codes.
    pub fn new(conventional: impl Into<String>, takaful: impl Into<String>) -> Self {
        Self {
            conventional: conventional.into(),
            takaful: takaful.into(),
        }
    }

    /// Returns the code for the given policy flavour.
    pub fn for_policy(&self, takaful: bool) -> &str {
        if takaful {
            &self.takaful
        } else {
            &self.conventional
        }
    }
}

/// A sales branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: i64,
    pub name: String,
    pub codes: BranchCodes,
}

/// Payment mode codes that drive fulfillment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentModeCode {
    /// Cash on delivery: courier dispatch, shipping required.
    Cod,

    /// Business to business: activated without dispatch.
    B2b,

    /// Card and any other gateway-backed mode, activated on verification.
    Other(String),
}

impl PaymentModeCode {
    /// Parses a stored payment mode code.
    pub fn parse(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "COD" => PaymentModeCode::Cod,
            "B2B" => PaymentModeCode::B2b,
            _ => PaymentModeCode::Other(code.trim().to_string()),
        }
    }

    /// Returns the code as stored.
    pub fn as_str(&self) -> &str {
        match self {
            PaymentModeCode::Cod => "COD",
            PaymentModeCode::B2b => "B2B",
            PaymentModeCode::Other(code) => code,
        }
    }

    /// Returns true for cash on delivery.
    pub fn is_cod(&self) -> bool {
        matches!(self, PaymentModeCode::Cod)
    }
}

impl From<String> for PaymentModeCode {
    fn from(code: String) -> Self {
        Self::parse(&code)
    }
}

impl From<PaymentModeCode> for String {
    fn from(code: PaymentModeCode) -> Self {
        code.as_str().to_string()
    }
}

impl std::fmt::Display for PaymentModeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A payment mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMode {
    pub id: i64,
    pub name: String,
    pub code: PaymentModeCode,
}

/// Product type, which selects the type-specific rules and detail table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProductType {
    Health,
    Travel,
    Home,
    PurchaseProtection,
    Other(String),
}

impl ProductType {
    /// Parses a stored product type.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "health" => ProductType::Health,
            "travel" => ProductType::Travel,
            "home" => ProductType::Home,
            "purchase_protection" => ProductType::PurchaseProtection,
            _ => ProductType::Other(value.trim().to_string()),
        }
    }

    /// Returns the type as stored.
    pub fn as_str(&self) -> &str {
        match self {
            ProductType::Health => "health",
            ProductType::Travel => "travel",
            ProductType::Home => "home",
            ProductType::PurchaseProtection => "purchase_protection",
            ProductType::Other(value) => value,
        }
    }

    /// Returns true for health products.
    pub fn is_health(&self) -> bool {
        matches!(self, ProductType::Health)
    }
}

impl From<String> for ProductType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<ProductType> for String {
    fn from(value: ProductType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCategory {
    pub id: i64,
    pub name: String,
    /// Numeric code rendered as the middle segment of non-health policy codes.
    pub code: i32,
}

/// A product together with its category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub product_type: ProductType,
    pub category: ProductCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub id: i64,
    pub name: String,
}

/// Storefront (parent, child) SKU pair mapped to the internal plan triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuMapping {
    pub parent_sku: String,
    pub child_sku: String,
    pub plan_id: i64,
    pub product_id: i64,
    pub option_id: i64,
}
