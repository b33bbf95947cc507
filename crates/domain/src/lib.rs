//! Domain layer for the policy issuance engine.
//!
//! This crate provides:
//! - Order and policy records with their forward-only status machines
//! - Read-only reference entities (branches, payment modes, products, plans)
//! - Inbound request and outbound result types
//! - Type-specific rule checks run before any write
//! - Deterministic policy code generation

pub mod error;
pub mod money;
pub mod order;
pub mod policy;
pub mod policy_code;
pub mod reference;
pub mod request;
pub mod rules;
pub mod state;

pub use error::ValidationError;
pub use money::Money;
pub use order::{CustomerContact, Order, ShippingDetails};
pub use policy::{
    HomecareDetail, InsuredPartyKind, Policy, PolicyDetail, PurchaseProtectionDetail,
    TravelDetail, TypeSpecificDetail, age_on,
};
pub use policy_code::{CodeInputs, CodeTemplate, generate_code};
pub use reference::{
    Branch, BranchCodes, City, PaymentMode, PaymentModeCode, Plan, Product, ProductCategory,
    ProductType, SkuMapping,
};
pub use request::{
    CardTransactionRequest, CardVerificationResult, CustomerDetailInput, HomecareInput,
    IssuanceResult, OrderRequest, ProductDetails, PurchaseProtectionInput, ShippingInput,
    TravelInput,
};
pub use state::{OrderStatus, PolicyStatus};
