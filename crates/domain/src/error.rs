//! Domain error types.

use chrono::NaiveDate;
use thiserror::Error;

/// A request that fails the product-type or payment-mode rules.
///
/// Raised before any write; the message names the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is absent.
    #[error("{section}: missing required field `{field}`")]
    MissingField {
        section: &'static str,
        field: &'static str,
    },

    /// A required field of one entry in a list is absent.
    #[error("{section}[{index}]: missing required field `{field}`")]
    MissingItemField {
        section: &'static str,
        index: usize,
        field: &'static str,
    },

    /// Home products need at least one homecare record.
    #[error("homecare_details: at least one record is required")]
    NoHomecareDetails,

    /// Travel must start strictly before it ends.
    #[error("travel_details: start date {start} must be before end date {end}")]
    InvalidTravelWindow { start: NaiveDate, end: NaiveDate },

    /// An amount cannot be represented once multiplied out.
    #[error("{field}: amount out of range")]
    AmountOutOfRange { field: &'static str },
}

impl ValidationError {
    /// Returns the name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingField { field, .. }
            | ValidationError::MissingItemField { field, .. } => field,
            ValidationError::NoHomecareDetails => "homecare_details",
            ValidationError::InvalidTravelWindow { .. } => "travel_start_date",
            ValidationError::AmountOutOfRange { field } => field,
        }
    }
}
