//! Type-specific rule checks run before the creating transaction opens.
//!
//! Each check turns the optional request sections into the non-optional
//! rows the writer persists, so a request that passes can be written
//! without further inspection.

use crate::error::ValidationError;
use crate::money::Money;
use crate::order::ShippingDetails;
use crate::policy::{HomecareDetail, PurchaseProtectionDetail, TravelDetail, TypeSpecificDetail};
use crate::reference::{PaymentModeCode, ProductType};
use crate::request::{
    HomecareInput, OrderRequest, PurchaseProtectionInput, ShippingInput, TravelInput,
};

const TRAVEL: &str = "travel_details";
const HOMECARE: &str = "homecare_details";
const PURCHASE_PROTECTION: &str = "purchase_protection";
const SHIPPING: &str = "shipping";

/// Checks the type-specific section selected by `product_type`.
pub fn check_type_specific(
    product_type: &ProductType,
    request: &OrderRequest,
) -> Result<TypeSpecificDetail, ValidationError> {
    match product_type {
        ProductType::Travel => {
            let input = request
                .travel_details
                .as_ref()
                .ok_or(ValidationError::MissingField {
                    section: TRAVEL,
                    field: TRAVEL,
                })?;
            check_travel(input).map(TypeSpecificDetail::Travel)
        }
        ProductType::Home => {
            let inputs = request.homecare_details.as_deref().unwrap_or_default();
            check_homecare(inputs).map(TypeSpecificDetail::Home)
        }
        ProductType::PurchaseProtection => {
            let input =
                request
                    .purchase_protection
                    .as_ref()
                    .ok_or(ValidationError::MissingField {
                        section: PURCHASE_PROTECTION,
                        field: PURCHASE_PROTECTION,
                    })?;
            check_purchase_protection(input).map(TypeSpecificDetail::PurchaseProtection)
        }
        ProductType::Health | ProductType::Other(_) => Ok(TypeSpecificDetail::None),
    }
}

/// Checks that the item price multiplied by the quantity fits, returning
/// the declared value of the consignment.
pub fn check_amounts(request: &OrderRequest) -> Result<Money, ValidationError> {
    request
        .product_details
        .item_price
        .checked_multiply(request.quantity)
        .ok_or(ValidationError::AmountOutOfRange {
            field: "item_price",
        })
}

/// Enforces that shipping fields are present for cash on delivery.
///
/// Other payment modes keep shipping only when it was fully supplied.
pub fn check_shipping(
    payment_mode: &PaymentModeCode,
    shipping: Option<&ShippingInput>,
) -> Result<Option<ShippingDetails>, ValidationError> {
    if !payment_mode.is_cod() {
        return Ok(shipping.and_then(|s| complete_shipping(s).ok()));
    }

    let input = shipping.ok_or(ValidationError::MissingField {
        section: SHIPPING,
        field: SHIPPING,
    })?;
    complete_shipping(input).map(Some)
}

fn complete_shipping(input: &ShippingInput) -> Result<ShippingDetails, ValidationError> {
    Ok(ShippingDetails {
        recipient_name: required_text(&input.recipient_name, SHIPPING, "recipient_name")?,
        address: required_text(&input.address, SHIPPING, "address")?,
        phone: required_text(&input.phone, SHIPPING, "phone")?,
    })
}

fn check_travel(input: &TravelInput) -> Result<TravelDetail, ValidationError> {
    let origin = required_text(&input.origin, TRAVEL, "origin")?;
    let travel_days = required(&input.travel_days, TRAVEL, "travel_days")?;
    let destination = required_text(&input.destination, TRAVEL, "destination")?;
    let tuition_fee = required(&input.tuition_fee, TRAVEL, "tuition_fee")?;
    let start_date = required(&input.travel_start_date, TRAVEL, "travel_start_date")?;
    let end_date = required(&input.travel_end_date, TRAVEL, "travel_end_date")?;

    if start_date >= end_date {
        return Err(ValidationError::InvalidTravelWindow {
            start: start_date,
            end: end_date,
        });
    }

    Ok(TravelDetail {
        origin,
        destination,
        travel_days,
        tuition_fee,
        start_date,
        end_date,
    })
}

fn check_homecare(inputs: &[HomecareInput]) -> Result<Vec<HomecareDetail>, ValidationError> {
    if inputs.is_empty() {
        return Err(ValidationError::NoHomecareDetails);
    }

    inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            let item = |value: &Option<String>, field: &'static str| {
                value
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .ok_or(ValidationError::MissingItemField {
                        section: HOMECARE,
                        index,
                        field,
                    })
            };
            Ok(HomecareDetail {
                ownership_status: item(&input.ownership_status, "ownership_status")?,
                structure_type: item(&input.structure_type, "structure_type")?,
                plot_area: item(&input.plot_area, "plot_area")?,
                address: item(&input.address, "address")?,
                city: item(&input.city, "city")?,
            })
        })
        .collect()
}

fn check_purchase_protection(
    input: &PurchaseProtectionInput,
) -> Result<PurchaseProtectionDetail, ValidationError> {
    let total_price: Money = required(&input.total_price, PURCHASE_PROTECTION, "total_price")?;
    Ok(PurchaseProtectionDetail {
        name: required_text(&input.name, PURCHASE_PROTECTION, "name")?,
        duration: required(&input.duration, PURCHASE_PROTECTION, "duration")?,
        duration_type: required_text(&input.duration_type, PURCHASE_PROTECTION, "duration_type")?,
        total_price,
        brand: input.brand.clone(),
        model: input.model.clone(),
        serial_number: input.serial_number.clone(),
    })
}

fn required<T: Copy>(
    value: &Option<T>,
    section: &'static str,
    field: &'static str,
) -> Result<T, ValidationError> {
    value.ok_or(ValidationError::MissingField { section, field })
}

fn required_text(
    value: &Option<String>,
    section: &'static str,
    field: &'static str,
) -> Result<String, ValidationError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ValidationError::MissingField { section, field })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ProductDetails;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn base_request() -> OrderRequest {
        OrderRequest {
            order_code: "ORD-1".to_string(),
            customer_name: "Bilal Ahmed".to_string(),
            customer_email: None,
            customer_phone: "03001234567".to_string(),
            customer_cnic: None,
            customer_address: None,
            customer_city: 1,
            payment_method_id: 1,
            branch_id: None,
            channel: "web".to_string(),
            received_premium: Money::from_major(1500),
            discount_amount: Money::zero(),
            shipping: None,
            product_details: ProductDetails {
                parent_sku: "TRV".to_string(),
                sku: "TRV-STUDENT".to_string(),
                item_price: Money::from_major(1500),
                sum_insured: Money::from_major(100_000),
                product_type: None,
            },
            customer_details: vec![],
            travel_details: None,
            homecare_details: None,
            purchase_protection: None,
            takaful_policy: false,
            quantity: 1,
        }
    }

    fn travel(start: NaiveDate, end: NaiveDate) -> TravelInput {
        TravelInput {
            origin: Some("Karachi".to_string()),
            destination: Some("Dubai".to_string()),
            travel_days: Some(7),
            tuition_fee: Some(false),
            travel_start_date: Some(start),
            travel_end_date: Some(end),
        }
    }

    #[test]
    fn test_travel_passes_with_all_fields() {
        let mut request = base_request();
        request.travel_details = Some(travel(date(2025, 3, 1), date(2025, 3, 8)));

        let detail = check_type_specific(&ProductType::Travel, &request).unwrap();
        match detail {
            TypeSpecificDetail::Travel(t) => {
                assert_eq!(t.destination, "Dubai");
                assert_eq!(t.travel_days, 7);
            }
            other => panic!("expected travel detail, got {other:?}"),
        }
    }

    #[test]
    fn test_travel_rejects_start_on_or_after_end() {
        let mut request = base_request();
        request.travel_details = Some(travel(date(2025, 3, 8), date(2025, 3, 8)));
        let err = check_type_specific(&ProductType::Travel, &request).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTravelWindow { .. }));

        request.travel_details = Some(travel(date(2025, 3, 9), date(2025, 3, 8)));
        let err = check_type_specific(&ProductType::Travel, &request).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTravelWindow { .. }));
    }

    #[test]
    fn test_travel_names_missing_field() {
        let mut request = base_request();
        let mut input = travel(date(2025, 3, 1), date(2025, 3, 8));
        input.tuition_fee = None;
        request.travel_details = Some(input);

        let err = check_type_specific(&ProductType::Travel, &request).unwrap_err();
        assert_eq!(err.field(), "tuition_fee");
    }

    #[test]
    fn test_travel_section_required() {
        let err = check_type_specific(&ProductType::Travel, &base_request()).unwrap_err();
        assert_eq!(err.field(), "travel_details");
    }

    #[test]
    fn test_home_requires_at_least_one_record() {
        let mut request = base_request();
        request.homecare_details = Some(vec![]);
        let err = check_type_specific(&ProductType::Home, &request).unwrap_err();
        assert_eq!(err, ValidationError::NoHomecareDetails);
    }

    #[test]
    fn test_home_names_missing_item_field() {
        let mut request = base_request();
        request.homecare_details = Some(vec![
            HomecareInput {
                ownership_status: Some("owned".to_string()),
                structure_type: Some("house".to_string()),
                plot_area: Some("5 marla".to_string()),
                address: Some("House 4".to_string()),
                city: Some("Lahore".to_string()),
            },
            HomecareInput {
                ownership_status: Some("rented".to_string()),
                structure_type: Some("flat".to_string()),
                plot_area: Some("  ".to_string()),
                address: Some("Flat 9".to_string()),
                city: Some("Lahore".to_string()),
            },
        ]);

        let err = check_type_specific(&ProductType::Home, &request).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingItemField {
                section: "homecare_details",
                index: 1,
                field: "plot_area",
            }
        );
    }

    #[test]
    fn test_purchase_protection_requires_total_price() {
        let mut request = base_request();
        request.purchase_protection = Some(PurchaseProtectionInput {
            name: Some("Phone".to_string()),
            duration: Some(12),
            duration_type: Some("months".to_string()),
            total_price: None,
            ..Default::default()
        });

        let err = check_type_specific(&ProductType::PurchaseProtection, &request).unwrap_err();
        assert_eq!(err.field(), "total_price");
    }

    #[test]
    fn test_health_has_no_extra_structure() {
        let detail = check_type_specific(&ProductType::Health, &base_request()).unwrap();
        assert_eq!(detail, TypeSpecificDetail::None);
    }

    #[test]
    fn test_cod_requires_shipping() {
        let err = check_shipping(&PaymentModeCode::Cod, None).unwrap_err();
        assert_eq!(err.field(), "shipping");

        let partial = ShippingInput {
            recipient_name: Some("Bilal".to_string()),
            address: None,
            phone: Some("0300".to_string()),
        };
        let err = check_shipping(&PaymentModeCode::Cod, Some(&partial)).unwrap_err();
        assert_eq!(err.field(), "address");
    }

    #[test]
    fn test_non_cod_shipping_is_optional() {
        assert_eq!(check_shipping(&PaymentModeCode::B2b, None).unwrap(), None);

        let partial = ShippingInput {
            recipient_name: Some("Bilal".to_string()),
            ..Default::default()
        };
        assert_eq!(
            check_shipping(&PaymentModeCode::B2b, Some(&partial)).unwrap(),
            None
        );
    }

    #[test]
    fn test_amounts_reject_overflowing_declared_value() {
        let mut request = base_request();
        request.quantity = 3;
        assert_eq!(check_amounts(&request), Ok(Money::from_major(4500)));

        request.product_details.item_price = Money::from_minor(i64::MAX / 2 + 1);
        request.quantity = 2;
        let err = check_amounts(&request).unwrap_err();
        assert_eq!(err.field(), "item_price");
    }
}
