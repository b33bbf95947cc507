//! The bounded creating transaction.

use std::time::Duration;

use chrono::NaiveDate;
use domain::{
    CustomerContact, OrderRequest, PolicyDetail, ShippingDetails, TypeSpecificDetail, age_on,
};
use policy_store::{Activation, CreatedIssuance, NewIssuance, NewOrder, NewPolicy, PolicyStore};

use crate::error::{IssuanceError, Result};
use crate::resolver::ResolvedReferences;

/// Assembles the rows written for a validated request.
///
/// Insured-party ages are derived from their dates of birth as of `today`.
pub fn build_issuance(
    request: &OrderRequest,
    refs: &ResolvedReferences,
    shipping: Option<ShippingDetails>,
    type_detail: TypeSpecificDetail,
    activation: Option<Activation>,
    today: NaiveDate,
) -> NewIssuance {
    let details = request
        .customer_details
        .iter()
        .map(|d| PolicyDetail {
            kind: d.kind.clone(),
            name: d.insurance_name.clone(),
            cnic: d.insurance_cnic.clone(),
            date_of_birth: d.insurance_dob,
            age: d.insurance_dob.map(|dob| age_on(dob, today)),
            gender: d.insurance_gender.clone(),
            relation: d.insurance_relation.clone(),
            phone: d.insurance_phone.clone(),
            email: d.insurance_email.clone(),
        })
        .collect();

    NewIssuance {
        order: NewOrder {
            order_code: request.order_code.clone(),
            customer: CustomerContact {
                name: request.customer_name.clone(),
                email: request.customer_email.clone(),
                phone: request.customer_phone.clone(),
                cnic: request.customer_cnic.clone(),
                address: request.customer_address.clone(),
            },
            channel: request.channel.clone(),
            payment_mode_id: refs.payment_mode.id,
            branch_id: refs.branch.id,
            city_id: refs.city.id,
            received_premium: request.received_premium,
            discount_amount: request.discount_amount,
            shipping,
        },
        policy: NewPolicy {
            plan_id: refs.mapping.plan_id,
            product_id: refs.mapping.product_id,
            option_id: refs.mapping.option_id,
            parent_sku: request.product_details.parent_sku.clone(),
            sku: request.product_details.sku.clone(),
            takaful_policy: request.takaful_policy,
            sum_insured: request.product_details.sum_insured,
            received_premium: request.received_premium,
            item_price: request.product_details.item_price,
            quantity: request.quantity,
        },
        details,
        type_detail,
        activation,
    }
}

/// Runs the creating transaction under a time budget.
///
/// When the budget runs out the in-flight write is dropped, which rolls
/// back everything it had written.
#[derive(Clone)]
pub struct TransactionalWriter<S> {
    store: S,
    timeout: Duration,
}

impl<S: PolicyStore> TransactionalWriter<S> {
    pub fn new(store: S, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    #[tracing::instrument(skip(self, issuance), fields(order_code = %issuance.order.order_code))]
    pub async fn write(&self, issuance: NewIssuance) -> Result<CreatedIssuance> {
        match tokio::time::timeout(self.timeout, self.store.create_issuance(issuance)).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::error!(timeout = ?self.timeout, "creating transaction timed out");
                Err(IssuanceError::TransactionTimeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{
        Branch, BranchCodes, City, CustomerDetailInput, InsuredPartyKind, Money, PaymentMode,
        PaymentModeCode, Plan, Product, ProductCategory, ProductDetails, ProductType, SkuMapping,
    };
    use policy_store::InMemoryPolicyStore;

    fn refs() -> ResolvedReferences {
        ResolvedReferences {
            branch: Branch {
                id: 3,
                name: "Direct".to_string(),
                codes: BranchCodes::new("DIR", "DIT"),
            },
            payment_mode: PaymentMode {
                id: 2,
                name: "B2B".to_string(),
                code: PaymentModeCode::B2b,
            },
            mapping: SkuMapping {
                parent_sku: "HLT".to_string(),
                child_sku: "HLT-GOLD".to_string(),
                plan_id: 5,
                product_id: 6,
                option_id: 7,
            },
            product: Product {
                id: 6,
                name: "Personal Care".to_string(),
                product_type: ProductType::Health,
                category: ProductCategory {
                    id: 1,
                    name: "Health".to_string(),
                    code: 1,
                },
            },
            plan: Plan {
                id: 5,
                name: "Gold".to_string(),
            },
            city: City {
                id: 4,
                name: "Karachi".to_string(),
            },
        }
    }

    fn request() -> OrderRequest {
        OrderRequest {
            order_code: "ORD-1001".to_string(),
            customer_name: "Ayesha Khan".to_string(),
            customer_email: None,
            customer_phone: "03001234567".to_string(),
            customer_cnic: None,
            customer_address: None,
            customer_city: 4,
            payment_method_id: 2,
            branch_id: None,
            channel: "partner".to_string(),
            received_premium: Money::from_major(2500),
            discount_amount: Money::zero(),
            shipping: None,
            product_details: ProductDetails {
                parent_sku: "HLT".to_string(),
                sku: "HLT-GOLD".to_string(),
                item_price: Money::from_major(2500),
                sum_insured: Money::from_major(500_000),
                product_type: Some("health".to_string()),
            },
            customer_details: vec![CustomerDetailInput {
                kind: InsuredPartyKind::Spouse,
                insurance_name: "Bilal Khan".to_string(),
                insurance_cnic: None,
                insurance_dob: NaiveDate::from_ymd_opt(1988, 7, 1),
                insurance_gender: None,
                insurance_relation: Some("husband".to_string()),
                insurance_phone: None,
                insurance_email: None,
            }],
            travel_details: None,
            homecare_details: None,
            purchase_protection: None,
            takaful_policy: true,
            quantity: 2,
        }
    }

    #[test]
    fn test_build_issuance_uses_resolved_ids_and_derives_ages() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let issuance =
            build_issuance(&request(), &refs(), None, TypeSpecificDetail::None, None, today);

        assert_eq!(issuance.order.branch_id, 3);
        assert_eq!(issuance.order.city_id, 4);
        assert_eq!(issuance.policy.option_id, 7);
        assert!(issuance.policy.takaful_policy);
        assert_eq!(issuance.policy.quantity, 2);
        assert_eq!(issuance.details.len(), 1);
        assert_eq!(issuance.details[0].age, Some(35));
        assert!(issuance.activation.is_none());
    }

    #[test]
    fn test_build_issuance_carries_activation() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let refs = refs();
        let activation = Activation::new(refs.code_template(true));
        let issuance = build_issuance(
            &request(),
            &refs,
            None,
            TypeSpecificDetail::None,
            Some(activation.clone()),
            today,
        );

        assert_eq!(issuance.activation, Some(activation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_times_out_and_leaves_nothing() {
        let store = InMemoryPolicyStore::new();
        store
            .set_write_delay(Some(Duration::from_secs(120)))
            .await;
        let writer = TransactionalWriter::new(store.clone(), Duration::from_secs(30));

        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let issuance =
            build_issuance(&request(), &refs(), None, TypeSpecificDetail::None, None, today);
        let err = writer.write(issuance).await.unwrap_err();

        assert!(matches!(err, IssuanceError::TransactionTimeout(_)));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.policy_count().await, 0);
    }
}
