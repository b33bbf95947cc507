//! Card-transaction verification.

use domain::{
    CardTransactionRequest, CardVerificationResult, OrderStatus, PaymentModeCode, PolicyStatus,
};
use policy_store::{PolicyStore, PolicyStoreExt, StatusUpdate};

use crate::error::{IssuanceError, Result};
use crate::resolver::{ReferenceResolver, code_template};

/// Activates card-paid orders on the gateway's approval callback.
#[derive(Clone)]
pub struct CardTransactionVerifier<S> {
    store: S,
    resolver: ReferenceResolver<S>,
}

impl<S: PolicyStore + Clone> CardTransactionVerifier<S> {
    pub fn new(store: S, resolver: ReferenceResolver<S>) -> Self {
        Self { store, resolver }
    }

    /// Records the transaction and, if approved, activates the order.
    ///
    /// The code is regenerated from the stored rows, so it always matches
    /// the one returned when the order was created. Declined transactions
    /// leave the order unverified and return no code. Cash-on-delivery and
    /// B2B orders are never activated here.
    #[tracing::instrument(skip(self, request), fields(order_code = %request.order_code))]
    pub async fn verify(&self, request: &CardTransactionRequest) -> Result<CardVerificationResult> {
        let order = self.store.require_order_by_code(&request.order_code).await?;
        if order.is_verified() {
            return Err(IssuanceError::Conflict(format!(
                "order {} is already verified",
                order.order_code
            )));
        }

        let payment_mode = self.resolver.payment_mode(order.payment_mode_id).await?;
        if matches!(payment_mode.code, PaymentModeCode::Cod | PaymentModeCode::B2b) {
            return Err(IssuanceError::Conflict(format!(
                "order {} is paid by {}, not by card",
                order.order_code, payment_mode.code
            )));
        }

        self.store
            .record_card_transaction(
                order.id,
                request.transaction_id.clone(),
                request.approval_code.clone(),
            )
            .await?;

        let policy = self.store.require_policy_by_order(order.id).await?;
        let (branch, product, plan) = tokio::try_join!(
            self.resolver.branch(Some(order.branch_id)),
            self.resolver.product(policy.product_id),
            self.resolver.plan(policy.plan_id),
        )?;
        let code =
            code_template(&product, &plan, &branch, policy.takaful_policy).code_for(policy.id);

        if !request.is_approved() {
            metrics::counter!("card_verifications_total", "outcome" => "declined").increment(1);
            tracing::info!(
                reason_code = request.reason_code.as_deref().unwrap_or(""),
                "card transaction not approved"
            );
            return Ok(CardVerificationResult { policy_code: None });
        }

        let policy_status = PolicyStatus::activated_for(&product.product_type);
        let update = StatusUpdate::new(order.id, policy.id)
            .with_policy_code(code.clone())
            .with_order_status(OrderStatus::Verified)
            .with_policy_status(policy_status);
        self.store.apply_status_update(update).await?;

        metrics::counter!("card_verifications_total", "outcome" => "approved").increment(1);
        tracing::info!(policy_code = %code, policy_status = %policy_status, "card order verified");
        Ok(CardVerificationResult {
            policy_code: Some(code),
        })
    }
}
