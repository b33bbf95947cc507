//! Issuance service: the entry points the HTTP layer calls.

use std::time::Instant;

use chrono::Utc;
use domain::{
    CardTransactionRequest, CardVerificationResult, IssuanceResult, Order, OrderRequest, Policy,
    PolicyDetail, TypeSpecificDetail, rules,
};
use policy_store::{OutboxTask, PolicyStore, PolicyStoreExt, TaskKind};
use serde::Serialize;

use crate::config::IssuanceConfig;
use crate::dispatcher::FulfillmentDispatcher;
use crate::error::{IssuanceError, Result};
use crate::outbox::OutboxSignal;
use crate::resolver::{ReferenceKeys, ReferenceResolver};
use crate::verifier::CardTransactionVerifier;
use crate::writer::{TransactionalWriter, build_issuance};

/// Everything stored for one order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub order: Order,
    pub policy: Policy,
    pub details: Vec<PolicyDetail>,
    pub type_detail: TypeSpecificDetail,
    pub tasks: Vec<OutboxTask>,
}

/// Service for issuing and activating policies.
///
/// Order creation runs one path: concurrent reference lookups, rule checks,
/// then the bounded creating transaction, which also writes the policy code,
/// the payment-mode statuses and the courier outbox task. Courier booking
/// happens later in the outbox worker.
#[derive(Clone)]
pub struct IssuanceService<S> {
    store: S,
    resolver: ReferenceResolver<S>,
    writer: TransactionalWriter<S>,
    dispatcher: FulfillmentDispatcher,
    verifier: CardTransactionVerifier<S>,
    signal: OutboxSignal,
}

impl<S: PolicyStore + Clone> IssuanceService<S> {
    pub fn new(store: S, config: IssuanceConfig, signal: OutboxSignal) -> Self {
        let resolver = ReferenceResolver::new(store.clone(), config.direct_branch_name);
        Self {
            writer: TransactionalWriter::new(store.clone(), config.transaction_timeout),
            dispatcher: FulfillmentDispatcher::new(signal.clone()),
            verifier: CardTransactionVerifier::new(store.clone(), resolver.clone()),
            resolver,
            store,
            signal,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates an order and its policy, returning the policy code.
    #[tracing::instrument(skip(self, request), fields(order_code = %request.order_code))]
    pub async fn issue(&self, request: OrderRequest) -> Result<IssuanceResult> {
        let start = Instant::now();
        let result = self.issue_inner(&request).await;
        metrics::histogram!("issuance_duration_seconds").record(start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            metrics::counter!("issuance_failures_total", "kind" => e.kind()).increment(1);
            tracing::warn!(error = %e, kind = e.kind(), "issuance failed");
        }
        result
    }

    async fn issue_inner(&self, request: &OrderRequest) -> Result<IssuanceResult> {
        if self.store.order_code_exists(&request.order_code).await? {
            return Err(IssuanceError::Conflict(format!(
                "order code already exists: {}",
                request.order_code
            )));
        }

        let refs = self
            .resolver
            .resolve(&ReferenceKeys {
                branch_id: request.branch_id,
                payment_mode_id: request.payment_method_id,
                parent_sku: &request.product_details.parent_sku,
                sku: &request.product_details.sku,
                city_id: request.customer_city,
            })
            .await?;

        let type_detail = rules::check_type_specific(&refs.product.product_type, request)?;
        let shipping = rules::check_shipping(&refs.payment_mode.code, request.shipping.as_ref())?;
        rules::check_amounts(request)?;

        let template = refs.code_template(request.takaful_policy);
        let (outcome, activation) = self.dispatcher.prepare(
            &refs.payment_mode.code,
            &refs.product.product_type,
            template.clone(),
        );
        let issuance = build_issuance(
            request,
            &refs,
            shipping,
            type_detail,
            activation,
            Utc::now().date_naive(),
        );
        let created = self.writer.write(issuance).await?;
        self.dispatcher.committed(outcome);

        let policy_code = created
            .policy_code
            .unwrap_or_else(|| template.code_for(created.policy_id));

        metrics::counter!(
            "policies_issued_total",
            "payment_mode" => refs.payment_mode.code.as_str().to_string()
        )
        .increment(1);
        tracing::info!(
            policy_id = %created.policy_id,
            policy_code = %policy_code,
            payment_mode = %refs.payment_mode.code,
            ?outcome,
            "policy issued"
        );

        Ok(IssuanceResult { policy_code })
    }

    /// Handles the card gateway callback for an order.
    pub async fn verify_card_transaction(
        &self,
        request: &CardTransactionRequest,
    ) -> Result<CardVerificationResult> {
        self.verifier.verify(request).await
    }

    /// Queues a fresh courier booking for a cash-on-delivery order.
    ///
    /// Resets the attempt budget of a failed or exhausted booking.
    #[tracing::instrument(skip(self))]
    pub async fn repush_courier(&self, order_code: &str) -> Result<OutboxTask> {
        let order = self.store.require_order_by_code(order_code).await?;
        let payment_mode = self.resolver.payment_mode(order.payment_mode_id).await?;

        if !payment_mode.code.is_cod() {
            return Err(IssuanceError::Conflict(format!(
                "order {order_code} is not cash on delivery"
            )));
        }
        if order.status.is_terminal() {
            return Err(IssuanceError::Conflict(format!(
                "order {order_code} is already {}",
                order.status
            )));
        }

        let task = self
            .store
            .requeue_task(order.id, TaskKind::CourierBooking, Utc::now())
            .await?;
        self.signal.notify();
        tracing::info!(task_id = %task.id, "courier booking re-pushed");
        Ok(task)
    }

    /// Loads the stored order, policy, details and outbox tasks.
    pub async fn order_summary(&self, order_code: &str) -> Result<OrderSummary> {
        let order = self.store.require_order_by_code(order_code).await?;
        let policy = self.store.require_policy_by_order(order.id).await?;
        let (details, type_detail, tasks) = tokio::try_join!(
            self.store.policy_details(policy.id),
            self.store.type_specific_detail(policy.id),
            self.store.tasks_for_order(order.id),
        )?;

        Ok(OrderSummary {
            order,
            policy,
            details,
            type_detail,
            tasks,
        })
    }
}
