use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{OrderId, PolicyId, TaskId};
use domain::{
    Branch, City, CodeTemplate, CustomerContact, Money, Order, OrderStatus, PaymentMode, Plan,
    Policy, PolicyDetail, PolicyStatus, Product, ShippingDetails, SkuMapping, TypeSpecificDetail,
};

use crate::outbox::{OutboxTask, TaskKind};
use crate::{Result, StoreError};

/// Order fields supplied by the writer; ids and status are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_code: String,
    pub customer: CustomerContact,
    pub channel: String,
    pub payment_mode_id: i64,
    pub branch_id: i64,
    pub city_id: i64,
    pub received_premium: Money,
    pub discount_amount: Money,
    pub shipping: Option<ShippingDetails>,
}

/// Policy fields supplied by the writer.
#[derive(Debug, Clone)]
pub struct NewPolicy {
    pub plan_id: i64,
    pub product_id: i64,
    pub option_id: i64,
    pub parent_sku: String,
    pub sku: String,
    pub takaful_policy: bool,
    pub sum_insured: Money,
    pub received_premium: Money,
    pub item_price: Money,
    pub quantity: u32,
}

/// Fulfillment written by the creating transaction once the policy id is
/// known.
///
/// The policy code is generated from `code` and the assigned id. Statuses
/// move from `unverified`, and the outbox task, if any, is enqueued in the
/// same commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub code: CodeTemplate,
    pub order_status: Option<OrderStatus>,
    pub policy_status: Option<PolicyStatus>,
    pub enqueue: Option<TaskKind>,
}

impl Activation {
    pub fn new(code: CodeTemplate) -> Self {
        Self {
            code,
            order_status: None,
            policy_status: None,
            enqueue: None,
        }
    }

    pub fn with_order_status(mut self, status: OrderStatus) -> Self {
        self.order_status = Some(status);
        self
    }

    pub fn with_policy_status(mut self, status: PolicyStatus) -> Self {
        self.policy_status = Some(status);
        self
    }

    pub fn with_task(mut self, kind: TaskKind) -> Self {
        self.enqueue = Some(kind);
        self
    }
}

/// Everything written by one creating transaction.
#[derive(Debug, Clone)]
pub struct NewIssuance {
    pub order: NewOrder,
    pub policy: NewPolicy,
    pub details: Vec<PolicyDetail>,
    pub type_detail: TypeSpecificDetail,
    /// `None` leaves the order unverified with no stored code.
    pub activation: Option<Activation>,
}

/// What a committed creating transaction assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedIssuance {
    pub order_id: OrderId,
    pub policy_id: PolicyId,
    /// The stored code, when the issuance carried an activation.
    pub policy_code: Option<String>,
}

/// A set of post-creation changes applied to an order and its policy in one
/// unit of work.
///
/// Status changes are checked against the forward-only transition rules;
/// setting a status to its current value is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub order_id: OrderId,
    pub policy_id: PolicyId,
    pub policy_code: Option<String>,
    pub order_status: Option<OrderStatus>,
    pub policy_status: Option<PolicyStatus>,
    pub tracking_number: Option<String>,
    /// Outbox task to enqueue alongside the update.
    pub enqueue: Option<TaskKind>,
}

impl StatusUpdate {
    pub fn new(order_id: OrderId, policy_id: PolicyId) -> Self {
        Self {
            order_id,
            policy_id,
            policy_code: None,
            order_status: None,
            policy_status: None,
            tracking_number: None,
            enqueue: None,
        }
    }

    pub fn with_policy_code(mut self, code: impl Into<String>) -> Self {
        self.policy_code = Some(code.into());
        self
    }

    pub fn with_order_status(mut self, status: OrderStatus) -> Self {
        self.order_status = Some(status);
        self
    }

    pub fn with_policy_status(mut self, status: PolicyStatus) -> Self {
        self.policy_status = Some(status);
        self
    }

    pub fn with_tracking_number(mut self, tracking_number: impl Into<String>) -> Self {
        self.tracking_number = Some(tracking_number.into());
        self
    }

    pub fn with_task(mut self, kind: TaskKind) -> Self {
        self.enqueue = Some(kind);
        self
    }
}

/// Checks an order status change, treating an unchanged status as allowed.
pub fn check_order_transition(from: OrderStatus, to: OrderStatus) -> Result<()> {
    if from == to || from.can_transition_to(to) {
        return Ok(());
    }
    Err(StoreError::InvalidTransition {
        entity: "order",
        from: from.to_string(),
        to: to.to_string(),
    })
}

/// Checks a policy status change, treating an unchanged status as allowed.
pub fn check_policy_transition(from: PolicyStatus, to: PolicyStatus) -> Result<()> {
    if from == to || from.can_transition_to(to) {
        return Ok(());
    }
    Err(StoreError::InvalidTransition {
        entity: "policy",
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
    })
}

/// Persistence for orders, policies, read-only reference data and the
/// outbox.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn find_branch(&self, id: i64) -> Result<Option<Branch>>;

    /// Looks up a branch by exact name.
    async fn find_branch_by_name(&self, name: &str) -> Result<Option<Branch>>;

    async fn find_payment_mode(&self, id: i64) -> Result<Option<PaymentMode>>;

    async fn find_city(&self, id: i64) -> Result<Option<City>>;

    async fn find_sku_mapping(&self, parent_sku: &str, sku: &str) -> Result<Option<SkuMapping>>;

    /// Looks up a product together with its category.
    async fn find_product(&self, id: i64) -> Result<Option<Product>>;

    async fn find_plan(&self, id: i64) -> Result<Option<Plan>>;

    /// Writes the order, policy, insured parties, type-specific detail and
    /// activation atomically.
    ///
    /// The order is inserted as `pending` and moved to `unverified` before
    /// the activation is applied. Fails with `DuplicateOrderCode` if the code
    /// is taken, in which case nothing is written.
    async fn create_issuance(&self, issuance: NewIssuance) -> Result<CreatedIssuance>;

    async fn find_order_by_code(&self, order_code: &str) -> Result<Option<Order>>;

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn find_policy_by_order(&self, order_id: OrderId) -> Result<Option<Policy>>;

    async fn policy_details(&self, policy_id: PolicyId) -> Result<Vec<PolicyDetail>>;

    async fn type_specific_detail(&self, policy_id: PolicyId) -> Result<TypeSpecificDetail>;

    /// Applies a status update, and enqueues its outbox task if any, in one
    /// unit of work.
    async fn apply_status_update(&self, update: StatusUpdate) -> Result<()>;

    /// Records the card gateway's transaction id and approval code.
    async fn record_card_transaction(
        &self,
        order_id: OrderId,
        transaction_id: Option<String>,
        approval_code: Option<String>,
    ) -> Result<()>;

    async fn enqueue_task(&self, task: OutboxTask) -> Result<()>;

    /// Claims up to `limit` due tasks.
    ///
    /// Each claimed task has its attempt count incremented and is hidden
    /// from other claimers until `now + lease`.
    async fn claim_due_tasks(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: usize,
    ) -> Result<Vec<OutboxTask>>;

    async fn complete_task(&self, id: TaskId) -> Result<()>;

    /// Records a failed attempt.
    ///
    /// With `retry_at` the task goes back to pending at that time; without
    /// it the task is marked failed.
    async fn fail_task(
        &self,
        id: TaskId,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Makes the order's task of `kind` due at `now` with a fresh attempt
    /// budget, creating it if none exists.
    async fn requeue_task(
        &self,
        order_id: OrderId,
        kind: TaskKind,
        now: DateTime<Utc>,
    ) -> Result<OutboxTask>;

    async fn tasks_for_order(&self, order_id: OrderId) -> Result<Vec<OutboxTask>>;
}

/// Extension trait providing convenience methods for policy stores.
#[async_trait]
pub trait PolicyStoreExt: PolicyStore {
    /// Loads an order by code, failing if it does not exist.
    async fn require_order_by_code(&self, order_code: &str) -> Result<Order> {
        self.find_order_by_code(order_code)
            .await?
            .ok_or_else(|| StoreError::not_found("order", order_code))
    }

    /// Loads the policy owned by an order, failing if it does not exist.
    async fn require_policy_by_order(&self, order_id: OrderId) -> Result<Policy> {
        self.find_policy_by_order(order_id)
            .await?
            .ok_or_else(|| StoreError::not_found("policy for order", order_id))
    }

    /// Checks if an order code is already taken.
    async fn order_code_exists(&self, order_code: &str) -> Result<bool> {
        Ok(self.find_order_by_code(order_code).await?.is_some())
    }
}

// Blanket implementation for all PolicyStore implementations
impl<T: PolicyStore + ?Sized> PolicyStoreExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unchanged_status_is_allowed() {
        assert!(check_order_transition(OrderStatus::PendingCod, OrderStatus::PendingCod).is_ok());
        assert!(
            check_policy_transition(PolicyStatus::PendingCod, PolicyStatus::PendingCod).is_ok()
        );
    }

    #[test]
    fn test_backwards_status_is_rejected() {
        let err = check_order_transition(OrderStatus::Verified, OrderStatus::Unverified)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { entity: "order", .. }));

        let err = check_policy_transition(PolicyStatus::PendingCbo, PolicyStatus::PendingCod)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { entity: "policy", .. }));
    }

    #[test]
    fn test_activation_builder() {
        let template = CodeTemplate {
            product_type: domain::ProductType::Health,
            product_name: "Personal Care".to_string(),
            plan_name: "Gold".to_string(),
            takaful: false,
            branch_codes: domain::BranchCodes::new("DIR", "DIT"),
            category_code: 1,
        };
        let activation = Activation::new(template)
            .with_order_status(OrderStatus::Verified)
            .with_policy_status(PolicyStatus::PendingCbo);

        assert_eq!(activation.order_status, Some(OrderStatus::Verified));
        assert_eq!(activation.policy_status, Some(PolicyStatus::PendingCbo));
        assert_eq!(activation.enqueue, None);
        assert_eq!(activation.code.code_for(PolicyId::new(3)), "910510000003");
    }

    #[test]
    fn test_status_update_builder() {
        let update = StatusUpdate::new(OrderId::new(1), PolicyId::new(2))
            .with_policy_code("910510000002")
            .with_order_status(OrderStatus::Verified)
            .with_task(TaskKind::CourierBooking);

        assert_eq!(update.policy_code.as_deref(), Some("910510000002"));
        assert_eq!(update.order_status, Some(OrderStatus::Verified));
        assert_eq!(update.policy_status, None);
        assert_eq!(update.enqueue, Some(TaskKind::CourierBooking));
    }
}
