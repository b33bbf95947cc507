use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{OrderId, PolicyId, TaskId};
use domain::{
    Branch, City, Order, OrderStatus, PaymentMode, Plan, Policy, PolicyDetail, PolicyStatus,
    Product, SkuMapping, TypeSpecificDetail,
};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::outbox::{OutboxTask, TaskKind, TaskStatus};
use crate::store::{
    CreatedIssuance, NewIssuance, PolicyStore, StatusUpdate, check_order_transition,
    check_policy_transition,
};
use crate::{Result, StoreError};

#[derive(Default)]
struct State {
    branches: HashMap<i64, Branch>,
    payment_modes: HashMap<i64, PaymentMode>,
    cities: HashMap<i64, City>,
    products: HashMap<i64, Product>,
    plans: HashMap<i64, Plan>,
    sku_mappings: HashMap<(String, String), SkuMapping>,
    orders: BTreeMap<OrderId, Order>,
    policies: BTreeMap<PolicyId, Policy>,
    details: HashMap<PolicyId, Vec<PolicyDetail>>,
    type_details: HashMap<PolicyId, TypeSpecificDetail>,
    tasks: Vec<OutboxTask>,
    last_order_id: i64,
    last_policy_id: i64,
    write_delay: Option<std::time::Duration>,
    failing_status_updates: usize,
}

/// Reference rows for seeding an in-memory store, typically parsed from a
/// JSON fixture.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReferenceData {
    pub branches: Vec<Branch>,
    pub payment_modes: Vec<PaymentMode>,
    pub cities: Vec<City>,
    pub products: Vec<Product>,
    pub plans: Vec<Plan>,
    pub sku_mappings: Vec<SkuMapping>,
}

impl ReferenceData {
    /// Parses reference data from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// In-memory policy store for tests and for running without a database.
///
/// A single lock guards all tables, so every operation is atomic with
/// respect to the others.
#[derive(Clone, Default)]
pub struct InMemoryPolicyStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryPolicyStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_branch(&self, branch: Branch) {
        self.state.write().await.branches.insert(branch.id, branch);
    }

    pub async fn insert_payment_mode(&self, mode: PaymentMode) {
        self.state.write().await.payment_modes.insert(mode.id, mode);
    }

    pub async fn insert_city(&self, city: City) {
        self.state.write().await.cities.insert(city.id, city);
    }

    pub async fn insert_product(&self, product: Product) {
        self.state.write().await.products.insert(product.id, product);
    }

    pub async fn insert_plan(&self, plan: Plan) {
        self.state.write().await.plans.insert(plan.id, plan);
    }

    pub async fn insert_sku_mapping(&self, mapping: SkuMapping) {
        let key = (mapping.parent_sku.clone(), mapping.child_sku.clone());
        self.state.write().await.sku_mappings.insert(key, mapping);
    }

    /// Loads every reference row in `data`, replacing rows with the same key.
    pub async fn seed(&self, data: ReferenceData) {
        let mut state = self.state.write().await;
        state
            .branches
            .extend(data.branches.into_iter().map(|b| (b.id, b)));
        state
            .payment_modes
            .extend(data.payment_modes.into_iter().map(|m| (m.id, m)));
        state.cities.extend(data.cities.into_iter().map(|c| (c.id, c)));
        state
            .products
            .extend(data.products.into_iter().map(|p| (p.id, p)));
        state.plans.extend(data.plans.into_iter().map(|p| (p.id, p)));
        state.sku_mappings.extend(
            data.sku_mappings
                .into_iter()
                .map(|m| ((m.parent_sku.clone(), m.child_sku.clone()), m)),
        );
    }

    /// Makes the next created policy receive `id`.
    pub async fn set_next_policy_id(&self, id: i64) {
        self.state.write().await.last_policy_id = id - 1;
    }

    /// Delays every creating transaction while it holds the lock, before
    /// anything is written.
    pub async fn set_write_delay(&self, delay: Option<std::time::Duration>) {
        self.state.write().await.write_delay = delay;
    }

    /// Makes the next `count` status updates fail as if the database were
    /// unreachable.
    pub async fn set_failing_status_updates(&self, count: usize) {
        self.state.write().await.failing_status_updates = count;
    }

    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    pub async fn policy_count(&self) -> usize {
        self.state.read().await.policies.len()
    }

    /// Clears all orders, policies and tasks, keeping reference data.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.orders.clear();
        state.policies.clear();
        state.details.clear();
        state.type_details.clear();
        state.tasks.clear();
    }
}

impl State {
    /// Resets the order's task of `kind` to pending, or creates it.
    fn upsert_task(
        &mut self,
        order_id: OrderId,
        kind: TaskKind,
        now: DateTime<Utc>,
    ) -> OutboxTask {
        if let Some(task) = self
            .tasks
            .iter_mut()
            .find(|t| t.order_id == order_id && t.kind == kind)
        {
            task.status = TaskStatus::Pending;
            task.attempts = 0;
            task.next_attempt_at = now;
            return task.clone();
        }

        let task = OutboxTask::new(kind, order_id, now);
        self.tasks.push(task.clone());
        task
    }

    fn task_mut(&mut self, id: TaskId) -> Result<&mut OutboxTask> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::TaskNotFound(id))
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn find_branch(&self, id: i64) -> Result<Option<Branch>> {
        Ok(self.state.read().await.branches.get(&id).cloned())
    }

    async fn find_branch_by_name(&self, name: &str) -> Result<Option<Branch>> {
        let state = self.state.read().await;
        Ok(state.branches.values().find(|b| b.name == name).cloned())
    }

    async fn find_payment_mode(&self, id: i64) -> Result<Option<PaymentMode>> {
        Ok(self.state.read().await.payment_modes.get(&id).cloned())
    }

    async fn find_city(&self, id: i64) -> Result<Option<City>> {
        Ok(self.state.read().await.cities.get(&id).cloned())
    }

    async fn find_sku_mapping(&self, parent_sku: &str, sku: &str) -> Result<Option<SkuMapping>> {
        let key = (parent_sku.to_string(), sku.to_string());
        Ok(self.state.read().await.sku_mappings.get(&key).cloned())
    }

    async fn find_product(&self, id: i64) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn find_plan(&self, id: i64) -> Result<Option<Plan>> {
        Ok(self.state.read().await.plans.get(&id).cloned())
    }

    async fn create_issuance(&self, issuance: NewIssuance) -> Result<CreatedIssuance> {
        let mut state = self.state.write().await;

        if let Some(delay) = state.write_delay {
            tokio::time::sleep(delay).await;
        }

        let NewIssuance {
            order,
            policy,
            details,
            type_detail,
            activation,
        } = issuance;

        if state
            .orders
            .values()
            .any(|o| o.order_code == order.order_code)
        {
            return Err(StoreError::DuplicateOrderCode(order.order_code));
        }

        state.last_order_id += 1;
        state.last_policy_id += 1;
        let order_id = OrderId::new(state.last_order_id);
        let policy_id = PolicyId::new(state.last_policy_id);

        let mut record = Order {
            id: order_id,
            order_code: order.order_code,
            customer: order.customer,
            channel: order.channel,
            payment_mode_id: order.payment_mode_id,
            branch_id: order.branch_id,
            city_id: order.city_id,
            received_premium: order.received_premium,
            discount_amount: order.discount_amount,
            shipping: order.shipping,
            status: OrderStatus::Pending,
            tracking_number: None,
            transaction_id: None,
            approval_code: None,
            created_at: Utc::now(),
        };
        check_order_transition(record.status, OrderStatus::Unverified)?;
        record.status = OrderStatus::Unverified;

        let mut policy = Policy {
            id: policy_id,
            order_id,
            plan_id: policy.plan_id,
            product_id: policy.product_id,
            option_id: policy.option_id,
            parent_sku: policy.parent_sku,
            sku: policy.sku,
            policy_code: None,
            status: PolicyStatus::Unverified,
            takaful_policy: policy.takaful_policy,
            sum_insured: policy.sum_insured,
            received_premium: policy.received_premium,
            item_price: policy.item_price,
            quantity: policy.quantity,
        };

        let mut policy_code = None;
        if let Some(activation) = &activation {
            if let Some(next) = activation.order_status {
                check_order_transition(record.status, next)?;
                record.status = next;
            }
            if let Some(next) = activation.policy_status {
                check_policy_transition(policy.status, next)?;
                policy.status = next;
            }
            let code = activation.code.code_for(policy_id);
            policy.policy_code = Some(code.clone());
            policy_code = Some(code);
        }

        state.orders.insert(order_id, record);
        state.policies.insert(policy_id, policy);
        state.details.insert(policy_id, details);
        state.type_details.insert(policy_id, type_detail);
        if let Some(kind) = activation.and_then(|a| a.enqueue) {
            state.upsert_task(order_id, kind, Utc::now());
        }

        Ok(CreatedIssuance {
            order_id,
            policy_id,
            policy_code,
        })
    }

    async fn find_order_by_code(&self, order_code: &str) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|o| o.order_code == order_code)
            .cloned())
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn find_policy_by_order(&self, order_id: OrderId) -> Result<Option<Policy>> {
        let state = self.state.read().await;
        Ok(state
            .policies
            .values()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn policy_details(&self, policy_id: PolicyId) -> Result<Vec<PolicyDetail>> {
        let state = self.state.read().await;
        Ok(state.details.get(&policy_id).cloned().unwrap_or_default())
    }

    async fn type_specific_detail(&self, policy_id: PolicyId) -> Result<TypeSpecificDetail> {
        let state = self.state.read().await;
        Ok(state
            .type_details
            .get(&policy_id)
            .cloned()
            .unwrap_or(TypeSpecificDetail::None))
    }

    async fn apply_status_update(&self, update: StatusUpdate) -> Result<()> {
        let mut state = self.state.write().await;
        if state.failing_status_updates > 0 {
            state.failing_status_updates -= 1;
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        let order = state
            .orders
            .get(&update.order_id)
            .ok_or_else(|| StoreError::not_found("order", update.order_id))?;
        if let Some(next) = update.order_status {
            check_order_transition(order.status, next)?;
        }
        let policy = state
            .policies
            .get(&update.policy_id)
            .filter(|p| p.order_id == update.order_id)
            .ok_or_else(|| StoreError::not_found("policy", update.policy_id))?;
        if let Some(next) = update.policy_status {
            check_policy_transition(policy.status, next)?;
        }

        if let Some(order) = state.orders.get_mut(&update.order_id) {
            if let Some(status) = update.order_status {
                order.status = status;
            }
            if let Some(tracking_number) = update.tracking_number {
                order.tracking_number = Some(tracking_number);
            }
        }
        if let Some(policy) = state.policies.get_mut(&update.policy_id) {
            if let Some(status) = update.policy_status {
                policy.status = status;
            }
            if let Some(code) = update.policy_code {
                policy.policy_code = Some(code);
            }
        }
        if let Some(kind) = update.enqueue {
            state.upsert_task(update.order_id, kind, Utc::now());
        }

        Ok(())
    }

    async fn record_card_transaction(
        &self,
        order_id: OrderId,
        transaction_id: Option<String>,
        approval_code: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::not_found("order", order_id))?;
        order.transaction_id = transaction_id;
        order.approval_code = approval_code;
        Ok(())
    }

    async fn enqueue_task(&self, task: OutboxTask) -> Result<()> {
        let mut state = self.state.write().await;
        if !state
            .tasks
            .iter()
            .any(|t| t.order_id == task.order_id && t.kind == task.kind)
        {
            state.tasks.push(task);
        }
        Ok(())
    }

    async fn claim_due_tasks(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: usize,
    ) -> Result<Vec<OutboxTask>> {
        let mut state = self.state.write().await;
        let mut due: Vec<&mut OutboxTask> =
            state.tasks.iter_mut().filter(|t| t.is_due(now)).collect();
        due.sort_by_key(|t| t.next_attempt_at);

        Ok(due
            .into_iter()
            .take(limit)
            .map(|task| {
                task.attempts += 1;
                task.next_attempt_at = now + lease;
                task.clone()
            })
            .collect())
    }

    async fn complete_task(&self, id: TaskId) -> Result<()> {
        let mut state = self.state.write().await;
        let task = state.task_mut(id)?;
        task.status = TaskStatus::Done;
        task.last_error = None;
        Ok(())
    }

    async fn fail_task(
        &self,
        id: TaskId,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let task = state.task_mut(id)?;
        task.last_error = Some(error.to_string());
        match retry_at {
            Some(at) => {
                task.status = TaskStatus::Pending;
                task.next_attempt_at = at;
            }
            None => task.status = TaskStatus::Failed,
        }
        Ok(())
    }

    async fn requeue_task(
        &self,
        order_id: OrderId,
        kind: TaskKind,
        now: DateTime<Utc>,
    ) -> Result<OutboxTask> {
        let mut state = self.state.write().await;
        if !state.orders.contains_key(&order_id) {
            return Err(StoreError::not_found("order", order_id));
        }

        Ok(state.upsert_task(order_id, kind, now))
    }

    async fn tasks_for_order(&self, order_id: OrderId) -> Result<Vec<OutboxTask>> {
        let state = self.state.read().await;
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect())
    }
}
