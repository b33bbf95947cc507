use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{OrderId, PolicyId, TaskId};
use domain::{
    Branch, BranchCodes, City, CustomerContact, HomecareDetail, InsuredPartyKind, Money, Order,
    OrderStatus, PaymentMode, PaymentModeCode, Plan, Policy, PolicyDetail, PolicyStatus, Product,
    ProductCategory, ProductType, PurchaseProtectionDetail, ShippingDetails, SkuMapping,
    TravelDetail, TypeSpecificDetail,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::outbox::{OutboxTask, TaskKind, TaskStatus};
use crate::store::{
    CreatedIssuance, NewIssuance, PolicyStore, StatusUpdate, check_order_transition,
    check_policy_transition,
};
use crate::{Result, StoreError};

const ORDER_CODE_CONSTRAINT: &str = "orders_order_code_key";

const ORDER_COLUMNS: &str = "id, order_code, customer_name, customer_email, customer_phone, \
     customer_cnic, customer_address, channel, payment_mode_id, branch_id, city_id, \
     received_premium, discount_amount, shipping_name, shipping_address, shipping_phone, \
     status, tracking_number, transaction_id, approval_code, created_at";

const POLICY_COLUMNS: &str = "id, order_id, plan_id, product_id, option_id, parent_sku, sku, \
     policy_code, status, takaful_policy, sum_insured, received_premium, item_price, quantity";

const TASK_COLUMNS: &str =
    "id, kind, order_id, status, attempts, last_error, next_attempt_at, created_at";

/// PostgreSQL-backed policy store implementation.
#[derive(Clone)]
pub struct PgPolicyStore {
    pool: PgPool,
    statement_timeout: Option<StdDuration>,
}

impl PgPolicyStore {
    /// Creates a new PostgreSQL policy store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: None,
        }
    }

    /// Bounds every statement of the creating transaction.
    pub fn with_statement_timeout(mut self, timeout: StdDuration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        if let Some(timeout) = self.statement_timeout {
            sqlx::query("SELECT set_config('statement_timeout', $1, true)")
                .bind(format!("{}ms", timeout.as_millis()))
                .execute(&mut *tx)
                .await?;
        }
        Ok(tx)
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let shipping = match (
            row.try_get::<Option<String>, _>("shipping_name")?,
            row.try_get::<Option<String>, _>("shipping_address")?,
            row.try_get::<Option<String>, _>("shipping_phone")?,
        ) {
            (Some(recipient_name), Some(address), Some(phone)) => Some(ShippingDetails {
                recipient_name,
                address,
                phone,
            }),
            _ => None,
        };

        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            order_code: row.try_get("order_code")?,
            customer: CustomerContact {
                name: row.try_get("customer_name")?,
                email: row.try_get("customer_email")?,
                phone: row.try_get("customer_phone")?,
                cnic: row.try_get("customer_cnic")?,
                address: row.try_get("customer_address")?,
            },
            channel: row.try_get("channel")?,
            payment_mode_id: row.try_get("payment_mode_id")?,
            branch_id: row.try_get("branch_id")?,
            city_id: row.try_get("city_id")?,
            received_premium: Money::from_minor(row.try_get("received_premium")?),
            discount_amount: Money::from_minor(row.try_get("discount_amount")?),
            shipping,
            status: OrderStatus::parse(&status).ok_or_else(|| StoreError::InvalidValue {
                column: "orders.status",
                value: status.clone(),
            })?,
            tracking_number: row.try_get("tracking_number")?,
            transaction_id: row.try_get("transaction_id")?,
            approval_code: row.try_get("approval_code")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_policy(row: PgRow) -> Result<Policy> {
        let status: String = row.try_get("status")?;
        Ok(Policy {
            id: PolicyId::new(row.try_get("id")?),
            order_id: OrderId::new(row.try_get("order_id")?),
            plan_id: row.try_get("plan_id")?,
            product_id: row.try_get("product_id")?,
            option_id: row.try_get("option_id")?,
            parent_sku: row.try_get("parent_sku")?,
            sku: row.try_get("sku")?,
            policy_code: row.try_get("policy_code")?,
            status: PolicyStatus::parse(&status).ok_or_else(|| StoreError::InvalidValue {
                column: "policies.status",
                value: status.clone(),
            })?,
            takaful_policy: row.try_get("takaful_policy")?,
            sum_insured: Money::from_minor(row.try_get("sum_insured")?),
            received_premium: Money::from_minor(row.try_get("received_premium")?),
            item_price: Money::from_minor(row.try_get("item_price")?),
            quantity: to_u32("policies.quantity", row.try_get("quantity")?)?,
        })
    }

    fn row_to_detail(row: PgRow) -> Result<PolicyDetail> {
        let tag: String = row.try_get("detail_type")?;
        let kind = InsuredPartyKind::try_from(tag.clone()).map_err(|_| StoreError::InvalidValue {
            column: "policy_details.detail_type",
            value: tag,
        })?;
        let age: Option<i32> = row.try_get("age")?;

        Ok(PolicyDetail {
            kind,
            name: row.try_get("name")?,
            cnic: row.try_get("cnic")?,
            date_of_birth: row.try_get("date_of_birth")?,
            age: age.map(|a| to_u32("policy_details.age", a)).transpose()?,
            gender: row.try_get("gender")?,
            relation: row.try_get("relation")?,
            phone: row.try_get("phone")?,
            email: row.try_get("email")?,
        })
    }

    fn row_to_task(row: PgRow) -> Result<OutboxTask> {
        let kind: String = row.try_get("kind")?;
        let status: String = row.try_get("status")?;
        Ok(OutboxTask {
            id: TaskId::from_uuid(row.try_get::<Uuid, _>("id")?),
            kind: TaskKind::parse(&kind).ok_or_else(|| StoreError::InvalidValue {
                column: "outbox_tasks.kind",
                value: kind.clone(),
            })?,
            order_id: OrderId::new(row.try_get("order_id")?),
            status: TaskStatus::parse(&status).ok_or_else(|| StoreError::InvalidValue {
                column: "outbox_tasks.status",
                value: status.clone(),
            })?,
            attempts: to_u32("outbox_tasks.attempts", row.try_get("attempts")?)?,
            last_error: row.try_get("last_error")?,
            next_attempt_at: row.try_get("next_attempt_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn upsert_task(
        tx: &mut Transaction<'static, Postgres>,
        order_id: OrderId,
        kind: TaskKind,
        now: DateTime<Utc>,
    ) -> Result<OutboxTask> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO outbox_tasks (id, kind, order_id, status, attempts, next_attempt_at, created_at)
            VALUES ($1, $2, $3, 'pending', 0, $4, $4)
            ON CONFLICT (order_id, kind) DO UPDATE SET
                status = 'pending',
                attempts = 0,
                next_attempt_at = EXCLUDED.next_attempt_at
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(TaskId::new().as_uuid())
        .bind(kind.as_str())
        .bind(order_id.as_i64())
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        Self::row_to_task(row)
    }
}

fn to_u32(column: &'static str, value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::InvalidValue {
        column,
        value: value.to_string(),
    })
}

fn to_i32(column: &'static str, value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::InvalidValue {
        column,
        value: value.to_string(),
    })
}

fn map_order_insert_error(error: sqlx::Error, order_code: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = error
        && db_err.constraint() == Some(ORDER_CODE_CONSTRAINT)
    {
        return StoreError::DuplicateOrderCode(order_code.to_string());
    }
    StoreError::Database(error)
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn find_branch(&self, id: i64) -> Result<Option<Branch>> {
        let row = sqlx::query("SELECT id, name, code, takaful_code FROM branches WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_branch).transpose()
    }

    async fn find_branch_by_name(&self, name: &str) -> Result<Option<Branch>> {
        let row = sqlx::query(
            "SELECT id, name, code, takaful_code FROM branches WHERE name = $1 ORDER BY id LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_branch).transpose()
    }

    async fn find_payment_mode(&self, id: i64) -> Result<Option<PaymentMode>> {
        let row = sqlx::query("SELECT id, name, code FROM payment_modes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(PaymentMode {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                code: PaymentModeCode::parse(&row.try_get::<String, _>("code")?),
            })),
            None => Ok(None),
        }
    }

    async fn find_city(&self, id: i64) -> Result<Option<City>> {
        let row = sqlx::query("SELECT id, name FROM cities WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(City {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
            })),
            None => Ok(None),
        }
    }

    async fn find_sku_mapping(&self, parent_sku: &str, sku: &str) -> Result<Option<SkuMapping>> {
        let row = sqlx::query(
            r#"
            SELECT parent_sku, child_sku, plan_id, product_id, option_id
            FROM sku_mappings
            WHERE parent_sku = $1 AND child_sku = $2
            "#,
        )
        .bind(parent_sku)
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(SkuMapping {
                parent_sku: row.try_get("parent_sku")?,
                child_sku: row.try_get("child_sku")?,
                plan_id: row.try_get("plan_id")?,
                product_id: row.try_get("product_id")?,
                option_id: row.try_get("option_id")?,
            })),
            None => Ok(None),
        }
    }

    async fn find_product(&self, id: i64) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT p.id, p.name, p.product_type,
                   c.id AS category_id, c.name AS category_name, c.code AS category_code
            FROM products p
            JOIN product_categories c ON c.id = p.category_id
            WHERE p.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Product {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                product_type: ProductType::parse(&row.try_get::<String, _>("product_type")?),
                category: ProductCategory {
                    id: row.try_get("category_id")?,
                    name: row.try_get("category_name")?,
                    code: row.try_get("category_code")?,
                },
            })),
            None => Ok(None),
        }
    }

    async fn find_plan(&self, id: i64) -> Result<Option<Plan>> {
        let row = sqlx::query("SELECT id, name FROM plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Plan {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
            })),
            None => Ok(None),
        }
    }

    async fn create_issuance(&self, issuance: NewIssuance) -> Result<CreatedIssuance> {
        let NewIssuance {
            order,
            policy,
            details,
            type_detail,
            activation,
        } = issuance;

        let mut tx = self.begin().await?;

        // Race protection; the unique constraint is the final guard
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM orders WHERE order_code = $1 FOR UPDATE")
                .bind(&order.order_code)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(StoreError::DuplicateOrderCode(order.order_code));
        }

        let shipping = order.shipping.as_ref();
        let order_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (
                order_code, customer_name, customer_email, customer_phone, customer_cnic,
                customer_address, channel, payment_mode_id, branch_id, city_id,
                received_premium, discount_amount, shipping_name, shipping_address,
                shipping_phone, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING id
            "#,
        )
        .bind(&order.order_code)
        .bind(&order.customer.name)
        .bind(order.customer.email.as_deref())
        .bind(&order.customer.phone)
        .bind(order.customer.cnic.as_deref())
        .bind(order.customer.address.as_deref())
        .bind(&order.channel)
        .bind(order.payment_mode_id)
        .bind(order.branch_id)
        .bind(order.city_id)
        .bind(order.received_premium.minor())
        .bind(order.discount_amount.minor())
        .bind(shipping.map(|s| s.recipient_name.as_str()))
        .bind(shipping.map(|s| s.address.as_str()))
        .bind(shipping.map(|s| s.phone.as_str()))
        .bind(OrderStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_order_insert_error(e, &order.order_code))?;

        let policy_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO policies (
                order_id, plan_id, product_id, option_id, parent_sku, sku, status,
                takaful_policy, sum_insured, received_premium, item_price, quantity
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id
            "#,
        )
        .bind(order_id)
        .bind(policy.plan_id)
        .bind(policy.product_id)
        .bind(policy.option_id)
        .bind(&policy.parent_sku)
        .bind(&policy.sku)
        .bind(PolicyStatus::Unverified.as_str())
        .bind(policy.takaful_policy)
        .bind(policy.sum_insured.minor())
        .bind(policy.received_premium.minor())
        .bind(policy.item_price.minor())
        .bind(to_i32("policies.quantity", policy.quantity)?)
        .fetch_one(&mut *tx)
        .await?;

        for detail in &details {
            let age = detail
                .age
                .map(|a| to_i32("policy_details.age", a))
                .transpose()?;
            sqlx::query(
                r#"
                INSERT INTO policy_details (
                    policy_id, detail_type, name, cnic, date_of_birth, age, gender,
                    relation, phone, email
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(policy_id)
            .bind(detail.kind.as_tag())
            .bind(&detail.name)
            .bind(detail.cnic.as_deref())
            .bind(detail.date_of_birth)
            .bind(age)
            .bind(detail.gender.as_deref())
            .bind(detail.relation.as_deref())
            .bind(detail.phone.as_deref())
            .bind(detail.email.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        match &type_detail {
            TypeSpecificDetail::Travel(travel) => {
                sqlx::query(
                    r#"
                    INSERT INTO policy_travel (
                        policy_id, origin, destination, travel_days, tuition_fee,
                        start_date, end_date
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(policy_id)
                .bind(&travel.origin)
                .bind(&travel.destination)
                .bind(to_i32("policy_travel.travel_days", travel.travel_days)?)
                .bind(travel.tuition_fee)
                .bind(travel.start_date)
                .bind(travel.end_date)
                .execute(&mut *tx)
                .await?;
            }
            TypeSpecificDetail::Home(homes) => {
                for home in homes {
                    sqlx::query(
                        r#"
                        INSERT INTO policy_homecare (
                            policy_id, ownership_status, structure_type, plot_area, address, city
                        )
                        VALUES ($1, $2, $3, $4, $5, $6)
                        "#,
                    )
                    .bind(policy_id)
                    .bind(&home.ownership_status)
                    .bind(&home.structure_type)
                    .bind(&home.plot_area)
                    .bind(&home.address)
                    .bind(&home.city)
                    .execute(&mut *tx)
                    .await?;
                }
            }
            TypeSpecificDetail::PurchaseProtection(item) => {
                sqlx::query(
                    r#"
                    INSERT INTO policy_purchase_protection (
                        policy_id, name, duration, duration_type, total_price, brand, model,
                        serial_number
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(policy_id)
                .bind(&item.name)
                .bind(to_i32("policy_purchase_protection.duration", item.duration)?)
                .bind(&item.duration_type)
                .bind(item.total_price.minor())
                .bind(item.brand.as_deref())
                .bind(item.model.as_deref())
                .bind(item.serial_number.as_deref())
                .execute(&mut *tx)
                .await?;
            }
            TypeSpecificDetail::None => {}
        }

        check_order_transition(OrderStatus::Pending, OrderStatus::Unverified)?;
        let mut order_status = OrderStatus::Unverified;
        let mut policy_status = PolicyStatus::Unverified;
        let mut policy_code = None;
        if let Some(activation) = &activation {
            if let Some(next) = activation.order_status {
                check_order_transition(order_status, next)?;
                order_status = next;
            }
            if let Some(next) = activation.policy_status {
                check_policy_transition(policy_status, next)?;
                policy_status = next;
            }
            policy_code = Some(activation.code.code_for(PolicyId::new(policy_id)));
        }

        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(order_id)
            .bind(order_status.as_str())
            .execute(&mut *tx)
            .await?;

        if let Some(code) = &policy_code {
            sqlx::query("UPDATE policies SET status = $2, policy_code = $3 WHERE id = $1")
                .bind(policy_id)
                .bind(policy_status.as_str())
                .bind(code)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(kind) = activation.and_then(|a| a.enqueue) {
            Self::upsert_task(&mut tx, OrderId::new(order_id), kind, Utc::now()).await?;
        }

        tx.commit().await?;

        tracing::debug!(order_id, policy_id, ?policy_code, "issuance committed");
        Ok(CreatedIssuance {
            order_id: OrderId::new(order_id),
            policy_id: PolicyId::new(policy_id),
            policy_code,
        })
    }

    async fn find_order_by_code(&self, order_code: &str) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_code = $1"
        ))
        .bind(order_code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn find_policy_by_order(&self, order_id: OrderId) -> Result<Option<Policy>> {
        let row = sqlx::query(&format!(
            "SELECT {POLICY_COLUMNS} FROM policies WHERE order_id = $1"
        ))
        .bind(order_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_policy).transpose()
    }

    async fn policy_details(&self, policy_id: PolicyId) -> Result<Vec<PolicyDetail>> {
        let rows = sqlx::query(
            r#"
            SELECT detail_type, name, cnic, date_of_birth, age, gender, relation, phone, email
            FROM policy_details
            WHERE policy_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(policy_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_detail).collect()
    }

    async fn type_specific_detail(&self, policy_id: PolicyId) -> Result<TypeSpecificDetail> {
        let id = policy_id.as_i64();

        if let Some(row) = sqlx::query(
            r#"
            SELECT origin, destination, travel_days, tuition_fee, start_date, end_date
            FROM policy_travel
            WHERE policy_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(TypeSpecificDetail::Travel(TravelDetail {
                origin: row.try_get("origin")?,
                destination: row.try_get("destination")?,
                travel_days: to_u32("policy_travel.travel_days", row.try_get("travel_days")?)?,
                tuition_fee: row.try_get("tuition_fee")?,
                start_date: row.try_get("start_date")?,
                end_date: row.try_get("end_date")?,
            }));
        }

        if let Some(row) = sqlx::query(
            r#"
            SELECT name, duration, duration_type, total_price, brand, model, serial_number
            FROM policy_purchase_protection
            WHERE policy_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(TypeSpecificDetail::PurchaseProtection(
                PurchaseProtectionDetail {
                    name: row.try_get("name")?,
                    duration: to_u32(
                        "policy_purchase_protection.duration",
                        row.try_get("duration")?,
                    )?,
                    duration_type: row.try_get("duration_type")?,
                    total_price: Money::from_minor(row.try_get("total_price")?),
                    brand: row.try_get("brand")?,
                    model: row.try_get("model")?,
                    serial_number: row.try_get("serial_number")?,
                },
            ));
        }

        let rows = sqlx::query(
            r#"
            SELECT ownership_status, structure_type, plot_area, address, city
            FROM policy_homecare
            WHERE policy_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(TypeSpecificDetail::None);
        }

        let homes = rows
            .into_iter()
            .map(|row| -> Result<HomecareDetail> {
                Ok(HomecareDetail {
                    ownership_status: row.try_get("ownership_status")?,
                    structure_type: row.try_get("structure_type")?,
                    plot_area: row.try_get("plot_area")?,
                    address: row.try_get("address")?,
                    city: row.try_get("city")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TypeSpecificDetail::Home(homes))
    }

    async fn apply_status_update(&self, update: StatusUpdate) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let order_status: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(update.order_id.as_i64())
                .fetch_optional(&mut *tx)
                .await?;
        let order_status =
            order_status.ok_or_else(|| StoreError::not_found("order", update.order_id))?;

        let policy_status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM policies WHERE id = $1 AND order_id = $2 FOR UPDATE",
        )
        .bind(update.policy_id.as_i64())
        .bind(update.order_id.as_i64())
        .fetch_optional(&mut *tx)
        .await?;
        let policy_status =
            policy_status.ok_or_else(|| StoreError::not_found("policy", update.policy_id))?;

        if let Some(next) = update.order_status {
            let current =
                OrderStatus::parse(&order_status).ok_or_else(|| StoreError::InvalidValue {
                    column: "orders.status",
                    value: order_status.clone(),
                })?;
            check_order_transition(current, next)?;
        }
        if let Some(next) = update.policy_status {
            let current =
                PolicyStatus::parse(&policy_status).ok_or_else(|| StoreError::InvalidValue {
                    column: "policies.status",
                    value: policy_status.clone(),
                })?;
            check_policy_transition(current, next)?;
        }

        sqlx::query(
            r#"
            UPDATE orders
            SET status = COALESCE($2, status),
                tracking_number = COALESCE($3, tracking_number)
            WHERE id = $1
            "#,
        )
        .bind(update.order_id.as_i64())
        .bind(update.order_status.map(|s| s.as_str()))
        .bind(update.tracking_number.as_deref())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE policies
            SET status = COALESCE($2, status),
                policy_code = COALESCE($3, policy_code)
            WHERE id = $1
            "#,
        )
        .bind(update.policy_id.as_i64())
        .bind(update.policy_status.map(|s| s.as_str()))
        .bind(update.policy_code.as_deref())
        .execute(&mut *tx)
        .await?;

        if let Some(kind) = update.enqueue {
            Self::upsert_task(&mut tx, update.order_id, kind, Utc::now()).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn record_card_transaction(
        &self,
        order_id: OrderId,
        transaction_id: Option<String>,
        approval_code: Option<String>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET transaction_id = $2, approval_code = $3 WHERE id = $1",
        )
        .bind(order_id.as_i64())
        .bind(transaction_id)
        .bind(approval_code)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("order", order_id));
        }
        Ok(())
    }

    async fn enqueue_task(&self, task: OutboxTask) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_tasks (id, kind, order_id, status, attempts, last_error, next_attempt_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_id, kind) DO NOTHING
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(task.kind.as_str())
        .bind(task.order_id.as_i64())
        .bind(task.status.as_str())
        .bind(to_i32("outbox_tasks.attempts", task.attempts)?)
        .bind(task.last_error.as_deref())
        .bind(task.next_attempt_at)
        .bind(task.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim_due_tasks(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: usize,
    ) -> Result<Vec<OutboxTask>> {
        let rows = sqlx::query(&format!(
            r#"
            UPDATE outbox_tasks
            SET attempts = attempts + 1,
                next_attempt_at = $2
            WHERE id IN (
                SELECT id FROM outbox_tasks
                WHERE status = 'pending' AND next_attempt_at <= $1
                ORDER BY next_attempt_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(now)
        .bind(now + lease)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_task).collect()
    }

    async fn complete_task(&self, id: TaskId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE outbox_tasks SET status = 'done', last_error = NULL WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TaskNotFound(id));
        }
        Ok(())
    }

    async fn fail_task(
        &self,
        id: TaskId,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let status = match retry_at {
            Some(_) => TaskStatus::Pending,
            None => TaskStatus::Failed,
        };
        let result = sqlx::query(
            r#"
            UPDATE outbox_tasks
            SET status = $2,
                last_error = $3,
                next_attempt_at = COALESCE($4, next_attempt_at)
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(error)
        .bind(retry_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TaskNotFound(id));
        }
        Ok(())
    }

    async fn requeue_task(
        &self,
        order_id: OrderId,
        kind: TaskKind,
        now: DateTime<Utc>,
    ) -> Result<OutboxTask> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1")
            .bind(order_id.as_i64())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::not_found("order", order_id));
        }

        let task = Self::upsert_task(&mut tx, order_id, kind, now).await?;
        tx.commit().await?;
        Ok(task)
    }

    async fn tasks_for_order(&self, order_id: OrderId) -> Result<Vec<OutboxTask>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM outbox_tasks WHERE order_id = $1 ORDER BY created_at ASC"
        ))
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_task).collect()
    }
}

fn row_to_branch(row: PgRow) -> Result<Branch> {
    Ok(Branch {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        codes: BranchCodes::new(
            row.try_get::<String, _>("code")?,
            row.try_get::<String, _>("takaful_code")?,
        ),
    })
}
