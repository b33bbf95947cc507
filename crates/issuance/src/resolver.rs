//! Reference resolution: the read-only lookups an issuance depends on.

use domain::{Branch, City, CodeTemplate, PaymentMode, Plan, Product, SkuMapping};
use policy_store::PolicyStore;

use crate::error::{IssuanceError, Result};

/// Keys to resolve for one order request.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceKeys<'a> {
    pub branch_id: Option<i64>,
    pub payment_mode_id: i64,
    pub parent_sku: &'a str,
    pub sku: &'a str,
    pub city_id: i64,
}

/// Everything the writer and code generator need from reference data.
#[derive(Debug, Clone)]
pub struct ResolvedReferences {
    pub branch: Branch,
    pub payment_mode: PaymentMode,
    pub mapping: SkuMapping,
    pub product: Product,
    pub plan: Plan,
    pub city: City,
}

impl ResolvedReferences {
    pub fn code_template(&self, takaful: bool) -> CodeTemplate {
        code_template(&self.product, &self.plan, &self.branch, takaful)
    }
}

/// Builds the policy code template from resolved reference rows.
pub fn code_template(
    product: &Product,
    plan: &Plan,
    branch: &Branch,
    takaful: bool,
) -> CodeTemplate {
    CodeTemplate {
        product_type: product.product_type.clone(),
        product_name: product.name.clone(),
        plan_name: plan.name.clone(),
        takaful,
        branch_codes: branch.codes.clone(),
        category_code: product.category.code,
    }
}

/// Resolves reference entities, running independent lookups concurrently.
#[derive(Clone)]
pub struct ReferenceResolver<S> {
    store: S,
    direct_branch_name: String,
}

impl<S: PolicyStore> ReferenceResolver<S> {
    pub fn new(store: S, direct_branch_name: impl Into<String>) -> Self {
        Self {
            store,
            direct_branch_name: direct_branch_name.into(),
        }
    }

    /// Resolves all references for a request.
    ///
    /// Branch, payment mode, SKU mapping and city are looked up together;
    /// the product and plan follow once the mapping is known.
    #[tracing::instrument(skip(self), fields(sku = keys.sku))]
    pub async fn resolve(&self, keys: &ReferenceKeys<'_>) -> Result<ResolvedReferences> {
        let (branch, payment_mode, mapping, city) = tokio::try_join!(
            self.branch(keys.branch_id),
            self.payment_mode(keys.payment_mode_id),
            self.sku_mapping(keys.parent_sku, keys.sku),
            self.city(keys.city_id),
        )?;

        let (product, plan) = tokio::try_join!(
            self.product(mapping.product_id),
            self.plan(mapping.plan_id),
        )?;

        Ok(ResolvedReferences {
            branch,
            payment_mode,
            mapping,
            product,
            plan,
            city,
        })
    }

    /// Resolves a branch by id, or the direct branch when no id is given.
    pub async fn branch(&self, id: Option<i64>) -> Result<Branch> {
        match id {
            Some(id) => self
                .store
                .find_branch(id)
                .await?
                .ok_or_else(|| IssuanceError::not_found("branch", id)),
            None => {
                tracing::debug!(branch = %self.direct_branch_name, "no branch supplied, using fallback");
                self.store
                    .find_branch_by_name(&self.direct_branch_name)
                    .await?
                    .ok_or_else(|| IssuanceError::not_found("branch", &self.direct_branch_name))
            }
        }
    }

    pub async fn payment_mode(&self, id: i64) -> Result<PaymentMode> {
        self.store
            .find_payment_mode(id)
            .await?
            .ok_or_else(|| IssuanceError::not_found("payment mode", id))
    }

    pub async fn sku_mapping(&self, parent_sku: &str, sku: &str) -> Result<SkuMapping> {
        self.store
            .find_sku_mapping(parent_sku, sku)
            .await?
            .ok_or_else(|| IssuanceError::not_found("sku mapping", format!("{parent_sku}/{sku}")))
    }

    pub async fn city(&self, id: i64) -> Result<City> {
        self.store
            .find_city(id)
            .await?
            .ok_or_else(|| IssuanceError::not_found("city", id))
    }

    pub async fn product(&self, id: i64) -> Result<Product> {
        self.store
            .find_product(id)
            .await?
            .ok_or_else(|| IssuanceError::not_found("product", id))
    }

    pub async fn plan(&self, id: i64) -> Result<Plan> {
        self.store
            .find_plan(id)
            .await?
            .ok_or_else(|| IssuanceError::not_found("plan", id))
    }
}
