//! Policy code generation.
//!
//! Codes are a pure function of their inputs: regenerating a code for an
//! existing policy always reproduces the stored value.
//!
//! ```text
//! health:  "91" + plan code (3) + policy id (7)         e.g. 910510000042
//! other:   branch code - category (3) - policy id (7)   e.g. KHI-004-0000042
//! ```

use common::PolicyId;

use crate::reference::{BranchCodes, ProductType};

/// Prefix shared by every health policy code.
pub const HEALTH_PREFIX: &str = "91";

/// Plan code used when a health product/plan pair has no table entry.
pub const UNMAPPED_PLAN_CODE: &str = "000";

/// Health product families, recognised from the product name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductFamily {
    PersonalCare,
    FamilyCare,
    ParentsCare,
    CriticalIllness,
    HospitalCash,
}

impl ProductFamily {
    /// Recognises the family from a product name, ignoring case.
    pub fn from_product_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        [
            ("personal care", ProductFamily::PersonalCare),
            ("family care", ProductFamily::FamilyCare),
            ("parents care", ProductFamily::ParentsCare),
            ("critical illness", ProductFamily::CriticalIllness),
            ("hospital cash", ProductFamily::HospitalCash),
        ]
        .into_iter()
        .find(|(needle, _)| name.contains(needle))
        .map(|(_, family)| family)
    }
}

/// Plan tiers, recognised from the plan name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanTier {
    Silver,
    Gold,
    Platinum,
    Diamond,
    FamilyA,
    FamilyB,
    FamilyC,
}

impl PlanTier {
    /// Recognises the tier from a plan name, ignoring case.
    ///
    /// Family variants are checked first since their names may also
    /// mention a metal tier.
    pub fn from_plan_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        [
            ("family a", PlanTier::FamilyA),
            ("family b", PlanTier::FamilyB),
            ("family c", PlanTier::FamilyC),
            ("diamond", PlanTier::Diamond),
            ("platinum", PlanTier::Platinum),
            ("gold", PlanTier::Gold),
            ("silver", PlanTier::Silver),
        ]
        .into_iter()
        .find(|(needle, _)| name.contains(needle))
        .map(|(_, tier)| tier)
    }
}

const PLAN_CODES: &[(ProductFamily, PlanTier, &str)] = &[
    (ProductFamily::PersonalCare, PlanTier::Silver, "050"),
    (ProductFamily::PersonalCare, PlanTier::Gold, "051"),
    (ProductFamily::PersonalCare, PlanTier::Platinum, "052"),
    (ProductFamily::PersonalCare, PlanTier::Diamond, "053"),
    (ProductFamily::FamilyCare, PlanTier::FamilyA, "060"),
    (ProductFamily::FamilyCare, PlanTier::FamilyB, "061"),
    (ProductFamily::FamilyCare, PlanTier::FamilyC, "062"),
    (ProductFamily::FamilyCare, PlanTier::Silver, "063"),
    (ProductFamily::FamilyCare, PlanTier::Gold, "064"),
    (ProductFamily::FamilyCare, PlanTier::Platinum, "065"),
    (ProductFamily::ParentsCare, PlanTier::Silver, "070"),
    (ProductFamily::ParentsCare, PlanTier::Gold, "071"),
    (ProductFamily::ParentsCare, PlanTier::Platinum, "072"),
    (ProductFamily::CriticalIllness, PlanTier::Silver, "080"),
    (ProductFamily::CriticalIllness, PlanTier::Gold, "081"),
    (ProductFamily::CriticalIllness, PlanTier::Platinum, "082"),
    (ProductFamily::HospitalCash, PlanTier::Silver, "090"),
    (ProductFamily::HospitalCash, PlanTier::Gold, "091"),
    (ProductFamily::HospitalCash, PlanTier::Platinum, "092"),
];

/// Looks up the three-digit plan code for a health product and plan.
pub fn plan_code(product_name: &str, plan_name: &str) -> Option<&'static str> {
    let family = ProductFamily::from_product_name(product_name)?;
    let tier = PlanTier::from_plan_name(plan_name)?;
    PLAN_CODES
        .iter()
        .find(|(f, t, _)| *f == family && *t == tier)
        .map(|(_, _, code)| *code)
}

/// Everything a policy code is derived from.
#[derive(Debug, Clone, Copy)]
pub struct CodeInputs<'a> {
    pub product_type: &'a ProductType,
    pub product_name: &'a str,
    pub plan_name: &'a str,
    pub takaful: bool,
    pub branch_codes: &'a BranchCodes,
    pub category_code: i32,
    pub policy_id: PolicyId,
}

/// Generates the policy code for the given inputs.
pub fn generate_code(inputs: &CodeInputs<'_>) -> String {
    let sequence = format!("{:07}", inputs.policy_id.as_i64());

    if inputs.product_type.is_health() {
        let plan = plan_code(inputs.product_name, inputs.plan_name).unwrap_or_else(|| {
            tracing::warn!(
                product = inputs.product_name,
                plan = inputs.plan_name,
                "no plan code for health product, using {UNMAPPED_PLAN_CODE}"
            );
            metrics::counter!("policy_code_unmapped_plan_total").increment(1);
            UNMAPPED_PLAN_CODE
        });
        return format!("{HEALTH_PREFIX}{plan}{sequence}");
    }

    format!(
        "{}-{:03}-{}",
        inputs.branch_codes.for_policy(inputs.takaful),
        inputs.category_code,
        sequence
    )
}

/// The id-independent part of a policy code.
///
/// Carried into the creating transaction so the code can be written as soon
/// as the policy id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTemplate {
    pub product_type: ProductType,
    pub product_name: String,
    pub plan_name: String,
    pub takaful: bool,
    pub branch_codes: BranchCodes,
    pub category_code: i32,
}

impl CodeTemplate {
    pub fn code_for(&self, policy_id: PolicyId) -> String {
        generate_code(&CodeInputs {
            product_type: &self.product_type,
            product_name: &self.product_name,
            plan_name: &self.plan_name,
            takaful: self.takaful,
            branch_codes: &self.branch_codes,
            category_code: self.category_code,
            policy_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs<'a>(
        product_type: &'a ProductType,
        product_name: &'a str,
        plan_name: &'a str,
        codes: &'a BranchCodes,
        takaful: bool,
        policy_id: i64,
    ) -> CodeInputs<'a> {
        CodeInputs {
            product_type,
            product_name,
            plan_name,
            takaful,
            branch_codes: codes,
            category_code: 4,
            policy_id: PolicyId::new(policy_id),
        }
    }

    #[test]
    fn test_personal_care_gold_example() {
        let codes = BranchCodes::new("DIR", "DIT");
        let code = generate_code(&inputs(
            &ProductType::Health,
            "Personal Care",
            "Gold",
            &codes,
            false,
            42,
        ));
        assert_eq!(code, "910510000042");
    }

    #[test]
    fn test_health_code_shape() {
        let codes = BranchCodes::new("DIR", "DIT");
        for (product, plan, id) in [
            ("Family Care Plus", "Family B", 1),
            ("Parents Care", "Platinum Plan", 9_999_999),
            ("Unknown Health", "Gold", 123),
        ] {
            let code = generate_code(&inputs(&ProductType::Health, product, plan, &codes, true, id));
            assert!(code.starts_with(HEALTH_PREFIX));
            assert_eq!(code.len(), 12);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_unmapped_health_plan_uses_fallback_code() {
        let codes = BranchCodes::new("DIR", "DIT");
        let code = generate_code(&inputs(
            &ProductType::Health,
            "Dental Care",
            "Gold",
            &codes,
            false,
            7,
        ));
        assert_eq!(code, "910000000007");
    }

    #[test]
    fn test_family_tier_wins_over_metal_tier() {
        assert_eq!(PlanTier::from_plan_name("Family A Gold"), Some(PlanTier::FamilyA));
        assert_eq!(plan_code("Family Care", "Family A Gold"), Some("060"));
    }

    #[test]
    fn test_non_health_code_uses_branch_codes() {
        let codes = BranchCodes::new("KHI", "KHT");
        let conventional = generate_code(&inputs(
            &ProductType::Travel,
            "Student Travel",
            "Worldwide",
            &codes,
            false,
            42,
        ));
        let takaful = generate_code(&inputs(
            &ProductType::Travel,
            "Student Travel",
            "Worldwide",
            &codes,
            true,
            42,
        ));

        assert_eq!(conventional, "KHI-004-0000042");
        assert_eq!(takaful, "KHT-004-0000042");
    }

    #[test]
    fn test_generation_is_deterministic() {
        let codes = BranchCodes::new("LHR", "LHT");
        let a = inputs(&ProductType::Home, "Home Shield", "Basic", &codes, false, 314);
        assert_eq!(generate_code(&a), generate_code(&a));
    }

    #[test]
    fn test_every_table_entry_is_three_digits() {
        for (_, _, code) in PLAN_CODES {
            assert_eq!(code.len(), 3);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_template_matches_direct_generation() {
        let template = CodeTemplate {
            product_type: ProductType::Travel,
            product_name: "Student Travel".to_string(),
            plan_name: "Standard".to_string(),
            takaful: true,
            branch_codes: BranchCodes::new("KHI", "KHT"),
            category_code: 4,
        };
        assert_eq!(template.code_for(PolicyId::new(12)), "KHT-004-0000012");
    }
}
