use common::PolicyId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{BranchCodes, CodeInputs, ProductType, generate_code};

fn bench_health_code(c: &mut Criterion) {
    let codes = BranchCodes::new("DIR", "DIT");
    let product_type = ProductType::Health;

    c.bench_function("policy_code/health", |b| {
        b.iter(|| {
            generate_code(&CodeInputs {
                product_type: &product_type,
                product_name: "Family Care Plus",
                plan_name: "Family C",
                takaful: false,
                branch_codes: &codes,
                category_code: 1,
                policy_id: PolicyId::new(123_456),
            })
        });
    });
}

fn bench_branch_code(c: &mut Criterion) {
    let codes = BranchCodes::new("KHI", "KHT");
    let product_type = ProductType::Travel;

    c.bench_function("policy_code/branch", |b| {
        b.iter(|| {
            generate_code(&CodeInputs {
                product_type: &product_type,
                product_name: "Student Travel",
                plan_name: "Worldwide",
                takaful: true,
                branch_codes: &codes,
                category_code: 12,
                policy_id: PolicyId::new(123_456),
            })
        });
    });
}

criterion_group!(benches, bench_health_code, bench_branch_code);
criterion_main!(benches);
