//! Benchmarks for offer evaluation.

use chrono::Utc;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use parley_agent::evaluation::{refine_terms, score_offer};
use parley_agent::{NegotiationOffer, NegotiationType};
use parley_core::{AgentCapability, AgentId, ResourceKind, ResourceMap, Score};

fn kinds(count: usize) -> Vec<ResourceKind> {
    (0..count)
        .map(|i| ResourceKind::new(format!("resource_{i}")).unwrap())
        .collect()
}

fn map(kinds: &[ResourceKind], amount: f64) -> ResourceMap {
    kinds.iter().map(|kind| (kind.clone(), amount)).collect()
}

fn benchmark_score_offer(c: &mut Criterion) {
    let fraud = AgentId::new("fraud_agent").unwrap();
    let policy = AgentId::new("policy_agent").unwrap();
    let kinds = kinds(8);

    let capability = AgentCapability::builder(fraud.clone())
        .resources(map(&kinds, 10.0))
        .trust(policy.clone(), Score::new(0.8).unwrap())
        .build();
    let offer = NegotiationOffer::builder(policy, fraud, NegotiationType::ResourceAllocation)
        .offered(map(&kinds, 3.0))
        .requested(map(&kinds, 2.0))
        .confidence(0.9)
        .build(Utc::now());
    let needs = map(&kinds, 4.0);

    c.bench_function("score_offer_8_kinds", |b| {
        b.iter(|| score_offer(black_box(&capability), black_box(&offer), black_box(&needs)));
    });
}

fn benchmark_refine_terms(c: &mut Criterion) {
    let kinds = kinds(8);
    let last = NegotiationOffer::builder(
        AgentId::new("fraud_agent").unwrap(),
        AgentId::new("policy_agent").unwrap(),
        NegotiationType::ResourceAllocation,
    )
    .offered(map(&kinds, 2.0))
    .requested(map(&kinds, 5.0))
    .build(Utc::now());
    let available = map(&kinds, 6.0);

    c.bench_function("refine_terms_8_kinds", |b| {
        b.iter(|| refine_terms(black_box(&last), black_box(0.4), 0.3, black_box(&available)));
    });
}

criterion_group!(benches, benchmark_score_offer, benchmark_refine_terms);
criterion_main!(benches);
