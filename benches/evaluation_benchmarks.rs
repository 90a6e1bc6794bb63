//! Evaluation benchmarks for pennant-features

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

use pennant::{
    Attributes, BucketAssignor, Condition, ExperimentDefinition, FeatureEngine, FeatureFlag,
    InMemoryDefinitionSource, Operator, SubjectContext, TargetingRule, targeting,
};

fn bucketing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("bucketing");
    group.throughput(Throughput::Elements(1));

    group.bench_function("rollout_bucket", |b| {
        b.iter(|| BucketAssignor::include_in_rollout(black_box("user-42"), black_box("new-ui"), 50));
    });

    for arms in [2usize, 4, 8] {
        let variations: Vec<String> = (0..arms).map(|i| format!("v{}", i)).collect();
        let allocation = vec![100.0 / arms as f64; arms];

        group.bench_with_input(BenchmarkId::new("assign", arms), &arms, |b, _| {
            b.iter(|| {
                BucketAssignor::assign(
                    black_box("user-42"),
                    black_box("experiment"),
                    &variations,
                    &allocation,
                )
            });
        });
    }

    group.finish();
}

fn targeting_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("targeting");

    let context = SubjectContext::new("user-42")
        .with_attribute("role", "client")
        .with_attribute("tenure_days", 120)
        .with_attribute("account_tier", "power");

    let rules: Vec<TargetingRule> = (0..10)
        .map(|i| {
            TargetingRule::new(1)
                .with_condition(Condition::single("role", Operator::Equals, "client"))
                .with_condition(Condition::single("tenure_days", Operator::GreaterThan, i * 20))
                .with_condition(Condition::new(
                    "account_tier",
                    Operator::In,
                    vec!["power".into(), "established".into()],
                ))
        })
        .collect();

    group.bench_function("first_match_hit", |b| {
        b.iter(|| targeting::first_match(black_box(&rules), black_box(&context)));
    });

    let anonymous = SubjectContext::new("anon");
    group.bench_function("first_match_miss", |b| {
        b.iter(|| targeting::first_match(black_box(&rules), black_box(&anonymous)));
    });

    let experiment = ExperimentDefinition::ab_test("checkout")
        .with_condition(Condition::single("role", Operator::Equals, "client"));
    group.bench_function("experiment_assign", |b| {
        b.iter(|| experiment.assign(black_box(&context)));
    });

    group.finish();
}

fn engine_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Elements(1));

    let definitions = Arc::new(InMemoryDefinitionSource::new());
    definitions
        .upsert_flag(FeatureFlag::boolean("new-ui", false).with_rollout(50))
        .unwrap();
    let engine = FeatureEngine::builder().definitions(definitions).build();
    let no_overrides = Attributes::new();

    group.bench_function("is_enabled_cached", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(engine.is_enabled("new-ui", black_box("user-42"), &no_overrides).await)
        });
    });

    let mut overrides = Attributes::new();
    overrides.insert("role".to_string(), "client".into());
    group.bench_function("is_enabled_uncached", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(engine.is_enabled("new-ui", black_box("user-42"), &overrides).await)
        });
    });

    group.finish();
}

fn statistics_benchmark(c: &mut Criterion) {
    let engine = FeatureEngine::builder().build();

    c.bench_function("analyze", |b| {
        b.iter(|| engine.analyze(black_box(100), 1000, black_box(150), 1000).unwrap());
    });
    c.bench_function("required_sample_size", |b| {
        b.iter(|| {
            engine
                .required_sample_size(black_box(0.1), black_box(0.02), 0.05, 0.8)
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    bucketing_benchmark,
    targeting_benchmark,
    engine_benchmark,
    statistics_benchmark,
);

criterion_main!(benches);
