use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rillfind::{
    Args, Arity, CompiledFinder, FinderSpec, OptionSet, assemble::ModelInfo,
    testing::RecordingConnection,
};
use serde_json::json;

fn spec() -> FinderSpec {
    FinderSpec::new(
        "find_all_of_user",
        Arity::Many,
        OptionSet::new()
            .conditions("user = :user AND priv < :priv AND (owner = :user OR shared)")
            .order("created_at DESC, abs(priv - :priv)")
            .limit(":per_page")
            .offset(":skip"),
    )
    .expect("valid finder")
}

fn bench_finders(c: &mut Criterion) {
    let connection = RecordingConnection::new();
    let model = ModelInfo::new("recipes");
    let mut group = c.benchmark_group("finders");
    group.throughput(Throughput::Elements(1));

    group.bench_function(BenchmarkId::new("compile", 4), |b| {
        b.iter(|| CompiledFinder::compile(spec(), &model, &connection).unwrap())
    });

    let compiled = CompiledFinder::compile(spec(), &model, &connection).unwrap();
    let args = Args::named(json!({"user": "martin", "priv": 1, "per_page": 20, "skip": 40}));
    group.bench_function(BenchmarkId::new("render", 4), |b| {
        b.iter(|| compiled.render(&args, &connection).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_finders);
criterion_main!(benches);
