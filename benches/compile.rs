use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kolosal_compose::prelude::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

const EXPRESSIONS: [(&str, &str); 3] = [
    ("single", "LogisticRegression"),
    ("choice", "PCA >> (LogisticRegression | KNeighborsClassifier | DecisionTreeClassifier)"),
    (
        "nested",
        "(StandardScaler | MinMaxScaler) >> (PCA & NoOp) >> ConcatFeatures >> (LogisticRegression | KNeighborsClassifier | DecisionTreeClassifier)",
    ),
];

fn bench_parse(c: &mut Criterion) {
    let registry = OperatorRegistry::builtin().unwrap();
    let mut group = c.benchmark_group("parse");

    for (name, expr) in EXPRESSIONS.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), expr, |b, expr| {
            b.iter(|| parse(black_box(expr), &registry).unwrap())
        });
    }

    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let registry = OperatorRegistry::builtin().unwrap();
    let mut group = c.benchmark_group("compile");

    for (name, expr) in EXPRESSIONS.iter() {
        let op = parse(expr, &registry).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &op, |b, op| {
            b.iter(|| compile(black_box(op)).unwrap())
        });
    }

    group.finish();
}

fn bench_sample_and_bind(c: &mut Criterion) {
    let registry = OperatorRegistry::builtin().unwrap();
    let mut group = c.benchmark_group("sample_and_bind");

    for (name, expr) in EXPRESSIONS.iter() {
        let op = parse(expr, &registry).unwrap();
        let space = compile(&op).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| {
                let sample = space.sample(&mut rng).unwrap();
                op.bind(black_box(&sample.config)).unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_compile, bench_sample_and_bind);
criterion_main!(benches);
