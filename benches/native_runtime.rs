//! Benchmarks for the native interpreter and the synthetic probe.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use modelgate::format::onnx::OnnxModel;
use modelgate::format::test_factory::{build_pygmy_logistic, build_pygmy_softmax};
use modelgate::qa::probe::SyntheticInputProbe;
use modelgate::qa::Budget;
use modelgate::runtime::native::NativeSession;
use modelgate::runtime::{SharedSession, Tensor};

fn session(bytes: &[u8]) -> SharedSession {
    let model = OnnxModel::from_bytes(bytes).unwrap();
    SharedSession::new(Box::new(NativeSession::from_model(&model).unwrap()))
}

fn bench_logistic_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("native_logistic_batch");
    let session = session(&build_pygmy_logistic(16));

    for batch in [1usize, 16, 64, 256].iter() {
        let input = Tensor::filled(vec![*batch, 16], 0.5).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, _| {
            b.iter(|| session.run_primary(black_box(input.clone())).unwrap());
        });
    }

    group.finish();
}

fn bench_softmax_width(c: &mut Criterion) {
    let mut group = c.benchmark_group("native_softmax_width");

    for classes in [2usize, 10, 100].iter() {
        let session = session(&build_pygmy_softmax(*classes));
        let input = Tensor::filled(vec![1, *classes], 0.1).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(classes), classes, |b, _| {
            b.iter(|| session.run_primary(black_box(input.clone())).unwrap());
        });
    }

    group.finish();
}

fn bench_probe(c: &mut Criterion) {
    let session = session(&build_pygmy_logistic(8));
    let probe = SyntheticInputProbe::new(42);
    let budget = Budget::unlimited();
    c.bench_function("synthetic_probe_logistic_8", |b| {
        b.iter(|| probe.run(black_box(&session), &budget));
    });
}

criterion_group!(benches, bench_logistic_batch, bench_softmax_width, bench_probe);
criterion_main!(benches);
