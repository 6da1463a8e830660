use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use ns_core::{ComparisonOperator, Model, Sample};
use ns_prob::{Distribution, Normal};
use ns_simulation::event::evaluate_parallel;
use ns_simulation::rng::block_rng;
use ns_simulation::sampler::BlockSampler;
use ns_simulation::{
    CrossEntropyConfig, CrudeSampler, DirectionalSampler, Experiment, LinearModel, RootStrategy,
    RunningEstimator, SamplingStrategy, StandardSpaceCrossEntropy, StandardSpaceUpdate,
    SubsetConfig, SubsetSampling, ThresholdEvent,
};
use std::hint::black_box;
use std::sync::Arc;

fn linear_event(dim: usize, beta: f64) -> ThresholdEvent {
    let d: Arc<dyn Distribution> = Arc::new(Normal::standard(dim).unwrap());
    let m: Arc<dyn Model> = Arc::new(LinearModel::hyperplane(dim, beta).unwrap());
    ThresholdEvent::new(d, m, ComparisonOperator::Less, 0.0).unwrap()
}

fn bench_estimator(c: &mut Criterion) {
    let values: Vec<f64> = (0..1000).map(|i| (i % 7) as f64).collect();
    c.bench_function("running_estimator_1000_blocks", |b| {
        b.iter(|| {
            let mut est = RunningEstimator::new(values.len());
            for _ in 0..1000 {
                est.update(black_box(&values));
            }
            black_box(est.snapshot())
        })
    });
}

fn bench_parallel_evaluation(c: &mut Criterion) {
    let model = LinearModel::hyperplane(10, 3.0).unwrap();
    let mut group = c.benchmark_group("evaluate_parallel");
    for &n in &[1_000usize, 100_000] {
        let sample = Normal::standard(10).unwrap().sample(&mut block_rng(1, 0), n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &sample, |b, s: &Sample| {
            b.iter(|| black_box(evaluate_parallel(&model, s).unwrap()))
        });
    }
    group.finish();
}

fn bench_blocks(c: &mut Criterion) {
    let event = linear_event(4, 3.0);
    let mut group = c.benchmark_group("block_1000");

    let experiments = [
        ("monte_carlo", Experiment::MonteCarlo),
        ("lhs", Experiment::Lhs),
        ("qmc", Experiment::Qmc),
    ];
    for (name, experiment) in experiments {
        let mut s = CrudeSampler::new(&event, experiment).unwrap();
        group.bench_function(name, |b| {
            let mut k = 0;
            b.iter(|| {
                k += 1;
                black_box(s.compute_block(1000, &mut block_rng(7, k)).unwrap())
            })
        });
    }

    let mut ds = DirectionalSampler::new(
        event.clone(),
        RootStrategy::default(),
        SamplingStrategy::RandomDirection,
    )
    .unwrap();
    group.bench_function("directional", |b| {
        let mut k = 0;
        b.iter(|| {
            k += 1;
            black_box(ds.compute_block(1000, &mut block_rng(7, k)).unwrap())
        })
    });
    group.finish();
}

fn bench_staged(c: &mut Criterion) {
    let event = linear_event(2, 4.0);
    let mut group = c.benchmark_group("staged_beta4");
    group.sample_size(10);

    group.bench_function("subset", |b| {
        let cfg = SubsetConfig { block_size: 100, max_outer_sampling: 20, ..Default::default() };
        b.iter(|| {
            let mut ss = SubsetSampling::new(event.clone(), cfg.clone()).unwrap();
            black_box(ss.run().unwrap().probability_estimate)
        })
    });

    group.bench_function("cross_entropy_standard", |b| {
        let cfg =
            CrossEntropyConfig { block_size: 100, max_outer_sampling: 20, ..Default::default() };
        b.iter(|| {
            let mut ce =
                StandardSpaceCrossEntropy::new(event.clone(), StandardSpaceUpdate, cfg.clone())
                    .unwrap();
            black_box(ce.run().unwrap().probability_estimate)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_estimator, bench_parallel_evaluation, bench_blocks, bench_staged);
criterion_main!(benches);
