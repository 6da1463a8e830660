use criterion::{Criterion, criterion_group, criterion_main};
use ns_prob::{ComposedDistribution, Distribution, Marginal, Mixture, Normal};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::hint::black_box;
use std::sync::Arc;

fn bench_scalar_distributions(c: &mut Criterion) {
    let xs: Vec<f64> = (0..10_000).map(|i| (i as f64) * 0.001 - 5.0).collect();

    c.bench_function("normal_logpdf_10k", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for &x in &xs {
                acc += ns_prob::normal::logpdf(x, 0.0, 1.3).unwrap();
            }
            black_box(acc)
        })
    });

    c.bench_function("std_normal_quantile_10k", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for i in 1..10_000 {
                acc += ns_prob::math::std_normal_quantile(i as f64 / 10_000.0);
            }
            black_box(acc)
        })
    });

    c.bench_function("binomial_cdf_n1000", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for k in 0..100u64 {
                acc += ns_prob::binomial::cdf(k, 1000, 0.05).unwrap();
            }
            black_box(acc)
        })
    });
}

fn bench_multivariate(c: &mut Criterion) {
    let composed = ComposedDistribution::new(vec![
        Marginal::normal(0.0, 1.0).unwrap(),
        Marginal::log_normal(0.0, 0.3).unwrap(),
        Marginal::weibull(2.0, 1.0).unwrap(),
        Marginal::exponential(1.0).unwrap(),
    ])
    .unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let sample = composed.sample(&mut rng, 10_000);

    c.bench_function("composed_log_pdf_sample_10k", |b| {
        b.iter(|| black_box(composed.log_pdf_sample(&sample)))
    });
    c.bench_function("composed_to_standard_10k", |b| {
        b.iter(|| black_box(ns_prob::sample_to_standard(&composed, &sample).unwrap()))
    });

    let comps: Vec<Arc<dyn Distribution>> = (0..50)
        .map(|i| {
            let c: Arc<dyn Distribution> =
                Arc::new(Normal::new(vec![i as f64 * 0.1; 4], vec![0.5; 4]).unwrap());
            c
        })
        .collect();
    let mixture = Mixture::new(comps, vec![1.0; 50]).unwrap();
    c.bench_function("mixture50_sample_1k", |b| {
        let mut rng = StdRng::seed_from_u64(2);
        b.iter(|| black_box(mixture.sample(&mut rng, 1_000)))
    });
}

criterion_group!(benches, bench_scalar_distributions, bench_multivariate);
criterion_main!(benches);
