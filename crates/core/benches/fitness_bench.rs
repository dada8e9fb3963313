//! Latency benchmarks for the genetic search's hot path: fitness scoring,
//! population evolution, and evaluation-cache lookups. None of these touch
//! the network, so they isolate the pure-computation cost of one
//! generation from the gateway calls that dominate a real run.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use restune_core::cache::EvaluationCache;
use restune_core::config::GaParameters;
use restune_core::fitness::{FitnessCalculator, FitnessWeights};
use restune_core::population::PopulationManager;
use restune_core::types::{EvaluationResult, FitnessMetrics, Individual};

fn bench_fitness_calculate(c: &mut Criterion) {
    let calc = FitnessCalculator::new(FitnessWeights::default());
    let metrics = FitnessMetrics {
        throughput: 150.0,
        avg_latency: 0.05,
        p95_latency: 0.09,
        cpu_utilization: 0.55,
        memory_utilization: 0.6,
        success_rate: 0.99,
        error_rate: 0.2,
        ..Default::default()
    };

    c.bench_function("fitness_calculate", |b| {
        b.iter(|| black_box(calc.calculate(black_box(&metrics))))
    });
}

fn bench_population_evolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("population_evolve");

    for size in [6, 20, 50].iter() {
        let params = GaParameters {
            population_size: *size,
            ..GaParameters::default()
        };
        let mut manager = PopulationManager::with_seed(params, 7);
        let population = manager.create_initial_population();
        let scores: Vec<f64> = (0..population.size())
            .map(|i| i as f64 / population.size() as f64)
            .collect();

        group.bench_with_input(BenchmarkId::new("evolve", size), size, |b, _| {
            b.iter(|| black_box(manager.evolve(black_box(&population), black_box(&scores))))
        });
    }

    group.finish();
}

fn bench_cache_roundtrip(c: &mut Criterion) {
    let mut cache = EvaluationCache::new(60.0);
    let individual = Individual::new(3, 0.6, 512);
    let result = EvaluationResult {
        individual: individual.clone(),
        fitness: 0.8,
        metrics: Some(FitnessMetrics::stamped()),
        evaluation_time: 1.2,
        error: None,
    };
    cache.put(&individual, result.clone());

    c.bench_function("cache_get_hit", |b| {
        b.iter(|| black_box(cache.get(black_box(&individual))))
    });
}

criterion_group!(
    benches,
    bench_fitness_calculate,
    bench_population_evolve,
    bench_cache_roundtrip
);
criterion_main!(benches);
