//! C7: the optimizer driver. Wires population management, fitness scoring,
//! the cluster and telemetry gateways, and the load generator into the
//! generation loop: evaluate, record stats, evolve, repeat.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cache::EvaluationCache;
use crate::cluster::ClusterGateway;
use crate::config::{AppConfig, GaParameters, LoadTestConfig};
use crate::error::TuneError;
use crate::fitness::FitnessCalculator;
use crate::load::{LoadGenerator, RequestExecutor};
use crate::population::PopulationManager;
use crate::telemetry::TelemetryGateway;
use crate::types::{EvaluationResult, FitnessMetrics, GenerationStats, Individual, Population};

fn safe_divide(numerator: f64, denominator: f64) -> f64 {
    if denominator.abs() < f64::EPSILON {
        0.0
    } else {
        numerator / denominator
    }
}

/// Everything the optimizer needs that isn't pure computation: the cluster
/// it mutates, the telemetry source it reads, and the load it generates
/// against the workload URL.
pub struct OptimizerHandles {
    pub cluster: Box<dyn ClusterGateway>,
    pub telemetry: Box<dyn TelemetryGateway>,
    pub executor: Box<dyn RequestExecutor>,
}

pub struct GeneticOptimizer {
    population_manager: PopulationManager,
    fitness: FitnessCalculator,
    cache: Mutex<EvaluationCache>,
    handles: OptimizerHandles,
    app: AppConfig,
    load_config: LoadTestConfig,
    rollout_timeout: Duration,
    /// Serializes the cluster-mutating prefix of evaluation (apply + wait
    /// for rollout) across concurrent workers. The load test and telemetry
    /// read that follow run unlocked — they don't mutate shared cluster
    /// state, so holding the lock across them would only cost wall-clock
    /// with no safety benefit.
    cluster_lock: Mutex<()>,
    params: GaParameters,
    history: Vec<GenerationStats>,
    evaluation_results: Vec<EvaluationResult>,
    best: Option<EvaluationResult>,
}

impl GeneticOptimizer {
    pub fn new(
        params: GaParameters,
        app: AppConfig,
        load_config: LoadTestConfig,
        rollout_timeout: Duration,
        handles: OptimizerHandles,
    ) -> Self {
        Self {
            population_manager: PopulationManager::new(params.clone()),
            fitness: FitnessCalculator::default(),
            cache: Mutex::new(EvaluationCache::default()),
            handles,
            app,
            load_config,
            rollout_timeout,
            cluster_lock: Mutex::new(()),
            params,
            history: Vec::new(),
            evaluation_results: Vec::new(),
            best: None,
        }
    }

    pub fn history(&self) -> &[GenerationStats] {
        &self.history
    }

    pub fn evaluation_results(&self) -> &[EvaluationResult] {
        &self.evaluation_results
    }

    /// Evaluates one individual end to end: apply it to the cluster, wait
    /// for the rollout, run load against it, pull telemetry, score it.
    /// Degrades to a zeroed-but-real [`FitnessMetrics`] if the rollout never
    /// converges (the configuration was at least applied, so there's
    /// something real to report), and to no metrics at all if the cluster
    /// or load-test step fails outright.
    #[tracing::instrument(skip(self))]
    fn evaluate_individual(&self, individual: &Individual) -> EvaluationResult {
        if let Some(cached) = self.cache.lock().unwrap().get(individual) {
            tracing::debug!(?individual, "evaluation cache hit");
            return cached;
        }

        let start = Instant::now();
        let result = self.evaluate_uncached(individual, start);
        self.cache.lock().unwrap().put(individual, result.clone());
        result
    }

    fn evaluate_uncached(&self, individual: &Individual, start: Instant) -> EvaluationResult {
        {
            let _guard = self.cluster_lock.lock().unwrap();
            if let Err(err) = self.handles.cluster.apply_configuration(individual, true) {
                return EvaluationResult::failed(
                    individual.clone(),
                    start.elapsed().as_secs_f64(),
                    format!("failed to apply configuration: {err}"),
                );
            }

            match self.handles.cluster.wait_for_rollout(self.rollout_timeout) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(?individual, "rollout did not converge before timeout");
                    return EvaluationResult {
                        individual: individual.clone(),
                        fitness: 0.0,
                        metrics: Some(FitnessMetrics::stamped()),
                        evaluation_time: start.elapsed().as_secs_f64(),
                        error: Some("rollout timed out".into()),
                    };
                }
                Err(err) => {
                    return EvaluationResult::failed(
                        individual.clone(),
                        start.elapsed().as_secs_f64(),
                        format!("failed to observe rollout: {err}"),
                    );
                }
            }
        }

        let load_url = format!("{}/sort?size=5000", self.app.url);
        let generator = LoadGenerator::new(self.load_config.clone());
        let load_result = match generator.run(&load_url, self.handles.executor.as_ref()) {
            Ok(result) => result,
            Err(err) => {
                return EvaluationResult::failed(
                    individual.clone(),
                    start.elapsed().as_secs_f64(),
                    format!("load test failed: {err}"),
                );
            }
        };

        let cpu_usage = self.handles.telemetry.cpu_usage(&self.app.label);
        let memory_usage = self.handles.telemetry.memory_usage(&self.app.label);
        let request_rate = self.handles.telemetry.request_rate(&self.app.label);
        let p95 = self.handles.telemetry.request_latency(&self.app.label, 0.95);
        let p99 = self.handles.telemetry.request_latency(&self.app.label, 0.99);
        let error_rate = self.handles.telemetry.error_rate(&self.app.label);

        let metrics = FitnessMetrics {
            throughput: load_result.throughput,
            avg_latency: load_result.avg_latency,
            // Prefer the platform's own histogram when it reports something
            // nonzero; fall back to the load tester's client-side measurement.
            p95_latency: if p95 > 0.0 { p95 } else { load_result.p95_latency },
            p99_latency: if p99 > 0.0 { p99 } else { load_result.p99_latency },
            success_rate: load_result.success_rate,
            total_requests: load_result.total,
            failed_requests: load_result.fail,
            cpu_usage,
            memory_usage,
            cpu_utilization: safe_divide(cpu_usage, individual.cpu_limit),
            memory_utilization: safe_divide(memory_usage / (1024.0 * 1024.0), individual.memory_limit as f64),
            request_rate,
            error_rate,
            evaluated_at: crate::types::now_unix(),
        };

        let fitness = self.fitness.calculate(&metrics);

        EvaluationResult {
            individual: individual.clone(),
            fitness,
            metrics: Some(metrics),
            evaluation_time: start.elapsed().as_secs_f64(),
            error: None,
        }
    }

    /// Evaluates every individual in the population, index-paired with its
    /// result (not hash-keyed) so duplicate individuals within a population
    /// don't collide into a single slot.
    fn evaluate_population(&self, population: &Population, parallel: bool, max_workers: usize) -> Vec<EvaluationResult> {
        if parallel && population.individuals.len() > 1 {
            let mut results: Vec<Option<EvaluationResult>> = vec![None; population.individuals.len()];
            let workers = max_workers.max(1);
            let chunk_size = (population.individuals.len() + workers - 1) / workers;
            let chunks: Vec<&[Individual]> = population.individuals.chunks(chunk_size).collect();

            std::thread::scope(|scope| {
                let mut offset = 0;
                let mut handles = Vec::new();
                for chunk in chunks {
                    let start_index = offset;
                    offset += chunk.len();
                    handles.push((
                        start_index,
                        scope.spawn(move || {
                            chunk
                                .iter()
                                .map(|individual| self.evaluate_individual(individual))
                                .collect::<Vec<_>>()
                        }),
                    ));
                }
                for (start_index, handle) in handles {
                    let chunk_results = handle.join().expect("evaluation worker panicked");
                    for (offset, result) in chunk_results.into_iter().enumerate() {
                        results[start_index + offset] = Some(result);
                    }
                }
            });

            results.into_iter().map(|r| r.expect("every index filled")).collect()
        } else {
            population
                .individuals
                .iter()
                .enumerate()
                .map(|(i, individual)| {
                    tracing::info!(index = i + 1, total = population.individuals.len(), "evaluating individual");
                    self.evaluate_individual(individual)
                })
                .collect()
        }
    }

    fn generation_stats(&self, population: &Population, results: &[EvaluationResult]) -> GenerationStats {
        let scores: Vec<f64> = results.iter().map(|r| r.fitness).collect();
        let avg_fitness = scores.iter().sum::<f64>() / scores.len().max(1) as f64;
        let max_fitness = scores.iter().cloned().fold(f64::MIN, f64::max);
        let min_fitness = scores.iter().cloned().fold(f64::MAX, f64::min);
        let best_index = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap_or(0);

        let diversity = population.diversity(&self.params.bounds);
        let convergence = if scores.len() > 1 {
            let mean = avg_fitness;
            let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
            1.0 / (1.0 + variance)
        } else {
            0.0
        };

        GenerationStats {
            generation: population.generation,
            population_size: population.size(),
            avg_fitness,
            max_fitness,
            min_fitness,
            best_individual: results[best_index].individual.clone(),
            diversity,
            convergence,
        }
    }

    /// Runs the full search: builds an initial population, evaluates and
    /// evolves it for `generations` rounds, then applies the best
    /// configuration found. Evolution runs between generations only — the
    /// final generation's population is evaluated but never evolved further.
    #[tracing::instrument(skip(self))]
    pub fn run(&mut self, parallel: bool, max_workers: usize) -> Result<Individual, TuneError> {
        tracing::info!(
            generations = self.params.generations,
            population = self.params.population_size,
            "starting genetic search"
        );

        let mut population = self.population_manager.create_initial_population();

        for generation in 0..self.params.generations {
            let results = self.evaluate_population(&population, parallel, max_workers);
            if results.is_empty() {
                return Err(TuneError::EmptyGeneration);
            }

            let stats = self.generation_stats(&population, &results);
            tracing::info!(
                generation,
                avg_fitness = stats.avg_fitness,
                max_fitness = stats.max_fitness,
                diversity = stats.diversity,
                "generation complete"
            );

            let best_this_generation = results
                .iter()
                .max_by(|a, b| a.fitness.partial_cmp(&b.fitness).unwrap())
                .cloned();
            if let Some(candidate) = best_this_generation {
                let improves = self
                    .best
                    .as_ref()
                    .map(|b| candidate.fitness > b.fitness)
                    .unwrap_or(true);
                if improves {
                    self.best = Some(candidate);
                }
            }

            self.evaluation_results.extend(results.clone());
            self.history.push(stats);

            if generation + 1 < self.params.generations {
                let scores: Vec<f64> = results.iter().map(|r| r.fitness).collect();
                population = self.population_manager.evolve(&population, &scores);
            }
        }

        let best = self.best.clone().ok_or(TuneError::EmptyGeneration)?;

        if let Err(err) = self.handles.cluster.apply_configuration(&best.individual, false) {
            tracing::error!(%err, "failed to apply best configuration after search completed");
        }

        Ok(best.individual)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub best_individual: Individual,
    pub best_fitness: f64,
    pub generations: Vec<GenerationStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::DeploymentStatus;
    use crate::config::ClusterConfig;
    use std::time::Duration as StdDuration;

    struct StubCluster;
    impl ClusterGateway for StubCluster {
        fn apply_configuration(&self, _individual: &Individual, _save_for_rollback: bool) -> Result<(), crate::error::PlatformError> {
            Ok(())
        }
        fn wait_for_rollout(&self, _timeout: StdDuration) -> Result<bool, crate::error::PlatformError> {
            Ok(true)
        }
        fn deployment_status(&self) -> Result<Option<DeploymentStatus>, crate::error::PlatformError> {
            Ok(None)
        }
        fn rollback(&self) -> Result<bool, crate::error::PlatformError> {
            Ok(false)
        }
    }

    struct StubTelemetry;
    impl TelemetryGateway for StubTelemetry {
        fn query_instant(&self, _query: &str) -> Result<f64, crate::error::TelemetryError> {
            Ok(50.0)
        }
    }

    struct StubExecutor;
    impl RequestExecutor for StubExecutor {
        fn execute(&self, _url: &str, _timeout: StdDuration) -> Result<u16, String> {
            Ok(200)
        }
    }

    fn handles() -> OptimizerHandles {
        OptimizerHandles {
            cluster: Box::new(StubCluster),
            telemetry: Box::new(StubTelemetry),
            executor: Box::new(StubExecutor),
        }
    }

    fn tiny_params() -> GaParameters {
        GaParameters {
            population_size: 3,
            generations: 2,
            ..GaParameters::default()
        }
    }

    #[test]
    fn run_completes_and_returns_a_bounded_individual() {
        let params = tiny_params();
        let bounds = params.bounds.clone();
        let mut optimizer = GeneticOptimizer::new(
            params,
            AppConfig::default(),
            LoadTestConfig {
                duration_seconds: 0,
                concurrency: 1,
                ..LoadTestConfig::default()
            },
            StdDuration::from_secs(1),
            handles(),
        );

        let best = optimizer.run(false, 1).unwrap();
        assert!(best.replicas >= bounds.replicas_min && best.replicas <= bounds.replicas_max);
        assert_eq!(optimizer.history().len(), 2);
    }

    #[test]
    fn safe_divide_guards_against_zero_denominator() {
        assert_eq!(safe_divide(10.0, 0.0), 0.0);
        assert_eq!(safe_divide(10.0, 2.0), 5.0);
    }

    #[test]
    fn rollout_timeout_degrades_to_zeroed_metrics_not_absent_metrics() {
        struct NeverReadyCluster;
        impl ClusterGateway for NeverReadyCluster {
            fn apply_configuration(&self, _individual: &Individual, _save_for_rollback: bool) -> Result<(), crate::error::PlatformError> {
                Ok(())
            }
            fn wait_for_rollout(&self, _timeout: StdDuration) -> Result<bool, crate::error::PlatformError> {
                Ok(false)
            }
            fn deployment_status(&self) -> Result<Option<DeploymentStatus>, crate::error::PlatformError> {
                Ok(None)
            }
            fn rollback(&self) -> Result<bool, crate::error::PlatformError> {
                Ok(false)
            }
        }

        let optimizer = GeneticOptimizer::new(
            tiny_params(),
            AppConfig::default(),
            LoadTestConfig::default(),
            StdDuration::from_secs(1),
            OptimizerHandles {
                cluster: Box::new(NeverReadyCluster),
                telemetry: Box::new(StubTelemetry),
                executor: Box::new(StubExecutor),
            },
        );

        let result = optimizer.evaluate_individual(&Individual::new(2, 0.5, 256));
        assert_eq!(result.fitness, 0.0);
        assert!(result.metrics.is_some());
        let _ = ClusterConfig::default();
    }
}
