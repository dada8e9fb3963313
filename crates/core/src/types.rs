//! Data model shared by every component: the individual being searched
//! over, the metrics collected about it, and the aggregates kept per
//! generation.

use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A candidate deployment configuration: replica count plus per-container
/// resource limits.
///
/// Identity (`Eq`/`Hash`) is defined over `(replicas, cpu_limit, memory_limit)`
/// only — `container_name` rides along for the cluster gateway but does not
/// distinguish two otherwise-identical configurations. `cpu_limit` is
/// quantized to two decimal places before comparison since the search and
/// mutation operators round to that precision anyway; comparing raw `f64`
/// would make the cache and diversity calculations sensitive to float noise
/// that isn't supposed to carry any meaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Individual {
    pub replicas: u32,
    pub cpu_limit: f64,
    pub memory_limit: u32,
    #[serde(default)]
    pub container_name: Option<String>,
}

impl Individual {
    pub fn new(replicas: u32, cpu_limit: f64, memory_limit: u32) -> Self {
        Self {
            replicas,
            cpu_limit,
            memory_limit,
            container_name: None,
        }
    }

    fn cpu_key(&self) -> i64 {
        (self.cpu_limit * 100.0).round() as i64
    }
}

impl PartialEq for Individual {
    fn eq(&self, other: &Self) -> bool {
        self.replicas == other.replicas
            && self.cpu_key() == other.cpu_key()
            && self.memory_limit == other.memory_limit
    }
}

impl Eq for Individual {}

impl Hash for Individual {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.replicas.hash(state);
        self.cpu_key().hash(state);
        self.memory_limit.hash(state);
    }
}

/// Metrics collected for one evaluation: load-test observations plus
/// telemetry pulled from the platform's monitoring backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitnessMetrics {
    pub throughput: f64,
    pub avg_latency: f64,
    pub p95_latency: f64,
    pub p99_latency: f64,
    pub success_rate: f64,
    pub total_requests: u64,
    pub failed_requests: u64,

    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub cpu_utilization: f64,
    pub memory_utilization: f64,

    pub request_rate: f64,
    pub error_rate: f64,

    pub evaluated_at: u64,
}

impl FitnessMetrics {
    pub fn stamped() -> Self {
        Self {
            evaluated_at: now_unix(),
            ..Default::default()
        }
    }
}

pub(crate) fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// The full outcome of evaluating one individual: its fitness score, the
/// metrics that produced it (absent on failure), how long evaluation took,
/// and an error description if the evaluation degraded to a zero score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub individual: Individual,
    pub fitness: f64,
    pub metrics: Option<FitnessMetrics>,
    pub evaluation_time: f64,
    pub error: Option<String>,
}

impl EvaluationResult {
    pub fn failed(individual: Individual, evaluation_time: f64, error: impl Into<String>) -> Self {
        Self {
            individual,
            fitness: 0.0,
            metrics: None,
            evaluation_time,
            error: Some(error.into()),
        }
    }
}

/// A generation of candidate individuals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Population {
    pub individuals: Vec<Individual>,
    pub generation: u32,
}

impl Population {
    pub fn new(individuals: Vec<Individual>, generation: u32) -> Self {
        Self {
            individuals,
            generation,
        }
    }

    pub fn size(&self) -> usize {
        self.individuals.len()
    }

    /// Diversity is the mean of the per-parameter variances, each normalized
    /// by the square of the configured search-bounds range. The normalizer
    /// is the caller-supplied `SearchBounds` rather than a hardcoded
    /// constant, so diversity stays meaningful if bounds are reconfigured.
    pub fn diversity(&self, bounds: &crate::config::SearchBounds) -> f64 {
        if self.individuals.len() < 2 {
            return 0.0;
        }

        let replicas: Vec<f64> = self.individuals.iter().map(|i| i.replicas as f64).collect();
        let cpu: Vec<f64> = self.individuals.iter().map(|i| i.cpu_limit).collect();
        let mem: Vec<f64> = self
            .individuals
            .iter()
            .map(|i| i.memory_limit as f64)
            .collect();

        let replicas_range = (bounds.replicas_max - bounds.replicas_min) as f64;
        let cpu_range = bounds.cpu_max - bounds.cpu_min;
        let mem_range = (bounds.memory_max - bounds.memory_min) as f64;

        let var_replicas = variance(&replicas) / (replicas_range * replicas_range).max(f64::EPSILON);
        let var_cpu = variance(&cpu) / (cpu_range * cpu_range).max(f64::EPSILON);
        let var_mem = variance(&mem) / (mem_range * mem_range).max(f64::EPSILON);

        ((var_replicas + var_cpu + var_mem) / 3.0).min(1.0)
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Summary statistics for one generation's evaluation results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: u32,
    pub population_size: usize,
    pub avg_fitness: f64,
    pub max_fitness: f64,
    pub min_fitness: f64,
    pub best_individual: Individual,
    pub diversity: f64,
    pub convergence: f64,
}
