//! Configuration structs. Every field has a hardcoded default and can be
//! overridden by an environment variable; `from_env` never panics — a
//! missing or unparseable value silently falls back to the default, the
//! same defensive posture the rest of this crate uses at config boundaries.

use serde::{Deserialize, Serialize};

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// The search space the genetic algorithm samples and mutates within.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchBounds {
    pub replicas_min: u32,
    pub replicas_max: u32,
    pub cpu_min: f64,
    pub cpu_max: f64,
    pub memory_min: u32,
    pub memory_max: u32,
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self {
            replicas_min: 1,
            replicas_max: 6,
            cpu_min: 0.1,
            cpu_max: 2.0,
            memory_min: 128,
            memory_max: 1024,
        }
    }
}

impl SearchBounds {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            replicas_min: env_or("GA_REPLICAS_MIN", default.replicas_min),
            replicas_max: env_or("GA_REPLICAS_MAX", default.replicas_max),
            cpu_min: env_or("GA_CPU_MIN", default.cpu_min),
            cpu_max: env_or("GA_CPU_MAX", default.cpu_max),
            memory_min: env_or("GA_MEMORY_MIN", default.memory_min),
            memory_max: env_or("GA_MEMORY_MAX", default.memory_max),
        }
    }
}

/// Parameters governing the genetic search itself (population shape,
/// operator rates, selection pressure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaParameters {
    pub population_size: usize,
    pub generations: u32,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub elitism_count: usize,
    pub tournament_size: usize,
    pub stabilization_seconds: u64,
    pub bounds: SearchBounds,
}

impl Default for GaParameters {
    fn default() -> Self {
        Self {
            population_size: 6,
            generations: 5,
            mutation_rate: 0.2,
            crossover_rate: 0.8,
            elitism_count: 1,
            tournament_size: 2,
            stabilization_seconds: 30,
            bounds: SearchBounds::default(),
        }
    }
}

impl GaParameters {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            population_size: env_or("GA_POPULATION", default.population_size),
            generations: env_or("GA_GENERATIONS", default.generations),
            mutation_rate: env_or("GA_MUTATION_RATE", default.mutation_rate),
            crossover_rate: env_or("GA_CROSSOVER_RATE", default.crossover_rate),
            elitism_count: env_or("GA_ELITISM_COUNT", default.elitism_count),
            tournament_size: env_or("GA_TOURNAMENT_SIZE", default.tournament_size),
            stabilization_seconds: env_or(
                "GA_STABILIZATION_SECONDS",
                default.stabilization_seconds,
            ),
            bounds: SearchBounds::from_env(),
        }
    }
}

/// Identifies the target deployment and the workload URL exercised by the
/// load generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub url: String,
    pub label: String,
    pub deployment_name: String,
    pub namespace: String,
    pub container_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            url: "http://app-ga.default.svc.cluster.local:8080".into(),
            label: "app-ga".into(),
            deployment_name: "app-ga".into(),
            namespace: "default".into(),
            container_name: "app-ga".into(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            url: std::env::var("APP_URL").unwrap_or(default.url),
            label: std::env::var("APP_LABEL").unwrap_or(default.label),
            deployment_name: std::env::var("K8S_DEPLOYMENT_NAME").unwrap_or(default.deployment_name),
            namespace: std::env::var("K8S_NAMESPACE").unwrap_or(default.namespace),
            container_name: std::env::var("K8S_CONTAINER_NAME").unwrap_or(default.container_name),
        }
    }
}

/// Platform (cluster) gateway configuration: where the control-plane shim
/// lives, whether mutations are actually applied, and how long to wait for
/// a rollout to converge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub api_base_url: String,
    pub dry_run: bool,
    pub rollout_timeout_seconds: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8001".into(),
            dry_run: false,
            rollout_timeout_seconds: 120,
        }
    }
}

impl ClusterConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        let dry_run = std::env::var("GA_DRY_RUN")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(default.dry_run);
        Self {
            api_base_url: std::env::var("K8S_API_BASE_URL").unwrap_or(default.api_base_url),
            dry_run,
            rollout_timeout_seconds: env_or("K8S_ROLLOUT_TIMEOUT", default.rollout_timeout_seconds),
        }
    }
}

/// Prometheus (telemetry) gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    pub url: String,
    pub query_timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_seconds: f64,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: "http://prometheus-kube-prometheus-prometheus.monitoring.svc.cluster.local:9090"
                .into(),
            query_timeout_seconds: 10,
            retry_attempts: 3,
            retry_delay_seconds: 1.0,
        }
    }
}

impl PrometheusConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            url: std::env::var("PROMETHEUS_URL").unwrap_or(default.url),
            query_timeout_seconds: env_or("PROM_QUERY_TIMEOUT", default.query_timeout_seconds),
            retry_attempts: env_or("PROM_RETRY_ATTEMPTS", default.retry_attempts),
            retry_delay_seconds: env_or("PROM_RETRY_DELAY", default.retry_delay_seconds),
        }
    }
}

/// Load generator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestConfig {
    pub duration_seconds: u64,
    pub concurrency: usize,
    pub timeout_seconds: u64,
    pub ramp_up_seconds: u64,
    pub profile: String,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 30,
            concurrency: 20,
            timeout_seconds: 10,
            ramp_up_seconds: 0,
            profile: "sustained".into(),
        }
    }
}

impl LoadTestConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            duration_seconds: env_or("LOAD_TEST_DURATION", default.duration_seconds),
            concurrency: env_or("LOAD_TEST_CONCURRENCY", default.concurrency),
            timeout_seconds: env_or("LOAD_TEST_TIMEOUT", default.timeout_seconds),
            ramp_up_seconds: env_or("LOAD_TEST_RAMP_UP", default.ramp_up_seconds),
            profile: std::env::var("LOAD_TEST_PROFILE").unwrap_or(default.profile),
        }
    }
}
