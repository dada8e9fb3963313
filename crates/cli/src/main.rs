use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use restune_core::cluster::{ClusterGateway, K8sClusterGateway};
use restune_core::config::{AppConfig, ClusterConfig, GaParameters, LoadTestConfig, PrometheusConfig};
use restune_core::load::HttpExecutor;
use restune_core::optimizer::{GeneticOptimizer, OptimizerHandles, RunSummary};
use restune_core::telemetry::PrometheusGateway;
use serde::{Deserialize, Serialize};
use tiny_http::{Response, Server};

#[derive(Parser)]
#[command(name = "restune", version, about = "Autonomous Kubernetes resource tuner")]
struct Cli {
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,
    #[arg(long, default_value = "info")]
    log_level: String,
    #[arg(long)]
    metrics_addr: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the genetic search against a live deployment and apply the best
    /// configuration found.
    Run {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        parallel: bool,
        #[arg(long, default_value_t = 2)]
        max_workers: usize,
    },
    /// Validate a tuning config file without running anything.
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
    /// Re-export a completed run's summary as a deployment resource patch.
    Export {
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// On-disk tuning config: one JSON file bundling every sub-config this crate
/// needs. Any section left out falls back to that section's own defaults
/// (which can themselves be overridden by environment variables when the
/// whole file is omitted, via `TuneConfig::from_env`).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TuneConfig {
    #[serde(default = "GaParameters::default")]
    ga: GaParameters,
    #[serde(default = "AppConfig::default")]
    app: AppConfig,
    #[serde(default = "ClusterConfig::default")]
    cluster: ClusterConfig,
    #[serde(default = "PrometheusConfig::default")]
    prometheus: PrometheusConfig,
    #[serde(default = "LoadTestConfig::default")]
    load: LoadTestConfig,
}

impl TuneConfig {
    fn from_env() -> Self {
        Self {
            ga: GaParameters::from_env(),
            app: AppConfig::from_env(),
            cluster: ClusterConfig::from_env(),
            prometheus: PrometheusConfig::from_env(),
            load: LoadTestConfig::from_env(),
        }
    }

    fn validate(&self) -> Result<()> {
        let bounds = &self.ga.bounds;
        if bounds.replicas_min == 0 || bounds.replicas_min > bounds.replicas_max {
            return Err(miette::miette!(
                "replicas bounds must satisfy 1 <= min <= max (got {}..={})",
                bounds.replicas_min,
                bounds.replicas_max
            ));
        }
        if bounds.cpu_min <= 0.0 || bounds.cpu_min > bounds.cpu_max {
            return Err(miette::miette!(
                "cpu bounds must satisfy 0 < min <= max (got {}..={})",
                bounds.cpu_min,
                bounds.cpu_max
            ));
        }
        if bounds.memory_min == 0 || bounds.memory_min > bounds.memory_max {
            return Err(miette::miette!(
                "memory bounds must satisfy 0 < min <= max (got {}..={})",
                bounds.memory_min,
                bounds.memory_max
            ));
        }
        if self.ga.population_size == 0 {
            return Err(miette::miette!("population_size must be > 0"));
        }
        if self.ga.generations == 0 {
            return Err(miette::miette!("generations must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.ga.mutation_rate) {
            return Err(miette::miette!("mutation_rate must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.ga.crossover_rate) {
            return Err(miette::miette!("crossover_rate must be within [0, 1]"));
        }
        if self.ga.elitism_count > self.ga.population_size {
            return Err(miette::miette!("elitism_count cannot exceed population_size"));
        }
        if self.ga.tournament_size == 0 {
            return Err(miette::miette!("tournament_size must be > 0"));
        }
        Ok(())
    }
}

struct Metrics {
    registry: Registry,
    generations_completed: IntCounter,
    individuals_evaluated: IntCounter,
    best_fitness: Gauge,
    eval_seconds: Histogram,
}

impl Metrics {
    fn init(addr: Option<&str>) -> Result<Arc<Self>> {
        let registry = Registry::new();
        let generations_completed = IntCounter::new(
            "restune_generations_completed",
            "Number of GA generations completed",
        )
        .into_diagnostic()?;
        let individuals_evaluated = IntCounter::new(
            "restune_individuals_evaluated",
            "Number of individuals evaluated",
        )
        .into_diagnostic()?;
        let best_fitness =
            Gauge::new("restune_best_fitness", "Best fitness score seen so far").into_diagnostic()?;
        let eval_seconds = Histogram::with_opts(HistogramOpts::new(
            "restune_eval_seconds",
            "Per-individual evaluation latency in seconds",
        ))
        .into_diagnostic()?;

        registry
            .register(Box::new(generations_completed.clone()))
            .into_diagnostic()?;
        registry
            .register(Box::new(individuals_evaluated.clone()))
            .into_diagnostic()?;
        registry
            .register(Box::new(best_fitness.clone()))
            .into_diagnostic()?;
        registry
            .register(Box::new(eval_seconds.clone()))
            .into_diagnostic()?;

        let metrics = Arc::new(Self {
            registry,
            generations_completed,
            individuals_evaluated,
            best_fitness,
            eval_seconds,
        });

        if let Some(addr) = addr {
            let registry = metrics.registry.clone();
            let addr = addr.to_string();
            thread::spawn(move || start_metrics_server(&addr, &registry));
        }

        Ok(metrics)
    }

    fn record_generation(&self, stats: &restune_core::types::GenerationStats) {
        self.generations_completed.inc();
        self.individuals_evaluated.inc_by(stats.population_size as u64);
        if stats.max_fitness > self.best_fitness.get() {
            self.best_fitness.set(stats.max_fitness);
        }
    }
}

fn start_metrics_server(addr: &str, registry: &Registry) {
    let server = match Server::http(addr) {
        Ok(server) => server,
        Err(err) => {
            tracing::warn!(%err, addr, "failed to bind metrics server");
            return;
        }
    };
    for request in server.incoming_requests() {
        let encoder = TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_ok() {
            let response = Response::from_data(buffer);
            let _ = request.respond(response);
        }
    }
}

fn init_tracing(log_format: LogFormat, log_level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .into_diagnostic()?;
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    match log_format {
        LogFormat::Json => fmt.json().init(),
        LogFormat::Pretty => fmt.init(),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = std::env::var("GA_LOG_LEVEL").unwrap_or_else(|_| cli.log_level.clone());
    init_tracing(cli.log_format, &log_level)?;
    let metrics = Metrics::init(cli.metrics_addr.as_deref())?;

    match cli.command {
        Commands::Run {
            config,
            output,
            parallel,
            max_workers,
        } => run_command(config.as_deref(), output.as_deref(), parallel, max_workers, &metrics),
        Commands::Validate { config } => validate_command(&config),
        Commands::Export { state, output } => export_command(&state, output.as_deref()),
    }
}

fn load_tune_config(path: Option<&Path>) -> Result<TuneConfig> {
    match path {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .into_diagnostic()
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let config: TuneConfig = serde_json::from_str(&contents)
                .into_diagnostic()
                .with_context(|| format!("invalid config JSON in {}", path.display()))?;
            Ok(config)
        }
        None => Ok(TuneConfig::from_env()),
    }
}

fn run_command(
    config_path: Option<&Path>,
    output_path: Option<&Path>,
    parallel: bool,
    max_workers: usize,
    metrics: &Metrics,
) -> Result<()> {
    let config = load_tune_config(config_path)?;
    config.validate()?;
    tracing::info!(
        population = config.ga.population_size,
        generations = config.ga.generations,
        "starting tuning run"
    );

    let rollout_timeout = Duration::from_secs(config.cluster.rollout_timeout_seconds);
    let handles = OptimizerHandles {
        cluster: Box::new(K8sClusterGateway::new(config.cluster, config.app.clone())) as Box<dyn ClusterGateway>,
        telemetry: Box::new(PrometheusGateway::new(config.prometheus)),
        executor: Box::new(HttpExecutor::default()),
    };

    let mut optimizer = GeneticOptimizer::new(
        config.ga,
        config.app,
        config.load,
        rollout_timeout,
        handles,
    );

    let best = optimizer
        .run(parallel, max_workers)
        .into_diagnostic()
        .context("genetic search failed")?;

    for stats in optimizer.history() {
        metrics.record_generation(stats);
    }
    for result in optimizer.evaluation_results() {
        metrics.eval_seconds.observe(result.evaluation_time);
    }

    let best_fitness = optimizer
        .history()
        .last()
        .map(|s| s.max_fitness)
        .unwrap_or(0.0);
    let summary = RunSummary {
        best_individual: best,
        best_fitness,
        generations: optimizer.history().to_vec(),
    };

    write_output(output_path, &summary)
}

fn validate_command(config_path: &Path) -> Result<()> {
    let config = load_tune_config(Some(config_path))?;
    config.validate()?;
    println!("Config OK");
    Ok(())
}

fn export_command(state_path: &Path, output_path: Option<&Path>) -> Result<()> {
    let contents = fs::read_to_string(state_path)
        .into_diagnostic()
        .with_context(|| format!("failed to read run summary {}", state_path.display()))?;
    let summary: RunSummary = serde_json::from_str(&contents)
        .into_diagnostic()
        .with_context(|| format!("invalid run summary JSON in {}", state_path.display()))?;

    let patch = DeploymentPatch::from_individual(&summary.best_individual, summary.best_fitness);
    write_output(output_path, &patch)
}

/// A standalone artifact describing the resource patch a cluster operator
/// would apply by hand, independent of the live `apply_configuration` path —
/// useful for review, or for clusters this crate was never given write
/// access to.
#[derive(Debug, Serialize, Deserialize)]
struct DeploymentPatch {
    replicas: u32,
    cpu_request: String,
    cpu_limit: String,
    memory_request: String,
    memory_limit: String,
    fitness: f64,
}

impl DeploymentPatch {
    fn from_individual(individual: &restune_core::types::Individual, fitness: f64) -> Self {
        let cpu = format!("{}m", (individual.cpu_limit * 1000.0) as i64);
        let memory = format!("{}Mi", individual.memory_limit);
        Self {
            replicas: individual.replicas,
            cpu_request: cpu.clone(),
            cpu_limit: cpu,
            memory_request: memory.clone(),
            memory_limit: memory,
            fitness,
        }
    }
}

fn write_output<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let data = serde_json::to_string_pretty(value).into_diagnostic()?;
    if let Some(path) = path {
        fs::write(path, data)
            .into_diagnostic()
            .with_context(|| format!("failed to write output file {}", path.display()))?;
    } else {
        println!("{}", data);
    }
    Ok(())
}
