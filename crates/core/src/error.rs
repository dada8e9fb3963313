//! Error types for every gateway and the top-level driver.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("invalid {field}: {value} (must be between {min} and {max})")]
    OutOfBounds {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("failed to parse env var {name}={raw:?}: {source}")]
    InvalidEnvVar {
        name: &'static str,
        raw: String,
        #[source]
        source: std::num::ParseFloatError,
    },
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("failed to read deployment {name} in namespace {namespace}: {source}")]
    Read {
        name: String,
        namespace: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to scale deployment {name} to {replicas} replicas: {source}")]
    Scale {
        name: String,
        replicas: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to patch resources on deployment {name}: {source}")]
    Patch {
        name: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("unexpected response body while parsing deployment status: {0}")]
    MalformedStatus(String),
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("query failed after {attempts} attempts: {last_error}")]
    QueryFailed { attempts: u32, last_error: String },
    #[error("telemetry endpoint returned malformed body: {0}")]
    MalformedBody(String),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("load test worker pool failed to join: {0}")]
    WorkerPanicked(String),
}

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Root error for anything that can abort a whole optimization run.
#[derive(Debug, Error)]
pub enum TuneError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error("no evaluations produced a fitness score")]
    EmptyGeneration,
}
