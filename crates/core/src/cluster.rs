//! C2: cluster gateway. Applies a candidate [`Individual`] to a running
//! deployment (scale, then patch container resources), waits for the
//! rollout to converge, and can snapshot the previous configuration for
//! rollback. Talks to a Kubernetes-API-compatible endpoint (e.g. `kubectl
//! proxy`, hence the default `http://localhost:8001` base URL) rather than
//! embedding a full client library — the surface this crate needs is a
//! handful of REST calls.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;

use crate::config::{AppConfig, ClusterConfig};
use crate::error::{ConfigurationError, PlatformError};
use crate::types::Individual;

const ROLLOUT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Validation bounds applied before any configuration reaches the cluster.
/// Deliberately wider than the genetic search's [`crate::config::SearchBounds`] —
/// this is a last-ditch sanity check against the platform, not the search
/// space the optimizer explores.
const REPLICAS_MIN: u32 = 1;
const REPLICAS_MAX: u32 = 100;
const CPU_MIN: f64 = 0.01;
const CPU_MAX: f64 = 100.0;
const MEMORY_MIN: u32 = 64;
const MEMORY_MAX: u32 = 100_000;

pub fn validate_configuration(individual: &Individual) -> Result<(), ConfigurationError> {
    if individual.replicas < REPLICAS_MIN || individual.replicas > REPLICAS_MAX {
        return Err(ConfigurationError::OutOfBounds {
            field: "replicas",
            value: individual.replicas as f64,
            min: REPLICAS_MIN as f64,
            max: REPLICAS_MAX as f64,
        });
    }
    if individual.cpu_limit < CPU_MIN || individual.cpu_limit > CPU_MAX {
        return Err(ConfigurationError::OutOfBounds {
            field: "cpu_limit",
            value: individual.cpu_limit,
            min: CPU_MIN,
            max: CPU_MAX,
        });
    }
    if individual.memory_limit < MEMORY_MIN || individual.memory_limit > MEMORY_MAX {
        return Err(ConfigurationError::OutOfBounds {
            field: "memory_limit",
            value: individual.memory_limit as f64,
            min: MEMORY_MIN as f64,
            max: MEMORY_MAX as f64,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentStatus {
    pub replicas: u32,
    pub updated_replicas: u32,
    pub available_replicas: u32,
    pub ready_replicas: u32,
    pub unavailable_replicas: u32,
}

impl DeploymentStatus {
    fn converged(&self) -> bool {
        self.replicas > 0
            && self.replicas == self.updated_replicas
            && self.replicas == self.available_replicas
            && self.replicas == self.ready_replicas
    }
}

pub trait ClusterGateway: Send + Sync {
    fn apply_configuration(&self, individual: &Individual, save_for_rollback: bool) -> Result<(), PlatformError>;
    fn wait_for_rollout(&self, timeout: Duration) -> Result<bool, PlatformError>;
    fn deployment_status(&self) -> Result<Option<DeploymentStatus>, PlatformError>;
    fn rollback(&self) -> Result<bool, PlatformError>;
}

#[derive(Debug, Deserialize)]
struct DeploymentResponse {
    spec: DeploymentSpec,
    #[serde(default)]
    status: Option<DeploymentStatusBody>,
}

#[derive(Debug, Deserialize)]
struct DeploymentSpec {
    template: PodTemplateSpec,
}

#[derive(Debug, Deserialize)]
struct PodTemplateSpec {
    spec: PodSpec,
}

#[derive(Debug, Deserialize)]
struct PodSpec {
    containers: Vec<ContainerSpec>,
}

#[derive(Debug, Deserialize)]
struct ContainerSpec {
    name: String,
    resources: Option<ResourcesSpec>,
}

#[derive(Debug, Deserialize)]
struct ResourcesSpec {
    limits: Option<ResourceQuantities>,
}

#[derive(Debug, Deserialize)]
struct ResourceQuantities {
    cpu: Option<String>,
    memory: Option<String>,
}

// Kubernetes' own API serializes these fields in camelCase; the mock
// backend in the e2e tests mirrors that, not snake_case.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DeploymentStatusBody {
    #[serde(default)]
    replicas: u32,
    #[serde(default)]
    updated_replicas: u32,
    #[serde(default)]
    available_replicas: u32,
    #[serde(default)]
    ready_replicas: u32,
    #[serde(default)]
    unavailable_replicas: u32,
}

fn parse_cpu(raw: &str) -> f64 {
    raw.strip_suffix('m')
        .and_then(|v| v.parse::<f64>().ok())
        .map(|millis| millis / 1000.0)
        .or_else(|| raw.parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn parse_memory(raw: &str) -> u32 {
    raw.strip_suffix("Mi")
        .or_else(|| raw.strip_suffix('M'))
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0)
}

pub struct K8sClusterGateway {
    config: ClusterConfig,
    app: AppConfig,
    client: reqwest::blocking::Client,
    last_config: Mutex<Option<Individual>>,
}

impl K8sClusterGateway {
    pub fn new(config: ClusterConfig, app: AppConfig) -> Self {
        Self {
            config,
            app,
            client: reqwest::blocking::Client::new(),
            last_config: Mutex::new(None),
        }
    }

    fn deployment_url(&self) -> String {
        format!(
            "{}/apis/apps/v1/namespaces/{}/deployments/{}",
            self.config.api_base_url, self.app.namespace, self.app.deployment_name
        )
    }

    fn fetch_deployment(&self) -> Result<DeploymentResponse, PlatformError> {
        self.client
            .get(self.deployment_url())
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json::<DeploymentResponse>())
            .map_err(|source| PlatformError::Read {
                name: self.app.deployment_name.clone(),
                namespace: self.app.namespace.clone(),
                source,
            })
    }

    fn snapshot_current(&self) -> Result<Individual, PlatformError> {
        let deployment = self.fetch_deployment()?;
        let container = deployment
            .spec
            .template
            .spec
            .containers
            .iter()
            .find(|c| c.name == self.app.container_name)
            .ok_or_else(|| {
                PlatformError::MalformedStatus(format!(
                    "container {} not found in deployment spec",
                    self.app.container_name
                ))
            })?;

        let limits = container
            .resources
            .as_ref()
            .and_then(|r| r.limits.as_ref());
        let cpu = limits
            .and_then(|l| l.cpu.as_deref())
            .map(parse_cpu)
            .unwrap_or(0.0);
        let memory = limits
            .and_then(|l| l.memory.as_deref())
            .map(parse_memory)
            .unwrap_or(0);
        let replicas = deployment
            .status
            .as_ref()
            .map(|s| s.replicas)
            .unwrap_or(0);

        Ok(Individual {
            replicas,
            cpu_limit: cpu,
            memory_limit: memory,
            container_name: Some(self.app.container_name.clone()),
        })
    }

    fn scale(&self, replicas: u32) -> Result<(), PlatformError> {
        if self.config.dry_run {
            tracing::info!(replicas, "dry-run: skipping scale");
            return Ok(());
        }
        let body = json!({ "spec": { "replicas": replicas } });
        self.client
            .patch(format!("{}/scale", self.deployment_url()))
            .header("Content-Type", "application/merge-patch+json")
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .map(|_| ())
            .map_err(|source| PlatformError::Scale {
                name: self.app.deployment_name.clone(),
                replicas,
                source,
            })
    }

    fn patch_resources(&self, individual: &Individual) -> Result<(), PlatformError> {
        if self.config.dry_run {
            tracing::info!(cpu = individual.cpu_limit, memory = individual.memory_limit, "dry-run: skipping resource patch");
            return Ok(());
        }
        let cpu_m = format!("{}m", (individual.cpu_limit * 1000.0) as i64);
        let mem = format!("{}Mi", individual.memory_limit);
        let body = json!({
            "spec": { "template": { "spec": { "containers": [{
                "name": self.app.container_name,
                "resources": {
                    "requests": { "cpu": cpu_m, "memory": mem },
                    "limits": { "cpu": cpu_m, "memory": mem },
                }
            }] } } }
        });
        self.client
            .patch(self.deployment_url())
            .header("Content-Type", "application/strategic-merge-patch+json")
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .map(|_| ())
            .map_err(|source| PlatformError::Patch {
                name: self.app.deployment_name.clone(),
                source,
            })
    }
}

impl ClusterGateway for K8sClusterGateway {
    fn apply_configuration(&self, individual: &Individual, save_for_rollback: bool) -> Result<(), PlatformError> {
        validate_configuration(individual)?;

        if save_for_rollback && !self.config.dry_run {
            match self.snapshot_current() {
                Ok(previous) => *self.last_config.lock().unwrap() = Some(previous),
                Err(err) => tracing::warn!(%err, "failed to snapshot current configuration, rollback unavailable"),
            }
        }

        // scale before patching resources, matching the platform's own
        // ordering for this deployment kind
        self.scale(individual.replicas)?;
        self.patch_resources(individual)?;
        Ok(())
    }

    fn wait_for_rollout(&self, timeout: Duration) -> Result<bool, PlatformError> {
        let start = Instant::now();
        loop {
            if let Some(status) = self.deployment_status()? {
                if status.unavailable_replicas > 0 {
                    tracing::warn!(
                        unavailable = status.unavailable_replicas,
                        "deployment has unavailable replicas during rollout"
                    );
                }
                if status.converged() {
                    return Ok(true);
                }
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            std::thread::sleep(ROLLOUT_POLL_INTERVAL);
        }
    }

    fn deployment_status(&self) -> Result<Option<DeploymentStatus>, PlatformError> {
        let deployment = self.fetch_deployment()?;
        Ok(deployment.status.map(|s| DeploymentStatus {
            replicas: s.replicas,
            updated_replicas: s.updated_replicas,
            available_replicas: s.available_replicas,
            ready_replicas: s.ready_replicas,
            unavailable_replicas: s.unavailable_replicas,
        }))
    }

    fn rollback(&self) -> Result<bool, PlatformError> {
        let previous = self.last_config.lock().unwrap().clone();
        match previous {
            Some(individual) => {
                self.apply_configuration(&individual, false)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_values_within_wide_bounds() {
        assert!(validate_configuration(&Individual::new(50, 5.0, 2048)).is_ok());
    }

    #[test]
    fn validate_rejects_replicas_outside_wide_bounds() {
        let err = validate_configuration(&Individual::new(0, 0.5, 256));
        assert!(matches!(err, Err(ConfigurationError::OutOfBounds { field: "replicas", .. })));
    }

    #[test]
    fn validate_rejects_cpu_outside_wide_bounds() {
        let err = validate_configuration(&Individual::new(2, 150.0, 256));
        assert!(matches!(err, Err(ConfigurationError::OutOfBounds { field: "cpu_limit", .. })));
    }

    #[test]
    fn parse_cpu_handles_millicores_and_whole_cores() {
        assert_eq!(parse_cpu("500m"), 0.5);
        assert_eq!(parse_cpu("2"), 2.0);
    }

    #[test]
    fn parse_memory_handles_mi_and_m_suffix() {
        assert_eq!(parse_memory("512Mi"), 512);
        assert_eq!(parse_memory("256M"), 256);
    }

    #[test]
    fn deployment_status_converged_requires_all_counts_to_match_and_be_nonzero() {
        let converged = DeploymentStatus {
            replicas: 3,
            updated_replicas: 3,
            available_replicas: 3,
            ready_replicas: 3,
            unavailable_replicas: 0,
        };
        assert!(converged.converged());

        let zero = DeploymentStatus {
            replicas: 0,
            updated_replicas: 0,
            available_replicas: 0,
            ready_replicas: 0,
            unavailable_replicas: 0,
        };
        assert!(!zero.converged());

        let partial = DeploymentStatus {
            replicas: 3,
            updated_replicas: 3,
            available_replicas: 2,
            ready_replicas: 3,
            unavailable_replicas: 1,
        };
        assert!(!partial.converged());
    }

    #[test]
    fn deployment_status_body_parses_k8s_camel_case_field_names() {
        let body: DeploymentStatusBody = serde_json::from_str(
            r#"{"replicas": 3, "updatedReplicas": 3, "availableReplicas": 2, "readyReplicas": 3, "unavailableReplicas": 1}"#,
        )
        .unwrap();
        assert_eq!(body.replicas, 3);
        assert_eq!(body.updated_replicas, 3);
        assert_eq!(body.available_replicas, 2);
        assert_eq!(body.ready_replicas, 3);
        assert_eq!(body.unavailable_replicas, 1);
    }
}
