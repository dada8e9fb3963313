//! End-to-end tests driving the `restune` binary against an in-process mock
//! backend that stands in for the Kubernetes API and Prometheus. The mock
//! serves every endpoint the cluster/telemetry gateways and the load
//! generator hit, on a single ephemeral port, so one server fixture covers
//! `run`, `validate`, and `export`.

use std::io::Write;
use std::thread;

use assert_cmd::Command;
use tempfile::NamedTempFile;
use tiny_http::{Response, Server};

/// Starts a mock backend on an OS-assigned port and returns its base URL.
/// The server answers forever in a detached thread; it dies with the test
/// process, which is fine for a short-lived fixture.
fn spawn_mock_backend() -> String {
    let server = Server::http("127.0.0.1:0").expect("failed to bind mock backend");
    let addr = server.server_addr().to_string();

    thread::spawn(move || {
        for request in server.incoming_requests() {
            let url = request.url().to_string();
            let body = if url.starts_with("/apis/apps/v1") {
                deployment_body()
            } else if url.starts_with("/api/v1/query") {
                prometheus_body()
            } else {
                "ok".to_string()
            };
            let response = Response::from_string(body)
                .with_header("Content-Type: application/json".parse::<tiny_http::Header>().unwrap());
            let _ = request.respond(response);
        }
    });

    format!("http://{addr}")
}

fn deployment_body() -> String {
    r#"{
        "spec": { "template": { "spec": { "containers": [
            { "name": "app-under-test", "resources": { "limits": { "cpu": "500m", "memory": "512Mi" } } }
        ] } } },
        "status": {
            "replicas": 2,
            "updatedReplicas": 2,
            "availableReplicas": 2,
            "readyReplicas": 2
        }
    }"#
    .to_string()
}

fn prometheus_body() -> String {
    r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{},"value":[0,"12.5"]}]}}"#
        .to_string()
}

fn write_config(backend_url: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"{{
            "ga": {{
                "population_size": 2,
                "generations": 2,
                "mutation_rate": 0.2,
                "crossover_rate": 0.8,
                "elitism_count": 1,
                "tournament_size": 2,
                "stabilization_seconds": 0,
                "bounds": {{
                    "replicas_min": 1, "replicas_max": 4,
                    "cpu_min": 0.1, "cpu_max": 1.0,
                    "memory_min": 128, "memory_max": 512
                }}
            }},
            "app": {{
                "url": "{backend_url}",
                "label": "app-under-test",
                "deployment_name": "app-under-test",
                "namespace": "default",
                "container_name": "app-under-test"
            }},
            "cluster": {{
                "api_base_url": "{backend_url}",
                "dry_run": true,
                "rollout_timeout_seconds": 5
            }},
            "prometheus": {{
                "url": "{backend_url}",
                "query_timeout_seconds": 2,
                "retry_attempts": 1,
                "retry_delay_seconds": 0.1
            }},
            "load": {{
                "duration_seconds": 1,
                "concurrency": 1,
                "timeout_seconds": 2,
                "ramp_up_seconds": 0,
                "profile": "sustained"
            }}
        }}"#
    )
    .unwrap();
    file
}

#[test]
fn run_command_completes_a_search_against_the_mock_backend() -> Result<(), Box<dyn std::error::Error>> {
    let backend_url = spawn_mock_backend();
    let config_file = write_config(&backend_url);
    let output_file = NamedTempFile::new()?;

    Command::cargo_bin("restune")?
        .arg("run")
        .arg("--config")
        .arg(config_file.path())
        .arg("--output")
        .arg(output_file.path())
        .assert()
        .success();

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(output_file.path())?)?;
    assert!(summary["best_individual"]["replicas"].is_u64());
    assert_eq!(summary["generations"].as_array().unwrap().len(), 2);
    assert!(summary["best_fitness"].as_f64().unwrap() >= 0.0);

    Ok(())
}

#[test]
fn validate_command_accepts_a_well_formed_config() -> Result<(), Box<dyn std::error::Error>> {
    let backend_url = spawn_mock_backend();
    let config_file = write_config(&backend_url);

    Command::cargo_bin("restune")?
        .arg("validate")
        .arg("--config")
        .arg(config_file.path())
        .assert()
        .success()
        .stdout(predicates::str::contains("Config OK"));

    Ok(())
}

#[test]
fn validate_command_rejects_inverted_replica_bounds() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        r#"{{ "ga": {{ "bounds": {{ "replicas_min": 10, "replicas_max": 2 }} }} }}"#
    )?;

    Command::cargo_bin("restune")?
        .arg("validate")
        .arg("--config")
        .arg(file.path())
        .assert()
        .failure();

    Ok(())
}

#[test]
fn export_command_converts_a_run_summary_into_a_deployment_patch() -> Result<(), Box<dyn std::error::Error>> {
    let summary_file = NamedTempFile::new()?;
    writeln!(
        summary_file.as_file(),
        r#"{{
            "best_individual": {{ "replicas": 3, "cpu_limit": 0.75, "memory_limit": 768 }},
            "best_fitness": 0.91,
            "generations": []
        }}"#
    )?;
    let output_file = NamedTempFile::new()?;

    Command::cargo_bin("restune")?
        .arg("export")
        .arg("--state")
        .arg(summary_file.path())
        .arg("--output")
        .arg(output_file.path())
        .assert()
        .success();

    let patch: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(output_file.path())?)?;
    assert_eq!(patch["replicas"], 3);
    assert_eq!(patch["cpu_limit"], "750m");
    assert_eq!(patch["memory_limit"], "768Mi");
    assert_eq!(patch["fitness"], 0.91);

    Ok(())
}
