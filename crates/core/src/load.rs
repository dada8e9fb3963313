//! C3: concurrent HTTP load generator. Runs a fixed-size worker pool for a
//! configured duration, recording per-request latency and success/failure
//! under a shared mutex; each worker buffers its own latencies locally and
//! flushes once at shutdown rather than contending on every request.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::LoadTestConfig;
use crate::error::LoadError;
use crate::profile::WorkloadProfile;

const INTER_REQUEST_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadTestResult {
    pub success: u64,
    pub fail: u64,
    pub total: u64,
    pub avg_latency: f64,
    pub min_latency: f64,
    pub max_latency: f64,
    pub p50_latency: f64,
    pub p95_latency: f64,
    pub p99_latency: f64,
    pub throughput: f64,
    pub success_rate: f64,
    pub duration: f64,
    #[serde(skip)]
    latencies: Vec<f64>,
}

impl LoadTestResult {
    fn percentile(sorted_latencies: &[f64], p: f64) -> f64 {
        if sorted_latencies.is_empty() {
            return 0.0;
        }
        let index = ((sorted_latencies.len() as f64) * p) as usize;
        let index = index.min(sorted_latencies.len() - 1);
        sorted_latencies[index]
    }

    fn finalize(mut self) -> Self {
        self.total = self.success + self.fail;
        self.success_rate = if self.total > 0 {
            self.success as f64 / self.total as f64
        } else {
            0.0
        };
        self.throughput = if self.duration > 0.0 {
            self.total as f64 / self.duration
        } else {
            0.0
        };

        if self.latencies.is_empty() {
            return self;
        }

        let mut sorted = self.latencies.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        self.avg_latency = sorted.iter().sum::<f64>() / sorted.len() as f64;
        self.min_latency = sorted[0];
        self.max_latency = sorted[sorted.len() - 1];
        self.p50_latency = Self::percentile(&sorted, 0.50);
        self.p95_latency = Self::percentile(&sorted, 0.95);
        self.p99_latency = Self::percentile(&sorted, 0.99);
        self
    }
}

/// A request sender abstracted behind a trait so tests can substitute a
/// fake transport without spinning up a real HTTP server for every case.
pub trait RequestExecutor: Send + Sync {
    fn execute(&self, url: &str, timeout: Duration) -> Result<u16, String>;
}

pub struct HttpExecutor {
    client: reqwest::blocking::Client,
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl RequestExecutor for HttpExecutor {
    fn execute(&self, url: &str, timeout: Duration) -> Result<u16, String> {
        self.client
            .get(url)
            .timeout(timeout)
            .send()
            .map(|resp| resp.status().as_u16())
            .map_err(|e| e.to_string())
    }
}

pub struct LoadGenerator {
    config: LoadTestConfig,
    profile: Option<WorkloadProfile>,
}

impl LoadGenerator {
    pub fn new(config: LoadTestConfig) -> Self {
        let profile = WorkloadProfile::parse(&config.profile);
        if profile.is_none() {
            tracing::warn!(profile = %config.profile, "unknown workload profile, falling back to fixed concurrency");
        }
        Self { config, profile }
    }

    pub fn run(&self, url: &str, executor: &dyn RequestExecutor) -> Result<LoadTestResult, LoadError> {
        let num_workers = self
            .profile
            .as_ref()
            .map(|p| p.max_concurrency)
            .unwrap_or(self.config.concurrency);

        let duration = Duration::from_secs(self.config.duration_seconds);
        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let deadline = Instant::now() + duration;
        let start = Instant::now();

        let success_count = AtomicUsize::new(0);
        let fail_count = AtomicUsize::new(0);
        let latencies: Mutex<Vec<f64>> = Mutex::new(Vec::new());

        tracing::info!(
            url,
            workers = num_workers,
            duration_s = self.config.duration_seconds,
            profile = self.profile.as_ref().map(|p| p.name).unwrap_or("fixed"),
            "starting load test"
        );

        let observed_concurrency = AtomicUsize::new(0);

        std::thread::scope(|scope| -> Result<(), LoadError> {
            let mut handles = Vec::with_capacity(num_workers);
            for _ in 0..num_workers {
                let success_count = &success_count;
                let fail_count = &fail_count;
                let latencies = &latencies;
                let observed_concurrency = &observed_concurrency;
                let profile = self.profile.as_ref();
                handles.push(scope.spawn(move || {
                    let mut rng = rand::rng();
                    let mut worker_latencies = Vec::new();
                    while Instant::now() < deadline {
                        if let Some(profile) = profile {
                            let elapsed = start.elapsed().as_secs_f64();
                            let sample = rng.random_range(0.3..1.0);
                            observed_concurrency.store(profile.concurrency_at(elapsed, sample), Ordering::Relaxed);
                        }

                        let req_start = Instant::now();
                        match executor.execute(url, timeout) {
                            Ok(status) if status == 200 => {
                                success_count.fetch_add(1, Ordering::Relaxed);
                                worker_latencies.push(req_start.elapsed().as_secs_f64());
                            }
                            Ok(_) => {
                                fail_count.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(err) => {
                                fail_count.fetch_add(1, Ordering::Relaxed);
                                tracing::debug!(error = %err, "load test request failed");
                            }
                        }

                        std::thread::sleep(INTER_REQUEST_DELAY);
                    }
                    latencies.lock().unwrap().extend(worker_latencies);
                }));
            }

            for handle in handles {
                handle.join().map_err(|_| LoadError::WorkerPanicked("panic in load worker".into()))?;
            }
            Ok(())
        })?;

        let result = LoadTestResult {
            success: success_count.load(Ordering::Relaxed) as u64,
            fail: fail_count.load(Ordering::Relaxed) as u64,
            duration: start.elapsed().as_secs_f64(),
            latencies: latencies.into_inner().unwrap(),
            ..Default::default()
        };

        let result = result.finalize();
        tracing::info!(
            success = result.success,
            fail = result.fail,
            throughput = result.throughput,
            avg_latency_ms = result.avg_latency * 1000.0,
            "load test completed"
        );
        Ok(result)
    }
}
