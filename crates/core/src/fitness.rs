//! C4: multi-criteria fitness scoring. Combines throughput, latency,
//! resource efficiency, and reliability sub-scores into a single weighted
//! value in `[0, 1]`.

use serde::{Deserialize, Serialize};

use crate::types::FitnessMetrics;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnessWeights {
    pub throughput_weight: f64,
    pub latency_weight: f64,
    pub resource_efficiency_weight: f64,
    pub reliability_weight: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            throughput_weight: 0.3,
            latency_weight: 0.25,
            resource_efficiency_weight: 0.25,
            reliability_weight: 0.2,
        }
    }
}

impl FitnessWeights {
    /// Rescales the four weights so they sum to 1.0, leaving them untouched
    /// if they already sum to (near) zero.
    pub fn normalize(&mut self) {
        let total = self.throughput_weight
            + self.latency_weight
            + self.resource_efficiency_weight
            + self.reliability_weight;
        if total > 0.0 {
            self.throughput_weight /= total;
            self.latency_weight /= total;
            self.resource_efficiency_weight /= total;
            self.reliability_weight /= total;
        }
    }
}

#[derive(Debug, Clone)]
pub struct FitnessCalculator {
    weights: FitnessWeights,
}

impl Default for FitnessCalculator {
    fn default() -> Self {
        Self::new(FitnessWeights::default())
    }
}

impl FitnessCalculator {
    pub fn new(mut weights: FitnessWeights) -> Self {
        weights.normalize();
        Self { weights }
    }

    /// `fitness = w1*throughput + w2*latency + w3*efficiency + w4*reliability`,
    /// each sub-score already normalized to `[0, 1]`.
    pub fn calculate(&self, metrics: &FitnessMetrics) -> f64 {
        let throughput_score = Self::normalize_throughput(metrics.throughput);
        let latency_score = Self::normalize_latency(metrics.avg_latency, metrics.p95_latency);
        let efficiency_score = Self::calculate_efficiency(metrics);
        let reliability_score = Self::calculate_reliability(metrics);

        let fitness = self.weights.throughput_weight * throughput_score
            + self.weights.latency_weight * latency_score
            + self.weights.resource_efficiency_weight * efficiency_score
            + self.weights.reliability_weight * reliability_score;

        tracing::debug!(
            throughput = throughput_score,
            latency = latency_score,
            efficiency = efficiency_score,
            reliability = reliability_score,
            total = fitness,
            "fitness breakdown"
        );

        fitness
    }

    /// Saturates smoothly: 100 req/s scores 0.50, 1000 req/s scores ~0.91.
    fn normalize_throughput(throughput: f64) -> f64 {
        if throughput <= 0.0 {
            return 0.0;
        }
        let normalized = 1.0 / (1.0 + 100.0 / throughput);
        normalized.min(1.0)
    }

    /// Weighted blend of mean and p95 latency scores, p95 weighted more
    /// heavily since it better reflects tail experience.
    fn normalize_latency(avg_latency: f64, p95_latency: f64) -> f64 {
        if avg_latency <= 0.0 {
            return 1.0;
        }
        let avg_score = 1.0 / (1.0 + avg_latency * 10.0);
        let p95_score = if p95_latency > 0.0 {
            1.0 / (1.0 + p95_latency * 5.0)
        } else {
            1.0
        };
        0.4 * avg_score + 0.6 * p95_score
    }

    /// Peaks at 60% average CPU/memory utilization; penalizes both waste
    /// (<30%) and saturation risk (>90%), with a 20% bonus for high
    /// throughput achieved at low utilization.
    fn calculate_efficiency(metrics: &FitnessMetrics) -> f64 {
        let avg_util = (metrics.cpu_utilization + metrics.memory_utilization) / 2.0;

        let mut efficiency = if avg_util < 0.3 {
            avg_util / 0.3
        } else if avg_util > 0.9 {
            (1.0 - avg_util) / 0.1
        } else {
            1.0 - (avg_util - 0.6).abs() / 0.3
        };

        if metrics.throughput > 50.0 && avg_util < 0.5 {
            efficiency *= 1.2;
        }

        efficiency.clamp(0.0, 1.0)
    }

    /// `success_rate * (1 - min(1, error_rate/10) * 0.5)`.
    fn calculate_reliability(metrics: &FitnessMetrics) -> f64 {
        let error_rate_norm = (metrics.error_rate / 10.0).min(1.0);
        (metrics.success_rate * (1.0 - error_rate_norm * 0.5)).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(
        throughput: f64,
        avg_latency: f64,
        p95_latency: f64,
        cpu_util: f64,
        mem_util: f64,
        success_rate: f64,
        error_rate: f64,
    ) -> FitnessMetrics {
        FitnessMetrics {
            throughput,
            avg_latency,
            p95_latency,
            cpu_utilization: cpu_util,
            memory_utilization: mem_util,
            success_rate,
            error_rate,
            ..Default::default()
        }
    }

    #[test]
    fn weights_normalize_to_one() {
        let mut w = FitnessWeights {
            throughput_weight: 3.0,
            latency_weight: 1.0,
            resource_efficiency_weight: 1.0,
            reliability_weight: 1.0,
        };
        w.normalize();
        let sum = w.throughput_weight
            + w.latency_weight
            + w.resource_efficiency_weight
            + w.reliability_weight;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_throughput_scores_zero() {
        assert_eq!(FitnessCalculator::normalize_throughput(0.0), 0.0);
        assert_eq!(FitnessCalculator::normalize_throughput(-5.0), 0.0);
    }

    #[test]
    fn throughput_at_100_is_one_half() {
        let score = FitnessCalculator::normalize_throughput(100.0);
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn throughput_at_1000_is_about_point_nine_one() {
        let score = FitnessCalculator::normalize_throughput(1000.0);
        assert!((score - 0.9090909090909091).abs() < 1e-9);
    }

    #[test]
    fn zero_avg_latency_scores_perfect() {
        assert_eq!(FitnessCalculator::normalize_latency(0.0, 0.0), 1.0);
    }

    #[test]
    fn efficiency_peaks_at_sixty_percent_utilization() {
        let ideal = FitnessCalculator::calculate_efficiency(&metrics(
            10.0, 0.1, 0.1, 0.6, 0.6, 1.0, 0.0,
        ));
        let wasteful = FitnessCalculator::calculate_efficiency(&metrics(
            10.0, 0.1, 0.1, 0.1, 0.1, 1.0, 0.0,
        ));
        let saturated = FitnessCalculator::calculate_efficiency(&metrics(
            10.0, 0.1, 0.1, 0.95, 0.95, 1.0, 0.0,
        ));
        assert!(ideal > wasteful);
        assert!(ideal > saturated);
        assert!((ideal - 1.0).abs() < 1e-9);
    }

    #[test]
    fn efficiency_bonus_for_high_throughput_low_utilization() {
        let with_bonus = FitnessCalculator::calculate_efficiency(&metrics(
            60.0, 0.1, 0.1, 0.4, 0.4, 1.0, 0.0,
        ));
        let without_bonus = FitnessCalculator::calculate_efficiency(&metrics(
            10.0, 0.1, 0.1, 0.4, 0.4, 1.0, 0.0,
        ));
        assert!(with_bonus > without_bonus);
    }

    #[test]
    fn efficiency_never_exceeds_one() {
        let score = FitnessCalculator::calculate_efficiency(&metrics(
            60.0, 0.1, 0.1, 0.45, 0.45, 1.0, 0.0,
        ));
        assert!(score <= 1.0);
    }

    #[test]
    fn reliability_penalizes_errors_and_failures() {
        let clean = FitnessCalculator::calculate_reliability(&metrics(
            0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
        ));
        let erroring = FitnessCalculator::calculate_reliability(&metrics(
            0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 20.0,
        ));
        assert_eq!(clean, 1.0);
        assert!((erroring - 0.5).abs() < 1e-9);
    }

    #[test]
    fn overall_fitness_is_in_unit_interval() {
        let calc = FitnessCalculator::default();
        let m = metrics(150.0, 0.05, 0.08, 0.55, 0.6, 0.99, 0.1);
        let score = calc.calculate(&m);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn better_metrics_yield_strictly_higher_fitness() {
        let calc = FitnessCalculator::default();
        let good = metrics(200.0, 0.02, 0.03, 0.6, 0.6, 1.0, 0.0);
        let bad = metrics(1.0, 2.0, 3.0, 0.95, 0.95, 0.5, 5.0);
        assert!(calc.calculate(&good) > calc.calculate(&bad));
    }
}
