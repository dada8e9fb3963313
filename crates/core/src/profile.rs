//! Workload concurrency profiles. Each profile models how concurrent
//! load *would* ramp over the life of a load test; the load generator
//! samples `concurrency_at` purely to publish it as an observable — worker
//! count is fixed for the whole test and nothing gates admission on this
//! value. See the load generator module for why.

use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Sustained,
    Burst,
    RampUp,
    Spiky,
    Wave,
}

impl ProfileKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "sustained" => Some(Self::Sustained),
            "burst" => Some(Self::Burst),
            "ramp_up" | "ramp-up" => Some(Self::RampUp),
            "spiky" => Some(Self::Spiky),
            "wave" => Some(Self::Wave),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkloadProfile {
    pub name: &'static str,
    pub description: &'static str,
    pub duration_seconds: u64,
    pub base_concurrency: usize,
    pub max_concurrency: usize,
    pub ramp_up_seconds: u64,
    kind: ProfileKind,
}

impl WorkloadProfile {
    pub fn for_kind(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::Sustained => Self {
                name: "sustained",
                description: "constant, sustained load",
                duration_seconds: 60,
                base_concurrency: 20,
                max_concurrency: 20,
                ramp_up_seconds: 0,
                kind,
            },
            ProfileKind::Burst => Self {
                name: "burst",
                description: "periodic load spikes",
                duration_seconds: 90,
                base_concurrency: 10,
                max_concurrency: 50,
                ramp_up_seconds: 0,
                kind,
            },
            ProfileKind::RampUp => Self {
                name: "ramp_up",
                description: "gradual ramp to peak load",
                duration_seconds: 60,
                base_concurrency: 5,
                max_concurrency: 40,
                ramp_up_seconds: 30,
                kind,
            },
            ProfileKind::Spiky => Self {
                name: "spiky",
                description: "irregular, unpredictable load",
                duration_seconds: 60,
                base_concurrency: 10,
                max_concurrency: 60,
                ramp_up_seconds: 0,
                kind,
            },
            ProfileKind::Wave => Self {
                name: "wave",
                description: "sinusoidal wave pattern",
                duration_seconds: 60,
                base_concurrency: 5,
                max_concurrency: 30,
                ramp_up_seconds: 0,
                kind,
            },
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        ProfileKind::parse(name).map(Self::for_kind)
    }

    /// Instantaneous concurrency at `elapsed` seconds into the test. Purely
    /// observational — see module docs.
    pub fn concurrency_at(&self, elapsed_seconds: f64, rng_sample: f64) -> usize {
        match self.kind {
            ProfileKind::Sustained => self.base_concurrency,
            ProfileKind::Burst => {
                let cycle = elapsed_seconds % 30.0;
                if cycle < 5.0 {
                    self.max_concurrency
                } else if cycle < 10.0 {
                    (self.base_concurrency as f64 * 0.5) as usize
                } else {
                    self.base_concurrency
                }
            }
            ProfileKind::RampUp => self.linear_ramp(elapsed_seconds, self.ramp_up_seconds),
            ProfileKind::Spiky => {
                // rng_sample is expected to be uniform in [0.3, 1.0); the
                // caller supplies randomness so this stays deterministic
                // under a seeded RNG rather than reaching for thread-local
                // entropy mid-loop.
                let variation = rng_sample.clamp(0.3, 1.0);
                let span = (self.max_concurrency - self.base_concurrency) as f64;
                self.base_concurrency + (span * variation) as usize
            }
            ProfileKind::Wave => {
                let wave = (elapsed_seconds * 2.0 * PI / 20.0).sin();
                let normalized = (wave + 1.0) / 2.0;
                let span = (self.max_concurrency - self.base_concurrency) as f64;
                self.base_concurrency + (span * normalized) as usize
            }
        }
    }

    fn linear_ramp(&self, elapsed_seconds: f64, ramp_up_seconds: u64) -> usize {
        if ramp_up_seconds == 0 || elapsed_seconds >= ramp_up_seconds as f64 {
            return self.max_concurrency;
        }
        let progress = elapsed_seconds / ramp_up_seconds as f64;
        let span = (self.max_concurrency - self.base_concurrency) as f64;
        self.base_concurrency + (span * progress) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sustained_concurrency_never_changes() {
        let p = WorkloadProfile::for_kind(ProfileKind::Sustained);
        assert_eq!(p.concurrency_at(0.0, 0.5), 20);
        assert_eq!(p.concurrency_at(59.0, 0.5), 20);
    }

    #[test]
    fn burst_spikes_then_dips_then_recovers() {
        let p = WorkloadProfile::for_kind(ProfileKind::Burst);
        assert_eq!(p.concurrency_at(2.0, 0.0), p.max_concurrency);
        assert_eq!(p.concurrency_at(7.0, 0.0), (p.base_concurrency as f64 * 0.5) as usize);
        assert_eq!(p.concurrency_at(20.0, 0.0), p.base_concurrency);
    }

    #[test]
    fn ramp_up_reaches_max_after_ramp_duration() {
        let p = WorkloadProfile::for_kind(ProfileKind::RampUp);
        assert_eq!(p.concurrency_at(0.0, 0.0), p.base_concurrency);
        assert_eq!(p.concurrency_at(30.0, 0.0), p.max_concurrency);
        assert_eq!(p.concurrency_at(45.0, 0.0), p.max_concurrency);
    }

    #[test]
    fn spiky_stays_within_base_and_max() {
        let p = WorkloadProfile::for_kind(ProfileKind::Spiky);
        for sample in [0.0, 0.3, 0.65, 1.0] {
            let c = p.concurrency_at(10.0, sample);
            assert!(c >= p.base_concurrency && c <= p.max_concurrency);
        }
    }

    #[test]
    fn wave_oscillates_between_base_and_max() {
        let p = WorkloadProfile::for_kind(ProfileKind::Wave);
        let trough = p.concurrency_at(15.0, 0.0); // sin(3pi/2) = -1 -> base
        let crest = p.concurrency_at(5.0, 0.0); // sin(pi/2) = 1 -> max
        assert_eq!(trough, p.base_concurrency);
        assert_eq!(crest, p.max_concurrency);
    }

    #[test]
    fn parse_accepts_known_names_case_insensitively() {
        assert!(ProfileKind::parse("SUSTAINED").is_some());
        assert!(ProfileKind::parse("ramp-up").is_some());
        assert!(ProfileKind::parse("not-a-profile").is_none());
    }
}
