//! C5: evaluation cache. Avoids re-running a load test and re-querying
//! telemetry for a configuration that has already been evaluated recently.
//! Keyed on the individual's identity, not on wall-clock history — entries
//! simply expire after `ttl` and are never refreshed in place.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Instant;

use crate::types::{EvaluationResult, Individual};

#[derive(Debug)]
struct CacheEntry {
    inserted_at: Instant,
    result: EvaluationResult,
}

/// TTL-only keyed cache of evaluation results. Default TTL is one hour,
/// matching the default the optimizer driver constructs it with.
#[derive(Debug)]
pub struct EvaluationCache {
    entries: HashMap<u64, CacheEntry>,
    ttl_seconds: f64,
}

impl Default for EvaluationCache {
    fn default() -> Self {
        Self::new(3600.0)
    }
}

impl EvaluationCache {
    pub fn new(ttl_seconds: f64) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_seconds,
        }
    }

    fn key(individual: &Individual) -> u64 {
        let mut hasher = DefaultHasher::new();
        individual.hash(&mut hasher);
        hasher.finish()
    }

    pub fn get(&mut self, individual: &Individual) -> Option<EvaluationResult> {
        let key = Self::key(individual);
        let expired = match self.entries.get(&key) {
            Some(entry) => entry.inserted_at.elapsed().as_secs_f64() >= self.ttl_seconds,
            None => return None,
        };
        if expired {
            self.entries.remove(&key);
            return None;
        }
        self.entries.get(&key).map(|e| e.result.clone())
    }

    pub fn put(&mut self, individual: &Individual, result: EvaluationResult) {
        self.entries.insert(
            Self::key(individual),
            CacheEntry {
                inserted_at: Instant::now(),
                result,
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Removes and counts expired entries without waiting for a `get` to
    /// encounter them.
    pub fn cleanup_expired(&mut self) -> usize {
        let ttl = self.ttl_seconds;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed().as_secs_f64() < ttl);
        before - self.entries.len()
    }
}
