//! C6: population lifecycle — random initialization, mutation, crossover,
//! tournament selection, and generational evolution (elitism + offspring).

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::config::GaParameters;
use crate::types::{Individual, Population};

/// Manages one genetic search's population across generations. Holds a
/// seeded RNG so a run is reproducible given the same `GA_SEED`, mirroring
/// the seeded-determinism convention used elsewhere in this crate.
pub struct PopulationManager {
    params: GaParameters,
    rng: ChaCha8Rng,
}

impl PopulationManager {
    pub fn new(params: GaParameters) -> Self {
        Self::with_seed(params, std::env::var("GA_SEED").ok().and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    pub fn with_seed(params: GaParameters, seed: u64) -> Self {
        Self {
            params,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn params(&self) -> &GaParameters {
        &self.params
    }

    pub fn create_random_individual(&mut self) -> Individual {
        let bounds = &self.params.bounds;
        let replicas = self.rng.random_range(bounds.replicas_min..=bounds.replicas_max);
        let cpu_limit = round2(self.rng.random_range(bounds.cpu_min..=bounds.cpu_max));
        let memory_limit = self.rng.random_range(bounds.memory_min..=bounds.memory_max);
        Individual::new(replicas, cpu_limit, memory_limit)
    }

    pub fn create_initial_population(&mut self) -> Population {
        let size = self.params.population_size;
        let individuals = (0..size).map(|_| self.create_random_individual()).collect();
        tracing::info!(size, "created initial population");
        Population::new(individuals, 0)
    }

    /// Clamps an individual's fields back into the configured bounds,
    /// re-rounding `cpu_limit` to two decimals.
    pub fn validate_individual(&self, individual: &Individual) -> Individual {
        let bounds = &self.params.bounds;
        Individual {
            replicas: individual.replicas.clamp(bounds.replicas_min, bounds.replicas_max),
            cpu_limit: round2(individual.cpu_limit.clamp(bounds.cpu_min, bounds.cpu_max)),
            memory_limit: individual
                .memory_limit
                .clamp(bounds.memory_min, bounds.memory_max),
            container_name: individual.container_name.clone(),
        }
    }

    /// With probability `1 - mutation_rate`, returns the individual
    /// unchanged. Otherwise perturbs exactly one of the three parameters:
    /// replicas/memory by a uniform integer delta, cpu by a Gaussian delta,
    /// each scaled by `strength * range`.
    pub fn mutate(&mut self, individual: &Individual, strength: f64) -> Individual {
        if self.rng.random::<f64>() > self.params.mutation_rate {
            return individual.clone();
        }

        let mut mutated = individual.clone();
        let bounds = self.params.bounds.clone();
        match self.rng.random_range(0..3) {
            0 => {
                let range = (bounds.replicas_max - bounds.replicas_min) as f64;
                let span = (range * strength) as i64;
                let delta = if span > 0 {
                    self.rng.random_range(-span..=span)
                } else {
                    0
                };
                mutated.replicas = ((mutated.replicas as i64 + delta)
                    .clamp(bounds.replicas_min as i64, bounds.replicas_max as i64))
                    as u32;
            }
            1 => {
                let range = bounds.cpu_max - bounds.cpu_min;
                let normal = Normal::new(0.0, (range * strength).max(f64::EPSILON)).unwrap();
                let delta = normal.sample(&mut self.rng);
                mutated.cpu_limit = round2((mutated.cpu_limit + delta).clamp(bounds.cpu_min, bounds.cpu_max));
            }
            _ => {
                let range = (bounds.memory_max - bounds.memory_min) as f64;
                let span = (range * strength) as i64;
                let delta = if span > 0 {
                    self.rng.random_range(-span..=span)
                } else {
                    0
                };
                mutated.memory_limit = ((mutated.memory_limit as i64 + delta)
                    .clamp(bounds.memory_min as i64, bounds.memory_max as i64))
                    as u32;
            }
        }

        self.validate_individual(&mutated)
    }

    /// With probability `1 - crossover_rate`, returns a copy of a randomly
    /// chosen parent. Otherwise blends: replicas and memory each either
    /// inherit from one random parent or average the two; cpu is a random
    /// convex combination of both.
    pub fn crossover(&mut self, parent1: &Individual, parent2: &Individual) -> Individual {
        if self.rng.random::<f64>() > self.params.crossover_rate {
            return if self.rng.random_bool(0.5) {
                parent1.clone()
            } else {
                parent2.clone()
            };
        }

        let replicas = if self.rng.random_bool(0.5) {
            if self.rng.random_bool(0.5) {
                parent1.replicas
            } else {
                parent2.replicas
            }
        } else {
            ((parent1.replicas as f64 + parent2.replicas as f64) / 2.0).round() as u32
        };

        let alpha = self.rng.random_range(0.3..=0.7);
        let cpu_limit = round2(alpha * parent1.cpu_limit + (1.0 - alpha) * parent2.cpu_limit);

        let memory_limit = if self.rng.random_bool(0.5) {
            if self.rng.random_bool(0.5) {
                parent1.memory_limit
            } else {
                parent2.memory_limit
            }
        } else {
            ((parent1.memory_limit as f64 + parent2.memory_limit as f64) / 2.0).round() as u32
        };

        self.validate_individual(&Individual::new(replicas, cpu_limit, memory_limit))
    }

    pub fn tournament_select(
        &mut self,
        population: &Population,
        fitness_scores: &[f64],
        tournament_size: usize,
    ) -> Individual {
        let size = tournament_size.min(population.individuals.len()).max(1);
        let mut indices: Vec<usize> = (0..population.individuals.len()).collect();
        // Partial Fisher-Yates: shuffle just enough to pick `size` distinct indices.
        for i in 0..size {
            let j = self.rng.random_range(i..indices.len());
            indices.swap(i, j);
        }
        indices[..size]
            .iter()
            .copied()
            .max_by(|&a, &b| fitness_scores[a].partial_cmp(&fitness_scores[b]).unwrap())
            .map(|i| population.individuals[i].clone())
            .expect("tournament size is at least 1")
    }

    pub fn select_parents(
        &mut self,
        population: &Population,
        fitness_scores: &[f64],
    ) -> (Individual, Individual) {
        let tournament_size = self.params.tournament_size;
        let parent1 = self.tournament_select(population, fitness_scores, tournament_size);
        let mut parent2 = self.tournament_select(population, fitness_scores, tournament_size);

        let mut attempts = 0;
        while parent1 == parent2 && population.individuals.len() > 1 && attempts < 10 {
            parent2 = self.tournament_select(population, fitness_scores, tournament_size);
            attempts += 1;
        }

        (parent1, parent2)
    }

    /// Produces the next generation: the top `elitism_count` individuals by
    /// fitness survive unchanged; the rest of the slots are filled by
    /// crossover + mutation of parents drawn (by tournament) from the top
    /// half of the current population.
    pub fn evolve(&mut self, population: &Population, fitness_scores: &[f64]) -> Population {
        let elite_count = self.params.elitism_count;

        let mut ranked: Vec<(Individual, f64)> = population
            .individuals
            .iter()
            .cloned()
            .zip(fitness_scores.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

        let elite: Vec<Individual> = ranked.iter().take(elite_count).map(|(i, _)| i.clone()).collect();

        let survivor_count = (population.individuals.len() / 2).max(1);
        let survivors: Vec<Individual> = ranked.iter().take(survivor_count).map(|(i, _)| i.clone()).collect();
        let survivor_scores: Vec<f64> = ranked.iter().take(survivor_count).map(|(_, s)| *s).collect();
        let survivor_pop = Population::new(survivors, population.generation);

        let target_children = population.individuals.len() - elite.len();
        let mut children = Vec::with_capacity(target_children);
        while children.len() < target_children {
            let (parent1, parent2) = self.select_parents(&survivor_pop, &survivor_scores);
            let child = self.crossover(&parent1, &parent2);
            let child = self.mutate(&child, 0.1);
            children.push(child);
        }

        let mut new_individuals = elite;
        new_individuals.extend(children);

        tracing::info!(
            elite = elite_count,
            children = target_children,
            "evolved population"
        );

        Population::new(new_individuals, population.generation + 1)
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
