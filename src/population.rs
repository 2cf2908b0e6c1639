//! Generation loop.
//!
//! [`Population`] owns the genomes, the species, the innovation registry and
//! the random source of one run. Each call to [`Population::evolve`] walks the
//! phases `Speciating -> Evaluating -> Reproducing` and returns to `Idle`.
//! The steps can also be driven one at a time; calling one out of order is an
//! error. There is no terminal state; the caller decides when to stop.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, NeatConfig};
use crate::crossover::CrossoverEngine;
use crate::evaluator::{evaluate_all, FitnessEvaluator};
use crate::genome::Genome;
use crate::innovation::InnovationRegistry;
use crate::mutation::MutationEngine;
use crate::sampler::Sampler;
use crate::species::{Species, SpeciesSet};

/// Where the population is within a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationPhase {
    /// A fresh generation waits to be speciated.
    #[default]
    Idle,
    /// The generation has been speciated and waits to be evaluated.
    Speciating,
    /// The generation has been evaluated and waits to reproduce.
    Evaluating,
    /// Offspring are being bred. Ends in `Idle` with the next generation.
    Reproducing,
}

/// Errors raised when generation steps are driven by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PopulationError {
    /// A step was called before the one it depends on.
    #[error("cannot {step} in phase {phase:?}")]
    OutOfOrder {
        step: &'static str,
        phase: GenerationPhase,
    },
}

/// Summary of one evaluated generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationReport {
    /// Zero-based index of the generation that was evaluated.
    pub generation: usize,
    /// Best fitness seen so far in the run.
    pub best_fitness: f32,
    /// Best fitness within this generation.
    pub generation_best_fitness: f32,
    /// Mean fitness of this generation.
    pub average_fitness: f32,
    /// Species alive after speciation.
    pub species_count: usize,
    /// Compatibility threshold after this generation's adjustment.
    pub compatibility_threshold: f32,
}

/// Offspring plan for one species.
struct BreedingJob {
    /// Parent candidates, best first.
    pool: Vec<usize>,
    keep_elite: bool,
    quota: usize,
}

/// Read-only view of the current generation used to produce offspring.
struct Breeder<'a> {
    genomes: &'a [Genome],
    registry: &'a InnovationRegistry,
    mutation: &'a MutationEngine,
    crossover: &'a CrossoverEngine,
    p_mutate_only: f32,
}

impl Breeder<'_> {
    fn breed<S: Sampler + ?Sized>(&self, job: &BreedingJob, sampler: &mut S) -> Vec<Genome> {
        let pool = &job.pool;
        let mut offspring = Vec::with_capacity(job.quota);
        let Some(&champion) = pool.first() else {
            return offspring;
        };

        let mut remaining = job.quota;
        if remaining > 0 && job.keep_elite {
            offspring.push(self.genomes[champion].clone());
            remaining -= 1;
        }

        for _ in 0..remaining {
            let first = &self.genomes[pool[sampler.index(pool.len())]];
            let child = if sampler.chance(self.p_mutate_only) {
                self.mutation.offspring(first, self.registry, sampler)
            } else {
                let second = &self.genomes[pool[sampler.index(pool.len())]];
                let mut child = self.crossover.crossover(first, second, sampler);
                self.mutation.mutate(&mut child, self.registry, sampler);
                child
            };
            offspring.push(child);
        }
        offspring
    }
}

/// A NEAT population for one evolutionary run.
pub struct Population<R = ChaCha8Rng> {
    config: NeatConfig,
    genomes: Vec<Genome>,
    species: SpeciesSet,
    registry: InnovationRegistry,
    mutation: MutationEngine,
    crossover: CrossoverEngine,
    best: Option<Genome>,
    generation: usize,
    phase: GenerationPhase,
    rng: R,
}

impl Population<ChaCha8Rng> {
    /// Create a population seeded from `config.seed`.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] raised by [`NeatConfig::validate`].
    pub fn new(config: NeatConfig) -> Result<Self, ConfigError> {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self::with_rng(config, rng)
    }
}

impl<R: Rng + SeedableRng> Population<R> {
    /// Create a population drawing randomness from `rng`.
    ///
    /// The initial generation is `population_size` empty genomes, each mutated once.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] raised by [`NeatConfig::validate`].
    pub fn with_rng(config: NeatConfig, mut rng: R) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = InnovationRegistry::new(config.num_inputs, config.num_outputs);
        let mutation = MutationEngine::new(&config);
        let genomes = (0..config.population_size)
            .map(|_| {
                let mut genome = Genome::minimal(&config);
                mutation.mutate(&mut genome, &registry, &mut rng);
                genome
            })
            .collect();

        Ok(Self {
            species: SpeciesSet::new(&config),
            crossover: CrossoverEngine::new(&config),
            mutation,
            registry,
            genomes,
            best: None,
            generation: 0,
            phase: GenerationPhase::Idle,
            rng,
            config,
        })
    }

    /// Run one full generation and report on it.
    ///
    /// A generation already started with [`speciate`](Self::speciate) or
    /// [`evaluate`](Self::evaluate) is finished from where it stands; steps
    /// that already ran are not repeated.
    pub fn evolve<E>(&mut self, evaluator: &E) -> GenerationReport
    where
        E: FitnessEvaluator + ?Sized,
    {
        if self.phase == GenerationPhase::Idle {
            self.run_speciation();
        }
        if self.phase == GenerationPhase::Speciating {
            self.run_evaluation(evaluator);
        }

        let report = self.report();
        info!(
            generation = report.generation,
            best = report.best_fitness,
            mean = report.average_fitness,
            species = report.species_count,
            threshold = report.compatibility_threshold,
            "generation evaluated"
        );

        self.run_reproduction();
        report
    }

    /// Cluster the current genomes into species and adapt the threshold.
    ///
    /// # Errors
    ///
    /// Fails unless the population is [`GenerationPhase::Idle`].
    pub fn speciate(&mut self) -> Result<(), PopulationError> {
        self.expect_phase("speciate", GenerationPhase::Idle)?;
        self.run_speciation();
        Ok(())
    }

    /// Score every genome and update the best-so-far genome.
    ///
    /// # Errors
    ///
    /// Fails unless the genomes have just been speciated.
    pub fn evaluate<E>(&mut self, evaluator: &E) -> Result<(), PopulationError>
    where
        E: FitnessEvaluator + ?Sized,
    {
        self.expect_phase("evaluate", GenerationPhase::Speciating)?;
        self.run_evaluation(evaluator);
        Ok(())
    }

    /// Replace the population with the offspring of the current species.
    ///
    /// Species keep their representatives but lose their member lists, which
    /// indexed the replaced generation.
    ///
    /// # Errors
    ///
    /// Fails unless the genomes have just been evaluated.
    pub fn reproduce(&mut self) -> Result<(), PopulationError> {
        self.expect_phase("reproduce", GenerationPhase::Evaluating)?;
        self.run_reproduction();
        Ok(())
    }

    fn expect_phase(
        &self,
        step: &'static str,
        expected: GenerationPhase,
    ) -> Result<(), PopulationError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(PopulationError::OutOfOrder {
                step,
                phase: self.phase,
            })
        }
    }

    fn report(&self) -> GenerationReport {
        let generation_best_fitness = self
            .genomes
            .iter()
            .map(|g| g.fitness)
            .fold(f32::NEG_INFINITY, f32::max);
        let average_fitness = if self.genomes.is_empty() {
            0.0
        } else {
            self.genomes.iter().map(|g| g.fitness).sum::<f32>() / self.genomes.len() as f32
        };
        GenerationReport {
            generation: self.generation,
            best_fitness: self.best_fitness().unwrap_or(generation_best_fitness),
            generation_best_fitness,
            average_fitness,
            species_count: self.species.len(),
            compatibility_threshold: self.species.threshold(),
        }
    }

    fn run_speciation(&mut self) {
        self.species.speciate(&self.genomes);
        self.phase = GenerationPhase::Speciating;
    }

    fn run_evaluation<E>(&mut self, evaluator: &E)
    where
        E: FitnessEvaluator + ?Sized,
    {
        evaluate_all(&mut self.genomes, evaluator, self.config.parallel_evaluation);

        let champion = self.genomes.iter().fold(None::<&Genome>, |best, genome| match best {
            Some(b) if b.fitness >= genome.fitness => Some(b),
            _ => Some(genome),
        });
        if let Some(champion) = champion {
            let improved = self
                .best
                .as_ref()
                .map_or(true, |best| champion.fitness > best.fitness);
            if improved {
                debug!(fitness = champion.fitness, "new best genome");
                self.best = Some(champion.clone());
            }
        }
        self.phase = GenerationPhase::Evaluating;
    }

    fn run_reproduction(&mut self) {
        self.phase = GenerationPhase::Reproducing;
        let population_size = self.config.population_size;
        self.species.assign_quotas(&self.genomes, population_size);

        let retain_fraction = self.config.top_species_retain_fraction;
        let elitism_min = self.config.elitism_min_species_size;
        let jobs: Vec<BreedingJob> = self
            .species
            .species()
            .iter()
            .map(|species| BreedingJob {
                pool: species.parent_pool(&self.genomes, retain_fraction),
                keep_elite: species.len() >= elitism_min,
                quota: species.offspring_quota(),
            })
            .collect();

        let breeder = Breeder {
            genomes: &self.genomes,
            registry: &self.registry,
            mutation: &self.mutation,
            crossover: &self.crossover,
            p_mutate_only: self.config.p_mutate_only_vs_crossover,
        };

        let next: Vec<Genome> = if self.config.parallel_reproduction {
            let seeds: Vec<u64> = jobs.iter().map(|_| self.rng.random()).collect();
            jobs.par_iter()
                .zip(seeds)
                .flat_map_iter(|(job, seed)| {
                    let mut rng = R::seed_from_u64(seed);
                    breeder.breed(job, &mut rng)
                })
                .collect()
        } else {
            let rng = &mut self.rng;
            jobs.iter()
                .flat_map(|job| breeder.breed(job, rng))
                .collect()
        };

        debug!(
            offspring = next.len(),
            species = jobs.len(),
            "reproduction finished"
        );
        self.genomes = next;
        self.species.clear_members();
        self.generation += 1;
        self.phase = GenerationPhase::Idle;
    }

    /// Genomes of the current generation.
    #[inline]
    #[must_use]
    pub fn genomes(&self) -> &[Genome] {
        &self.genomes
    }

    /// Species from the most recent speciation pass.
    ///
    /// Member lists are filled between [`speciate`](Self::speciate) and
    /// reproduction and empty otherwise.
    #[inline]
    #[must_use]
    pub fn species(&self) -> &[Species] {
        self.species.species()
    }

    /// Best genome evaluated so far.
    #[inline]
    #[must_use]
    pub fn best_genome(&self) -> Option<&Genome> {
        self.best.as_ref()
    }

    /// Fitness of [`best_genome`](Self::best_genome).
    #[inline]
    #[must_use]
    pub fn best_fitness(&self) -> Option<f32> {
        self.best.as_ref().map(|g| g.fitness)
    }

    /// Current compatibility threshold.
    #[inline]
    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.species.threshold()
    }

    /// Number of completed generations.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Last step completed within the current generation.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> GenerationPhase {
        self.phase
    }

    /// Configuration this run was created with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &NeatConfig {
        &self.config
    }

    /// Innovation registry shared by every genome of this run.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &InnovationRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> NeatConfig {
        NeatConfig {
            population_size: 30,
            p_add_connection: 0.5,
            p_add_node: 0.2,
            parallel_evaluation: false,
            ..NeatConfig::new(2, 1)
        }
    }

    fn connection_count(genome: &Genome) -> f32 {
        genome.num_enabled_connections() as f32
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = NeatConfig {
            population_size: 0,
            ..NeatConfig::default()
        };
        assert!(Population::new(config).is_err());
    }

    #[test]
    fn test_initial_population() {
        let population = Population::new(small_config()).expect("valid config");
        assert_eq!(population.genomes().len(), 30);
        assert_eq!(population.generation(), 0);
        assert_eq!(population.phase(), GenerationPhase::Idle);
        assert!(population.best_genome().is_none());
        assert!(population.genomes().iter().all(|g| g.hidden_ids().count() <= 1));
    }

    #[test]
    fn test_evolve_keeps_size_and_advances() {
        let mut population = Population::new(small_config()).expect("valid config");
        for expected in 0..5 {
            let report = population.evolve(&connection_count);
            assert_eq!(report.generation, expected);
            assert!(report.species_count >= 1);
            assert_eq!(population.genomes().len(), 30);
            assert_eq!(population.phase(), GenerationPhase::Idle);
        }
        assert_eq!(population.generation(), 5);
    }

    #[test]
    fn test_best_fitness_never_decreases() {
        let mut population = Population::new(small_config()).expect("valid config");
        let mut previous = f32::NEG_INFINITY;
        for _ in 0..10 {
            let report = population.evolve(&connection_count);
            assert!(report.best_fitness >= previous);
            assert!(report.best_fitness >= report.generation_best_fitness);
            previous = report.best_fitness;
        }
        let best = population.best_genome().expect("evaluated at least once");
        assert_eq!(best.fitness, previous);
    }

    #[test]
    fn test_same_seed_same_run() {
        let run = || {
            let mut population = Population::new(small_config()).expect("valid config");
            (0..4)
                .map(|_| population.evolve(&connection_count))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_innovations_consistent_across_population() {
        let mut population = Population::new(small_config()).expect("valid config");
        for _ in 0..5 {
            population.evolve(&connection_count);
        }
        let registry = population.registry();
        for genome in population.genomes() {
            for gene in genome.connections() {
                assert_eq!(registry.connection_id(gene.source, gene.target), gene.innovation);
            }
        }
    }

    #[test]
    fn test_parallel_reproduction() {
        let config = NeatConfig {
            parallel_reproduction: true,
            parallel_evaluation: true,
            ..small_config()
        };
        let mut population = Population::new(config).expect("valid config");
        for _ in 0..5 {
            population.evolve(&connection_count);
            assert_eq!(population.genomes().len(), 30);
            assert!(population.genomes().iter().all(|g| !g.has_cycle()));
        }
    }

    #[test]
    fn test_elite_survives_unchanged() {
        let config = NeatConfig {
            population_size: 10,
            target_species_count: 1,
            compatibility_threshold: 100.0,
            p_weight_mutate: 1.0,
            ..small_config()
        };
        let mut population = Population::new(config).expect("valid config");
        let marker = |genome: &Genome| {
            genome
                .connections()
                .filter(|c| c.enabled)
                .map(|c| c.weight)
                .sum::<f32>()
        };
        population.speciate().expect("idle population speciates");
        population.evaluate(&marker).expect("speciated population evaluates");
        let champion = population.best_genome().expect("evaluated").clone();
        population.reproduce().expect("evaluated population reproduces");

        let weights = |g: &Genome| {
            g.connections()
                .map(|c| (c.innovation, c.weight.to_bits()))
                .collect::<Vec<_>>()
        };
        assert!(population
            .genomes()
            .iter()
            .any(|g| weights(g) == weights(&champion)));
    }

    #[test]
    fn test_steps_advance_phase_in_order() {
        let mut population = Population::new(small_config()).expect("valid config");
        assert_eq!(
            population.reproduce(),
            Err(PopulationError::OutOfOrder {
                step: "reproduce",
                phase: GenerationPhase::Idle,
            })
        );
        assert!(population.evaluate(&connection_count).is_err());

        population.speciate().expect("idle population speciates");
        assert_eq!(population.phase(), GenerationPhase::Speciating);
        assert!(population.speciate().is_err());
        assert!(population.reproduce().is_err());

        population.evaluate(&connection_count).expect("speciated population evaluates");
        assert_eq!(population.phase(), GenerationPhase::Evaluating);
        assert!(population.evaluate(&connection_count).is_err());

        population.reproduce().expect("evaluated population reproduces");
        assert_eq!(population.phase(), GenerationPhase::Idle);
        assert_eq!(population.generation(), 1);
        assert!(population.best_genome().is_some());
    }

    #[test]
    fn test_out_of_order_message() {
        let err = PopulationError::OutOfOrder {
            step: "evaluate",
            phase: GenerationPhase::Idle,
        };
        assert_eq!(err.to_string(), "cannot evaluate in phase Idle");
    }

    #[test]
    fn test_species_members_index_current_genomes() {
        let mut population = Population::new(small_config()).expect("valid config");
        population.speciate().expect("idle population speciates");
        let genomes = population.genomes();
        let mut seen: Vec<usize> = population
            .species()
            .iter()
            .flat_map(|s| s.members().iter().copied())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..genomes.len()).collect::<Vec<_>>());
        for species in population.species() {
            let first = &genomes[species.members()[0]];
            assert_eq!(first.compatibility_distance(species.representative(), 1.0), 0.0);
        }

        population.evaluate(&connection_count).expect("evaluates");
        population.reproduce().expect("reproduces");
        assert!(!population.species().is_empty());
        assert!(population.species().iter().all(Species::is_empty));

        population.evolve(&connection_count);
        assert!(population.species().iter().all(Species::is_empty));
    }

    #[test]
    fn test_evolve_finishes_a_started_generation() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let counting = |genome: &Genome| {
            calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            connection_count(genome)
        };
        let mut population = Population::new(small_config()).expect("valid config");
        population.speciate().expect("idle population speciates");
        population.evaluate(&counting).expect("speciated population evaluates");

        let report = population.evolve(&counting);
        assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 30);
        assert_eq!(report.generation, 0);
        assert_eq!(population.generation(), 1);
        assert_eq!(population.phase(), GenerationPhase::Idle);
    }

    #[test]
    fn test_report_threshold_matches_population() {
        let mut population = Population::new(small_config()).expect("valid config");
        let report = population.evolve(&|_: &Genome| 1.0);
        assert_eq!(report.compatibility_threshold, population.threshold());
        assert_eq!(report.average_fitness, 1.0);
    }
}
