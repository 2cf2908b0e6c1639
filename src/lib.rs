//! # NEAT Engine
//!
//! A NeuroEvolution of Augmenting Topologies (NEAT) engine: a population of
//! feed-forward networks evolves both its weights and its structure against a
//! user-supplied fitness function.
//!
//! ## Features
//!
//! - **Historical Markings**: A run-scoped [`InnovationRegistry`] gives every
//!   ordered `(source, target)` connection one innovation id for the whole run,
//!   so crossover can align genomes of different topology
//! - **Acyclic by Construction**: Insertions that would close a cycle are
//!   rejected against a CSR [`GraphTopology`] snapshot; evaluation walks a
//!   cached topological order
//! - **Adaptive Speciation**: The compatibility threshold is steered toward a
//!   target species count every generation
//! - **Parallel Evaluation**: Fitness is computed on the rayon thread pool
//! - **Reproducible Runs**: All randomness flows through an injectable
//!   [`Sampler`]; a seeded `ChaCha8Rng` replays a run exactly
//!
//! ## Quick Start
//!
//! ```rust
//! use neat_engine::{Genome, NeatConfig, Population};
//!
//! let config = NeatConfig {
//!     population_size: 50,
//!     ..NeatConfig::new(2, 1)
//! };
//! let mut population = Population::new(config).expect("valid config");
//!
//! // XOR: fitness is the inverse of the summed absolute error
//! let xor = |genome: &Genome| {
//!     let cases: [([f32; 2], f32); 4] =
//!         [([0.0, 0.0], 0.0), ([0.0, 1.0], 1.0), ([1.0, 0.0], 1.0), ([1.0, 1.0], 0.0)];
//!     let error: f32 = cases
//!         .iter()
//!         .map(|(inputs, expected)| {
//!             genome.feed_forward(inputs).map_or(1.0, |out| (out[0] - *expected).abs())
//!         })
//!         .sum();
//!     1.0 / error.max(0.001)
//! };
//!
//! for _ in 0..10 {
//!     let report = population.evolve(&xor);
//!     println!("gen {} best {:.3}", report.generation, report.best_fitness);
//! }
//! assert!(population.best_genome().is_some());
//! ```
//!
//! ## Architecture
//!
//! ### Node Numbering
//!
//! Node ids are plain integers in fixed ranges: inputs are `1..=n_in`, outputs
//! `n_in + 1..=n_in + n_out`, and hidden nodes are allocated above that by the
//! registry. A node's role is a function of its id, so crossover can rebuild a
//! child's node set from its connection genes alone.
//!
//! ### Generation Loop
//!
//! [`Population::evolve`] speciates, evaluates and reproduces:
//!
//! - species quotas are proportional to average fitness and always add up to
//!   the population size
//! - large species keep their champion unchanged
//! - offspring are mutated copies or mutated crossover children of each
//!   species' best members

pub mod activation;
pub mod config;
pub mod crossover;
pub mod evaluator;
pub mod gene;
pub mod genome;
pub mod innovation;
pub mod mutation;
pub mod population;
pub mod sampler;
pub mod species;
pub mod topology;

// Re-exports for convenience
pub use activation::Activation;
pub use config::{ConfigError, NeatConfig};
pub use crossover::{inheritance_probability, CrossoverEngine};
pub use evaluator::{evaluate_all, FitnessEvaluator};
pub use gene::{ConnectionGene, InnovationId, NodeId, NodeKind};
pub use genome::{Genome, GenomeError};
pub use innovation::InnovationRegistry;
pub use mutation::MutationEngine;
pub use population::{GenerationPhase, GenerationReport, Population, PopulationError};
pub use sampler::Sampler;
pub use species::{Species, SpeciesSet};
pub use topology::GraphTopology;
