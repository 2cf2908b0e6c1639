//! Run configuration.
//!
//! [`NeatConfig`] is an immutable value handed to every engine at construction.
//! It derives serde traits with `#[serde(default)]`, so a partial document in
//! any serde format fills the remaining fields from [`NeatConfig::default`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activation::Activation;

/// Configuration for genome layout, mutation, crossover and speciation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeatConfig {
    /// Number of input nodes.
    pub num_inputs: usize,
    /// Number of output nodes.
    pub num_outputs: usize,
    /// Number of genomes per generation.
    pub population_size: usize,

    /// Initial clustering distance; adapted every generation.
    pub compatibility_threshold: f32,
    /// Species count the threshold control loop steers toward.
    pub target_species_count: usize,
    /// Amount the threshold moves per generation when off target.
    pub threshold_adjust_step: f32,
    /// Weight-difference coefficient in the compatibility distance.
    pub c3: f32,
    /// Fraction of a species (best first) eligible as parents, in `(0, 1]`.
    pub top_species_retain_fraction: f32,
    /// Species with at least this many members keep their champion unmutated.
    pub elitism_min_species_size: usize,

    /// Probability that an offspring gets its weights mutated.
    pub p_weight_mutate: f32,
    /// Per connection: probability of Gaussian perturbation rather than a fresh weight.
    pub p_perturb_vs_reset: f32,
    /// Standard deviation of the Gaussian perturbation.
    pub perturbation_std: f32,
    /// Probability of an add-connection mutation.
    pub p_add_connection: f32,
    /// Probability of an add-node mutation.
    pub p_add_node: f32,
    /// Candidate pairs tried before an add-connection mutation is skipped.
    pub max_add_connection_attempts: usize,
    /// Probability that an offspring is a mutated copy rather than a crossover child.
    pub p_mutate_only_vs_crossover: f32,
    /// Probability that a matching gene inherits the mean of both parent weights.
    pub p_average_weight_on_match: f32,
    /// Probability that a gene disabled in a parent stays disabled in the child.
    pub p_disable_inherit: f32,

    /// Activation used by hidden and output nodes.
    pub activation: Activation,
    /// Evaluate fitness on the rayon thread pool.
    pub parallel_evaluation: bool,
    /// Produce each species' offspring on the rayon thread pool.
    ///
    /// Innovation ids are then handed out in scheduling order, so runs with
    /// the same seed are no longer bit-reproducible.
    pub parallel_reproduction: bool,
    /// Seed for the population's random number generator.
    pub seed: u64,
}

impl Default for NeatConfig {
    fn default() -> Self {
        Self {
            num_inputs: 2,
            num_outputs: 1,
            population_size: 150,
            compatibility_threshold: 3.0,
            target_species_count: 8,
            threshold_adjust_step: 0.1,
            c3: 3.0,
            top_species_retain_fraction: 0.2,
            elitism_min_species_size: 5,
            p_weight_mutate: 0.8,
            p_perturb_vs_reset: 0.9,
            perturbation_std: 0.1,
            p_add_connection: 0.1,
            p_add_node: 0.03,
            max_add_connection_attempts: 20,
            p_mutate_only_vs_crossover: 0.25,
            p_average_weight_on_match: 0.4,
            p_disable_inherit: 0.75,
            activation: Activation::SteepSigmoid,
            parallel_evaluation: true,
            parallel_reproduction: false,
            seed: 42,
        }
    }
}

/// Reasons a configuration is rejected by [`NeatConfig::validate`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A size that must be at least one is zero.
    #[error("{field} must be greater than zero")]
    Zero {
        /// Offending field.
        field: &'static str,
    },
    /// A probability lies outside `[0, 1]`.
    #[error("{field} = {value} is not a probability in [0, 1]")]
    Probability {
        /// Offending field.
        field: &'static str,
        /// Rejected value.
        value: f32,
    },
    /// A value lies outside its allowed range.
    #[error("{field} = {value} is out of range: {expected}")]
    OutOfRange {
        /// Offending field.
        field: &'static str,
        /// Rejected value.
        value: f32,
        /// Human readable description of the allowed range.
        expected: &'static str,
    },
}

impl NeatConfig {
    /// Default configuration for a network with the given input/output counts.
    #[must_use]
    pub fn new(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            num_inputs,
            num_outputs,
            ..Default::default()
        }
    }

    /// Check every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("num_inputs", self.num_inputs),
            ("num_outputs", self.num_outputs),
            ("population_size", self.population_size),
            ("target_species_count", self.target_species_count),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }

        for (field, value) in [
            ("p_weight_mutate", self.p_weight_mutate),
            ("p_perturb_vs_reset", self.p_perturb_vs_reset),
            ("p_add_connection", self.p_add_connection),
            ("p_add_node", self.p_add_node),
            ("p_mutate_only_vs_crossover", self.p_mutate_only_vs_crossover),
            ("p_average_weight_on_match", self.p_average_weight_on_match),
            ("p_disable_inherit", self.p_disable_inherit),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { field, value });
            }
        }

        let fraction = self.top_species_retain_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "top_species_retain_fraction",
                value: fraction,
                expected: "(0, 1]",
            });
        }
        if !(self.compatibility_threshold > 0.0 && self.compatibility_threshold.is_finite()) {
            return Err(ConfigError::OutOfRange {
                field: "compatibility_threshold",
                value: self.compatibility_threshold,
                expected: "finite and > 0",
            });
        }
        for (field, value) in [
            ("threshold_adjust_step", self.threshold_adjust_step),
            ("c3", self.c3),
            ("perturbation_std", self.perturbation_std),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ConfigError::OutOfRange {
                    field,
                    value,
                    expected: "finite and >= 0",
                });
            }
        }

        Ok(())
    }
}
