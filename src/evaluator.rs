//! Fitness evaluation.
//!
//! The engine never interprets fitness beyond "higher is better". Callers
//! supply a [`FitnessEvaluator`]; every closure `Fn(&Genome) -> f32 + Sync`
//! already is one. Evaluation of a whole generation optionally fans out over
//! the rayon thread pool, each task writing only its own genome's fitness.

use rayon::prelude::*;
use tracing::warn;

use crate::genome::Genome;

/// Scores a genome. Called exactly once per genome per generation.
pub trait FitnessEvaluator: Sync {
    /// Fitness of `genome`; higher is better. NaN is recorded as 0.
    fn evaluate(&self, genome: &Genome) -> f32;
}

impl<F> FitnessEvaluator for F
where
    F: Fn(&Genome) -> f32 + Sync,
{
    #[inline]
    fn evaluate(&self, genome: &Genome) -> f32 {
        self(genome)
    }
}

/// Assign a fitness to every genome. Returns once all evaluations have finished.
///
/// A NaN score is recorded as 0.
pub fn evaluate_all<E>(genomes: &mut [Genome], evaluator: &E, parallel: bool)
where
    E: FitnessEvaluator + ?Sized,
{
    let score = |(index, genome): (usize, &mut Genome)| {
        let fitness = evaluator.evaluate(genome);
        genome.fitness = if fitness.is_nan() {
            warn!(genome = index, "evaluator returned NaN; recording fitness 0");
            0.0
        } else {
            fitness
        };
    };

    if parallel {
        genomes.par_iter_mut().enumerate().for_each(score);
    } else {
        genomes.iter_mut().enumerate().for_each(score);
    }
}
