//! Injectable randomness for the evolutionary operators.
//!
//! Every operator draws through [`Sampler`] instead of a concrete generator, so
//! runs are reproducible with a seeded RNG and tests can script exact draws.
//! Any [`rand::Rng`] is a sampler; seeded runs use `rand_chacha::ChaCha8Rng`.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Source of uniform and Gaussian samples.
pub trait Sampler {
    /// Uniform sample in `[0, 1)`.
    fn uniform(&mut self) -> f32;

    /// Standard normal sample (mean 0, standard deviation 1).
    fn gaussian(&mut self) -> f32;

    /// `true` with probability `p`.
    #[inline]
    fn chance(&mut self, p: f32) -> bool {
        self.uniform() < p
    }

    /// Uniform index in `0..len`. `len` must be non-zero.
    #[inline]
    fn index(&mut self, len: usize) -> usize {
        debug_assert!(len > 0, "cannot sample an index from an empty range");
        ((self.uniform() * len as f32) as usize).min(len.saturating_sub(1))
    }

    /// Fresh connection weight, uniform in `[-1, 1)`.
    #[inline]
    fn weight(&mut self) -> f32 {
        self.uniform() * 2.0 - 1.0
    }
}

impl<R: Rng> Sampler for R {
    #[inline]
    fn uniform(&mut self) -> f32 {
        self.random::<f32>()
    }

    #[inline]
    fn gaussian(&mut self) -> f32 {
        StandardNormal.sample(self)
    }
}
