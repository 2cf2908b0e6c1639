//! Activation functions for NEAT networks.
//!
//! Hidden and output nodes share a single activation chosen by configuration.
//! The default is the steep sigmoid from the original NEAT paper, which is close
//! to linear in `[-0.5, 0.5]` and saturates quickly outside of it.

use serde::{Deserialize, Serialize};

/// Slope applied by [`Activation::SteepSigmoid`].
pub const STEEP_SIGMOID_SLOPE: f32 = 4.9;

/// Activation function applied to the weighted input sum of non-input nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Activation {
    /// Steep sigmoid: f(x) = 1 / (1 + e^(-4.9x))
    #[default]
    SteepSigmoid,
    /// Sigmoid: f(x) = 1 / (1 + e^(-x))
    Sigmoid,
    /// Hyperbolic tangent: f(x) = tanh(x)
    Tanh,
    /// Identity function: f(x) = x
    Identity,
}

impl Activation {
    /// All available activation functions.
    pub const ALL: [Self; 4] = [Self::SteepSigmoid, Self::Sigmoid, Self::Tanh, Self::Identity];

    /// Apply this activation function to an input value.
    ///
    /// NaN propagates. Infinite inputs saturate instead of producing NaN.
    #[inline]
    #[must_use]
    pub fn apply(self, x: f32) -> f32 {
        if x.is_nan() {
            return f32::NAN;
        }

        match self {
            Self::SteepSigmoid => sigmoid(STEEP_SIGMOID_SLOPE * x),
            Self::Sigmoid => sigmoid(x),
            Self::Tanh => {
                if x == f32::INFINITY {
                    return 1.0;
                }
                if x == f32::NEG_INFINITY {
                    return -1.0;
                }
                x.tanh()
            }
            Self::Identity => x,
        }
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    if x == f32::INFINITY {
        return 1.0;
    }
    if x == f32::NEG_INFINITY {
        return 0.0;
    }
    // sigmoid(-88) ≈ 0, sigmoid(88) ≈ 1; exp overflows past that
    let clamped = x.clamp(-88.0, 88.0);
    1.0 / (1.0 + (-clamped).exp())
}
