//! Gene-aligned crossover.
//!
//! Parents are aligned by innovation id. Matching genes are averaged or picked
//! from one parent, weighted toward the fitter one; disjoint and excess genes
//! come from the parent that owns them. The child is built from scratch, so
//! its node set is exactly the fixed input/output ranges plus every hidden
//! endpoint it inherited.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::NeatConfig;
use crate::gene::{ConnectionGene, InnovationId};
use crate::genome::{Genome, GenomeError};
use crate::sampler::Sampler;

/// Probability of inheriting a matching gene from the first parent.
///
/// `f1 / (f1 + f2)`, or 0.5 when the sum is not positive or either fitness is
/// negative or not finite.
#[must_use]
pub fn inheritance_probability(first: f32, second: f32) -> f32 {
    let total = first + second;
    if !first.is_finite() || !second.is_finite() || first < 0.0 || second < 0.0 || total <= 0.0
    {
        return 0.5;
    }
    first / total
}

/// Crossover operator configured from a [`NeatConfig`].
#[derive(Debug, Clone)]
pub struct CrossoverEngine {
    p_average_weight_on_match: f32,
    p_disable_inherit: f32,
}

impl CrossoverEngine {
    /// Create an engine with the crossover settings of `config`.
    #[must_use]
    pub fn new(config: &NeatConfig) -> Self {
        Self {
            p_average_weight_on_match: config.p_average_weight_on_match,
            p_disable_inherit: config.p_disable_inherit,
        }
    }

    /// Produce a child whose genes are the union of both parents' innovations.
    ///
    /// The child has fitness 0 and the first parent's activation.
    pub fn crossover<S: Sampler + ?Sized>(
        &self,
        first: &Genome,
        second: &Genome,
        sampler: &mut S,
    ) -> Genome {
        let p_first = inheritance_probability(first.fitness, second.fitness);
        let innovations: BTreeSet<InnovationId> = first
            .connections()
            .chain(second.connections())
            .map(|c| c.innovation)
            .collect();

        let mut child = Genome::new(first.num_inputs(), first.num_outputs())
            .with_activation(first.activation());

        for innovation in innovations {
            let gene = match (first.connection(innovation), second.connection(innovation)) {
                (Some(a), Some(b)) => self.inherit_matching(a, b, p_first, sampler),
                (Some(only), None) | (None, Some(only)) => {
                    let enabled = self.inherit_enabled(only.enabled, sampler);
                    only.with_enabled(enabled)
                }
                (None, None) => continue,
            };
            Self::insert(&mut child, gene);
        }

        child
    }

    fn inherit_matching<S: Sampler + ?Sized>(
        &self,
        a: &ConnectionGene,
        b: &ConnectionGene,
        p_first: f32,
        sampler: &mut S,
    ) -> ConnectionGene {
        let mut gene = if sampler.chance(self.p_average_weight_on_match) {
            ConnectionGene {
                weight: (a.weight + b.weight) / 2.0,
                ..*a
            }
        } else if sampler.chance(p_first) {
            *a
        } else {
            *b
        };
        gene.enabled = self.inherit_enabled(a.enabled && b.enabled, sampler);
        gene
    }

    /// A gene disabled in a parent stays disabled with `p_disable_inherit`.
    fn inherit_enabled<S: Sampler + ?Sized>(
        &self,
        enabled_in_parents: bool,
        sampler: &mut S,
    ) -> bool {
        enabled_in_parents || !sampler.chance(self.p_disable_inherit)
    }

    /// Insert `gene`, falling back to a disabled copy when enabling it would
    /// close a cycle formed by genes from the other parent.
    fn insert(child: &mut Genome, gene: ConnectionGene) {
        match child.add_connection(gene) {
            Ok(()) => {}
            Err(GenomeError::Cycle { .. }) => {
                debug!(
                    innovation = gene.innovation,
                    source = gene.source,
                    target = gene.target,
                    "inherited gene would close a cycle; inserting disabled"
                );
                if let Err(err) = child.add_connection(gene.with_enabled(false)) {
                    debug!(%err, innovation = gene.innovation, "inherited gene dropped");
                }
            }
            Err(err) => debug!(%err, innovation = gene.innovation, "inherited gene dropped"),
        }
    }
}
