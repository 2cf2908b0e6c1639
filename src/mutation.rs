//! Structural and weight mutation.
//!
//! [`MutationEngine`] applies three independent gates to each offspring:
//! weight mutation, add-connection and add-node. Structural changes draw their
//! identifiers from the run's [`InnovationRegistry`], so the same change made
//! in two genomes gets the same innovation ids.

use tracing::trace;

use crate::config::NeatConfig;
use crate::gene::{ConnectionGene, InnovationId, NodeId, NodeKind};
use crate::genome::{Genome, GenomeError};
use crate::innovation::InnovationRegistry;
use crate::sampler::Sampler;

/// Mutation operators configured from a [`NeatConfig`].
#[derive(Debug, Clone)]
pub struct MutationEngine {
    p_weight_mutate: f32,
    p_perturb_vs_reset: f32,
    perturbation_std: f32,
    p_add_connection: f32,
    p_add_node: f32,
    max_add_connection_attempts: usize,
}

impl MutationEngine {
    /// Create an engine with the mutation settings of `config`.
    #[must_use]
    pub fn new(config: &NeatConfig) -> Self {
        Self {
            p_weight_mutate: config.p_weight_mutate,
            p_perturb_vs_reset: config.p_perturb_vs_reset,
            perturbation_std: config.perturbation_std,
            p_add_connection: config.p_add_connection,
            p_add_node: config.p_add_node,
            max_add_connection_attempts: config.max_add_connection_attempts,
        }
    }

    /// Copy `parent`, reset the copy's fitness and mutate it. The parent is untouched.
    #[must_use]
    pub fn offspring<S: Sampler + ?Sized>(
        &self,
        parent: &Genome,
        registry: &InnovationRegistry,
        sampler: &mut S,
    ) -> Genome {
        let mut child = parent.clone();
        child.fitness = 0.0;
        self.mutate(&mut child, registry, sampler);
        child
    }

    /// Roll each mutation gate independently and apply the ones that fire.
    pub fn mutate<S: Sampler + ?Sized>(
        &self,
        genome: &mut Genome,
        registry: &InnovationRegistry,
        sampler: &mut S,
    ) {
        if sampler.chance(self.p_weight_mutate) {
            self.mutate_weights(genome, sampler);
        }
        if sampler.chance(self.p_add_connection) {
            self.mutate_add_connection(genome, registry, sampler);
        }
        if sampler.chance(self.p_add_node) {
            self.mutate_add_node(genome, registry, sampler);
        }
    }

    /// Perturb or replace the weight of every enabled connection.
    ///
    /// Each weight is perturbed by Gaussian noise with probability
    /// `p_perturb_vs_reset`, otherwise replaced by a uniform value in `[-1, 1]`.
    pub fn mutate_weights<S: Sampler + ?Sized>(&self, genome: &mut Genome, sampler: &mut S) {
        genome.update_weights(|weight| {
            if sampler.chance(self.p_perturb_vs_reset) {
                *weight += sampler.gaussian() * self.perturbation_std;
            } else {
                *weight = sampler.weight();
            }
        });
    }

    /// Try to connect two previously unconnected nodes.
    ///
    /// Candidate pairs are drawn from the full node list and resampled on
    /// rejection, at most `max_add_connection_attempts` times; a saturated
    /// topology simply yields `None`.
    pub fn mutate_add_connection<S: Sampler + ?Sized>(
        &self,
        genome: &mut Genome,
        registry: &InnovationRegistry,
        sampler: &mut S,
    ) -> Option<InnovationId> {
        let nodes: Vec<NodeId> = genome.node_ids().collect();
        if nodes.len() < 2 {
            return None;
        }

        for _ in 0..self.max_add_connection_attempts {
            let source = nodes[sampler.index(nodes.len())];
            let target = nodes[sampler.index(nodes.len())];
            if !Self::is_candidate(genome, source, target) {
                continue;
            }

            let innovation = registry.connection_id(source, target);
            let gene = ConnectionGene::new(innovation, source, target, sampler.weight());
            match genome.add_connection(gene) {
                Ok(()) => return Some(innovation),
                Err(err) => trace!(%err, "add-connection candidate rejected"),
            }
        }

        trace!(
            attempts = self.max_add_connection_attempts,
            "add-connection skipped: no valid pair found"
        );
        None
    }

    /// Whether `source -> target` is an acceptable new feed-forward connection.
    ///
    /// Allowed: input -> hidden, input -> output, hidden -> output, and
    /// hidden -> hidden when neither node already reaches the other. Pairs
    /// already linked by any gene, enabled or not, are rejected.
    fn is_candidate(genome: &Genome, source: NodeId, target: NodeId) -> bool {
        if source == target {
            return false;
        }
        let direction_ok = match (genome.node_kind(source), genome.node_kind(target)) {
            (Some(NodeKind::Input), Some(NodeKind::Hidden | NodeKind::Output))
            | (Some(NodeKind::Hidden), Some(NodeKind::Output)) => true,
            (Some(NodeKind::Hidden), Some(NodeKind::Hidden)) => {
                !genome.reaches(source, target) && !genome.reaches(target, source)
            }
            _ => false,
        };
        direction_ok && !genome.has_pair(source, target)
    }

    /// Split a random enabled connection with a new hidden node.
    pub fn mutate_add_node<S: Sampler + ?Sized>(
        &self,
        genome: &mut Genome,
        registry: &InnovationRegistry,
        sampler: &mut S,
    ) -> Option<NodeId> {
        let enabled: Vec<InnovationId> = genome
            .connections()
            .filter(|c| c.enabled)
            .map(|c| c.innovation)
            .collect();
        if enabled.is_empty() {
            trace!("add-node skipped: no enabled connection");
            return None;
        }

        let innovation = enabled[sampler.index(enabled.len())];
        match self.split_connection(genome, innovation, registry) {
            Ok(node) => Some(node),
            Err(err) => {
                trace!(%err, "add-node skipped");
                None
            }
        }
    }

    /// Split the connection `innovation` into `source -> new -> target`.
    ///
    /// The original gene is disabled but kept. The incoming half gets weight
    /// 1.0 and the outgoing half the original weight, so the signal path is
    /// preserved up to the extra activation. Splitting the same connection in
    /// different genomes yields the same node id and innovation ids, unless the
    /// genome already holds that node.
    ///
    /// # Errors
    ///
    /// Fails if the connection does not exist or is disabled.
    pub fn split_connection(
        &self,
        genome: &mut Genome,
        innovation: InnovationId,
        registry: &InnovationRegistry,
    ) -> Result<NodeId, GenomeError> {
        let gene = *genome
            .connection(innovation)
            .ok_or(GenomeError::UnknownConnection(innovation))?;
        if !gene.enabled {
            return Err(GenomeError::DisabledConnection(innovation));
        }

        let mut node = registry.split_node_id(innovation);
        if genome.node_ids().any(|id| id == node) {
            node = registry.new_node_id();
        }

        let incoming = ConnectionGene::new(
            registry.connection_id(gene.source, node),
            gene.source,
            node,
            1.0,
        );
        let outgoing = ConnectionGene::new(
            registry.connection_id(node, gene.target),
            node,
            gene.target,
            gene.weight,
        );

        genome.disable_connection(innovation)?;
        genome.add_connection(incoming)?;
        genome.add_connection(outgoing)?;
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn steep(x: f32) -> f32 {
        1.0 / (1.0 + (-4.9 * x).exp())
    }

    fn only(config: NeatConfig) -> MutationEngine {
        MutationEngine::new(&config)
    }

    fn structural_config() -> NeatConfig {
        NeatConfig {
            p_weight_mutate: 0.0,
            p_add_connection: 1.0,
            p_add_node: 1.0,
            ..NeatConfig::new(2, 1)
        }
    }

    #[test]
    fn test_perturbation_changes_enabled_weights_only() {
        let engine = only(NeatConfig {
            p_perturb_vs_reset: 1.0,
            perturbation_std: 0.5,
            ..NeatConfig::new(2, 1)
        });
        let mut genome = Genome::from_connections(
            2,
            1,
            [
                ConnectionGene::new(1, 1, 3, 0.3),
                ConnectionGene::new(2, 2, 3, 0.3).with_enabled(false),
            ],
        )
        .expect("valid");
        let mut rng = test_rng();
        engine.mutate_weights(&mut genome, &mut rng);

        let enabled = genome.connection(1).expect("gene 1").weight;
        assert!((enabled - 0.3).abs() > f32::EPSILON);
        assert_eq!(genome.connection(2).expect("gene 2").weight, 0.3);
    }

    #[test]
    fn test_reset_draws_fresh_uniform_weights() {
        let engine = only(NeatConfig {
            p_perturb_vs_reset: 0.0,
            ..NeatConfig::new(2, 1)
        });
        let mut genome = Genome::from_connections(
            2,
            1,
            [
                ConnectionGene::new(1, 1, 3, 25.0),
                ConnectionGene::new(2, 2, 3, -25.0),
            ],
        )
        .expect("valid");
        let mut rng = test_rng();
        engine.mutate_weights(&mut genome, &mut rng);
        for gene in genome.connections() {
            assert!((-1.0..=1.0).contains(&gene.weight));
        }
    }

    #[test]
    fn test_add_connection_on_empty_genome() {
        let engine = only(NeatConfig {
            max_add_connection_attempts: 500,
            ..structural_config()
        });
        let registry = InnovationRegistry::new(2, 1);
        let mut genome = Genome::new(2, 1);
        let mut rng = test_rng();

        let innovation = engine
            .mutate_add_connection(&mut genome, &registry, &mut rng)
            .expect("an input -> output pair exists");
        let gene = genome.connection(innovation).expect("gene inserted");
        assert!(gene.enabled);
        assert_eq!(gene.target, 3);
        assert!((-1.0..=1.0).contains(&gene.weight));
        assert_eq!(registry.connection_id(gene.source, gene.target), innovation);
    }

    #[test]
    fn test_add_connection_gives_up_on_saturated_topology() {
        let engine = only(structural_config());
        let registry = InnovationRegistry::new(1, 1);
        let gene = ConnectionGene::new(registry.connection_id(1, 2), 1, 2, 0.5);
        let mut genome = Genome::from_connections(1, 1, [gene]).expect("valid");
        let mut rng = test_rng();

        assert!(engine
            .mutate_add_connection(&mut genome, &registry, &mut rng)
            .is_none());
        assert_eq!(genome.num_connections(), 1);
    }

    #[test]
    fn test_add_node_requires_enabled_connection() {
        let engine = only(structural_config());
        let registry = InnovationRegistry::new(2, 1);
        let mut genome = Genome::new(2, 1);
        let mut rng = test_rng();
        assert!(engine
            .mutate_add_node(&mut genome, &registry, &mut rng)
            .is_none());
        assert_eq!(registry.next_node_id(), 4);
    }

    #[test]
    fn test_split_connection_rewires_and_changes_output() {
        let engine = only(NeatConfig::new(2, 1));
        let registry = InnovationRegistry::new(2, 1);
        let original = registry.connection_id(1, 3);
        let mut genome =
            Genome::from_connections(2, 1, [ConnectionGene::new(original, 1, 3, 0.8)])
                .expect("valid");

        let x1 = 0.6;
        let before = genome.feed_forward(&[x1, 0.0]).expect("evaluates")[0];
        assert!((before - steep(0.8 * x1)).abs() < 1e-6);

        let node = engine
            .split_connection(&mut genome, original, &registry)
            .expect("enabled connection splits");
        assert!(!genome.connection(original).expect("kept").enabled);
        assert_eq!(genome.num_connections(), 3);
        assert_eq!(genome.num_enabled_connections(), 2);

        let incoming = genome
            .connection(registry.connection_id(1, node))
            .expect("incoming half");
        assert!(incoming.enabled);
        assert_eq!(incoming.weight, 1.0);
        let outgoing = genome
            .connection(registry.connection_id(node, 3))
            .expect("outgoing half");
        assert!(outgoing.enabled);
        assert_eq!(outgoing.weight, 0.8);

        let after = genome.feed_forward(&[x1, 0.0]).expect("evaluates")[0];
        assert!((after - steep(0.8 * steep(x1))).abs() < 1e-6);

        assert_eq!(
            engine.split_connection(&mut genome, original, &registry),
            Err(GenomeError::DisabledConnection(original))
        );
    }

    #[test]
    fn test_identical_splits_share_identifiers() {
        let engine = only(NeatConfig::new(2, 1));
        let registry = InnovationRegistry::new(2, 1);
        let original = registry.connection_id(2, 3);
        let mut a = Genome::from_connections(2, 1, [ConnectionGene::new(original, 2, 3, 0.1)])
            .expect("valid");
        let mut b = Genome::from_connections(2, 1, [ConnectionGene::new(original, 2, 3, 0.9)])
            .expect("valid");

        let node_a = engine
            .split_connection(&mut a, original, &registry)
            .expect("splits");
        let node_b = engine
            .split_connection(&mut b, original, &registry)
            .expect("splits");
        assert_eq!(node_a, node_b);

        let innovations = |g: &Genome| g.connections().map(|c| c.innovation).collect::<Vec<_>>();
        assert_eq!(innovations(&a), innovations(&b));
    }

    #[test]
    fn test_offspring_leaves_parent_untouched() {
        let engine = only(NeatConfig {
            p_weight_mutate: 1.0,
            ..structural_config()
        });
        let registry = InnovationRegistry::new(2, 1);
        let gene = ConnectionGene::new(registry.connection_id(1, 3), 1, 3, 0.5);
        let mut parent = Genome::from_connections(2, 1, [gene]).expect("valid");
        parent.fitness = 3.0;
        let mut rng = test_rng();

        let child = engine.offspring(&parent, &registry, &mut rng);
        assert_eq!(parent.num_connections(), 1);
        assert_eq!(parent.connection(1).expect("gene").weight, 0.5);
        assert_eq!(parent.fitness, 3.0);
        assert_eq!(child.fitness, 0.0);
        assert!(child.num_connections() > parent.num_connections());
    }

    #[test]
    fn test_structural_mutations_never_create_cycles() {
        let engine = only(NeatConfig {
            p_weight_mutate: 0.5,
            p_add_connection: 0.9,
            p_add_node: 0.4,
            ..NeatConfig::new(3, 2)
        });
        let registry = InnovationRegistry::new(3, 2);
        let mut rng = test_rng();

        for _ in 0..20 {
            let mut genome = Genome::new(3, 2);
            for _ in 0..60 {
                engine.mutate(&mut genome, &registry, &mut rng);
                assert!(!genome.has_cycle());
            }
            let out = genome.feed_forward(&[0.1, 0.5, 0.9]).expect("acyclic genome evaluates");
            assert_eq!(out.len(), 2);
            assert!(out.iter().all(|v| v.is_finite()));
        }
    }
}
