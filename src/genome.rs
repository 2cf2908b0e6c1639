//! NEAT genome: node/connection graph plus its feed-forward evaluator.
//!
//! Connection genes are stored in an ordered map keyed by innovation id, which
//! gives crossover and distance computations a natural alignment order. Two
//! derived structures are rebuilt whenever connections change:
//!
//! - an adjacency index (target -> incoming `(source, weight)` pairs, enabled
//!   connections only), summed in innovation order so evaluation is
//!   bit-reproducible;
//! - a [`GraphTopology`] snapshot, used to reject insertions that would close a
//!   cycle and to derive the topological evaluation order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;

use crate::activation::Activation;
use crate::config::NeatConfig;
use crate::gene::{ConnectionGene, InnovationId, NodeId, NodeKind};
use crate::topology::GraphTopology;

/// Errors raised by genome construction, insertion and evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenomeError {
    /// A gene with this innovation id is already present.
    #[error("duplicate gene with innovation {0}")]
    DuplicateGene(InnovationId),
    /// A connection from a node to itself.
    #[error("self-loop on node {0}")]
    SelfLoop(NodeId),
    /// A connection whose target is an input node.
    #[error("connection {from} -> {to} targets an input node")]
    IntoInput {
        /// Source node.
        from: NodeId,
        /// Target node.
        to: NodeId,
    },
    /// A connection whose source is an output node.
    #[error("connection {from} -> {to} leaves an output node")]
    FromOutput {
        /// Source node.
        from: NodeId,
        /// Target node.
        to: NodeId,
    },
    /// Node id 0, which belongs to no node range.
    #[error("node {0} is not a valid node id")]
    UnknownNode(NodeId),
    /// No gene with this innovation id exists.
    #[error("no connection with innovation {0}")]
    UnknownConnection(InnovationId),
    /// The connection exists but is disabled.
    #[error("connection with innovation {0} is disabled")]
    DisabledConnection(InnovationId),
    /// Enabling this connection would close a directed cycle.
    #[error("connection {from} -> {to} would create a cycle")]
    Cycle {
        /// Source node.
        from: NodeId,
        /// Target node.
        to: NodeId,
    },
    /// Wrong number of inputs passed to [`Genome::feed_forward`].
    #[error("expected {expected} inputs, got {actual}")]
    InputLength {
        /// Number of input nodes.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },
    /// The enabled connections contain a cycle; feed-forward evaluation is undefined.
    #[error("genome contains cycles; feedforward evaluation requires an acyclic graph")]
    CyclicGenome,
}

/// A candidate network: fixed input/output nodes, hidden nodes, connection genes
/// and a fitness score.
#[derive(Debug, Clone)]
pub struct Genome {
    num_inputs: usize,
    num_outputs: usize,
    hidden: BTreeSet<NodeId>,
    connections: BTreeMap<InnovationId, ConnectionGene>,
    activation: Activation,
    /// target -> incoming (source, weight), enabled connections only.
    adjacency: HashMap<NodeId, Vec<(NodeId, f32)>>,
    topology: GraphTopology,
    /// Non-input nodes in topological order; `None` if the graph is cyclic.
    eval_order: Option<Vec<NodeId>>,
    /// Fitness assigned by the external evaluator; 0 until evaluated.
    pub fitness: f32,
}

impl Genome {
    /// Create a genome with only input and output nodes and no connections.
    #[must_use]
    pub fn new(num_inputs: usize, num_outputs: usize) -> Self {
        let mut genome = Self {
            num_inputs,
            num_outputs,
            hidden: BTreeSet::new(),
            connections: BTreeMap::new(),
            activation: Activation::default(),
            adjacency: HashMap::new(),
            topology: GraphTopology::default(),
            eval_order: None,
            fitness: 0.0,
        };
        genome.rebuild();
        genome
    }

    /// Create an empty genome laid out and activated as the config describes.
    #[must_use]
    pub fn minimal(config: &NeatConfig) -> Self {
        Self::new(config.num_inputs, config.num_outputs).with_activation(config.activation)
    }

    /// Replace the activation used by hidden and output nodes.
    #[must_use]
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Build a genome from an explicit connection set.
    ///
    /// Hidden nodes are derived from the endpoints above the output range.
    ///
    /// # Errors
    ///
    /// Returns the first [`GenomeError`] raised by [`add_connection`](Self::add_connection).
    pub fn from_connections<I>(
        num_inputs: usize,
        num_outputs: usize,
        genes: I,
    ) -> Result<Self, GenomeError>
    where
        I: IntoIterator<Item = ConnectionGene>,
    {
        let mut genome = Self::new(num_inputs, num_outputs);
        for gene in genes {
            genome.add_connection(gene)?;
        }
        Ok(genome)
    }

    /// Insert a connection gene and rebuild the adjacency index.
    ///
    /// # Errors
    ///
    /// Rejects duplicate innovations, self-loops, connections into inputs or out
    /// of outputs, node id 0, and enabled connections that would close a cycle.
    /// The genome is unchanged on error.
    pub fn add_connection(&mut self, gene: ConnectionGene) -> Result<(), GenomeError> {
        self.check_insert(&gene)?;

        for node in [gene.source, gene.target] {
            if self.node_kind(node) == Some(NodeKind::Hidden) {
                self.hidden.insert(node);
            }
        }
        self.connections.insert(gene.innovation, gene);
        self.rebuild();
        Ok(())
    }

    /// Validate a gene against this genome without inserting it.
    ///
    /// # Errors
    ///
    /// See [`add_connection`](Self::add_connection).
    pub fn check_insert(&self, gene: &ConnectionGene) -> Result<(), GenomeError> {
        let (source, target) = (gene.source, gene.target);
        if self.connections.contains_key(&gene.innovation) {
            return Err(GenomeError::DuplicateGene(gene.innovation));
        }
        if source == target {
            return Err(GenomeError::SelfLoop(source));
        }
        let source_kind = self
            .node_kind(source)
            .ok_or(GenomeError::UnknownNode(source))?;
        let target_kind = self
            .node_kind(target)
            .ok_or(GenomeError::UnknownNode(target))?;
        if target_kind == NodeKind::Input {
            return Err(GenomeError::IntoInput {
                from: source,
                to: target,
            });
        }
        if source_kind == NodeKind::Output {
            return Err(GenomeError::FromOutput {
                from: source,
                to: target,
            });
        }
        // Only hidden -> hidden links can close a loop: inputs have no incoming
        // edges and outputs no outgoing ones.
        if gene.enabled
            && source_kind == NodeKind::Hidden
            && target_kind == NodeKind::Hidden
            && self.topology.would_create_cycle(source, target)
        {
            return Err(GenomeError::Cycle {
                from: source,
                to: target,
            });
        }
        Ok(())
    }

    /// Disable the connection with the given innovation. The gene is kept.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::UnknownConnection`] if no such gene exists.
    pub fn disable_connection(&mut self, innovation: InnovationId) -> Result<(), GenomeError> {
        let gene = self
            .connections
            .get_mut(&innovation)
            .ok_or(GenomeError::UnknownConnection(innovation))?;
        gene.enabled = false;
        self.rebuild();
        Ok(())
    }

    /// Apply `update` to the weight of every enabled connection, then reindex.
    pub fn update_weights<F>(&mut self, mut update: F)
    where
        F: FnMut(&mut f32),
    {
        for gene in self.connections.values_mut().filter(|g| g.enabled) {
            update(&mut gene.weight);
        }
        self.rebuild();
    }

    /// Rebuild the adjacency index, topology snapshot and evaluation order.
    fn rebuild(&mut self) {
        let mut adjacency: HashMap<NodeId, Vec<(NodeId, f32)>> = HashMap::new();
        for gene in self.connections.values().filter(|g| g.enabled) {
            adjacency
                .entry(gene.target)
                .or_default()
                .push((gene.source, gene.weight));
        }
        self.adjacency = adjacency;

        self.topology = GraphTopology::from_genome(self);
        let num_inputs = self.num_inputs as NodeId;
        self.eval_order = self
            .topology
            .topological_order()
            .map(|order| order.into_iter().filter(|&id| id > num_inputs).collect());
    }

    /// Evaluate the network on one input vector.
    ///
    /// Inputs are passed through unmodified. Every other node sums its enabled
    /// incoming connections and applies the activation; a node without incoming
    /// enabled connections evaluates to 0. Nodes are visited once, in
    /// topological order, with values memoized for the duration of the call.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::InputLength`] if `inputs.len() != num_inputs`, and
    /// [`GenomeError::CyclicGenome`] if no evaluation order exists.
    pub fn feed_forward(&self, inputs: &[f32]) -> Result<Vec<f32>, GenomeError> {
        if inputs.len() != self.num_inputs {
            return Err(GenomeError::InputLength {
                expected: self.num_inputs,
                actual: inputs.len(),
            });
        }
        let order = self.eval_order.as_ref().ok_or(GenomeError::CyclicGenome)?;

        let mut values: HashMap<NodeId, f32> =
            HashMap::with_capacity(self.num_inputs + order.len());
        for (id, &value) in self.input_ids().zip(inputs) {
            values.insert(id, value);
        }

        for &node in order {
            let value = match self.adjacency.get(&node) {
                Some(incoming) if !incoming.is_empty() => {
                    let sum: f32 = incoming
                        .iter()
                        .map(|&(source, weight)| {
                            values.get(&source).copied().unwrap_or(0.0) * weight
                        })
                        .sum();
                    self.activation.apply(sum)
                }
                _ => 0.0,
            };
            values.insert(node, value);
        }

        Ok(self
            .output_ids()
            .map(|id| values.get(&id).copied().unwrap_or(0.0))
            .collect())
    }

    /// Compatibility distance used for speciation.
    ///
    /// `D = gene_diff + c3 * Σ|w1 - w2| / (2 * matches)` when the genomes share
    /// genes, otherwise `D = gene_diff`, where `gene_diff` counts innovations
    /// present in exactly one genome.
    #[must_use]
    pub fn compatibility_distance(&self, other: &Genome, c3: f32) -> f32 {
        let mut gene_diff = 0usize;
        let mut matches = 0usize;
        let mut weight_diff = 0.0f32;

        for (innovation, gene) in &self.connections {
            match other.connections.get(innovation) {
                Some(theirs) => {
                    matches += 1;
                    weight_diff += (gene.weight - theirs.weight).abs();
                }
                None => gene_diff += 1,
            }
        }
        gene_diff += other
            .connections
            .keys()
            .filter(|innovation| !self.connections.contains_key(innovation))
            .count();

        if matches == 0 {
            gene_diff as f32
        } else {
            gene_diff as f32 + c3 * weight_diff / (2 * matches) as f32
        }
    }

    /// Role of a node id within this genome's fixed ranges.
    #[inline]
    #[must_use]
    pub fn node_kind(&self, id: NodeId) -> Option<NodeKind> {
        NodeKind::classify(id, self.num_inputs, self.num_outputs)
    }

    /// Whether an enabled path `from -> ... -> to` exists.
    #[must_use]
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        self.topology.reaches(from, to)
    }

    /// Whether the enabled connections contain a directed cycle.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        self.topology.has_cycle()
    }

    /// Whether any gene, enabled or not, connects `source -> target`.
    #[must_use]
    pub fn has_pair(&self, source: NodeId, target: NodeId) -> bool {
        self.connections
            .values()
            .any(|g| g.source == source && g.target == target)
    }

    /// Number of input nodes.
    #[must_use]
    pub const fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    /// Number of output nodes.
    #[must_use]
    pub const fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    /// Activation used by hidden and output nodes.
    #[must_use]
    pub const fn activation(&self) -> Activation {
        self.activation
    }

    /// Input node ids, in input order.
    pub fn input_ids(&self) -> impl Iterator<Item = NodeId> {
        1..=self.num_inputs as NodeId
    }

    /// Output node ids, in output order.
    pub fn output_ids(&self) -> impl Iterator<Item = NodeId> {
        let first = self.num_inputs as NodeId + 1;
        first..first + self.num_outputs as NodeId
    }

    /// Hidden node ids, ascending.
    pub fn hidden_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.hidden.iter().copied()
    }

    /// All node ids: inputs, outputs, then hidden nodes.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.input_ids()
            .chain(self.output_ids())
            .chain(self.hidden_ids())
    }

    /// Total number of nodes.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.num_inputs + self.num_outputs + self.hidden.len()
    }

    /// Connection genes in innovation order.
    pub fn connections(&self) -> impl Iterator<Item = &ConnectionGene> + '_ {
        self.connections.values()
    }

    /// Find a connection by its innovation id.
    #[must_use]
    pub fn connection(&self, innovation: InnovationId) -> Option<&ConnectionGene> {
        self.connections.get(&innovation)
    }

    /// Number of connection genes, enabled or not.
    #[must_use]
    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    /// Get the number of enabled connections.
    #[must_use]
    pub fn num_enabled_connections(&self) -> usize {
        self.connections.values().filter(|c| c.enabled).count()
    }
}
