//! Gene types for NEAT genomes.
//!
//! Nodes are plain integers whose role is fixed by the range they fall into:
//! - `[1, num_inputs]` are input nodes
//! - `(num_inputs, num_inputs + num_outputs]` are output nodes
//! - anything above is a hidden node allocated by the innovation registry
//!
//! [`ConnectionGene`]s carry the historical marking (innovation id) used to
//! align genomes of different topology.

/// Identifier of a node. Role is derived from its range, see [`NodeKind::classify`].
pub type NodeId = u64;

/// Historical marking of a structural mutation (a specific source -> target pair).
pub type InnovationId = u64;

/// The role of a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Receives external values, no activation applied.
    Input,
    /// Produces network output.
    Output,
    /// Internal node added through mutation.
    Hidden,
}

impl NodeKind {
    /// Classify a node id against fixed input/output ranges.
    ///
    /// Returns `None` for id 0, which is never a valid node.
    #[inline]
    #[must_use]
    pub fn classify(id: NodeId, num_inputs: usize, num_outputs: usize) -> Option<Self> {
        let inputs = num_inputs as u64;
        let outputs = num_outputs as u64;
        match id {
            0 => None,
            id if id <= inputs => Some(Self::Input),
            id if id <= inputs + outputs => Some(Self::Output),
            _ => Some(Self::Hidden),
        }
    }
}

/// A connection gene: a directed, weighted edge tagged with its innovation id.
///
/// Equality is defined by the innovation id alone. Two genes with the same
/// innovation are "the same gene" even when their weights or enabled flags differ.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionGene {
    /// The source node.
    pub source: NodeId,
    /// The target node.
    pub target: NodeId,
    /// The connection weight.
    pub weight: f32,
    /// Disabled connections are skipped during evaluation but kept for crossover alignment.
    pub enabled: bool,
    /// Historical marking shared by every gene produced from the same structural mutation.
    pub innovation: InnovationId,
}

impl ConnectionGene {
    /// Create a new enabled connection.
    #[must_use]
    pub fn new(innovation: InnovationId, source: NodeId, target: NodeId, weight: f32) -> Self {
        Self {
            source,
            target,
            weight,
            enabled: true,
            innovation,
        }
    }

    /// Copy of this gene with a different enabled flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl PartialEq for ConnectionGene {
    fn eq(&self, other: &Self) -> bool {
        self.innovation == other.innovation
    }
}

impl Eq for ConnectionGene {}

impl std::hash::Hash for ConnectionGene {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.innovation.hash(state);
    }
}
