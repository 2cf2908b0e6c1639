//! Graph topology analysis using CSR format.
//!
//! [`GraphTopology`] is a snapshot of a genome's enabled connections stored in
//! Compressed Sparse Row form over outgoing edges. The genome rebuilds it
//! whenever its connections change and uses it to reject cycle-closing
//! insertions and to derive the evaluation order.
//!
//! ## Determinism
//!
//! Node ids are indexed in ascending order and edges are laid out in the order
//! they are supplied (the genome supplies them by innovation id), so the
//! topological order is identical for identical genome state.

use std::collections::VecDeque;

use crate::gene::NodeId;
use crate::genome::Genome;

/// CSR-format graph topology.
#[derive(Debug, Clone, Default)]
pub struct GraphTopology {
    /// Node ids in ascending order; position is the dense index.
    idx_to_node: Vec<NodeId>,
    /// CSR offsets for forward edges (outgoing). Length = node_count + 1.
    fwd_offsets: Vec<usize>,
    /// fwd_targets[fwd_offsets[i]..fwd_offsets[i+1]] are successors of node i.
    fwd_targets: Vec<usize>,
}

impl GraphTopology {
    /// Build topology from a node set and a list of directed edges.
    ///
    /// Edges referencing unknown nodes are ignored.
    #[must_use]
    pub fn new<I>(nodes: &[NodeId], edges: I) -> Self
    where
        I: IntoIterator<Item = (NodeId, NodeId)>,
    {
        let mut idx_to_node = nodes.to_vec();
        idx_to_node.sort_unstable();
        idx_to_node.dedup();
        let node_count = idx_to_node.len();

        let edges: Vec<(usize, usize)> = edges
            .into_iter()
            .filter_map(|(from, to)| {
                Some((
                    lookup_idx(&idx_to_node, from)?,
                    lookup_idx(&idx_to_node, to)?,
                ))
            })
            .collect();

        let (fwd_offsets, fwd_targets) = build_csr(node_count, &edges);

        Self {
            idx_to_node,
            fwd_offsets,
            fwd_targets,
        }
    }

    /// Build topology from a genome's nodes and enabled connections.
    #[must_use]
    pub fn from_genome(genome: &Genome) -> Self {
        let nodes: Vec<NodeId> = genome.node_ids().collect();
        Self::new(
            &nodes,
            genome
                .connections()
                .filter(|c| c.enabled)
                .map(|c| (c.source, c.target)),
        )
    }

    /// Get the dense index for a node id.
    #[inline]
    #[must_use]
    pub fn node_index(&self, id: NodeId) -> Option<usize> {
        lookup_idx(&self.idx_to_node, id)
    }

    /// Number of nodes in the topology.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.idx_to_node.len()
    }

    /// Iterate over successors of a node (forward edges).
    #[inline]
    pub fn successors(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        let start = self.fwd_offsets[idx];
        let end = self.fwd_offsets[idx + 1];
        self.fwd_targets[start..end].iter().copied()
    }

    /// Whether a directed path `from -> ... -> to` exists. A node reaches itself.
    #[must_use]
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let (Some(from_idx), Some(to_idx)) = (self.node_index(from), self.node_index(to)) else {
            return false;
        };
        if from_idx == to_idx {
            return true;
        }

        let mut visited = vec![false; self.node_count()];
        let mut queue = VecDeque::new();
        queue.push_back(from_idx);
        visited[from_idx] = true;

        while let Some(current) = queue.pop_front() {
            for succ in self.successors(current) {
                if succ == to_idx {
                    return true;
                }
                if !visited[succ] {
                    visited[succ] = true;
                    queue.push_back(succ);
                }
            }
        }

        false
    }

    /// Check if adding edge `from -> to` would create a cycle.
    ///
    /// True for a self-loop, or when `from` is already reachable from `to`.
    #[must_use]
    pub fn would_create_cycle(&self, from: NodeId, to: NodeId) -> bool {
        from == to || self.reaches(to, from)
    }

    /// Detect if the graph contains any cycle.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        self.kahn_order().len() != self.node_count()
    }

    /// Node ids in topological order, or `None` if the graph has a cycle.
    #[must_use]
    pub fn topological_order(&self) -> Option<Vec<NodeId>> {
        let order = self.kahn_order();
        if order.len() != self.node_count() {
            return None;
        }
        Some(order.into_iter().map(|idx| self.idx_to_node[idx]).collect())
    }

    /// Kahn's algorithm; stops short of `node_count` entries on a cycle.
    fn kahn_order(&self) -> Vec<usize> {
        let node_count = self.node_count();
        let mut in_degree = vec![0usize; node_count];
        for &target in &self.fwd_targets {
            in_degree[target] += 1;
        }

        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(idx, _)| idx)
            .collect();

        let mut order = Vec::with_capacity(node_count);
        while let Some(u) = queue.pop_front() {
            order.push(u);
            for v in self.successors(u) {
                in_degree[v] -= 1;
                if in_degree[v] == 0 {
                    queue.push_back(v);
                }
            }
        }
        order
    }
}

/// Lay out `(row, column)` pairs as CSR offsets + columns, preserving input order per row.
fn build_csr(node_count: usize, edges: &[(usize, usize)]) -> (Vec<usize>, Vec<usize>) {
    let mut counts = vec![0usize; node_count];
    for &(row, _) in edges {
        counts[row] += 1;
    }

    let mut offsets = Vec::with_capacity(node_count + 1);
    let mut running = 0;
    offsets.push(running);
    for &count in &counts {
        running += count;
        offsets.push(running);
    }

    let mut columns = vec![0usize; running];
    let mut write_pos = offsets[..node_count].to_vec();
    for &(row, column) in edges {
        columns[write_pos[row]] = column;
        write_pos[row] += 1;
    }

    (offsets, columns)
}

/// Binary search for a node id in the sorted id table.
fn lookup_idx(sorted: &[NodeId], id: NodeId) -> Option<usize> {
    sorted.binary_search(&id).ok()
}
