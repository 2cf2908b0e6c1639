//! Innovation tracking for NEAT.
//!
//! Crossover can only align two genomes of different topology if every
//! structural mutation carries a historical marking that means the same thing
//! in every genome of the run. [`InnovationRegistry`] hands out those markings:
//!
//! - Connections: the ordered pair `(source, target)` maps to one innovation id,
//!   forever, no matter which genome or thread asks.
//! - Nodes: every fresh node id is distinct across the run. Splitting the same
//!   connection in two genomes reuses the node id, so both halves of the split
//!   also share innovation ids.
//!
//! One registry exists per evolutionary run. It is owned by the population and
//! passed by shared reference to the mutation engine. All operations go through
//! a single mutex, so concurrent offspring production can never assign two ids
//! to the same structural change.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::gene::{InnovationId, NodeId};

/// First innovation id handed out by a fresh registry.
pub const FIRST_INNOVATION: InnovationId = 1;

#[derive(Debug)]
struct RegistryState {
    connections: HashMap<(NodeId, NodeId), InnovationId>,
    splits: HashMap<InnovationId, NodeId>,
    next_innovation: InnovationId,
    next_node: NodeId,
}

/// Run-scoped allocator of innovation ids and hidden node ids.
#[derive(Debug)]
pub struct InnovationRegistry {
    state: Mutex<RegistryState>,
}

impl InnovationRegistry {
    /// Create a registry for genomes with the given fixed input/output ranges.
    ///
    /// Hidden node ids start right after the output range.
    #[must_use]
    pub fn new(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                connections: HashMap::new(),
                splits: HashMap::new(),
                next_innovation: FIRST_INNOVATION,
                next_node: (num_inputs + num_outputs) as NodeId + 1,
            }),
        }
    }

    /// Innovation id of the connection `source -> target`.
    ///
    /// Allocates a new id the first time a pair is seen and returns the stored
    /// id on every later call.
    pub fn connection_id(&self, source: NodeId, target: NodeId) -> InnovationId {
        let mut state = self.state.lock();
        if let Some(&id) = state.connections.get(&(source, target)) {
            return id;
        }
        let id = state.next_innovation;
        state.next_innovation += 1;
        state.connections.insert((source, target), id);
        id
    }

    /// Allocate a node id that has never been returned before in this run.
    pub fn new_node_id(&self) -> NodeId {
        let mut state = self.state.lock();
        let id = state.next_node;
        state.next_node += 1;
        id
    }

    /// Node id created by splitting the connection with the given innovation.
    ///
    /// The first request allocates a fresh node id; every later request for the
    /// same connection returns it again.
    pub fn split_node_id(&self, innovation: InnovationId) -> NodeId {
        let mut state = self.state.lock();
        if let Some(&id) = state.splits.get(&innovation) {
            return id;
        }
        let id = state.next_node;
        state.next_node += 1;
        state.splits.insert(innovation, id);
        id
    }

    /// Number of distinct connection innovations allocated so far.
    #[must_use]
    pub fn innovation_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// The node id the next allocation will return.
    #[must_use]
    pub fn next_node_id(&self) -> NodeId {
        self.state.lock().next_node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_connection_id_is_stable() {
        let registry = InnovationRegistry::new(2, 1);
        let first = registry.connection_id(1, 3);
        registry.connection_id(2, 3);
        registry.connection_id(1, 4);
        assert_eq!(registry.connection_id(1, 3), first);
        assert_eq!(first, FIRST_INNOVATION);
    }

    #[test]
    fn test_connection_id_order_matters() {
        let registry = InnovationRegistry::new(2, 2);
        assert_ne!(registry.connection_id(5, 6), registry.connection_id(6, 5));
    }

    #[test]
    fn test_distinct_pairs_get_distinct_ids() {
        let registry = InnovationRegistry::new(3, 3);
        let mut seen = HashSet::new();
        for source in 1..=10 {
            for target in 1..=10 {
                if source != target {
                    assert!(seen.insert(registry.connection_id(source, target)));
                }
            }
        }
        assert_eq!(registry.innovation_count(), seen.len());
    }

    #[test]
    fn test_node_ids_start_after_outputs() {
        let registry = InnovationRegistry::new(2, 1);
        assert_eq!(registry.next_node_id(), 4);
        assert_eq!(registry.new_node_id(), 4);
        assert_eq!(registry.new_node_id(), 5);
    }

    #[test]
    fn test_split_node_id_is_reused() {
        let registry = InnovationRegistry::new(2, 1);
        let conn = registry.connection_id(1, 3);
        let node = registry.split_node_id(conn);
        assert_eq!(registry.split_node_id(conn), node);
        assert_ne!(registry.new_node_id(), node);
        assert_ne!(registry.split_node_id(conn + 1), node);
    }

    #[test]
    fn test_concurrent_requests_agree() {
        let registry = Arc::new(InnovationRegistry::new(2, 2));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (1..=20)
                        .map(|target| registry.connection_id(1, 100 + target))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<Vec<InnovationId>> = handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked"))
            .collect();
        for ids in &results[1..] {
            assert_eq!(ids, &results[0]);
        }
        assert_eq!(registry.innovation_count(), 20);
    }

    #[test]
    fn test_concurrent_node_ids_are_unique() {
        let registry = Arc::new(InnovationRegistry::new(2, 2));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| registry.new_node_id())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("worker panicked") {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 200);
    }
}
