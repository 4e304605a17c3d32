use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::handle::{Input, Output};

/// Construction-order identity of a node. Never reused within a [`BuildContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(u64);

impl InstanceId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a node stored in a [`super::Graph`] arena.
///
/// The instance id doubles as the generation of the arena slot: once a node is retired its
/// slot can be reused, but never with the same instance id, so stale handles are detected.
/// Ordering follows the instance id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    instance: InstanceId,
    slot: u32,
}

impl NodeId {
    pub(crate) fn new(instance: InstanceId, slot: u32) -> Self {
        Self { instance, slot }
    }

    pub fn instance(self) -> InstanceId {
        self.instance
    }

    pub(crate) fn slot(self) -> usize {
        self.slot as usize
    }

    /// Handle of this node's output `index`.
    pub fn output(self, index: usize) -> Output {
        Output::new(self, index)
    }

    pub fn input(self, index: usize) -> Input {
        Input::new(self, index)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.instance)
    }
}

/// Shared instance-id allocator for one graph-building session.
///
/// Clones share the counter, so sub-graphs built on different threads from clones of the
/// same context get disjoint ids and can later be merged with [`super::Graph::absorb`].
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    next: Arc<AtomicU64>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_instance_id(&self) -> InstanceId {
        InstanceId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Id the next allocation will receive, absent concurrent allocations.
    pub fn peek_next(&self) -> InstanceId {
        InstanceId(self.next.load(Ordering::Relaxed))
    }

    pub fn same_context(&self, other: &BuildContext) -> bool {
        Arc::ptr_eq(&self.next, &other.next)
    }
}
