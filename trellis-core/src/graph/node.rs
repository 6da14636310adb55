//! Graph Nodes
//!
//! This module defines the state every node in the dependency graph shares,
//! independent of the type of value it holds.
//!
//! Typed nodes (`SourceNode<T>`, `DerivedNode<T>`) embed a [`NodeCore`] and
//! expose it through the [`Node`] trait, which is all the graph maintenance
//! code ever needs to see.

use std::cell::{Cell, RefCell};
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

use crate::reactive::Runtime;

/// Unique identifier for a node in a graph.
///
/// Ids are allocated per graph and never reused, so a stale id can never
/// alias a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node. These are the roots of the graph.
    /// They have no dependencies and are the only nodes that can be written.
    Source,

    /// A derived node. These have dependencies and may have children.
    /// They cache their computed value.
    Derived,
}

/// Reconciliation state of a node.
///
/// Source nodes are always `Fresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// The cached value can be trusted.
    Fresh,

    /// An ancestor changed since the last reconciliation. The dependency
    /// versions must be checked before the cached value is trusted.
    Suspect,

    /// The compute function is running, or it panicked and the next
    /// reconciliation has to run it again from scratch.
    Recomputing,
}

/// Upstream nodes read by the last computation, each with the version
/// observed at the time of the read.
pub(crate) type Dependencies = IndexMap<NodeId, u64>;

/// Snapshot of node ids taken before traversing, so the traversal can run
/// user code that rewires the graph.
pub(crate) type IdList = SmallVec<[NodeId; 8]>;

/// State shared by every node kind.
#[derive(Debug)]
pub(crate) struct NodeCore {
    id: NodeId,
    kind: NodeKind,

    /// Incremented once per externally visible value change.
    version: Cell<u64>,

    state: Cell<NodeState>,

    /// Derived nodes whose dependency map contains this node.
    /// Non-owning: ids only.
    children: RefCell<IndexSet<NodeId>>,

    /// Version at which effect delivery was last forwarded to the children.
    propagated: Cell<u64>,

    /// Last write wave that reached this node.
    visited: Cell<u64>,

    /// Set once the node has been deleted from its graph.
    detached: Cell<bool>,
}

impl NodeCore {
    pub(crate) fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            version: Cell::new(0),
            state: Cell::new(NodeState::Fresh),
            children: RefCell::new(IndexSet::new()),
            propagated: Cell::new(0),
            visited: Cell::new(0),
            detached: Cell::new(false),
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn kind(&self) -> NodeKind {
        self.kind
    }

    pub(crate) fn version(&self) -> u64 {
        self.version.get()
    }

    /// Record a value change. Returns the new version.
    pub(crate) fn bump_version(&self) -> u64 {
        let next = self.version.get() + 1;
        self.version.set(next);
        next
    }

    pub(crate) fn state(&self) -> NodeState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: NodeState) {
        self.state.set(state);
    }

    /// Mark a fresh derived node as suspect.
    ///
    /// Returns false if the node was not fresh (or is a source), which tells
    /// the caller to stop walking down this branch.
    pub(crate) fn mark_suspect(&self) -> bool {
        if self.kind == NodeKind::Derived && self.state.get() == NodeState::Fresh {
            self.state.set(NodeState::Suspect);
            true
        } else {
            false
        }
    }

    pub(crate) fn add_child(&self, child: NodeId) {
        self.children.borrow_mut().insert(child);
    }

    pub(crate) fn remove_child(&self, child: NodeId) {
        self.children.borrow_mut().shift_remove(&child);
    }

    pub(crate) fn has_child(&self, child: NodeId) -> bool {
        self.children.borrow().contains(&child)
    }

    pub(crate) fn children(&self) -> IdList {
        self.children.borrow().iter().copied().collect()
    }

    pub(crate) fn take_children(&self) -> IdList {
        std::mem::take(&mut *self.children.borrow_mut())
            .into_iter()
            .collect()
    }

    pub(crate) fn propagated(&self) -> u64 {
        self.propagated.get()
    }

    pub(crate) fn set_propagated(&self, version: u64) {
        self.propagated.set(version);
    }

    /// Record that `wave` reached this node. Returns false if it already had.
    pub(crate) fn visit(&self, wave: u64) -> bool {
        if self.visited.get() == wave {
            return false;
        }
        self.visited.set(wave);
        true
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached.get()
    }

    /// Take the node out of propagation for good.
    pub(crate) fn detach(&self) {
        self.detached.set(true);
        self.state.set(NodeState::Fresh);
    }
}

/// The capability every node in the arena exposes to graph maintenance.
///
/// Sources only implement the accessors; the reconciliation hooks default
/// to no-ops because a source is always current.
pub(crate) trait Node {
    fn core(&self) -> &NodeCore;

    /// Dependency map of a derived node; `None` for sources.
    fn dependencies(&self) -> Option<&RefCell<Dependencies>> {
        None
    }

    fn effect_count(&self) -> usize;

    /// Bring the cached value up to date (derived nodes only).
    fn ensure_computed(&self, _runtime: &Runtime) {}

    /// Reconcile this node during a write and deliver its effects.
    fn fire_effects(&self, _runtime: &Runtime) {}

    /// Deliver effects for a change that was reconciled before this node's
    /// turn in the write came up.
    fn fire_pending(&self, _runtime: &Runtime) {}

    /// Drop effects and any undelivered change. Called on deletion.
    fn clear_effects(&self, _runtime: &Runtime);
}

/// Point-in-time view of one node, returned by [`Graph::inspect`].
///
/// [`Graph::inspect`]: crate::reactive::Graph::inspect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub kind: NodeKind,
    pub state: NodeState,
    pub version: u64,
    /// Dependencies with the version observed at the last read.
    pub dependencies: Vec<(NodeId, u64)>,
    pub children: Vec<NodeId>,
    pub effect_count: usize,
}

impl NodeInfo {
    pub(crate) fn capture(node: &dyn Node) -> Self {
        let core = node.core();
        Self {
            id: core.id(),
            kind: core.kind(),
            state: core.state(),
            version: core.version(),
            dependencies: node
                .dependencies()
                .map(|deps| deps.borrow().iter().map(|(id, v)| (*id, *v)).collect())
                .unwrap_or_default(),
            children: core.children().into_vec(),
            effect_count: node.effect_count(),
        }
    }
}
