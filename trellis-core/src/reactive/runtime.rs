//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects sources, derived
//! nodes and effects. It owns the node arena and the tracking context of
//! one graph.
//!
//! # How It Works
//!
//! 1. Every node registers with the runtime of the graph it was created in.
//!
//! 2. When a derived node computes, the runtime records each node it reads
//!    as a dependency.
//!
//! 3. When a source's value changes, the runtime:
//!    a. Marks every reachable derived node as suspect
//!    b. Walks down again delivering effects
//!    c. Derived nodes without effects stay suspect until read
//!
//! # Threading
//!
//! A graph is single-threaded (`!Send`). Hosts that need to reach one graph
//! from several threads must serialize every call behind one lock of their
//! own: interleaved computations would attribute reads to the wrong node.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::{trace, warn};

use super::context::TrackingContext;
use super::derived::Derived;
use super::equality::Comparer;
use super::source::Source;
use crate::config::GraphConfig;
use crate::error::Result;
use crate::graph::{Arena, Node, NodeId, NodeInfo};

/// Counters describing the work a graph has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Source writes that changed a value.
    pub writes: u64,
    /// Compute function invocations, including the initial one.
    pub computations: u64,
    /// Suspect nodes verified without running their compute function.
    pub skipped_recomputations: u64,
    /// Nodes moved from fresh to suspect.
    pub suspect_marks: u64,
    /// Effect callback invocations.
    pub effects_fired: u64,
    /// Write deliveries from a node to one of its children.
    pub deliveries: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Stats {
    pub(crate) writes: Cell<u64>,
    pub(crate) computations: Cell<u64>,
    pub(crate) skipped_recomputations: Cell<u64>,
    pub(crate) suspect_marks: Cell<u64>,
    pub(crate) effects_fired: Cell<u64>,
    pub(crate) deliveries: Cell<u64>,
}

impl Stats {
    pub(crate) fn add(counter: &Cell<u64>, amount: u64) {
        counter.set(counter.get() + amount);
    }

    fn snapshot(&self) -> GraphStats {
        GraphStats {
            writes: self.writes.get(),
            computations: self.computations.get(),
            skipped_recomputations: self.skipped_recomputations.get(),
            suspect_marks: self.suspect_marks.get(),
            effects_fired: self.effects_fired.get(),
            deliveries: self.deliveries.get(),
        }
    }
}

/// Shared state of one graph.
pub(crate) struct Runtime {
    pub(crate) config: GraphConfig,
    pub(crate) arena: Arena,
    pub(crate) tracker: TrackingContext,
    pub(crate) stats: Stats,
    /// Derived nodes holding a change their effects have not seen yet.
    pub(crate) pending_effects: Cell<usize>,
    /// Id of the write currently being delivered; 0 outside any write.
    pub(crate) wave: Cell<u64>,
    pub(crate) last_wave: Cell<u64>,
}

impl Runtime {
    fn new(config: GraphConfig) -> Self {
        Self {
            config,
            arena: Arena::new(),
            tracker: TrackingContext::new(),
            stats: Stats::default(),
            pending_effects: Cell::new(0),
            wave: Cell::new(0),
            last_wave: Cell::new(0),
        }
    }

    /// Attribute a read of `node` to the computation on top of the stack.
    pub(crate) fn record_read(&self, node: &dyn Node) {
        let core = node.core();
        if core.is_detached() {
            return;
        }
        if let Some(reader) = self.tracker.record(core.id(), core.version()) {
            core.add_child(reader);
            trace!(dependency = %core.id(), reader = %reader, "recorded dependency");
        }
    }

    pub(crate) fn pending_added(&self) {
        self.pending_effects.set(self.pending_effects.get() + 1);
    }

    pub(crate) fn pending_removed(&self) {
        self.pending_effects.set(self.pending_effects.get().saturating_sub(1));
    }

    /// Run the edge check if the graph is configured to.
    pub(crate) fn verify_after_write(&self, node: NodeId) {
        if !self.config.verify_edges {
            return;
        }
        if let Err(err) = self.arena.check_edges() {
            warn!(graph = %self.config.label, node = %node, error = %err, "edge invariant violated");
        }
    }
}

/// A reactive graph: one arena of nodes and one dependency tracking stack.
///
/// # Example
///
/// ```rust
/// use trellis_core::Graph;
///
/// let graph = Graph::new();
///
/// let count = graph.source(2);
/// let doubled = graph.derived({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Graph {
    runtime: Rc<Runtime>,
}

impl Graph {
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            runtime: Rc::new(Runtime::new(config)),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.runtime.config
    }

    /// Create a source node compared with `PartialEq`.
    pub fn source<T>(&self, value: T) -> Source<T>
    where
        T: Clone + PartialEq + 'static,
    {
        Source::create(&self.runtime, value, Comparer::structural())
    }

    /// Create a source node with a custom equality function.
    pub fn source_with<T>(&self, value: T, comparer: Comparer<T>) -> Source<T>
    where
        T: Clone + 'static,
    {
        Source::create(&self.runtime, value, comparer)
    }

    /// Create a derived node compared with `PartialEq`.
    ///
    /// `compute` runs once, immediately, to establish the initial value and
    /// dependencies.
    pub fn derived<T, F>(&self, compute: F) -> Derived<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn() -> T + 'static,
    {
        Derived::create(&self.runtime, compute, Comparer::structural())
    }

    /// Create a derived node with a custom comparer.
    pub fn derived_with<T, F>(&self, compute: F, comparer: Comparer<T>) -> Derived<T>
    where
        T: Clone + 'static,
        F: Fn() -> T + 'static,
    {
        Derived::create(&self.runtime, compute, comparer)
    }

    /// Run `f` without attributing its reads to the computation in progress.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _scope = self.runtime.tracker.suspend();
        f()
    }

    /// Check if a computation of this graph is currently recording reads.
    pub fn is_tracking(&self) -> bool {
        self.runtime.tracker.is_active()
    }

    /// Delete a node and everything that depends on it.
    pub fn delete(&self, id: NodeId) -> Result<()> {
        self.runtime.arena.lookup(id)?;
        self.runtime.delete(id);
        Ok(())
    }

    /// Snapshot of one node's bookkeeping.
    pub fn inspect(&self, id: NodeId) -> Result<NodeInfo> {
        let node = self.runtime.arena.lookup(id)?;
        Ok(NodeInfo::capture(&*node))
    }

    /// Verify that every dependency edge is mirrored by a children entry and
    /// vice versa.
    pub fn check_edges(&self) -> Result<()> {
        self.runtime.arena.check_edges()
    }

    /// Number of live (not deleted) nodes.
    pub fn node_count(&self) -> usize {
        self.runtime.arena.len()
    }

    pub fn stats(&self) -> GraphStats {
        self.runtime.stats.snapshot()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("label", &self.runtime.config.label)
            .field("node_count", &self.node_count())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::graph::{NodeKind, NodeState};

    #[test]
    fn graph_registers_nodes() {
        let graph = Graph::new();
        let a = graph.source(1);
        let b = graph.derived({
            let a = a.clone();
            move || a.get() + 1
        });

        assert_eq!(graph.node_count(), 2);

        let info = graph.inspect(b.id()).unwrap();
        assert_eq!(info.kind, NodeKind::Derived);
        assert_eq!(info.state, NodeState::Fresh);
        assert_eq!(info.dependencies, vec![(a.id(), 0)]);

        let info = graph.inspect(a.id()).unwrap();
        assert_eq!(info.kind, NodeKind::Source);
        assert_eq!(info.children, vec![b.id()]);
    }

    #[test]
    fn delete_by_id_reports_missing_nodes() {
        let graph = Graph::new();
        let a = graph.source(1);

        assert_eq!(graph.delete(a.id()), Ok(()));
        assert_eq!(graph.delete(a.id()), Err(GraphError::Deleted(a.id())));
        assert_eq!(graph.inspect(a.id()), Err(GraphError::Deleted(a.id())));

        let other = Graph::new();
        other.source(0);
        let far = other.source(0);
        // #1 was never allocated by `graph`
        assert_eq!(graph.inspect(far.id()), Err(GraphError::UnknownNode(far.id())));
    }

    #[test]
    fn untracked_reads_create_no_edges() {
        let graph = Graph::new();
        let a = graph.source(1);
        let b = graph.source(10);

        let graph = Rc::new(graph);
        let hidden = {
            let a = a.clone();
            let b = b.clone();
            let g = Rc::downgrade(&graph);
            graph.derived(move || {
                let g = g.upgrade().expect("graph alive");
                a.get() + g.untracked(|| b.get())
            })
        };
        assert_eq!(graph.inspect(hidden.id()).unwrap().dependencies, vec![(a.id(), 0)]);

        b.set(20);
        assert_eq!(hidden.get(), 11);
        a.set(2);
        assert_eq!(hidden.get(), 22);
    }

    #[test]
    fn is_tracking_inside_computations_only() {
        let graph = Rc::new(Graph::new());
        assert!(!graph.is_tracking());

        let seen = Rc::new(Cell::new(false));
        let _d = {
            let g = Rc::downgrade(&graph);
            let seen = seen.clone();
            graph.derived(move || {
                if let Some(g) = g.upgrade() {
                    seen.set(g.is_tracking());
                }
                0
            })
        };
        assert!(seen.get());
        assert!(!graph.is_tracking());
    }

    #[test]
    fn stats_count_writes_and_computations() {
        let graph = Graph::new();
        let a = graph.source(1);
        let b = graph.derived({
            let a = a.clone();
            move || a.get() * 2
        });

        a.set(1);
        a.set(2);
        assert_eq!(b.get(), 4);

        let stats = graph.stats();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.computations, 2);
        assert_eq!(stats.suspect_marks, 1);
    }
}
