//! Derived Implementation
//!
//! A derived node is a cached value computed from other nodes. It
//! re-evaluates only when a value it actually read has changed.
//!
//! # How Derived Nodes Work
//!
//! 1. On construction, the compute function runs once inside a tracked
//!    scope. Every node it reads becomes a dependency, stored together with
//!    the version that was read.
//!
//! 2. When an ancestor is written, the node is marked suspect. Nothing is
//!    recomputed yet.
//!
//! 3. On the next read (or when a write reaches a node with effects), the
//!    node first reconciles its dependencies, ancestors before itself.
//!    Then it compares each recorded version with the live one:
//!    - all equal: the cached value is kept and the node is fresh again
//!    - any differ: the dependency set is dropped and rebuilt by running
//!      the compute function again
//!
//! 4. The version is bumped only if the new value differs from the old one
//!    per the comparer, so an equal result stops propagation right here.
//!
//! # Why This Matters
//!
//! In a diamond (`a -> b`, `a -> c`, `b + c -> d`), a write to `a` runs
//! `d`'s compute function at most once: by the time `d` checks its
//! dependencies both `b` and `c` are final for this write.
//!
//! Rebuilding the dependency set from scratch on every recomputation means
//! a branch that stops reading a node also stops depending on it.
//!
//! # Failures
//!
//! A compute function that panics leaves the node in `Recomputing` with the
//! edges of its last good computation, so writes keep reaching it and its
//! dependents. The next reconciliation runs the function again.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{debug, trace, trace_span};

use super::cell::ValueCell;
use super::effect::EffectHandle;
use super::equality::Comparer;
use super::runtime::{Runtime, Stats};
use crate::graph::{Arena, Dependencies, Node, NodeCore, NodeId, NodeKind, NodeState};

pub(crate) struct DerivedNode<T: 'static> {
    core: NodeCore,
    cell: ValueCell<T>,
    compute: Box<dyn Fn() -> T>,
    dependencies: RefCell<Dependencies>,
    /// The value effects last observed, held while a change they have not
    /// been told about is pending.
    undelivered: RefCell<Option<T>>,
}

impl<T: Clone + 'static> DerivedNode<T> {
    /// Rebuild the value and the dependency set.
    fn recompute(&self, runtime: &Runtime) {
        let id = self.core.id();
        let _span = trace_span!("recompute", graph = %runtime.config.label, node = %id).entered();

        // Stays set if the compute function panics
        self.core.set_state(NodeState::Recomputing);

        let stale = std::mem::take(&mut *self.dependencies.borrow_mut());
        runtime.arena.unlink(id, &stale);
        // Declared before the scope: on unwind the partial edges go first
        let relink = Relink {
            arena: &runtime.arena,
            node: id,
            dependencies: &self.dependencies,
            stale: Some(stale),
        };

        let scope = runtime.tracker.enter(&runtime.arena, id);
        let value = (self.compute)();
        let dependencies = scope.finish();
        relink.disarm();

        Stats::add(&runtime.stats.computations, 1);
        *self.dependencies.borrow_mut() = dependencies;

        let changed = !self.cell.is_current(&value);
        let old = self.cell.replace(value);

        if changed {
            let version = self.core.bump_version();
            debug!(version, "derived value changed");

            if !self.cell.effects().is_empty() {
                let mut undelivered = self.undelivered.borrow_mut();
                if undelivered.is_none() {
                    *undelivered = Some(old);
                    runtime.pending_added();
                }
            }
        } else {
            trace!("recomputed to an equal value");
        }

        self.core.set_state(NodeState::Fresh);
    }
}

/// Puts back the edges of the previous computation if the current one
/// unwinds, so later writes still reach the node and its dependents.
struct Relink<'a> {
    arena: &'a Arena,
    node: NodeId,
    dependencies: &'a RefCell<Dependencies>,
    stale: Option<Dependencies>,
}

impl Relink<'_> {
    fn disarm(mut self) {
        self.stale = None;
    }
}

impl Drop for Relink<'_> {
    fn drop(&mut self) {
        let Some(mut stale) = self.stale.take() else {
            return;
        };
        stale.retain(|parent, _| match self.arena.get(*parent) {
            Some(parent) => {
                parent.core().add_child(self.node);
                true
            }
            None => false,
        });
        *self.dependencies.borrow_mut() = stale;
    }
}

impl<T: Clone + 'static> Node for DerivedNode<T> {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn dependencies(&self) -> Option<&RefCell<Dependencies>> {
        Some(&self.dependencies)
    }

    fn effect_count(&self) -> usize {
        self.cell.effects().len()
    }

    fn ensure_computed(&self, runtime: &Runtime) {
        match self.core.state() {
            NodeState::Fresh => {}
            NodeState::Recomputing => {
                debug_assert!(
                    !runtime.tracker.is_computing(self.core.id()),
                    "node {} read itself while computing (dependency cycle)",
                    self.core.id()
                );
                // A previous computation panicked
                self.recompute(runtime);
            }
            NodeState::Suspect => {
                let recorded: SmallVec<[(NodeId, u64); 8]> = self
                    .dependencies
                    .borrow()
                    .iter()
                    .map(|(id, version)| (*id, *version))
                    .collect();

                for (id, _) in &recorded {
                    if let Some(dependency) = runtime.arena.get(*id) {
                        dependency.ensure_computed(runtime);
                    }
                }

                let changed = recorded.iter().any(|(id, seen)| {
                    runtime
                        .arena
                        .get(*id)
                        .map_or(true, |dependency| dependency.core().version() != *seen)
                });

                if changed {
                    self.recompute(runtime);
                } else {
                    self.core.set_state(NodeState::Fresh);
                    Stats::add(&runtime.stats.skipped_recomputations, 1);
                    trace!(node = %self.core.id(), "dependencies unchanged, kept cached value");
                }
            }
        }
    }

    fn fire_effects(&self, runtime: &Runtime) {
        if self.cell.effects().is_empty() {
            // Already forwarded if this write reached us by another path
            if runtime.first_visit(self) {
                runtime.forward_effects(self);
            }
            return;
        }

        self.ensure_computed(runtime);
        runtime.flush_upstream_effects(self);
        self.fire_pending(runtime);

        // Nothing new for the children since the last delivery
        let version = self.core.version();
        if self.core.propagated() == version {
            return;
        }
        self.core.set_propagated(version);
        runtime.forward_effects(self);
    }

    fn fire_pending(&self, runtime: &Runtime) {
        let undelivered = self.undelivered.borrow_mut().take();
        let Some(old) = undelivered else {
            return;
        };
        runtime.pending_removed();

        let new = self.cell.get();
        if self.cell.comparer().eq(&old, &new) {
            return;
        }
        let fired = self.cell.effects().fire(&old, &new);
        Stats::add(&runtime.stats.effects_fired, fired);
    }

    fn clear_effects(&self, runtime: &Runtime) {
        self.cell.effects().clear();
        if self.undelivered.borrow_mut().take().is_some() {
            runtime.pending_removed();
        }
    }
}

/// A cached value derived from other nodes.
///
/// # Example
///
/// ```rust
/// use trellis_core::Graph;
///
/// let graph = Graph::new();
/// let counter = graph.source(2);
/// let parity = graph.derived({
///     let counter = counter.clone();
///     move || if counter.get() % 2 == 0 { "even" } else { "odd" }
/// });
///
/// counter.set(7);
/// assert_eq!(parity.get(), "odd");
/// ```
pub struct Derived<T: 'static> {
    node: Rc<DerivedNode<T>>,
    runtime: Weak<Runtime>,
}

impl<T: Clone + 'static> Derived<T> {
    pub(crate) fn create<F>(runtime: &Rc<Runtime>, compute: F, comparer: Comparer<T>) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let id = runtime.arena.allocate_id();
        let _span = trace_span!("derive", graph = %runtime.config.label, node = %id).entered();

        let scope = runtime.tracker.enter(&runtime.arena, id);
        let value = compute();
        let dependencies = scope.finish();
        Stats::add(&runtime.stats.computations, 1);
        trace!(dependencies = dependencies.len(), "created derived node");

        let node = Rc::new(DerivedNode {
            core: NodeCore::new(id, NodeKind::Derived),
            cell: ValueCell::new(id, value, comparer),
            compute: Box::new(compute),
            dependencies: RefCell::new(dependencies),
            undelivered: RefCell::new(None),
        });
        runtime.arena.insert(node.clone());

        Self {
            node,
            runtime: Rc::downgrade(runtime),
        }
    }

    pub fn id(&self) -> NodeId {
        self.node.core.id()
    }

    /// Number of value changes so far. Recomputing to an equal value does
    /// not count.
    pub fn version(&self) -> u64 {
        self.node.core.version()
    }

    pub fn state(&self) -> NodeState {
        self.node.core.state()
    }

    /// Get the current value, reconciling first if an ancestor changed.
    ///
    /// If called while another derived node is computing, the read is
    /// recorded as a dependency of that node.
    pub fn get(&self) -> T {
        if let Some(runtime) = self.runtime.upgrade() {
            self.node.ensure_computed(&runtime);
            runtime.record_read(&*self.node);
        }
        self.node.cell.get()
    }

    /// Get the cached value as is: no reconciliation, no dependency.
    pub fn get_untracked(&self) -> T {
        self.node.cell.get()
    }

    /// Register a callback run with `(old, new)` whenever the value changes.
    ///
    /// Registering makes the node eager: writes upstream reconcile it
    /// immediately. A suspect node is reconciled before the effect is
    /// added, so the effect only sees later changes.
    pub fn add_effect<F>(&self, effect: F) -> EffectHandle
    where
        F: Fn(&T, &T) + 'static,
    {
        if let Some(runtime) = self.runtime.upgrade() {
            self.node.ensure_computed(&runtime);
        }

        let first = self.node.cell.effects().is_empty();
        let handle = self.node.cell.effects().add(effect);
        if first {
            self.node.core.set_propagated(self.node.core.version());
        }
        handle
    }

    pub fn remove_effect(&self, handle: EffectHandle) -> bool {
        let removed = self.node.cell.effects().remove(handle);
        if removed && self.node.cell.effects().is_empty() {
            let dropped = self.node.undelivered.borrow_mut().take().is_some();
            if dropped {
                if let Some(runtime) = self.runtime.upgrade() {
                    runtime.pending_removed();
                }
            }
        }
        removed
    }

    /// Remove the node from its graph, deleting every node that depends on
    /// it. The handle keeps returning the last value.
    pub fn delete(&self) {
        match self.runtime.upgrade() {
            Some(runtime) => runtime.delete(self.id()),
            None => {
                self.node.cell.effects().clear();
                self.node.core.detach();
            }
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.node.core.is_detached()
    }
}

impl<T: 'static> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
            runtime: Weak::clone(&self.runtime),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived")
            .field("id", &self.id())
            .field("version", &self.version())
            .field("state", &self.state())
            .field("value", &self.get_untracked())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
