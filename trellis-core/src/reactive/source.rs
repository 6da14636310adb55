//! Source Implementation
//!
//! A source is the externally writable reactive cell. It is the root of all
//! change propagation.
//!
//! # How Sources Work
//!
//! 1. When a source is read inside a derived node's computation, the source
//!    records that node as a child.
//!
//! 2. When a source is written with a value its comparer considers different:
//!    a. every derived node reachable from it is marked suspect
//!    b. the value is stored and the version bumped
//!    c. the source's own effects run with `(old, new)`
//!    d. the write is delivered to each child, which reconciles eagerly if
//!       it (or something below it) has effects
//!
//! 3. Writing an equal value does nothing at all.

use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, trace_span};

use super::cell::ValueCell;
use super::effect::EffectHandle;
use super::equality::Comparer;
use super::runtime::{Runtime, Stats};
use crate::graph::{Node, NodeCore, NodeId, NodeKind};

pub(crate) struct SourceNode<T: 'static> {
    core: NodeCore,
    cell: ValueCell<T>,
}

impl<T: Clone + 'static> Node for SourceNode<T> {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn effect_count(&self) -> usize {
        self.cell.effects().len()
    }

    fn clear_effects(&self, _runtime: &Runtime) {
        self.cell.effects().clear();
    }
}

/// A reactive cell holding a value of type `T`.
///
/// Handles are cheap to clone; all clones share one node.
///
/// # Example
///
/// ```rust
/// use trellis_core::Graph;
///
/// let graph = Graph::new();
/// let name = graph.source(String::from("Ada"));
///
/// name.add_effect(|old, new| println!("{old} -> {new}"));
/// assert!(name.set("Grace".to_string()));
/// assert!(!name.set("Grace".to_string()));
/// assert_eq!(name.version(), 1);
/// ```
pub struct Source<T: 'static> {
    node: Rc<SourceNode<T>>,
    runtime: Weak<Runtime>,
}

impl<T: Clone + 'static> Source<T> {
    pub(crate) fn create(runtime: &Rc<Runtime>, value: T, comparer: Comparer<T>) -> Self {
        let id = runtime.arena.allocate_id();
        let node = Rc::new(SourceNode {
            core: NodeCore::new(id, NodeKind::Source),
            cell: ValueCell::new(id, value, comparer),
        });
        runtime.arena.insert(node.clone());
        trace!(graph = %runtime.config.label, node = %id, "created source");

        Self {
            node,
            runtime: Rc::downgrade(runtime),
        }
    }

    pub fn id(&self) -> NodeId {
        self.node.core.id()
    }

    /// Number of value changes so far.
    pub fn version(&self) -> u64 {
        self.node.core.version()
    }

    /// Get the current value.
    ///
    /// If called while a derived node is computing, the read is recorded as
    /// a dependency of that node.
    pub fn get(&self) -> T {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.record_read(&*self.node);
        }
        self.node.cell.get()
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> T {
        self.node.cell.get()
    }

    /// Write a new value.
    ///
    /// Returns true if the value changed per the comparer, in which case the
    /// change has been fully propagated when this returns.
    pub fn set(&self, value: T) -> bool {
        let node = &self.node;
        if node.cell.is_current(&value) {
            return false;
        }

        let id = node.core.id();
        let runtime = self.runtime.upgrade().filter(|_| !node.core.is_detached());
        let label = runtime.as_ref().map_or("detached", |rt| rt.config.label.as_str());
        let _span = trace_span!("set", graph = label, node = %id).entered();

        if let Some(runtime) = &runtime {
            runtime.mark_suspect_from(&**node);
        }

        let old = node.cell.replace(value);
        let version = node.core.bump_version();
        debug!(version, "source changed");

        if !node.cell.effects().is_empty() {
            let new = node.cell.get();
            let fired = node.cell.effects().fire(&old, &new);
            if let Some(runtime) = &runtime {
                Stats::add(&runtime.stats.effects_fired, fired);
            }
        }

        if let Some(runtime) = &runtime {
            Stats::add(&runtime.stats.writes, 1);
            let _wave = runtime.begin_wave();
            runtime.forward_effects(&**node);
            runtime.verify_after_write(id);
        }
        true
    }

    /// Write a value computed from the current one.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.node.cell.get());
        self.set(next)
    }

    /// Register a callback run with `(old, new)` after every change.
    pub fn add_effect<F>(&self, effect: F) -> EffectHandle
    where
        F: Fn(&T, &T) + 'static,
    {
        self.node.cell.effects().add(effect)
    }

    pub fn remove_effect(&self, handle: EffectHandle) -> bool {
        self.node.cell.effects().remove(handle)
    }

    /// Remove the source from its graph, deleting every node that depends
    /// on it. The handle stays readable and writable, but writes no longer
    /// reach anything.
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

impl<T: 'static> Clone for Source<T> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
            runtime: Weak::clone(&self.runtime),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id())
            .field("version", &self.version())
            .field("value", &self.get_untracked())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Graph;
    use std::cell::{Cell, RefCell};

    #[test]
    fn source_get_and_set() {
        let graph = Graph::new();
        let source = graph.source(123);
        assert_eq!(source.get(), 123);

        assert!(source.set(456));
        assert_eq!(source.get(), 456);
        assert_eq!(source.version(), 1);
    }

    #[test]
    fn source_update() {
        let graph = Graph::new();
        let source = graph.source(10);
        assert!(source.update(|v| v + 5));
        assert_eq!(source.get(), 15);
        assert!(!source.update(|v| *v));
    }

    #[test]
    fn effects_fire_with_old_and_new() {
        let graph = Graph::new();
        let source = graph.source(123);
        let seen = Rc::new(Cell::new(None));

        let seen_clone = seen.clone();
        source.add_effect(move |old, new| seen_clone.set(Some((*old, *new))));

        source.set(456);
        assert_eq!(seen.get(), Some((123, 456)));
    }

    #[test]
    fn equal_write_is_a_no_op() {
        let graph = Graph::new();
        let source = graph.source(123);
        let calls = Rc::new(Cell::new(0));

        let calls_clone = calls.clone();
        source.add_effect(move |_, _| calls_clone.set(calls_clone.get() + 1));

        assert!(!source.set(123));
        assert_eq!(calls.get(), 0);
        assert_eq!(source.version(), 0);
        assert_eq!(graph.stats().writes, 0);
    }

    #[derive(Debug, Clone)]
    struct Record {
        s: &'static str,
        stamp: u32,
    }

    #[test]
    fn custom_comparer_decides_what_is_a_change() {
        let graph = Graph::new();
        let source = graph.source_with(
            Record { s: "ABC", stamp: 1 },
            Comparer::new(|a: &Record, b: &Record| a.s == b.s),
        );
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_clone = seen.clone();
        source.add_effect(move |old: &Record, new: &Record| {
            seen_clone.borrow_mut().push((old.s, new.s));
        });

        // Only the stamp differs
        assert!(!source.set(Record { s: "ABC", stamp: 2 }));
        assert!(seen.borrow().is_empty());
        assert_eq!(source.get().stamp, 1);

        assert!(source.set(Record { s: "DEF", stamp: 1 }));
        assert_eq!(*seen.borrow(), vec![("ABC", "DEF")]);
    }

    #[test]
    fn multiple_effects_and_removal() {
        let graph = Graph::new();
        let source = graph.source(123);
        let first = Rc::new(Cell::new(None));
        let second = Rc::new(Cell::new(None));

        let first_clone = first.clone();
        source.add_effect(move |old, new| first_clone.set(Some((*old, *new))));
        let second_clone = second.clone();
        let handle = source.add_effect(move |old, new| second_clone.set(Some((*old, *new))));

        source.set(456);
        assert_eq!(first.get(), Some((123, 456)));
        assert_eq!(second.get(), Some((123, 456)));

        assert!(source.remove_effect(handle));
        source.set(789);
        assert_eq!(first.get(), Some((456, 789)));
        assert_eq!(second.get(), Some((123, 456)));
    }

    #[test]
    fn clone_shares_state() {
        let graph = Graph::new();
        let source1 = graph.source(0);
        let source2 = source1.clone();

        source1.set(42);
        assert_eq!(source2.get(), 42);
        assert_eq!(source1.id(), source2.id());
    }

    #[test]
    fn deleted_source_keeps_its_value_but_propagates_nothing() {
        let graph = Graph::new();
        let source = graph.source(1);
        let derived = graph.derived({
            let source = source.clone();
            move || source.get() * 2
        });

        source.delete();
        assert!(source.is_deleted());
        assert!(derived.is_deleted());
        assert_eq!(graph.node_count(), 0);

        assert!(source.set(5));
        assert_eq!(source.get(), 5);
        assert_eq!(derived.get(), 2);
    }

    #[test]
    fn source_outlives_its_graph() {
        let graph = Graph::new();
        let source = graph.source(1);
        drop(graph);

        assert!(source.set(2));
        assert_eq!(source.get(), 2);
    }

    #[test]
    fn write_from_an_effect_propagates_before_returning() {
        let graph = Graph::new();
        let celsius = graph.source(0);
        let fahrenheit = graph.source(32);

        {
            let fahrenheit = fahrenheit.clone();
            celsius.add_effect(move |_, c| {
                fahrenheit.set(c * 9 / 5 + 32);
            });
        }
        let label = graph.derived({
            let fahrenheit = fahrenheit.clone();
            move || format!("{}F", fahrenheit.get())
        });

        celsius.set(100);
        assert_eq!(fahrenheit.get_untracked(), 212);
        assert_eq!(label.get(), "212F");
    }
}
