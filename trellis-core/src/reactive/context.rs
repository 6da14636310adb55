//! Dependency Tracking Context
//!
//! The tracking context records which derived node is currently computing.
//! This enables automatic dependency tracking: when a node is read, the read
//! is attributed to the computation on top of the stack.
//!
//! # Implementation
//!
//! Each graph owns one stack of frames. Entering a computation pushes a
//! frame; the frame collects the dependencies read during the computation.
//! The frame is popped by a guard, so the stack stays balanced even if the
//! compute function panics.
//!
//! Nested computations (a derived node reading another derived node that
//! must recompute first) push on top of each other; the stack depth equals
//! the length of the recomputation chain.

use std::cell::RefCell;

use crate::graph::{Arena, Dependencies, NodeId};

/// An entry in the tracking stack.
#[derive(Debug)]
struct Frame {
    /// The computing node, or `None` for an untracked section.
    reader: Option<NodeId>,
    /// Dependencies collected during this computation, with the version
    /// observed at the first read.
    dependencies: Dependencies,
}

#[derive(Debug, Default)]
pub(crate) struct TrackingContext {
    stack: RefCell<Vec<Frame>>,
}

impl TrackingContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enter a tracked scope for `node`.
    ///
    /// Reads made until the scope is finished or dropped are recorded as
    /// dependencies of `node`.
    pub(crate) fn enter<'a>(&'a self, arena: &'a Arena, node: NodeId) -> TrackingScope<'a> {
        self.stack.borrow_mut().push(Frame {
            reader: Some(node),
            dependencies: Dependencies::new(),
        });

        TrackingScope {
            context: self,
            arena,
            node,
            finished: false,
        }
    }

    /// Enter a section in which reads are not attributed to anyone.
    pub(crate) fn suspend(&self) -> UntrackedScope<'_> {
        self.stack.borrow_mut().push(Frame {
            reader: None,
            dependencies: Dependencies::new(),
        });

        UntrackedScope { context: self }
    }

    /// Check if reads are currently being attributed to a computation.
    pub(crate) fn is_active(&self) -> bool {
        self.current().is_some()
    }

    /// The node whose computation is on top of the stack, if any.
    pub(crate) fn current(&self) -> Option<NodeId> {
        self.stack.borrow().last().and_then(|frame| frame.reader)
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Check if `node` is anywhere on the stack.
    pub(crate) fn is_computing(&self, node: NodeId) -> bool {
        self.stack
            .borrow()
            .iter()
            .any(|frame| frame.reader == Some(node))
    }

    /// Record a read of `dependency` at `version`.
    ///
    /// Returns the reading node if this is its first read of `dependency`,
    /// so the caller can add the reverse edge.
    pub(crate) fn record(&self, dependency: NodeId, version: u64) -> Option<NodeId> {
        let mut stack = self.stack.borrow_mut();
        let frame = stack.last_mut()?;
        let reader = frame.reader?;

        if frame.dependencies.contains_key(&dependency) {
            return None;
        }
        frame.dependencies.insert(dependency, version);
        Some(reader)
    }

    fn pop(&self, expected: Option<NodeId>) -> Dependencies {
        let popped = self.stack.borrow_mut().pop();

        match popped {
            Some(frame) => {
                debug_assert_eq!(
                    frame.reader, expected,
                    "tracking scope mismatch: expected {:?}, got {:?}",
                    expected, frame.reader
                );
                frame.dependencies
            }
            None => Dependencies::new(),
        }
    }
}

/// Guard for a tracked computation.
///
/// Call [`TrackingScope::finish`] to collect the dependencies. Dropping the
/// guard without finishing (a panic in the compute function) pops the frame
/// and removes the child edges the aborted computation already added.
pub(crate) struct TrackingScope<'a> {
    context: &'a TrackingContext,
    arena: &'a Arena,
    node: NodeId,
    finished: bool,
}

impl TrackingScope<'_> {
    pub(crate) fn finish(mut self) -> Dependencies {
        self.finished = true;
        self.context.pop(Some(self.node))
    }
}

impl Drop for TrackingScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let partial = self.context.pop(Some(self.node));
            self.arena.unlink(self.node, &partial);
        }
    }
}

/// Guard for an untracked section.
pub(crate) struct UntrackedScope<'a> {
    context: &'a TrackingContext,
}

impl Drop for UntrackedScope<'_> {
    fn drop(&mut self) {
        self.context.pop(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_reader() {
        let arena = Arena::new();
        let context = TrackingContext::new();
        let id = arena.allocate_id();

        assert!(!context.is_active());
        assert!(context.current().is_none());

        {
            let scope = context.enter(&arena, id);

            assert!(context.is_active());
            assert_eq!(context.current(), Some(id));
            assert!(context.is_computing(id));

            scope.finish();
        }

        assert!(!context.is_active());
        assert_eq!(context.depth(), 0);
    }

    #[test]
    fn context_collects_dependencies_once() {
        let arena = Arena::new();
        let context = TrackingContext::new();
        let reader = arena.allocate_id();
        let (a, b) = (arena.allocate_id(), arena.allocate_id());

        let scope = context.enter(&arena, reader);

        assert_eq!(context.record(a, 3), Some(reader));
        assert_eq!(context.record(b, 0), Some(reader));
        // Second read of `a` is not a new edge, and keeps the first version
        assert_eq!(context.record(a, 4), None);

        let deps = scope.finish();
        assert_eq!(deps.into_iter().collect::<Vec<_>>(), vec![(a, 3), (b, 0)]);
    }

    #[test]
    fn reads_outside_a_computation_record_nothing() {
        let arena = Arena::new();
        let context = TrackingContext::new();
        let node = arena.allocate_id();

        assert_eq!(context.record(node, 0), None);
    }

    #[test]
    fn nested_contexts() {
        let arena = Arena::new();
        let context = TrackingContext::new();
        let (outer, inner, dep) = (arena.allocate_id(), arena.allocate_id(), arena.allocate_id());

        let outer_scope = context.enter(&arena, outer);
        {
            let inner_scope = context.enter(&arena, inner);
            assert_eq!(context.depth(), 2);
            assert_eq!(context.record(dep, 0), Some(inner));
            assert_eq!(inner_scope.finish().len(), 1);
        }

        // After inner context is done, outer should be current
        assert_eq!(context.current(), Some(outer));
        assert!(outer_scope.finish().is_empty());
        assert!(context.current().is_none());
    }

    #[test]
    fn untracked_section_hides_outer_reader() {
        let arena = Arena::new();
        let context = TrackingContext::new();
        let (reader, dep) = (arena.allocate_id(), arena.allocate_id());

        let scope = context.enter(&arena, reader);
        {
            let _untracked = context.suspend();
            assert!(!context.is_active());
            assert_eq!(context.record(dep, 0), None);
        }
        assert_eq!(context.current(), Some(reader));
        assert!(scope.finish().is_empty());
    }

    #[test]
    fn abandoned_scope_pops_its_frame() {
        let arena = Arena::new();
        let context = TrackingContext::new();
        let reader = arena.allocate_id();

        {
            let _scope = context.enter(&arena, reader);
            context.record(arena.allocate_id(), 0);
            // Dropped without finish, as on unwind
        }

        assert_eq!(context.depth(), 0);
    }
}
