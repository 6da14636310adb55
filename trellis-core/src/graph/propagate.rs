//! Graph Maintenance
//!
//! Write propagation happens in two passes over the children edges:
//!
//! 1. When a source changes, every derived node reachable from it is marked
//!    suspect. The walk stops at nodes that are already suspect, so repeated
//!    writes cost O(newly marked nodes).
//! 2. Effect delivery walks down again. Nodes without effects just forward
//!    the walk; nodes with effects reconcile themselves (pulling their
//!    ancestors first), fire, and forward only if their version moved.
//!
//! Nodes nobody observes stay suspect until the next read.
//!
//! Every write is delivered under its own wave id. A node without effects
//! forwards a wave only the first time it is reached, so delivery through
//! stacked diamonds costs O(edges), not O(paths).

use std::collections::HashSet;

use tracing::{debug, trace};

use super::node::{IdList, Node, NodeId};
use crate::reactive::{Runtime, Stats};

impl Runtime {
    /// Mark every derived node reachable from `root` as suspect.
    ///
    /// Returns the number of nodes that transitioned from fresh to suspect.
    pub(crate) fn mark_suspect_from(&self, root: &dyn Node) -> u64 {
        let mut pending: IdList = root.core().children();
        let mut marked: u64 = 0;

        while let Some(id) = pending.pop() {
            let Some(node) = self.arena.get(id) else {
                continue;
            };
            if node.core().mark_suspect() {
                marked += 1;
                pending.extend(node.core().children());
            }
        }

        Stats::add(&self.stats.suspect_marks, marked);
        trace!(node = %root.core().id(), marked, "marked descendants suspect");
        marked
    }

    /// Start delivering a new write. The previous wave is restored when the
    /// returned guard drops, so a nested write hands control back cleanly.
    pub(crate) fn begin_wave(&self) -> WaveScope<'_> {
        let wave = self.last_wave.get() + 1;
        self.last_wave.set(wave);
        let outer = self.wave.replace(wave);
        trace!(wave, outer, "began write wave");

        WaveScope {
            runtime: self,
            outer,
        }
    }

    /// Check if the current wave reaches `node` for the first time.
    pub(crate) fn first_visit(&self, node: &dyn Node) -> bool {
        node.core().visit(self.wave.get())
    }

    /// Deliver a write to every child of `node`.
    ///
    /// Children are snapshotted first: effects may add or delete nodes while
    /// the walk is in progress.
    pub(crate) fn forward_effects(&self, node: &dyn Node) {
        for id in node.core().children() {
            match self.arena.get(id) {
                Some(child) => {
                    Stats::add(&self.stats.deliveries, 1);
                    child.fire_effects(self);
                }
                None => node.core().remove_child(id),
            }
        }
    }

    /// Fire the undelivered effects of every ancestor of `node`, ancestors
    /// first.
    ///
    /// An effect-bearing ancestor may have been reconciled as part of pulling
    /// `node`, before the write reached it. Its effects have to run before
    /// `node`'s own.
    pub(crate) fn flush_upstream_effects(&self, node: &dyn Node) {
        if self.pending_effects.get() == 0 {
            return;
        }
        let mut visited = HashSet::new();
        self.flush_ancestors(node, &mut visited);
    }

    fn flush_ancestors(&self, node: &dyn Node, visited: &mut HashSet<NodeId>) {
        let Some(deps) = node.dependencies() else {
            return;
        };
        let parents: IdList = deps.borrow().keys().copied().collect();

        for id in parents {
            if !visited.insert(id) {
                continue;
            }
            if let Some(parent) = self.arena.get(id) {
                self.flush_ancestors(&*parent, visited);
                parent.fire_pending(self);
            }
        }
    }

    /// Remove a node and, recursively, everything that depends on it.
    pub(crate) fn delete(&self, id: NodeId) {
        let Some(node) = self.arena.remove(id) else {
            return;
        };

        if let Some(deps) = node.dependencies() {
            let stale = std::mem::take(&mut *deps.borrow_mut());
            self.arena.unlink(id, &stale);
        }
        node.clear_effects(self);
        node.core().detach();

        let children = node.core().take_children();
        debug!(graph = %self.config.label, node = %id, dependents = children.len(), "deleted node");

        for child in children {
            self.delete(child);
        }
    }
}

/// Guard for one write wave; restores the enclosing wave on drop.
pub(crate) struct WaveScope<'a> {
    runtime: &'a Runtime,
    outer: u64,
}

impl Drop for WaveScope<'_> {
    fn drop(&mut self) {
        self.runtime.wave.set(self.outer);
    }
}
