//! Node Arena
//!
//! All nodes of a graph live in one arena, indexed by [`NodeId`]. Edges are
//! stored as ids in both directions: a derived node's dependency map names
//! its parents, and every node's children set names its dependents. The
//! arena holds the only graph-side strong reference to a node; handles hold
//! the others.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use super::node::{Dependencies, Node, NodeId};
use crate::error::{GraphError, Result};

pub(crate) struct Arena {
    nodes: RefCell<HashMap<NodeId, Rc<dyn Node>>>,
    next_id: Cell<u64>,
}

impl Arena {
    pub(crate) fn new() -> Self {
        Self {
            nodes: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }

    /// Reserve an id for a node that is about to be constructed.
    pub(crate) fn allocate_id(&self) -> NodeId {
        let raw = self.next_id.get();
        self.next_id.set(raw + 1);
        NodeId::from_raw(raw)
    }

    pub(crate) fn insert(&self, node: Rc<dyn Node>) {
        let id = node.core().id();
        self.nodes.borrow_mut().insert(id, node);
    }

    /// Look up a live node.
    ///
    /// The returned `Rc` is a clone, so no arena borrow is held while the
    /// caller runs user code.
    pub(crate) fn get(&self, id: NodeId) -> Option<Rc<dyn Node>> {
        self.nodes.borrow().get(&id).cloned()
    }

    pub(crate) fn remove(&self, id: NodeId) -> Option<Rc<dyn Node>> {
        self.nodes.borrow_mut().remove(&id)
    }

    /// Like [`Arena::get`], but tells apart ids that never existed from ids
    /// of deleted nodes.
    pub(crate) fn lookup(&self, id: NodeId) -> Result<Rc<dyn Node>> {
        match self.get(id) {
            Some(node) => Ok(node),
            None if id.raw() < self.next_id.get() => Err(GraphError::Deleted(id)),
            None => Err(GraphError::UnknownNode(id)),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Ids of all live nodes, oldest first.
    pub(crate) fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.borrow().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Remove `child` from the children set of every node in `parents`.
    pub(crate) fn unlink(&self, child: NodeId, parents: &Dependencies) {
        for parent in parents.keys() {
            if let Some(node) = self.get(*parent) {
                node.core().remove_child(child);
            }
        }
    }

    /// Verify that children sets and dependency maps mirror each other.
    pub(crate) fn check_edges(&self) -> Result<()> {
        for id in self.ids() {
            let Some(node) = self.get(id) else { continue };

            if let Some(deps) = node.dependencies() {
                for parent in deps.borrow().keys() {
                    let Some(parent_node) = self.get(*parent) else {
                        return Err(GraphError::DanglingDependency {
                            node: id,
                            dependency: *parent,
                        });
                    };
                    if !parent_node.core().has_child(id) {
                        return Err(GraphError::MissingChild {
                            parent: *parent,
                            child: id,
                        });
                    }
                }
            }

            for child in node.core().children() {
                let depends = self
                    .get(child)
                    .and_then(|c| c.dependencies().map(|d| d.borrow().contains_key(&id)))
                    .unwrap_or(false);
                if !depends {
                    return Err(GraphError::StaleChild { parent: id, child });
                }
            }
        }
        Ok(())
    }
}
