//! Dependency Graph
//!
//! This module holds the node storage and the graph maintenance primitives
//! the reactive handles are built on.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph where:
//!
//! - Nodes are sources (externally written) or derived values
//! - Edges represent dependencies: if A reads B, there is an edge from B to A
//!
//! Edges are stored as id sets in both directions. A dependent holds its
//! dependencies (through the handles captured by its compute function); a
//! dependency only knows the ids of its dependents, for notification.
//!
//! # Design Decisions
//!
//! 1. Nodes live in a per-graph arena indexed by [`NodeId`], so several
//!    graphs can coexist without sharing state.
//!
//! 2. The value-independent part of a node (version, state, children) is a
//!    plain struct embedded in each typed node, reached through one trait.
//!
//! 3. Cycles are a caller error and are not detected.

mod arena;
mod node;
mod propagate;

pub(crate) use arena::Arena;
pub(crate) use node::{Dependencies, IdList, Node, NodeCore};
pub use node::{NodeId, NodeInfo, NodeKind, NodeState};
