//! Trellis Core
//!
//! This crate provides a fine-grained reactive evaluation engine: a graph of
//! memoized values where some nodes hold externally written state and
//! others are pure functions of other nodes, kept consistent lazily when
//! state changes.
//!
//! It implements:
//!
//! - Sources, derived values and effects
//! - Automatic dependency discovery
//! - Version-based change detection
//! - Diamond-safe propagation (no redundant recomputation, no stale reads)
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: the public primitives and the dependency tracking context
//! - `graph`: node storage and graph maintenance
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use trellis_core::Graph;
//!
//! let graph = Graph::new();
//!
//! let first = graph.source("David".to_string());
//! let last = graph.source("Betteridge".to_string());
//! let full = graph.derived({
//!     let (first, last) = (first.clone(), last.clone());
//!     move || format!("{} {}", first.get(), last.get())
//! });
//!
//! let changes = Rc::new(Cell::new(0));
//! let counter = changes.clone();
//! full.add_effect(move |_old, _new| counter.set(counter.get() + 1));
//!
//! first.set("Esther".to_string());
//! assert_eq!(full.get(), "Esther Betteridge");
//! assert_eq!(changes.get(), 1);
//! ```
//!
//! Graphs are single-threaded. Cycles between nodes are a caller error and
//! are not detected.

mod config;
mod error;
pub mod graph;
pub mod reactive;

pub use config::GraphConfig;
pub use error::{GraphError, Result};
pub use graph::{NodeId, NodeInfo, NodeKind, NodeState};
pub use reactive::{Comparer, Derived, EffectHandle, EffectId, Graph, GraphStats, Source};
