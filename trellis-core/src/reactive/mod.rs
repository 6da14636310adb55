//! Reactive Primitives
//!
//! This module implements the public side of the engine: graphs, sources,
//! derived values and effects.
//!
//! # Concepts
//!
//! ## Sources
//!
//! A [`Source`] is a container for externally written state. When a source
//! is read while a derived node computes, the derived node is registered as
//! a child of the source. When the source's value changes, the change is
//! propagated to everything reachable from it.
//!
//! ## Derived Nodes
//!
//! A [`Derived`] node caches the result of a pure function of other nodes.
//! It recomputes lazily, and only if a value it actually read changed.
//!
//! ## Effects
//!
//! An effect is a callback attached to any node, run with `(old, new)`
//! when the node's value changes. Effects are what make a derived node
//! evaluate eagerly during a write.
//!
//! # Implementation Notes
//!
//! Every [`Graph`] owns a tracking stack. While a derived node computes, it
//! sits on top of that stack and every read is attributed to it, so
//! dependencies are discovered without the compute function ever seeing
//! the graph.
//!
//! Change detection is version based: each node counts its value changes,
//! and each dependency edge remembers the count it last saw.

mod cell;
mod context;
mod derived;
mod effect;
mod equality;
mod runtime;
mod source;

pub(crate) use runtime::{Runtime, Stats};

pub use derived::Derived;
pub use effect::{EffectHandle, EffectId};
pub use equality::Comparer;
pub use runtime::{Graph, GraphStats};
pub use source::Source;
