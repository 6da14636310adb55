//! Error types.
//!
//! Reads and writes are infallible by contract; panics raised by compute
//! functions, comparers or effects unwind through the call that triggered
//! them. The errors here come from the id-based and diagnostic APIs.

use crate::graph::NodeId;

pub type Result<T, E = GraphError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The id was never allocated by this graph.
    #[error("node {0} does not belong to this graph")]
    UnknownNode(NodeId),

    /// The node existed but has been deleted.
    #[error("node {0} has been deleted")]
    Deleted(NodeId),

    /// `child` depends on `parent`, but `parent` does not list it as a child.
    #[error("node {child} depends on {parent}, but {parent} does not list it as a child")]
    MissingChild { parent: NodeId, child: NodeId },

    /// `parent` lists `child`, but `child` does not depend on it.
    #[error("node {parent} lists {child} as a child, but {child} does not depend on it")]
    StaleChild { parent: NodeId, child: NodeId },

    #[error("node {node} depends on {dependency}, which is no longer in the graph")]
    DanglingDependency { node: NodeId, dependency: NodeId },
}
