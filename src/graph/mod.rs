//! Graph Layer
//!
//! The in-process adjacency storage backing each domain:
//!
//! - [`IdService`] - domain-scoped id minting with sequence recovery
//! - [`GraphNode`] / [`EdgeInfo`] / [`PropertyNode`] - stored records
//! - [`Hypergraph`] - slab storage, cascade removal, compaction

mod error;
mod hypergraph;
mod ids;
mod node;

pub use error::GraphError;
pub use hypergraph::{
    Hypergraph, NodesCursor, PropertyWrite, Removal, DEFAULT_COMPACTION_THRESHOLD,
};
pub use ids::IdService;
pub use node::{EdgeDirection, EdgeInfo, GraphNode, KindFilter, NodeKind, PropertyNode};
