//! Graph Node Records
//!
//! Entities and relationships are both stored as [`GraphNode`]s; a
//! relationship node carries its endpoint ids and appears in the incident
//! maps of both endpoints as an [`EdgeInfo`] for O(1) traversal. Property
//! values live in separate [`PropertyNode`]s keyed by owner and name.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Kind of a stored graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Entity node
    Entity,
    /// Relationship node (an edge that is itself a node)
    Relationship,
}

/// Node kind filter for graph scans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    /// Entity nodes only
    Entities,
    /// Relationship nodes only
    Relationships,
    /// Both
    All,
}

impl KindFilter {
    /// Whether a node of the given kind passes this filter
    pub fn accepts(&self, kind: NodeKind) -> bool {
        match self {
            KindFilter::Entities => kind == NodeKind::Entity,
            KindFilter::Relationships => kind == NodeKind::Relationship,
            KindFilter::All => true,
        }
    }
}

/// Direction of an incident edge entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeDirection {
    /// Edge leaves this node
    Outgoing,
    /// Edge arrives at this node
    Incoming,
    /// Self-loop recorded once on the source
    Both,
}

/// Incident edge entry stored in a node's adjacency maps
///
/// `end_id` is the node on the far side of the edge relative to the map
/// holding the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeInfo {
    /// Id of the relationship node
    pub id: String,
    /// Schema of the relationship
    pub schema_id: String,
    /// Far-side node id
    pub end_id: String,
    /// Far-side schema id
    pub end_schema_id: String,
    /// Direction relative to the holding node
    pub direction: EdgeDirection,
}

/// A stored entity or relationship node
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// Element id, unique within the domain
    pub id: String,
    /// Full schema id
    pub schema_id: String,
    /// Entity or relationship
    pub kind: NodeKind,
    /// Tick of the last write, non-decreasing
    pub version: u64,
    /// Start node id, relationships only
    pub start_id: Option<String>,
    /// Start schema id, relationships only
    pub start_schema_id: Option<String>,
    /// End node id, relationships only
    pub end_id: Option<String>,
    /// End schema id, relationships only
    pub end_schema_id: Option<String>,
    /// Edges leaving this node, keyed by edge id
    pub outgoings: BTreeMap<String, EdgeInfo>,
    /// Edges arriving at this node, keyed by edge id
    pub incomings: BTreeMap<String, EdgeInfo>,
}

impl GraphNode {
    /// Create an entity node
    pub fn entity(id: impl Into<String>, schema_id: impl Into<String>, version: u64) -> Self {
        Self {
            id: id.into(),
            schema_id: schema_id.into(),
            kind: NodeKind::Entity,
            version,
            start_id: None,
            start_schema_id: None,
            end_id: None,
            end_schema_id: None,
            outgoings: BTreeMap::new(),
            incomings: BTreeMap::new(),
        }
    }

    /// Create a relationship node
    #[allow(clippy::too_many_arguments)]
    pub fn relationship(
        id: impl Into<String>,
        schema_id: impl Into<String>,
        start_id: impl Into<String>,
        start_schema_id: impl Into<String>,
        end_id: impl Into<String>,
        end_schema_id: impl Into<String>,
        version: u64,
    ) -> Self {
        Self {
            id: id.into(),
            schema_id: schema_id.into(),
            kind: NodeKind::Relationship,
            version,
            start_id: Some(start_id.into()),
            start_schema_id: Some(start_schema_id.into()),
            end_id: Some(end_id.into()),
            end_schema_id: Some(end_schema_id.into()),
            outgoings: BTreeMap::new(),
            incomings: BTreeMap::new(),
        }
    }

    /// Incident edges arriving at this node, including self-loops
    ///
    /// Self-loop edges are stored once in `outgoings` with the `Both`
    /// direction, so incoming-side traversals must merge them in.
    pub fn arriving(&self) -> impl Iterator<Item = &EdgeInfo> {
        self.incomings.values().chain(
            self.outgoings
                .values()
                .filter(|e| e.direction == EdgeDirection::Both),
        )
    }
}

/// A stored property value slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyNode {
    /// Current value
    pub value: Value,
    /// Value before the last write
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    /// Tick of the last write
    pub version: u64,
}
