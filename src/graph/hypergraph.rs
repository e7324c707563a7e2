//! Hypergraph Storage
//!
//! Entities and relationships live in an ordered slab of nodes with a
//! key-to-slot index for O(1) lookup. Removed nodes leave a tombstone (the
//! index points at a sentinel and the slot holds nothing) until the
//! tombstone count crosses the compaction threshold, at which point the
//! slab is rebuilt. Property values live in a separate dictionary keyed by
//! owner id and property name.
//!
//! Removal is cascading: the traversal walks outgoing and incoming edges
//! breadth-first and, for embedded relationships, reaches through to the
//! owned end node. The returned records are ordered property removals,
//! then relationship removals, then entity removals, so replaying them in
//! reverse recreates a node before its edges before its values.

use crate::graph::error::GraphError;
use crate::graph::node::{EdgeDirection, EdgeInfo, GraphNode, KindFilter, NodeKind, PropertyNode};
use crate::query::Cursor;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::debug;

const TOMBSTONE: usize = usize::MAX;

/// Default tombstone count that triggers a slab rebuild
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 1000;

/// Outcome of a property write
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyWrite {
    /// Value the slot held before this write
    pub old_value: Option<Value>,
    /// Effective version of the write
    pub version: u64,
}

/// One record produced by a removal cascade
#[derive(Debug, Clone, PartialEq)]
pub enum Removal {
    /// A property node was dropped
    Property {
        owner_id: String,
        owner_schema_id: String,
        name: String,
        value: Value,
        version: u64,
    },
    /// A relationship node was unlinked
    Relationship {
        id: String,
        schema_id: String,
        start_id: String,
        start_schema_id: String,
        end_id: String,
        end_schema_id: String,
        version: u64,
    },
    /// An entity node was unlinked
    Entity {
        id: String,
        schema_id: String,
        version: u64,
    },
}

/// Adjacency storage for one domain
pub struct Hypergraph {
    domain: String,
    nodes: Vec<Option<GraphNode>>,
    index: HashMap<String, usize>,
    properties: HashMap<String, BTreeMap<String, PropertyNode>>,
    tombstones: usize,
    compaction_threshold: usize,
}

impl Hypergraph {
    /// Create an empty graph for the given domain
    pub fn new(domain: impl Into<String>, compaction_threshold: usize) -> Self {
        Self {
            domain: domain.into(),
            nodes: Vec::new(),
            index: HashMap::new(),
            properties: HashMap::new(),
            tombstones: 0,
            compaction_threshold,
        }
    }

    /// Owning domain name
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Number of live nodes
    pub fn element_count(&self) -> usize {
        self.index.values().filter(|&&s| s != TOMBSTONE).count()
    }

    /// Number of tombstoned slots awaiting compaction
    pub fn tombstone_count(&self) -> usize {
        self.tombstones
    }

    /// Whether the id is live
    pub fn has_node(&self, id: &str) -> bool {
        matches!(self.index.get(id), Some(&slot) if slot != TOMBSTONE)
    }

    /// Live node by id
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        match self.index.get(id) {
            Some(&slot) if slot != TOMBSTONE => self.nodes[slot].as_ref(),
            _ => None,
        }
    }

    fn node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        match self.index.get(id) {
            Some(&slot) if slot != TOMBSTONE => self.nodes[slot].as_mut(),
            _ => None,
        }
    }

    fn insert(&mut self, node: GraphNode) {
        let slot = self.nodes.len();
        self.index.insert(node.id.clone(), slot);
        self.nodes.push(Some(node));
    }

    /// Insert an entity node
    pub fn add_node(
        &mut self,
        id: &str,
        schema_id: &str,
        version: u64,
    ) -> Result<(), GraphError> {
        if self.has_node(id) {
            return Err(GraphError::duplicate_element(id));
        }
        debug!(domain = %self.domain, id, schema_id, "add node");
        self.insert(GraphNode::entity(id, schema_id, version));
        Ok(())
    }

    /// Insert a relationship node and record it on its endpoints
    ///
    /// The start must be live in this graph. An unknown end is tolerated,
    /// the target may live in another domain, but no incoming entry is
    /// recorded there. A self-loop is recorded once on the source with the
    /// `Both` direction.
    #[allow(clippy::too_many_arguments)]
    pub fn add_relationship(
        &mut self,
        id: &str,
        schema_id: &str,
        start_id: &str,
        start_schema_id: &str,
        end_id: &str,
        end_schema_id: &str,
        version: u64,
    ) -> Result<(), GraphError> {
        if self.has_node(id) {
            return Err(GraphError::duplicate_element(id));
        }
        if !self.has_node(start_id) {
            return Err(GraphError::invalid_element(start_id));
        }
        debug!(domain = %self.domain, id, schema_id, start_id, end_id, "add relationship");
        self.insert(GraphNode::relationship(
            id,
            schema_id,
            start_id,
            start_schema_id,
            end_id,
            end_schema_id,
            version,
        ));

        if start_id == end_id {
            if let Some(start) = self.node_mut(start_id) {
                start.outgoings.insert(
                    id.to_string(),
                    EdgeInfo {
                        id: id.to_string(),
                        schema_id: schema_id.to_string(),
                        end_id: end_id.to_string(),
                        end_schema_id: end_schema_id.to_string(),
                        direction: EdgeDirection::Both,
                    },
                );
            }
            return Ok(());
        }

        let Some(start) = self.node_mut(start_id) else {
            return Err(GraphError::invalid_element(start_id));
        };
        start.outgoings.insert(
            id.to_string(),
            EdgeInfo {
                id: id.to_string(),
                schema_id: schema_id.to_string(),
                end_id: end_id.to_string(),
                end_schema_id: end_schema_id.to_string(),
                direction: EdgeDirection::Outgoing,
            },
        );
        match self.node_mut(end_id) {
            Some(end) => {
                end.incomings.insert(
                    id.to_string(),
                    EdgeInfo {
                        id: id.to_string(),
                        schema_id: schema_id.to_string(),
                        end_id: start_id.to_string(),
                        end_schema_id: start_schema_id.to_string(),
                        direction: EdgeDirection::Incoming,
                    },
                );
            }
            None => {
                debug!(domain = %self.domain, id, end_id, "relationship end is not local, no incoming entry");
            }
        }
        Ok(())
    }

    /// Write a property slot on a live owner
    ///
    /// The slot version never decreases: the effective version is the
    /// maximum of the supplied tick and the previous one.
    pub fn set_property(
        &mut self,
        owner_id: &str,
        name: &str,
        value: Value,
        version: u64,
    ) -> Result<PropertyWrite, GraphError> {
        if !self.has_node(owner_id) {
            return Err(GraphError::property_owner_missing(owner_id));
        }
        let slot = self
            .properties
            .entry(owner_id.to_string())
            .or_default()
            .entry(name.to_string());
        use std::collections::btree_map::Entry;
        let write = match slot {
            Entry::Vacant(v) => {
                v.insert(PropertyNode {
                    value,
                    old_value: None,
                    version,
                });
                PropertyWrite {
                    old_value: None,
                    version,
                }
            }
            Entry::Occupied(mut o) => {
                let prev = o.get().clone();
                let effective = version.max(prev.version);
                o.insert(PropertyNode {
                    value,
                    old_value: Some(prev.value.clone()),
                    version: effective,
                });
                PropertyWrite {
                    old_value: Some(prev.value),
                    version: effective,
                }
            }
        };
        Ok(write)
    }

    /// Read a property slot
    pub fn property(&self, owner_id: &str, name: &str) -> Option<&PropertyNode> {
        self.properties.get(owner_id).and_then(|m| m.get(name))
    }

    /// Drop a property slot, returning what it held
    pub fn remove_property(&mut self, owner_id: &str, name: &str) -> Option<PropertyNode> {
        let owned = self.properties.get_mut(owner_id)?;
        let removed = owned.remove(name);
        if owned.is_empty() {
            self.properties.remove(owner_id);
        }
        removed
    }

    /// Property slots of one owner, in name order
    pub fn properties_of(
        &self,
        owner_id: &str,
    ) -> impl Iterator<Item = (&String, &PropertyNode)> {
        self.properties
            .get(owner_id)
            .into_iter()
            .flat_map(|m| m.iter())
    }

    /// Remove a node, cascading when requested
    ///
    /// The cascade enqueues every incident edge of each visited node and,
    /// when the visited node is a relationship whose schema `is_embedded`,
    /// its end node. With `cascade` off (rollback and undo/redo replay)
    /// only the requested node is unlinked; the replayed event stream
    /// already carries the individual removals.
    pub fn remove_node(
        &mut self,
        id: &str,
        version: Option<u64>,
        cascade: bool,
        is_embedded: impl Fn(&str) -> bool,
    ) -> Result<Vec<Removal>, GraphError> {
        if !self.has_node(id) {
            return Err(GraphError::invalid_element(id));
        }
        debug!(domain = %self.domain, id, cascade, "remove node");

        let mut visit_order: Vec<String> = Vec::new();
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(id.to_string());

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let node = match self.node(&current) {
                Some(n) => n,
                None => continue,
            };
            visit_order.push(current.clone());
            if !cascade {
                break;
            }
            for edge_id in node.outgoings.keys().chain(node.incomings.keys()) {
                queue.push_back(edge_id.clone());
            }
            if node.kind == NodeKind::Relationship && is_embedded(&node.schema_id) {
                if let Some(end) = &node.end_id {
                    queue.push_back(end.clone());
                }
            }
        }

        let mut property_removals = Vec::new();
        let mut relationship_removals = Vec::new();
        let mut entity_removals = Vec::new();

        for current in &visit_order {
            let node = match self.node(current) {
                Some(n) => n.clone(),
                None => continue,
            };
            if let Some(props) = self.properties.remove(current) {
                for (name, p) in props {
                    property_removals.push(Removal::Property {
                        owner_id: current.clone(),
                        owner_schema_id: node.schema_id.clone(),
                        name,
                        value: p.value,
                        version: p.version,
                    });
                }
            }
            let node_version = version.unwrap_or(node.version);
            match node.kind {
                NodeKind::Relationship => {
                    let start_id = node.start_id.clone().unwrap_or_default();
                    let end_id = node.end_id.clone().unwrap_or_default();
                    if let Some(start) = self.node_mut(&start_id) {
                        start.outgoings.remove(current);
                    }
                    if end_id != start_id {
                        if let Some(end) = self.node_mut(&end_id) {
                            end.incomings.remove(current);
                        }
                    }
                    relationship_removals.push(Removal::Relationship {
                        id: current.clone(),
                        schema_id: node.schema_id.clone(),
                        start_id,
                        start_schema_id: node.start_schema_id.clone().unwrap_or_default(),
                        end_id,
                        end_schema_id: node.end_schema_id.clone().unwrap_or_default(),
                        version: node_version,
                    });
                }
                NodeKind::Entity => {
                    entity_removals.push(Removal::Entity {
                        id: current.clone(),
                        schema_id: node.schema_id.clone(),
                        version: node_version,
                    });
                }
            }
            let slot = self.index.insert(current.clone(), TOMBSTONE);
            if let Some(slot) = slot {
                if slot != TOMBSTONE {
                    self.nodes[slot] = None;
                    self.tombstones += 1;
                }
            }
        }

        entity_removals.reverse();
        let mut out = property_removals;
        out.append(&mut relationship_removals);
        out.append(&mut entity_removals);

        if self.tombstones > self.compaction_threshold {
            self.compact();
        }
        Ok(out)
    }

    fn compact(&mut self) {
        debug!(domain = %self.domain, tombstones = self.tombstones, "compacting graph");
        let old = std::mem::take(&mut self.nodes);
        self.index.clear();
        for node in old.into_iter().flatten() {
            let slot = self.nodes.len();
            self.index.insert(node.id.clone(), slot);
            self.nodes.push(Some(node));
        }
        self.tombstones = 0;
    }

    /// Lazy cursor over live nodes, filtered by kind and exact schema id
    pub fn nodes(&self, filter: KindFilter, schema_id: Option<&str>) -> NodesCursor<'_> {
        NodesCursor {
            graph: self,
            filter,
            schema_id: schema_id.map(|s| s.to_lowercase()),
            pos: 0,
            current: None,
        }
    }

    pub(crate) fn slot_len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn slot(&self, pos: usize) -> Option<&GraphNode> {
        self.nodes.get(pos).and_then(|n| n.as_ref())
    }
}

/// Lazy cursor over the node slab, skipping tombstones
pub struct NodesCursor<'g> {
    graph: &'g Hypergraph,
    filter: KindFilter,
    schema_id: Option<String>,
    pos: usize,
    current: Option<String>,
}

impl Cursor for NodesCursor<'_> {
    type Item = String;

    fn move_next(&mut self) -> bool {
        while self.pos < self.graph.slot_len() {
            let pos = self.pos;
            self.pos += 1;
            if let Some(node) = self.graph.slot(pos) {
                if !self.filter.accepts(node.kind) {
                    continue;
                }
                if let Some(wanted) = &self.schema_id {
                    if node.schema_id.to_lowercase() != *wanted {
                        continue;
                    }
                }
                self.current = Some(node.id.clone());
                return true;
            }
        }
        self.current = None;
        false
    }

    fn current(&self) -> Option<String> {
        self.current.clone()
    }

    fn reset(&mut self) {
        self.pos = 0;
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph() -> Hypergraph {
        Hypergraph::new("d", DEFAULT_COMPACTION_THRESHOLD)
    }

    #[test]
    fn test_add_node_rejects_live_duplicate() {
        let mut g = graph();
        g.add_node("d:1", "m:Thing", 1).unwrap();
        assert!(matches!(
            g.add_node("d:1", "m:Thing", 2),
            Err(GraphError::DuplicateElement { .. })
        ));
    }

    #[test]
    fn test_tombstoned_id_can_be_readded() {
        let mut g = graph();
        g.add_node("d:1", "m:Thing", 1).unwrap();
        g.remove_node("d:1", None, true, |_| false).unwrap();
        assert!(!g.has_node("d:1"));
        g.add_node("d:1", "m:Thing", 2).unwrap();
        assert!(g.has_node("d:1"));
    }

    #[test]
    fn test_relationship_requires_live_start() {
        let mut g = graph();
        assert!(matches!(
            g.add_relationship("d:9", "m:Edge", "d:1", "m:Thing", "d:2", "m:Thing", 1),
            Err(GraphError::InvalidElement { .. })
        ));
    }

    #[test]
    fn test_edge_symmetry() {
        let mut g = graph();
        g.add_node("d:1", "m:Thing", 1).unwrap();
        g.add_node("d:2", "m:Thing", 1).unwrap();
        g.add_relationship("d:9", "m:Edge", "d:1", "m:Thing", "d:2", "m:Thing", 1)
            .unwrap();
        let start = g.node("d:1").unwrap();
        let end = g.node("d:2").unwrap();
        assert_eq!(start.outgoings["d:9"].end_id, "d:2");
        assert_eq!(end.incomings["d:9"].end_id, "d:1");
    }

    #[test]
    fn test_foreign_end_records_no_incoming() {
        let mut g = graph();
        g.add_node("d:1", "m:Thing", 1).unwrap();
        g.add_relationship("d:9", "m:Edge", "d:1", "m:Thing", "other:5", "m:Thing", 1)
            .unwrap();
        assert!(g.has_node("d:9"));
        assert_eq!(g.node("d:1").unwrap().outgoings["d:9"].end_id, "other:5");
    }

    #[test]
    fn test_self_loop_recorded_once_as_both() {
        let mut g = graph();
        g.add_node("d:1", "m:Thing", 1).unwrap();
        g.add_relationship("d:9", "m:Edge", "d:1", "m:Thing", "d:1", "m:Thing", 1)
            .unwrap();
        let node = g.node("d:1").unwrap();
        assert_eq!(node.outgoings["d:9"].direction, EdgeDirection::Both);
        assert!(node.incomings.is_empty());
    }

    #[test]
    fn test_property_write_tracks_old_value_and_version() {
        let mut g = graph();
        g.add_node("d:1", "m:Thing", 1).unwrap();
        let w = g.set_property("d:1", "Title", json!("a"), 10).unwrap();
        assert_eq!(w.old_value, None);
        assert_eq!(w.version, 10);
        let w = g.set_property("d:1", "Title", json!("b"), 5).unwrap();
        assert_eq!(w.old_value, Some(json!("a")));
        // versions never decrease
        assert_eq!(w.version, 10);
    }

    #[test]
    fn test_property_requires_live_owner() {
        let mut g = graph();
        assert!(matches!(
            g.set_property("d:1", "Title", json!("a"), 1),
            Err(GraphError::PropertyOwnerMissing { .. })
        ));
    }

    #[test]
    fn test_cascade_removes_edges_and_embedded_ends() {
        let mut g = graph();
        g.add_node("d:1", "m:Library", 1).unwrap();
        g.add_node("d:2", "m:Book", 1).unwrap();
        g.add_relationship("d:3", "m:Holds", "d:1", "m:Library", "d:2", "m:Book", 1)
            .unwrap();
        let removals = g
            .remove_node("d:1", None, true, |schema| schema == "m:Holds")
            .unwrap();
        let kinds: Vec<&str> = removals
            .iter()
            .map(|r| match r {
                Removal::Property { .. } => "prop",
                Removal::Relationship { .. } => "rel",
                Removal::Entity { .. } => "ent",
            })
            .collect();
        assert_eq!(kinds, vec!["rel", "ent", "ent"]);
        // entity removals are emitted deepest-first
        match &removals[1] {
            Removal::Entity { id, .. } => assert_eq!(id, "d:2"),
            other => panic!("expected entity removal, got {other:?}"),
        }
        match &removals[2] {
            Removal::Entity { id, .. } => assert_eq!(id, "d:1"),
            other => panic!("expected entity removal, got {other:?}"),
        }
        assert!(!g.has_node("d:1"));
        assert!(!g.has_node("d:2"));
        assert!(!g.has_node("d:3"));
    }

    #[test]
    fn test_non_embedded_end_survives_cascade() {
        let mut g = graph();
        g.add_node("d:1", "m:A", 1).unwrap();
        g.add_node("d:2", "m:B", 1).unwrap();
        g.add_relationship("d:3", "m:Knows", "d:1", "m:A", "d:2", "m:B", 1)
            .unwrap();
        g.remove_node("d:1", None, true, |_| false).unwrap();
        assert!(g.has_node("d:2"));
        assert!(!g.has_node("d:3"));
        assert!(g.node("d:2").unwrap().incomings.is_empty());
    }

    #[test]
    fn test_cascade_reaches_incoming_edges() {
        let mut g = graph();
        g.add_node("d:1", "m:A", 1).unwrap();
        g.add_node("d:2", "m:B", 1).unwrap();
        g.add_relationship("d:3", "m:Knows", "d:1", "m:A", "d:2", "m:B", 1)
            .unwrap();
        // removing the target also unlinks the edge pointing at it
        g.remove_node("d:2", None, true, |_| false).unwrap();
        assert!(g.has_node("d:1"));
        assert!(!g.has_node("d:3"));
        assert!(g.node("d:1").unwrap().outgoings.is_empty());
    }

    #[test]
    fn test_property_removals_precede_everything() {
        let mut g = graph();
        g.add_node("d:1", "m:A", 1).unwrap();
        g.set_property("d:1", "Name", json!("x"), 2).unwrap();
        let removals = g.remove_node("d:1", None, true, |_| false).unwrap();
        assert!(matches!(&removals[0], Removal::Property { name, .. } if name == "Name"));
        assert!(matches!(&removals[1], Removal::Entity { .. }));
        assert!(g.property("d:1", "Name").is_none());
    }

    #[test]
    fn test_no_cascade_unlinks_single_node() {
        let mut g = graph();
        g.add_node("d:1", "m:A", 1).unwrap();
        g.add_node("d:2", "m:B", 1).unwrap();
        g.add_relationship("d:3", "m:Knows", "d:1", "m:A", "d:2", "m:B", 1)
            .unwrap();
        let removals = g.remove_node("d:3", None, false, |_| true).unwrap();
        assert_eq!(removals.len(), 1);
        assert!(g.has_node("d:1"));
        assert!(g.has_node("d:2"));
        assert!(g.node("d:1").unwrap().outgoings.is_empty());
        assert!(g.node("d:2").unwrap().incomings.is_empty());
    }

    #[test]
    fn test_compaction_rebuilds_slab() {
        let mut g = Hypergraph::new("d", 3);
        for i in 0..6 {
            g.add_node(&format!("d:{i}"), "m:Thing", 1).unwrap();
        }
        for i in 0..4 {
            g.remove_node(&format!("d:{i}"), None, true, |_| false)
                .unwrap();
        }
        assert_eq!(g.tombstone_count(), 0);
        assert_eq!(g.element_count(), 2);
        assert!(g.has_node("d:4"));
        assert!(g.has_node("d:5"));
        let mut cursor = g.nodes(KindFilter::All, None);
        let mut seen = Vec::new();
        while cursor.move_next() {
            seen.push(cursor.current().unwrap());
        }
        assert_eq!(seen, vec!["d:4".to_string(), "d:5".to_string()]);
    }

    #[test]
    fn test_nodes_cursor_filters_kind_and_schema() {
        let mut g = graph();
        g.add_node("d:1", "m:A", 1).unwrap();
        g.add_node("d:2", "m:B", 1).unwrap();
        g.add_relationship("d:3", "m:Knows", "d:1", "m:A", "d:2", "m:B", 1)
            .unwrap();
        let mut entities = g.nodes(KindFilter::Entities, None);
        let mut n = 0;
        while entities.move_next() {
            n += 1;
        }
        assert_eq!(n, 2);
        let mut bs = g.nodes(KindFilter::All, Some("m:B"));
        assert!(bs.move_next());
        assert_eq!(bs.current().unwrap(), "d:2");
        assert!(!bs.move_next());
    }
}
