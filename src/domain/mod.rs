//! Domain Facade
//!
//! A [`Domain`] owns one [`Hypergraph`] and fronts every mutation on it:
//! creating and removing entities and relationships, reading and writing
//! property values, and walking relationships. Each mutation appends an
//! event to the active session; nothing is published until the session's
//! outermost close.
//!
//! The domain also owns the materialized-element cache: [`ModelElement`]
//! handles are created on demand from graph nodes and disposed when the
//! underlying node is removed. The cache never holds a disposed element.

mod collection;

pub use collection::{CollectionFilter, ElementCollection};

use crate::error::StoreError;
use crate::events::{Event, EventKind};
use crate::graph::{Hypergraph, IdService, KindFilter, NodeKind, Removal};
use crate::models::{ModelElement, PropertyValue, TickProvider};
use crate::query::{ArrayCursor, Cursor, Query, QueryConfig};
use crate::schema::{
    ConstraintContext, ConstraintKind, Diagnostic, DiagnosticSeverity, PropertyKind,
    SchemaRegistry,
};
use crate::session::{Session, SessionInfo, SessionMode};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// External consumer of a domain's event stream
///
/// Adapters are registered on a domain, notified on every completed
/// session, and disposed with the domain.
pub trait DomainAdapter {
    /// Called after each session completes, committed or aborted
    fn session_completed(&mut self, info: &SessionInfo);

    /// Called when the owning domain is disposed
    fn disposed(&mut self) {}
}

/// Facade over one hypergraph
pub struct Domain {
    name: String,
    schemas: Rc<RefCell<SchemaRegistry>>,
    ids: IdService,
    graph: Hypergraph,
    cache: RefCell<HashMap<String, Rc<ModelElement>>>,
    adapters: Vec<Box<dyn DomainAdapter>>,
    ticks: Rc<dyn TickProvider>,
    disposed: bool,
}

impl Domain {
    pub(crate) fn new(
        name: String,
        schemas: Rc<RefCell<SchemaRegistry>>,
        ticks: Rc<dyn TickProvider>,
        compaction_threshold: usize,
    ) -> Self {
        Self {
            ids: IdService::new(name.clone()),
            graph: Hypergraph::new(name.clone(), compaction_threshold),
            name,
            schemas,
            cache: RefCell::new(HashMap::new()),
            adapters: Vec::new(),
            ticks,
            disposed: false,
        }
    }

    /// Domain name, lowercase-normalized
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current id sequence value
    pub fn sequence(&self) -> u64 {
        self.ids.sequence()
    }

    /// Number of live elements
    pub fn len(&self) -> usize {
        self.graph.element_count()
    }

    /// Whether the domain holds no live element
    pub fn is_empty(&self) -> bool {
        self.graph.element_count() == 0
    }

    /// Whether the domain has been disposed
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub(crate) fn graph(&self) -> &Hypergraph {
        &self.graph
    }

    fn ensure_usable(&self) -> Result<(), StoreError> {
        if self.disposed {
            Err(StoreError::disposed_element(&self.name))
        } else {
            Ok(())
        }
    }

    fn mint_id(&mut self, id: Option<&str>) -> Result<String, StoreError> {
        match id {
            None => Ok(self.ids.create_id(None)),
            Some(id) if id.contains(':') => {
                let prefix = format!("{}:", self.name);
                if !id.to_lowercase().starts_with(&prefix) {
                    return Err(crate::graph::GraphError::invalid_element(id).into());
                }
                self.ids.observe(id);
                Ok(id.to_string())
            }
            Some(local) => Ok(self.ids.create_id(Some(local))),
        }
    }

    /// Create an entity of the given schema
    ///
    /// Mints an id when none is supplied; a supplied full id must belong to
    /// this domain. The version defaults to the current tick.
    pub fn create_entity(
        &mut self,
        session: &mut Session,
        schema: &str,
        id: Option<&str>,
        version: Option<u64>,
    ) -> Result<Rc<ModelElement>, StoreError> {
        self.ensure_usable()?;
        let schema_id = {
            let registry = self.schemas.borrow();
            registry.schema_entity(schema)?.id().to_string()
        };
        let id = self.mint_id(id)?;
        let version = version.unwrap_or_else(|| self.ticks.tick());
        self.graph.add_node(&id, &schema_id, version)?;
        session.push_event(Event {
            domain: self.name.clone(),
            id: id.clone(),
            schema_id: schema_id.clone(),
            version,
            correlation_id: session.id(),
            top_level: true,
            kind: EventKind::AddEntity,
        });
        let element = Rc::new(ModelElement::entity(&id, &schema_id, &self.name));
        self.cache.borrow_mut().insert(id, element.clone());
        Ok(element)
    }

    /// Create a relationship of the given schema between two elements
    ///
    /// The start must be live in this domain and its schema must match the
    /// relationship's declared start. The end may live in another domain,
    /// in which case its schema id must be supplied.
    #[allow(clippy::too_many_arguments)]
    pub fn create_relationship(
        &mut self,
        session: &mut Session,
        schema: &str,
        start_id: &str,
        end_id: &str,
        end_schema: Option<&str>,
        id: Option<&str>,
        version: Option<u64>,
    ) -> Result<Rc<ModelElement>, StoreError> {
        self.ensure_usable()?;
        let (schema_id, declared_start) = {
            let registry = self.schemas.borrow();
            let rel = registry.schema_relationship(schema)?;
            (rel.id().to_string(), rel.start_schema_id.clone())
        };
        let start_schema_id = match self.graph.node(start_id) {
            Some(node) => node.schema_id.clone(),
            None => return Err(crate::graph::GraphError::invalid_element(start_id).into()),
        };
        if !self.schemas.borrow().is_a(&start_schema_id, &declared_start) {
            return Err(StoreError::type_mismatch(
                schema_id,
                format!("start '{start_id}' has schema '{start_schema_id}', expected '{declared_start}'"),
            ));
        }
        let end_schema_id = match self.graph.node(end_id) {
            Some(node) => node.schema_id.clone(),
            None => match end_schema {
                Some(s) => self
                    .schemas
                    .borrow()
                    .schema_info(s)?
                    .map(|item| item.id().to_string())
                    .unwrap_or_else(|| s.to_string()),
                None => {
                    return Err(StoreError::invalid_argument(format!(
                        "end schema required for foreign end '{end_id}'"
                    )))
                }
            },
        };
        let id = self.mint_id(id)?;
        let version = version.unwrap_or_else(|| self.ticks.tick());
        self.graph.add_relationship(
            &id,
            &schema_id,
            start_id,
            &start_schema_id,
            end_id,
            &end_schema_id,
            version,
        )?;
        session.push_event(Event {
            domain: self.name.clone(),
            id: id.clone(),
            schema_id: schema_id.clone(),
            version,
            correlation_id: session.id(),
            top_level: true,
            kind: EventKind::AddRelationship {
                start_id: start_id.to_string(),
                start_schema_id: start_schema_id.clone(),
                end_id: end_id.to_string(),
                end_schema_id: end_schema_id.clone(),
            },
        });
        let element = Rc::new(ModelElement::relationship(
            &id,
            &schema_id,
            &self.name,
            start_id,
            &start_schema_id,
            end_id,
            &end_schema_id,
        ));
        self.cache.borrow_mut().insert(id, element.clone());
        Ok(element)
    }

    /// Remove an element, cascading through incident edges and embedded ends
    ///
    /// Returns the emitted events in replay order: property removals, then
    /// relationship removals, then entity removals.
    pub fn remove(
        &mut self,
        session: &mut Session,
        id: &str,
        version: Option<u64>,
    ) -> Result<Vec<Event>, StoreError> {
        self.ensure_usable()?;
        let cascade = !session
            .mode()
            .intersects(SessionMode::ROLLBACK | SessionMode::UNDO_OR_REDO);
        let schemas = self.schemas.clone();
        let removals = self.graph.remove_node(id, version, cascade, |schema_id| {
            schemas
                .borrow()
                .schema_relationship(schema_id)
                .map(|rel| rel.embedded)
                .unwrap_or(false)
        })?;
        let events = self.removals_to_events(session, id, removals);
        for event in &events {
            session.push_event(event.clone());
        }
        Ok(events)
    }

    fn removals_to_events(
        &self,
        session: &Session,
        requested: &str,
        removals: Vec<Removal>,
    ) -> Vec<Event> {
        let mut cache = self.cache.borrow_mut();
        removals
            .into_iter()
            .map(|removal| match removal {
                Removal::Property {
                    owner_id,
                    owner_schema_id,
                    name,
                    value,
                    version,
                } => {
                    let serialized = self
                        .schemas
                        .borrow()
                        .property(&owner_schema_id, &name, true)
                        .map(|p| p.serialize(&value))
                        .unwrap_or(value);
                    Event {
                        domain: self.name.clone(),
                        id: owner_id,
                        schema_id: owner_schema_id,
                        version,
                        correlation_id: session.id(),
                        top_level: false,
                        kind: EventKind::RemoveProperty {
                            property_name: name,
                            value: Some(serialized),
                        },
                    }
                }
                Removal::Relationship {
                    id,
                    schema_id,
                    start_id,
                    start_schema_id,
                    end_id,
                    end_schema_id,
                    version,
                } => {
                    if let Some(element) = cache.remove(&id) {
                        element.dispose();
                    }
                    Event {
                        domain: self.name.clone(),
                        id: id.clone(),
                        schema_id,
                        version,
                        correlation_id: session.id(),
                        top_level: id == requested,
                        kind: EventKind::RemoveRelationship {
                            start_id,
                            start_schema_id,
                            end_id,
                            end_schema_id,
                        },
                    }
                }
                Removal::Entity {
                    id,
                    schema_id,
                    version,
                } => {
                    if let Some(element) = cache.remove(&id) {
                        element.dispose();
                    }
                    Event {
                        domain: self.name.clone(),
                        id: id.clone(),
                        schema_id,
                        version,
                        correlation_id: session.id(),
                        top_level: id == requested,
                        kind: EventKind::RemoveEntity,
                    }
                }
            })
            .collect()
    }

    /// Whether the id is live in this domain
    pub fn element_exists(&self, id: &str) -> bool {
        self.graph.has_node(id)
    }

    /// Materialize an element handle, through the cache
    pub fn get(&self, id: &str) -> Option<Rc<ModelElement>> {
        if let Some(element) = self.cache.borrow().get(id) {
            if !element.is_disposed() {
                return Some(element.clone());
            }
        }
        let node = self.graph.node(id)?;
        let element = Rc::new(match node.kind {
            NodeKind::Entity => ModelElement::entity(&node.id, &node.schema_id, &self.name),
            NodeKind::Relationship => ModelElement::relationship(
                &node.id,
                &node.schema_id,
                &self.name,
                node.start_id.as_deref().unwrap_or_default(),
                node.start_schema_id.as_deref().unwrap_or_default(),
                node.end_id.as_deref().unwrap_or_default(),
                node.end_schema_id.as_deref().unwrap_or_default(),
            ),
        });
        self.cache
            .borrow_mut()
            .insert(id.to_string(), element.clone());
        Some(element)
    }

    /// Schema id of a live element
    pub fn schema_of(&self, id: &str) -> Option<String> {
        self.graph.node(id).map(|n| n.schema_id.clone())
    }

    /// Read a property value
    ///
    /// When no property node exists but the schema declares a default, the
    /// default is materialized with version 0; a thunk default is invoked
    /// on every call. Calculated properties are computed on every call.
    pub fn get_property_value(
        &self,
        id: &str,
        property: &str,
    ) -> Result<Option<PropertyValue>, StoreError> {
        self.ensure_usable()?;
        let node = self
            .graph
            .node(id)
            .ok_or_else(|| crate::graph::GraphError::invalid_element(id))?;
        let definition = self
            .schemas
            .borrow()
            .property(&node.schema_id, property, true)
            .ok_or_else(|| {
                StoreError::invalid_argument(format!(
                    "property '{property}' is not declared on '{}'",
                    node.schema_id
                ))
            })?;
        if let PropertyKind::Calculated(compute) = &definition.kind {
            return Ok(Some(PropertyValue::from_default(compute(self, id))));
        }
        if let Some(slot) = self.graph.property(id, property) {
            return Ok(Some(PropertyValue {
                value: slot.value.clone(),
                old_value: slot.old_value.clone(),
                version: slot.version,
            }));
        }
        Ok(definition
            .default
            .as_ref()
            .map(|d| PropertyValue::from_default(d.materialize())))
    }

    /// Lenient property read used by query matchers, absent on any miss
    pub fn peek_property(&self, id: &str, property: &str) -> Option<Value> {
        match self.get_property_value(id, property) {
            Ok(Some(v)) => Some(v.value),
            _ => None,
        }
    }

    /// Write a property value
    ///
    /// Requires a live owner and a declared, non-calculated property. The
    /// version advances to the supplied tick or the current one and never
    /// decreases. Property-scoped check constraints run immediately; a
    /// failing one with error severity aborts the session.
    pub fn set_property_value(
        &mut self,
        session: &mut Session,
        id: &str,
        property: &str,
        value: Value,
        version: Option<u64>,
    ) -> Result<PropertyValue, StoreError> {
        self.ensure_usable()?;
        let schema_id = self
            .graph
            .node(id)
            .map(|n| n.schema_id.clone())
            .ok_or_else(|| crate::graph::GraphError::invalid_element(id))?;
        let definition = self
            .schemas
            .borrow()
            .property(&schema_id, property, true)
            .ok_or_else(|| {
                StoreError::invalid_argument(format!(
                    "property '{property}' is not declared on '{schema_id}'"
                ))
            })?;
        if definition.is_calculated() {
            return Err(StoreError::type_mismatch(
                property,
                "calculated properties are read-only",
            ));
        }
        let version = version.unwrap_or_else(|| self.ticks.tick());
        let write = self.graph.set_property(id, property, value.clone(), version)?;
        session.push_event(Event {
            domain: self.name.clone(),
            id: id.to_string(),
            schema_id: schema_id.clone(),
            version: write.version,
            correlation_id: session.id(),
            top_level: true,
            kind: EventKind::ChangePropertyValue {
                property_name: property.to_string(),
                value: definition.serialize(&value),
                old_value: write.old_value.as_ref().map(|v| definition.serialize(v)),
            },
        });
        self.run_property_checks(session, id, &schema_id, property, &value)?;
        Ok(PropertyValue {
            value,
            old_value: write.old_value,
            version: write.version,
        })
    }

    fn run_property_checks(
        &self,
        session: &mut Session,
        id: &str,
        schema_id: &str,
        property: &str,
        value: &Value,
    ) -> Result<(), StoreError> {
        let constraints = self.schemas.borrow().constraints(schema_id);
        for constraint in constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::Check)
            .filter(|c| c.property.as_deref() == Some(property))
        {
            let ctx = ConstraintContext {
                domain: self,
                element_id: id,
                schema_id,
                property: Some(property),
                value: Some(value),
            };
            if !constraint.holds(&ctx) {
                if constraint.is_error {
                    session.abort();
                    return Err(StoreError::constraint_violation(id, &constraint.message));
                }
                warn!(element = id, property, message = %constraint.message, "check constraint warning");
                session.add_diagnostic(Diagnostic {
                    severity: DiagnosticSeverity::Warning,
                    message: constraint.message.clone(),
                    element_id: id.to_string(),
                    property: Some(property.to_string()),
                });
            }
        }
        Ok(())
    }

    /// Write a property from a serialized payload
    ///
    /// Used by loaders: the value passes through the property deserializer
    /// first, and values for undeclared properties are skipped with a
    /// warning instead of failing the whole load.
    pub(crate) fn load_property(
        &mut self,
        session: &mut Session,
        id: &str,
        property: &str,
        value: &Value,
        version: Option<u64>,
    ) -> Result<(), StoreError> {
        let Some(schema_id) = self.schema_of(id) else {
            return Err(crate::graph::GraphError::invalid_element(id).into());
        };
        let Some(definition) = self.schemas.borrow().property(&schema_id, property, true) else {
            warn!(element = id, property, "skipping undeclared property in loaded data");
            return Ok(());
        };
        let value = definition.deserialize(value);
        self.set_property_value(session, id, property, value, version)?;
        Ok(())
    }

    /// Lazy cursor over live elements, filtered by kind and exact schema
    pub fn find(
        &self,
        filter: KindFilter,
        schema: Option<&str>,
    ) -> Result<impl Cursor<Item = String> + '_, StoreError> {
        let schema_id = match schema {
            Some(s) => Some(
                self.resolve_schema_id(s)
                    .ok_or_else(|| crate::schema::SchemaError::unknown_schema(s))?,
            ),
            None => None,
        };
        Ok(self.graph.nodes(filter, schema_id.as_deref()))
    }

    /// Resolve a schema name to its full id, if registered
    pub fn resolve_schema_id(&self, name: &str) -> Option<String> {
        self.schemas
            .borrow()
            .schema_info(name)
            .ok()
            .flatten()
            .map(|item| item.id().to_string())
    }

    /// Cursor over relationship ids, optionally bound to a schema and to
    /// terminal elements
    ///
    /// With a start, walks the start's outgoing edges; with an end, the
    /// end's arriving edges; with neither, all relationship nodes of the
    /// schema. Schema matching honors inheritance.
    pub fn find_relationships(
        &self,
        schema: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Box<dyn Cursor<Item = String> + '_>, StoreError> {
        let schema_id = match schema {
            Some(s) => Some(
                self.resolve_schema_id(s)
                    .ok_or_else(|| crate::schema::SchemaError::unknown_schema(s))?,
            ),
            None => None,
        };
        let matches_schema = |edge_schema: &str| -> bool {
            match &schema_id {
                Some(wanted) => self.schemas.borrow().is_a(edge_schema, wanted),
                None => true,
            }
        };
        if let Some(start_id) = start {
            let node = self
                .graph
                .node(start_id)
                .ok_or_else(|| crate::graph::GraphError::invalid_element(start_id))?;
            let ids: Vec<String> = node
                .outgoings
                .values()
                .filter(|e| end.map_or(true, |wanted| e.end_id == wanted))
                .filter(|e| matches_schema(&e.schema_id))
                .map(|e| e.id.clone())
                .collect();
            return Ok(Box::new(ArrayCursor::new(ids)));
        }
        if let Some(end_id) = end {
            let node = self
                .graph
                .node(end_id)
                .ok_or_else(|| crate::graph::GraphError::invalid_element(end_id))?;
            let ids: Vec<String> = node
                .arriving()
                .filter(|e| matches_schema(&e.schema_id))
                .map(|e| e.id.clone())
                .collect();
            return Ok(Box::new(ArrayCursor::new(ids)));
        }
        // neither terminal given: every relationship node, re-resolving the
        // schema per node so subtypes pass
        let schemas = self.schemas.clone();
        let graph = &self.graph;
        let cursor = graph
            .nodes(KindFilter::Relationships, None)
            .filtered(move |id: &String| match &schema_id {
                Some(wanted) => graph
                    .node(id)
                    .map(|n| schemas.borrow().is_a(&n.schema_id, wanted))
                    .unwrap_or(false),
                None => true,
            });
        Ok(Box::new(cursor))
    }

    /// Ids of elements reachable from `id` through the named reference
    pub fn reference_targets(&self, id: &str, reference: &str) -> Vec<String> {
        let Some(schema_id) = self.schema_of(id) else {
            return Vec::new();
        };
        let Some(descriptor) = self.schemas.borrow().reference(&schema_id, reference, true) else {
            return Vec::new();
        };
        self.relationship_terminals(&descriptor.relationship_id, id, descriptor.opposite)
    }

    /// Far-side element ids of `source_id`'s edges of the given relationship
    ///
    /// With `opposite` set, walks arriving edges and yields start elements
    /// instead. Subtypes of the relationship schema pass.
    pub fn relationship_terminals(
        &self,
        relationship_id: &str,
        source_id: &str,
        opposite: bool,
    ) -> Vec<String> {
        let Some(node) = self.graph.node(source_id) else {
            return Vec::new();
        };
        let registry = self.schemas.borrow();
        if opposite {
            node.arriving()
                .filter(|e| registry.is_a(&e.schema_id, relationship_id))
                .map(|e| e.end_id.clone())
                .collect()
        } else {
            node.outgoings
                .values()
                .filter(|e| registry.is_a(&e.schema_id, relationship_id))
                .map(|e| e.end_id.clone())
                .collect()
        }
    }

    /// Build a lazy query over this domain
    ///
    /// The source cursor is narrowed to the schema only when no alternative
    /// configuration exists; an `or` branch may target another schema, so
    /// its candidates must stay in the stream for per-element evaluation.
    pub fn query(&self, config: impl Into<Rc<QueryConfig>>) -> Query<'_> {
        let config: Rc<QueryConfig> = config.into();
        let source: Box<dyn Cursor<Item = String> + '_> = match &config.schema {
            Some(schema) if config.or.is_none() => {
                let schema_id = self
                    .resolve_schema_id(schema)
                    .unwrap_or_else(|| schema.clone());
                Box::new(self.graph.nodes(KindFilter::All, Some(&schema_id)))
            }
            _ => Box::new(self.graph.nodes(KindFilter::All, None)),
        };
        Query::new(self, source, config)
    }

    /// Register an adapter consuming this domain's event stream
    pub fn add_adapter(&mut self, adapter: Box<dyn DomainAdapter>) {
        self.adapters.push(adapter);
    }

    pub(crate) fn notify_adapters(&mut self, info: &SessionInfo) {
        for adapter in &mut self.adapters {
            adapter.session_completed(info);
        }
    }

    /// Re-apply a recorded event, used by rollback and undo/redo replay
    pub(crate) fn apply_event(
        &mut self,
        session: &mut Session,
        event: &Event,
    ) -> Result<(), StoreError> {
        debug!(domain = %self.name, event = event.name(), id = %event.id, "apply event");
        match &event.kind {
            EventKind::AddEntity => {
                self.ids.observe(&event.id);
                self.graph
                    .add_node(&event.id, &event.schema_id, event.version)?;
                session.push_event(Event {
                    correlation_id: session.id(),
                    ..event.clone()
                });
                let element = Rc::new(ModelElement::entity(
                    &event.id,
                    &event.schema_id,
                    &self.name,
                ));
                self.cache.borrow_mut().insert(event.id.clone(), element);
            }
            EventKind::AddRelationship {
                start_id,
                start_schema_id,
                end_id,
                end_schema_id,
            } => {
                self.ids.observe(&event.id);
                self.graph.add_relationship(
                    &event.id,
                    &event.schema_id,
                    start_id,
                    start_schema_id,
                    end_id,
                    end_schema_id,
                    event.version,
                )?;
                session.push_event(Event {
                    correlation_id: session.id(),
                    ..event.clone()
                });
                let element = Rc::new(ModelElement::relationship(
                    &event.id,
                    &event.schema_id,
                    &self.name,
                    start_id,
                    start_schema_id,
                    end_id,
                    end_schema_id,
                ));
                self.cache.borrow_mut().insert(event.id.clone(), element);
            }
            EventKind::RemoveEntity | EventKind::RemoveRelationship { .. } => {
                let removals =
                    self.graph
                        .remove_node(&event.id, Some(event.version), false, |_| false)?;
                let events = self.removals_to_events(session, &event.id, removals);
                for ev in events {
                    session.push_event(ev);
                }
            }
            EventKind::ChangePropertyValue {
                property_name,
                value,
                ..
            } => {
                let definition =
                    self.schemas
                        .borrow()
                        .property(&event.schema_id, property_name, true);
                let stored = definition
                    .as_ref()
                    .map(|p| p.deserialize(value))
                    .unwrap_or_else(|| value.clone());
                let write =
                    self.graph
                        .set_property(&event.id, property_name, stored, event.version)?;
                let old_value = write.old_value.map(|v| {
                    definition
                        .as_ref()
                        .map(|p| p.serialize(&v))
                        .unwrap_or(v)
                });
                session.push_event(Event {
                    domain: self.name.clone(),
                    id: event.id.clone(),
                    schema_id: event.schema_id.clone(),
                    version: write.version,
                    correlation_id: session.id(),
                    top_level: event.top_level,
                    kind: EventKind::ChangePropertyValue {
                        property_name: property_name.clone(),
                        value: value.clone(),
                        old_value,
                    },
                });
            }
            EventKind::RemoveProperty { property_name, .. } => {
                let removed = self.graph.remove_property(&event.id, property_name);
                session.push_event(Event {
                    domain: self.name.clone(),
                    id: event.id.clone(),
                    schema_id: event.schema_id.clone(),
                    version: event.version,
                    correlation_id: session.id(),
                    top_level: event.top_level,
                    kind: EventKind::RemoveProperty {
                        property_name: property_name.clone(),
                        value: removed.map(|p| p.value),
                    },
                });
            }
        }
        Ok(())
    }

    pub(crate) fn dispose(&mut self) {
        for adapter in &mut self.adapters {
            adapter.disposed();
        }
        self.adapters.clear();
        for (_, element) in self.cache.borrow_mut().drain() {
            element.dispose();
        }
        self.disposed = true;
    }
}
