//! JSON Load/Save
//!
//! Bidirectional translation between graph state and two JSON shapes:
//!
//! - the compressed **envelope** form
//!   `{schemas?, entities: [...], relationships: [...]}` where element
//!   schemas may be numeric indexes into the `schemas[].elements` list and
//!   `state: "D"` marks a removal
//! - the **POCO** form: nested objects keyed by reference property names,
//!   arrays for collection references, `$id`/`$ref` pairs for
//!   back-references and cycles
//!
//! Loading runs inside a `LOADING` session so undo recorders skip it, and
//! every loaded id ratchets the domain's id sequence. Loaded ids are
//! requalified into the target domain by their local part, so saved data
//! round-trips into any domain modulo id remapping.

use crate::error::StoreError;
use crate::session::{Session, SessionConfig, SessionMode};
use crate::store::Store;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    schemas: Vec<SchemaGroup>,
    #[serde(default)]
    entities: Vec<EnvelopeElement>,
    #[serde(default)]
    relationships: Vec<EnvelopeRelationship>,
}

#[derive(Debug, Deserialize)]
struct SchemaGroup {
    name: Option<String>,
    #[serde(default)]
    elements: Vec<SchemaGroupElement>,
}

#[derive(Debug, Deserialize)]
struct SchemaGroupElement {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeElement {
    id: Value,
    schema: Value,
    state: Option<String>,
    v: Option<u64>,
    #[serde(default)]
    properties: Vec<EnvelopeProperty>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeProperty {
    name: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeRelationship {
    id: Value,
    schema: Value,
    start_id: Value,
    end_id: Value,
    end_schema_id: Option<Value>,
    state: Option<String>,
    v: Option<u64>,
    #[serde(default)]
    properties: Vec<EnvelopeProperty>,
}

/// Local part of an envelope id: numbers stringify, qualified ids keep
/// everything after the first separator
fn id_local(value: &Value) -> Result<String, StoreError> {
    match value {
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s
            .split_once(':')
            .map(|(_, local)| local.to_string())
            .unwrap_or_else(|| s.clone())),
        other => Err(StoreError::invalid_document(format!(
            "id must be a number or string, got {other}"
        ))),
    }
}

/// Resolve an envelope schema field: numeric index or literal id
fn resolve_schema(value: &Value, resolved: &[String]) -> Result<String, StoreError> {
    match value {
        Value::Number(n) => {
            let idx = n
                .as_u64()
                .ok_or_else(|| StoreError::invalid_document("schema index must be unsigned"))?
                as usize;
            resolved.get(idx).cloned().ok_or_else(|| {
                StoreError::invalid_document(format!("schema index {idx} out of range"))
            })
        }
        Value::String(s) => Ok(s.clone()),
        other => Err(StoreError::invalid_document(format!(
            "schema must be an index or id, got {other}"
        ))),
    }
}

impl Store {
    /// Load an envelope document into a domain
    ///
    /// Returns the ids of the created elements. Runs inside a `LOADING`
    /// session; entities load before relationships so starts exist.
    pub fn load_json(&mut self, domain: &str, data: &Value) -> Result<Vec<String>, StoreError> {
        let envelope: Envelope = serde_json::from_value(data.clone())?;
        let resolved: Vec<String> = envelope
            .schemas
            .iter()
            .flat_map(|group| {
                group.elements.iter().map(move |el| match &group.name {
                    Some(name) if !name.is_empty() => format!("{name}:{}", el.name),
                    _ => el.name.clone(),
                })
            })
            .collect();
        let domain_key = self.domain(domain)?.name().to_string();

        self.run_in_session(
            SessionConfig::with_mode(SessionMode::LOADING),
            |store, session| {
                let mut created = Vec::new();
                for entity in &envelope.entities {
                    let local = id_local(&entity.id)?;
                    if entity.state.as_deref() == Some("D") {
                        let full = format!("{domain_key}:{local}");
                        let d = store.domain_mut(&domain_key)?;
                        if d.element_exists(&full) {
                            d.remove(session, &full, entity.v)?;
                        }
                        continue;
                    }
                    let schema = resolve_schema(&entity.schema, &resolved)?;
                    let element = store.domain_mut(&domain_key)?.create_entity(
                        session,
                        &schema,
                        Some(&local),
                        entity.v,
                    )?;
                    let id = element.id().to_string();
                    for property in &entity.properties {
                        store.domain_mut(&domain_key)?.load_property(
                            session,
                            &id,
                            &property.name,
                            &property.value,
                            entity.v,
                        )?;
                    }
                    created.push(id);
                }
                for relationship in &envelope.relationships {
                    let local = id_local(&relationship.id)?;
                    if relationship.state.as_deref() == Some("D") {
                        let full = format!("{domain_key}:{local}");
                        let d = store.domain_mut(&domain_key)?;
                        if d.element_exists(&full) {
                            d.remove(session, &full, relationship.v)?;
                        }
                        continue;
                    }
                    let schema = resolve_schema(&relationship.schema, &resolved)?;
                    let start = format!("{domain_key}:{}", id_local(&relationship.start_id)?);
                    let end = format!("{domain_key}:{}", id_local(&relationship.end_id)?);
                    let end_schema = relationship
                        .end_schema_id
                        .as_ref()
                        .map(|v| resolve_schema(v, &resolved))
                        .transpose()?;
                    let element = store.domain_mut(&domain_key)?.create_relationship(
                        session,
                        &schema,
                        &start,
                        &end,
                        end_schema.as_deref(),
                        Some(&local),
                        relationship.v,
                    )?;
                    let id = element.id().to_string();
                    for property in &relationship.properties {
                        store.domain_mut(&domain_key)?.load_property(
                            session,
                            &id,
                            &property.name,
                            &property.value,
                            relationship.v,
                        )?;
                    }
                    created.push(id);
                }
                Ok(created)
            },
        )
    }

    /// Load a POCO document as an element of the given schema
    ///
    /// Nested objects keyed by reference names become related elements;
    /// arrays feed collection references; `{"$ref": key}` points back at an
    /// element tagged `{"$id": key}` earlier in the document. Returns the
    /// root element id.
    pub fn load_json_as(
        &mut self,
        domain: &str,
        schema: &str,
        data: &Value,
    ) -> Result<String, StoreError> {
        let domain_key = self.domain(domain)?.name().to_string();
        let schema = schema.to_string();
        self.run_in_session(
            SessionConfig::with_mode(SessionMode::LOADING),
            |store, session| {
                let mut refs = HashMap::new();
                load_poco(store, session, &domain_key, &schema, data, &mut refs)
            },
        )
    }

    /// Save a domain as an envelope document
    pub fn save_json(&self, domain: &str) -> Result<Value, StoreError> {
        let d = self.domain(domain)?;
        let graph = d.graph();
        let mut entities = Vec::new();
        let mut relationships = Vec::new();
        for pos in 0..graph.slot_len() {
            let Some(node) = graph.slot(pos) else {
                continue;
            };
            let properties: Vec<Value> = graph
                .properties_of(&node.id)
                .map(|(name, slot)| {
                    let serialized = self
                        .schemas()
                        .property(&node.schema_id, name, true)
                        .map(|p| p.serialize(&slot.value))
                        .unwrap_or_else(|| slot.value.clone());
                    json!({"name": name, "value": serialized})
                })
                .collect();
            let mut record = Map::new();
            record.insert("id".to_string(), json!(node.id));
            record.insert("schema".to_string(), json!(node.schema_id));
            record.insert("v".to_string(), json!(node.version));
            if !properties.is_empty() {
                record.insert("properties".to_string(), Value::Array(properties));
            }
            match node.kind {
                crate::graph::NodeKind::Entity => entities.push(Value::Object(record)),
                crate::graph::NodeKind::Relationship => {
                    record.insert("startId".to_string(), json!(node.start_id));
                    record.insert("endId".to_string(), json!(node.end_id));
                    record.insert("endSchemaId".to_string(), json!(node.end_schema_id));
                    relationships.push(Value::Object(record));
                }
            }
        }
        Ok(json!({
            "entities": entities,
            "relationships": relationships,
        }))
    }

    /// Serialize one element and its reachable neighborhood as a POCO value
    ///
    /// Property values pass through each property's serializer; references
    /// nest as objects or arrays per cardinality; elements reached more
    /// than once get a `$id` tag and later occurrences become `$ref`.
    pub fn stringify(&self, domain: &str, id: &str) -> Result<Value, StoreError> {
        let d = self.domain(domain)?;
        if !d.element_exists(id) {
            return Err(crate::graph::GraphError::invalid_element(id).into());
        }
        let mut visited = HashSet::new();
        let mut shared = HashSet::new();
        collect_shared(self, d, id, &mut visited, &mut shared);
        let mut keys = HashMap::new();
        let mut emitted = HashSet::new();
        Ok(emit_poco(self, d, id, &shared, &mut keys, &mut emitted))
    }
}

fn collect_shared(
    store: &Store,
    domain: &crate::domain::Domain,
    id: &str,
    visited: &mut HashSet<String>,
    shared: &mut HashSet<String>,
) {
    if !visited.insert(id.to_string()) {
        shared.insert(id.to_string());
        return;
    }
    let Some(schema_id) = domain.schema_of(id) else {
        return;
    };
    for reference in store.schemas().references(&schema_id) {
        for target in domain.reference_targets(id, &reference.name) {
            if domain.element_exists(&target) {
                collect_shared(store, domain, &target, visited, shared);
            }
        }
    }
}

fn emit_poco(
    store: &Store,
    domain: &crate::domain::Domain,
    id: &str,
    shared: &HashSet<String>,
    keys: &mut HashMap<String, String>,
    emitted: &mut HashSet<String>,
) -> Value {
    if emitted.contains(id) {
        let key = keys.get(id).cloned().unwrap_or_else(|| id.to_string());
        return json!({ "$ref": key });
    }
    emitted.insert(id.to_string());

    let mut out = Map::new();
    if shared.contains(id) {
        let key = (keys.len() + 1).to_string();
        keys.insert(id.to_string(), key.clone());
        out.insert("$id".to_string(), json!(key));
    }
    out.insert("_id".to_string(), json!(id));
    let Some(schema_id) = domain.schema_of(id) else {
        return Value::Object(out);
    };
    out.insert("schema".to_string(), json!(schema_id));

    let graph = domain.graph();
    for property in store.schemas().properties(&schema_id, true) {
        if property.is_calculated() {
            continue;
        }
        if let Some(slot) = graph.property(id, &property.name) {
            out.insert(property.name.clone(), property.serialize(&slot.value));
        }
    }

    let references = store.schemas().references(&schema_id);
    for reference in references {
        let targets: Vec<String> = domain
            .reference_targets(id, &reference.name)
            .into_iter()
            .filter(|t| {
                let local = domain.element_exists(t);
                if !local {
                    warn!(element = %id, reference = %reference.name, target = %t, "skipping foreign reference target");
                }
                local
            })
            .collect();
        if reference.is_collection {
            if !targets.is_empty() {
                let nested: Vec<Value> = targets
                    .iter()
                    .map(|t| emit_poco(store, domain, t, shared, keys, emitted))
                    .collect();
                out.insert(reference.name.clone(), Value::Array(nested));
            }
        } else if let Some(target) = targets.first() {
            out.insert(
                reference.name.clone(),
                emit_poco(store, domain, target, shared, keys, emitted),
            );
        }
    }
    Value::Object(out)
}

fn load_poco(
    store: &mut Store,
    session: &mut Session,
    domain: &str,
    schema: &str,
    value: &Value,
    refs: &mut HashMap<String, String>,
) -> Result<String, StoreError> {
    let object = value
        .as_object()
        .ok_or_else(|| StoreError::invalid_document("expected a JSON object"))?;

    if let Some(reference) = object.get("$ref") {
        let key = reference
            .as_str()
            .ok_or_else(|| StoreError::invalid_document("$ref must be a string"))?;
        return refs.get(key).cloned().ok_or_else(|| {
            StoreError::invalid_document(format!("$ref '{key}' points at nothing"))
        });
    }

    let schema = object
        .get("schema")
        .and_then(Value::as_str)
        .unwrap_or(schema);
    let local = match object.get("_id") {
        Some(v) => Some(id_local(v)?),
        None => None,
    };
    let element_id = store
        .domain_mut(domain)?
        .create_entity(session, schema, local.as_deref(), None)?
        .id()
        .to_string();
    if let Some(tag) = object.get("$id").and_then(Value::as_str) {
        refs.insert(tag.to_string(), element_id.clone());
    }
    let schema_id = store
        .domain(domain)?
        .schema_of(&element_id)
        .unwrap_or_else(|| schema.to_string());

    for (key, nested) in object {
        if matches!(key.as_str(), "$id" | "$ref" | "_id" | "schema") {
            continue;
        }
        let reference = store.schemas().reference(&schema_id, key, true);
        let Some(reference) = reference else {
            store
                .domain_mut(domain)?
                .load_property(session, &element_id, key, nested, None)?;
            continue;
        };
        let (relationship_id, target_schema) = {
            let schemas = store.schemas();
            let relationship = schemas.schema_relationship(&reference.relationship_id)?;
            let target = if reference.opposite {
                relationship.start_schema_id.clone()
            } else {
                relationship.end_schema_id.clone()
            };
            (relationship.id().to_string(), target)
        };
        match nested {
            Value::Null => {}
            Value::Array(items) => {
                if !reference.is_collection {
                    return Err(StoreError::type_mismatch(
                        key,
                        "array assigned to a non-collection reference",
                    ));
                }
                for item in items {
                    let child =
                        load_poco(store, session, domain, &target_schema, item, refs)?;
                    link(store, session, domain, &relationship_id, &element_id, &child, reference.opposite)?;
                }
            }
            Value::Object(_) => {
                let child = load_poco(store, session, domain, &target_schema, nested, refs)?;
                link(store, session, domain, &relationship_id, &element_id, &child, reference.opposite)?;
            }
            other => {
                return Err(StoreError::type_mismatch(
                    key,
                    format!("reference expects an object or array, got {other}"),
                ));
            }
        }
    }
    Ok(element_id)
}

/// Create the relationship for a loaded reference unless it already exists
fn link(
    store: &mut Store,
    session: &mut Session,
    domain: &str,
    relationship_id: &str,
    element_id: &str,
    other: &str,
    opposite: bool,
) -> Result<(), StoreError> {
    let (start, end) = if opposite {
        (other, element_id)
    } else {
        (element_id, other)
    };
    let exists = {
        use crate::query::Cursor;
        store
            .domain(domain)?
            .find_relationships(Some(relationship_id), Some(start), Some(end))?
            .first_or_default()
            .is_some()
    };
    if !exists {
        store.domain_mut(domain)?.create_relationship(
            session,
            relationship_id,
            start,
            end,
            None,
            None,
            None,
        )?;
    }
    Ok(())
}
