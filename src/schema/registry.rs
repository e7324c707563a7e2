//! Schema Registry
//!
//! Interns schema elements by full id and by unqualified name, with
//! duplicate detection and ambiguity sentinels, and indexes relationships by
//! their start and end schemas. Lookup is case-insensitive; the original
//! casing is preserved on the stored descriptors.
//!
//! When a relationship declares `start_property` or `end_property`, the
//! registry attaches a [`SchemaReference`] descriptor to the corresponding
//! element so that queries and serialization can walk references by name.

use crate::schema::error::SchemaError;
use crate::schema::info::{
    SchemaElement, SchemaInfo, SchemaKind, SchemaReference, SchemaRelationship,
};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// A registered schema item
#[derive(Debug, Clone)]
pub enum SchemaItem {
    /// Primitive or value-object type
    Primitive(Rc<SchemaInfo>),
    /// Entity element
    Entity(Rc<SchemaElement>),
    /// Relationship element
    Relationship(Rc<SchemaRelationship>),
}

impl SchemaItem {
    /// Identity of the item
    pub fn info(&self) -> SchemaInfo {
        match self {
            SchemaItem::Primitive(info) => (**info).clone(),
            SchemaItem::Entity(el) => el.info().clone(),
            SchemaItem::Relationship(rel) => rel.element.info().clone(),
        }
    }

    /// Full id of the item
    pub fn id(&self) -> &str {
        match self {
            SchemaItem::Primitive(info) => &info.id,
            SchemaItem::Entity(el) => el.id(),
            SchemaItem::Relationship(rel) => rel.id(),
        }
    }

    /// Element view for entities and relationships
    pub fn element(&self) -> Option<Rc<SchemaElement>> {
        match self {
            SchemaItem::Primitive(_) => None,
            SchemaItem::Entity(el) => Some(el.clone()),
            SchemaItem::Relationship(rel) => Some(rel.element.clone()),
        }
    }
}

enum NameEntry {
    Unique(String),
    Ambiguous,
}

/// Names of the primitive types preloaded into every registry
pub const PRIMITIVES: &[&str] = &["string", "number", "boolean", "date", "any"];

/// Schema element registry
pub struct SchemaRegistry {
    by_id: HashMap<String, SchemaItem>,
    by_name: HashMap<String, NameEntry>,
    by_start: HashMap<String, Vec<String>>,
    by_end: HashMap<String, Vec<String>>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// Create a registry preloaded with the primitive types
    pub fn new() -> Self {
        let mut registry = Self {
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            by_start: HashMap::new(),
            by_end: HashMap::new(),
        };
        for name in PRIMITIVES {
            let info = SchemaInfo::unqualified(name, SchemaKind::Primitive);
            let _ = registry.intern(SchemaItem::Primitive(Rc::new(info)));
        }
        registry
    }

    fn intern(&mut self, item: SchemaItem) -> Result<(), SchemaError> {
        let info = item.info();
        let id_key = info.id.to_lowercase();
        if self.by_id.contains_key(&id_key) {
            return Err(SchemaError::duplicate_schema(&info.id));
        }
        let name_key = info.name.to_lowercase();
        self.by_name
            .entry(name_key)
            .and_modify(|e| *e = NameEntry::Ambiguous)
            .or_insert_with(|| NameEntry::Unique(info.id.clone()));
        self.by_id.insert(id_key, item);
        debug!(id = %info.id, kind = ?info.kind, "schema registered");
        Ok(())
    }

    /// Register a value-object or primitive type
    pub fn add_value_object(&mut self, info: SchemaInfo) -> Result<Rc<SchemaInfo>, SchemaError> {
        let info = Rc::new(info);
        self.intern(SchemaItem::Primitive(info.clone()))?;
        Ok(info)
    }

    /// Register an entity element
    pub fn add_entity(&mut self, element: SchemaElement) -> Result<Rc<SchemaElement>, SchemaError> {
        if element.kind() != SchemaKind::Entity {
            return Err(SchemaError::invalid_definition(format!(
                "'{}' is not an entity schema",
                element.id()
            )));
        }
        let element = Rc::new(element);
        self.intern(SchemaItem::Entity(element.clone()))?;
        Ok(element)
    }

    /// Register a relationship element
    ///
    /// Start and end schemas must already be registered. Declared start and
    /// end property names are attached as reference descriptors on the
    /// proper side.
    pub fn add_relationship(
        &mut self,
        relationship: SchemaRelationship,
    ) -> Result<Rc<SchemaRelationship>, SchemaError> {
        if self.by_id.contains_key(&relationship.id().to_lowercase()) {
            return Err(SchemaError::duplicate_schema(relationship.id()));
        }
        let start = self.schema_element(&relationship.start_schema_id)?;
        let end = self.schema_element(&relationship.end_schema_id)?;

        if let Some(name) = &relationship.start_property {
            start.attach_reference(SchemaReference {
                name: name.clone(),
                opposite: false,
                relationship_id: relationship.id().to_string(),
                is_collection: relationship.cardinality.many_ends(),
            });
        }
        if let Some(name) = &relationship.end_property {
            end.attach_reference(SchemaReference {
                name: name.clone(),
                opposite: true,
                relationship_id: relationship.id().to_string(),
                is_collection: relationship.cardinality.many_starts(),
            });
        }

        let relationship = Rc::new(relationship);
        self.by_start
            .entry(relationship.start_schema_id.to_lowercase())
            .or_default()
            .push(relationship.id().to_string());
        self.by_end
            .entry(relationship.end_schema_id.to_lowercase())
            .or_default()
            .push(relationship.id().to_string());
        self.intern(SchemaItem::Relationship(relationship.clone()))?;
        Ok(relationship)
    }

    /// Look up an item by full id or simple name
    ///
    /// Returns `Ok(None)` when nothing matches. A simple name shared by
    /// several schemas fails with `AmbiguousSchema`.
    pub fn schema_info(&self, name: &str) -> Result<Option<SchemaItem>, SchemaError> {
        if name.contains(':') {
            return Ok(self.by_id.get(&name.to_lowercase()).cloned());
        }
        match self.by_name.get(&name.to_lowercase()) {
            None => Ok(None),
            Some(NameEntry::Ambiguous) => Err(SchemaError::ambiguous_schema(name)),
            Some(NameEntry::Unique(id)) => Ok(self.by_id.get(&id.to_lowercase()).cloned()),
        }
    }

    /// Look up an item, failing when it is missing
    pub fn require(&self, name: &str) -> Result<SchemaItem, SchemaError> {
        self.schema_info(name)?
            .ok_or_else(|| SchemaError::unknown_schema(name))
    }

    /// Look up an entity or relationship element
    pub fn schema_element(&self, name: &str) -> Result<Rc<SchemaElement>, SchemaError> {
        self.require(name)?
            .element()
            .ok_or_else(|| SchemaError::unknown_schema(name))
    }

    /// Look up an entity element specifically
    pub fn schema_entity(&self, name: &str) -> Result<Rc<SchemaElement>, SchemaError> {
        match self.require(name)? {
            SchemaItem::Entity(el) => Ok(el),
            _ => Err(SchemaError::unknown_schema(name)),
        }
    }

    /// Look up a relationship element specifically
    pub fn schema_relationship(&self, name: &str) -> Result<Rc<SchemaRelationship>, SchemaError> {
        match self.require(name)? {
            SchemaItem::Relationship(rel) => Ok(rel),
            _ => Err(SchemaError::unknown_schema(name)),
        }
    }

    /// Relationships filtered by start and/or end schema id (exact match)
    pub fn relationships(
        &self,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Vec<Rc<SchemaRelationship>> {
        let pick = |ids: Option<&Vec<String>>| -> Vec<Rc<SchemaRelationship>> {
            ids.map(|ids| {
                ids.iter()
                    .filter_map(|id| self.schema_relationship(id).ok())
                    .collect()
            })
            .unwrap_or_default()
        };
        match (start, end) {
            (None, None) => self
                .by_id
                .values()
                .filter_map(|item| match item {
                    SchemaItem::Relationship(rel) => Some(rel.clone()),
                    _ => None,
                })
                .collect(),
            (Some(s), None) => pick(self.by_start.get(&s.to_lowercase())),
            (None, Some(e)) => pick(self.by_end.get(&e.to_lowercase())),
            (Some(s), Some(e)) => {
                let e = e.to_lowercase();
                pick(self.by_start.get(&s.to_lowercase()))
                    .into_iter()
                    .filter(|rel| rel.end_schema_id.to_lowercase() == e)
                    .collect()
            }
        }
    }

    /// Whether `schema_id` is `candidate` or inherits from it
    pub fn is_a(&self, schema_id: &str, candidate: &str) -> bool {
        let target = candidate.to_lowercase();
        let mut current = schema_id.to_string();
        loop {
            if current.to_lowercase() == target {
                return true;
            }
            let base = match self.by_id.get(&current.to_lowercase()).and_then(|i| i.element()) {
                Some(el) => el.base().map(str::to_string),
                None => None,
            };
            match base {
                Some(b) => current = b,
                None => return false,
            }
        }
    }

    /// Property lookup walking the base chain bottom-up
    pub fn property(
        &self,
        schema_id: &str,
        name: &str,
        recurse: bool,
    ) -> Option<Rc<crate::schema::SchemaProperty>> {
        let mut current = schema_id.to_string();
        loop {
            let element = self
                .by_id
                .get(&current.to_lowercase())
                .and_then(|i| i.element())?;
            if let Some(p) = element.own_property(name) {
                return Some(p);
            }
            if !recurse {
                return None;
            }
            match element.base() {
                Some(b) => current = b.to_string(),
                None => return None,
            }
        }
    }

    /// All properties of a schema, inherited first, then own
    pub fn properties(
        &self,
        schema_id: &str,
        include_inherited: bool,
    ) -> Vec<Rc<crate::schema::SchemaProperty>> {
        let mut chain = Vec::new();
        let mut current = schema_id.to_string();
        while let Some(element) = self
            .by_id
            .get(&current.to_lowercase())
            .and_then(|i| i.element())
        {
            let base = element.base().map(str::to_string);
            chain.push(element);
            if !include_inherited {
                break;
            }
            match base {
                Some(b) => current = b,
                None => break,
            }
        }
        chain
            .into_iter()
            .rev()
            .flat_map(|el| el.own_properties())
            .collect()
    }

    /// Reference lookup walking the base chain bottom-up
    pub fn reference(
        &self,
        schema_id: &str,
        name: &str,
        recurse: bool,
    ) -> Option<Rc<SchemaReference>> {
        let mut current = schema_id.to_string();
        loop {
            let element = self
                .by_id
                .get(&current.to_lowercase())
                .and_then(|i| i.element())?;
            if let Some(r) = element.own_reference(name) {
                return Some(r);
            }
            if !recurse {
                return None;
            }
            match element.base() {
                Some(b) => current = b.to_string(),
                None => return None,
            }
        }
    }

    /// All references of a schema, inherited first, then own
    pub fn references(&self, schema_id: &str) -> Vec<Rc<SchemaReference>> {
        let mut chain = Vec::new();
        let mut current = schema_id.to_string();
        while let Some(element) = self
            .by_id
            .get(&current.to_lowercase())
            .and_then(|i| i.element())
        {
            let base = element.base().map(str::to_string);
            chain.push(element);
            match base {
                Some(b) => current = b,
                None => break,
            }
        }
        chain
            .into_iter()
            .rev()
            .flat_map(|el| el.own_references())
            .collect()
    }

    /// Constraints of a schema including inherited ones
    pub fn constraints(&self, schema_id: &str) -> Vec<crate::schema::Constraint> {
        let mut out = Vec::new();
        let mut current = schema_id.to_string();
        while let Some(element) = self
            .by_id
            .get(&current.to_lowercase())
            .and_then(|i| i.element())
        {
            out.extend(element.constraints().iter().cloned());
            match element.base() {
                Some(b) => current = b.to_string(),
                None => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::info::{RelationKind, SchemaEntityBuilder, SchemaRelationshipBuilder};

    fn registry_with_books() -> SchemaRegistry {
        let mut r = SchemaRegistry::new();
        r.add_entity(SchemaEntityBuilder::new("catalog", "Library").build())
            .unwrap();
        r.add_entity(
            SchemaEntityBuilder::new("catalog", "Book")
                .property("Title", "string")
                .build(),
        )
        .unwrap();
        r.add_relationship(
            SchemaRelationshipBuilder::new("catalog", "Holds", "catalog:Library", "catalog:Book")
                .kind(RelationKind::parse("1=>*").unwrap())
                .start_property("Books")
                .build(),
        )
        .unwrap();
        r
    }

    #[test]
    fn test_duplicate_full_id_is_rejected() {
        let mut r = SchemaRegistry::new();
        r.add_entity(SchemaEntityBuilder::new("catalog", "Book").build())
            .unwrap();
        let err = r
            .add_entity(SchemaEntityBuilder::new("catalog", "book").build())
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateSchema { .. }));
    }

    #[test]
    fn test_simple_name_lookup() {
        let r = registry_with_books();
        let item = r.schema_info("Book").unwrap().unwrap();
        assert_eq!(item.id(), "catalog:Book");
    }

    #[test]
    fn test_simple_name_collision_becomes_ambiguous() {
        let mut r = registry_with_books();
        r.add_entity(SchemaEntityBuilder::new("other", "Book").build())
            .unwrap();
        let err = r.schema_info("Book").unwrap_err();
        assert!(matches!(err, SchemaError::AmbiguousSchema { .. }));
        // full ids still resolve
        assert!(r.schema_info("other:Book").unwrap().is_some());
    }

    #[test]
    fn test_unknown_schema_with_require() {
        let r = SchemaRegistry::new();
        assert!(matches!(
            r.require("Nope").unwrap_err(),
            SchemaError::UnknownSchema { .. }
        ));
    }

    #[test]
    fn test_relationship_indexes() {
        let r = registry_with_books();
        assert_eq!(r.relationships(Some("catalog:Library"), None).len(), 1);
        assert_eq!(r.relationships(None, Some("catalog:Book")).len(), 1);
        assert_eq!(
            r.relationships(Some("catalog:Library"), Some("catalog:Book"))
                .len(),
            1
        );
        assert!(r
            .relationships(Some("catalog:Book"), Some("catalog:Library"))
            .is_empty());
    }

    #[test]
    fn test_reference_attached_on_start_schema() {
        let r = registry_with_books();
        let library = r.schema_entity("catalog:Library").unwrap();
        let reference = library.own_reference("Books").unwrap();
        assert!(!reference.opposite);
        assert!(reference.is_collection);
    }

    #[test]
    fn test_is_a_walks_base_chain() {
        let mut r = registry_with_books();
        r.add_entity(
            SchemaEntityBuilder::new("catalog", "Novel")
                .base("catalog:Book")
                .build(),
        )
        .unwrap();
        assert!(r.is_a("catalog:Novel", "catalog:Book"));
        assert!(r.is_a("catalog:Novel", "catalog:Novel"));
        assert!(!r.is_a("catalog:Book", "catalog:Novel"));
    }

    #[test]
    fn test_inherited_property_lookup() {
        let mut r = registry_with_books();
        r.add_entity(
            SchemaEntityBuilder::new("catalog", "Novel")
                .base("catalog:Book")
                .property("Plot", "string")
                .build(),
        )
        .unwrap();
        assert!(r.property("catalog:Novel", "Title", true).is_some());
        assert!(r.property("catalog:Novel", "Title", false).is_none());
        let all = r.properties("catalog:Novel", true);
        let names: Vec<_> = all.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Title", "Plot"]);
    }

    #[test]
    fn test_primitives_preloaded() {
        let r = SchemaRegistry::new();
        let item = r.schema_info("string").unwrap().unwrap();
        assert!(matches!(item, SchemaItem::Primitive(_)));
    }
}
