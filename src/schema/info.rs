//! Schema Metadata
//!
//! This module defines the schema-side half of the data model: element and
//! relationship descriptors, properties with defaults and codecs, reference
//! descriptors, and cardinality (including the compact arrow grammar used by
//! declarative schema front ends).
//!
//! Schema elements are immutable once registered; they are built through
//! [`SchemaEntityBuilder`] and [`SchemaRelationshipBuilder`] and handed to
//! the registry in one shot. The only post-registration mutation is the
//! registry attaching reference descriptors when a relationship declares
//! start/end property names, which is why the reference map sits behind a
//! `RefCell`.

use crate::models::{DefaultValue, ValueCodec};
use crate::schema::constraint::Constraint;
use crate::schema::error::SchemaError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Kind of a schema element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    /// Becomes an entity node in the graph
    Entity,
    /// Becomes an edge node in the graph
    Relationship,
    /// Property value type with structure
    ValueObject,
    /// Scalar property value type
    Primitive,
}

/// Identity of a schema element
///
/// Full ids have the form `<schemaName>:<local>`; the simple name is the
/// local part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInfo {
    /// Full id, e.g. `catalog:Book`
    pub id: String,
    /// Simple name, e.g. `Book`
    pub name: String,
    /// Element kind
    pub kind: SchemaKind,
}

impl SchemaInfo {
    /// Create a schema info with a namespaced id
    pub fn new(namespace: &str, name: &str, kind: SchemaKind) -> Self {
        Self {
            id: format!("{namespace}:{name}"),
            name: name.to_string(),
            kind,
        }
    }

    /// Create a schema info whose id is its bare name (primitives)
    pub fn unqualified(name: &str, kind: SchemaKind) -> Self {
        Self {
            id: name.to_string(),
            name: name.to_string(),
            kind,
        }
    }
}

/// Whether a property is stored or derived
#[derive(Clone)]
pub enum PropertyKind {
    /// Stored in a property node
    Normal,
    /// Computed from the element on every read, never stored
    Calculated(CalcFn),
}

/// Thunk computing a calculated property from a domain and an element id
pub type CalcFn = Rc<dyn Fn(&crate::domain::Domain, &str) -> Value>;

impl fmt::Debug for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKind::Normal => f.write_str("Normal"),
            PropertyKind::Calculated(_) => f.write_str("Calculated(..)"),
        }
    }
}

/// Property declared on a schema element
pub struct SchemaProperty {
    /// Property name, unique within the element
    pub name: String,
    /// Id of the value-object or primitive schema of the value
    pub value_schema: String,
    /// Default materialized when no property node exists
    pub default: Option<DefaultValue>,
    /// Applied to values entering event payloads
    pub serializer: Option<ValueCodec>,
    /// Applied to payload values loaded back into the graph
    pub deserializer: Option<ValueCodec>,
    /// Stored or calculated
    pub kind: PropertyKind,
}

impl SchemaProperty {
    /// Create a stored property
    pub fn new(name: impl Into<String>, value_schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_schema: value_schema.into(),
            default: None,
            serializer: None,
            deserializer: None,
            kind: PropertyKind::Normal,
        }
    }

    /// Create a calculated property
    pub fn calculated(
        name: impl Into<String>,
        value_schema: impl Into<String>,
        compute: CalcFn,
    ) -> Self {
        Self {
            name: name.into(),
            value_schema: value_schema.into(),
            default: None,
            serializer: None,
            deserializer: None,
            kind: PropertyKind::Calculated(compute),
        }
    }

    /// Set the default value
    pub fn with_default(mut self, default: impl Into<DefaultValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Set a computed default, evaluated on every read
    pub fn with_computed_default(mut self, f: Rc<dyn Fn() -> Value>) -> Self {
        self.default = Some(DefaultValue::Computed(f));
        self
    }

    /// Set the event payload serializer
    pub fn with_serializer(mut self, codec: ValueCodec) -> Self {
        self.serializer = Some(codec);
        self
    }

    /// Set the payload deserializer
    pub fn with_deserializer(mut self, codec: ValueCodec) -> Self {
        self.deserializer = Some(codec);
        self
    }

    /// Whether this property is calculated
    pub fn is_calculated(&self) -> bool {
        matches!(self.kind, PropertyKind::Calculated(_))
    }

    /// Run the serializer, or pass the value through
    pub fn serialize(&self, value: &Value) -> Value {
        match &self.serializer {
            Some(codec) => codec(value),
            None => value.clone(),
        }
    }

    /// Run the deserializer, or pass the value through
    pub fn deserialize(&self, value: &Value) -> Value {
        match &self.deserializer {
            Some(codec) => codec(value),
            None => value.clone(),
        }
    }
}

impl fmt::Debug for SchemaProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaProperty")
            .field("name", &self.name)
            .field("value_schema", &self.value_schema)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Reference descriptor attached to a schema element
///
/// Installed by the registry when a relationship declares a start or end
/// property name. `opposite` is true when the descriptor sits on the end
/// side and walks the relationship backwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaReference {
    /// Reference property name
    pub name: String,
    /// True when this side is the relationship's end
    pub opposite: bool,
    /// Full id of the relationship schema
    pub relationship_id: String,
    /// True when the reachable side has many cardinality
    pub is_collection: bool,
}

/// Schema element: identity plus properties, references, base and constraints
pub struct SchemaElement {
    info: SchemaInfo,
    base: Option<String>,
    properties: BTreeMap<String, Rc<SchemaProperty>>,
    references: RefCell<BTreeMap<String, Rc<SchemaReference>>>,
    constraints: Vec<Constraint>,
}

impl SchemaElement {
    pub(crate) fn from_parts(
        info: SchemaInfo,
        base: Option<String>,
        properties: Vec<SchemaProperty>,
        constraints: Vec<Constraint>,
    ) -> Self {
        Self {
            info,
            base,
            properties: properties
                .into_iter()
                .map(|p| (p.name.clone(), Rc::new(p)))
                .collect(),
            references: RefCell::new(BTreeMap::new()),
            constraints,
        }
    }

    /// Full schema id
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Simple name
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Element kind
    pub fn kind(&self) -> SchemaKind {
        self.info.kind
    }

    /// Identity record
    pub fn info(&self) -> &SchemaInfo {
        &self.info
    }

    /// Full id of the base element, if any
    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// Property declared directly on this element
    pub fn own_property(&self, name: &str) -> Option<Rc<SchemaProperty>> {
        self.properties.get(name).cloned()
    }

    /// Properties declared directly on this element
    pub fn own_properties(&self) -> Vec<Rc<SchemaProperty>> {
        self.properties.values().cloned().collect()
    }

    /// Reference declared directly on this element
    pub fn own_reference(&self, name: &str) -> Option<Rc<SchemaReference>> {
        self.references.borrow().get(name).cloned()
    }

    /// References declared directly on this element
    pub fn own_references(&self) -> Vec<Rc<SchemaReference>> {
        self.references.borrow().values().cloned().collect()
    }

    /// Constraints attached to this element
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub(crate) fn attach_reference(&self, reference: SchemaReference) {
        self.references
            .borrow_mut()
            .insert(reference.name.clone(), Rc::new(reference));
    }
}

impl fmt::Debug for SchemaElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaElement")
            .field("id", &self.info.id)
            .field("base", &self.base)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Relationship cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// 1-1
    OneToOne,
    /// 1-*
    OneToMany,
    /// *-1
    ManyToOne,
    /// *-*
    ManyToMany,
}

impl Cardinality {
    fn from_mults(start_many: bool, end_many: bool) -> Self {
        match (start_many, end_many) {
            (false, false) => Cardinality::OneToOne,
            (false, true) => Cardinality::OneToMany,
            (true, false) => Cardinality::ManyToOne,
            (true, true) => Cardinality::ManyToMany,
        }
    }

    /// Whether the end side holds many elements
    pub fn many_ends(&self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }

    /// Whether the start side holds many elements
    pub fn many_starts(&self) -> bool {
        matches!(self, Cardinality::ManyToOne | Cardinality::ManyToMany)
    }
}

/// Parsed form of the compact relationship grammar
///
/// The grammar is `[1|*](-|=)(-|=|<|>)[1|*]`: source multiplicity, shaft,
/// head, end multiplicity. A `=` shaft (or a bare `=` head) marks the
/// relationship embedded; a `<` head points the relationship from right to
/// left, swapping source and end.
///
/// # Examples
///
/// ```rust
/// use hyperstore_core::schema::{Cardinality, RelationKind};
///
/// let kind = RelationKind::parse("1=>*").unwrap();
/// assert_eq!(kind.cardinality, Cardinality::OneToMany);
/// assert!(kind.embedded);
/// assert!(!kind.reversed);
///
/// let kind = RelationKind::parse("*-<1").unwrap();
/// assert!(kind.reversed);
/// assert!(!kind.embedded);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationKind {
    /// Cardinality after any reversal is applied
    pub cardinality: Cardinality,
    /// End is owned by start
    pub embedded: bool,
    /// Declared right-to-left
    pub reversed: bool,
}

impl RelationKind {
    /// Parse the compact grammar
    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 4 {
            return Err(SchemaError::invalid_definition(format!(
                "relationship kind '{s}' must have 4 characters"
            )));
        }
        let mult = |c: char| match c {
            '1' => Ok(false),
            '*' => Ok(true),
            _ => Err(SchemaError::invalid_definition(format!(
                "relationship kind '{s}': multiplicity must be '1' or '*'"
            ))),
        };
        let left_many = mult(chars[0])?;
        let right_many = mult(chars[3])?;
        let shaft = chars[1];
        let head = chars[2];
        if shaft != '-' && shaft != '=' {
            return Err(SchemaError::invalid_definition(format!(
                "relationship kind '{s}': shaft must be '-' or '='"
            )));
        }
        let (reversed, embedded) = match head {
            '<' => (true, shaft == '='),
            '>' => (false, shaft == '='),
            '-' => (false, false),
            '=' => (false, true),
            _ => {
                return Err(SchemaError::invalid_definition(format!(
                    "relationship kind '{s}': head must be '-', '=', '<' or '>'"
                )))
            }
        };
        let (start_many, end_many) = if reversed {
            (right_many, left_many)
        } else {
            (left_many, right_many)
        };
        Ok(Self {
            cardinality: Cardinality::from_mults(start_many, end_many),
            embedded,
            reversed,
        })
    }
}

/// Relationship schema: an element plus endpoint and cardinality metadata
#[derive(Debug)]
pub struct SchemaRelationship {
    /// Underlying element holding properties, references and constraints
    pub element: Rc<SchemaElement>,
    /// Full id of the start schema
    pub start_schema_id: String,
    /// Full id of the end schema
    pub end_schema_id: String,
    /// Cardinality
    pub cardinality: Cardinality,
    /// End is owned by start; removing the start cascades to the end
    pub embedded: bool,
    /// Reference property installed on the start schema
    pub start_property: Option<String>,
    /// Reference property installed on the end schema
    pub end_property: Option<String>,
}

impl SchemaRelationship {
    /// Full schema id
    pub fn id(&self) -> &str {
        self.element.id()
    }

    /// Simple name
    pub fn name(&self) -> &str {
        self.element.name()
    }
}

/// Builder for entity schema elements
///
/// # Examples
///
/// ```rust
/// use hyperstore_core::schema::SchemaEntityBuilder;
/// use serde_json::json;
///
/// let book = SchemaEntityBuilder::new("catalog", "Book")
///     .property("Title", "string")
///     .property_with(
///         hyperstore_core::schema::SchemaProperty::new("Pages", "number")
///             .with_default(json!(0)),
///     )
///     .build();
/// assert_eq!(book.id(), "catalog:Book");
/// ```
pub struct SchemaEntityBuilder {
    info: SchemaInfo,
    base: Option<String>,
    properties: Vec<SchemaProperty>,
    constraints: Vec<Constraint>,
}

impl SchemaEntityBuilder {
    /// Start building an entity schema `<namespace>:<name>`
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            info: SchemaInfo::new(namespace, name, SchemaKind::Entity),
            base: None,
            properties: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Inherit from another element (single inheritance)
    pub fn base(mut self, base_id: impl Into<String>) -> Self {
        self.base = Some(base_id.into());
        self
    }

    /// Declare a stored property of the given value schema
    pub fn property(mut self, name: &str, value_schema: &str) -> Self {
        self.properties.push(SchemaProperty::new(name, value_schema));
        self
    }

    /// Declare a fully configured property
    pub fn property_with(mut self, property: SchemaProperty) -> Self {
        self.properties.push(property);
        self
    }

    /// Attach a constraint
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Finish the element
    pub fn build(self) -> SchemaElement {
        SchemaElement::from_parts(self.info, self.base, self.properties, self.constraints)
    }
}

/// Builder for relationship schemas
///
/// # Examples
///
/// ```rust
/// use hyperstore_core::schema::{RelationKind, SchemaRelationshipBuilder};
///
/// let holds = SchemaRelationshipBuilder::new("catalog", "Holds", "catalog:Library", "catalog:Book")
///     .kind(RelationKind::parse("1=>*").unwrap())
///     .end_property("Books")
///     .build();
/// assert!(holds.embedded);
/// assert_eq!(holds.start_schema_id, "catalog:Library");
/// ```
pub struct SchemaRelationshipBuilder {
    info: SchemaInfo,
    base: Option<String>,
    start: String,
    end: String,
    cardinality: Cardinality,
    embedded: bool,
    reversed: bool,
    start_property: Option<String>,
    end_property: Option<String>,
    properties: Vec<SchemaProperty>,
    constraints: Vec<Constraint>,
}

impl SchemaRelationshipBuilder {
    /// Start building a relationship schema from `start` to `end`
    pub fn new(namespace: &str, name: &str, start: &str, end: &str) -> Self {
        Self {
            info: SchemaInfo::new(namespace, name, SchemaKind::Relationship),
            base: None,
            start: start.to_string(),
            end: end.to_string(),
            cardinality: Cardinality::OneToOne,
            embedded: false,
            reversed: false,
            start_property: None,
            end_property: None,
            properties: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Inherit from another relationship schema
    pub fn base(mut self, base_id: impl Into<String>) -> Self {
        self.base = Some(base_id.into());
        self
    }

    /// Set cardinality, embedding and direction from a parsed kind
    ///
    /// A reversed kind swaps the start and end supplied to [`Self::new`]
    /// when the relationship is built; `start_property` and `end_property`
    /// always refer to the effective (post-swap) sides.
    pub fn kind(mut self, kind: RelationKind) -> Self {
        self.cardinality = kind.cardinality;
        self.embedded = kind.embedded;
        self.reversed = kind.reversed;
        self
    }

    /// Set cardinality directly
    pub fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Mark the end as owned by the start
    pub fn embedded(mut self, embedded: bool) -> Self {
        self.embedded = embedded;
        self
    }

    /// Install a reference property on the start schema
    pub fn start_property(mut self, name: impl Into<String>) -> Self {
        self.start_property = Some(name.into());
        self
    }

    /// Install a reference property on the end schema
    pub fn end_property(mut self, name: impl Into<String>) -> Self {
        self.end_property = Some(name.into());
        self
    }

    /// Declare a stored property on the relationship itself
    pub fn property(mut self, name: &str, value_schema: &str) -> Self {
        self.properties.push(SchemaProperty::new(name, value_schema));
        self
    }

    /// Declare a fully configured property
    pub fn property_with(mut self, property: SchemaProperty) -> Self {
        self.properties.push(property);
        self
    }

    /// Attach a constraint
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Finish the relationship
    pub fn build(self) -> SchemaRelationship {
        let element = Rc::new(SchemaElement::from_parts(
            self.info,
            self.base,
            self.properties,
            self.constraints,
        ));
        let (start, end) = if self.reversed {
            (self.end, self.start)
        } else {
            (self.start, self.end)
        };
        SchemaRelationship {
            element,
            start_schema_id: start,
            end_schema_id: end,
            cardinality: self.cardinality,
            embedded: self.embedded,
            start_property: self.start_property,
            end_property: self.end_property,
        }
    }
}
