//! Property Values
//!
//! All property values are JSON values. Accessors return a fresh
//! [`PropertyValue`] triple; schema properties may declare a default that is
//! either a literal or a thunk evaluated on every read.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// Hook applied to a property value when it crosses the event boundary
///
/// Serializers run when a value is written into an event payload,
/// deserializers when a payload value is loaded back into the graph.
pub type ValueCodec = Rc<dyn Fn(&Value) -> Value>;

/// The triple returned by property accessors
///
/// `old_value` is the value the slot held before the last write, `version`
/// the tick of that write. A value materialized from a schema default
/// carries `version == 0` so that a later first write is always newer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyValue {
    /// Current value
    pub value: Value,

    /// Value before the last write, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,

    /// Tick of the last write, 0 for schema defaults
    pub version: u64,
}

impl PropertyValue {
    /// Build a triple for a value materialized from a schema default
    pub fn from_default(value: Value) -> Self {
        Self {
            value,
            old_value: None,
            version: 0,
        }
    }
}

/// Default value of a schema property
///
/// A literal is returned as-is; a computed default is invoked on every
/// read, so defaults like "now" stay current.
#[derive(Clone)]
pub enum DefaultValue {
    /// Fixed JSON value
    Literal(Value),
    /// Thunk evaluated on each read
    Computed(Rc<dyn Fn() -> Value>),
}

impl DefaultValue {
    /// Produce the default value
    pub fn materialize(&self) -> Value {
        match self {
            DefaultValue::Literal(v) => v.clone(),
            DefaultValue::Computed(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            DefaultValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<Value> for DefaultValue {
    fn from(value: Value) -> Self {
        DefaultValue::Literal(value)
    }
}
