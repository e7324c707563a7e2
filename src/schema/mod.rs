//! Schema Layer
//!
//! Schema metadata, the registry that interns it, and the constraint
//! machinery:
//!
//! - [`SchemaInfo`] / [`SchemaElement`] / [`SchemaRelationship`] - descriptors
//! - [`SchemaEntityBuilder`] / [`SchemaRelationshipBuilder`] - construction
//! - [`SchemaRegistry`] - interning, name resolution, relationship indexes
//! - [`Constraint`] - check/validate predicates with diagnostics

mod constraint;
mod error;
mod info;
mod registry;

pub use constraint::{
    Constraint, ConstraintContext, ConstraintFn, ConstraintKind, Diagnostic, DiagnosticSeverity,
};
pub use error::SchemaError;
pub use info::{
    CalcFn, Cardinality, PropertyKind, RelationKind, SchemaElement, SchemaEntityBuilder,
    SchemaInfo, SchemaKind, SchemaProperty, SchemaReference, SchemaRelationship,
    SchemaRelationshipBuilder,
};
pub use registry::{SchemaItem, SchemaRegistry, PRIMITIVES};
