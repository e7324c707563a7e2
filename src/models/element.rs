//! Materialized Elements
//!
//! A [`ModelElement`] is the handle client code holds onto: a snapshot of a
//! graph node's identity plus a disposed flag. Elements are materialized on
//! demand through the domain cache and disposed when the underlying node is
//! removed. Everything else about an element (its property values, its
//! neighbors) is read through the domain keyed by id, so elements never hold
//! back-pointers and cyclic graphs need no special handling.

use std::cell::Cell;

/// Materialized handle over a graph node
///
/// For relationship elements the four endpoint fields are populated; for
/// entities they are `None`.
#[derive(Debug)]
pub struct ModelElement {
    id: String,
    schema_id: String,
    domain: String,
    start_id: Option<String>,
    start_schema_id: Option<String>,
    end_id: Option<String>,
    end_schema_id: Option<String>,
    disposed: Cell<bool>,
}

impl ModelElement {
    pub(crate) fn entity(id: impl Into<String>, schema_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            schema_id: schema_id.into(),
            domain: domain.into(),
            start_id: None,
            start_schema_id: None,
            end_id: None,
            end_schema_id: None,
            disposed: Cell::new(false),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn relationship(
        id: impl Into<String>,
        schema_id: impl Into<String>,
        domain: impl Into<String>,
        start_id: impl Into<String>,
        start_schema_id: impl Into<String>,
        end_id: impl Into<String>,
        end_schema_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            schema_id: schema_id.into(),
            domain: domain.into(),
            start_id: Some(start_id.into()),
            start_schema_id: Some(start_schema_id.into()),
            end_id: Some(end_id.into()),
            end_schema_id: Some(end_schema_id.into()),
            disposed: Cell::new(false),
        }
    }

    /// Element id, `<domain>:<localPart>`
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Full id of the element's schema
    pub fn schema_id(&self) -> &str {
        &self.schema_id
    }

    /// Name of the owning domain
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Whether this element is a relationship
    pub fn is_relationship(&self) -> bool {
        self.start_id.is_some()
    }

    /// Start element id, relationships only
    pub fn start_id(&self) -> Option<&str> {
        self.start_id.as_deref()
    }

    /// Start schema id, relationships only
    pub fn start_schema_id(&self) -> Option<&str> {
        self.start_schema_id.as_deref()
    }

    /// End element id, relationships only
    pub fn end_id(&self) -> Option<&str> {
        self.end_id.as_deref()
    }

    /// End schema id, relationships only
    pub fn end_schema_id(&self) -> Option<&str> {
        self.end_schema_id.as_deref()
    }

    /// Whether the underlying node has been removed
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub(crate) fn dispose(&self) {
        self.disposed.set(true);
    }

    /// Error unless the element is still live
    pub fn ensure_usable(&self) -> Result<(), crate::error::StoreError> {
        if self.disposed.get() {
            Err(crate::error::StoreError::disposed_element(&self.id))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_element() {
        let el = ModelElement::entity("d:1", "catalog:Book", "d");
        assert_eq!(el.id(), "d:1");
        assert_eq!(el.schema_id(), "catalog:Book");
        assert!(!el.is_relationship());
        assert!(el.start_id().is_none());
        assert!(!el.is_disposed());
    }

    #[test]
    fn test_relationship_element_endpoints() {
        let el = ModelElement::relationship(
            "d:3",
            "catalog:Holds",
            "d",
            "d:1",
            "catalog:Library",
            "d:2",
            "catalog:Book",
        );
        assert!(el.is_relationship());
        assert_eq!(el.start_id(), Some("d:1"));
        assert_eq!(el.end_id(), Some("d:2"));
        assert_eq!(el.end_schema_id(), Some("catalog:Book"));
    }

    #[test]
    fn test_disposed_element_is_unusable() {
        let el = ModelElement::entity("d:1", "catalog:Book", "d");
        assert!(el.ensure_usable().is_ok());
        el.dispose();
        assert!(el.is_disposed());
        assert!(el.ensure_usable().is_err());
    }
}
