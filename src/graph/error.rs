//! Graph Error Types

use thiserror::Error;

/// Hypergraph mutation errors
#[derive(Error, Debug)]
pub enum GraphError {
    /// An element with this id is already live
    #[error("Duplicate element: {id}")]
    DuplicateElement { id: String },

    /// The operation references an id that is not live in this graph
    #[error("Invalid element: {id}")]
    InvalidElement { id: String },

    /// A property write targeted an owner that does not exist
    #[error("Property owner not found: {owner_id}")]
    PropertyOwnerMissing { owner_id: String },
}

impl GraphError {
    /// Create a duplicate element error
    pub fn duplicate_element(id: impl Into<String>) -> Self {
        Self::DuplicateElement { id: id.into() }
    }

    /// Create an invalid element error
    pub fn invalid_element(id: impl Into<String>) -> Self {
        Self::InvalidElement { id: id.into() }
    }

    /// Create a property owner missing error
    pub fn property_owner_missing(owner_id: impl Into<String>) -> Self {
        Self::PropertyOwnerMissing {
            owner_id: owner_id.into(),
        }
    }
}
