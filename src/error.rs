//! Store Error Types
//!
//! This module defines the service-layer error type for store and domain
//! operations, chaining the schema and graph layer errors upward.

use crate::graph::GraphError;
use crate::schema::SchemaError;
use thiserror::Error;

/// Store operation errors
///
/// Covers every failure a caller can observe from [`crate::store::Store`],
/// [`crate::domain::Domain`] and the session protocol. Any of these raised
/// inside a session aborts it.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A required argument was missing or malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Schema lookup or registration failed
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Graph-level mutation failed
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// No domain registered under this name
    #[error("Unknown domain: {name}")]
    UnknownDomain { name: String },

    /// Use of an element after its node was removed
    #[error("Can not use a disposed element: {id}")]
    DisposedElement { id: String },

    /// A property or reference was used against a value of the wrong shape
    #[error("Type mismatch for '{name}': {reason}")]
    TypeMismatch { name: String, reason: String },

    /// A check constraint with error severity failed
    #[error("Constraint failed on {element_id}: {message}")]
    ConstraintViolation { element_id: String, message: String },

    /// Session handle misuse (nested scopes still open at close)
    #[error("Session protocol violation: {0}")]
    SessionProtocol(String),

    /// JSON (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Input document did not match the envelope or POCO shape
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

impl StoreError {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an unknown domain error
    pub fn unknown_domain(name: impl Into<String>) -> Self {
        Self::UnknownDomain { name: name.into() }
    }

    /// Create a disposed element error
    pub fn disposed_element(id: impl Into<String>) -> Self {
        Self::DisposedElement { id: id.into() }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a constraint violation error
    pub fn constraint_violation(
        element_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ConstraintViolation {
            element_id: element_id.into(),
            message: message.into(),
        }
    }

    /// Create a session protocol error
    pub fn session_protocol(msg: impl Into<String>) -> Self {
        Self::SessionProtocol(msg.into())
    }

    /// Create an invalid document error
    pub fn invalid_document(msg: impl Into<String>) -> Self {
        Self::InvalidDocument(msg.into())
    }
}
