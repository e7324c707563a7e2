//! Schema Error Types

use thiserror::Error;

/// Schema registration and lookup errors
#[derive(Error, Debug)]
pub enum SchemaError {
    /// A schema with this full id is already registered
    #[error("Duplicate schema: {id}")]
    DuplicateSchema { id: String },

    /// No schema registered under this name
    #[error("Unknown schema: {name}")]
    UnknownSchema { name: String },

    /// A simple name resolves to more than one schema
    #[error("Ambiguous schema name: {name}")]
    AmbiguousSchema { name: String },

    /// A builder was fed an inconsistent definition
    #[error("Invalid schema definition: {0}")]
    InvalidDefinition(String),
}

impl SchemaError {
    /// Create a duplicate schema error
    pub fn duplicate_schema(id: impl Into<String>) -> Self {
        Self::DuplicateSchema { id: id.into() }
    }

    /// Create an unknown schema error
    pub fn unknown_schema(name: impl Into<String>) -> Self {
        Self::UnknownSchema { name: name.into() }
    }

    /// Create an ambiguous schema error
    pub fn ambiguous_schema(name: impl Into<String>) -> Self {
        Self::AmbiguousSchema { name: name.into() }
    }

    /// Create an invalid definition error
    pub fn invalid_definition(msg: impl Into<String>) -> Self {
        Self::InvalidDefinition(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_the_name() {
        assert!(SchemaError::duplicate_schema("catalog:Book")
            .to_string()
            .contains("catalog:Book"));
        assert!(SchemaError::unknown_schema("Book")
            .to_string()
            .contains("Book"));
        assert!(SchemaError::ambiguous_schema("Book")
            .to_string()
            .contains("Ambiguous"));
    }
}
