//! Hyperstore Core
//!
//! An in-memory, schema-driven hypergraph model store with transactional
//! sessions, cascading deletes, a per-change event stream, undo/redo, and
//! JSON load/save.
//!
//! # Architecture
//!
//! - **Schema-driven**: entities, relationships, properties and constraints
//!   are registered up front in a [`schema::SchemaRegistry`]
//! - **Hypergraph storage**: relationships are nodes themselves, with ids,
//!   property values and incident edges of their own
//! - **Unit of work**: every mutation runs inside a [`session::Session`];
//!   the outermost close validates constraints and publishes an immutable
//!   event stream atomically
//! - **Inverse events**: each change event knows how to build its reverse,
//!   which is what rollback and the [`undo::UndoManager`] replay
//!
//! # Modules
//!
//! - [`models`] - Property values, materialized elements, tick provider
//! - [`schema`] - Schema metadata, registry, constraints
//! - [`graph`] - Hypergraph storage and id minting
//! - [`events`] - Change events and the session-completed dispatcher
//! - [`session`] - Unit-of-work protocol
//! - [`domain`] - Domain facade and live collections
//! - [`query`] - Lazy cursors and the query engine
//! - [`undo`] - Undo/redo with save-points
//! - [`json`] - Envelope and POCO (de)serialization
//! - [`store`] - Root aggregate
//!
//! # Examples
//!
//! ```rust
//! use hyperstore_core::schema::SchemaEntityBuilder;
//! use hyperstore_core::store::Store;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), hyperstore_core::error::StoreError> {
//! let mut store = Store::new();
//! store.schemas_mut().add_entity(
//!     SchemaEntityBuilder::new("catalog", "Book")
//!         .property("Title", "string")
//!         .build(),
//! )?;
//! store.create_domain("d")?;
//!
//! let mut session = store.begin_session(Default::default());
//! let book = store
//!     .domain_mut("d")?
//!     .create_entity(&mut session, "catalog:Book", None, None)?;
//! store.domain_mut("d")?.set_property_value(
//!     &mut session,
//!     book.id(),
//!     "Title",
//!     json!("The Hypergraph"),
//!     None,
//! )?;
//! session.accept_changes();
//! let info = store.close_session(session)?;
//! assert!(!info.aborted);
//! # Ok(())
//! # }
//! ```

pub mod domain;
pub mod error;
pub mod events;
pub mod graph;
pub mod json;
pub mod models;
pub mod query;
pub mod schema;
pub mod session;
pub mod store;
pub mod undo;

pub use domain::{Domain, DomainAdapter, ElementCollection};
pub use error::StoreError;
pub use events::{Event, EventKind};
pub use models::{ModelElement, PropertyValue};
pub use query::{Cursor, Matcher, Query, QueryConfig};
pub use schema::{
    Cardinality, SchemaEntityBuilder, SchemaKind, SchemaRegistry, SchemaRelationshipBuilder,
};
pub use session::{Session, SessionConfig, SessionInfo, SessionMode};
pub use store::{Store, StoreOptions};
pub use undo::UndoManager;
