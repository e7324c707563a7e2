//! Live Relationship Collections
//!
//! An [`ElementCollection`] is a materialized many-side view of one
//! relationship around one terminal element. On attach it enumerates the
//! current relationships; afterwards it keeps itself current by
//! subscribing to session-completed events and inspecting only
//! relationship additions and removals that match its schema and terminal.
//!
//! Detach the collection to release its subscription; the cookie-based
//! subscription would otherwise outlive it.

use crate::domain::Domain;
use crate::error::StoreError;
use crate::events::EventKind;
use crate::models::ModelElement;
use crate::query::ArrayCursor;
use crate::session::Session;
use crate::store::Store;
use std::cell::RefCell;
use std::rc::Rc;

/// Predicate deciding whether a candidate element belongs in the view
pub type CollectionFilter = Rc<dyn Fn(&Store, &str) -> bool>;

/// Self-updating many-side view of a relationship
pub struct ElementCollection {
    domain: String,
    relationship_id: String,
    source_id: String,
    opposite: bool,
    filter: Option<CollectionFilter>,
    items: Rc<RefCell<Vec<String>>>,
    cookie: u32,
}

impl ElementCollection {
    /// Materialize the view and subscribe it to session completion
    ///
    /// `opposite` binds the view to the end side of the relationship: the
    /// source is then the end element and items are start elements.
    pub fn attach(
        store: &mut Store,
        domain: &str,
        source_id: &str,
        relationship: &str,
        opposite: bool,
        filter: Option<CollectionFilter>,
    ) -> Result<Self, StoreError> {
        let relationship_id = store
            .schemas()
            .schema_relationship(relationship)?
            .id()
            .to_string();
        let domain_name = store.domain(domain)?.name().to_string();

        let initial: Vec<String> = {
            let d = store.domain(&domain_name)?;
            d.relationship_terminals(&relationship_id, source_id, opposite)
                .into_iter()
                .filter(|item| filter.as_ref().map_or(true, |f| f(store, item)))
                .collect()
        };
        let items = Rc::new(RefCell::new(initial));

        let cookie = {
            let items = items.clone();
            let domain_name = domain_name.clone();
            let relationship_id = relationship_id.clone();
            let source_id = source_id.to_string();
            let filter = filter.clone();
            store.subscribe_session_completed(Box::new(move |store, info| {
                if info.aborted {
                    return;
                }
                for event in &info.events {
                    if event.domain != domain_name {
                        continue;
                    }
                    let (start_id, end_id, removing) = match &event.kind {
                        EventKind::AddRelationship {
                            start_id, end_id, ..
                        } => (start_id, end_id, false),
                        EventKind::RemoveRelationship {
                            start_id, end_id, ..
                        } => (start_id, end_id, true),
                        _ => continue,
                    };
                    if !store.schemas().is_a(&event.schema_id, &relationship_id) {
                        continue;
                    }
                    let candidate = if !opposite && *start_id == source_id {
                        end_id
                    } else if opposite && *end_id == source_id {
                        start_id
                    } else {
                        continue;
                    };
                    let mut items = items.borrow_mut();
                    if removing {
                        if let Some(pos) = items.iter().position(|i| i == candidate) {
                            items.remove(pos);
                        }
                    } else if !items.iter().any(|i| i == candidate) {
                        if filter.as_ref().map_or(true, |f| f(store, candidate)) {
                            items.push(candidate.clone());
                        }
                    }
                }
            }))
        };

        Ok(Self {
            domain: domain_name,
            relationship_id,
            source_id: source_id.to_string(),
            opposite,
            filter,
            items,
            cookie,
        })
    }

    /// The terminal element this view is bound to
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Full id of the relationship schema
    pub fn relationship_id(&self) -> &str {
        &self.relationship_id
    }

    /// Subscription cookie
    pub fn cookie(&self) -> u32 {
        self.cookie
    }

    /// Snapshot of the current items
    pub fn items(&self) -> Vec<String> {
        self.items.borrow().clone()
    }

    /// Number of items currently in the view
    pub fn count(&self) -> usize {
        self.items.borrow().len()
    }

    /// Whether the element is currently in the view
    pub fn contains(&self, id: &str) -> bool {
        self.items.borrow().iter().any(|i| i == id)
    }

    /// Cursor over a snapshot of the items
    pub fn cursor(&self) -> ArrayCursor<String> {
        ArrayCursor::new(self.items())
    }

    /// Link another element through the underlying relationship
    ///
    /// The view itself updates when the session completes.
    pub fn add(
        &self,
        domain: &mut Domain,
        session: &mut Session,
        other: &str,
    ) -> Result<Rc<ModelElement>, StoreError> {
        if self.opposite {
            domain.create_relationship(
                session,
                &self.relationship_id,
                other,
                &self.source_id,
                None,
                None,
                None,
            )
        } else {
            domain.create_relationship(
                session,
                &self.relationship_id,
                &self.source_id,
                other,
                None,
                None,
                None,
            )
        }
    }

    /// Unlink another element, removing the connecting relationship
    pub fn remove(
        &self,
        domain: &mut Domain,
        session: &mut Session,
        other: &str,
    ) -> Result<(), StoreError> {
        let (start, end) = if self.opposite {
            (other, self.source_id.as_str())
        } else {
            (self.source_id.as_str(), other)
        };
        let edge = {
            use crate::query::Cursor;
            domain
                .find_relationships(Some(&self.relationship_id), Some(start), Some(end))?
                .first_or_default()
        };
        if let Some(edge_id) = edge {
            domain.remove(session, &edge_id, None)?;
        }
        Ok(())
    }

    /// Recompute the items from the graph
    pub fn refresh(&self, store: &Store) -> Result<(), StoreError> {
        let d = store.domain(&self.domain)?;
        let fresh: Vec<String> = d
            .relationship_terminals(&self.relationship_id, &self.source_id, self.opposite)
            .into_iter()
            .filter(|item| self.filter.as_ref().map_or(true, |f| f(store, item)))
            .collect();
        *self.items.borrow_mut() = fresh;
        Ok(())
    }

    /// Release the subscription; the view stops updating
    pub fn detach(self, store: &mut Store) {
        store.unsubscribe_session_completed(self.cookie);
    }
}
