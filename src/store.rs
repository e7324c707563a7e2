//! Store Root Aggregate
//!
//! A [`Store`] owns the schema registry, the domains, the session sequence
//! and the session-completed dispatcher. Sessions are explicit handles:
//! [`Store::begin_session`] opens one, mutations run against it through
//! domain operations, and [`Store::close_session`] is the outermost close
//! that either commits (constraint checks, then publication) or rolls back
//! by replaying inverse events.
//!
//! # Examples
//!
//! ```rust
//! use hyperstore_core::schema::SchemaEntityBuilder;
//! use hyperstore_core::store::Store;
//!
//! # fn main() -> Result<(), hyperstore_core::error::StoreError> {
//! let mut store = Store::new();
//! store
//!     .schemas_mut()
//!     .add_entity(SchemaEntityBuilder::new("m", "Thing").build())?;
//! store.create_domain("d")?;
//! let thing = store.run_in_session(Default::default(), |store, session| {
//!     store.domain_mut("d")?.create_entity(session, "m:Thing", None, None)
//! })?;
//! assert_eq!(thing.id(), "d:1");
//! # Ok(())
//! # }
//! ```

use crate::domain::Domain;
use crate::error::StoreError;
use crate::events::{Event, SessionDispatcher, SessionSubscriber};
use crate::graph::DEFAULT_COMPACTION_THRESHOLD;
use crate::models::{SystemTickProvider, TickProvider};
use crate::schema::{
    ConstraintContext, ConstraintKind, Diagnostic, DiagnosticSeverity, SchemaRegistry,
};
use crate::session::{Session, SessionConfig, SessionInfo, SessionMode};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Store-wide options
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Tombstone count that triggers graph compaction
    pub compaction_threshold: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
        }
    }
}

impl StoreOptions {
    /// Override the compaction threshold
    pub fn with_compaction_threshold(mut self, threshold: usize) -> Self {
        self.compaction_threshold = threshold;
        self
    }
}

/// Root aggregate owning schemas, domains and the dispatcher
pub struct Store {
    options: StoreOptions,
    schemas: Rc<RefCell<SchemaRegistry>>,
    domains: BTreeMap<String, Domain>,
    dispatcher: SessionDispatcher,
    session_seq: u64,
    ticks: Rc<dyn TickProvider>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create a store with default options
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    /// Create a store with explicit options
    pub fn with_options(options: StoreOptions) -> Self {
        Self {
            options,
            schemas: Rc::new(RefCell::new(SchemaRegistry::new())),
            domains: BTreeMap::new(),
            dispatcher: SessionDispatcher::default(),
            session_seq: 0,
            ticks: Rc::new(SystemTickProvider),
        }
    }

    /// Replace the tick source, used by deterministic tests
    pub fn with_tick_provider(mut self, ticks: Rc<dyn TickProvider>) -> Self {
        self.ticks = ticks;
        self
    }

    /// Shared view of the schema registry
    pub fn schemas(&self) -> Ref<'_, SchemaRegistry> {
        self.schemas.borrow()
    }

    /// Mutable view of the schema registry
    pub fn schemas_mut(&self) -> RefMut<'_, SchemaRegistry> {
        self.schemas.borrow_mut()
    }

    /// Create and attach a domain; names are lowercase-normalized
    pub fn create_domain(&mut self, name: &str) -> Result<&mut Domain, StoreError> {
        let key = name.to_lowercase();
        if key.is_empty() {
            return Err(StoreError::invalid_argument("domain name is required"));
        }
        if self.domains.contains_key(&key) {
            return Err(StoreError::invalid_argument(format!(
                "domain '{key}' already exists"
            )));
        }
        debug!(domain = %key, "create domain");
        let domain = Domain::new(
            key.clone(),
            self.schemas.clone(),
            self.ticks.clone(),
            self.options.compaction_threshold,
        );
        Ok(self.domains.entry(key).or_insert(domain))
    }

    /// Look up a domain
    pub fn domain(&self, name: &str) -> Result<&Domain, StoreError> {
        self.domains
            .get(&name.to_lowercase())
            .ok_or_else(|| StoreError::unknown_domain(name))
    }

    /// Look up a domain mutably
    pub fn domain_mut(&mut self, name: &str) -> Result<&mut Domain, StoreError> {
        self.domains
            .get_mut(&name.to_lowercase())
            .ok_or_else(|| StoreError::unknown_domain(name))
    }

    /// Whether a domain of this name is attached
    pub fn has_domain(&self, name: &str) -> bool {
        self.domains.contains_key(&name.to_lowercase())
    }

    /// Detach and dispose a domain
    pub fn remove_domain(&mut self, name: &str) -> Result<(), StoreError> {
        let mut domain = self
            .domains
            .remove(&name.to_lowercase())
            .ok_or_else(|| StoreError::unknown_domain(name))?;
        domain.dispose();
        Ok(())
    }

    /// Open a session
    pub fn begin_session(&mut self, config: SessionConfig) -> Session {
        self.session_seq += 1;
        debug!(session = self.session_seq, mode = ?config.mode, "begin session");
        Session::new(self.session_seq, config.mode)
    }

    /// Outermost close: commit or roll back, then publish
    ///
    /// Commit order: check constraints on every touched element (a failure
    /// with error severity rolls back and surfaces as
    /// [`StoreError::ConstraintViolation`]), then validate constraints
    /// (reported, never aborting), then session-completed publication.
    /// A session whose scopes did not all accept rolls back; that close
    /// still returns `Ok` with `aborted` set on the returned info.
    pub fn close_session(&mut self, session: Session) -> Result<SessionInfo, StoreError> {
        if session.depth() > 1 {
            return Err(StoreError::session_protocol(
                "nested scopes still open at close",
            ));
        }
        let parts = session.into_parts();
        debug!(session = parts.id, aborted = parts.aborted, events = parts.events.len(), "close session");

        if parts.aborted {
            self.rollback(&parts.events, parts.id);
            let info = SessionInfo {
                session_id: parts.id,
                mode: parts.mode,
                aborted: true,
                events: parts.events,
                diagnostics: parts.diagnostics,
            };
            self.publish(&info);
            return Ok(info);
        }

        let mut diagnostics = parts.diagnostics;
        let mut failure: Option<(String, String)> = None;
        'check: for (domain_name, element_id) in &parts.touched {
            let Some(domain) = self.domains.get(domain_name) else {
                continue;
            };
            let Some(schema_id) = domain.schema_of(element_id) else {
                continue;
            };
            let constraints = self.schemas.borrow().constraints(&schema_id);
            for constraint in constraints
                .iter()
                .filter(|c| c.kind == ConstraintKind::Check)
            {
                // property-scoped constraints see the current value at commit
                let value = constraint
                    .property
                    .as_deref()
                    .and_then(|p| domain.peek_property(element_id, p));
                let ctx = ConstraintContext {
                    domain,
                    element_id,
                    schema_id: &schema_id,
                    property: constraint.property.as_deref(),
                    value: value.as_ref(),
                };
                if !constraint.holds(&ctx) {
                    if constraint.is_error {
                        failure = Some((element_id.clone(), constraint.message.clone()));
                        break 'check;
                    }
                    diagnostics.push(Diagnostic {
                        severity: DiagnosticSeverity::Warning,
                        message: constraint.message.clone(),
                        element_id: element_id.clone(),
                        property: constraint.property.clone(),
                    });
                }
            }
        }

        if let Some((element_id, message)) = failure {
            warn!(session = parts.id, element = %element_id, %message, "check constraint failed, rolling back");
            self.rollback(&parts.events, parts.id);
            let info = SessionInfo {
                session_id: parts.id,
                mode: parts.mode,
                aborted: true,
                events: parts.events,
                diagnostics,
            };
            self.publish(&info);
            return Err(StoreError::constraint_violation(element_id, message));
        }

        for (domain_name, element_id) in &parts.touched {
            let Some(domain) = self.domains.get(domain_name) else {
                continue;
            };
            let Some(schema_id) = domain.schema_of(element_id) else {
                continue;
            };
            let constraints = self.schemas.borrow().constraints(&schema_id);
            for constraint in constraints
                .iter()
                .filter(|c| c.kind == ConstraintKind::Validate)
            {
                let value = constraint
                    .property
                    .as_deref()
                    .and_then(|p| domain.peek_property(element_id, p));
                let ctx = ConstraintContext {
                    domain,
                    element_id,
                    schema_id: &schema_id,
                    property: constraint.property.as_deref(),
                    value: value.as_ref(),
                };
                if !constraint.holds(&ctx) {
                    diagnostics.push(Diagnostic {
                        severity: if constraint.is_error {
                            DiagnosticSeverity::Error
                        } else {
                            DiagnosticSeverity::Warning
                        },
                        message: constraint.message.clone(),
                        element_id: element_id.clone(),
                        property: constraint.property.clone(),
                    });
                }
            }
        }

        let info = SessionInfo {
            session_id: parts.id,
            mode: parts.mode,
            aborted: false,
            events: parts.events,
            diagnostics,
        };
        self.publish(&info);
        Ok(info)
    }

    /// Open a session, run the closure, and close
    ///
    /// Commits on `Ok`, rolls back on `Err`; the scoped form guarantees
    /// release on the `?` exit path.
    pub fn run_in_session<T>(
        &mut self,
        config: SessionConfig,
        f: impl FnOnce(&mut Store, &mut Session) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut session = self.begin_session(config);
        match f(self, &mut session) {
            Ok(value) => {
                session.accept_changes();
                self.close_session(session)?;
                Ok(value)
            }
            Err(err) => {
                session.abort();
                let _ = self.close_session(session);
                Err(err)
            }
        }
    }

    /// Subscribe to session completion; returns the subscription cookie
    pub fn subscribe_session_completed(&mut self, subscriber: SessionSubscriber) -> u32 {
        self.dispatcher.subscribe(subscriber)
    }

    /// Remove a subscription by cookie
    pub fn unsubscribe_session_completed(&mut self, cookie: u32) -> bool {
        self.dispatcher.unsubscribe(cookie)
    }

    /// Re-apply a recorded event into the named domain
    pub(crate) fn apply_event(
        &mut self,
        session: &mut Session,
        event: &Event,
    ) -> Result<(), StoreError> {
        let domain = self
            .domains
            .get_mut(&event.domain)
            .ok_or_else(|| StoreError::unknown_domain(&event.domain))?;
        domain.apply_event(session, event)
    }

    fn rollback(&mut self, events: &[Event], session_id: u64) {
        let mut scratch = Session::new(session_id, SessionMode::ROLLBACK);
        for event in events.iter().rev() {
            let Some(reverse) = event.reverse(session_id) else {
                continue;
            };
            if let Err(err) = self.apply_event(&mut scratch, &reverse) {
                warn!(session = session_id, event = reverse.name(), id = %reverse.id, %err, "rollback step failed");
            }
        }
    }

    fn publish(&mut self, info: &SessionInfo) {
        for domain in self.domains.values_mut() {
            domain.notify_adapters(info);
        }
        let mut live = std::mem::take(&mut self.dispatcher);
        self.dispatcher.set_next_cookie(live.next_cookie());
        live.dispatch(self, info);
        let added = std::mem::replace(&mut self.dispatcher, live);
        self.dispatcher.absorb(added);
    }
}
