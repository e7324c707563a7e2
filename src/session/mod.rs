//! Session Protocol
//!
//! A [`Session`] is the unit of work: every graph mutation runs against one
//! and appends its events there. The handle supports nested scopes on a
//! single value; each scope must accept its changes before closing, and the
//! whole session aborts if any scope does not. Only
//! [`crate::store::Store::close_session`] commits or rolls back.
//!
//! There is no implicit current-session slot: the handle is passed
//! explicitly into every mutating operation.

use crate::events::Event;
use crate::schema::{Diagnostic, DiagnosticSeverity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::BitOr;

/// Session mode bitmask
///
/// Modes combine: an undo session that rolls back carries both flags.
/// Cascade enumeration is suppressed under `ROLLBACK` and `UNDO`/`REDO`
/// because the replayed event stream already carries individual removals;
/// `LOADING` sessions are skipped by undo recorders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionMode(u16);

impl SessionMode {
    /// Plain mutation session
    pub const NORMAL: SessionMode = SessionMode(0);
    /// Replaying inverse events for undo
    pub const UNDO: SessionMode = SessionMode(1);
    /// Replaying events for redo
    pub const REDO: SessionMode = SessionMode(2);
    /// Replaying inverse events to discard a session
    pub const ROLLBACK: SessionMode = SessionMode(4);
    /// Populating a domain from external data
    pub const LOADING: SessionMode = SessionMode(8);
    /// Either replay direction
    pub const UNDO_OR_REDO: SessionMode = SessionMode(1 | 2);

    /// Whether any flag of `other` is set on `self`
    pub fn intersects(self, other: SessionMode) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether no flag is set
    pub fn is_normal(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for SessionMode {
    type Output = SessionMode;

    fn bitor(self, rhs: SessionMode) -> SessionMode {
        SessionMode(self.0 | rhs.0)
    }
}

/// Options for opening a session
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    /// Mode flags the session starts with
    pub mode: SessionMode,
}

impl SessionConfig {
    /// Config with the given mode
    pub fn with_mode(mode: SessionMode) -> Self {
        Self { mode }
    }
}

/// Unit of work accumulating events until the outermost close
pub struct Session {
    id: u64,
    mode: SessionMode,
    scopes: Vec<bool>,
    aborted: bool,
    events: Vec<Event>,
    diagnostics: Vec<Diagnostic>,
    touched: BTreeSet<(String, String)>,
}

impl Session {
    pub(crate) fn new(id: u64, mode: SessionMode) -> Self {
        Self {
            id,
            mode,
            scopes: vec![false],
            aborted: false,
            events: Vec::new(),
            diagnostics: Vec::new(),
            touched: BTreeSet::new(),
        }
    }

    /// Monotonic session id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Mode flags
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Current nesting depth, 1 for the outermost scope
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Whether the session is already doomed to roll back
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Open a nested scope sharing this session's event list
    pub fn nest(&mut self) {
        self.scopes.push(false);
    }

    /// Mark the current scope as committed
    pub fn accept_changes(&mut self) {
        if let Some(top) = self.scopes.last_mut() {
            *top = true;
        }
    }

    /// Close the current nested scope
    ///
    /// A scope closed without [`Self::accept_changes`] aborts the whole
    /// session. Closing the outermost scope goes through
    /// [`crate::store::Store::close_session`] instead.
    pub fn unnest(&mut self) -> Result<(), crate::error::StoreError> {
        if self.scopes.len() <= 1 {
            return Err(crate::error::StoreError::session_protocol(
                "no nested scope to close",
            ));
        }
        let accepted = self.scopes.pop().unwrap_or(false);
        if !accepted {
            self.aborted = true;
        }
        Ok(())
    }

    /// Abort explicitly; the outermost close will roll back
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// Events recorded so far, in append order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Diagnostics accumulated so far
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub(crate) fn push_event(&mut self, event: Event) {
        self.touched
            .insert((event.domain.clone(), event.id.clone()));
        self.events.push(event);
    }

    pub(crate) fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub(crate) fn into_parts(self) -> SessionParts {
        let root_accepted = self.scopes.first().copied().unwrap_or(false);
        SessionParts {
            id: self.id,
            mode: self.mode,
            depth: self.scopes.len(),
            aborted: self.aborted || !root_accepted,
            events: self.events,
            diagnostics: self.diagnostics,
            touched: self.touched,
        }
    }
}

pub(crate) struct SessionParts {
    pub id: u64,
    pub mode: SessionMode,
    pub depth: usize,
    pub aborted: bool,
    pub events: Vec<Event>,
    pub diagnostics: Vec<Diagnostic>,
    pub touched: BTreeSet<(String, String)>,
}

/// Immutable view handed to session-completed subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Id of the completed session
    pub session_id: u64,
    /// Mode flags it ran under
    pub mode: SessionMode,
    /// True when the session rolled back
    pub aborted: bool,
    /// Recorded events in append order
    pub events: Vec<Event>,
    /// Validation findings
    pub diagnostics: Vec<Diagnostic>,
}

impl SessionInfo {
    /// Whether any diagnostic has error severity
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == DiagnosticSeverity::Error)
    }
}
