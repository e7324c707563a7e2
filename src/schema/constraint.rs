//! Constraints and Diagnostics
//!
//! Constraints are opaque predicates attached to schema elements or to
//! individual properties. `Check` constraints run when a property is set and
//! again at session commit; `Validate` constraints run at commit only and
//! produce diagnostics without aborting. A failing `Check` whose error flag
//! is set aborts the enclosing session.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// When a constraint runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintKind {
    /// On property set and at commit
    Check,
    /// At commit only, reporting without aborting
    Validate,
}

/// Predicate evaluated against a constraint context; true means satisfied
pub type ConstraintFn = Rc<dyn Fn(&ConstraintContext<'_>) -> bool>;

/// Everything a constraint body can see
pub struct ConstraintContext<'a> {
    /// Domain owning the element under validation
    pub domain: &'a crate::domain::Domain,
    /// Id of the element under validation
    pub element_id: &'a str,
    /// Full id of the element's schema
    pub schema_id: &'a str,
    /// Property being written, for property-scoped checks
    pub property: Option<&'a str>,
    /// Incoming value, for property-scoped checks
    pub value: Option<&'a Value>,
}

/// A constraint attached to a schema element or property
#[derive(Clone)]
pub struct Constraint {
    /// Check or Validate
    pub kind: ConstraintKind,
    /// Restrict to a single property; element-wide when `None`
    pub property: Option<String>,
    /// Message reported on failure
    pub message: String,
    /// Failing aborts the session (checks only)
    pub is_error: bool,
    /// The predicate
    pub condition: ConstraintFn,
}

impl Constraint {
    /// Build a check constraint with error severity
    pub fn check(
        message: impl Into<String>,
        condition: impl Fn(&ConstraintContext<'_>) -> bool + 'static,
    ) -> Self {
        Self {
            kind: ConstraintKind::Check,
            property: None,
            message: message.into(),
            is_error: true,
            condition: Rc::new(condition),
        }
    }

    /// Build a validate constraint, reported but never aborting
    pub fn validate(
        message: impl Into<String>,
        condition: impl Fn(&ConstraintContext<'_>) -> bool + 'static,
    ) -> Self {
        Self {
            kind: ConstraintKind::Validate,
            property: None,
            message: message.into(),
            is_error: false,
            condition: Rc::new(condition),
        }
    }

    /// Scope the constraint to one property
    pub fn for_property(mut self, name: impl Into<String>) -> Self {
        self.property = Some(name.into());
        self
    }

    /// Downgrade a check to a warning
    pub fn as_warning(mut self) -> Self {
        self.is_error = false;
        self
    }

    /// Evaluate against a context
    pub fn holds(&self, ctx: &ConstraintContext<'_>) -> bool {
        (self.condition)(ctx)
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("kind", &self.kind)
            .field("property", &self.property)
            .field("message", &self.message)
            .field("is_error", &self.is_error)
            .finish()
    }
}

/// Severity of a reported diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Warning,
    Error,
}

/// A validation finding surfaced on session completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Severity of the finding
    pub severity: DiagnosticSeverity,
    /// Constraint message
    pub message: String,
    /// Element the constraint ran against
    pub element_id: String,
    /// Property scope, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
}
