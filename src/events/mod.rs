//! Change Events
//!
//! Every graph mutation is recorded as an [`Event`]: a closed sum carrying
//! the information required to replay it, or to build its inverse. Applying
//! an event and then its reverse restores the pre-state of the affected
//! node, which is what rollback and undo/redo are made of.
//!
//! The [`SessionDispatcher`] fans completed sessions out to subscribers
//! identified by integer cookies.

use crate::session::SessionInfo;
use crate::store::Store;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind-specific event payload
///
/// Serialized with an `eventName` discriminator so external consumers can
/// route on the kind without subclass dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventName")]
pub enum EventKind {
    /// An entity node was inserted
    AddEntity,
    /// An entity node was unlinked
    RemoveEntity,
    /// A relationship node was inserted
    #[serde(rename_all = "camelCase")]
    AddRelationship {
        start_id: String,
        start_schema_id: String,
        end_id: String,
        end_schema_id: String,
    },
    /// A relationship node was unlinked
    #[serde(rename_all = "camelCase")]
    RemoveRelationship {
        start_id: String,
        start_schema_id: String,
        end_id: String,
        end_schema_id: String,
    },
    /// A property slot was written
    #[serde(rename_all = "camelCase")]
    ChangePropertyValue {
        property_name: String,
        value: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        old_value: Option<Value>,
    },
    /// A property slot was dropped
    #[serde(rename_all = "camelCase")]
    RemoveProperty {
        property_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
}

/// One recorded change
///
/// `correlation_id` is the id of the session that produced the event and is
/// used to suppress re-dispatch of echoed events. `top_level` is true only
/// for the event directly requested by the caller, never for cascaded ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Owning domain name
    pub domain: String,
    /// Id of the affected element
    pub id: String,
    /// Full schema id of the affected element
    pub schema_id: String,
    /// Version stamp of the change
    pub version: u64,
    /// Id of the producing session
    pub correlation_id: u64,
    /// Directly requested, as opposed to cascaded
    #[serde(rename = "TL")]
    pub top_level: bool,
    /// Kind-specific payload
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    /// String discriminator used by dispatchers
    pub fn name(&self) -> &'static str {
        match &self.kind {
            EventKind::AddEntity => "AddEntity",
            EventKind::RemoveEntity => "RemoveEntity",
            EventKind::AddRelationship { .. } => "AddRelationship",
            EventKind::RemoveRelationship { .. } => "RemoveRelationship",
            EventKind::ChangePropertyValue { .. } => "ChangePropertyValue",
            EventKind::RemoveProperty { .. } => "RemoveProperty",
        }
    }

    /// Build the inverse event, correlated to the given session
    ///
    /// A first write (no previous value) reverses to a property removal, so
    /// undoing it leaves no property node behind. A removal that recorded
    /// no value has nothing to restore and returns `None`.
    pub fn reverse(&self, session_id: u64) -> Option<Event> {
        let kind = match &self.kind {
            EventKind::AddEntity => EventKind::RemoveEntity,
            EventKind::RemoveEntity => EventKind::AddEntity,
            EventKind::AddRelationship {
                start_id,
                start_schema_id,
                end_id,
                end_schema_id,
            } => EventKind::RemoveRelationship {
                start_id: start_id.clone(),
                start_schema_id: start_schema_id.clone(),
                end_id: end_id.clone(),
                end_schema_id: end_schema_id.clone(),
            },
            EventKind::RemoveRelationship {
                start_id,
                start_schema_id,
                end_id,
                end_schema_id,
            } => EventKind::AddRelationship {
                start_id: start_id.clone(),
                start_schema_id: start_schema_id.clone(),
                end_id: end_id.clone(),
                end_schema_id: end_schema_id.clone(),
            },
            EventKind::ChangePropertyValue {
                property_name,
                value,
                old_value,
            } => match old_value {
                Some(old) => EventKind::ChangePropertyValue {
                    property_name: property_name.clone(),
                    value: old.clone(),
                    old_value: Some(value.clone()),
                },
                None => EventKind::RemoveProperty {
                    property_name: property_name.clone(),
                    value: Some(value.clone()),
                },
            },
            EventKind::RemoveProperty {
                property_name,
                value,
            } => match value {
                Some(value) => EventKind::ChangePropertyValue {
                    property_name: property_name.clone(),
                    value: value.clone(),
                    old_value: None,
                },
                None => return None,
            },
        };
        Some(Event {
            domain: self.domain.clone(),
            id: self.id.clone(),
            schema_id: self.schema_id.clone(),
            version: self.version,
            correlation_id: session_id,
            top_level: self.top_level,
            kind,
        })
    }
}

/// Session-completed subscriber callback
pub type SessionSubscriber = Box<dyn FnMut(&Store, &SessionInfo)>;

/// Fan-out of completed sessions to subscribers
///
/// Subscriptions are identified by integer cookies; unsubscribing removes
/// by cookie. Subscribers run in registration order.
#[derive(Default)]
pub struct SessionDispatcher {
    subscribers: Vec<(u32, SessionSubscriber)>,
    next_cookie: u32,
}

impl SessionDispatcher {
    /// Register a subscriber, returning its cookie
    pub fn subscribe(&mut self, subscriber: SessionSubscriber) -> u32 {
        self.next_cookie += 1;
        let cookie = self.next_cookie;
        self.subscribers.push((cookie, subscriber));
        cookie
    }

    /// Remove a subscriber by cookie
    pub fn unsubscribe(&mut self, cookie: u32) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(c, _)| *c != cookie);
        self.subscribers.len() != before
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether no subscriber is registered
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub(crate) fn dispatch(&mut self, store: &Store, info: &SessionInfo) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(store, info);
        }
    }

    pub(crate) fn next_cookie(&self) -> u32 {
        self.next_cookie
    }

    pub(crate) fn set_next_cookie(&mut self, next: u32) {
        self.next_cookie = next;
    }

    pub(crate) fn absorb(&mut self, other: SessionDispatcher) {
        self.next_cookie = self.next_cookie.max(other.next_cookie);
        self.subscribers.extend(other.subscribers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change(value: Value, old_value: Option<Value>) -> Event {
        Event {
            domain: "d".to_string(),
            id: "d:1".to_string(),
            schema_id: "m:Book".to_string(),
            version: 7,
            correlation_id: 1,
            top_level: true,
            kind: EventKind::ChangePropertyValue {
                property_name: "Title".to_string(),
                value,
                old_value,
            },
        }
    }

    #[test]
    fn test_add_entity_reverses_to_remove() {
        let ev = Event {
            domain: "d".to_string(),
            id: "d:1".to_string(),
            schema_id: "m:Book".to_string(),
            version: 7,
            correlation_id: 1,
            top_level: true,
            kind: EventKind::AddEntity,
        };
        let rev = ev.reverse(9).unwrap();
        assert_eq!(rev.kind, EventKind::RemoveEntity);
        assert_eq!(rev.correlation_id, 9);
        assert_eq!(rev.id, "d:1");
        // reversing again restores the original kind
        assert_eq!(rev.reverse(1).unwrap().kind, EventKind::AddEntity);
    }

    #[test]
    fn test_change_with_old_value_swaps() {
        let ev = change(json!("new"), Some(json!("old")));
        let rev = ev.reverse(9).unwrap();
        match rev.kind {
            EventKind::ChangePropertyValue {
                value, old_value, ..
            } => {
                assert_eq!(value, json!("old"));
                assert_eq!(old_value, Some(json!("new")));
            }
            other => panic!("unexpected reverse: {other:?}"),
        }
    }

    #[test]
    fn test_first_write_reverses_to_remove_property() {
        let ev = change(json!("x"), None);
        let rev = ev.reverse(9).unwrap();
        assert!(matches!(
            rev.kind,
            EventKind::RemoveProperty { ref value, .. } if *value == Some(json!("x"))
        ));
    }

    #[test]
    fn test_remove_property_reverses_to_restore() {
        let ev = Event {
            domain: "d".to_string(),
            id: "d:1".to_string(),
            schema_id: "m:Book".to_string(),
            version: 7,
            correlation_id: 1,
            top_level: false,
            kind: EventKind::RemoveProperty {
                property_name: "Title".to_string(),
                value: Some(json!("x")),
            },
        };
        let rev = ev.reverse(9).unwrap();
        assert!(matches!(
            rev.kind,
            EventKind::ChangePropertyValue { ref value, ref old_value, .. }
                if *value == json!("x") && old_value.is_none()
        ));
    }

    #[test]
    fn test_event_serialization_carries_event_name() {
        let ev = change(json!("x"), None);
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["eventName"], "ChangePropertyValue");
        assert_eq!(v["propertyName"], "Title");
        assert_eq!(v["TL"], true);
        let back: Event = serde_json::from_value(v).unwrap();
        assert_eq!(back, ev);
    }
}
