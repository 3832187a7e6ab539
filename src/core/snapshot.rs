//! Read-only snapshots of interpreter state.
//!
//! Every callable (action, predicate, delay, promise source) receives a
//! [`StateSnapshot`] cloned from the interpreter, never a reference to its
//! internals.

use super::value::StateValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of the event an interpreter starts with.
pub const INIT_EVENT: &str = "machine$$init";

/// Lifecycle status of an interpreter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Idle,
    Starting,
    Started,
    Paused,
    Working,
    Sending,
    Busy,
    Stopped,
}

impl Status {
    /// Check whether the interpreter has been started and not yet stopped.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            Self::Started | Self::Working | Self::Sending | Self::Busy
        )
    }
}

/// An event delivered to an interpreter.
///
/// # Example
///
/// ```rust
/// use statecharts::core::Event;
/// use serde_json::json;
///
/// let bare: Event = "SWITCH".into();
/// assert_eq!(bare.kind, "SWITCH");
///
/// let loaded = Event::with_payload("LOAD", json!({ "id": 7 }));
/// assert_eq!(loaded.payload["id"], 7);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// The event an interpreter holds before anything is sent.
    pub fn init() -> Self {
        Self::new(INIT_EVENT)
    }
}

impl From<&str> for Event {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

impl From<String> for Event {
    fn from(kind: String) -> Self {
        Self::new(kind)
    }
}

/// Frozen view of an interpreter at one point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Private context, only written by merge actions and child links.
    pub p_context: Value,
    /// Public context.
    pub context: Value,
    /// The last event processed.
    pub event: Event,
    pub status: Status,
    pub value: StateValue,
    /// Tags of every active node.
    pub tags: Vec<String>,
}

impl StateSnapshot {
    /// Check whether a tag is carried by the active configuration.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Check whether the value contains a dotted key.
    pub fn matches(&self, dotted: &str) -> bool {
        self.value.contains(dotted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> StateSnapshot {
        StateSnapshot {
            p_context: json!({}),
            context: json!({ "iterator": 0 }),
            event: Event::init(),
            status: Status::Working,
            value: StateValue::leaf("off"),
            tags: vec!["light".to_string()],
        }
    }

    #[test]
    fn status_running_states() {
        assert!(!Status::Idle.is_running());
        assert!(Status::Working.is_running());
        assert!(Status::Busy.is_running());
        assert!(!Status::Paused.is_running());
        assert!(!Status::Stopped.is_running());
    }

    #[test]
    fn event_from_str_has_null_payload() {
        let event: Event = "SWITCH".into();
        assert_eq!(event.kind, "SWITCH");
        assert_eq!(event.payload, Value::Null);
    }

    #[test]
    fn event_serializes_kind_as_type() {
        let event = Event::with_payload("LOAD", json!(1));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, json!({ "type": "LOAD", "payload": 1 }));
    }

    #[test]
    fn snapshot_helpers() {
        let snapshot = snapshot();
        assert!(snapshot.has_tag("light"));
        assert!(!snapshot.has_tag("dark"));
        assert!(snapshot.matches("off"));
    }

    #[test]
    fn snapshot_is_comparable() {
        let a = snapshot();
        let mut b = a.clone();
        assert_eq!(a, b);
        b.context = json!({ "iterator": 1 });
        assert_ne!(a, b);
    }
}
