//! State transition history tracking.
//!
//! Every change of an interpreter's value is recorded as an immutable
//! [`StateTransition`]. The history itself is a persistent value: `record`
//! returns a new history and leaves the original untouched.

use super::value::StateValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Record of a single value change.
///
/// # Example
///
/// ```rust
/// use statecharts::core::{StateTransition, StateValue};
/// use chrono::Utc;
///
/// let transition = StateTransition {
///     from: StateValue::leaf("off"),
///     to: StateValue::leaf("on"),
///     event: "SWITCH".to_string(),
///     timestamp: Utc::now(),
/// };
/// assert_eq!(transition.event, "SWITCH");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// The value being transitioned from
    pub from: StateValue,
    /// The value being transitioned to
    pub to: StateValue,
    /// Kind of the event being processed when the change happened
    pub event: String,
    /// When the transition occurred
    pub timestamp: DateTime<Utc>,
}

/// Ordered history of value changes.
///
/// # Example
///
/// ```rust
/// use statecharts::core::{StateHistory, StateTransition, StateValue};
/// use chrono::Utc;
///
/// let history = StateHistory::new()
///     .record(StateTransition {
///         from: StateValue::leaf("idle"),
///         to: StateValue::leaf("loading"),
///         event: "FETCH".to_string(),
///         timestamp: Utc::now(),
///     })
///     .record(StateTransition {
///         from: StateValue::leaf("loading"),
///         to: StateValue::leaf("done"),
///         event: "fetch::then".to_string(),
///         timestamp: Utc::now(),
///     });
///
/// let path = history.get_path();
/// assert_eq!(path.len(), 3); // idle -> loading -> done
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateHistory {
    transitions: Vec<StateTransition>,
}

impl StateHistory {
    /// Create a new empty history.
    pub fn new() -> Self {
        Self {
            transitions: Vec::new(),
        }
    }

    /// Record a transition, returning a new history.
    pub fn record(&self, transition: StateTransition) -> Self {
        let mut transitions = self.transitions.clone();
        transitions.push(transition);
        Self { transitions }
    }

    /// Get the sequence of values traversed: the first `from`, then the `to`
    /// of each transition.
    pub fn get_path(&self) -> Vec<&StateValue> {
        let mut path = Vec::new();
        if let Some(first) = self.transitions.first() {
            path.push(&first.from);
        }
        for transition in &self.transitions {
            path.push(&transition.to);
        }
        path
    }

    /// Duration between the first and last transition, `None` when empty.
    pub fn duration(&self) -> Option<Duration> {
        if let (Some(first), Some(last)) = (self.transitions.first(), self.transitions.last()) {
            let duration = last.timestamp.signed_duration_since(first.timestamp);
            duration.to_std().ok()
        } else {
            None
        }
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_value;

    fn transition(from: StateValue, to: StateValue, event: &str) -> StateTransition {
        StateTransition {
            from,
            to,
            event: event.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn new_history_is_empty() {
        let history = StateHistory::new();
        assert!(history.is_empty());
        assert!(history.get_path().is_empty());
        assert!(history.duration().is_none());
    }

    #[test]
    fn record_is_immutable() {
        let history = StateHistory::new();
        let next = history.record(transition("off".into(), "on".into(), "SWITCH"));

        assert_eq!(history.len(), 0);
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn get_path_returns_value_sequence() {
        let nested = state_value!({ "p": { "r1": "a", "r2": "b" } });
        let history = StateHistory::new()
            .record(transition("idle".into(), nested.clone(), "PLAY"))
            .record(transition(nested.clone(), "idle".into(), "STOP"));

        let path = history.get_path();
        assert_eq!(path.len(), 3);
        assert_eq!(path[0], &StateValue::leaf("idle"));
        assert_eq!(path[1], &nested);
        assert_eq!(path[2], &StateValue::leaf("idle"));
    }

    #[test]
    fn single_transition_has_duration_zero() {
        let history = StateHistory::new().record(transition("a".into(), "b".into(), "GO"));
        assert_eq!(history.duration(), Some(Duration::from_secs(0)));
    }

    #[test]
    fn history_serializes_correctly() {
        let history = StateHistory::new().record(transition("a".into(), "b".into(), "GO"));

        let json = serde_json::to_string(&history).unwrap();
        let deserialized: StateHistory = serde_json::from_str(&json).unwrap();

        assert_eq!(history, deserialized);
    }
}
