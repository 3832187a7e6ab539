//! Interpreter configuration and runtime limits.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Self-transition rounds allowed before the overflow path is taken.
pub const DEFAULT_MAX_SELF_TRANSITIONS: usize = 1000;

/// Shortest accepted activity interval.
pub const DEFAULT_MIN_ACTIVITY_TIME: Duration = Duration::from_millis(10);

/// Longest accepted activity interval, and the default promise timeout.
pub const DEFAULT_MAX_TIME_PROMISE: Duration = Duration::from_secs(10);

/// Idle time after which the self-transition counter starts over.
pub const TIME_TO_REINIT_SELF_COUNTER: Duration = Duration::from_millis(20);

/// How collected errors surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Pending errors are returned at the next checkpoint.
    Strict,
    /// Errors are logged and collected, never returned.
    #[default]
    Normal,
}

/// Settings of one interpreter.
///
/// # Example
///
/// ```rust
/// use statecharts::{InterpreterConfig, Mode};
///
/// let config: InterpreterConfig =
///     serde_json::from_str(r#"{ "mode": "strict", "max_time_promise": 500 }"#).unwrap();
/// assert_eq!(config.mode, Mode::Strict);
/// assert_eq!(config.max_time_promise.as_millis(), 500);
/// assert_eq!(config.max_self_transitions, 1000);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    pub mode: Mode,
    /// Test mode records self-transition overflow and stops instead of
    /// failing.
    pub test: bool,
    pub max_self_transitions: usize,
    #[serde(with = "millis")]
    pub min_activity_time: Duration,
    #[serde(with = "millis")]
    pub max_time_promise: Duration,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Normal,
            test: false,
            max_self_transitions: DEFAULT_MAX_SELF_TRANSITIONS,
            min_activity_time: DEFAULT_MIN_ACTIVITY_TIME,
            max_time_promise: DEFAULT_MAX_TIME_PROMISE,
        }
    }
}

impl InterpreterConfig {
    pub fn strict() -> Self {
        Self {
            mode: Mode::Strict,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_test(mut self, test: bool) -> Self {
        self.test = test;
        self
    }

    pub fn with_max_self_transitions(mut self, max: usize) -> Self {
        self.max_self_transitions = max;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.mode == Mode::Strict
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinit_time_is_twice_min_activity_time() {
        assert_eq!(TIME_TO_REINIT_SELF_COUNTER, DEFAULT_MIN_ACTIVITY_TIME * 2);
    }

    #[test]
    fn default_config_uses_constants() {
        let config = InterpreterConfig::default();
        assert_eq!(config.mode, Mode::Normal);
        assert!(!config.test);
        assert_eq!(config.max_self_transitions, DEFAULT_MAX_SELF_TRANSITIONS);
        assert_eq!(config.min_activity_time, DEFAULT_MIN_ACTIVITY_TIME);
    }

    #[test]
    fn config_serializes_durations_as_millis() {
        let json = serde_json::to_value(InterpreterConfig::strict()).unwrap();
        assert_eq!(json["mode"], "strict");
        assert_eq!(json["min_activity_time"], 10);
        assert_eq!(json["max_time_promise"], 10_000);
    }
}
