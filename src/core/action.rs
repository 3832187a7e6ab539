//! Callables and the references that point at them.
//!
//! Node configs never hold bare closures for named behaviour. They hold a
//! [`Ref`], either a name looked up in the machine's option maps or an
//! inline callable.

use super::guard::GuardConfig;
use super::snapshot::{Event, StateSnapshot};
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Side-effecting callable run on entry, exit, transitions and activity ticks.
pub type Action = Arc<dyn Fn(&StateSnapshot) -> ActionOutput + Send + Sync>;

/// Callable computing a delay for `after` transitions, activities and
/// promise timeouts.
pub type Delay = Arc<dyn Fn(&StateSnapshot) -> Duration + Send + Sync>;

/// Callable starting the asynchronous work of a promise transition.
///
/// `Ok` routes through `then`, `Err` through `catch`.
pub type PromiseSource =
    Arc<dyn Fn(StateSnapshot) -> BoxFuture<'static, Result<Value, Value>> + Send + Sync>;

/// Reference to a callable: by name or inline.
pub enum Ref<T> {
    Named(String),
    Inline(T),
}

impl<T> Ref<T> {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Name used in diagnostics.
    pub fn label(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Inline(_) => "<inline>",
        }
    }
}

impl<T: Clone> Clone for Ref<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Named(name) => Self::Named(name.clone()),
            Self::Inline(callable) => Self::Inline(callable.clone()),
        }
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Inline(_) => f.write_str("Inline(..)"),
        }
    }
}

impl<T> From<&str> for Ref<T> {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl<T> From<String> for Ref<T> {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

pub type ActionRef = Ref<Action>;
pub type DelayRef = Ref<Delay>;
pub type PromiseRef = Ref<PromiseSource>;

impl ActionRef {
    /// Wrap a closure as an inline action.
    pub fn inline<F>(f: F) -> Self
    where
        F: Fn(&StateSnapshot) -> ActionOutput + Send + Sync + 'static,
    {
        Self::Inline(Arc::new(f))
    }
}

impl DelayRef {
    /// A delay that does not depend on the snapshot.
    pub fn fixed(delay: Duration) -> Self {
        Self::Inline(Arc::new(move |_: &StateSnapshot| delay))
    }
}

/// Entry of an activity or a promise `finally` list.
#[derive(Clone, Debug)]
pub enum ActionItem {
    Action(ActionRef),
    /// Actions run only when every guard passes.
    Guarded {
        guards: Vec<GuardConfig>,
        actions: Vec<ActionRef>,
    },
}

impl From<&str> for ActionItem {
    fn from(name: &str) -> Self {
        Self::Action(Ref::from(name))
    }
}

impl From<ActionRef> for ActionItem {
    fn from(action: ActionRef) -> Self {
        Self::Action(action)
    }
}

/// A debounced update, applied when its named timer elapses.
#[derive(Clone, Debug)]
pub struct Debounce {
    pub id: String,
    pub delay: Duration,
    pub output: ActionOutput,
}

/// Pause, resume or stop request for a named activity or timer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Control {
    PauseActivity(String),
    ResumeActivity(String),
    StopActivity(String),
    PauseTimer(String),
    ResumeTimer(String),
    StopTimer(String),
}

/// Everything an action asks the interpreter to do.
///
/// # Example
///
/// ```rust
/// use statecharts::core::ActionOutput;
/// use serde_json::json;
///
/// let output = ActionOutput::new()
///     .assign(json!({ "iterator": 1 }))
///     .send_to("logger", "FLUSH");
/// assert!(!output.is_empty());
/// assert!(ActionOutput::new().is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct ActionOutput {
    pub(crate) context: Option<Value>,
    pub(crate) p_context: Option<Value>,
    pub(crate) debounces: Vec<Debounce>,
    pub(crate) send_to: Vec<(String, Event)>,
    pub(crate) resend: Vec<Event>,
    pub(crate) force_send: Vec<Event>,
    pub(crate) controls: Vec<Control>,
}

impl ActionOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep-merge `delta` into the public context.
    pub fn assign(mut self, delta: Value) -> Self {
        merge_delta(&mut self.context, delta);
        self
    }

    /// Deep-merge `delta` into the private context.
    pub fn assign_private(mut self, delta: Value) -> Self {
        merge_delta(&mut self.p_context, delta);
        self
    }

    /// Cancel the timer `id` if running and restart it; `output` is applied
    /// when it elapses.
    pub fn debounce(mut self, id: impl Into<String>, delay: Duration, output: ActionOutput) -> Self {
        self.debounces.push(Debounce {
            id: id.into(),
            delay,
            output,
        });
        self
    }

    /// Forward an event to a child service.
    pub fn send_to(mut self, child: impl Into<String>, event: impl Into<Event>) -> Self {
        self.send_to.push((child.into(), event.into()));
        self
    }

    /// Dispatch an event once the current step finishes, but only when the
    /// active configuration handles it.
    pub fn resend(mut self, event: impl Into<Event>) -> Self {
        self.resend.push(event.into());
        self
    }

    /// Dispatch an event to every matching handler of the machine, active
    /// or not.
    pub fn force_send(mut self, event: impl Into<Event>) -> Self {
        self.force_send.push(event.into());
        self
    }

    pub fn pause_activity(mut self, id: impl Into<String>) -> Self {
        self.controls.push(Control::PauseActivity(id.into()));
        self
    }

    pub fn resume_activity(mut self, id: impl Into<String>) -> Self {
        self.controls.push(Control::ResumeActivity(id.into()));
        self
    }

    pub fn stop_activity(mut self, id: impl Into<String>) -> Self {
        self.controls.push(Control::StopActivity(id.into()));
        self
    }

    pub fn pause_timer(mut self, id: impl Into<String>) -> Self {
        self.controls.push(Control::PauseTimer(id.into()));
        self
    }

    pub fn resume_timer(mut self, id: impl Into<String>) -> Self {
        self.controls.push(Control::ResumeTimer(id.into()));
        self
    }

    pub fn stop_timer(mut self, id: impl Into<String>) -> Self {
        self.controls.push(Control::StopTimer(id.into()));
        self
    }

    /// Check whether the output requests nothing.
    pub fn is_empty(&self) -> bool {
        self.context.is_none()
            && self.p_context.is_none()
            && self.debounces.is_empty()
            && self.send_to.is_empty()
            && self.resend.is_empty()
            && self.force_send.is_empty()
            && self.controls.is_empty()
    }
}

fn merge_delta(slot: &mut Option<Value>, delta: Value) {
    match slot {
        Some(existing) => super::merge::merge(existing, delta),
        None => *slot = Some(delta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ref_from_str_is_named() {
        let action: ActionRef = "inc".into();
        assert_eq!(action.label(), "inc");
        assert!(matches!(action, Ref::Named(_)));
    }

    #[test]
    fn inline_ref_has_generic_label() {
        let action = ActionRef::inline(|_| ActionOutput::new());
        assert_eq!(action.label(), "<inline>");
        assert_eq!(format!("{action:?}"), "Inline(..)");
    }

    #[test]
    fn repeated_assign_merges_deltas() {
        let output = ActionOutput::new()
            .assign(json!({ "a": { "x": 1 } }))
            .assign(json!({ "a": { "y": 2 } }));
        assert_eq!(output.context, Some(json!({ "a": { "x": 1, "y": 2 } })));
        assert!(output.p_context.is_none());
    }

    #[test]
    fn controls_are_recorded_in_order() {
        let output = ActionOutput::new()
            .pause_activity("/on::TICK")
            .stop_timer("save");
        assert_eq!(
            output.controls,
            vec![
                Control::PauseActivity("/on::TICK".to_string()),
                Control::StopTimer("save".to_string()),
            ]
        );
    }

    #[test]
    fn fixed_delay_ignores_snapshot() {
        let delay = DelayRef::fixed(Duration::from_millis(50));
        let Ref::Inline(f) = delay else {
            panic!("expected inline delay");
        };
        let snapshot = StateSnapshot {
            p_context: json!({}),
            context: json!({}),
            event: Event::init(),
            status: Default::default(),
            value: Default::default(),
            tags: Vec::new(),
        };
        assert_eq!(f(&snapshot), Duration::from_millis(50));
    }
}
