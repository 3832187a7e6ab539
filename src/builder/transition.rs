//! Builder for constructing transitions.

use crate::builder::error::BuildError;
use crate::core::{ActionOutput, ActionRef, GuardConfig, PredicateRef, StateSnapshot, Transition};

/// Builder for constructing transitions with a fluent API.
///
/// Targets may be absolute (`/a/b`), relative to the declaring node's parent
/// (`b`), or relative to the declaring node (`.b`).
///
/// # Example
///
/// ```rust
/// use statecharts::builder::TransitionBuilder;
///
/// let transition = TransitionBuilder::new()
///     .to("on")
///     .when("has_power")
///     .action("inc")
///     .build()
///     .unwrap();
///
/// assert_eq!(transition.target.as_deref(), Some("on"));
/// assert_eq!(transition.guards.len(), 1);
/// ```
#[derive(Debug, Default, Clone)]
pub struct TransitionBuilder {
    target: Option<String>,
    actions: Vec<ActionRef>,
    guards: Vec<GuardConfig>,
    description: Option<String>,
}

impl TransitionBuilder {
    /// Create a new, targetless and unguarded transition builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target state.
    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Add a guard; all guards must pass.
    pub fn guard(mut self, guard: impl Into<GuardConfig>) -> Self {
        self.guards.push(guard.into());
        self
    }

    /// Add a guard on a named predicate.
    pub fn when(self, predicate: &str) -> Self {
        self.guard(GuardConfig::from(predicate))
    }

    /// Add a guard using a closure.
    pub fn when_fn<F>(self, predicate: F) -> Self
    where
        F: Fn(&StateSnapshot) -> bool + Send + Sync + 'static,
    {
        self.guard(PredicateRef::inline(predicate))
    }

    /// Add an action run when the transition fires.
    pub fn action(mut self, action: impl Into<ActionRef>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Add an action using a closure.
    pub fn action_fn<F>(self, action: F) -> Self
    where
        F: Fn(&StateSnapshot) -> ActionOutput + Send + Sync + 'static,
    {
        self.action(ActionRef::inline(action))
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Build the transition.
    ///
    /// An explicitly empty target is rejected; omit `.to()` for a
    /// targetless transition.
    pub fn build(self) -> Result<Transition, BuildError> {
        if let Some(target) = &self.target {
            if target.trim_matches(['/', '.']).is_empty() {
                return Err(BuildError::InvalidTarget {
                    path: String::new(),
                    target: target.clone(),
                });
            }
        }

        Ok(Transition {
            target: self.target,
            actions: self.actions,
            guards: self.guards,
            description: self.description,
        })
    }
}
