//! Guard predicates for controlling state transitions.
//!
//! A guard is declared as a [`GuardConfig`]: a reference to a named or
//! inline predicate, or an `and`/`or` combination of nested configs.
//! Resolving a config against the machine's predicates yields a [`Guard`]
//! tree that can be evaluated against a snapshot.

use super::action::Ref;
use super::snapshot::StateSnapshot;
use std::sync::Arc;

/// Pure boolean condition evaluated against a snapshot.
pub type Predicate = Arc<dyn Fn(&StateSnapshot) -> bool + Send + Sync>;

pub type PredicateRef = Ref<Predicate>;

impl PredicateRef {
    /// Wrap a closure as an inline predicate.
    pub fn inline<F>(f: F) -> Self
    where
        F: Fn(&StateSnapshot) -> bool + Send + Sync + 'static,
    {
        Self::Inline(Arc::new(f))
    }
}

/// Declared guard, before resolution.
#[derive(Clone, Debug)]
pub enum GuardConfig {
    Ref(PredicateRef),
    And(Vec<GuardConfig>),
    Or(Vec<GuardConfig>),
}

impl From<&str> for GuardConfig {
    fn from(name: &str) -> Self {
        Self::Ref(Ref::from(name))
    }
}

impl From<PredicateRef> for GuardConfig {
    fn from(predicate: PredicateRef) -> Self {
        Self::Ref(predicate)
    }
}

/// Resolved guard tree.
///
/// # Example
///
/// ```rust
/// use statecharts::core::{Guard, Predicate, StateSnapshot};
/// use std::sync::Arc;
/// # use statecharts::core::{Event, Status, StateValue};
/// # use serde_json::json;
///
/// let positive: Predicate = Arc::new(|s: &StateSnapshot| s.context["n"].as_i64() > Some(0));
/// let even: Predicate = Arc::new(|s: &StateSnapshot| s.context["n"].as_i64().unwrap_or(1) % 2 == 0);
///
/// let guard = Guard::And(vec![Guard::Leaf(positive), Guard::Leaf(even)]);
/// # let snapshot = StateSnapshot {
/// #     p_context: json!({}),
/// #     context: json!({ "n": 4 }),
/// #     event: Event::init(),
/// #     status: Status::Working,
/// #     value: StateValue::leaf("idle"),
/// #     tags: vec![],
/// # };
/// assert!(guard.check(&snapshot));
/// ```
#[derive(Clone)]
pub enum Guard {
    Leaf(Predicate),
    And(Vec<Guard>),
    Or(Vec<Guard>),
}

impl Guard {
    /// Evaluate the guard against a snapshot, short-circuiting.
    pub fn check(&self, snapshot: &StateSnapshot) -> bool {
        self.check_with(&mut |predicate| predicate(snapshot))
    }

    /// Evaluate the guard, delegating each leaf to `eval`.
    ///
    /// Lets callers count or trace predicate invocations.
    pub fn check_with(&self, eval: &mut dyn FnMut(&Predicate) -> bool) -> bool {
        match self {
            Self::Leaf(predicate) => eval(predicate),
            Self::And(guards) => guards.iter().all(|guard| guard.check_with(&mut *eval)),
            Self::Or(guards) => guards.iter().any(|guard| guard.check_with(&mut *eval)),
        }
    }
}

/// Outcome of resolving a [`GuardConfig`].
pub struct Resolution {
    /// `None` when every leaf of the config was unresolved.
    pub guard: Option<Guard>,
    /// Names that could not be found, in declaration order.
    pub unresolved: Vec<String>,
}

impl Resolution {
    /// Evaluate the resolved guard; an unresolvable config is never eligible.
    pub fn check_with(&self, eval: &mut dyn FnMut(&Predicate) -> bool) -> bool {
        self.guard.as_ref().is_some_and(|guard| guard.check_with(eval))
    }
}

impl GuardConfig {
    /// Resolve named predicates through `lookup`.
    ///
    /// Unresolved names are reported and dropped from their branch; a branch
    /// emptied entirely resolves to nothing, which fails.
    pub fn resolve<F>(&self, lookup: &F) -> Resolution
    where
        F: Fn(&str) -> Option<Predicate>,
    {
        let mut unresolved = Vec::new();
        let guard = resolve_into(self, lookup, &mut unresolved);
        Resolution { guard, unresolved }
    }

    /// Resolve a list of guards that must all pass.
    ///
    /// An empty list resolves to an unconditional guard.
    pub fn resolve_all<F>(guards: &[GuardConfig], lookup: &F) -> Resolution
    where
        F: Fn(&str) -> Option<Predicate>,
    {
        if guards.is_empty() {
            return Resolution {
                guard: Some(Guard::And(Vec::new())),
                unresolved: Vec::new(),
            };
        }
        GuardConfig::And(guards.to_vec()).resolve(lookup)
    }
}

fn resolve_into<F>(config: &GuardConfig, lookup: &F, unresolved: &mut Vec<String>) -> Option<Guard>
where
    F: Fn(&str) -> Option<Predicate>,
{
    match config {
        GuardConfig::Ref(Ref::Inline(predicate)) => Some(Guard::Leaf(predicate.clone())),
        GuardConfig::Ref(Ref::Named(name)) => match lookup(name) {
            Some(predicate) => Some(Guard::Leaf(predicate)),
            None => {
                unresolved.push(name.clone());
                None
            }
        },
        GuardConfig::And(configs) => {
            let guards: Vec<Guard> = configs
                .iter()
                .filter_map(|config| resolve_into(config, lookup, unresolved))
                .collect();
            (!guards.is_empty()).then_some(Guard::And(guards))
        }
        GuardConfig::Or(configs) => {
            let guards: Vec<Guard> = configs
                .iter()
                .filter_map(|config| resolve_into(config, lookup, unresolved))
                .collect();
            (!guards.is_empty()).then_some(Guard::Or(guards))
        }
    }
}
