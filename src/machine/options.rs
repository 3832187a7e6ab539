//! Lookup tables for named callables and child machines.

use super::Machine;
use crate::core::{Action, Delay, Predicate, PromiseSource};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Named callables and child declarations a machine resolves against.
#[derive(Clone, Default)]
pub struct MachineOptions {
    pub actions: BTreeMap<String, Action>,
    pub predicates: BTreeMap<String, Predicate>,
    pub delays: BTreeMap<String, Delay>,
    pub promises: BTreeMap<String, PromiseSource>,
    pub children: BTreeMap<String, ChildConfig>,
}

impl MachineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries of `other` win over entries already present.
    pub fn merge(mut self, other: MachineOptions) -> Self {
        self.actions.extend(other.actions);
        self.predicates.extend(other.predicates);
        self.delays.extend(other.delays);
        self.promises.extend(other.promises);
        self.children.extend(other.children);
        self
    }
}

impl fmt::Debug for MachineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineOptions")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .field("delays", &self.delays.keys().collect::<Vec<_>>())
            .field("promises", &self.promises.keys().collect::<Vec<_>>())
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Copy of a child's context into the parent's private context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextLink {
    /// Dotted path into the child context; `None` takes all of it.
    pub from: Option<String>,
    /// Dotted path in the parent private context; `None` merges at the root.
    pub to: Option<String>,
}

impl ContextLink {
    pub fn whole() -> Self {
        Self::default()
    }

    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: Some(from.into()),
            to: Some(to.into()),
        }
    }
}

/// Which child events trigger a context sync.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum EventFilter {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl EventFilter {
    pub fn matches(&self, kind: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(kinds) => kinds.contains(kind),
        }
    }
}

/// A child machine spawned alongside its parent.
///
/// With no links, the whole child context is merged into the parent's
/// private context.
#[derive(Clone, Debug)]
pub struct ChildConfig {
    pub machine: Machine,
    pub contexts: Vec<ContextLink>,
    pub events: EventFilter,
}

impl ChildConfig {
    pub fn new(machine: Machine) -> Self {
        Self {
            machine,
            contexts: Vec::new(),
            events: EventFilter::All,
        }
    }

    pub fn link(mut self, link: ContextLink) -> Self {
        self.contexts.push(link);
        self
    }

    /// Sync only when the child processes one of `kinds`.
    pub fn on_events<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = EventFilter::Only(kinds.into_iter().map(Into::into).collect());
        self
    }

    /// Effective links, defaulting to the whole context.
    pub(crate) fn links(&self) -> Vec<ContextLink> {
        if self.contexts.is_empty() {
            vec![ContextLink::whole()]
        } else {
            self.contexts.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StateSnapshot;
    use std::sync::Arc;

    #[test]
    fn merge_prefers_new_entries() {
        let mut first = MachineOptions::new();
        first
            .predicates
            .insert("ok".to_string(), Arc::new(|_: &StateSnapshot| false));
        let mut second = MachineOptions::new();
        second
            .predicates
            .insert("ok".to_string(), Arc::new(|_: &StateSnapshot| true));
        second
            .predicates
            .insert("other".to_string(), Arc::new(|_: &StateSnapshot| true));

        let merged = first.merge(second);
        assert_eq!(merged.predicates.len(), 2);
        assert_eq!(
            format!("{merged:?}"),
            r#"MachineOptions { actions: [], predicates: ["ok", "other"], delays: [], promises: [], children: [] }"#
        );
    }

    #[test]
    fn event_filter_matches() {
        assert!(EventFilter::All.matches("ANY"));
        let only = EventFilter::Only(["DONE".to_string()].into_iter().collect());
        assert!(only.matches("DONE"));
        assert!(!only.matches("TICK"));
    }
}
