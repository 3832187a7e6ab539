//! Static description of state nodes.

use super::action::{ActionItem, ActionRef, DelayRef, PromiseRef};
use super::guard::GuardConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Classification of a state node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Atomic,
    Compound,
    Parallel,
}

/// A transition, as produced by the config compiler.
#[derive(Clone, Debug, Default)]
pub struct Transition {
    /// Absolute path of the target; `None` for targetless transitions.
    pub target: Option<String>,
    pub actions: Vec<ActionRef>,
    /// All must pass. No guards means always eligible.
    pub guards: Vec<GuardConfig>,
    pub description: Option<String>,
}

/// A promise-driven self-transition.
#[derive(Clone, Debug)]
pub struct PromiseConfig {
    /// Prefix of the `<id>::then` / `<id>::catch` settlement events.
    pub id: String,
    pub src: PromiseRef,
    pub then: Vec<Transition>,
    pub catch: Vec<Transition>,
    /// Run after `then` or `catch`, whatever fired.
    pub finally: Vec<ActionItem>,
    /// Timeout; defaults to the interpreter's maximum promise time.
    pub max: Option<DelayRef>,
}

/// A node of the statechart tree.
///
/// Nodes are immutable once handed to a [`Machine`](crate::machine::Machine).
#[derive(Clone, Debug, Default)]
pub struct NodeConfig {
    /// Explicit type; only `Parallel` changes classification.
    pub declared: Option<NodeType>,
    /// Default child of a compound node.
    pub initial: Option<String>,
    pub description: Option<String>,
    pub entry: Vec<ActionRef>,
    pub exit: Vec<ActionRef>,
    pub tags: Vec<String>,
    pub on: BTreeMap<String, Vec<Transition>>,
    pub always: Vec<Transition>,
    /// Delay name to transitions.
    pub after: BTreeMap<String, Vec<Transition>>,
    pub promises: Vec<PromiseConfig>,
    /// Delay name to the actions run on each tick.
    pub activities: BTreeMap<String, Vec<ActionItem>>,
    pub states: BTreeMap<String, NodeConfig>,
}

impl NodeConfig {
    /// Classify the node.
    ///
    /// Parallel iff declared, compound iff it has children and is not
    /// declared atomic, atomic otherwise.
    pub fn node_type(&self) -> NodeType {
        match self.declared {
            Some(NodeType::Parallel) => NodeType::Parallel,
            None | Some(NodeType::Compound) if !self.states.is_empty() => NodeType::Compound,
            _ => NodeType::Atomic,
        }
    }

    pub fn is_atomic(&self) -> bool {
        self.node_type() == NodeType::Atomic
    }

    pub fn is_compound(&self) -> bool {
        self.node_type() == NodeType::Compound
    }

    pub fn is_parallel(&self) -> bool {
        self.node_type() == NodeType::Parallel
    }

    /// A copy of this node without its children.
    pub fn shallow(&self) -> Self {
        Self {
            declared: self.declared,
            initial: self.initial.clone(),
            description: self.description.clone(),
            entry: self.entry.clone(),
            exit: self.exit.clone(),
            tags: self.tags.clone(),
            on: self.on.clone(),
            always: self.always.clone(),
            after: self.after.clone(),
            promises: self.promises.clone(),
            activities: self.activities.clone(),
            states: BTreeMap::new(),
        }
    }

    /// Check whether the node declares any self-transition source.
    pub fn has_self_transitions(&self) -> bool {
        !self.always.is_empty() || !self.after.is_empty() || !self.promises.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atomic() -> NodeConfig {
        NodeConfig::default()
    }

    #[test]
    fn node_without_children_is_atomic() {
        assert_eq!(atomic().node_type(), NodeType::Atomic);
    }

    #[test]
    fn node_with_children_is_compound() {
        let mut node = atomic();
        node.states.insert("a".to_string(), atomic());
        assert!(node.is_compound());
    }

    #[test]
    fn parallel_must_be_declared() {
        let mut node = atomic();
        node.states.insert("a".to_string(), atomic());
        node.declared = Some(NodeType::Parallel);
        assert!(node.is_parallel());
    }

    #[test]
    fn explicit_atomic_with_children_stays_atomic() {
        let mut node = atomic();
        node.states.insert("a".to_string(), atomic());
        node.declared = Some(NodeType::Atomic);
        assert!(node.is_atomic());
    }

    #[test]
    fn shallow_drops_children_only() {
        let mut node = atomic();
        node.initial = Some("a".to_string());
        node.tags.push("busy".to_string());
        node.states.insert("a".to_string(), atomic());

        let shallow = node.shallow();
        assert!(shallow.states.is_empty());
        assert_eq!(shallow.initial.as_deref(), Some("a"));
        assert_eq!(shallow.tags, vec!["busy".to_string()]);
    }
}
