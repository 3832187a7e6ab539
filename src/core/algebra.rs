//! Conversions between node trees and state values.
//!
//! All functions here are pure: they take node configs and values and
//! return new ones.

use super::action::ActionRef;
use super::node::{NodeConfig, NodeType};
use super::value::{join_path, StateValue};
use std::collections::{BTreeMap, BTreeSet};

/// Absolute path to node index of a node tree.
pub type FlatMap = BTreeMap<String, NodeConfig>;

/// Absolute path of the root node.
pub const ROOT: &str = "/";

/// Index a node tree by absolute path, depth first.
///
/// The root is keyed `/`. When `include_children` is false, indexed nodes
/// are stored without their `states`.
pub fn flatten(node: &NodeConfig, include_children: bool) -> FlatMap {
    let mut flat = FlatMap::new();
    flatten_into(node, ROOT, include_children, &mut flat);
    flat
}

fn flatten_into(node: &NodeConfig, path: &str, include_children: bool, flat: &mut FlatMap) {
    let indexed = if include_children {
        node.clone()
    } else {
        node.shallow()
    };
    flat.insert(path.to_string(), indexed);
    for (key, child) in &node.states {
        flatten_into(child, &join_path(path, key), include_children, flat);
    }
}

/// Compute the value a node tree stands for.
///
/// Atomic nodes give the empty value. A compound node whose initial (or
/// sole) child is atomic gives that child's key; any other node maps every
/// child to its own value.
///
/// # Example
///
/// ```rust
/// use statecharts::core::{node_to_value, NodeConfig, StateValue};
///
/// let mut root = NodeConfig::default();
/// root.initial = Some("off".to_string());
/// root.states.insert("off".to_string(), NodeConfig::default());
/// root.states.insert("on".to_string(), NodeConfig::default());
///
/// assert_eq!(node_to_value(&root), StateValue::leaf("off"));
/// ```
pub fn node_to_value(node: &NodeConfig) -> StateValue {
    match node.node_type() {
        NodeType::Atomic => StateValue::empty(),
        NodeType::Compound => {
            let chosen = node
                .initial
                .as_ref()
                .and_then(|initial| node.states.get_key_value(initial))
                .or_else(|| match node.states.len() {
                    1 => node.states.iter().next(),
                    _ => None,
                });
            match chosen {
                Some((key, child)) if child.is_atomic() => StateValue::Leaf(key.clone()),
                _ => all_children(node),
            }
        }
        NodeType::Parallel => all_children(node),
    }
}

fn all_children(node: &NodeConfig) -> StateValue {
    StateValue::Regions(
        node.states
            .iter()
            .map(|(key, child)| (key.clone(), node_to_value(child)))
            .collect(),
    )
}

/// Restrict a tree to the nodes active when it is first entered.
///
/// A compound node keeps only its `initial` child (every child when
/// `initial` is missing or unknown); a parallel node keeps every region.
pub fn initial_config(node: &NodeConfig) -> NodeConfig {
    let mut restricted = node.shallow();
    match node.node_type() {
        NodeType::Atomic => return node.clone(),
        NodeType::Compound => {
            let initial = node
                .initial
                .as_ref()
                .and_then(|initial| node.states.get_key_value(initial));
            match initial {
                Some((key, child)) => {
                    restricted.states.insert(key.clone(), initial_config(child));
                }
                None => {
                    restricted.states = restrict_all(node);
                }
            }
        }
        NodeType::Parallel => restricted.states = restrict_all(node),
    }
    restricted
}

fn restrict_all(node: &NodeConfig) -> BTreeMap<String, NodeConfig> {
    node.states
        .iter()
        .map(|(key, child)| (key.clone(), initial_config(child)))
        .collect()
}

/// Restrict `post_config` to the nodes a value designates.
///
/// Every path of the value is included with its ancestors. Compound nodes
/// reached without a designated child get their declared initial child
/// (all children when none is declared); parallel nodes get every region.
/// Paths that do not exist in `post_config` are ignored.
pub fn value_to_node(post_config: &NodeConfig, value: &StateValue) -> NodeConfig {
    let flat = flatten(post_config, false);
    let mut included = BTreeSet::new();
    included.insert(ROOT.to_string());

    for path in value.paths() {
        let mut current = ROOT.to_string();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = join_path(&current, segment);
            if !flat.contains_key(&current) {
                break;
            }
            included.insert(current.clone());
        }
    }

    fill_defaults(post_config, ROOT, &mut included);
    restrict(post_config, ROOT, &included)
}

/// Check whether every path of a value exists in `post_config`.
pub fn is_reachable(post_config: &NodeConfig, value: &StateValue) -> bool {
    let flat = flatten(post_config, false);
    value.paths().iter().all(|path| flat.contains_key(path))
}

fn fill_defaults(node: &NodeConfig, path: &str, included: &mut BTreeSet<String>) {
    match node.node_type() {
        NodeType::Atomic => {}
        NodeType::Parallel => {
            for key in node.states.keys() {
                included.insert(join_path(path, key));
            }
        }
        NodeType::Compound => {
            let claimed = node
                .states
                .keys()
                .any(|key| included.contains(&join_path(path, key)));
            if !claimed {
                match node.initial.as_ref().filter(|i| node.states.contains_key(*i)) {
                    Some(initial) => {
                        included.insert(join_path(path, initial));
                    }
                    None => {
                        for key in node.states.keys() {
                            included.insert(join_path(path, key));
                        }
                    }
                }
            }
        }
    }

    for (key, child) in &node.states {
        let child_path = join_path(path, key);
        if included.contains(&child_path) {
            fill_defaults(child, &child_path, included);
        }
    }
}

fn restrict(node: &NodeConfig, path: &str, included: &BTreeSet<String>) -> NodeConfig {
    let mut restricted = node.shallow();
    for (key, child) in &node.states {
        let child_path = join_path(path, key);
        if included.contains(&child_path) {
            restricted
                .states
                .insert(key.clone(), restrict(child, &child_path, included));
        }
    }
    restricted
}

/// Paths of the nodes without children in a restricted tree.
pub fn active_leaves(config: &NodeConfig) -> Vec<String> {
    flatten(config, true)
        .into_iter()
        .filter(|(_, node)| node.states.is_empty())
        .map(|(path, _)| path)
        .collect()
}

/// Tags of every node in a restricted tree, sorted and deduplicated.
pub fn collect_tags(config: &NodeConfig) -> Vec<String> {
    let tags: BTreeSet<String> = flatten(config, false)
        .into_values()
        .flat_map(|node| node.tags)
        .collect();
    tags.into_iter().collect()
}

/// Entry actions of a whole tree, parents before children.
pub fn entry_actions(config: &NodeConfig) -> Vec<ActionRef> {
    flatten(config, false)
        .into_values()
        .flat_map(|node| node.entry)
        .collect()
}

/// Exit actions of a whole tree, children before parents.
pub fn exit_actions(config: &NodeConfig) -> Vec<ActionRef> {
    flatten(config, false)
        .into_values()
        .rev()
        .flat_map(|node| node.exit)
        .collect()
}

/// Nodes left and entered when moving from one restricted tree to another.
#[derive(Debug, Default)]
pub struct Diff {
    /// Paths no longer active, children before parents.
    pub exited: Vec<String>,
    /// Paths newly active, parents before children.
    pub entered: Vec<String>,
}

/// Compare the active nodes of two restricted trees.
pub fn diff(from: &FlatMap, to: &FlatMap) -> Diff {
    let exited = from
        .keys()
        .rev()
        .filter(|path| !to.contains_key(*path))
        .cloned()
        .collect();
    let entered = to
        .keys()
        .filter(|path| !from.contains_key(*path))
        .cloned()
        .collect();
    Diff { exited, entered }
}
