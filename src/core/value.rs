//! Runtime state values.
//!
//! A [`StateValue`] is the "current state" of an interpreter: either a plain
//! leaf name (`"off"`) or a map from region names to nested values
//! (`{"player": {"audio": "muted", "video": "playing"}}`).
//!
//! Paths into the node tree are written two ways: absolute `/`-delimited
//! paths (`/player/audio/muted`) used by transition targets and timer ids,
//! and dotted keys (`player.audio`) used for membership tests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Delimiter of absolute node paths.
pub const DELIMITER: char = '/';

/// Delimiter of dotted value keys.
pub const DOT: char = '.';

/// Runtime value of a statechart.
///
/// # Example
///
/// ```rust
/// use statecharts::core::StateValue;
///
/// let value = StateValue::from_path("/player/audio/muted");
/// assert!(value.contains("player.audio"));
/// assert!(value.contains("player.audio.muted"));
/// assert!(!value.contains("player.video"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    /// A single leaf name, possibly written as a path.
    Leaf(String),
    /// Region name to nested value.
    Regions(BTreeMap<String, StateValue>),
}

impl Default for StateValue {
    fn default() -> Self {
        Self::empty()
    }
}

impl StateValue {
    /// An empty value, as produced for atomic nodes.
    pub fn empty() -> Self {
        Self::Regions(BTreeMap::new())
    }

    pub fn leaf(name: impl Into<String>) -> Self {
        Self::Leaf(name.into())
    }

    /// Check whether the value carries no state at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Leaf(name) => segments(name).is_empty(),
            Self::Regions(regions) => regions.is_empty(),
        }
    }

    /// Build the nested value addressed by an absolute path.
    ///
    /// `/a` becomes `"a"`, `/a/b/c` becomes `{"a": {"b": "c"}}`, and the
    /// root path becomes the empty value.
    pub fn from_path(path: &str) -> Self {
        from_segments(&segments(path))
    }

    /// Every dotted prefix reachable in this value.
    ///
    /// `{"a": {"b": "c"}, "d": "e"}` decomposes into `a`, `a.b`, `a.b.c`,
    /// `d` and `d.e`.
    pub fn decompose(&self) -> Vec<String> {
        let mut keys = Vec::new();
        collect_prefixes(self, "", &mut keys);
        keys
    }

    /// Check whether a dotted key is part of this value.
    ///
    /// The empty key designates the root and is always contained.
    pub fn contains(&self, dotted: &str) -> bool {
        dotted.is_empty() || self.decompose().iter().any(|key| key == dotted)
    }

    /// Map each region path (dotted) to the leaf name active in it.
    ///
    /// A root leaf is keyed by the empty string. Empty region maps carry no
    /// leaf and are omitted.
    pub fn leaves(&self) -> BTreeMap<String, String> {
        let mut leaves = BTreeMap::new();
        collect_leaves(self, "", &mut leaves);
        leaves
    }

    /// Rebuild a value from a region-path to leaf map, the inverse of
    /// [`StateValue::leaves`].
    pub fn recompose(leaves: &BTreeMap<String, String>) -> Self {
        let mut root = Self::empty();
        for (region, leaf) in leaves {
            let mut path: Vec<String> = if region.is_empty() {
                Vec::new()
            } else {
                region.split(DOT).map(str::to_string).collect()
            };
            path.push(leaf.clone());
            insert_path(&mut root, &path);
        }
        root
    }

    /// Absolute paths of every leaf of this value.
    ///
    /// Empty region maps contribute the path of their region.
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        collect_paths(self, &[], &mut paths);
        paths
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        Self::Leaf(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        Self::Leaf(value)
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

/// Compute the value reached by targeting `target` from `current`.
///
/// Inert inputs leave the value untouched: an empty `current`, and a
/// missing, empty or non-absolute `target`.
///
/// A leaf `current` is replaced by the value addressed by `target` (a
/// descendant-or-self target recomposes into the same nested value). For a
/// region map, a target whose parent is a known region overwrites that
/// region's leaf; any other target is returned on its own, as the value
/// its path addresses. Folding independently triggered regions together is
/// left to the caller.
///
/// # Example
///
/// ```rust
/// use statecharts::core::{next_value, StateValue};
/// use statecharts::state_value;
///
/// let current = state_value!({ "p": { "r1": "a", "r2": "c" } });
/// let next = next_value(&current, Some("/p/r1/b"));
/// assert_eq!(next, state_value!({ "p": { "r1": "b", "r2": "c" } }));
///
/// assert_eq!(next_value(&current, Some("relative")), current);
/// ```
pub fn next_value(current: &StateValue, target: Option<&str>) -> StateValue {
    let Some(target) = target else {
        return current.clone();
    };
    if current.is_empty() || !target.starts_with(DELIMITER) {
        return current.clone();
    }
    let mut target_segments = segments(target);
    let Some(last) = target_segments.pop() else {
        return current.clone();
    };

    match current {
        StateValue::Leaf(_) => StateValue::from_path(target),
        StateValue::Regions(_) => {
            let mut leaves = current.leaves();
            let parent = target_segments.join(&DOT.to_string());
            match leaves.get_mut(&parent) {
                Some(leaf) if !parent.is_empty() => {
                    *leaf = last;
                    StateValue::recompose(&leaves)
                }
                _ => StateValue::from_path(target),
            }
        }
    }
}

/// Convert an absolute path to its dotted key (`/a/b` to `a.b`).
pub fn path_to_dotted(path: &str) -> String {
    segments(path).join(&DOT.to_string())
}

/// Join a parent path and a child key into an absolute path.
pub fn join_path(parent: &str, key: &str) -> String {
    if parent == "/" || parent.is_empty() {
        format!("{DELIMITER}{key}")
    } else {
        format!("{parent}{DELIMITER}{key}")
    }
}

/// Number of segments in an absolute path; the root has depth zero.
pub fn depth(path: &str) -> usize {
    segments(path).len()
}

/// Split a path or dotted key into its non-empty segments.
pub(crate) fn segments(path: &str) -> Vec<String> {
    path.split([DELIMITER, DOT])
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

fn from_segments(segments: &[String]) -> StateValue {
    match segments {
        [] => StateValue::empty(),
        [leaf] => StateValue::Leaf(leaf.clone()),
        [head, rest @ ..] => {
            let mut regions = BTreeMap::new();
            regions.insert(head.clone(), from_segments(rest));
            StateValue::Regions(regions)
        }
    }
}

fn dotted(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{DOT}{key}")
    }
}

fn collect_prefixes(value: &StateValue, prefix: &str, keys: &mut Vec<String>) {
    match value {
        StateValue::Leaf(name) => {
            let mut current = prefix.to_string();
            for segment in segments(name) {
                current = dotted(&current, &segment);
                keys.push(current.clone());
            }
        }
        StateValue::Regions(regions) => {
            for (key, child) in regions {
                let current = dotted(prefix, key);
                keys.push(current.clone());
                collect_prefixes(child, &current, keys);
            }
        }
    }
}

fn collect_leaves(value: &StateValue, prefix: &str, leaves: &mut BTreeMap<String, String>) {
    match value {
        StateValue::Leaf(name) => {
            let mut path = segments(name);
            if let Some(last) = path.pop() {
                let mut region = prefix.to_string();
                for segment in path {
                    region = dotted(&region, &segment);
                }
                leaves.insert(region, last);
            }
        }
        StateValue::Regions(regions) => {
            for (key, child) in regions {
                collect_leaves(child, &dotted(prefix, key), leaves);
            }
        }
    }
}

fn collect_paths(value: &StateValue, prefix: &[String], paths: &mut Vec<String>) {
    match value {
        StateValue::Leaf(name) => {
            let mut path = prefix.to_vec();
            path.extend(segments(name));
            paths.push(format!("{DELIMITER}{}", path.join(&DELIMITER.to_string())));
        }
        StateValue::Regions(regions) if regions.is_empty() => {
            if !prefix.is_empty() {
                paths.push(format!("{DELIMITER}{}", prefix.join(&DELIMITER.to_string())));
            }
        }
        StateValue::Regions(regions) => {
            for (key, child) in regions {
                let mut path = prefix.to_vec();
                path.push(key.clone());
                collect_paths(child, &path, paths);
            }
        }
    }
}

fn insert_path(root: &mut StateValue, path: &[String]) {
    match path {
        [] => {}
        [leaf] => {
            if root.is_empty() {
                *root = StateValue::Leaf(leaf.clone());
            }
        }
        [head, rest @ ..] => {
            if !matches!(root, StateValue::Regions(_)) {
                *root = StateValue::empty();
            }
            if let StateValue::Regions(regions) = root {
                let child = regions.entry(head.clone()).or_default();
                insert_path(child, rest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_value;

    #[test]
    fn from_path_builds_nested_values() {
        assert_eq!(StateValue::from_path("/off"), StateValue::leaf("off"));
        assert_eq!(
            StateValue::from_path("/a/b/c"),
            state_value!({ "a": { "b": "c" } })
        );
        assert!(StateValue::from_path("/").is_empty());
    }

    #[test]
    fn decompose_lists_every_prefix() {
        let value = state_value!({ "a": { "b": "c" }, "d": "e" });
        assert_eq!(value.decompose(), vec!["a", "a.b", "a.b.c", "d", "d.e"]);
    }

    #[test]
    fn leaves_and_recompose_are_inverse() {
        let value = state_value!({ "p": { "r1": "a", "r2": { "x": "y" } } });
        let leaves = value.leaves();
        assert_eq!(leaves.get("p.r1").map(String::as_str), Some("a"));
        assert_eq!(leaves.get("p.r2.x").map(String::as_str), Some("y"));
        assert_eq!(StateValue::recompose(&leaves), value);
    }

    #[test]
    fn paths_cover_leaves_and_empty_regions() {
        let value = state_value!({ "p": { "r1": "a", "r2": {} } });
        assert_eq!(value.paths(), vec!["/p/r1/a", "/p/r2"]);
        assert_eq!(StateValue::leaf("off").paths(), vec!["/off"]);
    }

    #[test]
    fn next_value_replaces_leaf_current() {
        let current = StateValue::leaf("off");
        assert_eq!(next_value(&current, Some("/on")), StateValue::leaf("on"));
        assert_eq!(
            next_value(&current, Some("/off/deep")),
            state_value!({ "off": "deep" })
        );
    }

    #[test]
    fn next_value_overwrites_known_region() {
        let current = state_value!({ "p": { "r1": "a", "r2": "c" } });
        assert_eq!(
            next_value(&current, Some("/p/r2/d")),
            state_value!({ "p": { "r1": "a", "r2": "d" } })
        );
    }

    #[test]
    fn next_value_falls_back_to_target_for_unknown_region() {
        let current = state_value!({ "p": { "r1": { "x": "y" }, "r2": "c" } });
        assert_eq!(
            next_value(&current, Some("/p/r1/b")),
            state_value!({ "p": { "r1": "b" } })
        );
        assert_eq!(
            next_value(&state_value!({ "p": "x" }), Some("/q")),
            StateValue::leaf("q")
        );
    }

    #[test]
    fn next_value_ignores_inert_targets() {
        let current = state_value!({ "p": "x" });
        assert_eq!(next_value(&current, None), current);
        assert_eq!(next_value(&current, Some("")), current);
        assert_eq!(next_value(&current, Some("p/y")), current);
        assert_eq!(next_value(&current, Some("/")), current);
        assert_eq!(next_value(&StateValue::empty(), Some("/a")), StateValue::empty());
    }

    #[test]
    fn contains_treats_root_as_member() {
        let value = StateValue::leaf("off");
        assert!(value.contains(""));
        assert!(value.contains("off"));
        assert!(!value.contains("on"));
    }

    #[test]
    fn path_helpers() {
        assert_eq!(path_to_dotted("/a/b"), "a.b");
        assert_eq!(join_path("/", "a"), "/a");
        assert_eq!(join_path("/a", "b"), "/a/b");
        assert_eq!(depth("/"), 0);
        assert_eq!(depth("/a/b"), 2);
    }

    #[test]
    fn value_serializes_untagged() {
        let value = state_value!({ "p": { "r1": "a" } });
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"p":{"r1":"a"}}"#);
        let back: StateValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
