//! Compiled, immutable machines.
//!
//! A [`Machine`] owns a node tree whose targets are absolute, the option
//! maps its references resolve against, and everything derived from them
//! once: the initial-filled tree, the initial configuration, the flat index
//! and the set of events any node handles. Machines are never mutated; the
//! `with_*` and `provide_options` methods return new ones.

mod options;

pub use options::{ChildConfig, ContextLink, EventFilter, MachineOptions};

use crate::core::{
    flatten, initial_config, is_reachable, join_path, node_to_value, segments, value_to_node,
    Action, ActionItem, ActionRef, Delay, DelayRef, FlatMap, GuardConfig, NodeConfig, NodeType,
    Predicate, PredicateRef, PromiseRef, PromiseSource, Ref, StateSnapshot, StateValue,
    Transition, ROOT,
};
use crate::diagnostics::Diagnostic;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// Outcome of checking one reference.
type Check = Validation<(), NonEmptyVec<Diagnostic>>;

/// A compiled statechart, cheap to clone.
///
/// # Example
///
/// ```rust
/// use statecharts::core::{NodeConfig, StateValue, Transition};
/// use statecharts::Machine;
///
/// let mut root = NodeConfig::default();
/// root.initial = Some("off".to_string());
/// let mut off = NodeConfig::default();
/// off.on.insert(
///     "SWITCH".to_string(),
///     vec![Transition { target: Some("on".to_string()), ..Default::default() }],
/// );
/// root.states.insert("off".to_string(), off);
/// root.states.insert("on".to_string(), NodeConfig::default());
///
/// let machine = Machine::new(root);
/// assert_eq!(machine.initial_value(), StateValue::leaf("off"));
/// assert!(machine.possible_events().contains("SWITCH"));
/// // Sibling targets are made absolute.
/// let target = machine.flat()["/off"].on["SWITCH"][0].target.clone();
/// assert_eq!(target.as_deref(), Some("/on"));
/// ```
#[derive(Clone)]
pub struct Machine {
    inner: Arc<Compiled>,
}

struct Compiled {
    root: NodeConfig,
    options: MachineOptions,
    targets: BTreeMap<String, String>,
    initials: BTreeMap<String, String>,
    post_config: NodeConfig,
    initial_config: NodeConfig,
    flat: FlatMap,
    possible_events: BTreeSet<String>,
    context: Value,
    p_context: Value,
}

impl Machine {
    pub fn new(root: NodeConfig) -> Self {
        Self::assemble(
            root,
            MachineOptions::default(),
            Value::Object(Default::default()),
            Value::Object(Default::default()),
        )
    }

    pub(crate) fn assemble(
        mut root: NodeConfig,
        options: MachineOptions,
        context: Value,
        p_context: Value,
    ) -> Self {
        normalize_targets(&mut root, ROOT);
        Self::compile(root, options, BTreeMap::new(), context, p_context)
    }

    fn compile(
        root: NodeConfig,
        options: MachineOptions,
        targets: BTreeMap<String, String>,
        context: Value,
        p_context: Value,
    ) -> Self {
        let mut post_config = root.clone();
        for (path, child) in &targets {
            if let Some(node) = node_at_mut(&mut post_config, path) {
                node.initial = Some(child.clone());
            }
        }
        let flat = flatten(&post_config, false);
        let initials = flat
            .iter()
            .filter(|(_, node)| node.node_type() == NodeType::Compound)
            .filter_map(|(path, node)| node.initial.clone().map(|i| (path.clone(), i)))
            .collect();
        let possible_events = flat
            .values()
            .flat_map(|node| node.on.keys().cloned())
            .collect();

        Self {
            inner: Arc::new(Compiled {
                initial_config: initial_config(&post_config),
                root,
                options,
                targets,
                initials,
                post_config,
                flat,
                possible_events,
                context,
                p_context,
            }),
        }
    }

    fn rebuild(
        &self,
        options: MachineOptions,
        targets: BTreeMap<String, String>,
        context: Value,
        p_context: Value,
    ) -> Self {
        Self::compile(self.inner.root.clone(), options, targets, context, p_context)
    }

    /// A new machine whose option maps include `options`.
    pub fn provide_options(&self, options: MachineOptions) -> Self {
        let merged = self.inner.options.clone().merge(options);
        self.rebuild(
            merged,
            self.inner.targets.clone(),
            self.inner.context.clone(),
            self.inner.p_context.clone(),
        )
    }

    /// A fresh, unshared copy of this machine.
    pub fn renew(&self) -> Self {
        self.rebuild(
            self.inner.options.clone(),
            self.inner.targets.clone(),
            self.inner.context.clone(),
            self.inner.p_context.clone(),
        )
    }

    pub fn with_context(&self, context: Value) -> Self {
        self.rebuild(
            self.inner.options.clone(),
            self.inner.targets.clone(),
            context,
            self.inner.p_context.clone(),
        )
    }

    pub fn with_p_context(&self, p_context: Value) -> Self {
        self.rebuild(
            self.inner.options.clone(),
            self.inner.targets.clone(),
            self.inner.context.clone(),
            p_context,
        )
    }

    /// Override the initial child of the compound node at `path`.
    pub fn with_target(&self, path: impl Into<String>, child: impl Into<String>) -> Self {
        let mut targets = self.inner.targets.clone();
        targets.insert(path.into(), child.into());
        self.rebuild(
            self.inner.options.clone(),
            targets,
            self.inner.context.clone(),
            self.inner.p_context.clone(),
        )
    }

    pub fn root(&self) -> &NodeConfig {
        &self.inner.root
    }

    pub fn options(&self) -> &MachineOptions {
        &self.inner.options
    }

    /// The tree with every initial override applied.
    pub fn post_config(&self) -> &NodeConfig {
        &self.inner.post_config
    }

    pub fn initial_config(&self) -> &NodeConfig {
        &self.inner.initial_config
    }

    /// Every node of the post config, keyed by absolute path.
    pub fn flat(&self) -> &FlatMap {
        &self.inner.flat
    }

    /// Default child of every compound node that declares one.
    pub fn initials(&self) -> &BTreeMap<String, String> {
        &self.inner.initials
    }

    pub fn targets(&self) -> &BTreeMap<String, String> {
        &self.inner.targets
    }

    /// Event kinds handled by at least one node.
    pub fn possible_events(&self) -> &BTreeSet<String> {
        &self.inner.possible_events
    }

    pub fn context(&self) -> &Value {
        &self.inner.context
    }

    pub fn p_context(&self) -> &Value {
        &self.inner.p_context
    }

    pub fn initial_value(&self) -> StateValue {
        node_to_value(&self.inner.initial_config)
    }

    pub fn value_to_config(&self, value: &StateValue) -> NodeConfig {
        value_to_node(&self.inner.post_config, value)
    }

    /// Restricted config and canonical value for `value`, or `None` when
    /// some path of it does not exist.
    pub fn resolve_value(&self, value: &StateValue) -> Option<(NodeConfig, StateValue)> {
        if !is_reachable(&self.inner.post_config, value) {
            return None;
        }
        let config = self.value_to_config(value);
        let canonical = node_to_value(&config);
        Some((config, canonical))
    }

    pub fn resolve_action(&self, action: &ActionRef) -> Option<Action> {
        resolve(action, &self.inner.options.actions)
    }

    pub fn resolve_predicate(&self, predicate: &PredicateRef) -> Option<Predicate> {
        resolve(predicate, &self.inner.options.predicates)
    }

    pub fn resolve_promise(&self, promise: &PromiseRef) -> Option<PromiseSource> {
        resolve(promise, &self.inner.options.promises)
    }

    pub fn resolve_delay(&self, delay: &DelayRef) -> Option<Delay> {
        match delay {
            Ref::Inline(delay) => Some(delay.clone()),
            Ref::Named(name) => self.resolve_delay_key(name),
        }
    }

    /// Resolve an `after` or activity key: a named delay, or a literal
    /// number of milliseconds.
    pub fn resolve_delay_key(&self, key: &str) -> Option<Delay> {
        if let Some(delay) = self.inner.options.delays.get(key) {
            return Some(delay.clone());
        }
        let millis: u64 = key.parse().ok()?;
        let delay = Duration::from_millis(millis);
        Some(Arc::new(move |_: &StateSnapshot| delay))
    }

    /// Check every reference of the tree, accumulating all failures.
    pub fn validate(&self) -> Validation<(), NonEmptyVec<Diagnostic>> {
        let mut checks = Vec::new();
        for node in self.inner.flat.values() {
            self.check_node(node, &mut checks);
        }
        Validation::all_vec(checks).map(|_| ())
    }

    fn check_node(&self, node: &NodeConfig, checks: &mut Vec<Check>) {
        for action in node.entry.iter().chain(&node.exit) {
            checks.push(self.check_action(action));
        }
        let transitions = node
            .on
            .values()
            .flatten()
            .chain(&node.always)
            .chain(node.after.values().flatten())
            .chain(node.promises.iter().flat_map(|p| p.then.iter().chain(&p.catch)));
        for transition in transitions {
            self.check_transition(transition, checks);
        }
        for key in node.after.keys().chain(node.activities.keys()) {
            checks.push(expect(
                self.resolve_delay_key(key).is_some(),
                Diagnostic::UnresolvedDelay { name: key.clone() },
            ));
        }
        for items in node.activities.values() {
            self.check_items(items, checks);
        }
        for promise in &node.promises {
            checks.push(expect(
                self.resolve_promise(&promise.src).is_some(),
                Diagnostic::UnresolvedPromise {
                    name: promise.src.label().to_string(),
                },
            ));
            if let Some(max) = &promise.max {
                checks.push(expect(
                    self.resolve_delay(max).is_some(),
                    Diagnostic::UnresolvedDelay {
                        name: max.label().to_string(),
                    },
                ));
            }
            self.check_items(&promise.finally, checks);
        }
    }

    fn check_transition(&self, transition: &Transition, checks: &mut Vec<Check>) {
        for action in &transition.actions {
            checks.push(self.check_action(action));
        }
        for guard in &transition.guards {
            self.check_guard(guard, checks);
        }
    }

    fn check_items(&self, items: &[ActionItem], checks: &mut Vec<Check>) {
        for item in items {
            match item {
                ActionItem::Action(action) => checks.push(self.check_action(action)),
                ActionItem::Guarded { guards, actions } => {
                    for guard in guards {
                        self.check_guard(guard, checks);
                    }
                    for action in actions {
                        checks.push(self.check_action(action));
                    }
                }
            }
        }
    }

    fn check_action(&self, action: &ActionRef) -> Check {
        expect(
            self.resolve_action(action).is_some(),
            Diagnostic::UnresolvedAction {
                name: action.label().to_string(),
            },
        )
    }

    fn check_guard(&self, guard: &GuardConfig, checks: &mut Vec<Check>) {
        match guard {
            GuardConfig::Ref(predicate) => checks.push(expect(
                self.resolve_predicate(predicate).is_some(),
                Diagnostic::UnresolvedPredicate {
                    name: predicate.label().to_string(),
                },
            )),
            GuardConfig::And(guards) | GuardConfig::Or(guards) => {
                for guard in guards {
                    self.check_guard(guard, checks);
                }
            }
        }
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("nodes", &self.inner.flat.keys().collect::<Vec<_>>())
            .field("possible_events", &self.inner.possible_events)
            .field("options", &self.inner.options)
            .finish()
    }
}

fn resolve<T: Clone>(reference: &Ref<T>, table: &BTreeMap<String, T>) -> Option<T> {
    match reference {
        Ref::Inline(callable) => Some(callable.clone()),
        Ref::Named(name) => table.get(name).cloned(),
    }
}

fn expect(found: bool, diagnostic: Diagnostic) -> Check {
    if found {
        Validation::success(())
    } else {
        Validation::fail(diagnostic)
    }
}

/// Make a transition target absolute with respect to the declaring node.
///
/// `/x` is already absolute, `.x` names a child, and a bare `x` names a
/// sibling (a child when declared on the root). Dots inside a relative
/// target descend further.
pub fn absolute_target(source: &str, target: &str) -> String {
    if target.is_empty() || target.starts_with('/') {
        return target.to_string();
    }
    let (base, rest) = match target.strip_prefix('.') {
        Some(rest) => (source.to_string(), rest),
        None => (parent_path(source), target),
    };
    segments(rest)
        .iter()
        .fold(base, |path, segment| join_path(&path, segment))
}

fn parent_path(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => ROOT.to_string(),
        Some(index) => path[..index].to_string(),
    }
}

fn normalize_targets(node: &mut NodeConfig, path: &str) {
    let fix = |transition: &mut Transition| {
        if let Some(target) = &transition.target {
            transition.target = Some(absolute_target(path, target));
        }
    };
    node.on.values_mut().flatten().for_each(fix);
    node.always.iter_mut().for_each(fix);
    node.after.values_mut().flatten().for_each(fix);
    for promise in &mut node.promises {
        promise.then.iter_mut().chain(promise.catch.iter_mut()).for_each(fix);
    }
    for (key, child) in node.states.iter_mut() {
        normalize_targets(child, &join_path(path, key));
    }
}

fn node_at_mut<'a>(root: &'a mut NodeConfig, path: &str) -> Option<&'a mut NodeConfig> {
    segments(path)
        .iter()
        .try_fold(root, |node, segment| node.states.get_mut(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ActionOutput;
    use crate::state_value;

    fn atomic() -> NodeConfig {
        NodeConfig::default()
    }

    fn to(target: &str) -> Transition {
        Transition {
            target: Some(target.to_string()),
            ..Default::default()
        }
    }

    fn with_children(initial: Option<&str>, children: Vec<(&str, NodeConfig)>) -> NodeConfig {
        let mut node = atomic();
        node.initial = initial.map(str::to_string);
        for (key, child) in children {
            node.states.insert(key.to_string(), child);
        }
        node
    }

    fn toggle() -> NodeConfig {
        let mut off = atomic();
        off.on.insert("SWITCH".to_string(), vec![to("on")]);
        let mut on = atomic();
        on.on.insert("SWITCH".to_string(), vec![to("/off")]);
        with_children(Some("off"), vec![("off", off), ("on", on)])
    }

    #[test]
    fn absolute_target_resolution() {
        assert_eq!(absolute_target("/a/b", "c"), "/a/c");
        assert_eq!(absolute_target("/a", "c"), "/c");
        assert_eq!(absolute_target("/", "c"), "/c");
        assert_eq!(absolute_target("/a", ".c"), "/a/c");
        assert_eq!(absolute_target("/a", ".c.d"), "/a/c/d");
        assert_eq!(absolute_target("/a", "/x/y"), "/x/y");
        assert_eq!(absolute_target("/a", ""), "");
    }

    #[test]
    fn machine_collects_possible_events() {
        let machine = Machine::new(toggle());
        assert_eq!(
            machine.possible_events().iter().collect::<Vec<_>>(),
            vec!["SWITCH"]
        );
        assert_eq!(machine.initials().get("/").map(String::as_str), Some("off"));
    }

    #[test]
    fn with_target_overrides_initial() {
        let machine = Machine::new(toggle()).with_target("/", "on");
        assert_eq!(machine.initial_value(), StateValue::leaf("on"));
        assert_eq!(machine.root().initial.as_deref(), Some("off"));
    }

    #[test]
    fn with_context_is_functional() {
        let machine = Machine::new(toggle());
        let other = machine.with_context(serde_json::json!({ "iterator": 0 }));
        assert_eq!(machine.context(), &serde_json::json!({}));
        assert_eq!(other.context()["iterator"], 0);
    }

    #[test]
    fn resolve_value_rejects_unknown_paths() {
        let machine = Machine::new(toggle());
        assert!(machine.resolve_value(&StateValue::leaf("missing")).is_none());
        let (_, value) = machine
            .resolve_value(&StateValue::from_path("/on"))
            .unwrap();
        assert_eq!(value, StateValue::leaf("on"));
    }

    #[test]
    fn resolve_value_fills_parallel_regions() {
        let region = |initial: &str| {
            with_children(Some(initial), vec![(initial, atomic()), ("other", atomic())])
        };
        let mut player = with_children(None, vec![("audio", region("on")), ("video", region("playing"))]);
        player.declared = Some(NodeType::Parallel);
        let root = with_children(Some("idle"), vec![("idle", atomic()), ("player", player)]);

        let machine = Machine::new(root);
        let (_, value) = machine
            .resolve_value(&StateValue::from_path("/player/audio/other"))
            .unwrap();
        assert_eq!(
            value,
            state_value!({ "player": { "audio": "other", "video": "playing" } })
        );
    }

    #[test]
    fn delay_keys_resolve_by_name_or_millis() {
        let mut options = MachineOptions::new();
        options
            .delays
            .insert("slow".to_string(), Arc::new(|_: &StateSnapshot| Duration::from_secs(2)));
        let machine = Machine::new(toggle()).provide_options(options);
        assert!(machine.resolve_delay_key("slow").is_some());
        assert!(machine.resolve_delay_key("250").is_some());
        assert!(machine.resolve_delay_key("soon").is_none());
    }

    #[test]
    fn validate_accumulates_every_unresolved_reference() {
        let mut root = toggle();
        root.entry.push(Ref::named("boot"));
        let off = root.states.get_mut("off").unwrap();
        off.on.get_mut("SWITCH").unwrap()[0].actions.push(Ref::named("inc"));
        off.on.get_mut("SWITCH").unwrap()[0]
            .guards
            .push(GuardConfig::Or(vec!["ready".into(), "armed".into()]));
        off.after.insert("later".to_string(), vec![to("on")]);

        let machine = Machine::new(root);
        match machine.validate() {
            Validation::Failure(errors) => {
                assert_eq!(errors.len(), 5);
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, Diagnostic::UnresolvedDelay { name } if name == "later")));
            }
            Validation::Success(_) => panic!("Expected failures, got success"),
        }

        let mut options = MachineOptions::new();
        options
            .actions
            .insert("boot".to_string(), Arc::new(|_: &StateSnapshot| ActionOutput::new()));
        options
            .actions
            .insert("inc".to_string(), Arc::new(|_: &StateSnapshot| ActionOutput::new()));
        options
            .predicates
            .insert("ready".to_string(), Arc::new(|_: &StateSnapshot| true));
        options
            .predicates
            .insert("armed".to_string(), Arc::new(|_: &StateSnapshot| true));
        options
            .delays
            .insert("later".to_string(), Arc::new(|_: &StateSnapshot| Duration::from_millis(50)));
        assert!(machine.provide_options(options).validate().is_success());
    }
}
