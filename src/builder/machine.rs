//! Builder for constructing machines.

use crate::builder::error::BuildError;
use crate::builder::node::NodeBuilder;
use crate::core::{ActionOutput, NodeConfig, StateSnapshot, Transition};
use crate::machine::{ChildConfig, Machine, MachineOptions};
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Builder for constructing machines with a fluent API.
///
/// # Example
///
/// ```rust
/// use statecharts::builder::{MachineBuilder, NodeBuilder, TransitionBuilder};
/// use statecharts::core::ActionOutput;
/// use serde_json::json;
///
/// let machine = MachineBuilder::new(
///     NodeBuilder::new()
///         .initial("off")
///         .state("off", NodeBuilder::new().on("SWITCH", TransitionBuilder::new().to("on").action("inc")))
///         .state("on", NodeBuilder::new()),
/// )
/// .action("inc", |s| {
///     let n = s.context["iterator"].as_i64().unwrap_or(0);
///     ActionOutput::new().assign(json!({ "iterator": n + 1 }))
/// })
/// .context(json!({ "iterator": 0 }))
/// .build()
/// .unwrap();
///
/// assert!(machine.validate().is_success());
/// ```
pub struct MachineBuilder {
    root: NodeBuilder,
    options: MachineOptions,
    context: Value,
    p_context: Value,
}

impl MachineBuilder {
    pub fn new(root: NodeBuilder) -> Self {
        Self {
            root,
            options: MachineOptions::default(),
            context: Value::Object(Default::default()),
            p_context: Value::Object(Default::default()),
        }
    }

    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&StateSnapshot) -> ActionOutput + Send + Sync + 'static,
    {
        self.options.actions.insert(name.into(), Arc::new(action));
        self
    }

    pub fn predicate<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&StateSnapshot) -> bool + Send + Sync + 'static,
    {
        self.options.predicates.insert(name.into(), Arc::new(predicate));
        self
    }

    /// Register a fixed delay.
    pub fn delay(self, name: impl Into<String>, delay: Duration) -> Self {
        self.delay_fn(name, move |_| delay)
    }

    /// Register a delay computed from the snapshot.
    pub fn delay_fn<F>(mut self, name: impl Into<String>, delay: F) -> Self
    where
        F: Fn(&StateSnapshot) -> Duration + Send + Sync + 'static,
    {
        self.options.delays.insert(name.into(), Arc::new(delay));
        self
    }

    /// Register a promise source. `Ok` settles through `then`, `Err`
    /// through `catch`.
    pub fn promise<F, Fut>(mut self, name: impl Into<String>, src: F) -> Self
    where
        F: Fn(StateSnapshot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Value>> + Send + 'static,
    {
        self.options
            .promises
            .insert(name.into(), Arc::new(move |snapshot| src(snapshot).boxed()));
        self
    }

    /// Declare a child machine spawned when the interpreter starts.
    pub fn child(mut self, id: impl Into<String>, child: ChildConfig) -> Self {
        self.options.children.insert(id.into(), child);
        self
    }

    pub fn options(mut self, options: MachineOptions) -> Self {
        self.options = self.options.merge(options);
        self
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn p_context(mut self, p_context: Value) -> Self {
        self.p_context = p_context;
        self
    }

    /// Build the machine.
    ///
    /// Fails when a node is malformed, when a transition targets a node
    /// that does not exist, or when a context is not an object.
    pub fn build(self) -> Result<Machine, BuildError> {
        if !self.context.is_object() || !self.p_context.is_object() {
            return Err(BuildError::InvalidContext);
        }
        let root = self.root.build()?;
        let machine = Machine::assemble(root, self.options, self.context, self.p_context);
        check_targets(&machine)?;
        Ok(machine)
    }
}

fn check_targets(machine: &Machine) -> Result<(), BuildError> {
    for (path, node) in machine.flat() {
        for transition in transitions(node) {
            if let Some(target) = &transition.target {
                if !machine.flat().contains_key(target) {
                    return Err(BuildError::InvalidTarget {
                        path: path.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn transitions(node: &NodeConfig) -> impl Iterator<Item = &Transition> {
    node.on
        .values()
        .flatten()
        .chain(&node.always)
        .chain(node.after.values().flatten())
        .chain(node.promises.iter().flat_map(|p| p.then.iter().chain(&p.catch)))
}
