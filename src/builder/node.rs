//! Builders for state nodes and promise transitions.

use crate::builder::error::BuildError;
use crate::builder::transition::TransitionBuilder;
use crate::core::{
    join_path, ActionItem, ActionRef, DelayRef, NodeConfig, NodeType, PromiseConfig, PromiseRef,
    Transition, ROOT,
};

/// Builder for a node and, recursively, its children.
///
/// # Example
///
/// ```rust
/// use statecharts::builder::{NodeBuilder, TransitionBuilder};
///
/// let root = NodeBuilder::new()
///     .initial("off")
///     .state("off", NodeBuilder::new().on("SWITCH", TransitionBuilder::new().to("on")))
///     .state("on", NodeBuilder::new().on("SWITCH", TransitionBuilder::new().to("off")))
///     .build()
///     .unwrap();
///
/// assert!(root.is_compound());
/// assert_eq!(root.states.len(), 2);
/// ```
#[derive(Debug, Default, Clone)]
pub struct NodeBuilder {
    node: NodeConfig,
    on: Vec<(String, TransitionBuilder)>,
    always: Vec<TransitionBuilder>,
    after: Vec<(String, TransitionBuilder)>,
    promises: Vec<PromiseBuilder>,
    states: Vec<(String, NodeBuilder)>,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default child entered with the node.
    pub fn initial(mut self, child: impl Into<String>) -> Self {
        self.node.initial = Some(child.into());
        self
    }

    /// Make every child a region active at the same time.
    pub fn parallel(mut self) -> Self {
        self.node.declared = Some(NodeType::Parallel);
        self
    }

    /// Force the node to be atomic even when children are declared.
    pub fn atomic(mut self) -> Self {
        self.node.declared = Some(NodeType::Atomic);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.node.description = Some(description.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.node.tags.push(tag.into());
        self
    }

    pub fn entry(mut self, action: impl Into<ActionRef>) -> Self {
        self.node.entry.push(action.into());
        self
    }

    pub fn exit(mut self, action: impl Into<ActionRef>) -> Self {
        self.node.exit.push(action.into());
        self
    }

    /// Handle `event` with `transition`. Transitions of one event are tried
    /// in declaration order.
    pub fn on(mut self, event: impl Into<String>, transition: TransitionBuilder) -> Self {
        self.on.push((event.into(), transition));
        self
    }

    /// Add an eventless transition, tried after every step.
    pub fn always(mut self, transition: TransitionBuilder) -> Self {
        self.always.push(transition);
        self
    }

    /// Add a transition fired once `delay` (a delay name or a number of
    /// milliseconds) has elapsed in this state.
    pub fn after(mut self, delay: impl Into<String>, transition: TransitionBuilder) -> Self {
        self.after.push((delay.into(), transition));
        self
    }

    pub fn promise(mut self, promise: PromiseBuilder) -> Self {
        self.promises.push(promise);
        self
    }

    /// Run `items` every `delay` while this state is active.
    pub fn activity<I>(mut self, delay: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ActionItem>,
    {
        self.node
            .activities
            .entry(delay.into())
            .or_default()
            .extend(items.into_iter().map(Into::into));
        self
    }

    pub fn state(mut self, name: impl Into<String>, child: NodeBuilder) -> Self {
        self.states.push((name.into(), child));
        self
    }

    /// Build the node tree rooted here.
    pub fn build(self) -> Result<NodeConfig, BuildError> {
        self.build_at(ROOT)
    }

    fn build_at(self, path: &str) -> Result<NodeConfig, BuildError> {
        let mut node = self.node;

        for (event, transition) in self.on {
            if event.trim().is_empty() {
                return Err(BuildError::EmptyEventType {
                    path: path.to_string(),
                });
            }
            let transition = build_transition(transition, path)?;
            node.on.entry(event).or_default().push(transition);
        }
        for transition in self.always {
            node.always.push(build_transition(transition, path)?);
        }
        for (delay, transition) in self.after {
            let transition = build_transition(transition, path)?;
            node.after.entry(delay).or_default().push(transition);
        }
        for promise in self.promises {
            node.promises.push(promise.build_at(path)?);
        }
        for (name, child) in self.states {
            let child = child.build_at(&join_path(path, &name))?;
            node.states.insert(name, child);
        }

        if let Some(initial) = &node.initial {
            if !node.states.contains_key(initial) {
                return Err(BuildError::UnknownInitial {
                    path: path.to_string(),
                    initial: initial.clone(),
                });
            }
        }

        Ok(node)
    }
}

fn build_transition(builder: TransitionBuilder, path: &str) -> Result<Transition, BuildError> {
    builder.build().map_err(|error| match error {
        BuildError::InvalidTarget { target, .. } => BuildError::InvalidTarget {
            path: path.to_string(),
            target,
        },
        other => other,
    })
}

/// Builder for a promise transition.
///
/// The promise's settlement events are `<id>::then` and `<id>::catch`.
#[derive(Debug, Clone)]
pub struct PromiseBuilder {
    id: String,
    src: PromiseRef,
    then: Vec<TransitionBuilder>,
    catch: Vec<TransitionBuilder>,
    finally: Vec<ActionItem>,
    max: Option<DelayRef>,
}

impl PromiseBuilder {
    /// A promise running the named source; the name doubles as its id.
    pub fn new(src: impl Into<String>) -> Self {
        let src = src.into();
        Self::with_source(src.clone(), PromiseRef::Named(src))
    }

    pub fn with_source(id: impl Into<String>, src: PromiseRef) -> Self {
        Self {
            id: id.into(),
            src,
            then: Vec::new(),
            catch: Vec::new(),
            finally: Vec::new(),
            max: None,
        }
    }

    /// Transition tried when the source resolves.
    pub fn then(mut self, transition: TransitionBuilder) -> Self {
        self.then.push(transition);
        self
    }

    /// Transition tried when the source rejects or times out.
    pub fn catch(mut self, transition: TransitionBuilder) -> Self {
        self.catch.push(transition);
        self
    }

    /// Item run after either outcome.
    pub fn finally(mut self, item: impl Into<ActionItem>) -> Self {
        self.finally.push(item.into());
        self
    }

    /// Timeout of the source.
    pub fn max(mut self, delay: impl Into<DelayRef>) -> Self {
        self.max = Some(delay.into());
        self
    }

    fn build_at(self, path: &str) -> Result<PromiseConfig, BuildError> {
        if self.id.trim().is_empty() {
            return Err(BuildError::EmptyPromiseId {
                path: path.to_string(),
            });
        }
        Ok(PromiseConfig {
            id: self.id,
            src: self.src,
            then: self
                .then
                .into_iter()
                .map(|t| build_transition(t, path))
                .collect::<Result<_, _>>()?,
            catch: self
                .catch
                .into_iter()
                .map(|t| build_transition(t, path))
                .collect::<Result<_, _>>()?,
            finally: self.finally,
            max: self.max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GuardConfig;

    #[test]
    fn unknown_initial_is_rejected() {
        let result = NodeBuilder::new()
            .initial("missing")
            .state("present", NodeBuilder::new())
            .build();
        assert_eq!(
            result.unwrap_err(),
            BuildError::UnknownInitial {
                path: "/".to_string(),
                initial: "missing".to_string(),
            }
        );
    }

    #[test]
    fn nested_errors_carry_node_path() {
        let result = NodeBuilder::new()
            .state(
                "outer",
                NodeBuilder::new().state("inner", NodeBuilder::new().on("", TransitionBuilder::new())),
            )
            .build();
        assert_eq!(
            result.unwrap_err(),
            BuildError::EmptyEventType {
                path: "/outer/inner".to_string(),
            }
        );
    }

    #[test]
    fn empty_target_reports_declaring_node() {
        let result = NodeBuilder::new()
            .state("a", NodeBuilder::new().always(TransitionBuilder::new().to("")))
            .build();
        assert_eq!(
            result.unwrap_err(),
            BuildError::InvalidTarget {
                path: "/a".to_string(),
                target: String::new(),
            }
        );
    }

    #[test]
    fn parallel_node_builds_regions() {
        let node = NodeBuilder::new()
            .parallel()
            .state("audio", NodeBuilder::new())
            .state("video", NodeBuilder::new())
            .build()
            .unwrap();
        assert!(node.is_parallel());
        assert_eq!(node.states.len(), 2);
    }

    #[test]
    fn transitions_of_one_event_keep_order() {
        let node = NodeBuilder::new()
            .on("GO", TransitionBuilder::new().to("a").when("first"))
            .on("GO", TransitionBuilder::new().to("b"))
            .build()
            .unwrap();
        let transitions = &node.on["GO"];
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].target.as_deref(), Some("a"));
        assert_eq!(transitions[1].target.as_deref(), Some("b"));
    }

    #[test]
    fn activity_accepts_plain_and_guarded_items() {
        let node = NodeBuilder::new()
            .activity(
                "TICK",
                vec![
                    ActionItem::from("inc"),
                    ActionItem::Guarded {
                        guards: vec![GuardConfig::from("big")],
                        actions: vec!["reset".into()],
                    },
                ],
            )
            .build()
            .unwrap();
        assert_eq!(node.activities["TICK"].len(), 2);
    }

    #[test]
    fn promise_builds_then_catch_and_finally() {
        let node = NodeBuilder::new()
            .promise(
                PromiseBuilder::new("fetch")
                    .then(TransitionBuilder::new().to("done"))
                    .catch(TransitionBuilder::new().to("failed"))
                    .finally("cleanup")
                    .max("slow"),
            )
            .build()
            .unwrap();
        let promise = &node.promises[0];
        assert_eq!(promise.id, "fetch");
        assert_eq!(promise.then.len(), 1);
        assert_eq!(promise.catch.len(), 1);
        assert_eq!(promise.finally.len(), 1);
        assert_eq!(promise.max.as_ref().map(|m| m.label()), Some("slow"));
    }
}
