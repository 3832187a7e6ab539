//! Running transitions and actions against the interpreter state.
//!
//! Everything here runs inside a scheduler task.

use super::interpreter::Inner;
use super::resolver::{self, TransitionHost};
use crate::config::TIME_TO_REINIT_SELF_COUNTER;
use crate::core::{
    active_leaves, diff, flatten, merge, next_value, ActionItem, ActionOutput, ActionRef, Control,
    DelayRef, Event, GuardConfig, StateTransition, StateValue, Status, Transition,
};
use crate::diagnostics::Diagnostic;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Adapter handing the resolver's callbacks to the interpreter.
struct Stepper<'a> {
    inner: &'a Arc<Inner>,
}

impl TransitionHost for Stepper<'_> {
    fn eligible(&mut self, transition: &Transition) -> bool {
        self.inner.check_guards(&transition.guards)
    }

    fn fire(&mut self, current: &StateValue, transition: &Transition) -> StateValue {
        self.inner.fire(current, transition)
    }
}

impl Inner {
    /// Check that every guard passes. Unresolved predicate names are warned
    /// about and dropped from their branch.
    pub(crate) fn check_guards(&self, guards: &[GuardConfig]) -> bool {
        let predicates = &self.machine.options().predicates;
        let lookup = |name: &str| predicates.get(name).cloned();
        let resolution = GuardConfig::resolve_all(guards, &lookup);
        for name in &resolution.unresolved {
            self.warn(Diagnostic::UnresolvedPredicate { name: name.clone() });
        }
        if resolution.guard.is_none() {
            return false;
        }

        let snapshot = self.snapshot();
        resolution.check_with(&mut |predicate| {
            self.calls.predicate();
            predicate(&snapshot)
        })
    }

    pub(crate) fn run_action(self: &Arc<Self>, action: &ActionRef) {
        let Some(callable) = self.machine.resolve_action(action) else {
            self.warn(Diagnostic::UnresolvedAction {
                name: action.label().to_string(),
            });
            return;
        };
        self.calls.action();
        let snapshot = self.snapshot();
        let output = callable(&snapshot);
        self.apply_output(output);
    }

    /// Run activity or `finally` items in order.
    pub(crate) fn run_items(self: &Arc<Self>, items: &[ActionItem]) {
        for item in items {
            match item {
                ActionItem::Action(action) => self.run_action(action),
                ActionItem::Guarded { guards, actions } => {
                    if self.check_guards(guards) {
                        for action in actions {
                            self.run_action(action);
                        }
                    }
                }
            }
        }
    }

    pub(crate) fn apply_output(self: &Arc<Self>, output: ActionOutput) {
        let ActionOutput {
            context,
            p_context,
            debounces,
            send_to,
            resend,
            force_send,
            controls,
        } = output;

        if context.is_some() || p_context.is_some() {
            let mut core = self.core.lock();
            if let Some(delta) = context {
                merge(&mut core.context, delta);
            }
            if let Some(delta) = p_context {
                merge(&mut core.p_context, delta);
            }
        }

        for debounce in debounces {
            self.debounce(debounce);
        }

        for (id, event) in send_to {
            let child = self.children.lock().get(&id).cloned();
            match child {
                Some(child) => {
                    if let Err(error) = child.send(event) {
                        tracing::error!(id = %self.id, child = %id, %error, "child rejected event");
                    }
                }
                None => self.error(Diagnostic::UnknownChild { id }),
            }
        }

        for event in resend {
            let inner = self.clone();
            self.scheduler
                .schedule(Box::new(move || inner.resend_event(event)));
        }
        for event in force_send {
            let inner = self.clone();
            self.scheduler
                .schedule(Box::new(move || inner.process_event(event, true)));
        }

        for control in controls {
            match control {
                Control::PauseActivity(id) => self.pause_activity(&id),
                Control::ResumeActivity(id) => self.resume_activity(&id),
                Control::StopActivity(id) => self.stop_activity(&id),
                Control::PauseTimer(id) => self.pause_timer(&id),
                Control::ResumeTimer(id) => self.resume_timer(&id),
                Control::StopTimer(id) => self.stop_timer(&id),
            }
        }
    }

    /// Evaluate a delay reference, counting the call.
    pub(crate) fn delay_of(&self, delay: &DelayRef) -> Option<Duration> {
        let Some(callable) = self.machine.resolve_delay(delay) else {
            self.warn(Diagnostic::UnresolvedDelay {
                name: delay.label().to_string(),
            });
            return None;
        };
        self.calls.delay();
        Some(callable(&self.snapshot()))
    }

    /// Evaluate an `after` or activity key.
    pub(crate) fn delay_for_key(&self, key: &str) -> Option<Duration> {
        self.delay_of(&DelayRef::named(key))
    }

    /// Run `transition` from `current`: exit actions of the nodes left,
    /// transition actions, then entry actions of the nodes entered.
    ///
    /// The new configuration is committed once every action has run.
    /// Unreachable targets leave `current` untouched.
    pub(crate) fn fire(self: &Arc<Self>, current: &StateValue, transition: &Transition) -> StateValue {
        let candidate = next_value(current, transition.target.as_deref());
        let Some((config, value)) = self.machine.resolve_value(&candidate) else {
            self.warn(Diagnostic::UnreachableTarget {
                target: transition.target.clone().unwrap_or_default(),
            });
            return current.clone();
        };

        let (from, old_flat) = {
            let core = self.core.lock();
            (core.value.clone(), core.flat.clone())
        };
        let new_flat = flatten(&config, false);
        let moved = diff(&old_flat, &new_flat);

        let exits: Vec<ActionRef> = moved
            .exited
            .iter()
            .filter_map(|path| old_flat.get(path))
            .flat_map(|node| node.exit.iter().cloned())
            .collect();
        let entries: Vec<ActionRef> = moved
            .entered
            .iter()
            .filter_map(|path| new_flat.get(path))
            .flat_map(|node| node.entry.iter().cloned())
            .collect();

        for action in exits.iter().chain(&transition.actions).chain(&entries) {
            self.run_action(action);
        }

        let mut core = self.core.lock();
        if value != from {
            tracing::debug!(id = %self.id, from = %from, to = %value, "transition");
            let record = StateTransition {
                from,
                to: value.clone(),
                event: core.event.kind.clone(),
                timestamp: Utc::now(),
            };
            core.history = core.history.record(record);
            core.enter(value.clone(), config);
        }
        value
    }

    /// Fire the first eligible transition of `transitions` from the current
    /// value. Returns whether the value changed.
    pub(crate) fn fire_first(self: &Arc<Self>, transitions: &[Transition]) -> bool {
        let current = self.core.lock().value.clone();
        match transitions.iter().find(|t| self.check_guards(&t.guards)) {
            Some(transition) => self.fire(&current, transition) != current,
            None => false,
        }
    }

    /// Resolve `event` against the whole machine. Inactive handlers still
    /// shadow their ancestors; `force` lets them fire anyway.
    pub(crate) fn process_event(self: &Arc<Self>, event: Event, force: bool) {
        let current = {
            let mut core = self.core.lock();
            if core.status == Status::Stopped {
                return;
            }
            core.event = event.clone();
            core.status = Status::Sending;
            core.value.clone()
        };
        tracing::debug!(id = %self.id, event = %event.kind, force, "processing event");

        let value = resolver::resolve(
            self.machine.flat(),
            &event.kind,
            &current,
            force,
            &mut Stepper { inner: self },
        );

        self.set_status(Status::Working);
        if value != current {
            self.next();
        }
        self.notify();
    }

    /// Process a resent event only while some active node handles it.
    fn resend_event(self: &Arc<Self>, event: Event) {
        let handled = self
            .core
            .lock()
            .flat
            .values()
            .any(|node| node.on.get(&event.kind).is_some_and(|t| !t.is_empty()));
        if handled {
            self.process_event(event, false);
        } else {
            tracing::debug!(id = %self.id, event = %event.kind, "resent event not handled");
        }
    }

    /// Settle the configuration: refresh activities, follow `always`
    /// transitions until none fires, then race the delayed ones.
    pub(crate) fn next(self: &Arc<Self>) {
        self.cancel_race();
        loop {
            {
                let mut core = self.core.lock();
                if core.status == Status::Stopped {
                    return;
                }
                if self.config.is_strict() && core.collector.has_pending() {
                    core.status = Status::Working;
                    return;
                }
                core.status = Status::Busy;
            }

            self.activities_round();
            if self.try_always() {
                if !self.count_self_transition() {
                    return;
                }
                continue;
            }

            self.set_status(Status::Working);
            self.launch_race();
            return;
        }
    }

    /// Fire the first eligible `always` transition of the active leaves.
    fn try_always(self: &Arc<Self>) -> bool {
        let always: Vec<Vec<Transition>> = {
            let core = self.core.lock();
            active_leaves(&core.config)
                .iter()
                .filter_map(|leaf| core.flat.get(leaf))
                .filter(|node| !node.always.is_empty())
                .map(|node| node.always.clone())
                .collect()
        };

        for transitions in always {
            let current = self.core.lock().value.clone();
            if let Some(transition) = transitions.iter().find(|t| self.check_guards(&t.guards)) {
                return self.fire(&current, transition) != current;
            }
        }
        false
    }

    /// Count one self-transition. Past the limit the interpreter halts and
    /// `false` is returned.
    pub(crate) fn count_self_transition(&self) -> bool {
        let max = self.config.max_self_transitions;
        {
            let mut core = self.core.lock();
            let now = Instant::now();
            if now.duration_since(core.last_self_transition) > TIME_TO_REINIT_SELF_COUNTER {
                core.self_count = 0;
            }
            core.last_self_transition = now;
            core.self_count += 1;
            if core.self_count <= max {
                return true;
            }

            core.collector.error(Diagnostic::MaxSelfTransitions { max });
            if !self.config.test {
                core.fatal = Some(max);
            }
        }
        self.halt();
        false
    }

    pub(crate) fn set_status(&self, status: Status) {
        let mut core = self.core.lock();
        if core.status != Status::Stopped {
            core.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::{MachineBuilder, NodeBuilder, TransitionBuilder};
    use crate::core::{ActionOutput, StateValue};
    use crate::diagnostics::Diagnostic;
    use crate::effects::Interpreter;
    use crate::InterpreterConfig;
    use serde_json::json;

    fn counter() -> MachineBuilder {
        MachineBuilder::new(
            NodeBuilder::new()
                .initial("idle")
                .state(
                    "idle",
                    NodeBuilder::new()
                        .exit("log_exit")
                        .on("INC", TransitionBuilder::new().action("inc"))
                        .on("GO", TransitionBuilder::new().to("busy").action("log_go")),
                )
                .state("busy", NodeBuilder::new().entry("log_entry")),
        )
        .context(json!({ "n": 0, "log": [] }))
        .action("inc", |s| {
            let n = s.context["n"].as_i64().unwrap_or(0);
            ActionOutput::new().assign(json!({ "n": n + 1 }))
        })
        .action("log_exit", |s| push(s, "exit"))
        .action("log_go", |s| push(s, "go"))
        .action("log_entry", |s| push(s, "entry"))
    }

    fn push(snapshot: &crate::core::StateSnapshot, entry: &str) -> ActionOutput {
        let mut log = snapshot.context["log"].as_array().cloned().unwrap_or_default();
        log.push(json!(entry));
        ActionOutput::new().assign(json!({ "log": log }))
    }

    #[test]
    fn targetless_transition_runs_actions_only() {
        let service = Interpreter::new(counter().build().unwrap());
        service.start().unwrap();
        service.send("INC").unwrap();
        service.send("INC").unwrap();

        assert_eq!(service.select("n"), Some(json!(2)));
        assert_eq!(service.value(), StateValue::leaf("idle"));
        assert!(service.history().is_empty());
    }

    #[test]
    fn exit_transition_and_entry_actions_run_in_order() {
        let service = Interpreter::new(counter().build().unwrap());
        service.start().unwrap();
        service.send("GO").unwrap();

        assert_eq!(service.value(), StateValue::leaf("busy"));
        assert_eq!(service.select("log"), Some(json!(["exit", "go", "entry"])));
        assert_eq!(service.calls().actions, 3);
    }

    #[test]
    fn missing_action_is_a_warning() {
        let machine = MachineBuilder::new(
            NodeBuilder::new()
                .initial("a")
                .state("a", NodeBuilder::new().on("GO", TransitionBuilder::new().to("b").action("ghost")))
                .state("b", NodeBuilder::new()),
        )
        .build()
        .unwrap();
        let service = Interpreter::new(machine);
        service.start().unwrap();
        service.send("GO").unwrap();

        assert_eq!(service.value(), StateValue::leaf("b"));
        assert_eq!(
            service.warnings(),
            vec![Diagnostic::UnresolvedAction { name: "ghost".to_string() }]
        );
        assert!(service.errors().is_empty());
    }

    #[test]
    fn guards_are_counted_and_short_circuit() {
        let machine = MachineBuilder::new(
            NodeBuilder::new()
                .initial("a")
                .state(
                    "a",
                    NodeBuilder::new()
                        .on("GO", TransitionBuilder::new().to("b").when("never").when("always"))
                        .on("GO", TransitionBuilder::new().to("c").when("always")),
                )
                .state("b", NodeBuilder::new())
                .state("c", NodeBuilder::new()),
        )
        .predicate("never", |_| false)
        .predicate("always", |_| true)
        .build()
        .unwrap();
        let service = Interpreter::new(machine);
        service.start().unwrap();
        service.send("GO").unwrap();

        assert_eq!(service.value(), StateValue::leaf("c"));
        assert_eq!(service.calls().predicates, 2);
    }

    #[test]
    fn unbounded_always_loop_halts_in_test_mode() {
        let machine = MachineBuilder::new(
            NodeBuilder::new()
                .initial("a")
                .state("a", NodeBuilder::new().always(TransitionBuilder::new().to("b")))
                .state("b", NodeBuilder::new().always(TransitionBuilder::new().to("a"))),
        )
        .build()
        .unwrap();
        let config = InterpreterConfig::default()
            .with_test(true)
            .with_max_self_transitions(5);
        let service = Interpreter::with_config(machine, config);

        assert!(service.start().is_ok());
        assert_eq!(service.status(), crate::core::Status::Stopped);
        assert_eq!(service.errors(), vec![Diagnostic::MaxSelfTransitions { max: 5 }]);
        assert_eq!(service.history().len(), 6);
    }
}
