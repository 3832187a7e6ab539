//! The interpreter: a running instance of a [`Machine`].
//!
//! [`Interpreter`] is a cheap-clone handle. Every state change happens inside
//! a task of the interpreter's [`Scheduler`], so transitions, activity ticks,
//! timer fires, child syncs and promise settlements never interleave. The
//! state lock is only held for short reads and writes; callables always run
//! without it, on a cloned [`StateSnapshot`].

use super::activities::Activity;
use super::error::InterpreterError;
use super::scheduler::Scheduler;
use super::subscription::{Registry, SubscribeOptions, Subscriber, Subscription};
use super::timers::Timer;
use crate::config::InterpreterConfig;
use crate::core::{
    collect_tags, entry_actions, flatten, select, Event, FlatMap, NodeConfig, StateHistory,
    StateSnapshot, StateValue, Status,
};
use crate::diagnostics::{Collector, Diagnostic};
use crate::machine::Machine;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stillwater::validation::Validation;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How many callables an interpreter has invoked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub actions: usize,
    pub predicates: usize,
    pub delays: usize,
}

#[derive(Default)]
pub(crate) struct Counters {
    actions: AtomicUsize,
    predicates: AtomicUsize,
    delays: AtomicUsize,
}

impl Counters {
    pub(crate) fn action(&self) {
        self.actions.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn predicate(&self) {
        self.predicates.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn delay(&self) {
        self.delays.fetch_add(1, Ordering::SeqCst);
    }

    fn counts(&self) -> CallCounts {
        CallCounts {
            actions: self.actions.load(Ordering::SeqCst),
            predicates: self.predicates.load(Ordering::SeqCst),
            delays: self.delays.load(Ordering::SeqCst),
        }
    }
}

/// Mutable state of an interpreter, guarded by one lock.
pub(crate) struct Core {
    pub(crate) status: Status,
    pub(crate) value: StateValue,
    /// Post config restricted to the active nodes.
    pub(crate) config: NodeConfig,
    /// Active nodes keyed by path.
    pub(crate) flat: FlatMap,
    pub(crate) tags: Vec<String>,
    pub(crate) context: Value,
    pub(crate) p_context: Value,
    pub(crate) event: Event,
    pub(crate) history: StateHistory,
    pub(crate) collector: Collector,
    /// Bumped whenever a new self-transition race starts.
    pub(crate) epoch: u64,
    pub(crate) self_count: usize,
    pub(crate) last_self_transition: Instant,
    /// Set when the self-transition limit is exceeded outside test mode.
    pub(crate) fatal: Option<usize>,
    /// Activities stopped on request; they stay off until their state exits.
    pub(crate) stopped_activities: BTreeSet<String>,
    pub(crate) timer_generation: u64,
}

impl Core {
    pub(crate) fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            p_context: self.p_context.clone(),
            context: self.context.clone(),
            event: self.event.clone(),
            status: self.status,
            value: self.value.clone(),
            tags: self.tags.clone(),
        }
    }

    /// Replace the active configuration.
    pub(crate) fn enter(&mut self, value: StateValue, config: NodeConfig) {
        self.flat = flatten(&config, false);
        self.tags = collect_tags(&config);
        self.config = config;
        self.value = value;
    }

    /// Overflow not yet reported to the caller.
    fn take_fatal(&mut self) -> Option<InterpreterError> {
        self.fatal
            .take()
            .map(|max| InterpreterError::SelfTransitionsExceeded { max })
    }
}

pub(crate) struct Inner {
    pub(crate) id: String,
    pub(crate) machine: Machine,
    pub(crate) config: InterpreterConfig,
    pub(crate) scheduler: Scheduler,
    pub(crate) core: Mutex<Core>,
    pub(crate) activities: Mutex<BTreeMap<String, Activity>>,
    pub(crate) timers: Mutex<BTreeMap<String, Timer>>,
    pub(crate) children: Mutex<BTreeMap<String, Interpreter>>,
    pub(crate) subscribers: Registry,
    pub(crate) race: Mutex<Option<JoinHandle<()>>>,
    pub(crate) calls: Counters,
}

/// A running statechart.
///
/// # Example
///
/// ```rust
/// use statecharts::builder::{MachineBuilder, NodeBuilder, TransitionBuilder};
/// use statecharts::core::StateValue;
/// use statecharts::Interpreter;
///
/// let machine = MachineBuilder::new(
///     NodeBuilder::new()
///         .initial("off")
///         .state("off", NodeBuilder::new().on("SWITCH", TransitionBuilder::new().to("on")))
///         .state("on", NodeBuilder::new().on("SWITCH", TransitionBuilder::new().to("off"))),
/// )
/// .build()
/// .unwrap();
///
/// let service = Interpreter::new(machine);
/// service.start().unwrap();
/// service.send("SWITCH").unwrap();
/// assert_eq!(service.value(), StateValue::leaf("on"));
/// ```
#[derive(Clone)]
pub struct Interpreter {
    pub(crate) inner: Arc<Inner>,
}

impl Interpreter {
    pub fn new(machine: Machine) -> Self {
        Self::with_config(machine, InterpreterConfig::default())
    }

    /// Resolve the initial configuration. Nothing runs until
    /// [`Interpreter::start`].
    pub fn with_config(machine: Machine, config: InterpreterConfig) -> Self {
        let initial = machine.initial_config().clone();
        let mut core = Core {
            status: Status::Idle,
            value: StateValue::empty(),
            config: NodeConfig::default(),
            flat: FlatMap::new(),
            tags: Vec::new(),
            context: machine.context().clone(),
            p_context: machine.p_context().clone(),
            event: Event::init(),
            history: StateHistory::new(),
            collector: Collector::new(),
            epoch: 0,
            self_count: 0,
            last_self_transition: Instant::now(),
            fatal: None,
            stopped_activities: BTreeSet::new(),
            timer_generation: 0,
        };
        core.enter(machine.initial_value(), initial);

        Self {
            inner: Arc::new(Inner {
                id: uuid::Uuid::new_v4().to_string(),
                machine,
                config,
                scheduler: Scheduler::new(),
                core: Mutex::new(core),
                activities: Mutex::new(BTreeMap::new()),
                timers: Mutex::new(BTreeMap::new()),
                children: Mutex::new(BTreeMap::new()),
                subscribers: Registry::default(),
                race: Mutex::new(None),
                calls: Counters::default(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn machine(&self) -> &Machine {
        &self.inner.machine
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.inner.config
    }

    /// Run the initial entry actions, spawn children and settle through
    /// every eligible self-transition.
    ///
    /// Starting twice is a no-op; starting a stopped interpreter fails.
    pub fn start(&self) -> Result<(), InterpreterError> {
        {
            let mut core = self.inner.core.lock();
            match core.status {
                Status::Idle => core.status = Status::Starting,
                Status::Stopped => return Err(core.take_fatal().unwrap_or(InterpreterError::Stopped)),
                _ => return Ok(()),
            }
        }
        tracing::debug!(id = %self.inner.id, "starting interpreter");

        let inner = self.inner.clone();
        self.inner
            .scheduler
            .initialize(Some(Box::new(move || inner.boot())));
        self.inner.checkpoint()
    }

    /// Suspend the processing of tasks, activities, timers and children.
    pub fn pause(&self) -> Result<(), InterpreterError> {
        {
            let mut core = self.inner.core.lock();
            match core.status {
                Status::Stopped => return Err(InterpreterError::Stopped),
                Status::Idle | Status::Paused => return Ok(()),
                _ => core.status = Status::Paused,
            }
        }
        self.inner.scheduler.pause();
        self.inner.pause_activities();
        self.inner.pause_timers();
        for child in self.inner.child_handles() {
            if let Err(error) = child.pause() {
                tracing::debug!(id = %self.inner.id, child = %child.id(), %error, "child not paused");
            }
        }
        self.inner.notify();
        Ok(())
    }

    pub fn resume(&self) -> Result<(), InterpreterError> {
        {
            let mut core = self.inner.core.lock();
            match core.status {
                Status::Stopped => return Err(core.take_fatal().unwrap_or(InterpreterError::Stopped)),
                Status::Paused => core.status = Status::Working,
                _ => return Ok(()),
            }
        }
        self.inner.scheduler.resume();
        let inner = self.inner.clone();
        self.inner.scheduler.schedule(Box::new(move || {
            inner.activities_round();
            inner.notify();
        }));
        self.inner.resume_timers();
        for child in self.inner.child_handles() {
            if let Err(error) = child.resume() {
                tracing::debug!(id = %self.inner.id, child = %child.id(), %error, "child not resumed");
            }
        }
        self.inner.checkpoint()
    }

    /// Tear down activities, timers, the self-transition race and children.
    /// A stopped interpreter never runs anything again.
    pub fn stop(&self) -> Result<(), InterpreterError> {
        self.inner.halt();
        Ok(())
    }

    /// Stop, then drop every subscriber and child.
    pub fn dispose(&self) -> Result<(), InterpreterError> {
        self.inner.halt();
        self.inner.subscribers.clear();
        let children: Vec<Interpreter> = {
            let mut children = self.inner.children.lock();
            std::mem::take(&mut *children).into_values().collect()
        };
        for child in children {
            child.dispose()?;
        }
        Ok(())
    }

    /// Dispatch an event.
    ///
    /// Kinds no node handles are dropped without queuing anything. Sending
    /// from inside a callable queues the event after the current task.
    ///
    /// A stopped interpreter drops the event, first reporting a
    /// self-transition overflow that stopped it in the background.
    pub fn send(&self, event: impl Into<Event>) -> Result<(), InterpreterError> {
        let event = event.into();
        {
            let mut core = self.inner.core.lock();
            if core.status == Status::Stopped {
                if let Some(error) = core.take_fatal() {
                    return Err(error);
                }
                tracing::debug!(id = %self.inner.id, event = %event.kind, "event dropped: interpreter stopped");
                return Ok(());
            }
        }
        if !self.inner.machine.possible_events().contains(&event.kind) {
            tracing::debug!(id = %self.inner.id, event = %event.kind, "event dropped: no state handles it");
            return Ok(());
        }

        let inner = self.inner.clone();
        self.inner
            .scheduler
            .schedule(Box::new(move || inner.process_event(event, false)));
        self.inner.checkpoint()
    }

    pub fn subscribe(&self, subscriber: Subscriber, options: SubscribeOptions) -> Subscription {
        self.inner.subscribers.add(subscriber, options)
    }

    /// Frozen copy of the current state.
    pub fn state(&self) -> StateSnapshot {
        self.inner.snapshot()
    }

    pub fn value(&self) -> StateValue {
        self.inner.core.lock().value.clone()
    }

    pub fn context(&self) -> Value {
        self.inner.core.lock().context.clone()
    }

    pub fn p_context(&self) -> Value {
        self.inner.core.lock().p_context.clone()
    }

    pub fn status(&self) -> Status {
        self.inner.core.lock().status
    }

    pub fn tags(&self) -> Vec<String> {
        self.inner.core.lock().tags.clone()
    }

    pub fn event(&self) -> Event {
        self.inner.core.lock().event.clone()
    }

    /// Value at a dotted path of the public context.
    pub fn select(&self, path: &str) -> Option<Value> {
        select(&self.inner.core.lock().context, path).cloned()
    }

    /// Number of scheduler tasks processed.
    pub fn scheduleds(&self) -> usize {
        self.inner.scheduler.performeds()
    }

    pub fn calls(&self) -> CallCounts {
        self.inner.calls.counts()
    }

    pub fn history(&self) -> StateHistory {
        self.inner.core.lock().history.clone()
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.inner.core.lock().collector.warnings().to_vec()
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        self.inner.core.lock().collector.errors().to_vec()
    }

    pub fn child(&self, id: &str) -> Option<Interpreter> {
        self.inner.children.lock().get(id).cloned()
    }

    /// Ids of the running activities, `"<state path>::<delay key>"`.
    pub fn activities(&self) -> Vec<String> {
        self.inner.activities.lock().keys().cloned().collect()
    }

    /// Ids of the pending debounce timers.
    pub fn timers(&self) -> Vec<String> {
        self.inner.timers.lock().keys().cloned().collect()
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.inner.core.lock();
        f.debug_struct("Interpreter")
            .field("id", &self.inner.id)
            .field("status", &core.status)
            .field("value", &core.value)
            .finish()
    }
}

impl Inner {
    pub(crate) fn snapshot(&self) -> StateSnapshot {
        self.core.lock().snapshot()
    }

    pub(crate) fn warn(&self, diagnostic: Diagnostic) {
        self.core.lock().collector.warn(diagnostic);
    }

    pub(crate) fn error(&self, diagnostic: Diagnostic) {
        self.core.lock().collector.error(diagnostic);
    }

    fn boot(self: &Arc<Self>) {
        let entries = {
            let mut core = self.core.lock();
            core.status = Status::Started;
            entry_actions(&core.config)
        };
        for action in &entries {
            self.run_action(action);
        }
        self.spawn_children();
        self.next();
        self.notify();
    }

    /// Deliver the current snapshot to every subscriber it is news to.
    pub(crate) fn notify(&self) {
        let current = self.snapshot();
        self.subscribers.notify(&current);
    }

    /// Surface what the caller has to know about: self-transition overflow
    /// always, pending errors in strict mode.
    pub(crate) fn checkpoint(&self) -> Result<(), InterpreterError> {
        let mut core = self.core.lock();
        if let Some(error) = core.take_fatal() {
            return Err(error);
        }
        if !self.config.is_strict() {
            return Ok(());
        }
        match core.collector.checkpoint() {
            Validation::Success(_) => Ok(()),
            Validation::Failure(errors) => Err(InterpreterError::Checkpoint(
                errors.iter().cloned().collect(),
            )),
        }
    }

    /// Stop everything this interpreter owns.
    pub(crate) fn halt(&self) {
        {
            let mut core = self.core.lock();
            if core.status == Status::Stopped {
                return;
            }
            core.status = Status::Stopped;
        }
        tracing::debug!(id = %self.id, "stopping interpreter");

        self.scheduler.stop();
        self.cancel_race();
        self.stop_activities();
        self.stop_timers();
        for child in self.child_handles() {
            child.inner.halt();
        }
        self.notify();
    }

    pub(crate) fn child_handles(&self) -> Vec<Interpreter> {
        self.children.lock().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{MachineBuilder, NodeBuilder, TransitionBuilder};
    use serde_json::json;

    fn toggle() -> Machine {
        MachineBuilder::new(
            NodeBuilder::new()
                .initial("off")
                .state("off", NodeBuilder::new().tag("dark").on("SWITCH", TransitionBuilder::new().to("on")))
                .state("on", NodeBuilder::new().tag("lit").on("SWITCH", TransitionBuilder::new().to("off"))),
        )
        .context(json!({ "iterator": 0, "nested": { "a": [1, 2] } }))
        .build()
        .unwrap()
    }

    #[test]
    fn construction_has_no_side_effects() {
        let service = Interpreter::new(toggle());
        assert_eq!(service.status(), Status::Idle);
        assert_eq!(service.value(), StateValue::leaf("off"));
        assert_eq!(service.tags(), vec!["dark"]);
        assert_eq!(service.scheduleds(), 0);
        assert_eq!(service.event(), Event::init());
    }

    #[test]
    fn start_is_idempotent_and_stop_is_terminal() {
        let service = Interpreter::new(toggle());
        service.start().unwrap();
        service.start().unwrap();
        assert_eq!(service.status(), Status::Working);
        assert_eq!(service.scheduleds(), 1);

        service.stop().unwrap();
        assert_eq!(service.status(), Status::Stopped);
        assert_eq!(service.start(), Err(InterpreterError::Stopped));
        service.send("SWITCH").unwrap();
        assert_eq!(service.value(), StateValue::leaf("off"));
    }

    #[test]
    fn events_sent_before_start_wait_for_it() {
        let service = Interpreter::new(toggle());
        service.send("SWITCH").unwrap();
        assert_eq!(service.value(), StateValue::leaf("off"));

        service.start().unwrap();
        assert_eq!(service.value(), StateValue::leaf("on"));
        assert_eq!(service.tags(), vec!["lit"]);
    }

    #[test]
    fn paused_interpreter_queues_events() {
        let service = Interpreter::new(toggle());
        service.start().unwrap();
        service.pause().unwrap();
        assert_eq!(service.status(), Status::Paused);

        service.send("SWITCH").unwrap();
        assert_eq!(service.value(), StateValue::leaf("off"));

        service.resume().unwrap();
        assert_eq!(service.value(), StateValue::leaf("on"));
        assert_eq!(service.status(), Status::Working);
    }

    #[test]
    fn select_reads_dotted_context_paths() {
        let service = Interpreter::new(toggle());
        assert_eq!(service.select("iterator"), Some(json!(0)));
        assert_eq!(service.select("nested.a.1"), Some(json!(2)));
        assert_eq!(service.select("missing"), None);
    }

    #[test]
    fn history_records_value_changes() {
        let service = Interpreter::new(toggle());
        service.start().unwrap();
        service.send("SWITCH").unwrap();
        service.send("SWITCH").unwrap();

        let history = service.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history.transitions()[0].event, "SWITCH");
        assert_eq!(
            history.get_path(),
            vec![
                &StateValue::leaf("off"),
                &StateValue::leaf("on"),
                &StateValue::leaf("off"),
            ]
        );
    }
}
