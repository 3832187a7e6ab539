//! The self-transition race: `after` delays and promises of the active
//! leaves, all started together, settled one at a time through the
//! scheduler until one of them moves the interpreter.

use super::interpreter::Inner;
use crate::core::{active_leaves, Event, PromiseConfig, Status};
use crate::diagnostics::Diagnostic;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Outcome of one contestant of the race.
pub(crate) enum Settlement {
    After {
        leaf: String,
        key: String,
    },
    /// An `after` delay longer than the promise time limit.
    Expired {
        operation: String,
        after: Duration,
    },
    Promise {
        leaf: String,
        index: usize,
        outcome: Result<Value, Value>,
        timed_out: Option<Duration>,
    },
}

impl Inner {
    pub(crate) fn cancel_race(&self) {
        if let Some(race) = self.race.lock().take() {
            race.abort();
        }
    }

    /// Start every `after` delay and promise of the active leaves.
    pub(crate) fn launch_race(self: &Arc<Self>) {
        let (epoch, nodes) = {
            let mut core = self.core.lock();
            core.epoch += 1;
            let nodes: Vec<_> = active_leaves(&core.config)
                .into_iter()
                .filter_map(|leaf| core.flat.get(&leaf).cloned().map(|node| (leaf, node)))
                .filter(|(_, node)| !node.after.is_empty() || !node.promises.is_empty())
                .collect();
            (core.epoch, nodes)
        };
        if nodes.is_empty() {
            return;
        }
        // Checked before any promise source is invoked.
        let Ok(handle) = Handle::try_current() else {
            self.error(Diagnostic::NoRuntime {
                operation: "delayed transitions".to_string(),
            });
            return;
        };

        let race: FuturesUnordered<BoxFuture<'static, Settlement>> = FuturesUnordered::new();
        for (leaf, node) in &nodes {
            for key in node.after.keys() {
                if let Some(delay) = self.delay_for_key(key) {
                    race.push(self.after(leaf, key, delay));
                }
            }
            for (index, promise) in node.promises.iter().enumerate() {
                if let Some(future) = self.promise(leaf, index, promise) {
                    race.push(future);
                }
            }
        }
        if race.is_empty() {
            return;
        }

        let weak = Arc::downgrade(self);
        let task = handle.spawn(async move {
            let mut race = race;
            while let Some(settlement) = race.next().await {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let (reply, keep_racing) = oneshot::channel();
                let target = inner.clone();
                inner.scheduler.schedule(Box::new(move || {
                    let _ = reply.send(target.settle(epoch, settlement));
                }));
                drop(inner);

                if !matches!(keep_racing.await, Ok(true)) {
                    return;
                }
            }
        });
        *self.race.lock() = Some(task);
    }

    fn after(&self, leaf: &str, key: &str, delay: Duration) -> BoxFuture<'static, Settlement> {
        let max = self.config.max_time_promise;
        let (leaf, key) = (leaf.to_string(), key.to_string());
        async move {
            match tokio::time::timeout(max, tokio::time::sleep(delay)).await {
                Ok(()) => Settlement::After { leaf, key },
                Err(_) => Settlement::Expired {
                    operation: format!("after ({key}) of {leaf}"),
                    after: max,
                },
            }
        }
        .boxed()
    }

    fn promise(
        &self,
        leaf: &str,
        index: usize,
        promise: &PromiseConfig,
    ) -> Option<BoxFuture<'static, Settlement>> {
        let Some(src) = self.machine.resolve_promise(&promise.src) else {
            self.warn(Diagnostic::UnresolvedPromise {
                name: promise.src.label().to_string(),
            });
            return None;
        };
        let max = promise
            .max
            .as_ref()
            .and_then(|max| self.delay_of(max))
            .unwrap_or(self.config.max_time_promise);

        let work = src(self.snapshot());
        let leaf = leaf.to_string();
        Some(
            async move {
                let (outcome, timed_out) = match tokio::time::timeout(max, work).await {
                    Ok(outcome) => (outcome, None),
                    Err(_) => {
                        let millis = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
                        (Err(json!({ "timeout": millis })), Some(max))
                    }
                };
                Settlement::Promise {
                    leaf,
                    index,
                    outcome,
                    timed_out,
                }
            }
            .boxed(),
        )
    }

    /// Apply one settlement. Returns whether the race goes on.
    pub(crate) fn settle(self: &Arc<Self>, epoch: u64, settlement: Settlement) -> bool {
        let before = {
            let core = self.core.lock();
            if core.epoch != epoch || matches!(core.status, Status::Stopped | Status::Sending) {
                tracing::debug!(id = %self.id, "settlement abandoned");
                return false;
            }
            core.value.clone()
        };

        match settlement {
            Settlement::Expired { operation, after } => {
                self.warn(Diagnostic::Timeout { operation, after });
                return true;
            }
            Settlement::After { leaf, key } => {
                let transitions = self
                    .core
                    .lock()
                    .flat
                    .get(&leaf)
                    .and_then(|node| node.after.get(&key))
                    .cloned();
                let Some(transitions) = transitions else {
                    return true;
                };
                self.fire_first(&transitions);
            }
            Settlement::Promise {
                leaf,
                index,
                outcome,
                timed_out,
            } => {
                let promise = self
                    .core
                    .lock()
                    .flat
                    .get(&leaf)
                    .and_then(|node| node.promises.get(index))
                    .cloned();
                let Some(promise) = promise else {
                    return true;
                };
                if let Some(after) = timed_out {
                    self.warn(Diagnostic::Timeout {
                        operation: format!("promise ({})", promise.id),
                        after,
                    });
                }

                let (suffix, payload, transitions) = match outcome {
                    Ok(payload) => ("then", payload, &promise.then),
                    Err(payload) => ("catch", payload, &promise.catch),
                };
                self.core.lock().event =
                    Event::with_payload(format!("{}::{suffix}", promise.id), payload);
                self.fire_first(transitions);
                self.run_items(&promise.finally);
            }
        }

        let changed = self.core.lock().value != before;
        if changed {
            if !self.count_self_transition() {
                return false;
            }
            self.next();
            self.notify();
            return false;
        }
        self.notify();
        true
    }
}
