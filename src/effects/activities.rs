//! Periodic activities of the active leaves.
//!
//! Each activity owns an interval task that is spawned when its leaf is
//! entered and aborted when the leaf exits. While the leaf stays active the
//! task is only switched on and off through its gate, so pausing never
//! loses the interval's phase.

use super::interpreter::Inner;
use crate::core::{active_leaves, Status};
use crate::diagnostics::Diagnostic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

/// Whether ticks of an activity are delivered.
#[derive(Debug)]
pub(crate) struct ActivityGate {
    active: AtomicBool,
}

impl ActivityGate {
    pub(crate) fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
        }
    }

    pub(crate) fn activate(&self) {
        self.active.store(true, Ordering::Release);
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

pub(crate) struct Activity {
    gate: Arc<ActivityGate>,
    task: JoinHandle<()>,
}

fn activity_id(leaf: &str, key: &str) -> String {
    format!("{leaf}::{key}")
}

fn owned_by_any(id: &str, leaves: &[String]) -> bool {
    id.split_once("::")
        .is_some_and(|(leaf, _)| leaves.iter().any(|l| l == leaf))
}

impl Inner {
    /// Switch every activity off, abort those of exited leaves, then switch
    /// the rest on again, spawning those seen for the first time.
    pub(crate) fn activities_round(self: &Arc<Self>) {
        self.pause_activities();

        let leaves: Vec<(String, Vec<String>)> = {
            let mut core = self.core.lock();
            let leaves = active_leaves(&core.config);
            core.stopped_activities.retain(|id| owned_by_any(id, &leaves));
            self.activities.lock().retain(|id, activity| {
                let kept = owned_by_any(id, &leaves);
                if !kept {
                    activity.task.abort();
                }
                kept
            });
            leaves
                .into_iter()
                .filter_map(|leaf| {
                    let keys: Vec<String> = core.flat.get(&leaf)?.activities.keys().cloned().collect();
                    Some((leaf, keys))
                })
                .filter(|(_, keys)| !keys.is_empty())
                .collect()
        };

        for (leaf, keys) in leaves {
            for key in keys {
                let id = activity_id(&leaf, &key);
                if let Some(activity) = self.activities.lock().get(&id) {
                    activity.gate.activate();
                    continue;
                }
                if self.core.lock().stopped_activities.contains(&id) {
                    continue;
                }
                self.spawn_activity(id, &leaf, &key);
            }
        }
    }

    fn spawn_activity(self: &Arc<Self>, id: String, leaf: &str, key: &str) {
        let Some(delay) = self.delay_for_key(key) else {
            return;
        };
        if delay.is_zero() || delay < self.config.min_activity_time {
            self.warn(Diagnostic::DelayTooShort {
                name: key.to_string(),
                delay,
            });
            return;
        }
        if delay > self.config.max_time_promise {
            self.warn(Diagnostic::DelayTooLong {
                name: key.to_string(),
                delay,
            });
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            self.error(Diagnostic::NoRuntime {
                operation: format!("activity ({id})"),
            });
            return;
        };

        let gate = Arc::new(ActivityGate::new(true));
        let task = handle.spawn(tick(
            Arc::downgrade(self),
            gate.clone(),
            leaf.to_string(),
            key.to_string(),
            delay,
        ));
        tracing::debug!(id = %self.id, activity = %id, ?delay, "activity started");
        self.activities.lock().insert(id, Activity { gate, task });
    }

    /// One tick of an activity, run as a scheduler task.
    fn tick_activity(self: &Arc<Self>, leaf: &str, key: &str) {
        if !self.activities.lock().contains_key(&activity_id(leaf, key)) {
            return;
        }
        let items = {
            let core = self.core.lock();
            if core.status == Status::Stopped {
                return;
            }
            core.flat
                .get(leaf)
                .and_then(|node| node.activities.get(key))
                .cloned()
        };
        if let Some(items) = items {
            self.run_items(&items);
            self.notify();
        }
    }

    pub(crate) fn pause_activities(&self) {
        for activity in self.activities.lock().values() {
            activity.gate.deactivate();
        }
    }

    pub(crate) fn stop_activities(&self) {
        let activities = std::mem::take(&mut *self.activities.lock());
        for activity in activities.into_values() {
            activity.task.abort();
        }
    }

    pub(crate) fn pause_activity(&self, id: &str) {
        if let Some(activity) = self.activities.lock().get(id) {
            activity.gate.deactivate();
        }
    }

    pub(crate) fn resume_activity(&self, id: &str) {
        if let Some(activity) = self.activities.lock().get(id) {
            activity.gate.activate();
        }
    }

    /// Abort an activity; it is not restarted while its leaf stays active.
    pub(crate) fn stop_activity(&self, id: &str) {
        if let Some(activity) = self.activities.lock().remove(id) {
            activity.task.abort();
        }
        self.core.lock().stopped_activities.insert(id.to_string());
    }
}

async fn tick(
    owner: std::sync::Weak<Inner>,
    gate: Arc<ActivityGate>,
    leaf: String,
    key: String,
    delay: Duration,
) {
    let mut interval = interval_at(Instant::now() + delay, delay);
    loop {
        interval.tick().await;
        if !gate.is_active() {
            continue;
        }
        let Some(inner) = owner.upgrade() else {
            return;
        };
        let (target, leaf, key) = (inner.clone(), leaf.clone(), key.clone());
        inner
            .scheduler
            .schedule(Box::new(move || target.tick_activity(&leaf, &key)));
    }
}
