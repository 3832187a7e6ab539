//! Named one-shot timers backing debounced outputs.

use super::interpreter::Inner;
use crate::core::{ActionOutput, Debounce};
use crate::diagnostics::Diagnostic;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub(crate) struct Timer {
    output: ActionOutput,
    deadline: Instant,
    /// Time left, set while paused.
    remaining: Option<Duration>,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl Timer {
    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Inner {
    /// Restart the timer `id`; its output is applied when it elapses.
    pub(crate) fn debounce(self: &Arc<Self>, debounce: Debounce) {
        let Debounce { id, delay, output } = debounce;
        if let Some(mut previous) = self.timers.lock().remove(&id) {
            previous.abort();
        }

        let generation = {
            let mut core = self.core.lock();
            core.timer_generation += 1;
            core.timer_generation
        };
        let Some(task) = self.spawn_timer(&id, generation, delay) else {
            return;
        };
        self.timers.lock().insert(
            id,
            Timer {
                output,
                deadline: Instant::now() + delay,
                remaining: None,
                generation,
                task: Some(task),
            },
        );
    }

    fn spawn_timer(self: &Arc<Self>, id: &str, generation: u64, delay: Duration) -> Option<JoinHandle<()>> {
        let Ok(handle) = Handle::try_current() else {
            self.error(Diagnostic::NoRuntime {
                operation: format!("timer ({id})"),
            });
            return None;
        };
        let weak = Arc::downgrade(self);
        let id = id.to_string();
        Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                let target = inner.clone();
                inner
                    .scheduler
                    .schedule(Box::new(move || target.fire_timer(&id, generation)));
            }
        }))
    }

    fn fire_timer(self: &Arc<Self>, id: &str, generation: u64) {
        let output = {
            let mut timers = self.timers.lock();
            match timers.get(id) {
                Some(timer) if timer.generation == generation && timer.remaining.is_none() => {
                    timers.remove(id).map(|timer| timer.output)
                }
                _ => None,
            }
        };
        if let Some(output) = output {
            tracing::debug!(id = %self.id, timer = %id, "timer elapsed");
            self.apply_output(output);
            self.notify();
        }
    }

    pub(crate) fn pause_timer(&self, id: &str) {
        if let Some(timer) = self.timers.lock().get_mut(id) {
            if timer.remaining.is_none() {
                timer.remaining = Some(timer.deadline.saturating_duration_since(Instant::now()));
                timer.abort();
            }
        }
    }

    pub(crate) fn resume_timer(self: &Arc<Self>, id: &str) {
        let paused = self
            .timers
            .lock()
            .get(id)
            .and_then(|timer| timer.remaining.map(|left| (left, timer.generation)));
        let Some((left, generation)) = paused else {
            return;
        };
        let task = self.spawn_timer(id, generation, left);
        if let Some(timer) = self.timers.lock().get_mut(id) {
            timer.deadline = Instant::now() + left;
            timer.remaining = None;
            timer.task = task;
        }
    }

    pub(crate) fn stop_timer(&self, id: &str) {
        if let Some(mut timer) = self.timers.lock().remove(id) {
            timer.abort();
        }
    }

    pub(crate) fn pause_timers(&self) {
        let ids: Vec<String> = self.timers.lock().keys().cloned().collect();
        for id in ids {
            self.pause_timer(&id);
        }
    }

    pub(crate) fn resume_timers(self: &Arc<Self>) {
        let ids: Vec<String> = self.timers.lock().keys().cloned().collect();
        for id in ids {
            self.resume_timer(&id);
        }
    }

    pub(crate) fn stop_timers(&self) {
        let timers = std::mem::take(&mut *self.timers.lock());
        for mut timer in timers.into_values() {
            timer.abort();
        }
    }
}
