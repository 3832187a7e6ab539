//! Non-reentrant FIFO task queue.
//!
//! Every side effect of an interpreter runs as a scheduler task. A task
//! scheduled while another one is running is queued and only runs after it,
//! so no two tasks ever interleave.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Unit of work run by the [`Scheduler`].
pub type Task = Box<dyn FnOnce() + Send>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SchedulerStatus {
    #[default]
    Idle,
    Initialized,
    Working,
    Processing,
    Paused,
    Stopped,
}

struct State {
    status: SchedulerStatus,
    queue: VecDeque<Task>,
}

/// Serializes tasks. The internal lock is never held while a task runs,
/// so tasks may schedule further tasks.
///
/// # Example
///
/// ```rust
/// use statecharts::effects::Scheduler;
/// use std::sync::Arc;
/// use parking_lot::Mutex;
///
/// let scheduler = Arc::new(Scheduler::new());
/// let order = Arc::new(Mutex::new(Vec::new()));
///
/// scheduler.initialize(None);
/// let (inner, log) = (scheduler.clone(), order.clone());
/// scheduler.schedule(Box::new(move || {
///     let log2 = log.clone();
///     inner.schedule(Box::new(move || log2.lock().push("nested")));
///     log.lock().push("outer");
/// }));
///
/// assert_eq!(*order.lock(), vec!["outer", "nested"]);
/// assert_eq!(scheduler.performeds(), 2);
/// ```
pub struct Scheduler {
    state: Mutex<State>,
    performeds: AtomicUsize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                status: SchedulerStatus::Idle,
                queue: VecDeque::new(),
            }),
            performeds: AtomicUsize::new(0),
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        self.state.lock().status
    }

    /// Number of tasks run so far.
    pub fn performeds(&self) -> usize {
        self.performeds.load(Ordering::SeqCst)
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Leave the idle state, run `callback` if given, then drain whatever
    /// was queued meanwhile. Only the first call has any effect.
    pub fn initialize(&self, callback: Option<Task>) {
        {
            let mut state = self.state.lock();
            if state.status != SchedulerStatus::Idle {
                return;
            }
            state.status = SchedulerStatus::Initialized;
        }
        if let Some(callback) = callback {
            self.state.lock().status = SchedulerStatus::Processing;
            self.perform(callback);
        }
        self.flush();
    }

    /// Run `task` now when nothing else is running, queue it otherwise.
    /// Tasks scheduled after [`Scheduler::stop`] are dropped.
    pub fn schedule(&self, task: Task) {
        {
            let mut state = self.state.lock();
            match state.status {
                SchedulerStatus::Stopped => return,
                SchedulerStatus::Processing | SchedulerStatus::Idle | SchedulerStatus::Paused => {
                    state.queue.push_back(task);
                    return;
                }
                SchedulerStatus::Initialized | SchedulerStatus::Working => {
                    state.status = SchedulerStatus::Processing;
                }
            }
        }
        self.perform(task);
        self.flush();
    }

    /// Stop draining; queued tasks are kept.
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if state.status != SchedulerStatus::Stopped {
            state.status = SchedulerStatus::Paused;
        }
    }

    /// Drain the tasks queued while paused.
    pub fn resume(&self) {
        {
            let mut state = self.state.lock();
            if state.status != SchedulerStatus::Paused {
                return;
            }
            state.status = SchedulerStatus::Processing;
        }
        self.flush();
    }

    /// Drop every queued task; the scheduler never runs anything again.
    pub fn stop(&self) {
        let dropped = {
            let mut state = self.state.lock();
            state.status = SchedulerStatus::Stopped;
            std::mem::take(&mut state.queue)
        };
        drop(dropped);
    }

    fn perform(&self, task: Task) {
        task();
        self.performeds.fetch_add(1, Ordering::SeqCst);
    }

    fn flush(&self) {
        loop {
            let task = {
                let mut state = self.state.lock();
                match state.status {
                    SchedulerStatus::Paused | SchedulerStatus::Stopped => return,
                    _ => {}
                }
                match state.queue.pop_front() {
                    Some(task) => {
                        state.status = SchedulerStatus::Processing;
                        task
                    }
                    None => {
                        state.status = SchedulerStatus::Working;
                        return;
                    }
                }
            };
            self.perform(task);
        }
    }
}
