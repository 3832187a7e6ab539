//! The imperative shell around the pure core.
//!
//! This module runs machines: it owns the scheduler serializing every side
//! effect, the transition resolver, and the [`Interpreter`] driving
//! actions, activities, timers, child services and the race of delayed and
//! promise-driven self-transitions.
//!
//! # Key Concepts
//!
//! - **Scheduler**: Non-reentrant FIFO queue; nothing runs concurrently
//! - **Resolver**: Picks and orders the transitions an event selects
//! - **Interpreter**: Lifecycle, dispatch and notification of one running machine
//!
//! Asynchronous work (activities, timers, delays, promises) is spawned on
//! the ambient tokio runtime. Without one, it is reported as an error and
//! skipped; purely synchronous machines need no runtime at all.

mod activities;
mod children;
mod error;
mod interpreter;
mod promises;
mod resolver;
mod scheduler;
mod step;
mod subscription;
mod timers;

pub use error::InterpreterError;
pub use interpreter::{CallCounts, Interpreter};
pub use resolver::{candidates, resolve, TransitionHost};
pub use scheduler::{Scheduler, SchedulerStatus, Task};
pub use subscription::{Equality, Listener, SubscribeOptions, Subscriber, Subscription};
