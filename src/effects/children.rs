//! Child services spawned alongside an interpreter.
//!
//! A child runs its own scheduler. Its snapshots are copied into the
//! parent's private context through the child's context links, as a task
//! of the parent's scheduler.

use super::interpreter::{Inner, Interpreter};
use super::subscription::{SubscribeOptions, Subscriber};
use crate::core::{merge, nest, select, StateSnapshot, Status};
use std::sync::Arc;

impl Inner {
    pub(crate) fn spawn_children(self: &Arc<Self>) {
        for (id, child) in &self.machine.options().children {
            let service = Interpreter::with_config(child.machine.clone(), self.config.clone());

            let parent = Arc::downgrade(self);
            let filter = child.events.clone();
            let child_id = id.clone();
            service.subscribe(
                Subscriber::new(move |snapshot| {
                    if !filter.matches(&snapshot.event.kind) {
                        return;
                    }
                    let Some(parent) = parent.upgrade() else {
                        return;
                    };
                    let (target, id, snapshot) = (parent.clone(), child_id.clone(), snapshot.clone());
                    parent
                        .scheduler
                        .schedule(Box::new(move || target.merge_child(&id, &snapshot)));
                }),
                SubscribeOptions::new().id(format!("{}::{id}", self.id)),
            );

            self.children.lock().insert(id.clone(), service.clone());
            tracing::debug!(id = %self.id, child = %id, "starting child");
            if let Err(error) = service.start() {
                tracing::error!(id = %self.id, child = %id, %error, "child failed to start");
            }
        }
    }

    /// Copy the linked parts of a child's context into the private context.
    fn merge_child(&self, id: &str, snapshot: &StateSnapshot) {
        let Some(child) = self.machine.options().children.get(id) else {
            return;
        };
        {
            let mut core = self.core.lock();
            if core.status == Status::Stopped {
                return;
            }
            for link in child.links() {
                let value = match &link.from {
                    Some(from) => match select(&snapshot.context, from) {
                        Some(value) => value.clone(),
                        None => continue,
                    },
                    None => snapshot.context.clone(),
                };
                let value = match &link.to {
                    Some(to) => nest(to, value),
                    None => value,
                };
                merge(&mut core.p_context, value);
            }
        }
        self.notify();
    }
}
