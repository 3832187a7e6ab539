//! Subscribers notified of snapshot changes.

use crate::core::StateSnapshot;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Callback receiving a snapshot.
pub type Listener = Arc<dyn Fn(&StateSnapshot) + Send + Sync>;

/// Returns true when two snapshots count as equal, suppressing the
/// notification.
pub type Equality = Arc<dyn Fn(&StateSnapshot, &StateSnapshot) -> bool + Send + Sync>;

/// Who gets called on a change.
///
/// # Example
///
/// ```rust
/// use statecharts::effects::Subscriber;
///
/// let subscriber = Subscriber::by_event()
///     .on("SWITCH", |s| println!("switched to {}", s.value))
///     .otherwise(|_| {});
/// # let _ = subscriber;
/// ```
#[derive(Clone)]
pub enum Subscriber {
    /// Called on every change.
    All(Listener),
    /// Called with the handler matching the last event kind, or the
    /// fallback when none matches.
    ByEvent {
        handlers: BTreeMap<String, Listener>,
        fallback: Option<Listener>,
    },
}

impl Subscriber {
    pub fn new<F>(listener: F) -> Self
    where
        F: Fn(&StateSnapshot) + Send + Sync + 'static,
    {
        Self::All(Arc::new(listener))
    }

    pub fn by_event() -> Self {
        Self::ByEvent {
            handlers: BTreeMap::new(),
            fallback: None,
        }
    }

    /// Add a handler for one event kind. Turns an `All` subscriber into
    /// a keyed one that falls back to the original listener.
    pub fn on<F>(self, kind: impl Into<String>, listener: F) -> Self
    where
        F: Fn(&StateSnapshot) + Send + Sync + 'static,
    {
        let (mut handlers, fallback) = self.into_parts();
        handlers.insert(kind.into(), Arc::new(listener));
        Self::ByEvent { handlers, fallback }
    }

    /// Handler used when no kind matches.
    pub fn otherwise<F>(self, listener: F) -> Self
    where
        F: Fn(&StateSnapshot) + Send + Sync + 'static,
    {
        let (handlers, _) = self.into_parts();
        Self::ByEvent {
            handlers,
            fallback: Some(Arc::new(listener)),
        }
    }

    fn into_parts(self) -> (BTreeMap<String, Listener>, Option<Listener>) {
        match self {
            Self::All(listener) => (BTreeMap::new(), Some(listener)),
            Self::ByEvent { handlers, fallback } => (handlers, fallback),
        }
    }

    fn listener_for(&self, kind: &str) -> Option<Listener> {
        match self {
            Self::All(listener) => Some(listener.clone()),
            Self::ByEvent { handlers, fallback } => {
                handlers.get(kind).or(fallback.as_ref()).cloned()
            }
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All(_) => f.write_str("All(..)"),
            Self::ByEvent { handlers, fallback } => f
                .debug_struct("ByEvent")
                .field("handlers", &handlers.keys().collect::<Vec<_>>())
                .field("fallback", &fallback.is_some())
                .finish(),
        }
    }
}

#[derive(Clone, Default)]
pub struct SubscribeOptions {
    /// Generated when absent.
    pub id: Option<String>,
    /// Defaults to structural equality.
    pub equals: Option<Equality>,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn equals<F>(mut self, equals: F) -> Self
    where
        F: Fn(&StateSnapshot, &StateSnapshot) -> bool + Send + Sync + 'static,
    {
        self.equals = Some(Arc::new(equals));
        self
    }
}

pub(crate) struct Entry {
    id: String,
    subscriber: Subscriber,
    equals: Option<Equality>,
    open: bool,
    /// Last snapshot this subscriber was handed.
    last: Option<StateSnapshot>,
}

impl Entry {
    fn changed(&self, current: &StateSnapshot) -> bool {
        match (&self.last, &self.equals) {
            (None, _) => true,
            (Some(last), Some(equals)) => !equals(last, current),
            (Some(last), None) => last != current,
        }
    }
}

/// Subscribers of one interpreter, in subscription order.
#[derive(Clone, Default)]
pub(crate) struct Registry {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl Registry {
    pub(crate) fn add(&self, subscriber: Subscriber, options: SubscribeOptions) -> Subscription {
        let id = options
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.entries.lock().push(Entry {
            id: id.clone(),
            subscriber,
            equals: options.equals,
            open: true,
            last: None,
        });
        Subscription {
            id,
            entries: Arc::downgrade(&self.entries),
        }
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Call every open subscriber that considers `current` a change from
    /// the last snapshot it was handed. A first delivery always counts as
    /// a change.
    pub(crate) fn notify(&self, current: &StateSnapshot) {
        let listeners: Vec<Listener> = self
            .entries
            .lock()
            .iter_mut()
            .filter(|entry| entry.open && entry.changed(current))
            .filter_map(|entry| {
                let listener = entry.subscriber.listener_for(&current.event.kind)?;
                entry.last = Some(current.clone());
                Some(listener)
            })
            .collect();

        for listener in listeners {
            listener(current);
        }
    }
}

/// Handle to a registered subscriber.
pub struct Subscription {
    id: String,
    entries: Weak<Mutex<Vec<Entry>>>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stop delivering without unregistering.
    pub fn close(&self) {
        self.set_open(false);
    }

    /// Resume delivery after [`Subscription::close`].
    pub fn open(&self) {
        self.set_open(true);
    }

    pub fn is_open(&self) -> bool {
        self.entries.upgrade().is_some_and(|entries| {
            entries
                .lock()
                .iter()
                .any(|entry| entry.id == self.id && entry.open)
        })
    }

    pub fn unsubscribe(self) {
        if let Some(entries) = self.entries.upgrade() {
            entries.lock().retain(|entry| entry.id != self.id);
        }
    }

    fn set_open(&self, open: bool) {
        if let Some(entries) = self.entries.upgrade() {
            for entry in entries.lock().iter_mut().filter(|e| e.id == self.id) {
                entry.open = open;
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Event, StateValue, Status};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(kind: &str, n: i64) -> StateSnapshot {
        StateSnapshot {
            p_context: json!({}),
            context: json!({ "n": n }),
            event: Event::new(kind),
            status: Status::Working,
            value: StateValue::leaf("idle"),
            tags: Vec::new(),
        }
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&StateSnapshot) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = count.clone();
        (count, move |_: &StateSnapshot| {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn unchanged_snapshots_are_not_delivered() {
        let registry = Registry::default();
        let (count, listener) = counter();
        registry.add(Subscriber::new(listener), SubscribeOptions::new());

        let first = snapshot("A", 1);
        registry.notify(&first);
        registry.notify(&first);
        registry.notify(&snapshot("A", 2));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn custom_equality_controls_delivery() {
        let registry = Registry::default();
        let (count, listener) = counter();
        registry.add(
            Subscriber::new(listener),
            SubscribeOptions::new().equals(|a, b| a.value == b.value),
        );

        registry.notify(&snapshot("A", 1));
        registry.notify(&snapshot("A", 2));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reopened_subscriber_compares_with_what_it_last_saw() {
        let registry = Registry::default();
        let (count, listener) = counter();
        let subscription = registry.add(
            Subscriber::new(listener),
            SubscribeOptions::new().equals(|a, b| a.value == b.value),
        );

        registry.notify(&snapshot("A", 1));
        subscription.close();
        let mut busy = snapshot("A", 1);
        busy.value = StateValue::leaf("busy");
        registry.notify(&busy);
        subscription.open();
        registry.notify(&busy);
        registry.notify(&busy);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn keyed_subscriber_uses_fallback() {
        let registry = Registry::default();
        let (switched, on_switch) = counter();
        let (others, fallback) = counter();
        registry.add(
            Subscriber::by_event().on("SWITCH", on_switch).otherwise(fallback),
            SubscribeOptions::new(),
        );

        registry.notify(&snapshot("SWITCH", 1));
        registry.notify(&snapshot("OTHER", 1));
        registry.notify(&snapshot("OTHER", 2));
        assert_eq!(switched.load(Ordering::SeqCst), 1);
        assert_eq!(others.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn closed_subscription_is_skipped_until_reopened() {
        let registry = Registry::default();
        let (count, listener) = counter();
        let subscription = registry.add(Subscriber::new(listener), SubscribeOptions::new().id("s1"));
        assert_eq!(subscription.id(), "s1");

        subscription.close();
        assert!(!subscription.is_open());
        registry.notify(&snapshot("A", 1));
        subscription.open();
        registry.notify(&snapshot("A", 1));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        subscription.unsubscribe();
        assert_eq!(registry.len(), 0);
    }
}
