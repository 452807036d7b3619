//! Subscription registry
//!
//! Observers are kept in registration order. A notification pass first copies
//! the current observer list and then calls each observer outside the lock, so
//! observers may subscribe, unsubscribe, or send further events while the pass
//! is running. Such changes only affect later passes.

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use crate::{lock, StoreError};

new_key_type! {
    /// Identifier for a registered observer
    pub struct ObserverId;
}

type NextFn<T, E> = Box<dyn Fn(&T, &E) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&StoreError) + Send + Sync>;
type CompleteFn = Box<dyn Fn() + Send + Sync>;

/// Panic payload captured from an observer callback
pub(crate) type PanicPayload = Box<dyn Any + Send>;

/// A listener with optional `next`, `error` and `complete` callbacks
pub struct Observer<T, E> {
    next: Option<NextFn<T, E>>,
    error: Option<ErrorFn>,
    complete: Option<CompleteFn>,
}

impl<T, E> Observer<T, E> {
    /// An observer with no callbacks
    pub fn new() -> Self {
        Self {
            next: None,
            error: None,
            complete: None,
        }
    }

    /// An observer with only a `next` callback
    pub fn from_next<F>(next: F) -> Self
    where
        F: Fn(&T, &E) + Send + Sync + 'static,
    {
        Self::new().on_next(next)
    }

    /// Set the `next` callback
    pub fn on_next<F>(mut self, next: F) -> Self
    where
        F: Fn(&T, &E) + Send + Sync + 'static,
    {
        self.next = Some(Box::new(next));
        self
    }

    /// Set the `error` callback
    pub fn on_error<F>(mut self, error: F) -> Self
    where
        F: Fn(&StoreError) + Send + Sync + 'static,
    {
        self.error = Some(Box::new(error));
        self
    }

    /// Set the `complete` callback
    pub fn on_complete<F>(mut self, complete: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.complete = Some(Box::new(complete));
        self
    }

    /// Deliver a value, if a `next` callback is set
    pub fn next(&self, value: &T, event: &E) {
        if let Some(next) = &self.next {
            next(value, event);
        }
    }

    /// Deliver an error, if an `error` callback is set
    pub fn error(&self, err: &StoreError) {
        if let Some(error) = &self.error {
            error(err);
        }
    }

    /// Signal completion, if a `complete` callback is set
    pub fn complete(&self) {
        if let Some(complete) = &self.complete {
            complete();
        }
    }
}

impl<T, E> Default for Observer<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E, F> From<F> for Observer<T, E>
where
    F: Fn(&T, &E) + Send + Sync + 'static,
{
    fn from(next: F) -> Self {
        Observer::from_next(next)
    }
}

impl<T, E> fmt::Debug for Observer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("next", &self.next.is_some())
            .field("error", &self.error.is_some())
            .field("complete", &self.complete.is_some())
            .finish()
    }
}

/// Type-erased removal, so subscriptions do not carry the registry's types
pub(crate) trait DetachObserver: Send + Sync {
    fn detach(&self, id: ObserverId) -> bool;
    fn is_registered(&self, id: ObserverId) -> bool;
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle does not remove the observer; call
/// [`Subscription::unsubscribe`].
#[derive(Clone)]
pub struct Subscription {
    id: ObserverId,
    registry: Weak<dyn DetachObserver>,
}

impl Subscription {
    /// Id of the observer this handle removes
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Remove the observer. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.detach(self.id) {
                tracing::trace!("observer {:?} unsubscribed", self.id);
            }
        }
    }

    /// Whether the observer is no longer registered
    pub fn is_closed(&self) -> bool {
        self.registry
            .upgrade()
            .map_or(true, |registry| !registry.is_registered(self.id))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct Slots<T, E> {
    observers: SlotMap<ObserverId, Arc<Observer<T, E>>>,
    /// Registration order
    order: Vec<ObserverId>,
}

/// Ordered set of observers for one store
pub(crate) struct ObserverRegistry<T, E> {
    slots: Mutex<Slots<T, E>>,
}

impl<T, E> ObserverRegistry<T, E>
where
    T: 'static,
    E: 'static,
{
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(Slots {
                observers: SlotMap::with_key(),
                order: Vec::new(),
            }),
        })
    }

    pub(crate) fn register(self: &Arc<Self>, observer: Observer<T, E>) -> Subscription {
        let id = {
            let mut slots = lock(&self.slots);
            let id = slots.observers.insert(Arc::new(observer));
            slots.order.push(id);
            id
        };
        tracing::trace!("observer {:?} subscribed", id);

        let registry: Weak<Self> = Arc::downgrade(self);
        Subscription { id, registry }
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.slots).order.len()
    }

    /// Deliver `(value, event)` to every observer registered at call time.
    ///
    /// A panicking observer does not stop the pass. Returns the payload of the
    /// first panic, if any, after every observer has been called.
    pub(crate) fn notify(&self, value: &T, event: &E) -> Option<PanicPayload> {
        let pass: SmallVec<[(ObserverId, Arc<Observer<T, E>>); 8]> = {
            let slots = lock(&self.slots);
            slots
                .order
                .iter()
                .filter_map(|id| slots.observers.get(*id).map(|o| (*id, Arc::clone(o))))
                .collect()
        };

        let mut first_panic = None;
        for (id, observer) in pass {
            let result = panic::catch_unwind(AssertUnwindSafe(|| observer.next(value, event)));
            if let Err(payload) = result {
                tracing::error!(
                    "observer {:?} panicked during notification: {}",
                    id,
                    panic_message(&payload)
                );
                first_panic.get_or_insert(payload);
            }
        }
        first_panic
    }
}

impl<T, E> DetachObserver for ObserverRegistry<T, E>
where
    T: 'static,
    E: 'static,
{
    fn detach(&self, id: ObserverId) -> bool {
        let mut slots = lock(&self.slots);
        if slots.observers.remove(id).is_none() {
            return false;
        }
        slots.order.retain(|registered| *registered != id);
        true
    }

    fn is_registered(&self, id: ObserverId) -> bool {
        lock(&self.slots).observers.contains_key(id)
    }
}

pub(crate) fn panic_message(payload: &PanicPayload) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
