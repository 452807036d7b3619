//! Store runtime
//!
//! A [`Store`] owns one current [`StoreSnapshot`] and a table of assigners keyed
//! by event type. [`Store::send`] runs the whole dispatch synchronously:
//!
//! 1. resolve the assigner for the event's type into the next context
//! 2. wrap it in a new snapshot (or keep the old one if nothing changed)
//! 3. swap the current snapshot
//! 4. notify observers in subscription order with `(snapshot, event)`
//!
//! Dispatches are serialized across threads: a `send` from another thread
//! waits until the running dispatch has notified every observer. The dispatch
//! lock is reentrant, so an assigner or observer may call `send` again on the
//! same thread. A nested `send` finishes, notifications included, before the
//! outer call moves on to its remaining observers.

use parking_lot::ReentrantMutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::panic;
use std::sync::{Arc, Mutex, Weak};

use crate::assigner::{Assigner, FieldAssigners};
use crate::config::{ObserverPanicPolicy, StoreConfig};
use crate::event::EventObject;
use crate::interop::{InteropObservable, ObservableAdapter, Subscribable};
use crate::observer::{Observer, ObserverRegistry, Subscription};
use crate::snapshot::{Snapshot, StoreSnapshot};
use crate::{lock, StoreError};

/// Builder for creating stores
pub struct StoreBuilder<C, E> {
    context: C,
    transitions: Vec<(String, Assigner<C, E>)>,
    config: StoreConfig,
}

impl<C, E> StoreBuilder<C, E>
where
    C: Clone + Send + Sync + 'static,
    E: EventObject + 'static,
{
    /// Start a builder from the initial context
    pub fn new(context: C) -> Self {
        Self {
            context,
            transitions: Vec::new(),
            config: StoreConfig::default(),
        }
    }

    /// Register the assigner for an event type
    pub fn on(
        mut self,
        event_type: impl Into<String>,
        assigner: impl Into<Assigner<C, E>>,
    ) -> Self {
        self.transitions.push((event_type.into(), assigner.into()));
        self
    }

    /// Register a property assigner built from per-field rules
    pub fn on_fields<F>(self, event_type: impl Into<String>, fields: F) -> Self
    where
        F: FnOnce(FieldAssigners<C, E>) -> FieldAssigners<C, E>,
    {
        self.on(event_type, fields(FieldAssigners::new()))
    }

    /// Set the store configuration
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the transition table and create the store
    pub fn build(self) -> Result<Store<C, E>, StoreError> {
        let known = E::known_event_types();
        let mut transitions =
            FxHashMap::with_capacity_and_hasher(self.transitions.len(), Default::default());

        for (event_type, assigner) in self.transitions {
            if event_type.is_empty() {
                return Err(StoreError::EmptyEventType);
            }
            if !known.is_empty() && !known.contains(&event_type.as_str()) {
                return Err(StoreError::UnknownEventType(event_type));
            }
            if transitions.contains_key(&event_type) {
                return Err(StoreError::DuplicateTransition(event_type));
            }
            transitions.insert(event_type, assigner);
        }

        let initial = Arc::new(Snapshot::active(self.context));
        tracing::debug!(
            "{}: created with {} transition(s)",
            self.config.label(),
            transitions.len()
        );

        Ok(Store {
            inner: Arc::new(StoreInner {
                config: self.config,
                transitions,
                current: Mutex::new(Arc::clone(&initial)),
                initial,
                dispatch: ReentrantMutex::new(()),
                observers: ObserverRegistry::new(),
            }),
        })
    }
}

struct StoreInner<C, E> {
    config: StoreConfig,
    transitions: FxHashMap<String, Assigner<C, E>>,
    /// Snapshot built from the original context; never replaced
    initial: Arc<StoreSnapshot<C>>,
    /// The only mutable slot; replaced whole on every dispatch
    current: Mutex<Arc<StoreSnapshot<C>>>,
    /// Held for a whole dispatch; reentrant for nested sends on one thread
    dispatch: ReentrantMutex<()>,
    observers: Arc<ObserverRegistry<StoreSnapshot<C>, E>>,
}

/// Observable context container.
///
/// Cloning a `Store` yields another handle to the same store. Closures
/// registered on the store that need to reach it again should capture a
/// [`WeakStore`] from [`Store::downgrade`] to avoid a reference cycle.
pub struct Store<C, E> {
    inner: Arc<StoreInner<C, E>>,
}

impl<C, E> Store<C, E>
where
    C: Clone + Send + Sync + 'static,
    E: EventObject + 'static,
{
    /// Create a store from an initial context and an event-type to assigner table
    pub fn new<I, K>(context: C, transitions: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (K, Assigner<C, E>)>,
        K: Into<String>,
    {
        transitions
            .into_iter()
            .fold(StoreBuilder::new(context), |builder, (event_type, assigner)| {
                builder.on(event_type, assigner)
            })
            .build()
    }

    /// Create a builder for a store
    pub fn builder(context: C) -> StoreBuilder<C, E> {
        StoreBuilder::new(context)
    }

    /// Dispatch an event.
    ///
    /// Fails with [`StoreError::Assign`] when the assigner rejects the event;
    /// in that case nothing is committed and no observer is notified. An
    /// event type with no assigner keeps the current snapshot and still
    /// notifies observers.
    ///
    /// Concurrent calls from different threads take turns, each seeing the
    /// context committed by the one before it.
    pub fn send(&self, event: E) -> Result<(), StoreError> {
        let _dispatch = self.inner.dispatch.lock();
        let label = self.inner.config.label();
        let event_type = event.event_type();
        let previous = self.snapshot();

        let next = match self.inner.transitions.get(event_type) {
            Some(assigner) => {
                let context = assigner
                    .resolve(previous.context_arc(), &event)
                    .map_err(|source| StoreError::Assign {
                        event_type: event_type.to_owned(),
                        source,
                    })?;
                if Arc::ptr_eq(&context, previous.context_arc()) {
                    previous
                } else {
                    Arc::new(Snapshot::active_shared(context))
                }
            }
            None => {
                tracing::trace!("{}: no assigner for `{}`", label, event_type);
                previous
            }
        };

        *lock(&self.inner.current) = Arc::clone(&next);
        tracing::debug!("{}: dispatched `{}`", label, event_type);

        if let Some(payload) = self.inner.observers.notify(&next, &event) {
            if self.inner.config.observer_panics == ObserverPanicPolicy::Propagate {
                panic::resume_unwind(payload);
            }
        }
        Ok(())
    }

    /// The current snapshot
    pub fn snapshot(&self) -> Arc<StoreSnapshot<C>> {
        Arc::clone(&lock(&self.inner.current))
    }

    /// The snapshot built from the initial context, unaffected by `send`
    pub fn initial_snapshot(&self) -> Arc<StoreSnapshot<C>> {
        Arc::clone(&self.inner.initial)
    }

    /// Shortcut for the current snapshot's context
    pub fn context(&self) -> Arc<C> {
        Arc::clone(self.snapshot().context_arc())
    }

    /// Register a `next` callback
    pub fn subscribe<F>(&self, next: F) -> Subscription
    where
        F: Fn(&StoreSnapshot<C>, &E) + Send + Sync + 'static,
    {
        self.subscribe_observer(Observer::from_next(next))
    }

    /// Register a full observer
    pub fn subscribe_observer(&self, observer: Observer<StoreSnapshot<C>, E>) -> Subscription {
        self.inner.observers.register(observer)
    }

    /// Number of registered observers
    pub fn subscriber_count(&self) -> usize {
        self.inner.observers.len()
    }

    /// Whether an assigner is registered for `event_type`
    pub fn has_transition(&self, event_type: &str) -> bool {
        self.inner.transitions.contains_key(event_type)
    }

    /// The store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Create a non-owning handle
    pub fn downgrade(&self) -> WeakStore<C, E> {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<C, E> Clone for Store<C, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, E> fmt::Debug for Store<C, E>
where
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.config.name)
            .field("snapshot", &*lock(&self.inner.current))
            .finish_non_exhaustive()
    }
}

impl<C, E> Subscribable<StoreSnapshot<C>, E> for Store<C, E>
where
    C: Clone + Send + Sync + 'static,
    E: EventObject + 'static,
{
    fn subscribe_observer(&self, observer: Observer<StoreSnapshot<C>, E>) -> Subscription {
        Store::subscribe_observer(self, observer)
    }
}

impl<C, E> InteropObservable<StoreSnapshot<C>, E> for Store<C, E>
where
    C: Clone + Send + Sync + 'static,
    E: EventObject + 'static,
{
    type Observable = ObservableAdapter<StoreSnapshot<C>, E>;

    fn observable(&self) -> Self::Observable {
        ObservableAdapter::new(Arc::clone(&self.inner.observers))
    }
}

/// Non-owning store handle
pub struct WeakStore<C, E> {
    inner: Weak<StoreInner<C, E>>,
}

impl<C, E> WeakStore<C, E> {
    /// Get the store back if it is still alive
    pub fn upgrade(&self) -> Option<Store<C, E>> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

impl<C, E> Clone for WeakStore<C, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}
