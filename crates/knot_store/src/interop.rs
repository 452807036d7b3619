//! Observable interop
//!
//! [`Subscribable`] is the minimal protocol reactive-stream consumers program
//! against. A store hands out an [`ObservableAdapter`] through
//! [`InteropObservable::observable`]; the adapter shares the store's observer
//! registry and holds no state of its own, so it never buffers or replays.

use std::fmt;
use std::sync::Arc;

use crate::observer::{Observer, ObserverRegistry, Subscription};

/// Anything that accepts observers of `(T, E)` notifications
pub trait Subscribable<T, E> {
    fn subscribe_observer(&self, observer: Observer<T, E>) -> Subscription;

    fn subscribe_next<F>(&self, next: F) -> Subscription
    where
        Self: Sized,
        F: Fn(&T, &E) + Send + Sync + 'static,
    {
        self.subscribe_observer(Observer::from_next(next))
    }
}

/// Well-known export point for third-party consumers
pub trait InteropObservable<T, E> {
    type Observable: Subscribable<T, E>;

    fn observable(&self) -> Self::Observable;
}

/// Thin `{subscribe}` view over a store's observer registry
pub struct ObservableAdapter<T, E> {
    registry: Arc<ObserverRegistry<T, E>>,
}

impl<T, E> ObservableAdapter<T, E> {
    pub(crate) fn new(registry: Arc<ObserverRegistry<T, E>>) -> Self {
        Self { registry }
    }
}

impl<T, E> Clone for ObservableAdapter<T, E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T: 'static, E: 'static> Subscribable<T, E> for ObservableAdapter<T, E> {
    fn subscribe_observer(&self, observer: Observer<T, E>) -> Subscription {
        self.registry.register(observer)
    }
}

impl<T, E> fmt::Debug for ObservableAdapter<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableAdapter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Generic consumer that only knows the protocol
    fn collect_into<S>(source: &S, sink: Arc<Mutex<Vec<u32>>>) -> Subscription
    where
        S: Subscribable<u32, ()>,
    {
        source.subscribe_next(move |value: &u32, _: &()| sink.lock().unwrap().push(*value))
    }

    #[test]
    fn test_adapter_delegates_to_shared_registry() {
        let registry = ObserverRegistry::<u32, ()>::new();
        let adapter = ObservableAdapter::new(registry.clone());
        let sink = Arc::new(Mutex::new(Vec::new()));

        let sub = collect_into(&adapter, sink.clone());
        assert_eq!(registry.len(), 1);

        registry.notify(&5, &());
        sub.unsubscribe();
        registry.notify(&6, &());

        assert_eq!(*sink.lock().unwrap(), vec![5]);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_adapter_does_not_replay() {
        let registry = ObserverRegistry::<u32, ()>::new();
        registry.notify(&1, &());

        let sink = Arc::new(Mutex::new(Vec::new()));
        collect_into(&ObservableAdapter::new(registry.clone()), sink.clone());

        assert!(sink.lock().unwrap().is_empty());
    }
}
