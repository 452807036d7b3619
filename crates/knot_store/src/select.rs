//! Selected-value subscriptions
//!
//! `select` narrows a store down to one derived value and only calls back when
//! that value changes, mirroring how UI bindings avoid re-rendering on
//! unrelated context updates.

use std::sync::Mutex;

use crate::event::EventObject;
use crate::lock;
use crate::observer::{Observer, Subscription};
use crate::snapshot::StoreSnapshot;
use crate::store::Store;

impl<C, E> Store<C, E>
where
    C: Clone + Send + Sync + 'static,
    E: EventObject + 'static,
{
    /// Call `on_change` whenever `selector` yields a value unequal to the last one.
    ///
    /// The baseline is taken from the current snapshot and is not delivered.
    pub fn select<T, S, F>(&self, selector: S, on_change: F) -> Subscription
    where
        T: PartialEq + Clone + Send + 'static,
        S: Fn(&C) -> T + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.select_with(selector, |a: &T, b: &T| a == b, on_change)
    }

    /// Like [`Store::select`] with a custom equality check
    pub fn select_with<T, S, Q, F>(&self, selector: S, equal: Q, on_change: F) -> Subscription
    where
        T: Clone + Send + 'static,
        S: Fn(&C) -> T + Send + Sync + 'static,
        Q: Fn(&T, &T) -> bool + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let last = Mutex::new(selector(self.snapshot().context()));

        self.subscribe_observer(Observer::from_next(
            move |snapshot: &StoreSnapshot<C>, _: &E| {
                let selected = selector(snapshot.context());
                let changed = {
                    let mut last = lock(&last);
                    if equal(&last, &selected) {
                        return;
                    }
                    *last = selected.clone();
                    selected
                };
                // lock released: `on_change` may send to the store again
                on_change(&changed);
            },
        ))
    }
}
