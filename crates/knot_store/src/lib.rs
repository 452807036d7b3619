//! Knot Store
//!
//! A small observable state container:
//!
//! - **Snapshots**: immutable `{status, context}` values, replaced whole
//! - **Assigners**: pure update rules keyed by event type
//! - **Observers**: synchronous, ordered notification of every dispatch
//! - **Interop**: a `{subscribe}` view for external reactive consumers
//!
//! Dispatch is synchronous and re-entrant: an assigner or observer may call
//! `send` again, and the nested call finishes before the outer one continues.
//!
//! # Example
//!
//! ```rust
//! use knot_store::{Assigner, Store};
//!
//! #[derive(Clone)]
//! struct Counter {
//!     count: u32,
//! }
//!
//! let store: Store<Counter, &'static str> = Store::builder(Counter { count: 0 })
//!     .on_fields("inc", |f| {
//!         f.compute(
//!             "count",
//!             |ctx: &Counter, _: &&'static str| ctx.count + 1,
//!             |c: &mut Counter, v| c.count = v,
//!         )
//!     })
//!     .on("reset", Assigner::replace(|_: &Counter, _: &&'static str| Counter { count: 0 }))
//!     .build()
//!     .unwrap();
//!
//! let _sub = store.subscribe(|snapshot, event| {
//!     println!("{event}: {}", snapshot.context().count);
//! });
//!
//! store.send("inc").unwrap();
//! store.send("inc").unwrap();
//! assert_eq!(store.snapshot().context().count, 2);
//! assert_eq!(store.initial_snapshot().context().count, 0);
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod assigner;
pub mod config;
pub mod error;
pub mod event;
pub mod interop;
pub mod observer;
pub mod select;
pub mod snapshot;
pub mod store;

pub use assigner::{Assigner, FieldAssigners, Patch};
pub use config::{ObserverPanicPolicy, StoreConfig};
pub use error::{BoxError, StoreError};
pub use event::{EventObject, JsonEvent};
pub use interop::{InteropObservable, ObservableAdapter, Subscribable};
pub use observer::{Observer, ObserverId, Subscription};
pub use snapshot::{Snapshot, SnapshotError, Status, StoreSnapshot};
pub use store::{Store, StoreBuilder, WeakStore};

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
