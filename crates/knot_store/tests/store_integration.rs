//! Integration tests for store dispatch, notification ordering and interop
//!
//! These tests verify that:
//! - Context follows the iterated application of assigners
//! - Nested `send` calls complete before the outer pass continues
//! - Subscribe/unsubscribe during a pass only affects later passes
//! - Observer panics are isolated from the rest of the pass
//! - The interop adapter shares the store's observers

use knot_store::{
    Assigner, EventObject, InteropObservable, JsonEvent, Observer, ObserverPanicPolicy, Patch,
    Store, StoreConfig, StoreError, StoreSnapshot, Subscribable, Subscription, WeakStore,
};
use pretty_assertions::assert_eq;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Clone, Debug, PartialEq)]
struct Ctx {
    count: i64,
    note: Arc<String>,
}

fn ctx() -> Ctx {
    Ctx {
        count: 0,
        note: Arc::new("shared".into()),
    }
}

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Observer that records `name:event_type:count`
fn recorder(log: &Log, name: &'static str) -> impl Fn(&StoreSnapshot<Ctx>, &String) + Send + Sync {
    let log = log.clone();
    move |snapshot: &StoreSnapshot<Ctx>, event: &String| {
        log.lock()
            .unwrap()
            .push(format!("{name}:{event}:{}", snapshot.context().count));
    }
}

fn inc() -> Assigner<Ctx, String> {
    Assigner::produce(|c: &mut Ctx, _: &String| c.count += 1)
}

/// Context equals the fold of assigners over the sent events
#[test]
fn test_context_is_fold_of_assigners() {
    let store: Store<Ctx, String> = Store::builder(ctx())
        .on("inc", inc())
        .on(
            "double",
            Assigner::patch(|c: &Ctx, _: &String| {
                let count = c.count * 2;
                Patch::new().set("count", move |c: &mut Ctx| c.count = count)
            }),
        )
        .build()
        .unwrap();

    let events = ["inc", "double", "inc", "unknown", "double", "inc"];
    let mut expected = 0i64;
    for event in events {
        store.send(event.to_string()).unwrap();
        expected = match event {
            "inc" => expected + 1,
            "double" => expected * 2,
            _ => expected,
        };
        assert_eq!(store.snapshot().context().count, expected);
    }
    assert_eq!(expected, 7);
}

/// `{a:1, b:2}` patched with `{b:3}` keeps `a` and untouched shared fields
#[test]
fn test_patch_merge_keeps_untouched_fields() {
    let store: Store<Ctx, String> = Store::builder(ctx())
        .on(
            "set",
            Assigner::patch(|_: &Ctx, _: &String| {
                Patch::new().set("count", |c: &mut Ctx| c.count = 3)
            }),
        )
        .build()
        .unwrap();
    let before = store.snapshot();

    store.send("set".into()).unwrap();
    let after = store.snapshot();

    assert_eq!(after.context().count, 3);
    assert!(Arc::ptr_eq(&before.context().note, &after.context().note));
    assert!(!Arc::ptr_eq(before.context_arc(), after.context_arc()));
}

/// Field assigner `{count: ctx.count + 1}` applied twice
#[test]
fn test_field_assigner_counts() {
    let store: Store<Ctx, String> = Store::builder(ctx())
        .on_fields("inc", |f| {
            f.compute(
                "count",
                |c: &Ctx, _: &String| c.count + 1,
                |c: &mut Ctx, v| c.count = v,
            )
        })
        .build()
        .unwrap();

    store.send("inc".into()).unwrap();
    store.send("inc".into()).unwrap();
    assert_eq!(store.snapshot().context().count, 2);
}

/// Observers are notified in subscription order with the triggering event
#[test]
fn test_notification_order() {
    let store: Store<Ctx, String> = Store::builder(ctx()).on("inc", inc()).build().unwrap();
    let log = log();

    store.subscribe(recorder(&log, "a"));
    store.subscribe(recorder(&log, "b"));
    store.subscribe(recorder(&log, "c"));
    store.send("inc".into()).unwrap();

    assert_eq!(entries(&log), vec!["a:inc:1", "b:inc:1", "c:inc:1"]);
}

/// After `unsubscribe` returns, no later `send` reaches the observer
#[test]
fn test_unsubscribe_stops_delivery() {
    let store: Store<Ctx, String> = Store::builder(ctx()).on("inc", inc()).build().unwrap();
    let log = log();

    let a = store.subscribe(recorder(&log, "a"));
    store.subscribe(recorder(&log, "b"));

    store.send("inc".into()).unwrap();
    a.unsubscribe();
    a.unsubscribe();
    store.send("inc".into()).unwrap();

    assert_eq!(entries(&log), vec!["a:inc:1", "b:inc:1", "b:inc:2"]);
    assert_eq!(store.subscriber_count(), 1);
    assert!(a.is_closed());
}

/// A nested `send` from an assigner finishes, notifications included, first
#[test]
fn test_nested_send_from_assigner() {
    let handle: Arc<OnceLock<WeakStore<Ctx, String>>> = Arc::new(OnceLock::new());
    let inner_handle = handle.clone();

    let store: Store<Ctx, String> = Store::builder(ctx())
        .on("inc", inc())
        .on(
            "outer",
            Assigner::replace(move |c: &Ctx, _: &String| {
                if let Some(store) = inner_handle.get().and_then(|weak| weak.upgrade()) {
                    store.send("inc".into()).unwrap();
                }
                Ctx {
                    count: c.count + 100,
                    note: c.note.clone(),
                }
            }),
        )
        .build()
        .unwrap();
    handle.set(store.downgrade()).ok();

    let log = log();
    store.subscribe(recorder(&log, "a"));
    store.subscribe(recorder(&log, "b"));

    store.send("outer".into()).unwrap();

    assert_eq!(
        entries(&log),
        vec!["a:inc:1", "b:inc:1", "a:outer:100", "b:outer:100"]
    );
    // the outer assigner computed from the pre-dispatch context
    assert_eq!(store.snapshot().context().count, 100);
}

/// A nested `send` from an observer completes before later observers run
#[test]
fn test_nested_send_from_observer() {
    let store: Store<Ctx, String> = Store::builder(ctx()).on("inc", inc()).build().unwrap();
    let log = log();

    let weak = store.downgrade();
    let record_a = recorder(&log, "a");
    store.subscribe(move |snapshot, event| {
        record_a(snapshot, event);
        if event == "outer" {
            if let Some(store) = weak.upgrade() {
                store.send("inc".into()).unwrap();
            }
        }
    });
    store.subscribe(recorder(&log, "b"));

    store.send("outer".into()).unwrap();

    assert_eq!(
        entries(&log),
        vec!["a:outer:0", "a:inc:1", "b:inc:1", "b:outer:0"]
    );
    assert_eq!(store.snapshot().context().count, 1);
}

/// Observers added during a pass start receiving on the next `send`
#[test]
fn test_subscribe_during_pass() {
    let store: Store<Ctx, String> = Store::builder(ctx()).on("inc", inc()).build().unwrap();
    let log = log();

    let added = Arc::new(AtomicBool::new(false));
    let late: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    {
        let weak = store.downgrade();
        let log = log.clone();
        let late = late.clone();
        store.subscribe(move |_, _| {
            if added.swap(true, Ordering::SeqCst) {
                return;
            }
            if let Some(store) = weak.upgrade() {
                *late.lock().unwrap() = Some(store.subscribe(recorder(&log, "late")));
            }
        });
    }
    store.subscribe(recorder(&log, "b"));

    store.send("inc".into()).unwrap();
    assert_eq!(entries(&log), vec!["b:inc:1"]);

    store.send("inc".into()).unwrap();
    assert_eq!(entries(&log), vec!["b:inc:1", "b:inc:2", "late:inc:2"]);
    assert!(late.lock().unwrap().is_some());
}

/// Observers removed during a pass still get that pass, but not the next
#[test]
fn test_unsubscribe_during_pass() {
    let store: Store<Ctx, String> = Store::builder(ctx()).on("inc", inc()).build().unwrap();
    let log = log();

    let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    {
        let victim = victim.clone();
        store.subscribe(move |_, _| {
            if let Some(sub) = victim.lock().unwrap().as_ref() {
                sub.unsubscribe();
            }
        });
    }
    *victim.lock().unwrap() = Some(store.subscribe(recorder(&log, "b")));

    store.send("inc".into()).unwrap();
    store.send("inc".into()).unwrap();

    assert_eq!(entries(&log), vec!["b:inc:1"]);
}

/// Default policy: a panicking observer is logged and skipped
#[test]
fn test_observer_panic_isolated() {
    let store: Store<Ctx, String> = Store::builder(ctx()).on("inc", inc()).build().unwrap();
    let log = log();

    store.subscribe(|_, _| panic!("observer blew up"));
    store.subscribe(recorder(&log, "b"));

    store.send("inc".into()).unwrap();
    store.send("inc".into()).unwrap();

    assert_eq!(entries(&log), vec!["b:inc:1", "b:inc:2"]);
    assert_eq!(store.snapshot().context().count, 2);
}

/// Propagate policy: the pass completes, then the panic reaches the caller
#[test]
fn test_observer_panic_propagated_after_pass() {
    let store: Store<Ctx, String> = Store::builder(ctx())
        .on("inc", inc())
        .config(
            StoreConfig::named("propagating")
                .with_observer_panics(ObserverPanicPolicy::Propagate),
        )
        .build()
        .unwrap();
    let log = log();

    store.subscribe(|_, _| panic!("observer blew up"));
    store.subscribe(recorder(&log, "b"));

    let result = panic::catch_unwind(AssertUnwindSafe(|| store.send("inc".into())));

    assert!(result.is_err());
    assert_eq!(entries(&log), vec!["b:inc:1"]);
    assert_eq!(store.snapshot().context().count, 1);
}

/// A panicking assigner unwinds out of `send` without committing
#[test]
fn test_assigner_panic_commits_nothing() {
    let store: Store<Ctx, String> = Store::builder(ctx())
        .on("inc", inc())
        .on(
            "explode",
            Assigner::produce(|c: &mut Ctx, _: &String| {
                c.count = -1;
                panic!("assigner blew up");
            }),
        )
        .build()
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    store.subscribe(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    store.send("inc".into()).unwrap();
    let before = store.snapshot();

    let result = panic::catch_unwind(AssertUnwindSafe(|| store.send("explode".into())));
    assert!(result.is_err());
    assert!(Arc::ptr_eq(&before, &store.snapshot()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // the store keeps working
    store.send("inc".into()).unwrap();
    assert_eq!(store.snapshot().context().count, 2);
}

/// A failing fallible assigner surfaces as `StoreError::Assign`
#[test]
fn test_assigner_error_propagates() {
    let store: Store<Ctx, String> = Store::builder(ctx())
        .on(
            "checked",
            Assigner::try_produce(|c: &mut Ctx, _: &String| {
                if c.count == 0 {
                    return Err("count must be positive".into());
                }
                c.count -= 1;
                Ok(())
            }),
        )
        .build()
        .unwrap();

    let err = store.send("checked".into()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "assigner for `checked` failed: count must be positive"
    );
    assert!(Arc::ptr_eq(&store.initial_snapshot(), &store.snapshot()));
}

/// The interop adapter shares observers with the store and never replays
#[test]
fn test_observable_adapter() {
    let store: Store<Ctx, String> = Store::builder(ctx()).on("inc", inc()).build().unwrap();
    store.send("inc".into()).unwrap();

    let log = log();
    let observable = store.observable();
    let sub = observable.subscribe_observer(
        Observer::from_next(recorder(&log, "ext"))
            .on_error(|_| unreachable!("store never errors observers"))
            .on_complete(|| unreachable!("store never completes observers")),
    );
    assert!(entries(&log).is_empty());
    assert_eq!(store.subscriber_count(), 1);

    store.send("inc".into()).unwrap();
    sub.unsubscribe();
    store.send("inc".into()).unwrap();

    assert_eq!(entries(&log), vec!["ext:inc:2"]);
    assert_eq!(store.subscriber_count(), 0);
}

/// Generic consumers only need `Subscribable`
#[test]
fn test_store_is_subscribable() {
    fn count_notifications<S: Subscribable<StoreSnapshot<Ctx>, String>>(
        source: &S,
        hits: Arc<AtomicUsize>,
    ) -> Subscription {
        source.subscribe_next(move |_: &StoreSnapshot<Ctx>, _: &String| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    let store: Store<Ctx, String> = Store::builder(ctx()).on("inc", inc()).build().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    count_notifications(&store, hits.clone());
    count_notifications(&store.observable(), hits.clone());
    store.send("inc".into()).unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

/// Dynamic JSON events drive the same dispatch path
#[test]
fn test_json_events() {
    let store: Store<Ctx, JsonEvent> = Store::builder(ctx())
        .on(
            "add",
            Assigner::try_patch(|c: &Ctx, ev: &JsonEvent| {
                let by = ev
                    .get("by")
                    .and_then(|v| v.as_i64())
                    .ok_or("`by` must be an integer")?;
                let count = c.count + by;
                Ok(Patch::new().set("count", move |c: &mut Ctx| c.count = count))
            }),
        )
        .build()
        .unwrap();

    store
        .send(r#"{"type":"add","by":5}"#.parse().unwrap())
        .unwrap();
    store.send(JsonEvent::new("add").with("by", -2)).unwrap();
    assert_eq!(store.snapshot().context().count, 3);

    let err = store.send(JsonEvent::new("add")).unwrap_err();
    assert!(matches!(err, StoreError::Assign { .. }));
    assert_eq!(store.snapshot().context().count, 3);
    assert_eq!(JsonEvent::new("add").event_type(), "add");
}

/// Stores can be shared across threads
#[test]
fn test_store_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Store<Ctx, String>>();

    let store: Store<Ctx, String> = Store::builder(ctx()).on("inc", inc()).build().unwrap();
    let worker = {
        let store = store.clone();
        std::thread::spawn(move || {
            for _ in 0..10 {
                store.send("inc".into()).unwrap();
            }
        })
    };
    worker.join().unwrap();

    assert_eq!(store.snapshot().context().count, 10);
}

/// Sends from several threads take turns; none is lost
#[test]
fn test_concurrent_sends_are_serialized() {
    const THREADS: usize = 4;
    const SENDS: usize = 2000;

    let store: Store<u64, String> = Store::builder(0u64)
        .on(
            "inc",
            Assigner::produce(|c: &mut u64, _: &String| {
                std::thread::yield_now();
                *c += 1;
            }),
        )
        .build()
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        store.subscribe(move |snapshot: &StoreSnapshot<u64>, _: &String| {
            seen.lock().unwrap().push(*snapshot.context());
        });
    }

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..SENDS {
                    store.send("inc".into()).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let total = (THREADS * SENDS) as u64;
    assert_eq!(*store.context(), total);
    // each dispatch notifies before the next one starts
    assert_eq!(*seen.lock().unwrap(), (1..=total).collect::<Vec<_>>());
}
