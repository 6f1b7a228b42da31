use evbus::dispatcher::HandlerDescriptor;
use evbus::subscription::SyncEvent;
use evbus::{dispatcher, hash, AsyncQueue, BusConfig, EventType, SubList};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct DropGuard(Arc<AtomicUsize>);

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scenario 1: an identified async-fn subscription's captured state is
/// released exactly once when looked up and unsubscribed by ID, and no
/// further delivery happens afterward.
#[test]
fn identified_free_runs_once_and_stops_delivery() {
    init_logging();
    let freed = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let id = hash::bus_id(b"test", b"free");
    let event = EventType::new(10, 0b01);

    let list = SubList::new();
    let guard = DropGuard(freed.clone());
    let c = calls.clone();
    assert!(dispatcher::subscribe(
        Some(&list),
        event,
        HandlerDescriptor::async_fn(id, move |_ev| {
            let _ = &guard;
            c.fetch_add(1, Ordering::SeqCst);
        }),
    ));

    assert!(list.lookup_unsubscribe(id));
    assert_eq!(freed.load(Ordering::SeqCst), 1, "captured state must drop exactly once");

    assert!(dispatcher::publish::<()>(Some(&list), event, None, None));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "unsubscribed handler must not run");
}

/// Scenario 2: a sync handler that unsubscribes itself on first delivery
/// runs exactly once across two publishes, and the sublist shrinks by one
/// within the publish call that triggered the self-unsub.
#[test]
fn sub_mgmt_self_unsub_runs_once() {
    init_logging();
    let list = SubList::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let event = EventType::new(5, 0b01);

    let c = calls.clone();
    dispatcher::subscribe(
        Some(&list),
        event,
        HandlerDescriptor::sync(0, move |ev: SyncEvent| {
            c.fetch_add(1, Ordering::SeqCst);
            ev.mgmt.unsubscribe();
        }),
    );
    assert_eq!(list.len(), 1);

    assert!(dispatcher::publish::<()>(Some(&list), event, None, None));
    assert_eq!(list.len(), 0, "self-unsub must unlink within the triggering publish");

    assert!(dispatcher::publish::<()>(Some(&list), event, None, None));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Scenario 3: an async-task subscription sees exactly its data envelopes
/// followed by a terminal SUB_END once the sublist is destroyed.
#[test]
fn task_subscription_sees_sub_end_last() {
    init_logging();
    let list = SubList::new();
    let event = EventType::new(7, 0b01);

    let queue = AsyncQueue::new(Arc::new(|| {}));
    dispatcher::subscribe(Some(&list), event, HandlerDescriptor::async_task(0, queue.clone()));

    for i in 0..3u32 {
        assert!(dispatcher::publish(Some(&list), event, Some(&i), None));
    }
    list.clone().destroy();

    let mut envelopes = Vec::new();
    while let Some(env) = queue.pop() {
        envelopes.push(env);
    }
    assert_eq!(envelopes.len(), 4);
    assert!(!envelopes[0].is_sub_end());
    assert!(!envelopes[1].is_sub_end());
    assert!(!envelopes[2].is_sub_end());
    assert!(envelopes[3].is_sub_end());
}

/// Scenario 4: an external pointer survives a lookup-based unsubscribe;
/// a second unsubscribe through the pointer is a harmless no-op.
#[test]
fn external_pointer_survives_lookup_unsubscribe() {
    init_logging();
    let list = SubList::new();
    let event = EventType::new(3, 0b01);
    let id = hash::bus_id(b"test", b"ptr");

    let p = dispatcher::subscribe_ptr(Some(&list), event, HandlerDescriptor::sync(id, |_| {})).unwrap();
    assert!(list.lookup_unsubscribe(id));
    assert!(!p.unsubscribe(), "already inactive, must report false, not crash");
    drop(p);
}

/// Scenario 5: a safe payload larger than the envelope capacity is a
/// programmer error, not a recoverable one.
#[test]
fn oversize_payload_panics_at_publish() {
    init_logging();
    let list = SubList::new();
    let event = EventType::new(4, 0b01);
    dispatcher::subscribe(Some(&list), event, HandlerDescriptor::sync(0, |_| {}));

    let oversized = [0u8; 512];
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        dispatcher::publish(Some(&list), event, Some(&oversized), None)
    }));
    assert!(result.is_err());
}

/// Scenario 6: resub across families is rejected and leaves the original
/// filter untouched.
#[test]
fn family_change_resub_is_rejected() {
    init_logging();
    let list = SubList::new();
    let server_event = EventType::new(1, 0b01);

    let p = dispatcher::subscribe_ptr(Some(&list), server_event, HandlerDescriptor::sync(0, |_| {})).unwrap();
    let err = p.resub(EventType::new(2, 0b01)).unwrap_err();
    assert_eq!(err.to_string(), "resub family mismatch: 1 -> 2");
    assert_eq!(p.sub_type().family(), 1);
}

/// Per-subscription FIFO: two publishes to the same async-task subscription
/// are observed by the consumer in the order they were published.
#[test]
fn per_subscription_delivery_is_fifo() {
    init_logging();
    let list = SubList::new();
    let event = EventType::new(6, 0b01);
    let queue = AsyncQueue::new(Arc::new(|| {}));
    dispatcher::subscribe(Some(&list), event, HandlerDescriptor::async_task(0, queue.clone()));

    for i in 0..5u32 {
        assert!(dispatcher::publish(Some(&list), event, Some(&i), None));
    }
    for i in 0..5u32 {
        let env = queue.pop().unwrap();
        assert_eq!(*env.safe::<u32>().unwrap(), i);
    }
    assert!(queue.pop().is_none());
}

/// A sync handler may publish recursively on its own sublist without
/// deadlocking, per the reentrancy guarantee.
#[test]
fn sync_handler_may_publish_recursively() {
    init_logging();
    let list = SubList::new();
    let event = EventType::new(8, 0b01);
    let calls = Arc::new(AtomicUsize::new(0));

    let list_for_handler = list.clone();
    let c = calls.clone();
    dispatcher::subscribe(
        Some(&list),
        event,
        HandlerDescriptor::sync(0, move |_ev| {
            let n = c.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                dispatcher::publish::<()>(Some(&list_for_handler), event, None, None);
            }
        }),
    );

    assert!(dispatcher::publish::<()>(Some(&list), event, None, None));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Injected allocation failure skips the async enqueue but does not panic;
/// publish still reports success once any other match is notified.
#[test]
fn injected_alloc_failure_skips_enqueue_without_panic() {
    init_logging();
    let config = BusConfig::default();
    let list = SubList::with_config(config.clone());
    let event = EventType::new(9, 0b01);
    let queue = AsyncQueue::new(Arc::new(|| {}));
    dispatcher::subscribe(Some(&list), event, HandlerDescriptor::async_task(0, queue.clone()));

    config.inject_alloc_failure();
    assert!(!dispatcher::publish::<()>(Some(&list), event, None, None));
    assert!(queue.pop().is_none());

    assert!(dispatcher::publish::<()>(Some(&list), event, None, None));
    assert!(queue.pop().is_some());
}

/// Injected subscribe-allocation failure leaves the sublist untouched and
/// reports failure through both registration entry points.
#[test]
fn injected_subscribe_failure_skips_registration_without_panic() {
    init_logging();
    let config = BusConfig::default();
    let list = SubList::with_config(config.clone());
    let event = EventType::new(11, 0b01);

    config.inject_subscribe_failure();
    assert!(!dispatcher::subscribe(Some(&list), event, HandlerDescriptor::sync(0, |_| {})));
    assert_eq!(list.len(), 0, "failed subscribe must not register anything");

    assert!(dispatcher::subscribe(Some(&list), event, HandlerDescriptor::sync(0, |_| {})));
    assert_eq!(list.len(), 1);

    config.inject_subscribe_failure();
    assert!(dispatcher::subscribe_ptr(Some(&list), event, HandlerDescriptor::sync(0, |_| {})).is_none());
    assert_eq!(list.len(), 1, "failed subscribe_ptr must not register anything");
}

/// A sync handler that deactivates a not-yet-visited sibling subscription
/// within the same publish call must cause that sibling to be skipped for
/// the remainder of the walk, not just from the next publish.
#[test]
fn self_publish_unsub_skips_sibling_in_same_walk() {
    init_logging();
    let list = SubList::new();
    let event = EventType::new(12, 0b01);
    let calls = Arc::new(AtomicUsize::new(0));
    let cell: Arc<std::sync::Mutex<Option<evbus::SubRef>>> = Arc::new(std::sync::Mutex::new(None));

    let cell_for_a = cell.clone();
    dispatcher::subscribe(
        Some(&list),
        event,
        HandlerDescriptor::sync(0, move |_ev| {
            if let Some(b_ref) = cell_for_a.lock().unwrap().take() {
                b_ref.unsubscribe();
            }
        }),
    );
    let c = calls.clone();
    let b_ref = dispatcher::subscribe_ptr(
        Some(&list),
        event,
        HandlerDescriptor::sync(0, move |_ev| {
            c.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();
    *cell.lock().unwrap() = Some(b_ref.clone());

    assert!(dispatcher::publish::<()>(Some(&list), event, None, None));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "B must be skipped within the triggering publish");
    assert!(!b_ref.is_active());
}
