//! The publish path and the handler-visible subscribe surface (C5).
//!
//! `publish` is the single entry point described in §4.5: validate, snapshot
//! matching subscriptions under a read lock, then invoke sync handlers and
//! enqueue async envelopes *outside* the lock, then sweep any members a
//! handler deactivated via `unsub` during the walk.

use crate::event_type::EventType;
use crate::metrics;
use crate::queue::{AsyncEnvelope, AsyncQueue};
use crate::sublist::SubList;
use crate::subscription::{AsyncHandlerFn, Kind, SubRef, Subscription, SyncEvent, SyncHandlerFn};
use crate::wakeup::{ThreadParker, Wakeup};
use log::{debug, trace, warn};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

fn global_list() -> &'static SubList {
    static GLOBAL: OnceLock<SubList> = OnceLock::new();
    GLOBAL.get_or_init(SubList::new)
}

/// The process-wide sublist, implicit whenever a caller passes `None`.
/// Lazily initialized on first use; lives for the process unless `destroy`d.
pub fn global() -> SubList {
    global_list().clone()
}

fn resolve<'a>(list: Option<&'a SubList>) -> &'a SubList {
    list.unwrap_or_else(|| global_list())
}

/// A handler flavor plus its registration inputs (§6's factory table).
pub enum HandlerDescriptor {
    /// Runs inline on the publishing thread; may read `unsafe_data`.
    Sync { id: u64, handler: SyncHandlerFn },
    /// Envelope delivered through a core-owned worker thread; no `unsafe` access.
    AsyncFn { id: u64, handler: AsyncHandlerFn },
    /// Envelope delivered through a user-supplied queue/wakeup pair; also
    /// receives the terminal `SUB_END`.
    AsyncTask { id: u64, queue: Arc<AsyncQueue> },
}

impl HandlerDescriptor {
    pub fn sync<F>(id: u64, handler: F) -> Self
    where
        F: Fn(SyncEvent) + Send + Sync + 'static,
    {
        HandlerDescriptor::Sync { id, handler: Arc::new(handler) }
    }

    pub fn async_fn<F>(id: u64, handler: F) -> Self
    where
        F: Fn(crate::subscription::AsyncEvent) + Send + Sync + 'static,
    {
        HandlerDescriptor::AsyncFn { id, handler: Arc::new(handler) }
    }

    pub fn async_task(id: u64, queue: Arc<AsyncQueue>) -> Self {
        HandlerDescriptor::AsyncTask { id, queue }
    }

    fn id(&self) -> u64 {
        match self {
            HandlerDescriptor::Sync { id, .. } => *id,
            HandlerDescriptor::AsyncFn { id, .. } => *id,
            HandlerDescriptor::AsyncTask { id, .. } => *id,
        }
    }
}

fn build_subscription(event: EventType, descriptor: HandlerDescriptor) -> SubRef {
    let id = descriptor.id();
    match descriptor {
        HandlerDescriptor::Sync { handler, .. } => Subscription::new(id, event, Kind::Sync(handler)),
        HandlerDescriptor::AsyncFn { handler, .. } => {
            let parker = ThreadParker::new();
            let queue = AsyncQueue::new(parker.clone() as Arc<dyn Wakeup>);
            let shutdown = Arc::new(AtomicBool::new(false));
            let in_flight = Arc::new(AtomicUsize::new(0));
            spawn_async_fn_worker(queue.clone(), parker.clone(), shutdown.clone(), in_flight.clone(), handler);
            Subscription::new(id, event, Kind::AsyncFn { queue, parker, shutdown, in_flight })
        }
        HandlerDescriptor::AsyncTask { queue, .. } => Subscription::new(id, event, Kind::AsyncTask { queue }),
    }
}

/// The core-owned worker loop for the `AsyncFn` flavor: park until woken,
/// drain the queue invoking `handler`, and exit once told to shut down, the
/// queue is empty, and no publisher is still mid-enqueue. The thread, not
/// the subscription, owns this loop — dropping the subscription's `Arc`
/// doesn't need to wait for it.
fn spawn_async_fn_worker(
    queue: Arc<AsyncQueue>,
    parker: Arc<ThreadParker>,
    shutdown: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    handler: AsyncHandlerFn,
) {
    std::thread::spawn(move || loop {
        parker.park();
        while let Some(env) = queue.pop() {
            handler(env.into_async_event());
        }
        if shutdown.load(Ordering::Acquire) && queue.is_empty() && in_flight.load(Ordering::Acquire) == 0 {
            trace!(target: "evbus", "async-fn worker exiting, queue drained");
            break;
        }
    });
}

/// Register a subscription without returning a handle: the sublist holds
/// the only `Arc` (refcount 1 until an envelope or lookup takes another).
/// Returns `false` without registering anything if subscription allocation
/// fails (§7 kind 2; exercised via `BusConfig::inject_subscribe_failure`).
pub fn subscribe(list: Option<&SubList>, event: EventType, descriptor: HandlerDescriptor) -> bool {
    let list = resolve(list);
    if list.config().take_injected_subscribe_failure() {
        metrics::record_subscribe_alloc_failure();
        warn!(target: "evbus", "subscribe: subscription allocation failed for event={}", event);
        return false;
    }
    let sub = build_subscription(event, descriptor);
    debug!(target: "evbus", "subscribe: handle={} id={} event={}", sub.handle, sub.id(), event);
    list.insert(sub);
    metrics::record_subscribe();
    true
}

/// Register a subscription and return an external handle to it: refcount
/// starts at 2 (sublist + caller), matching §6. Returns `None` without
/// registering anything if subscription allocation fails (§7 kind 2).
pub fn subscribe_ptr(list: Option<&SubList>, event: EventType, descriptor: HandlerDescriptor) -> Option<SubRef> {
    let list = resolve(list);
    if list.config().take_injected_subscribe_failure() {
        metrics::record_subscribe_alloc_failure();
        warn!(target: "evbus", "subscribe_ptr: subscription allocation failed for event={}", event);
        return None;
    }
    let sub = build_subscription(event, descriptor);
    debug!(target: "evbus", "subscribe_ptr: handle={} id={} event={}", sub.handle, sub.id(), event);
    list.insert(sub.clone());
    metrics::record_subscribe();
    Some(sub)
}

/// The single dispatch entry point. `sublist = None` targets the global
/// sublist. Panics on malformed input (§7 kind 1, a programmer error);
/// returns `Ok(false)` only when there was at least one match and every
/// matching subscription failed to be notified.
pub fn publish<S>(
    sublist: Option<&SubList>,
    event_type: EventType,
    safe: Option<&S>,
    mut unsafe_data: Option<&mut dyn Any>,
) -> bool
where
    S: Clone + Send + 'static,
{
    let list = resolve(sublist);

    assert!(
        event_type.is_single_subtype(),
        "publish: event type must carry exactly one subtype bit, got {event_type}"
    );
    assert!(
        event_type.family() != crate::event_type::CONTROL_FAMILY,
        "publish: family 0 is reserved for core control events"
    );
    if safe.is_some() {
        assert!(
            std::mem::size_of::<S>() <= list.config().envelope_capacity,
            "publish: safe payload ({} bytes) exceeds envelope capacity ({} bytes)",
            std::mem::size_of::<S>(),
            list.config().envelope_capacity
        );
    }

    let matched = list.snapshot_matching(event_type);
    let any_match = !matched.is_empty();
    let mut any_notified = false;
    let mut saw_inactive = false;

    for sub in matched {
        // A sync handler visited earlier in this same walk may have called
        // `unsub` on this subscription; it must be skipped for the rest of
        // the walk once deactivated, not just from the next publish call.
        if !sub.is_active() {
            continue;
        }
        match &sub.kind {
            Kind::Sync(handler) => {
                let ctx = SyncEvent {
                    event_type,
                    safe: safe.map(|s| s as &dyn Any),
                    unsafe_data: unsafe_data.as_deref_mut(),
                    mgmt: sub.clone(),
                };
                handler(ctx);
                metrics::record_sync_handler_invoked();
                any_notified = true;
                if !sub.is_active() {
                    saw_inactive = true;
                }
            }
            Kind::AsyncFn { queue, parker, shutdown, in_flight } => {
                if list.config().take_injected_alloc_failure() {
                    metrics::record_async_alloc_failure();
                    warn!(target: "evbus", "publish: envelope allocation failed for handle={}", sub.handle);
                    continue;
                }
                // Held from just before the enqueue to just after: the
                // worker thread won't observe `shutdown` and exit while
                // this is nonzero, even if `unsubscribe` races in between.
                in_flight.fetch_add(1, Ordering::AcqRel);
                let boxed: Option<Box<dyn Any + Send>> = safe.cloned().map(|v| Box::new(v) as Box<dyn Any + Send>);
                sub.note_enqueued();
                queue.push(AsyncEnvelope::new(event_type, boxed, sub.clone()));
                metrics::record_async_envelope_enqueued();
                any_notified = true;
                in_flight.fetch_sub(1, Ordering::AcqRel);
                if shutdown.load(Ordering::Acquire) {
                    parker.wake();
                }
            }
            Kind::AsyncTask { queue } => {
                if list.config().take_injected_alloc_failure() {
                    metrics::record_async_alloc_failure();
                    warn!(target: "evbus", "publish: envelope allocation failed for handle={}", sub.handle);
                    continue;
                }
                let boxed: Option<Box<dyn Any + Send>> = safe.cloned().map(|v| Box::new(v) as Box<dyn Any + Send>);
                sub.note_enqueued();
                queue.push(AsyncEnvelope::new(event_type, boxed, sub.clone()));
                metrics::record_async_envelope_enqueued();
                any_notified = true;
            }
        }
    }

    if saw_inactive {
        list.sweep_inactive();
    }
    metrics::record_publish();

    if !any_match {
        trace!(target: "evbus", "publish: no subscribers matched event={}", event_type);
    }

    !any_match || any_notified
}
