//! Reference-counted subscription record (C2).
//!
//! A [`Subscription`] is always held behind an `Arc` (aliased as [`SubRef`]).
//! Rust's own strong-count bookkeeping stands in for a manual refcount: the
//! owning [`SubList`](crate::sublist::SubList) holds one clone while
//! `active`, each in-flight [`AsyncEnvelope`](crate::queue::AsyncEnvelope)
//! holds one clone while outstanding, and each external holder (ptr-subscribe,
//! `lookup_take`) holds its own. Storage is released — and any captured
//! handler state dropped — exactly when the last `Arc` goes: no manual
//! free-on-last-reference plumbing needed, `Drop` already gives us "exactly
//! once, never earlier" for free.

use crate::error::BusError;
use crate::event_type::EventType;
use crate::metrics;
use crate::queue::AsyncQueue;
use crate::sublist::SubListShared;
use crate::wakeup::ThreadParker;
use anyhow::Result;
use log::{debug, trace};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Context handed to a sync handler, inline on the publishing thread.
pub struct SyncEvent<'a> {
    pub event_type: EventType,
    pub safe: Option<&'a dyn Any>,
    pub unsafe_data: Option<&'a mut dyn Any>,
    pub mgmt: SubRef,
}

/// Context handed to an `AsyncFn` handler by the core-owned worker thread.
pub struct AsyncEvent {
    pub event_type: EventType,
    pub safe: Option<Box<dyn Any + Send>>,
    pub mgmt: SubRef,
}

pub type SyncHandlerFn = Arc<dyn Fn(SyncEvent) + Send + Sync>;
pub type AsyncHandlerFn = Arc<dyn Fn(AsyncEvent) + Send + Sync>;

pub(crate) enum Kind {
    Sync(SyncHandlerFn),
    AsyncFn {
        queue: Arc<AsyncQueue>,
        parker: Arc<ThreadParker>,
        shutdown: Arc<AtomicBool>,
        /// Count of publishes currently between their `is_active()` check
        /// and the completion of the matching `queue.push`. The worker
        /// thread won't exit while this is nonzero, closing the race where
        /// it would otherwise drain, see `shutdown` set, and exit out from
        /// under an in-flight publisher.
        in_flight: Arc<AtomicUsize>,
    },
    AsyncTask {
        queue: Arc<AsyncQueue>,
    },
}

impl Kind {
    pub(crate) fn queue(&self) -> Option<&Arc<AsyncQueue>> {
        match self {
            Kind::Sync(_) => None,
            Kind::AsyncFn { queue, .. } => Some(queue),
            Kind::AsyncTask { queue } => Some(queue),
        }
    }

    pub(crate) fn is_async_task(&self) -> bool {
        matches!(self, Kind::AsyncTask { .. })
    }
}

pub struct Subscription {
    pub(crate) handle: u64,
    id: u64,
    filter: Mutex<EventType>,
    pub(crate) kind: Kind,
    active: AtomicBool,
    outstanding: AtomicUsize,
    sub_end_emitted: AtomicBool,
    pub(crate) owner: Mutex<Weak<SubListShared>>,
}

/// External reference and in-handler sub-mgmt handle, interchangeably: the
/// `unsubscribe`/`resubscribe`/`sub_type` API used by external callers and
/// the `unsub`/`resub`/`get_sub` facade used by a running handler are the
/// same operations on the same type here.
pub type SubRef = Arc<Subscription>;

impl Subscription {
    pub(crate) fn new(id: u64, filter: EventType, kind: Kind) -> Arc<Self> {
        Arc::new(Self {
            handle: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
            id,
            filter: Mutex::new(filter),
            kind,
            active: AtomicBool::new(true),
            outstanding: AtomicUsize::new(0),
            sub_end_emitted: AtomicBool::new(false),
            owner: Mutex::new(Weak::new()),
        })
    }

    /// 0 means anonymous: not reachable through `lookup`.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Envelopes enqueued but not yet freed by a consumer. Informational —
    /// storage release is governed by the `Arc` strong count, not this
    /// counter.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// `get_sub`: the filter currently in effect.
    pub fn sub_type(&self) -> EventType {
        *self.filter.lock().unwrap()
    }

    /// `resub`: atomically replace the filter. Rejects a family change —
    /// the typed payload for a family is fixed at subscribe time.
    pub fn resub(&self, new_filter: EventType) -> Result<(), BusError> {
        let mut guard = self.filter.lock().unwrap();
        if guard.family() != new_filter.family() {
            return Err(BusError::FamilyMismatch {
                from: guard.family(),
                to: new_filter.family(),
            });
        }
        *guard = new_filter;
        Ok(())
    }

    /// `unsub`/`unsubscribe`: transition to inactive and unlink from the
    /// owning sublist. Idempotent; returns `false` if already inactive.
    pub fn unsubscribe(self: &Arc<Self>) -> bool {
        if self
            .active
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.on_deactivated();
        if let Some(owner) = self.owner.lock().unwrap().upgrade() {
            owner.unlink(self.handle);
        }
        metrics::record_unsubscribe();
        debug!(target: "evbus", "unsubscribe: handle={} id={}", self.handle, self.id);
        true
    }

    /// `resubscribe`: alias of `resub` for external (non-handler) callers.
    pub fn resubscribe(self: &Arc<Self>, new_filter: EventType) -> Result<(), BusError> {
        let result = self.resub(new_filter);
        metrics::record_resubscribe(result.is_ok());
        result
    }

    /// Runs exactly once, on the transition from active to inactive,
    /// regardless of which path triggered it (`unsub`, lookup-based
    /// unsubscribe, or sublist `destroy`): emits the terminal `SUB_END` for
    /// `AsyncTask` subscriptions, and signals the core-owned worker thread
    /// to drain and exit for `AsyncFn` subscriptions.
    fn on_deactivated(self: &Arc<Self>) {
        match &self.kind {
            Kind::AsyncTask { .. } => {
                if self
                    .sub_end_emitted
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    if let Some(queue) = self.kind.queue() {
                        self.note_enqueued();
                        queue.push(crate::queue::AsyncEnvelope::control_sub_end(self.clone()));
                        metrics::record_sub_end_emitted();
                    }
                }
            }
            Kind::AsyncFn { parker, shutdown, .. } => {
                shutdown.store(true, Ordering::Release);
                parker.wake();
                trace!(target: "evbus", "unsubscribe: handle={} signaled async-fn worker to drain and exit", self.handle);
            }
            Kind::Sync(_) => {}
        }
    }

    pub(crate) fn note_enqueued(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    /// Called by a consumer after it has fully processed/dropped an envelope
    /// belonging to this subscription. Purely informational bookkeeping;
    /// the envelope's `SubRef` clone dropping is what actually releases the
    /// reference.
    pub fn note_freed(&self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        metrics::record_async_envelope_freed();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("handle", &self.handle)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
