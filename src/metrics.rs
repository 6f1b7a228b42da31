//! Lightweight global metrics for the event bus.
//!
//! Thread-safe atomic counters, one `static` per observable event, snapshot
//! taken with a single `Relaxed` load per counter — the same shape as the
//! teacher crate's own metrics module, narrowed to the bus's own surface:
//! subscribe/unsubscribe/resubscribe, publish fan-out, and the async queue's
//! enqueue/failure paths.

use std::sync::atomic::{AtomicU64, Ordering};

static SUBSCRIBES_TOTAL: AtomicU64 = AtomicU64::new(0);
static UNSUBSCRIBES_TOTAL: AtomicU64 = AtomicU64::new(0);
static RESUBSCRIBES_TOTAL: AtomicU64 = AtomicU64::new(0);
static RESUBSCRIBE_FAMILY_MISMATCHES: AtomicU64 = AtomicU64::new(0);

static PUBLISHES_TOTAL: AtomicU64 = AtomicU64::new(0);
static SYNC_HANDLERS_INVOKED: AtomicU64 = AtomicU64::new(0);

static ASYNC_ENVELOPES_ENQUEUED: AtomicU64 = AtomicU64::new(0);
static ASYNC_ENVELOPES_FREED: AtomicU64 = AtomicU64::new(0);
static ASYNC_ALLOC_FAILURES: AtomicU64 = AtomicU64::new(0);
static SUB_END_EMITTED: AtomicU64 = AtomicU64::new(0);
static SUBSCRIBE_ALLOC_FAILURES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub subscribes_total: u64,
    pub unsubscribes_total: u64,
    pub resubscribes_total: u64,
    pub resubscribe_family_mismatches: u64,

    pub publishes_total: u64,
    pub sync_handlers_invoked: u64,

    pub async_envelopes_enqueued: u64,
    pub async_envelopes_freed: u64,
    pub async_alloc_failures: u64,
    pub sub_end_emitted: u64,
    pub subscribe_alloc_failures: u64,
}

impl MetricsSnapshot {
    /// Envelopes pushed but not yet freed by a consumer, across the whole
    /// process. Mirrors an individual subscription's `outstanding()`.
    pub fn async_envelopes_outstanding(&self) -> u64 {
        self.async_envelopes_enqueued.saturating_sub(self.async_envelopes_freed)
    }
}

pub fn record_subscribe() {
    SUBSCRIBES_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn record_unsubscribe() {
    UNSUBSCRIBES_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn record_resubscribe(ok: bool) {
    RESUBSCRIBES_TOTAL.fetch_add(1, Ordering::Relaxed);
    if !ok {
        RESUBSCRIBE_FAMILY_MISMATCHES.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_publish() {
    PUBLISHES_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn record_sync_handler_invoked() {
    SYNC_HANDLERS_INVOKED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_async_envelope_enqueued() {
    ASYNC_ENVELOPES_ENQUEUED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_async_envelope_freed() {
    ASYNC_ENVELOPES_FREED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_async_alloc_failure() {
    ASYNC_ALLOC_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_sub_end_emitted() {
    SUB_END_EMITTED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_subscribe_alloc_failure() {
    SUBSCRIBE_ALLOC_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        subscribes_total: SUBSCRIBES_TOTAL.load(Ordering::Relaxed),
        unsubscribes_total: UNSUBSCRIBES_TOTAL.load(Ordering::Relaxed),
        resubscribes_total: RESUBSCRIBES_TOTAL.load(Ordering::Relaxed),
        resubscribe_family_mismatches: RESUBSCRIBE_FAMILY_MISMATCHES.load(Ordering::Relaxed),

        publishes_total: PUBLISHES_TOTAL.load(Ordering::Relaxed),
        sync_handlers_invoked: SYNC_HANDLERS_INVOKED.load(Ordering::Relaxed),

        async_envelopes_enqueued: ASYNC_ENVELOPES_ENQUEUED.load(Ordering::Relaxed),
        async_envelopes_freed: ASYNC_ENVELOPES_FREED.load(Ordering::Relaxed),
        async_alloc_failures: ASYNC_ALLOC_FAILURES.load(Ordering::Relaxed),
        sub_end_emitted: SUB_END_EMITTED.load(Ordering::Relaxed),
        subscribe_alloc_failures: SUBSCRIBE_ALLOC_FAILURES.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    SUBSCRIBES_TOTAL.store(0, Ordering::Relaxed);
    UNSUBSCRIBES_TOTAL.store(0, Ordering::Relaxed);
    RESUBSCRIBES_TOTAL.store(0, Ordering::Relaxed);
    RESUBSCRIBE_FAMILY_MISMATCHES.store(0, Ordering::Relaxed);

    PUBLISHES_TOTAL.store(0, Ordering::Relaxed);
    SYNC_HANDLERS_INVOKED.store(0, Ordering::Relaxed);

    ASYNC_ENVELOPES_ENQUEUED.store(0, Ordering::Relaxed);
    ASYNC_ENVELOPES_FREED.store(0, Ordering::Relaxed);
    ASYNC_ALLOC_FAILURES.store(0, Ordering::Relaxed);
    SUB_END_EMITTED.store(0, Ordering::Relaxed);
    SUBSCRIBE_ALLOC_FAILURES.store(0, Ordering::Relaxed);
}
