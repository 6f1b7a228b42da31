//! MPSC async envelope queue (C4).
//!
//! Producers (any publishing thread) push under a short-held mutex; the
//! consumer pops without blocking. A push that transitions the queue from
//! empty to non-empty issues exactly one wakeup through the attached
//! [`Wakeup`] token — coalesced, at-least-one-after-the-transition, per the
//! spec, not one-per-push.

use crate::event_type::EventType;
use crate::subscription::SubRef;
use crate::wakeup::Wakeup;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A dispatcher-allocated, queue-borne record: a safe payload copy plus a
/// reference to its owning subscription.
pub struct AsyncEnvelope {
    pub event_type: EventType,
    safe: Option<Box<dyn Any + Send>>,
    pub mgmt: SubRef,
}

impl AsyncEnvelope {
    pub(crate) fn new(event_type: EventType, safe: Option<Box<dyn Any + Send>>, mgmt: SubRef) -> Self {
        Self { event_type, safe, mgmt }
    }

    pub(crate) fn control_sub_end(mgmt: SubRef) -> Self {
        Self::new(EventType::sub_end(), None, mgmt)
    }

    /// Downcast the frozen safe payload. `None` if the publish carried no
    /// payload, or `T` doesn't match what was published.
    pub fn safe<T: 'static>(&self) -> Option<&T> {
        self.safe.as_ref().and_then(|b| b.downcast_ref::<T>())
    }

    pub fn is_sub_end(&self) -> bool {
        self.event_type == EventType::sub_end()
    }

    /// Consume the envelope into an owned [`crate::subscription::AsyncEvent`]
    /// for handing to an `AsyncFn` handler. `self` still runs its own `Drop`
    /// at the end of this call, so the freeing bookkeeping happens at
    /// exactly the same point it would for a borrow-then-drop consumer.
    pub fn into_async_event(mut self) -> crate::subscription::AsyncEvent {
        crate::subscription::AsyncEvent {
            event_type: self.event_type,
            safe: self.safe.take(),
            mgmt: self.mgmt.clone(),
        }
    }
}

impl Drop for AsyncEnvelope {
    /// Consuming code is expected to call nothing special: dropping the
    /// envelope is exactly "freeing" it. This is what decrements the
    /// subscription's informational `outstanding` counter and releases this
    /// envelope's `Arc<Subscription>` clone (the one the dispatcher took
    /// when it enqueued this envelope).
    fn drop(&mut self) {
        self.mgmt.note_freed();
    }
}

#[derive(Default)]
struct Inner {
    items: VecDeque<AsyncEnvelope>,
}

/// Multi-producer, single-consumer FIFO of [`AsyncEnvelope`]s paired with an
/// opaque wakeup token. Not owned by the subscription: for the `AsyncTask`
/// flavor it is owned by the user and must outlive the final `SUB_END` drain.
pub struct AsyncQueue {
    inner: Mutex<Inner>,
    wakeup: Arc<dyn Wakeup>,
}

impl AsyncQueue {
    pub fn new(wakeup: Arc<dyn Wakeup>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            wakeup,
        })
    }

    /// Producer side: append an envelope, waking the consumer if the queue
    /// was empty.
    pub fn push(&self, env: AsyncEnvelope) {
        let was_empty = {
            let mut g = self.inner.lock().unwrap();
            let was_empty = g.items.is_empty();
            g.items.push_back(env);
            was_empty
        };
        if was_empty {
            self.wakeup.wake();
        }
    }

    /// Consumer side: non-blocking pop. Not safe to call concurrently with
    /// itself (single consumer), though it may race freely with `push`.
    pub fn pop(&self) -> Option<AsyncEnvelope> {
        self.inner.lock().unwrap().items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{Kind, Subscription};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dummy_sub() -> SubRef {
        Subscription::new(0, EventType::new(1, 1), Kind::Sync(Arc::new(|_| {})))
    }

    #[test]
    fn fifo_order_is_preserved() {
        let q = AsyncQueue::new(Arc::new(|| {}));
        q.push(AsyncEnvelope::new(EventType::new(1, 1), Some(Box::new(1u32)), dummy_sub()));
        q.push(AsyncEnvelope::new(EventType::new(1, 1), Some(Box::new(2u32)), dummy_sub()));
        assert_eq!(*q.pop().unwrap().safe::<u32>().unwrap(), 1);
        assert_eq!(*q.pop().unwrap().safe::<u32>().unwrap(), 2);
        assert!(q.pop().is_none());
    }

    #[test]
    fn wakeup_fires_on_empty_to_nonempty_transition() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let q = AsyncQueue::new(Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        q.push(AsyncEnvelope::new(EventType::new(1, 1), None, dummy_sub()));
        q.push(AsyncEnvelope::new(EventType::new(1, 1), None, dummy_sub()));
        // Coalesced: only the empty->non-empty transition wakes.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let _ = q.pop();
        q.push(AsyncEnvelope::new(EventType::new(1, 1), None, dummy_sub()));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "still non-empty after one pop, no re-wake needed");
    }
}
