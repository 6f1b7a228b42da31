//! Ordered set of subscriptions under a reader/writer lock (C3).
//!
//! Publish takes the lock for read; subscribe/unsubscribe/resubscribe take
//! it for write. `iter_for_publish` never invokes a handler while holding
//! the lock — it clones the matching `Arc<Subscription>`s out, drops the
//! guard, and only then runs handlers. This is the same shape as the
//! teacher's own `SubRegistry::publish` ("execute outside the lock") and is
//! what makes the documented reentrancy guarantee (a handler may publish
//! recursively on its own sublist) safe against `std::sync::RwLock`, which
//! — unlike a recursive mutex — offers no guarantee about a thread
//! re-acquiring a read lock it already holds.

use crate::config::BusConfig;
use crate::event_type::EventType;
use crate::subscription::{SubRef, Subscription};
use std::sync::{Arc, RwLock};

pub(crate) struct SubListShared {
    members: RwLock<Vec<SubRef>>,
    pub(crate) config: BusConfig,
}

impl SubListShared {
    pub(crate) fn unlink(&self, handle: u64) {
        let mut g = self.members.write().unwrap();
        g.retain(|s| s.handle != handle);
    }
}

/// A scoped set of subscriptions. The process-wide global sublist
/// (`dispatcher::global()`) is just an instance with process lifetime —
/// distinguishable from a user-created one only by who holds it.
#[derive(Clone)]
pub struct SubList(pub(crate) Arc<SubListShared>);

impl SubList {
    pub fn new() -> Self {
        Self::with_config(BusConfig::from_env())
    }

    pub fn with_config(config: BusConfig) -> Self {
        Self(Arc::new(SubListShared {
            members: RwLock::new(Vec::new()),
            config,
        }))
    }

    pub fn config(&self) -> &BusConfig {
        &self.0.config
    }

    /// O(1) append, write-locked. Sets the subscription's owner backlink so
    /// a later `unsub` can find its way back here.
    pub fn insert(&self, sub: SubRef) {
        *sub.owner.lock().unwrap() = Arc::downgrade(&self.0);
        self.0.members.write().unwrap().push(sub);
    }

    /// Linear scan for a matching *identified* (non-zero id) subscription.
    /// Anonymous or missing both return `None`. Read-locked.
    pub fn lookup(&self, id: u64) -> Option<SubRef> {
        if id == 0 {
            return None;
        }
        self.0
            .members
            .read()
            .unwrap()
            .iter()
            .find(|s| s.id() == id && s.is_active())
            .cloned()
    }

    /// `lookup` + `take`: a refcounted external handle to the looked-up
    /// subscription, if any.
    pub fn lookup_take(&self, id: u64) -> Option<SubRef> {
        self.lookup(id)
    }

    /// `lookup` + `unsubscribe`. `false` if absent or already inactive.
    pub fn lookup_unsubscribe(&self, id: u64) -> bool {
        match self.lookup(id) {
            Some(s) => s.unsubscribe(),
            None => false,
        }
    }

    /// `lookup` + `resubscribe`. `false` if absent; propagates a family
    /// mismatch as `Ok(false)` would from `resub` directly — here collapsed
    /// to a bool, matching the other lookup-based helpers.
    pub fn lookup_resubscribe(&self, id: u64, new_filter: EventType) -> bool {
        match self.lookup(id) {
            Some(s) => s.resubscribe(new_filter).is_ok(),
            None => false,
        }
    }

    /// Snapshot of active members matching `event_type`, in insertion order,
    /// taken under a single read lock. The dispatcher walks this *after*
    /// the lock is released.
    pub(crate) fn snapshot_matching(&self, event_type: EventType) -> Vec<SubRef> {
        self.0
            .members
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.is_active() && s.sub_type().matches(event_type))
            .cloned()
            .collect()
    }

    /// Drop any members that went inactive during the last publish walk
    /// (deferred unlink, per §4.3). Safe to call unconditionally; a no-op
    /// when nothing is inactive.
    pub(crate) fn sweep_inactive(&self) {
        let mut g = self.0.members.write().unwrap();
        if g.iter().any(|s| !s.is_active()) {
            g.retain(|s| s.is_active());
        }
    }

    pub fn len(&self) -> usize {
        self.0.members.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark every member inactive, emit `SUB_END` to any async-task member,
    /// and drop the sublist's own reference to each — each subscription is
    /// then released as soon as its outstanding envelopes drain and no
    /// external reference remains.
    pub fn destroy(self) {
        let members = std::mem::take(&mut *self.0.members.write().unwrap());
        for sub in members {
            if sub.unsubscribe() {
                // unsubscribe() already emitted SUB_END and tried to unlink
                // from this same list; the list is already drained above so
                // that unlink is a harmless no-op.
            }
        }
    }
}

impl Default for SubList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::Kind;
    use std::sync::Arc as StdArc;

    fn make_sub(list: &SubList, id: u64, filter: EventType) -> SubRef {
        let sub = Subscription::new(id, filter, Kind::Sync(StdArc::new(|_| {})));
        list.insert(sub.clone());
        sub
    }

    #[test]
    fn insert_and_lookup() {
        let list = SubList::new();
        let s = make_sub(&list, 42, EventType::new(1, 1));
        assert!(StdArc::ptr_eq(&list.lookup(42).unwrap(), &s));
        assert!(list.lookup(7).is_none());
        assert!(list.lookup(0).is_none(), "id 0 is anonymous, never looked up");
    }

    #[test]
    fn unsubscribe_unlinks_from_list() {
        let list = SubList::new();
        let s = make_sub(&list, 1, EventType::new(1, 1));
        assert_eq!(list.len(), 1);
        assert!(s.unsubscribe());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn snapshot_matching_filters_by_event_type() {
        let list = SubList::new();
        make_sub(&list, 1, EventType::new(1, 0b01));
        make_sub(&list, 2, EventType::new(1, 0b10));
        make_sub(&list, 3, EventType::new(2, 0b01));
        let matched = list.snapshot_matching(EventType::new(1, 0b01));
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id(), 1);
    }

    #[test]
    fn destroy_empties_and_deactivates_all() {
        let list = SubList::new();
        let a = make_sub(&list, 1, EventType::new(1, 1));
        let b = make_sub(&list, 2, EventType::new(1, 1));
        list.clone().destroy();
        assert!(!a.is_active());
        assert!(!b.is_active());
    }
}
