//! Subscribers the coordinator broadcasts to.

use crossbeam::channel::Sender;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::snapshot::Snapshot;

/// Identifies one registration. Allocated in increasing order, so ordering by id is
/// ordering by registration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl core::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type SnapshotSender = Sender<Arc<Snapshot>>;

/// Owned exclusively by the coordinator thread.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscribers: BTreeMap<SubscriberId, SnapshotSender>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the id was already registered; the previous sender is replaced.
    pub fn add(&mut self, id: SubscriberId, sender: SnapshotSender) -> bool {
        self.subscribers.insert(id, sender).is_none()
    }

    pub fn remove(&mut self, id: SubscriberId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Registration order.
    pub fn iter(&self) -> impl Iterator<Item = (SubscriberId, &SnapshotSender)> {
        self.subscribers.iter().map(|(id, tx)| (*id, tx))
    }

    /// Drops the given subscribers, returning how many were actually present.
    pub fn prune(&mut self, ids: &[SubscriberId]) -> usize {
        ids.iter().filter(|id| self.remove(**id)).count()
    }
}
