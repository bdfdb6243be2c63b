//! The work ring: pending reconciliation entries with per-CID mutual
//! exclusion.
//!
//! Entries are keyed by `(api, cid)`. At most one entry per key is
//! pending at a time — a newer push coalesces onto the old slot and the
//! superseded entry is returned so its job can be cancelled — and at
//! most one worker holds a key at a time, which serializes all work for
//! a CID.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use cid::Cid;
use floe_types::{Action, ApiId, CidConfig};
use tokio::sync::Notify;

/// The per-CID serialization unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct RingKey {
    pub api_id: ApiId,
    pub cid: Cid,
}

/// One pending unit of work.
#[derive(Debug, Clone)]
pub(crate) enum WorkItem {
    /// Full reconciliation of a CID against a pushed configuration.
    Reconcile { action: Action },
    /// Renewal evaluation of a CID's expiring deals.
    Renew { api_id: ApiId, config: CidConfig },
}

impl WorkItem {
    pub(crate) fn key(&self) -> RingKey {
        match self {
            Self::Reconcile { action } => RingKey {
                api_id: action.api_id.clone(),
                cid: action.cid,
            },
            Self::Renew { api_id, config } => RingKey {
                api_id: api_id.clone(),
                cid: config.cid,
            },
        }
    }
}

struct RingInner {
    entries: HashMap<RingKey, WorkItem>,
    /// Dispatch order; holds each pending key exactly once.
    order: VecDeque<RingKey>,
    /// Keys currently held by a worker.
    executing: HashSet<RingKey>,
    shutdown: bool,
}

/// Pending work with per-key mutual exclusion and coalescing.
pub(crate) struct WorkRing {
    inner: Mutex<RingInner>,
    notify: Notify,
}

impl WorkRing {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RingInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                executing: HashSet::new(),
                shutdown: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Insert an item, coalescing onto any pending entry for the same
    /// key. Returns the superseded reconcile action, if one was pending.
    pub(crate) fn push(&self, item: WorkItem) -> Option<Action> {
        let key = item.key();
        let prev = {
            let mut inner = self.inner.lock().unwrap();
            let prev = inner.entries.insert(key.clone(), item);
            if prev.is_none() {
                inner.order.push_back(key);
            }
            prev
        };
        self.notify.notify_waiters();
        match prev {
            Some(WorkItem::Reconcile { action }) => Some(action),
            _ => None,
        }
    }

    /// Insert only when no entry is pending for the key; returns whether
    /// the item was accepted.
    pub(crate) fn push_if_absent(&self, item: WorkItem) -> bool {
        let key = item.key();
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.entries.contains_key(&key) {
                return false;
            }
            inner.entries.insert(key.clone(), item);
            inner.order.push_back(key);
        }
        self.notify.notify_waiters();
        true
    }

    /// Wait for the next dispatchable entry. Returns `None` once the
    /// ring is shut down; remaining entries stay persisted in the store
    /// for restart recovery.
    pub(crate) async fn next(&self) -> Option<(RingKey, WorkItem)> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            match self.try_take() {
                Some(taken) => return taken,
                None => notified.await,
            }
        }
    }

    /// One dispatch attempt: `Some(None)` on shutdown, `Some(Some(..))`
    /// when an entry whose key is not executing is available.
    fn try_take(&self) -> Option<Option<(RingKey, WorkItem)>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.shutdown {
            return Some(None);
        }
        let pos = inner
            .order
            .iter()
            .position(|k| !inner.executing.contains(k))?;
        let key = inner.order.remove(pos).unwrap();
        let item = inner.entries.remove(&key).unwrap();
        inner.executing.insert(key.clone());
        Some(Some((key, item)))
    }

    /// Release a key after its entry finished executing.
    pub(crate) fn done(&self, key: &RingKey) {
        self.inner.lock().unwrap().executing.remove(key);
        self.notify.notify_waiters();
    }

    /// Stop handing out entries; in-flight workers finish their current
    /// entry.
    pub(crate) fn shutdown(&self) {
        self.inner.lock().unwrap().shutdown = true;
        self.notify.notify_waiters();
    }
}
