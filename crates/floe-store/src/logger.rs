//! Per-CID log with durable append and watcher fan-out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cid::Cid;
use floe_types::{unix_nanos, JobId, LogEntry};
use tokio::sync::broadcast;
use tracing::error;

use crate::{SchedStore, StoreError};

/// Buffered entries per watcher before the oldest are dropped with an
/// explicit overflow signal.
const LOG_CHANNEL_CAPACITY: usize = 512;

/// Strictly monotonic nanosecond clock.
///
/// Returns `max(wall_clock, last) + 1`, so values always advance even
/// under rapid successive calls or wall-clock retreat. Doubles as the
/// per-CID log sequence.
pub struct MonotonicClock {
    last: AtomicU64,
}

impl MonotonicClock {
    /// Create a clock initialised to the current wall-clock time.
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(unix_nanos()),
        }
    }

    /// Advance and return a new unique timestamp.
    pub fn tick(&self) -> u64 {
        loop {
            let prev = self.last.load(Ordering::SeqCst);
            let candidate = prev.max(unix_nanos()) + 1;
            if self
                .last
                .compare_exchange(prev, candidate, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return candidate;
            }
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Durable per-CID log, multiplexed to registered watchers.
///
/// Appends go to the store first and are then fanned out over a bounded
/// broadcast channel; a slow watcher observes a lag signal rather than
/// blocking the writer.
pub struct CidLogger {
    store: Arc<SchedStore>,
    clock: MonotonicClock,
    tx: broadcast::Sender<LogEntry>,
}

impl CidLogger {
    /// Create a logger over the given store.
    pub fn new(store: Arc<SchedStore>) -> Self {
        let (tx, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        Self {
            store,
            clock: MonotonicClock::new(),
            tx,
        }
    }

    /// Append one entry to the CID's log and publish it to watchers.
    ///
    /// Store failures are reported through telemetry; the entry is still
    /// published so live watchers are not starved by a disk hiccup.
    pub fn log(&self, cid: &Cid, jid: &JobId, msg: impl Into<String>) {
        let entry = LogEntry {
            cid: *cid,
            jid: jid.clone(),
            timestamp: self.clock.tick(),
            msg: msg.into(),
        };
        if let Err(e) = self.store.append_log(&entry) {
            error!(%cid, %jid, error = %e, "failed to persist log entry");
        }
        let _ = self.tx.send(entry);
    }

    /// All stored entries for a CID, oldest first.
    pub fn history(&self, cid: &Cid) -> Result<Vec<LogEntry>, StoreError> {
        self.store.logs_for(cid)
    }

    /// Subscribe to future entries across all CIDs.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }
}
