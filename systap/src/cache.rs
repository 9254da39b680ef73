//! Last system snapshot, kept so newly attached clients get a value without
//! waiting out a full sampling window.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::types::Snapshot;

#[derive(Debug)]
pub struct CachedSnapshot {
    pub snapshot: Snapshot,
    pub stored_at: Instant,
}

/// Single-slot holder shared by every system stream. Writers replace the slot
/// wholesale; readers clone the `Arc` out and never hold the lock past that.
#[derive(Debug, Default)]
pub struct LastSnapshotCache {
    slot: RwLock<Option<Arc<CachedSnapshot>>>,
    ttl: Option<Duration>,
}

impl LastSnapshotCache {
    /// `ttl` of `None` keeps the last value forever.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            slot: RwLock::new(None),
            ttl,
        }
    }

    pub fn store(&self, snapshot: Snapshot) {
        let entry = Arc::new(CachedSnapshot {
            snapshot,
            stored_at: Instant::now(),
        });
        *self.slot.write() = Some(entry);
    }

    /// The latest entry, unless it is older than the TTL.
    pub fn load(&self) -> Option<Arc<CachedSnapshot>> {
        let entry = self.slot.read().clone()?;
        match self.ttl {
            Some(ttl) if entry.stored_at.elapsed() > ttl => None,
            _ => Some(entry),
        }
    }
}
