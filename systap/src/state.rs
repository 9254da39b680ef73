//! Shared agent state: the metrics provider, the last-snapshot cache and the
//! shutdown signal every session listens to.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::cache::LastSnapshotCache;
use crate::config::Config;
use crate::provider::MetricsProvider;

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn MetricsProvider>,

    // Last system snapshot for fast attach
    pub last_snapshot: Arc<LastSnapshotCache>,

    pub default_interval: Duration,
    pub per_cpu: bool,

    // Live push sessions; decremented by the session task on exit
    pub active_sessions: Arc<AtomicUsize>,
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        config: &Config,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            provider,
            last_snapshot: Arc::new(LastSnapshotCache::new(config.cache_ttl)),
            default_interval: config.default_interval,
            per_cpu: config.per_cpu,
            active_sessions: Arc::new(AtomicUsize::new(0)),
            shutdown,
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Acquire)
    }
}
