//! The metrics provider seam: everything the agent knows about the host goes
//! through [`MetricsProvider`].
//!
//! Cancellation is cooperative and done by dropping the returned future.
//! Implementations must only await cancel-safe operations and must run
//! blocking OS work on the blocking pool, so an abandoned call stops holding
//! the session up as soon as the caller moves on. A blocking job that is
//! already running finishes in the background and its result is discarded.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{DiskUsage, MemoryInfo, MemoryStats, TemperatureStat};

pub type Pid = i32;

#[async_trait]
pub trait MetricsProvider: Send + Sync + 'static {
    /// CPU utilisation measured over `interval`; resolves after roughly
    /// `interval`. One entry per logical CPU when `per_cpu`, otherwise a
    /// single aggregate entry.
    async fn cpu_percent(
        &self,
        interval: Duration,
        per_cpu: bool,
    ) -> Result<Vec<f64>, ProviderError>;

    async fn virtual_memory(&self) -> Result<MemoryStats, ProviderError>;

    async fn temperatures(&self) -> Result<Vec<TemperatureStat>, ProviderError>;

    async fn disk_usage(&self, path: &str) -> Result<DiskUsage, ProviderError>;

    /// Enumerate live processes. The returned order is the order snapshots use.
    async fn processes(&self) -> Result<Vec<Pid>, ProviderError>;

    async fn process_name(&self, pid: Pid) -> Result<String, ProviderError>;

    async fn process_cpu_percent(&self, pid: Pid) -> Result<f64, ProviderError>;

    async fn process_memory_percent(&self, pid: Pid) -> Result<f32, ProviderError>;

    async fn process_memory_info(&self, pid: Pid) -> Result<MemoryInfo, ProviderError>;
}
