//! Metrics collection using sysinfo.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{
    Components, CpuRefreshKind, Disks, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System,
};
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;
use tracing::debug;

use crate::error::ProviderError;
use crate::provider::{MetricsProvider, Pid};
use crate::types::{DiskUsage, MemoryInfo, MemoryStats, TemperatureStat};

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// [`MetricsProvider`] backed by sysinfo.
///
/// Process queries read from the table captured by the most recent
/// [`MetricsProvider::processes`] call; a pid that dropped out of that table
/// reports [`ProviderError::ProcessGone`].
#[derive(Clone)]
pub struct SysinfoProvider {
    // Persistent handles, refreshed on demand
    sys: Arc<Mutex<System>>,
    components: Arc<Mutex<Components>>,
    disks: Arc<Mutex<Disks>>,
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProvider {
    pub fn new() -> Self {
        Self {
            sys: Arc::new(Mutex::new(System::new())),
            components: Arc::new(Mutex::new(Components::new_with_refreshed_list())),
            disks: Arc::new(Mutex::new(Disks::new_with_refreshed_list())),
        }
    }

    async fn with_process<T>(
        &self,
        pid: Pid,
        f: impl FnOnce(&sysinfo::Process, &System) -> T,
    ) -> Result<T, ProviderError> {
        let raw = u32::try_from(pid).map_err(|_| ProviderError::ProcessGone(pid))?;
        let guard = self.sys.lock().await;
        let sys: &System = &guard;
        sys.process(sysinfo::Pid::from_u32(raw))
            .map(|p| f(p, sys))
            .ok_or(ProviderError::ProcessGone(pid))
    }
}

#[async_trait]
impl MetricsProvider for SysinfoProvider {
    async fn cpu_percent(
        &self,
        interval: Duration,
        per_cpu: bool,
    ) -> Result<Vec<f64>, ProviderError> {
        // A private System per call: concurrent sessions with different
        // intervals must not reset each other's measurement window.
        let kind = RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_cpu_usage());
        let mut sys = spawn_blocking(move || System::new_with_specifics(kind)).await?;

        tokio::time::sleep(interval.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;

        spawn_blocking(move || {
            sys.refresh_cpu_usage();
            if sys.cpus().is_empty() {
                return Err(ProviderError::Cpu("no cpus reported".into()));
            }
            Ok(if per_cpu {
                sys.cpus().iter().map(|c| c.cpu_usage() as f64).collect()
            } else {
                vec![sys.global_cpu_usage() as f64]
            })
        })
        .await?
    }

    async fn virtual_memory(&self) -> Result<MemoryStats, ProviderError> {
        let sys = self.sys.clone();
        spawn_blocking(move || {
            let mut sys = sys.blocking_lock();
            sys.refresh_memory();
            let total = sys.total_memory();
            if total == 0 {
                return Err(ProviderError::Memory("total memory reported as zero".into()));
            }
            let used = sys.used_memory();
            Ok(MemoryStats {
                total,
                available: sys.available_memory(),
                used,
                used_percent: percent(used, total),
                free: sys.free_memory(),
                swap_total: sys.total_swap(),
                swap_free: sys.free_swap(),
            })
        })
        .await?
    }

    async fn temperatures(&self) -> Result<Vec<TemperatureStat>, ProviderError> {
        let components = self.components.clone();
        spawn_blocking(move || {
            let mut components = components.blocking_lock();
            components.refresh(true);
            Ok(components
                .iter()
                .filter_map(|c| {
                    // sensors without a current reading are skipped
                    let temperature = c.temperature().filter(|t| t.is_finite())?;
                    Some(TemperatureStat {
                        sensor_key: c.label().to_string(),
                        temperature: temperature as f64,
                        sensor_critical: c.critical().map(f64::from),
                    })
                })
                .collect())
        })
        .await?
    }

    async fn disk_usage(&self, path: &str) -> Result<DiskUsage, ProviderError> {
        let disks = self.disks.clone();
        let requested = path.to_string();
        spawn_blocking(move || {
            let fail = |reason: String| ProviderError::Disk {
                path: requested.clone(),
                reason,
            };
            let target: PathBuf = Path::new(&requested)
                .canonicalize()
                .map_err(|e| fail(e.to_string()))?;

            let mut disks = disks.blocking_lock();
            disks.refresh(true);
            let disk = disks
                .list()
                .iter()
                .filter(|d| target.starts_with(d.mount_point()))
                .max_by_key(|d| d.mount_point().as_os_str().len())
                .ok_or_else(|| fail("no mounted filesystem contains this path".into()))?;

            let total = disk.total_space();
            let free = disk.available_space();
            let used = total.saturating_sub(free);
            debug!(path = %requested, mount = %disk.mount_point().display(), "disk usage");
            Ok(DiskUsage {
                path: requested.clone(),
                fstype: disk.file_system().to_string_lossy().into_owned(),
                total,
                free,
                used,
                used_percent: percent(used, total),
            })
        })
        .await?
    }

    async fn processes(&self) -> Result<Vec<Pid>, ProviderError> {
        let sys = self.sys.clone();
        spawn_blocking(move || {
            let mut sys = sys.blocking_lock();
            sys.refresh_memory();
            sys.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing().with_cpu().with_memory(),
            );
            if sys.processes().is_empty() {
                return Err(ProviderError::ProcessList("process table is empty".into()));
            }
            let mut pids: Vec<Pid> = sys
                .processes()
                .keys()
                .filter_map(|pid| Pid::try_from(pid.as_u32()).ok())
                .collect();
            pids.sort_unstable();
            Ok(pids)
        })
        .await?
    }

    async fn process_name(&self, pid: Pid) -> Result<String, ProviderError> {
        self.with_process(pid, |p, _| p.name().to_string_lossy().into_owned())
            .await
    }

    async fn process_cpu_percent(&self, pid: Pid) -> Result<f64, ProviderError> {
        // Lifetime average: total CPU time over wall time since start.
        self.with_process(pid, |p, _| {
            let run_ms = p.run_time().saturating_mul(1_000);
            percent(p.accumulated_cpu_time(), run_ms)
        })
        .await
    }

    async fn process_memory_percent(&self, pid: Pid) -> Result<f32, ProviderError> {
        self.with_process(pid, |p, sys| {
            percent(p.memory(), sys.total_memory()) as f32
        })
        .await
    }

    async fn process_memory_info(&self, pid: Pid) -> Result<MemoryInfo, ProviderError> {
        self.with_process(pid, |p, _| MemoryInfo {
            rss: p.memory(),
            vms: p.virtual_memory(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn root_disk_usage_is_consistent() {
        let usage = SysinfoProvider::new().disk_usage("/").await.unwrap();
        assert_eq!(usage.path, "/");
        assert!(usage.total >= usage.used);
        assert!((0.0..=100.0).contains(&usage.used_percent));
    }

    #[tokio::test]
    async fn missing_path_is_a_disk_error() {
        let err = SysinfoProvider::new()
            .disk_usage("/doesnotexist")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Disk { ref path, .. } if path == "/doesnotexist"));
    }

    #[tokio::test]
    async fn aggregate_and_per_cpu_lengths() {
        let provider = SysinfoProvider::new();
        let aggregate = provider
            .cpu_percent(Duration::from_millis(10), false)
            .await
            .unwrap();
        assert_eq!(aggregate.len(), 1);

        let per_cpu = provider
            .cpu_percent(Duration::from_millis(10), true)
            .await
            .unwrap();
        assert!(!per_cpu.is_empty());
    }

    #[tokio::test]
    async fn short_cpu_window_is_raised_to_minimum() {
        let started = std::time::Instant::now();
        SysinfoProvider::new()
            .cpu_percent(Duration::from_millis(1), false)
            .await
            .unwrap();
        assert!(started.elapsed() >= sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    }

    #[tokio::test]
    async fn own_process_is_listed_and_sampled() {
        let provider = SysinfoProvider::new();
        let me = Pid::try_from(std::process::id()).unwrap();
        let pids = provider.processes().await.unwrap();
        assert!(pids.contains(&me));
        assert!(pids.windows(2).all(|w| w[0] < w[1]));

        let info = provider.process_memory_info(me).await.unwrap();
        assert!(info.rss > 0);
        assert!(provider.process_cpu_percent(me).await.unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn unknown_pid_is_gone() {
        let err = SysinfoProvider::new().process_name(-1).await.unwrap_err();
        assert!(matches!(err, ProviderError::ProcessGone(-1)));
    }
}
