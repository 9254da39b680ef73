//! Scripted provider and body helpers shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, BodyDataStream};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use systap::error::ProviderError;
use systap::provider::{MetricsProvider, Pid};
use systap::sse::decode_event;
use systap::types::{DiskUsage, MemoryInfo, MemoryStats, TemperatureStat};
use systap::{AppState, Config};

pub struct FakeProcess {
    pub pid: Pid,
    pub name: &'static str,
    /// Name resolves but every later query fails, like a process exiting mid-sample.
    pub broken: bool,
}

pub fn proc(pid: Pid, name: &'static str) -> FakeProcess {
    FakeProcess {
        pid,
        name,
        broken: false,
    }
}

pub fn broken_proc(pid: Pid, name: &'static str) -> FakeProcess {
    FakeProcess {
        pid,
        name,
        broken: true,
    }
}

/// Deterministic provider. Each CPU sample reports the running call count,
/// so consecutive snapshots are distinguishable.
#[derive(Default)]
pub struct FakeProvider {
    pub processes: Vec<FakeProcess>,
    pub sensors: Vec<TemperatureStat>,

    pub fail_cpu: AtomicBool,
    pub fail_memory: AtomicBool,
    pub fail_temperatures: AtomicBool,
    pub fail_listing: AtomicBool,

    pub cpu_calls: AtomicUsize,
    pub memory_calls: AtomicUsize,
    pub temperature_calls: AtomicUsize,
    pub listing_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn with_processes(processes: Vec<FakeProcess>) -> Self {
        Self {
            processes,
            ..Default::default()
        }
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn find(&self, pid: Pid) -> Result<&FakeProcess, ProviderError> {
        self.processes
            .iter()
            .find(|p| p.pid == pid)
            .ok_or(ProviderError::ProcessGone(pid))
    }

    fn healthy(&self, pid: Pid) -> Result<&FakeProcess, ProviderError> {
        match self.find(pid)? {
            p if p.broken => Err(ProviderError::ProcessGone(pid)),
            p => Ok(p),
        }
    }
}

pub fn memory() -> MemoryStats {
    MemoryStats {
        total: 1000,
        available: 600,
        used: 400,
        used_percent: 40.0,
        free: 500,
        swap_total: 0,
        swap_free: 0,
    }
}

#[async_trait]
impl MetricsProvider for FakeProvider {
    async fn cpu_percent(
        &self,
        interval: Duration,
        per_cpu: bool,
    ) -> Result<Vec<f64>, ProviderError> {
        let n = self.cpu_calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(interval).await;
        if self.fail_cpu.load(Ordering::SeqCst) {
            return Err(ProviderError::Cpu("scripted failure".into()));
        }
        Ok(if per_cpu {
            vec![n as f64, n as f64]
        } else {
            vec![n as f64]
        })
    }

    async fn virtual_memory(&self) -> Result<MemoryStats, ProviderError> {
        self.memory_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_memory.load(Ordering::SeqCst) {
            return Err(ProviderError::Memory("scripted failure".into()));
        }
        Ok(memory())
    }

    async fn temperatures(&self) -> Result<Vec<TemperatureStat>, ProviderError> {
        self.temperature_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_temperatures.load(Ordering::SeqCst) {
            return Err(ProviderError::Temperature("scripted failure".into()));
        }
        Ok(self.sensors.clone())
    }

    async fn disk_usage(&self, path: &str) -> Result<DiskUsage, ProviderError> {
        if path != "/" {
            return Err(ProviderError::Disk {
                path: path.to_string(),
                reason: "No such file or directory (os error 2)".into(),
            });
        }
        Ok(DiskUsage {
            path: "/".into(),
            fstype: "ext4".into(),
            total: 100,
            free: 40,
            used: 60,
            used_percent: 60.0,
        })
    }

    async fn processes(&self) -> Result<Vec<Pid>, ProviderError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(ProviderError::ProcessList("scripted failure".into()));
        }
        Ok(self.processes.iter().map(|p| p.pid).collect())
    }

    async fn process_name(&self, pid: Pid) -> Result<String, ProviderError> {
        Ok(self.find(pid)?.name.to_string())
    }

    async fn process_cpu_percent(&self, pid: Pid) -> Result<f64, ProviderError> {
        self.healthy(pid).map(|p| p.pid as f64 / 10.0)
    }

    async fn process_memory_percent(&self, pid: Pid) -> Result<f32, ProviderError> {
        self.healthy(pid).map(|_| 1.5)
    }

    async fn process_memory_info(&self, pid: Pid) -> Result<MemoryInfo, ProviderError> {
        self.healthy(pid).map(|p| MemoryInfo {
            rss: p.pid as u64 * 1024,
            vms: p.pid as u64 * 4096,
        })
    }
}

pub const TEST_INTERVAL: Duration = Duration::from_millis(20);

/// App state around `provider` with a short default interval and no cache
/// expiry. Keep the sender alive for as long as the state is in use.
pub fn test_state(provider: Arc<FakeProvider>) -> (AppState, watch::Sender<bool>) {
    let config = Config {
        default_interval: TEST_INTERVAL,
        cache_ttl: None,
        ..Config::default()
    };
    let (tx, rx) = watch::channel(false);
    (AppState::new(provider, &config, rx), tx)
}

/// Reads `data:` frames off a streaming response body.
pub struct FrameReader {
    stream: BodyDataStream,
    buf: String,
}

impl FrameReader {
    pub fn new(body: Body) -> Self {
        Self {
            stream: body.into_data_stream(),
            buf: String::new(),
        }
    }

    /// Next complete frame, or `None` once the stream ends.
    pub async fn next_frame(&mut self) -> Option<String> {
        loop {
            if let Some(end) = self.buf.find("\n\n") {
                let frame = self.buf[..end].to_string();
                self.buf.drain(..end + 2);
                return Some(frame);
            }
            let chunk = tokio::time::timeout(Duration::from_secs(5), self.stream.next())
                .await
                .expect("timed out waiting for a frame")?
                .expect("body error");
            self.buf.push_str(std::str::from_utf8(&chunk).expect("utf-8 frame"));
        }
    }

    pub async fn next<T: DeserializeOwned>(&mut self) -> T {
        let frame = self.next_frame().await.expect("stream ended");
        decode_event(&frame).expect("decodable frame")
    }
}
