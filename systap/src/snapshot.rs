//! Composes provider calls into snapshots. Stateless: every call is a fresh
//! set of provider queries.

use std::collections::HashSet;
use std::time::Duration;

use tracing::warn;

use crate::error::ProviderError;
use crate::provider::{MetricsProvider, Pid};
use crate::types::{ProcessSnapshot, Snapshot};

/// Process-name allow-list. An empty list admits nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameFilter {
    names: HashSet<String>,
}

impl NameFilter {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Sample CPU (blocking for about `interval`), then memory, then sensors.
/// The first failure aborts the tick; no partial snapshot is ever returned.
pub async fn build_system_snapshot(
    provider: &dyn MetricsProvider,
    interval: Duration,
    per_cpu: bool,
) -> Result<Snapshot, ProviderError> {
    let cpu = provider.cpu_percent(interval, per_cpu).await?;
    let mem = provider.virtual_memory().await?;
    let sensors = provider.temperatures().await?;
    Ok(Snapshot { cpu, mem, sensors })
}

/// Sample every process the provider lists, in its order. Only the listing
/// itself can fail the tick; a process that errors is logged and left out.
pub async fn build_process_snapshot(
    provider: &dyn MetricsProvider,
    filter: Option<&NameFilter>,
) -> Result<Vec<ProcessSnapshot>, ProviderError> {
    let pids = provider.processes().await?;
    let mut out = Vec::with_capacity(match filter {
        Some(f) => f.len(),
        None => pids.len(),
    });

    for pid in pids {
        match sample_process(provider, pid, filter).await {
            Ok(Some(p)) => out.push(p),
            Ok(None) => {}
            Err(e) => warn!(pid, error = %e, "skipping process"),
        }
    }
    Ok(out)
}

/// `Ok(None)` when the process is filtered out.
async fn sample_process(
    provider: &dyn MetricsProvider,
    pid: Pid,
    filter: Option<&NameFilter>,
) -> Result<Option<ProcessSnapshot>, ProviderError> {
    let name = provider.process_name(pid).await?;
    if filter.is_some_and(|f| !f.allows(&name)) {
        return Ok(None);
    }

    let cpu_percent = provider.process_cpu_percent(pid).await?;
    let memory_info = provider.process_memory_info(pid).await?;
    let mem_percent = provider.process_memory_percent(pid).await?;
    Ok(Some(ProcessSnapshot {
        pid,
        name,
        cpu_percent,
        mem_percent,
        memory_info,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_membership() {
        let f = NameFilter::new(["chrome", "bash"]);
        assert!(f.allows("chrome"));
        assert!(f.allows("bash"));
        assert!(!f.allows("sshd"));
        assert!(!f.allows("Chrome"));
        assert_eq!(f.len(), 2);
    }

    #[test]
    fn empty_filter_admits_nothing() {
        let f = NameFilter::new(Vec::<String>::new());
        assert!(f.is_empty());
        assert!(!f.allows(""));
        assert!(!f.allows("bash"));
    }

    #[test]
    fn duplicate_names_collapse() {
        let f = NameFilter::new(["bash", "bash"]);
        assert_eq!(f.len(), 1);
    }
}
