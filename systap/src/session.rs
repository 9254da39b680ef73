//! Per-connection push stream: samples on the session's cadence and pushes
//! each snapshot until the client leaves or the server shuts down.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error};

use crate::cache::LastSnapshotCache;
use crate::error::StreamError;
use crate::interval::MAX_DURATION;
use crate::provider::MetricsProvider;
use crate::snapshot::{build_process_snapshot, build_system_snapshot, NameFilter};
use crate::sse::{encode_event, EventSink};
use crate::state::AppState;
use crate::types::Snapshot;

/// What a session streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamKind {
    System,
    Process(Option<NameFilter>),
}

impl StreamKind {
    fn label(&self) -> &'static str {
        match self {
            StreamKind::System => "system",
            StreamKind::Process(_) => "proc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Server shutdown.
    Cancelled,
    /// The client went away (or a write to it failed).
    Disconnected,
    ProviderFailed,
    EncodeFailed,
}

impl From<&StreamError> for CloseReason {
    fn from(err: &StreamError) -> Self {
        match err {
            StreamError::Provider(_) => CloseReason::ProviderFailed,
            StreamError::Encode(_) => CloseReason::EncodeFailed,
            StreamError::Disconnected | StreamError::Unsupported(_) => CloseReason::Disconnected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Attaching,
    Streaming,
    Closed(CloseReason),
}

/// Tick pacing. The system stream is paced by its own CPU sample window; the
/// process stream by a fixed timer so enumeration cost doesn't set the rate.
enum Pacer {
    SampleWindow,
    Timer(Interval),
}

impl Pacer {
    fn for_kind(kind: &StreamKind, interval: Duration) -> Self {
        match kind {
            StreamKind::System => Pacer::SampleWindow,
            StreamKind::Process(_) => {
                let now = Instant::now();
                let start = now.checked_add(interval).unwrap_or(now);
                let mut timer = interval_at(start, interval);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Pacer::Timer(timer)
            }
        }
    }

    async fn wait(&mut self) {
        if let Pacer::Timer(timer) = self {
            timer.tick().await;
        }
    }
}

async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    // A dropped sender can never signal, so it means "never".
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub struct Session {
    kind: StreamKind,
    interval: Duration,
    per_cpu: bool,
    provider: Arc<dyn MetricsProvider>,
    cache: Arc<LastSnapshotCache>,
    shutdown: watch::Receiver<bool>,
    sink: EventSink,
}

impl Session {
    pub fn new(kind: StreamKind, interval: Duration, state: &AppState, sink: EventSink) -> Self {
        Self {
            kind,
            interval: interval.min(MAX_DURATION),
            per_cpu: state.per_cpu,
            provider: state.provider.clone(),
            cache: state.last_snapshot.clone(),
            shutdown: state.shutdown.clone(),
            sink,
        }
    }

    /// Run on its own task, counted in `active` until it ends.
    pub fn spawn(self, active: Arc<AtomicUsize>) -> JoinHandle<CloseReason> {
        struct ActiveGuard(Arc<AtomicUsize>);
        impl Drop for ActiveGuard {
            fn drop(&mut self) {
                let left = self.0.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
                debug!(active = left, "session ended");
            }
        }

        let n = active.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(
            kind = self.kind.label(),
            interval = ?self.interval,
            active = n,
            "session attached"
        );
        let guard = ActiveGuard(active);
        tokio::spawn(async move {
            let _guard = guard;
            self.run().await
        })
    }

    pub async fn run(self) -> CloseReason {
        let mut pacer = Pacer::for_kind(&self.kind, self.interval);
        let mut state = SessionState::Attaching;
        let reason = loop {
            state = match state {
                SessionState::Attaching => self.attach().await,
                SessionState::Streaming => self.tick(&mut pacer).await,
                SessionState::Closed(reason) => break reason,
            };
        };
        debug!(kind = self.kind.label(), ?reason, "session closed");
        reason
    }

    async fn attach(&self) -> SessionState {
        if self.kind == StreamKind::System {
            if let Some(cached) = self.cache.load() {
                debug!(age = ?cached.stored_at.elapsed(), "replaying cached snapshot");
                let replayed = match encode_event(&cached.snapshot) {
                    Ok(frame) => self.push(frame).await,
                    Err(e) => Err(self.fail("cached snapshot", e.into())),
                };
                if let Err(reason) = replayed {
                    return SessionState::Closed(reason);
                }
            }
        }
        SessionState::Streaming
    }

    async fn tick(&self, pacer: &mut Pacer) -> SessionState {
        if let Some(reason) = self.pending_cancel() {
            return SessionState::Closed(reason);
        }

        let outcome = match &self.kind {
            StreamKind::System => self.system_tick().await,
            StreamKind::Process(filter) => self.process_tick(filter.as_ref()).await,
        };
        if let Err(reason) = outcome {
            return SessionState::Closed(reason);
        }

        match self.until_cancelled(pacer.wait()).await {
            Ok(()) => SessionState::Streaming,
            Err(reason) => SessionState::Closed(reason),
        }
    }

    async fn system_tick(&self) -> Result<(), CloseReason> {
        let (snapshot, frame) = self
            .until_cancelled(self.sample_system())
            .await?
            .map_err(|e| self.fail("system snapshot", e))?;
        self.push(frame).await?;
        self.cache.store(snapshot);
        Ok(())
    }

    async fn sample_system(&self) -> Result<(Snapshot, Bytes), StreamError> {
        let snapshot =
            build_system_snapshot(self.provider.as_ref(), self.interval, self.per_cpu).await?;
        let frame = encode_event(&snapshot)?;
        Ok((snapshot, frame))
    }

    async fn process_tick(&self, filter: Option<&NameFilter>) -> Result<(), CloseReason> {
        let frame = self
            .until_cancelled(self.sample_processes(filter))
            .await?
            .map_err(|e| self.fail("process snapshot", e))?;
        self.push(frame).await
    }

    async fn sample_processes(&self, filter: Option<&NameFilter>) -> Result<Bytes, StreamError> {
        let processes = build_process_snapshot(self.provider.as_ref(), filter).await?;
        Ok(encode_event(&processes)?)
    }

    async fn push(&self, frame: Bytes) -> Result<(), CloseReason> {
        self.until_cancelled(self.sink.send(frame))
            .await?
            .map_err(|e| self.fail("push", e))
    }

    /// Log a terminal stream error at the level its cause deserves and map it
    /// to the close reason.
    fn fail(&self, what: &str, err: StreamError) -> CloseReason {
        let reason = CloseReason::from(&err);
        match reason {
            CloseReason::Disconnected | CloseReason::Cancelled => {
                debug!(kind = self.kind.label(), error = %err, "{what} aborted")
            }
            _ => error!(kind = self.kind.label(), error = %err, "{what} failed"),
        }
        reason
    }

    fn pending_cancel(&self) -> Option<CloseReason> {
        if self.sink.is_closed() {
            Some(CloseReason::Disconnected)
        } else if *self.shutdown.borrow() {
            Some(CloseReason::Cancelled)
        } else {
            None
        }
    }

    /// Drive `fut` unless the client leaves or shutdown starts first; in that
    /// case `fut` is dropped mid-flight.
    async fn until_cancelled<T>(&self, fut: impl Future<Output = T>) -> Result<T, CloseReason> {
        tokio::select! {
            biased;
            _ = self.sink.closed() => Err(CloseReason::Disconnected),
            _ = shutdown_requested(self.shutdown.clone()) => Err(CloseReason::Cancelled),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;

    #[test]
    fn stream_errors_map_to_close_reasons() {
        let provider = StreamError::from(ProviderError::Cpu("no cpus".into()));
        assert_eq!(CloseReason::from(&provider), CloseReason::ProviderFailed);

        let encode = StreamError::from(serde_json::from_str::<u8>("x").unwrap_err());
        assert_eq!(CloseReason::from(&encode), CloseReason::EncodeFailed);

        assert_eq!(
            CloseReason::from(&StreamError::Disconnected),
            CloseReason::Disconnected
        );
    }
}
