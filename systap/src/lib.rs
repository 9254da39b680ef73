//! systap: a local system-metrics exporter. Samples host CPU, memory,
//! temperature, disk and per-process statistics and serves them over HTTP as
//! one-shot JSON or `text/event-stream` push streams.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod interval;
pub mod metrics;
pub mod provider;
pub mod session;
pub mod snapshot;
pub mod sse;
pub mod state;
pub mod types;

pub use config::Config;
pub use metrics::SysinfoProvider;
pub use provider::MetricsProvider;
pub use state::AppState;
