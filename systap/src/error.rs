//! Error types for the agent. Provider and transport failures end a single
//! session; configuration failures abort startup.

use thiserror::Error;

use crate::provider::Pid;

/// A failed query against the metrics provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("cpu sample failed: {0}")]
    Cpu(String),

    #[error("memory sample failed: {0}")]
    Memory(String),

    #[error("temperature sample failed: {0}")]
    Temperature(String),

    #[error("disk usage for {path} failed: {reason}")]
    Disk { path: String, reason: String },

    #[error("process listing failed: {0}")]
    ProcessList(String),

    #[error("process {0} is gone")]
    ProcessGone(Pid),

    #[error("blocking sampler task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Why a push stream could not continue.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("client disconnected")]
    Disconnected,

    #[error("streaming unsupported: {0}")]
    Unsupported(String),
}

/// Invalid operator configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address {0:?}")]
    Addr(String),

    #[error("invalid duration {value:?} for {flag}")]
    Interval { flag: &'static str, value: String },

    #[error("invalid log filter: {0}")]
    LogFilter(String),
}
