//! Command line / environment configuration.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::error::ConfigError;
use crate::interval::parse_duration;

pub const DEFAULT_ADDR: &str = ":8002";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Stream host CPU, memory, temperature and process metrics over HTTP.
#[derive(Parser, Debug)]
#[command(name = "systap")]
#[command(version)]
pub struct Args {
    /// Listen address: `host:port`, `:port` (all interfaces) or a bare port.
    #[arg(long, env = "SYSTAP_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,

    /// Sampling interval used when a client doesn't ask for one (e.g. `5s`, `500ms`).
    #[arg(long, env = "SYSTAP_INTERVAL", default_value = "5s")]
    pub interval: String,

    /// Report one CPU percentage per logical CPU instead of an aggregate.
    #[arg(long, env = "SYSTAP_PER_CPU")]
    pub per_cpu: bool,

    /// Oldest cached snapshot handed to a newly attached client; `0s` never expires.
    #[arg(long, env = "SYSTAP_CACHE_TTL", default_value = "30s")]
    pub cache_ttl: String,

    /// How long shutdown waits for open streams to wind down.
    #[arg(long, env = "SYSTAP_SHUTDOWN_TIMEOUT", default_value = "5s")]
    pub shutdown_timeout: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "SYSTAP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "SYSTAP_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub default_interval: Duration,
    pub per_cpu: bool,
    pub cache_ttl: Option<Duration>,
    pub shutdown_timeout: Duration,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8002)),
            default_interval: DEFAULT_INTERVAL,
            per_cpu: false,
            cache_ttl: Some(Duration::from_secs(30)),
            shutdown_timeout: Duration::from_secs(5),
            log_level: "info".into(),
            log_format: LogFormat::Text,
        }
    }
}

fn duration_flag(flag: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::Interval {
        flag,
        value: value.to_string(),
    })
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let default_interval = duration_flag("--interval", &args.interval)?;
        if default_interval.is_zero() {
            return Err(ConfigError::Interval {
                flag: "--interval",
                value: args.interval,
            });
        }
        let cache_ttl = duration_flag("--cache-ttl", &args.cache_ttl)?;

        Ok(Self {
            addr: parse_listen_addr(&args.addr)?,
            default_interval,
            per_cpu: args.per_cpu,
            cache_ttl: Some(cache_ttl).filter(|d| !d.is_zero()),
            shutdown_timeout: duration_flag("--shutdown-timeout", &args.shutdown_timeout)?,
            log_level: args.log_level,
            log_format: args.log_format,
        })
    }
}

/// Accepts `host:port`, `:port` and a bare port; the latter two bind every
/// interface.
pub fn parse_listen_addr(s: &str) -> Result<SocketAddr, ConfigError> {
    let bad = || ConfigError::Addr(s.to_string());
    let s = s.trim();
    if let Some(port) = s.strip_prefix(':') {
        let port: u16 = port.parse().map_err(|_| bad())?;
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    if let Ok(port) = s.parse::<u16>() {
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    // hostnames such as localhost:8002
    s.to_socket_addrs()
        .map_err(|_| bad())?
        .next()
        .ok_or_else(bad)
}
