//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default transport channel carrying background agent execution events.
pub const DEFAULT_STREAM_CHANNEL: &str = "background-agent:stream";

/// Default capacity of in-process broadcast channels.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How often the scheduler ticker scans for runnable tasks.
    pub poll_interval: Duration,
    /// Maximum number of executions the ticker keeps in flight.
    pub max_concurrent_runs: usize,
    /// Transport channel the stream multiplexer listens on by default.
    pub stream_channel: String,
    /// Capacity of in-process broadcast channels.
    pub broadcast_capacity: usize,
    /// Address the HTTP/WebSocket API binds to.
    pub bind_addr: String,
    /// Optional JSON file of task records loaded at startup.
    pub tasks_file: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_concurrent_runs: 4,
            stream_channel: DEFAULT_STREAM_CHANNEL.to_string(),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            bind_addr: "127.0.0.1:8787".to_string(),
            tasks_file: None,
        }
    }
}

impl CoordinatorConfig {
    /// Build the configuration from `BGA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let poll_secs = parse_positive(&lookup, "BGA_POLL_INTERVAL_SECS")?
            .unwrap_or(defaults.poll_interval.as_secs());
        let max_concurrent_runs = parse_positive(&lookup, "BGA_MAX_CONCURRENT_RUNS")?
            .map(|v| v as usize)
            .unwrap_or(defaults.max_concurrent_runs);
        let broadcast_capacity = parse_positive(&lookup, "BGA_BROADCAST_CAPACITY")?
            .map(|v| v as usize)
            .unwrap_or(defaults.broadcast_capacity);

        let stream_channel = match lookup("BGA_STREAM_CHANNEL") {
            Some(raw) if raw.trim().is_empty() => {
                return Err(ConfigError::InvalidValue {
                    key: "BGA_STREAM_CHANNEL".to_string(),
                    message: "channel name must not be empty".to_string(),
                });
            }
            Some(raw) => raw.trim().to_string(),
            None => defaults.stream_channel,
        };

        Ok(Self {
            poll_interval: Duration::from_secs(poll_secs),
            max_concurrent_runs,
            stream_channel,
            broadcast_capacity,
            bind_addr: lookup("BGA_BIND_ADDR").unwrap_or(defaults.bind_addr),
            tasks_file: lookup("BGA_TASKS_FILE")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

fn parse_positive<F>(lookup: &F, key: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        }),
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}' is not a number: {e}"),
        }),
    }
}
