//! # Gateway Configuration
//!
//! Channels, their fire-and-forget actions, deadlines and worker pools, loaded from a YAML
//! (or JSON, by file extension) document:
//!
//! ```yaml
//! call_deadline_ms: 5000
//! max_idle_tasks: 1024
//! workers:
//!   num_workers: 8
//!   queue_bound: 1024
//!   stack_size: 65536
//! channels:
//!   - name: Messaging
//!     fire_and_forget: [Typing, Presence]
//!   - name: CV
//!     call_deadline_ms: 250
//!     workers: { num_workers: 2, queue_bound: 64 }
//! ```
//!
//! Top-level values are defaults for every channel; a channel's own values win. Environment
//! variables override the top-level values:
//!
//! - `BRRTG_CALL_DEADLINE_MS`
//! - `BRRTG_MAX_IDLE_TASKS`
//! - `BRRTG_GATEWAY_WORKERS`, `BRRTG_GATEWAY_QUEUE_BOUND`, `BRRTG_STACK_SIZE`

use crate::gateway::{
    ChannelConfig, DEFAULT_CALL_DEADLINE, DEFAULT_MAX_IDLE_TASKS, MAX_CALL_DEADLINE,
};
use crate::worker_pool::WorkerPoolConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Smallest coroutine stack accepted for a worker pool
pub const MIN_STACK_SIZE: usize = 0x1000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Default synchronous call deadline in milliseconds
    pub call_deadline_ms: u64,
    /// Default idle dispatch tasks kept per channel; 0 disables reuse
    pub max_idle_tasks: usize,
    /// Default worker pool for every channel
    pub workers: WorkerPoolConfig,
    /// Carrier threads for the `may` scheduler; unset keeps the runtime default
    pub runtime_workers: Option<usize>,
    pub channels: Vec<ChannelSection>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            call_deadline_ms: u64::try_from(DEFAULT_CALL_DEADLINE.as_millis()).unwrap_or(u64::MAX),
            max_idle_tasks: DEFAULT_MAX_IDLE_TASKS,
            workers: WorkerPoolConfig::default(),
            runtime_workers: None,
            channels: Vec::new(),
        }
    }
}

/// One `channels:` entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelSection {
    pub name: String,
    #[serde(default)]
    pub fire_and_forget: Vec<String>,
    #[serde(default)]
    pub call_deadline_ms: Option<u64>,
    #[serde(default)]
    pub max_idle_tasks: Option<usize>,
    #[serde(default)]
    pub workers: Option<WorkerOverrides>,
}

/// Per-channel worker settings; unset fields fall back to the top-level `workers`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerOverrides {
    pub num_workers: Option<usize>,
    pub queue_bound: Option<usize>,
    pub stack_size: Option<usize>,
}

impl WorkerOverrides {
    fn apply(&self, base: &WorkerPoolConfig) -> WorkerPoolConfig {
        WorkerPoolConfig::new(
            self.num_workers.unwrap_or(base.num_workers),
            self.queue_bound.unwrap_or(base.queue_bound),
            self.stack_size.unwrap_or(base.stack_size),
        )
    }
}

/// A configuration that parsed but cannot run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    NoChannels,
    EmptyChannelName { index: usize },
    DuplicateChannel { name: String },
    ZeroDeadline { channel: String },
    DeadlineTooLarge { channel: String, call_deadline_ms: u64 },
    ZeroWorkers { channel: String },
    ZeroQueueBound { channel: String },
    StackTooSmall { channel: String, stack_size: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoChannels => write!(f, "no channels configured"),
            ConfigError::EmptyChannelName { index } => {
                write!(f, "channel #{index} has an empty name")
            }
            ConfigError::DuplicateChannel { name } => {
                write!(f, "channel '{name}' is configured more than once")
            }
            ConfigError::ZeroDeadline { channel } => {
                write!(f, "channel '{channel}' has a zero call deadline")
            }
            ConfigError::DeadlineTooLarge {
                channel,
                call_deadline_ms,
            } => write!(
                f,
                "channel '{channel}' call deadline {call_deadline_ms}ms exceeds the maximum {}ms",
                MAX_CALL_DEADLINE.as_millis()
            ),
            ConfigError::ZeroWorkers { channel } => {
                write!(f, "channel '{channel}' has no workers")
            }
            ConfigError::ZeroQueueBound { channel } => {
                write!(f, "channel '{channel}' has a zero queue bound")
            }
            ConfigError::StackTooSmall {
                channel,
                stack_size,
            } => write!(
                f,
                "channel '{channel}' stack size {stack_size:#x} is below the minimum {MIN_STACK_SIZE:#x}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl GatewayConfig {
    /// Read, apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read gateway config {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let config = if is_json {
            serde_json::from_str::<Self>(&raw)
                .with_context(|| format!("Invalid JSON gateway config {}", path.display()))?
        } else {
            serde_yaml::from_str::<Self>(&raw)
                .with_context(|| format!("Invalid YAML gateway config {}", path.display()))?
        };

        let config = config.with_env_overrides();
        config
            .validate()
            .with_context(|| format!("Invalid gateway config {}", path.display()))?;
        info!(
            path = %path.display(),
            channels = config.channels.len(),
            call_deadline_ms = config.call_deadline_ms,
            "Gateway config loaded"
        );
        Ok(config)
    }

    /// Parse and validate YAML without consulting the environment
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw).context("Invalid YAML gateway config")?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ms) = env_parse("BRRTG_CALL_DEADLINE_MS") {
            debug!(call_deadline_ms = ms, "Call deadline overridden from environment");
            self.call_deadline_ms = ms;
        }
        if let Some(n) = env_parse("BRRTG_MAX_IDLE_TASKS") {
            self.max_idle_tasks = n;
        }
        self.workers = self.workers.with_env_overrides();
        self
    }

    /// Check every channel's effective settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }

        let mut seen = HashSet::new();
        for (index, section) in self.channels.iter().enumerate() {
            if section.name.trim().is_empty() {
                return Err(ConfigError::EmptyChannelName { index });
            }
            if !seen.insert(section.name.as_str()) {
                return Err(ConfigError::DuplicateChannel {
                    name: section.name.clone(),
                });
            }
            // checked before channel_configs() clamps it
            let call_deadline_ms = section.call_deadline_ms.unwrap_or(self.call_deadline_ms);
            if call_deadline_ms == 0 {
                return Err(ConfigError::ZeroDeadline {
                    channel: section.name.clone(),
                });
            }
            if Duration::from_millis(call_deadline_ms) > MAX_CALL_DEADLINE {
                return Err(ConfigError::DeadlineTooLarge {
                    channel: section.name.clone(),
                    call_deadline_ms,
                });
            }
        }

        for channel in self.channel_configs() {
            if channel.workers.num_workers == 0 {
                return Err(ConfigError::ZeroWorkers {
                    channel: channel.name,
                });
            }
            if channel.workers.queue_bound == 0 {
                return Err(ConfigError::ZeroQueueBound {
                    channel: channel.name,
                });
            }
            if channel.workers.stack_size < MIN_STACK_SIZE {
                return Err(ConfigError::StackTooSmall {
                    stack_size: channel.workers.stack_size,
                    channel: channel.name,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn call_deadline(&self) -> Duration {
        Duration::from_millis(self.call_deadline_ms)
    }

    /// Effective per-channel settings, in file order
    #[must_use]
    pub fn channel_configs(&self) -> Vec<ChannelConfig> {
        self.channels
            .iter()
            .map(|section| {
                let workers = section
                    .workers
                    .as_ref()
                    .map_or_else(|| self.workers.clone(), |o| o.apply(&self.workers));
                ChannelConfig::new(section.name.clone())
                    .with_fire_and_forget(section.fire_and_forget.iter().cloned())
                    .with_call_deadline(Duration::from_millis(
                        section.call_deadline_ms.unwrap_or(self.call_deadline_ms),
                    ))
                    .with_max_idle_tasks(section.max_idle_tasks.unwrap_or(self.max_idle_tasks))
                    .with_workers(workers)
            })
            .collect()
    }

    /// Size the `may` scheduler; must run before the first coroutine is spawned
    pub fn apply_runtime(&self) {
        if let Some(n) = self.runtime_workers {
            may::config().set_workers(n);
            debug!(runtime_workers = n, "May scheduler configured");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r"
call_deadline_ms: 2000
workers:
  num_workers: 4
  queue_bound: 128
channels:
  - name: Messaging
    fire_and_forget: [Typing, Presence]
  - name: CV
    call_deadline_ms: 250
    max_idle_tasks: 0
    workers:
      num_workers: 2
";

    #[test]
    fn test_channel_values_override_top_level() {
        let config = GatewayConfig::from_yaml_str(SAMPLE).unwrap();
        let channels = config.channel_configs();
        assert_eq!(channels.len(), 2);

        let messaging = &channels[0];
        assert_eq!(messaging.name, "Messaging");
        assert_eq!(messaging.fire_and_forget, vec!["Typing", "Presence"]);
        assert_eq!(messaging.call_deadline, Duration::from_millis(2000));
        assert_eq!(messaging.workers.num_workers, 4);
        assert_eq!(messaging.max_idle_tasks, DEFAULT_MAX_IDLE_TASKS);

        let cv = &channels[1];
        assert_eq!(cv.call_deadline, Duration::from_millis(250));
        assert_eq!(cv.max_idle_tasks, 0);
        assert_eq!(cv.workers.num_workers, 2);
        assert_eq!(cv.workers.queue_bound, 128);
    }

    #[test]
    fn test_defaults_apply() {
        let config = GatewayConfig::from_yaml_str("channels: [{ name: Auth }]").unwrap();
        assert_eq!(config.call_deadline(), DEFAULT_CALL_DEADLINE);
        assert_eq!(config.workers, WorkerPoolConfig::default());
        assert!(config.runtime_workers.is_none());
    }

    #[test]
    fn test_rejects_invalid_documents() {
        let cases = [
            ("channels: []", ConfigError::NoChannels),
            (
                "channels: [{ name: '' }]",
                ConfigError::EmptyChannelName { index: 0 },
            ),
            (
                "channels: [{ name: A }, { name: A }]",
                ConfigError::DuplicateChannel { name: "A".into() },
            ),
            (
                "channels: [{ name: A, call_deadline_ms: 0 }]",
                ConfigError::ZeroDeadline { channel: "A".into() },
            ),
            (
                "channels: [{ name: A, call_deadline_ms: 18446744073709551615 }]",
                ConfigError::DeadlineTooLarge {
                    channel: "A".into(),
                    call_deadline_ms: u64::MAX,
                },
            ),
            (
                "call_deadline_ms: 3600001\nchannels: [{ name: A }]",
                ConfigError::DeadlineTooLarge {
                    channel: "A".into(),
                    call_deadline_ms: 3_600_001,
                },
            ),
            (
                "channels: [{ name: A, workers: { num_workers: 0 } }]",
                ConfigError::ZeroWorkers { channel: "A".into() },
            ),
            (
                "channels: [{ name: A, workers: { queue_bound: 0 } }]",
                ConfigError::ZeroQueueBound { channel: "A".into() },
            ),
            (
                "channels: [{ name: A, workers: { stack_size: 16 } }]",
                ConfigError::StackTooSmall {
                    channel: "A".into(),
                    stack_size: 16,
                },
            ),
        ];
        for (yaml, expected) in cases {
            let config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
            assert_eq!(config.validate(), Err(expected), "{yaml}");
        }
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = GatewayConfig::from_yaml_str("channels: [{ name: A, deadline: 3 }]").unwrap_err();
        assert!(err.to_string().contains("Invalid YAML"));

        let err =
            GatewayConfig::from_yaml_str("workers: { num_worker: 2 }\nchannels: [{ name: A }]")
                .unwrap_err();
        assert!(err.to_string().contains("Invalid YAML"));
    }

    #[test]
    fn test_largest_deadline_is_accepted() {
        let config =
            GatewayConfig::from_yaml_str("call_deadline_ms: 3600000\nchannels: [{ name: A }]")
                .unwrap();
        assert_eq!(config.channel_configs()[0].call_deadline, MAX_CALL_DEADLINE);
    }
}
