//! Worker configuration.
//!
//! Loaded from YAML. Every section has defaults, so an empty document is a
//! valid configuration for a local worker.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{PipelineVersions, WorkQueueDefinition};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("work queue '{queue}' refers to unknown collection '{collection}'")]
    UnknownCollection { queue: String, collection: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Local,
    Dev,
    Staging,
    Production,
}

impl Environment {
    /// Autoscaling only runs where a real pool exists to scale.
    pub fn allows_autoscaling(self) -> bool {
        matches!(self, Environment::Staging | Environment::Production)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Messages fetched per long-poll.
    pub batch_size: usize,
    /// Long-poll wait.
    pub wait_secs: u64,
    /// Broker visibility window granted on each keep-alive beat.
    pub visibility_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    /// Heartbeat age after which another worker may reclaim an IN_PROGRESS task.
    pub stale_after_secs: u64,
    /// Pause after a failed receive.
    pub receive_backoff_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            wait_secs: 20,
            visibility_timeout_secs: 60,
            heartbeat_interval_secs: 20,
            stale_after_secs: 180,
            receive_backoff_ms: 1000,
        }
    }
}

impl ListenerConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(secs_i64(self.stale_after_secs))
    }

    pub fn receive_backoff(&self) -> Duration {
        Duration::from_millis(self.receive_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_secs: u64,
    /// A site is not fired again within this many seconds of its last job.
    pub debounce_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            debounce_secs: 60,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn debounce(&self) -> chrono::Duration {
        chrono::Duration::seconds(secs_i64(self.debounce_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub interval_secs: u64,
    pub stale_after_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            stale_after_secs: 600,
        }
    }
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(secs_i64(self.stale_after_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscalerConfig {
    pub tasks_per_worker: u64,
    pub min_workers: usize,
    pub max_workers: usize,
    pub interval_secs: u64,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            tasks_per_worker: 5,
            min_workers: 2,
            max_workers: 100,
            interval_secs: 60,
        }
    }
}

impl AutoscalerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TakeNextConfig {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for TakeNextConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay_ms: 100,
        }
    }
}

impl TakeNextConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Bounded channel size between emitters and the audit logger.
    pub capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocketConfig {
    pub environment: Environment,
    pub listener: ListenerConfig,
    pub scheduler: SchedulerConfig,
    pub sweeper: SweeperConfig,
    pub autoscaler: AutoscalerConfig,
    pub take_next: TakeNextConfig,
    pub audit: AuditConfig,
    pub pipeline_versions: PipelineVersions,
    pub work_queues: Vec<WorkQueueDefinition>,
}

impl DocketConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        // an empty document deserializes as unit, not as an empty map
        let config: DocketConfig = if yaml.trim().is_empty() {
            DocketConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::ValidationFailed(msg));

        if self.autoscaler.tasks_per_worker == 0 {
            return fail("autoscaler.tasks_per_worker must be at least 1".into());
        }
        if self.autoscaler.min_workers > self.autoscaler.max_workers {
            return fail(format!(
                "autoscaler.min_workers ({}) exceeds max_workers ({})",
                self.autoscaler.min_workers, self.autoscaler.max_workers
            ));
        }
        if self.take_next.attempts == 0 {
            return fail("take_next.attempts must be at least 1".into());
        }
        if self.listener.batch_size == 0 {
            return fail("listener.batch_size must be at least 1".into());
        }
        if self.listener.heartbeat_interval_secs == 0
            || self.listener.heartbeat_interval_secs >= self.listener.visibility_timeout_secs
        {
            return fail(format!(
                "listener.heartbeat_interval_secs ({}) must be positive and below visibility_timeout_secs ({})",
                self.listener.heartbeat_interval_secs, self.listener.visibility_timeout_secs
            ));
        }

        let mut names = HashSet::new();
        for queue in &self.work_queues {
            if !names.insert(queue.name.as_str()) {
                return fail(format!("duplicate work queue '{}'", queue.name));
            }
            let mut labels = HashSet::new();
            for action in &queue.submit_actions {
                if !labels.insert(action.label.as_str()) {
                    return fail(format!(
                        "duplicate submit action '{}' in work queue '{}'",
                        action.label, queue.name
                    ));
                }
            }
        }
        Ok(())
    }
}

fn secs_i64(secs: u64) -> i64 {
    secs.min(u64::from(u32::MAX)) as i64
}
