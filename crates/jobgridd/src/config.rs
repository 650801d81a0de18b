//! Daemon configuration.
//!
//! The daemon loads a toml file describing the queues, their scaling
//! policies, the named rate limiters, the alert rules, and the recycle
//! limits. Everything is validated before any of it is written to the
//! store, so a bad config file rejects startup instead of half-applying.
//!
//! ```toml
//! [daemon]
//! api_port = 8700
//! data_dir = "/var/lib/jobgrid"
//! tick_interval_secs = 15
//!
//! [[queues]]
//! name = "emails"
//! min_workers = 1
//! max_workers = 10
//! scale_up = { queue_depth = 100.0 }
//! scale_down = { queue_depth = 10.0 }
//! cooldown = { scale_up_secs = 60, scale_down_secs = 300 }
//!
//! [[limiters]]
//! name = "email-sends"
//! windows = [{ granularity = "minute", limit = 100 }]
//!
//! [[alert_rules]]
//! alert_type = "queue_backlog"
//! metric = "queue_depth"
//! warning = 100.0
//! critical = 500.0
//! period_secs = 300
//!
//! [recycle]
//! memory_hard_limit_mb = 512
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use jobgrid_ratelimit::LimiterConfig;
use jobgrid_state::{
    AlertRule, ConfigError, CooldownConfig, ScalingPolicy, ThresholdSet, validate_alert_rule,
    validate_policy,
};
use jobgrid_worker::RecycleLimits;

/// Errors loading or validating the daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Top-level daemon configuration.
#[derive(Debug, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub daemon: DaemonSection,
    #[serde(default)]
    pub queues: Vec<QueueConfig>,
    #[serde(default)]
    pub limiters: Vec<LimiterConfig>,
    #[serde(default)]
    pub alert_rules: Vec<AlertRule>,
    #[serde(default)]
    pub recycle: RecycleLimits,
}

/// `[daemon]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    pub api_port: u16,
    pub data_dir: PathBuf,
    pub tick_interval_secs: u64,
    pub metrics_timeout_secs: u64,
    pub command_timeout_secs: u64,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            api_port: 8700,
            data_dir: PathBuf::from("/var/lib/jobgrid"),
            tick_interval_secs: 15,
            metrics_timeout_secs: 5,
            command_timeout_secs: 10,
        }
    }
}

/// One `[[queues]]` entry.
#[derive(Debug, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    pub min_workers: u32,
    pub max_workers: u32,
    #[serde(default)]
    pub scale_up: Option<ThresholdSet>,
    #[serde(default)]
    pub scale_down: Option<ThresholdSet>,
    pub cooldown: CooldownConfig,
}

impl QueueConfig {
    /// Build the scaling policy this entry describes.
    pub fn to_policy(&self, now: u64) -> ScalingPolicy {
        ScalingPolicy {
            queue: self.name.clone(),
            min_workers: self.min_workers,
            max_workers: self.max_workers,
            scale_up: self.scale_up.clone(),
            scale_down: self.scale_down.clone(),
            cooldown: self.cooldown,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Load and fully validate a config file.
pub fn load(path: &Path) -> Result<DaemonConfig, ConfigLoadError> {
    let raw = std::fs::read_to_string(path)?;
    let config: DaemonConfig = toml::from_str(&raw)?;

    for queue in &config.queues {
        validate_policy(&queue.to_policy(0))?;
    }
    for rule in &config.alert_rules {
        validate_alert_rule(rule)?;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobgrid_state::{AlertMetric, WindowGranularity};

    const EXAMPLE: &str = r#"
        [daemon]
        api_port = 9000
        data_dir = "/tmp/jobgrid-test"

        [[queues]]
        name = "emails"
        min_workers = 1
        max_workers = 10
        scale_up = { queue_depth = 100.0 }
        scale_down = { queue_depth = 10.0 }
        cooldown = { scale_up_secs = 60, scale_down_secs = 300 }

        [[queues]]
        name = "images"
        min_workers = 2
        max_workers = 20
        scale_up = { queue_latency_ms = 5000.0, cpu_percent = 80.0 }
        cooldown = { scale_up_secs = 120, scale_down_secs = 600 }

        [[limiters]]
        name = "email-sends"
        windows = [
            { granularity = "minute", limit = 100 },
            { granularity = "day", limit = 50000 },
        ]

        [[alert_rules]]
        alert_type = "queue_backlog"
        metric = "queue_depth"
        warning = 100.0
        critical = 500.0
        urgent = 1000.0
        period_secs = 300

        [recycle]
        memory_hard_limit_mb = 256
    "#;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobgrid.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn parses_full_example() {
        let (_dir, path) = write_config(EXAMPLE);
        let config = load(&path).unwrap();

        assert_eq!(config.daemon.api_port, 9000);
        // Unset daemon fields fall back to defaults.
        assert_eq!(config.daemon.tick_interval_secs, 15);

        assert_eq!(config.queues.len(), 2);
        let emails = config.queues[0].to_policy(1000);
        assert_eq!(emails.queue, "emails");
        assert_eq!(emails.scale_up.as_ref().unwrap().queue_depth, Some(100.0));
        assert!(config.queues[1].scale_down.is_none());

        assert_eq!(config.limiters.len(), 1);
        assert_eq!(config.limiters[0].windows.len(), 2);
        assert_eq!(
            config.limiters[0].windows[1].granularity,
            WindowGranularity::Day
        );

        assert_eq!(config.alert_rules.len(), 1);
        assert_eq!(config.alert_rules[0].metric, AlertMetric::QueueDepth);

        // Partial [recycle] keeps defaults for the rest.
        assert_eq!(config.recycle.memory_hard_limit_mb, 256);
        assert_eq!(config.recycle.max_jobs_processed, 1000);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let (_dir, path) = write_config("");
        let config = load(&path).unwrap();

        assert_eq!(config.daemon.api_port, 8700);
        assert!(config.queues.is_empty());
        assert_eq!(config.recycle, RecycleLimits::default());
    }

    #[test]
    fn invalid_policy_rejects_the_file() {
        let (_dir, path) = write_config(
            r#"
            [[queues]]
            name = "emails"
            min_workers = 5
            max_workers = 5
            cooldown = { scale_up_secs = 60, scale_down_secs = 300 }
            "#,
        );

        assert!(matches!(
            load(&path),
            Err(ConfigLoadError::Invalid(ConfigError::MinNotBelowMax { .. }))
        ));
    }

    #[test]
    fn invalid_alert_rule_rejects_the_file() {
        let (_dir, path) = write_config(
            r#"
            [[alert_rules]]
            alert_type = "backlog"
            metric = "queue_depth"
            period_secs = 300
            "#,
        );

        assert!(matches!(
            load(&path),
            Err(ConfigLoadError::Invalid(ConfigError::NoAlertTiers { .. }))
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let (_dir, path) = write_config("[[queues]\nname = ");
        assert!(matches!(load(&path), Err(ConfigLoadError::Parse(_))));
    }
}
