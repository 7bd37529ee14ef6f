//! Configuration file handling.
//!
//! The config is a YAML file (default `/etc/oncall/config.yaml`):
//!
//! ```yaml
//! opsgenie:
//!   api_key: 00000000-0000-0000-0000-000000000000
//!   priority: P5
//!   priority_increase:
//!     timer: 600      # seconds before an unacknowledged incident goes to P1
//!     confirm: true   # ask before a manual increase
//!
//! messages:
//!   create_success: "The engineer on duty has been notified"
//!
//! schedules:          # `oncall daemon`
//!   - group: devops
//!     schedule: DevOps_schedule
//!     slack:
//!       bot_token: xoxb-...
//!       app_token: xapp-...
//!
//! sync:               # `oncall sync`
//!   slack_token: xoxp-...
//!   groups:
//!     devops-duty: [DevOps_schedule, lead@example.com]
//! ```
//!
//! A handful of keys can be overridden from the environment, see
//! [`Config::apply_env`].

use paging::{OpsgenieConfig, Priority, RetryPolicy};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::render::Messages;
use crate::sync::SyncTarget;

/// Default directory of the config file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/oncall";

/// Default config file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Opsgenie API key.
pub const ENV_OPSGENIE_API_KEY: &str = "ONCALL_OPSGENIE_API_KEY";
/// Opsgenie API base URL.
pub const ENV_OPSGENIE_API_URL: &str = "ONCALL_OPSGENIE_API_URL";
/// Slack token used by `oncall sync`.
pub const ENV_SLACK_API_KEY: &str = "ONCALL_SLACK_API_KEY";
/// Escalation ladder in seconds.
pub const ENV_PRIORITY_INCREASE_TIMER: &str = "ONCALL_PRIORITY_INCREASE_TIMER";

/// Whole configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub opsgenie: OpsgenieSettings,
    pub messages: Messages,
    pub schedules: Vec<ScheduleConfig>,
    pub sync: SyncConfig,
}

/// `opsgenie` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpsgenieSettings {
    pub api_key: String,
    pub api_url: String,
    /// Retries on rate limits and server errors
    pub retry_count: u32,
    /// Priority of new incidents
    pub priority: Priority,
    pub priority_increase: PriorityIncrease,
}

impl Default for OpsgenieSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: paging::opsgenie::DEFAULT_API_URL.to_string(),
            retry_count: RetryPolicy::default().retry_count,
            priority: Priority::P5,
            priority_increase: PriorityIncrease::default(),
        }
    }
}

/// `opsgenie.priority_increase` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PriorityIncrease {
    /// Seconds before an unacknowledged incident is raised to P1; 0 disables
    pub timer: u64,
    /// Ask for confirmation before a manual increase
    pub confirm: bool,
}

impl Default for PriorityIncrease {
    fn default() -> Self {
        Self {
            timer: 0,
            confirm: true,
        }
    }
}

impl PriorityIncrease {
    /// The escalation ladder, if enabled.
    #[must_use]
    pub fn ladder(&self) -> Option<Duration> {
        (self.timer > 0).then(|| Duration::from_secs(self.timer))
    }
}

/// One entry of the `schedules` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Chat-facing group label
    pub group: String,
    /// Opsgenie schedule name
    pub schedule: String,
    pub slack: SlackTokens,
}

/// Slack credentials of one workspace app.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackTokens {
    /// Bot (`xoxb-`) or user (`xoxp-`) token
    pub bot_token: String,
    /// App-level (`xapp-`) token for Socket Mode
    pub app_token: String,
}

/// `sync` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Token allowed to manage user groups
    pub slack_token: String,
    /// User group handle → `[schedule, extra members...]`
    pub groups: BTreeMap<String, Vec<String>>,
}

impl Config {
    /// Path of the config file from its directory and name.
    #[must_use]
    pub fn path(config_path: &Path, config_file: &str) -> PathBuf {
        config_path.join(config_file)
    }

    /// Read the file at `path` and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Override keys from the environment:
    ///
    /// - `ONCALL_OPSGENIE_API_KEY`
    /// - `ONCALL_OPSGENIE_API_URL`
    /// - `ONCALL_SLACK_API_KEY` (token of `oncall sync`)
    /// - `ONCALL_PRIORITY_INCREASE_TIMER` (seconds)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup(ENV_OPSGENIE_API_KEY) {
            self.opsgenie.api_key = api_key;
        }
        if let Some(api_url) = lookup(ENV_OPSGENIE_API_URL) {
            self.opsgenie.api_url = api_url;
        }
        if let Some(token) = lookup(ENV_SLACK_API_KEY) {
            self.sync.slack_token = token;
        }
        if let Some(timer) = lookup(ENV_PRIORITY_INCREASE_TIMER) {
            self.opsgenie.priority_increase.timer =
                timer.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    key: ENV_PRIORITY_INCREASE_TIMER.to_string(),
                    value: timer.clone(),
                })?;
        }
        Ok(())
    }

    /// Check everything `oncall daemon` needs.
    pub fn validate_daemon(&self) -> Result<(), ConfigError> {
        self.validate_opsgenie()?;

        if self.schedules.is_empty() {
            return Err(ConfigError::Invalid("no schedules configured".to_string()));
        }

        let mut groups = HashSet::new();
        for schedule in &self.schedules {
            if schedule.group.is_empty() || schedule.schedule.is_empty() {
                return Err(ConfigError::Invalid(
                    "every schedule needs a group and a schedule name".to_string(),
                ));
            }
            if !groups.insert(schedule.group.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "group {} is configured twice",
                    schedule.group
                )));
            }
            if !is_web_token(&schedule.slack.bot_token) {
                return Err(ConfigError::Invalid(format!(
                    "group {}: slack.bot_token must be an xoxb- or xoxp- token",
                    schedule.group
                )));
            }
            if !schedule.slack.app_token.starts_with("xapp-") {
                return Err(ConfigError::Invalid(format!(
                    "group {}: slack.app_token must be an xapp- token",
                    schedule.group
                )));
            }
        }

        Ok(())
    }

    /// Check everything `oncall sync` needs.
    pub fn validate_sync(&self) -> Result<(), ConfigError> {
        self.validate_opsgenie()?;

        if !is_web_token(&self.sync.slack_token) {
            return Err(ConfigError::Invalid(
                "sync.slack_token must be an xoxb- or xoxp- token".to_string(),
            ));
        }
        if self.sync.groups.is_empty() {
            return Err(ConfigError::Invalid("no sync groups configured".to_string()));
        }

        self.sync.targets().map(|_| ())
    }

    /// Opsgenie client settings.
    #[must_use]
    pub fn opsgenie_client(&self) -> OpsgenieConfig {
        let mut config = OpsgenieConfig::new(&self.opsgenie.api_key);
        config.api_url.clone_from(&self.opsgenie.api_url);
        config.retry = RetryPolicy::new(self.opsgenie.retry_count);
        config
    }

    fn validate_opsgenie(&self) -> Result<(), ConfigError> {
        if self.opsgenie.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "opsgenie.api_key is not set (or set {ENV_OPSGENIE_API_KEY})"
            )));
        }
        Ok(())
    }
}

impl SyncConfig {
    /// Sync targets in handle order.
    pub fn targets(&self) -> Result<Vec<SyncTarget>, ConfigError> {
        self.groups
            .iter()
            .map(|(group, entries)| {
                let (schedule, extra) = entries.split_first().ok_or_else(|| {
                    ConfigError::Invalid(format!("sync group {group} has no schedule"))
                })?;

                Ok(SyncTarget {
                    group: group.trim_start_matches('@').to_string(),
                    schedule: schedule.clone(),
                    extra: extra.to_vec(),
                })
            })
            .collect()
    }
}

fn is_web_token(token: &str) -> bool {
    token.starts_with("xoxb-") || token.starts_with("xoxp-")
}
