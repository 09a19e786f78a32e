use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct WardenConfig {
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    pub engine: EngineConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub hibernate: HibernateConfig,
    #[serde(default)]
    pub activation: ActivationConfig,
    #[serde(default)]
    pub stop: StopConfig,
}

/// How to reach the engine on disk and over TCP.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Production launch line, split shell-style.
    pub command: String,
    /// Launch line used instead of `command` when `mode` is `development`
    /// (e.g. an interpreter run from a source checkout).
    pub dev_command: Option<String>,
    #[serde(default)]
    pub mode: DeployMode,
    pub working_directory: PathBuf,
    /// Port the engine serves its health/control endpoint on.
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DeployMode {
    Development,
    #[default]
    Production,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct HealthConfig {
    /// Ceiling on the blocking startup probe.
    #[serde(with = "humantime_serde", default = "default_startup_timeout")]
    pub startup_timeout: Duration,
    /// Delay between startup probe attempts (also caps each attempt).
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// Steady-state probe period while running.
    #[serde(with = "humantime_serde", default = "default_check_interval")]
    pub check_interval: Duration,
    /// Per-request ceiling for the steady-state probe.
    #[serde(with = "humantime_serde", default = "default_check_timeout")]
    pub check_timeout: Duration,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct HibernateConfig {
    /// Idle time after which the engine is shut down.
    #[serde(with = "humantime_serde", default = "default_idle_window")]
    pub idle_window: Duration,
    /// How long before the deadline the advisory warning fires.
    #[serde(with = "humantime_serde", default = "default_warning_lead")]
    pub warning_lead: Duration,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ActivationConfig {
    /// How long `ensure_running` waits on an in-flight start before giving up.
    #[serde(with = "humantime_serde", default = "default_wait_ceiling")]
    pub wait_ceiling: Duration,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct StopConfig {
    /// Grace between the polite termination signal and the forceful one.
    #[serde(with = "humantime_serde", default = "default_grace_period")]
    pub grace_period: Duration,
}

fn default_log_filter() -> String {
    "info".into()
}

fn default_port() -> u16 {
    8765
}

fn default_startup_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_check_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_check_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_idle_window() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_warning_lead() -> Duration {
    Duration::from_secs(60)
}

fn default_wait_ceiling() -> Duration {
    Duration::from_secs(30)
}

fn default_grace_period() -> Duration {
    Duration::from_secs(5)
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            startup_timeout: default_startup_timeout(),
            poll_interval: default_poll_interval(),
            check_interval: default_check_interval(),
            check_timeout: default_check_timeout(),
        }
    }
}

impl Default for HibernateConfig {
    fn default() -> Self {
        Self {
            idle_window: default_idle_window(),
            warning_lead: default_warning_lead(),
        }
    }
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            wait_ceiling: default_wait_ceiling(),
        }
    }
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_fills_defaults() {
        let config: WardenConfig = serde_yaml::from_str(
            "engine:\n  command: /opt/engine/engine\n  working-directory: /opt/engine\n",
        )
        .unwrap();
        assert_eq!(config.engine.port, 8765);
        assert_eq!(config.engine.mode, DeployMode::Production);
        assert_eq!(config.health.startup_timeout, Duration::from_secs(10));
        assert_eq!(config.health.poll_interval, Duration::from_millis(500));
        assert_eq!(config.hibernate.idle_window, Duration::from_secs(900));
        assert_eq!(config.hibernate.warning_lead, Duration::from_secs(60));
        assert_eq!(config.activation.wait_ceiling, Duration::from_secs(30));
        assert_eq!(config.stop.grace_period, Duration::from_secs(5));
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn humantime_durations_parse() {
        let config: WardenConfig = serde_yaml::from_str(
            r#"
engine:
  command: /opt/engine/engine --serve
  dev-command: python3 main.py
  mode: development
  working-directory: /opt/engine
  port: 9100
hibernate:
  idle-window: 5m
  warning-lead: 30s
stop:
  grace-period: 2s
"#,
        )
        .unwrap();
        assert_eq!(config.engine.mode, DeployMode::Development);
        assert_eq!(config.engine.port, 9100);
        assert_eq!(config.hibernate.idle_window, Duration::from_secs(300));
        assert_eq!(config.hibernate.warning_lead, Duration::from_secs(30));
        assert_eq!(config.stop.grace_period, Duration::from_secs(2));
    }
}
