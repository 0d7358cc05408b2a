// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Dispatch Configuration
//
// YAML configuration for the dispatch core:
// - Robot control request timeout
// - Localization reconciliation deadline and poll cadence
// - Heartbeat deadline before a robot is treated as lost
// - Auto-schedule switch and installation-local UTC offset
// - Event bus capacity, storage backend and logging

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::repository::{PostgresConfig, StorageBackend};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub robot_control: RobotControlConfig,
    #[serde(default)]
    pub localization: LocalizationConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub auto_schedule: AutoScheduleConfig,
    #[serde(default)]
    pub event_bus: EventBusConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotControlConfig {
    /// Upper bound for every start/stop/pause/resume call
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizationConfig {
    /// Deadline for an ongoing localization run to reach a terminal status
    #[serde(with = "humantime_serde", default = "default_localization_timeout")]
    pub timeout: Duration,
    /// Re-read cadence when no status event arrives
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(with = "humantime_serde", default = "default_heartbeat_timeout")]
    pub heartbeat_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoScheduleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Offset of installation-local time from UTC, in minutes
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    #[serde(default = "default_event_bus_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    #[default]
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,
    #[serde(default)]
    pub connection_string: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_localization_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_heartbeat_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_utc_offset_minutes() -> i32 {
    60
}

fn default_event_bus_capacity() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RobotControlConfig {
    fn default() -> Self {
        Self { request_timeout: default_request_timeout() }
    }
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            timeout: default_localization_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { heartbeat_timeout: default_heartbeat_timeout() }
    }
}

impl Default for AutoScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { capacity: default_event_bus_capacity() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl DispatchConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. FLEET_DISPATCH_CONFIG_PATH environment variable
    /// 2. ./fleet-dispatch.yaml (working directory)
    /// 3. ~/.fleet-dispatch/config.yaml (user home)
    /// 4. /etc/fleet-dispatch/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("FLEET_DISPATCH_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./fleet-dispatch.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".fleet-dispatch").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/fleet-dispatch/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(explicit_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = explicit_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Some(ms) = env_millis("FLEET_DISPATCH_LOCALIZATION_TIMEOUT_MS") {
            tracing::info!("Environment override: FLEET_DISPATCH_LOCALIZATION_TIMEOUT_MS={}", ms);
            self.localization.timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = env_millis("FLEET_DISPATCH_ROBOT_CONTROL_TIMEOUT_MS") {
            tracing::info!("Environment override: FLEET_DISPATCH_ROBOT_CONTROL_TIMEOUT_MS={}", ms);
            self.robot_control.request_timeout = Duration::from_millis(ms);
        }

        if let Ok(url) = std::env::var("FLEET_DISPATCH_DATABASE_URL") {
            tracing::info!("Environment override: FLEET_DISPATCH_DATABASE_URL set, using postgres backend");
            self.storage.backend = StorageBackendKind::Postgres;
            self.storage.connection_string = Some(url);
        }

        if let Ok(val) = std::env::var("FLEET_DISPATCH_AUTO_SCHEDULE_ENABLED") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => self.auto_schedule.enabled = true,
                "false" | "0" | "no" | "off" => self.auto_schedule.enabled = false,
                _ => tracing::warn!(
                    "Invalid value for FLEET_DISPATCH_AUTO_SCHEDULE_ENABLED: '{}'. Expected true/false. Ignoring.",
                    val
                ),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.robot_control.request_timeout.is_zero() {
            anyhow::bail!("robot_control.request_timeout must be greater than zero");
        }
        if self.localization.timeout.is_zero() {
            anyhow::bail!("localization.timeout must be greater than zero");
        }
        if self.localization.poll_interval.is_zero() {
            anyhow::bail!("localization.poll_interval must be greater than zero");
        }
        if self.connection.heartbeat_timeout.is_zero() {
            anyhow::bail!("connection.heartbeat_timeout must be greater than zero");
        }
        if self.event_bus.capacity == 0 {
            anyhow::bail!("event_bus.capacity must be greater than zero");
        }
        // Real-world offsets span UTC-12:00 to UTC+14:00
        if !(-12 * 60..=14 * 60).contains(&self.auto_schedule.utc_offset_minutes) {
            anyhow::bail!(
                "auto_schedule.utc_offset_minutes {} is out of range",
                self.auto_schedule.utc_offset_minutes
            );
        }
        if self.storage.backend == StorageBackendKind::Postgres
            && self.storage.connection_string.as_deref().is_none_or(str::is_empty)
        {
            anyhow::bail!("storage.connection_string is required for the postgres backend");
        }
        Ok(())
    }

    pub fn storage_backend(&self) -> StorageBackend {
        match (&self.storage.backend, &self.storage.connection_string) {
            (StorageBackendKind::Postgres, Some(connection_string)) => StorageBackend::PostgreSQL(PostgresConfig {
                connection_string: connection_string.clone(),
            }),
            _ => StorageBackend::InMemory,
        }
    }
}

fn env_millis(name: &str) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    match val.parse::<u64>() {
        Ok(ms) if ms > 0 => Some(ms),
        _ => {
            tracing::warn!("Invalid value for {}: '{}'. Expected positive milliseconds. Ignoring.", name, val);
            None
        }
    }
}
