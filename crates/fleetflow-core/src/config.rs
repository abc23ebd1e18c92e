//! FleetFlow configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FleetFlowError, Result};
use crate::types::{NotificationType, Portal, Recipient};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FleetFlowConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub channels: ChannelConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
}

impl FleetFlowConfig {
    /// Load config from the default path (~/.fleetflow/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FleetFlowError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| FleetFlowError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the given path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| FleetFlowError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the FleetFlow home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".fleetflow")
    }

    /// Reject values the guards cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.monitor.interval_secs == 0 {
            return Err(FleetFlowError::Config("monitor.interval_secs must be > 0".into()));
        }
        if self.rate_limit.max_per_window() == 0 {
            return Err(FleetFlowError::Config(
                "rate_limit allows zero requests per window".into(),
            ));
        }
        if self.rate_limit.headroom_pct > 100 {
            return Err(FleetFlowError::Config("rate_limit.headroom_pct must be <= 100".into()));
        }
        if self.circuit_breaker.max_failures == 0 {
            return Err(FleetFlowError::Config("circuit_breaker.max_failures must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(FleetFlowError::Config("retry.max_attempts must be > 0".into()));
        }
        for r in &self.recipients {
            if !r.preferences.quiet_hours.enabled {
                continue;
            }
            if r.preferences.quiet_hours.window().is_none() {
                return Err(FleetFlowError::Config(format!(
                    "recipient '{}': quiet hours must be HH:MM",
                    r.id
                )));
            }
        }
        Ok(())
    }
}

/// Opportunity monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_name")]
    pub name: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Opportunities at or above this value are raised to high priority.
    #[serde(default = "default_high_value")]
    pub high_value_threshold: f64,
    /// Opportunities due within this many days are raised to urgent.
    #[serde(default = "default_urgent_days")]
    pub urgent_deadline_days: i64,
    /// Type stamped on notifications raised by this monitor.
    #[serde(default = "default_notification_type")]
    pub notification_type: NotificationType,
    /// Portals that should see these notifications; empty means all.
    #[serde(default)]
    pub target_portals: Vec<Portal>,
    #[serde(default)]
    pub source: SourceConfig,
}

fn default_monitor_name() -> String { "sam-gov".into() }
fn default_interval_secs() -> u64 { 30 * 60 }
fn default_lookback_days() -> u32 { 7 }
fn default_high_value() -> f64 { 1_000_000.0 }
fn default_urgent_days() -> i64 { 3 }
fn default_notification_type() -> NotificationType { NotificationType::GovernmentContract }

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            name: default_monitor_name(),
            interval_secs: default_interval_secs(),
            lookback_days: default_lookback_days(),
            category: None,
            keywords: vec![],
            high_value_threshold: default_high_value(),
            urgent_deadline_days: default_urgent_days(),
            notification_type: default_notification_type(),
            target_portals: vec![],
            source: SourceConfig::default(),
        }
    }
}

/// Upstream HTTP source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Label stamped on fetched opportunities.
    #[serde(default = "default_source_system")]
    pub source_system: String,
    #[serde(default)]
    pub limit: Option<u32>,
}

fn default_source_url() -> String { "https://api.sam.gov/opportunities/v2/search".into() }
fn default_source_system() -> String { "sam.gov".into() }

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_url(),
            api_key: String::new(),
            source_system: default_source_system(),
            limit: None,
        }
    }
}

/// Hourly budget for upstream calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Published upstream quota per hour.
    #[serde(default = "default_hourly_quota")]
    pub hourly_quota: u32,
    /// Share of the quota we allow ourselves, in percent.
    #[serde(default = "default_headroom_pct")]
    pub headroom_pct: u32,
}

fn default_hourly_quota() -> u32 { 1000 }
fn default_headroom_pct() -> u32 { 90 }

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            hourly_quota: default_hourly_quota(),
            headroom_pct: default_headroom_pct(),
        }
    }
}

impl RateLimitConfig {
    pub fn max_per_window(&self) -> u32 {
        (self.hourly_quota as u64 * self.headroom_pct as u64 / 100) as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_secs: u64,
}

fn default_max_failures() -> u32 { 5 }
fn default_reset_timeout() -> u64 { 5 * 60 }

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            reset_timeout_secs: default_reset_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub jitter: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_base_delay() -> u64 { 1000 }
fn default_max_delay() -> u64 { 10_000 }
fn default_request_timeout() -> u64 { 30 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            jitter: false,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_channel_timeout")]
    pub channel_timeout_secs: u64,
    /// Soft cap per recipient in the in-app store. Only read entries are evicted.
    #[serde(default = "default_in_app_history")]
    pub in_app_history: usize,
}

fn default_channel_timeout() -> u64 { 30 }
fn default_in_app_history() -> usize { 100 }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            channel_timeout_secs: default_channel_timeout(),
            in_app_history: default_in_app_history(),
        }
    }
}

/// Outbound channel configuration. In-app delivery is always on.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelConfig {
    #[serde(default)]
    pub email: Option<EmailChannelConfig>,
    #[serde(default)]
    pub sms: Option<SmsChannelConfig>,
    #[serde(default)]
    pub push: Option<PushChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port_cfg")]
    pub smtp_port: u16,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

fn default_smtp_port_cfg() -> u16 { 587 }

/// Twilio-style SMS gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    pub api_url: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

/// HTTP push gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.fleetflow/fleetflow.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

impl DatabaseConfig {
    /// Path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Portal, Priority};

    #[test]
    fn test_default_config() {
        let config = FleetFlowConfig::default();
        assert_eq!(config.monitor.interval_secs, 1800);
        assert_eq!(config.rate_limit.max_per_window(), 900);
        assert_eq!(config.circuit_breaker.max_failures, 5);
        assert_eq!(config.circuit_breaker.reset_timeout_secs, 300);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.max_delay_ms, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [monitor]
            name = "automotive"
            interval_secs = 600
            keywords = ["fleet", "tires"]

            [rate_limit]
            hourly_quota = 200
            headroom_pct = 50

            [[recipients]]
            id = "broker-1"
            name = "Dana"
            portal = "broker"
            email = "dana@example.com"

            [recipients.preferences]
            priorities = ["high", "urgent"]
            min_value = 25000.0

            [recipients.preferences.quiet_hours]
            enabled = true
            start = "21:00"
            end = "06:30"
        "#;

        let config = FleetFlowConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.monitor.name, "automotive");
        assert_eq!(config.monitor.keywords, vec!["fleet", "tires"]);
        assert_eq!(config.rate_limit.max_per_window(), 100);
        let r = &config.recipients[0];
        assert_eq!(r.portal, Portal::Broker);
        assert!(r.preferences.priority_enabled(Priority::High));
        assert!(!r.preferences.priority_enabled(Priority::Low));
        assert!(r.preferences.quiet_hours.urgent_bypass);
        assert_eq!(r.preferences.min_value, Some(25_000.0));
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config = FleetFlowConfig::from_toml("").unwrap();
        assert_eq!(config.monitor.name, "sam-gov");
        assert!(config.recipients.is_empty());
        assert!(config.channels.email.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(FleetFlowConfig::from_toml("[monitor]\ninterval_secs = 0").is_err());
        assert!(FleetFlowConfig::from_toml("[rate_limit]\nhourly_quota = 1").is_err());
        assert!(FleetFlowConfig::from_toml("[retry]\nmax_attempts = 0").is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join("fleetflow-test-config");
        let path = dir.join("config.toml");
        let mut config = FleetFlowConfig::default();
        config.monitor.category = Some("484".into());
        config.save_to(&path).unwrap();

        let loaded = FleetFlowConfig::load_from(&path).unwrap();
        assert_eq!(loaded.monitor.category.as_deref(), Some("484"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_home_dir() {
        let home = FleetFlowConfig::home_dir();
        assert!(home.to_string_lossy().contains("fleetflow"));
    }
}
