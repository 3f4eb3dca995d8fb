//! Configuration types for the gremlin service.

use anyhow::{anyhow, Context, Result};
use arc_swap::ArcSwap;
use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Main configuration for the gremlin service.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Global settings.
    pub settings: Settings,
    /// Simulated service behaviour.
    pub service: ServiceConfig,
    /// Instance identity resolution.
    pub identity: IdentityConfig,
    /// Safety limits.
    pub safety: SafetyConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.service.validate()?;

        for schedule in &self.safety.schedule {
            schedule.validate()?;
        }

        Ok(())
    }
}

/// Global settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Global kill switch. When off, calls never fail.
    pub enabled: bool,
    /// Decide and log failures without returning them.
    pub dry_run: bool,
    /// Log when failures are injected.
    pub log_injections: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            dry_run: false,
            log_injections: true,
        }
    }
}

/// Behaviour of the simulated downstream service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service name reported in messages and sources.
    pub name: String,
    /// Simulated work per call in milliseconds.
    pub work_time_ms: u64,
    /// Probability of a simulated failure (0.0-1.0).
    pub fail_probability: f64,
    /// Seed for a reproducible failure sequence.
    pub seed: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "serviceB".to_string(),
            work_time_ms: 100,
            fail_probability: 0.0,
            seed: None,
        }
    }
}

impl ServiceConfig {
    /// Simulated work per call.
    pub fn work_time(&self) -> Duration {
        Duration::from_millis(self.work_time_ms)
    }

    /// Validate the service configuration.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("Service name cannot be empty"));
        }

        if !self.fail_probability.is_finite()
            || self.fail_probability < 0.0
            || self.fail_probability > 1.0
        {
            return Err(anyhow!(
                "fail_probability must be between 0.0 and 1.0, got {}",
                self.fail_probability
            ));
        }

        Ok(())
    }
}

/// How the instance identity is resolved.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Fixed identity, bypassing hostname lookup.
    #[serde(rename = "override")]
    pub fixed: Option<String>,
    /// Identity used when the hostname cannot be resolved.
    pub fallback: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            fixed: None,
            fallback: "unknown-host".to_string(),
        }
    }
}

/// Safety configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Schedule windows when failures are armed. Empty means always.
    pub schedule: Vec<Schedule>,
}

/// Schedule window when failures are armed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Schedule {
    /// Days of the week.
    #[serde(deserialize_with = "deserialize_weekdays")]
    pub days: Vec<Weekday>,
    /// Start time (HH:MM format).
    #[serde(deserialize_with = "deserialize_time")]
    pub start: NaiveTime,
    /// End time (HH:MM format).
    #[serde(deserialize_with = "deserialize_time")]
    pub end: NaiveTime,
    /// Timezone (e.g., "UTC", "America/New_York").
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Schedule {
    /// Validate the schedule window.
    pub fn validate(&self) -> Result<()> {
        if self.start >= self.end {
            return Err(anyhow!(
                "Schedule start time ({}) must be before end time ({})",
                self.start,
                self.end
            ));
        }

        self.tz()?;
        Ok(())
    }

    /// Parsed timezone of the window.
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse()
            .map_err(|e| anyhow!("Invalid timezone '{}': {}", self.timezone, e))
    }
}

fn deserialize_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    NaiveTime::parse_from_str(&s, "%H:%M").map_err(serde::de::Error::custom)
}

fn deserialize_weekdays<'de, D>(deserializer: D) -> Result<Vec<Weekday>, D::Error>
where
    D: Deserializer<'de>,
{
    let days: Vec<String> = Deserialize::deserialize(deserializer)?;
    days.into_iter()
        .map(|s| {
            parse_weekday(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("Invalid weekday: {}", s)))
        })
        .collect()
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s.to_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Configuration shared between the handler and whoever reloads it.
///
/// Readers take a snapshot with [`SharedConfig::load`]; a reload swaps the
/// snapshot atomically, so a call in flight keeps the values it started with.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<ArcSwap<Config>>,
    notify: Arc<watch::Sender<u64>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
            notify: Arc::new(notify),
        }
    }

    /// Current configuration snapshot.
    pub fn load(&self) -> Arc<Config> {
        self.inner.load_full()
    }

    /// Replace the configuration after validating it.
    pub fn store(&self, config: Config) -> Result<()> {
        config.validate()?;
        let new_fail_probability = config.service.fail_probability;
        let new_work_time_ms = config.service.work_time_ms;
        let old = self.inner.swap(Arc::new(config));
        info!(
            old_fail_probability = old.service.fail_probability,
            new_fail_probability,
            old_work_time_ms = old.service.work_time_ms,
            new_work_time_ms,
            "Configuration updated"
        );
        self.notify.send_modify(|version| *version += 1);
        Ok(())
    }

    /// Reload from disk. The current configuration is kept on error.
    ///
    /// Returns `true` if the reload was successful.
    pub fn reload(&self, path: &Path) -> bool {
        match Config::from_file(path).and_then(|config| self.store(config)) {
            Ok(()) => true,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to reload configuration");
                warn!("Keeping previous configuration");
                false
            }
        }
    }

    /// Subscribe to reload notifications. The value is a reload counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.settings.enabled);
        assert!(!config.settings.dry_run);
        assert_eq!(config.service.name, "serviceB");
        assert_eq!(config.service.work_time(), Duration::from_millis(100));
        assert_eq!(config.service.fail_probability, 0.0);
        assert!(config.safety.schedule.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
service:
  fail_probability: 0.25
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.service.fail_probability, 0.25);
        assert_eq!(config.service.work_time_ms, 100);
        assert_eq!(config.identity.fallback, "unknown-host");
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
settings:
  enabled: false
  dry_run: true
  log_injections: false
service:
  name: "inventory"
  work_time_ms: 10
  fail_probability: 1.0
  seed: 42
identity:
  override: "pod-7"
  fallback: "nowhere"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(!config.settings.enabled);
        assert!(config.settings.dry_run);
        assert_eq!(config.service.name, "inventory");
        assert_eq!(config.service.seed, Some(42));
        assert_eq!(config.identity.fixed.as_deref(), Some("pod-7"));
        assert_eq!(config.identity.fallback, "nowhere");
    }

    #[test]
    fn test_parse_schedule() {
        let yaml = r#"
safety:
  schedule:
    - days: [mon, tue, wednesday]
      start: "09:00"
      end: "17:00"
      timezone: "Europe/Berlin"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.safety.schedule.len(), 1);
        assert_eq!(
            config.safety.schedule[0].days,
            vec![Weekday::Mon, Weekday::Tue, Weekday::Wed]
        );
    }

    #[test]
    fn test_invalid_weekday_rejected() {
        let yaml = r#"
safety:
  schedule:
    - days: [funday]
      start: "09:00"
      end: "17:00"
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validation_fails_for_probability_out_of_range() {
        for p in ["1.5", "-0.1", ".nan"] {
            let yaml = format!("service:\n  fail_probability: {}\n", p);
            assert!(Config::from_yaml(&yaml).is_err(), "accepted {}", p);
        }
    }

    #[test]
    fn test_validation_fails_for_empty_name() {
        let yaml = r#"
service:
  name: "  "
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validation_fails_for_inverted_schedule() {
        let yaml = r#"
safety:
  schedule:
    - days: [mon]
      start: "17:00"
      end: "09:00"
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validation_fails_for_unknown_timezone() {
        let yaml = r#"
safety:
  schedule:
    - days: [mon]
      start: "09:00"
      end: "17:00"
      timezone: "Mars/Olympus"
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_shared_config_store_notifies() {
        let shared = SharedConfig::new(Config::default());
        let receiver = shared.subscribe();
        assert_eq!(*receiver.borrow(), 0);

        let mut next = Config::default();
        next.service.fail_probability = 0.5;
        shared.store(next).unwrap();

        assert_eq!(shared.load().service.fail_probability, 0.5);
        assert_eq!(*receiver.borrow(), 1);
    }

    #[test]
    fn test_shared_config_store_rejects_invalid() {
        let shared = SharedConfig::new(Config::default());

        let mut bad = Config::default();
        bad.service.fail_probability = 2.0;
        assert!(shared.store(bad).is_err());
        assert_eq!(shared.load().service.fail_probability, 0.0);
    }

    #[test]
    fn test_reload_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "service:\n  fail_probability: 0.75\n  work_time_ms: 5").unwrap();

        let shared = SharedConfig::new(Config::default());
        assert!(shared.reload(file.path()));
        assert_eq!(shared.load().service.fail_probability, 0.75);
        assert_eq!(shared.load().service.work_time_ms, 5);
    }

    #[test]
    fn test_reload_keeps_previous_on_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "service:\n  fail_probability: 3.0").unwrap();

        let shared = SharedConfig::new(Config::default());
        assert!(!shared.reload(file.path()));
        assert_eq!(shared.load().service.fail_probability, 0.0);
        assert_eq!(*shared.subscribe().borrow(), 0);
    }
}
