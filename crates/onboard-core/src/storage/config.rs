//! TOML-based application configuration.
//!
//! Stores:
//! - Timer lengths (snippet duration, gap between snippets, first-step delay,
//!   end-of-life grace, resume threshold)
//! - Tour content track and session cap
//! - Notification preferences
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::timer::TimerKind;
use crate::tour::Variation;

/// One day in milliseconds.
pub const ONE_DAY_MS: u64 = 86_400_000;
/// One minute in milliseconds.
pub const ONE_MINUTE_MS: u64 = 60_000;

/// Timer lengths, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimersConfig {
    /// How long a snippet stays up before it is force-progressed.
    #[serde(default = "default_day")]
    pub duration_ms: u64,
    /// Gap between the end of one snippet and the next.
    #[serde(default = "default_day")]
    pub interval_ms: u64,
    /// Wait after the very first launch before step 0 appears.
    #[serde(default)]
    pub first_step_delay_ms: u64,
    /// Wait after the last snippet before the tour retires.
    #[serde(default)]
    pub destroy_grace_ms: u64,
    /// Resumed timers with this much time or less left fire immediately.
    #[serde(default = "default_threshold")]
    pub resume_threshold_ms: u64,
}

/// Tour content and pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TourConfig {
    #[serde(default)]
    pub variation: Variation,
    /// Replaces the variation's topic list when set.
    #[serde(default)]
    pub custom_topics: Option<Vec<String>>,
    /// Launches a snippet may stay up for before it expires.
    #[serde(default = "default_session_cap")]
    pub session_cap: u32,
}

/// Notification configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub timers: TimersConfig,
    #[serde(default)]
    pub tour: TourConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

// Default functions
fn default_day() -> u64 {
    ONE_DAY_MS
}
fn default_threshold() -> u64 {
    ONE_MINUTE_MS
}
fn default_session_cap() -> u32 {
    3
}
fn default_true() -> bool {
    true
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            duration_ms: ONE_DAY_MS,
            interval_ms: ONE_DAY_MS,
            first_step_delay_ms: 0,
            destroy_grace_ms: 0,
            resume_threshold_ms: ONE_MINUTE_MS,
        }
    }
}

impl Default for TourConfig {
    fn default() -> Self {
        Self {
            variation: Variation::default(),
            custom_topics: None,
            session_cap: default_session_cap(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl TimersConfig {
    /// Full length of a timer of `kind`.
    pub fn nominal_ms(&self, kind: TimerKind) -> u64 {
        match kind {
            TimerKind::Welcome => self.first_step_delay_ms,
            TimerKind::Duration => self.duration_ms,
            TimerKind::Interval => self.interval_ms,
            TimerKind::Destroy => self.destroy_grace_ms,
        }
    }
}

impl TourConfig {
    /// Topics in presentation order, one per step.
    pub fn topics(&self) -> Vec<String> {
        match &self.custom_topics {
            Some(custom) => custom.clone(),
            None => self
                .variation
                .topics()
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
        }
    }

    /// Index of the final step of the main sequence.
    pub fn last_step(&self) -> u32 {
        (self.topics().len() as u32).saturating_sub(1)
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    // Optional lists are stored as null until set.
                    serde_json::Value::Null
                    | serde_json::Value::Object(_)
                    | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Every settable dot-separated key, sorted.
    pub fn keys(&self) -> Vec<String> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<String>) {
            match value.as_object() {
                Some(obj) => {
                    for (name, child) in obj {
                        let path = if prefix.is_empty() {
                            name.clone()
                        } else {
                            format!("{prefix}.{name}")
                        };
                        walk(&path, child, out);
                    }
                }
                None => out.push(prefix.to_string()),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out
    }

    /// Set a config value by key and save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// the result is invalid, or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply_value(key, value)?;
        self.save()
    }

    /// Set a config value by key without touching disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value is invalid.
    pub fn apply_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Reject configurations the tour cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tour.topics().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "tour.custom_topics".into(),
                message: "at least one topic is required".into(),
            });
        }
        if self.tour.session_cap == 0 {
            return Err(ConfigError::InvalidValue {
                key: "tour.session_cap".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(parsed.timers.duration_ms, ONE_DAY_MS);
        assert_eq!(parsed.timers.resume_threshold_ms, ONE_MINUTE_MS);
        assert_eq!(parsed.tour.session_cap, 3);
        assert!(parsed.notifications.enabled);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let parsed: Config = toml::from_str("[timers]\ninterval_ms = 5000\n").unwrap();
        assert_eq!(parsed.timers.interval_ms, 5000);
        assert_eq!(parsed.timers.duration_ms, ONE_DAY_MS);
    }

    #[test]
    fn default_tour_has_six_steps() {
        let cfg = Config::default();
        assert_eq!(cfg.tour.topics().len(), 6);
        assert_eq!(cfg.tour.last_step(), 5);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("timers.duration_ms").as_deref(), Some("86400000"));
        assert_eq!(cfg.get("notifications.enabled").as_deref(), Some("true"));
        assert_eq!(cfg.get("tour.variation").as_deref(), Some("a"));
        assert!(cfg.get("timers.missing_key").is_none());
    }

    #[test]
    fn apply_value_updates_nested_number() {
        let mut cfg = Config::default();
        cfg.apply_value("timers.interval_ms", "120000").unwrap();
        assert_eq!(cfg.timers.interval_ms, 120_000);
    }

    #[test]
    fn apply_value_sets_custom_topics() {
        let mut cfg = Config::default();
        cfg.apply_value("tour.custom_topics", r#"["sync","search"]"#).unwrap();
        assert_eq!(cfg.tour.last_step(), 1);
    }

    #[test]
    fn apply_value_rejects_unknown_key() {
        let mut cfg = Config::default();
        let err = cfg.apply_value("timers.nonexistent", "1").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(_)));
    }

    #[test]
    fn apply_value_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(cfg.apply_value("notifications.enabled", "not_a_bool").is_err());
        assert!(cfg.apply_value("timers.duration_ms", "soon").is_err());
    }

    #[test]
    fn validate_rejects_empty_topics_and_zero_cap() {
        let mut cfg = Config::default();
        assert!(cfg.apply_value("tour.custom_topics", "[]").is_err());
        assert!(cfg.apply_value("tour.session_cap", "0").is_err());
        // Rejected values are not kept.
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn keys_lists_every_leaf() {
        let keys = Config::default().keys();
        assert!(keys.contains(&"timers.duration_ms".to_string()));
        assert!(keys.contains(&"tour.session_cap".to_string()));
        assert!(keys.contains(&"tour.custom_topics".to_string()));
        assert!(keys.contains(&"notifications.enabled".to_string()));
        assert!(!keys.iter().any(|k| k == "timers" || k == "tour"));
        for key in &keys {
            assert!(Config::default().get(key).is_some(), "{key}");
        }
    }
}
