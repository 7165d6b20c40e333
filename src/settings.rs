//! Player settings persistence
//!
//! Handles loading, validating and saving scheduler configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// What to do with a period whose load failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Leave it failed; the period stays empty
    Never,
    /// Request it again on the next tick that still needs it
    #[default]
    NextTick,
}

/// What a seek does to already cached periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SeekCachePolicy {
    /// Keep loaded data; only the revealed set is cleared
    #[default]
    Retain,
    /// Drop every cache entry as well
    Clear,
}

impl std::fmt::Display for SeekCachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeekCachePolicy::Retain => write!(f, "retain"),
            SeekCachePolicy::Clear => write!(f, "clear"),
        }
    }
}

/// Scheduler and layout configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DanmakuConfig {
    /// Length of one fetch window in ms
    pub period_length_ms: i64,
    /// Time for an item to cross the viewport once, in ms
    pub duration_ms: i64,
    /// Periods loaded ahead of the current one
    pub prefetch_ahead: u32,
    /// Clock jumps larger than this are treated as a seek
    pub seek_threshold_ms: i64,
    pub line_height: f64,
    pub font_size: f64,
    pub retry_policy: RetryPolicy,
    pub seek_cache_policy: SeekCachePolicy,
}

impl Default for DanmakuConfig {
    fn default() -> Self {
        Self {
            period_length_ms: 10_000,
            duration_ms: 5_000,
            prefetch_ahead: 1,
            seek_threshold_ms: 1_000,
            line_height: 36.0,
            font_size: 24.0,
            retry_policy: RetryPolicy::NextTick,
            seek_cache_policy: SeekCachePolicy::Retain,
        }
    }
}

impl DanmakuConfig {
    pub fn new(period_length_ms: i64, duration_ms: i64, line_height: f64, font_size: f64) -> Self {
        Self {
            period_length_ms,
            duration_ms,
            line_height,
            font_size,
            ..Self::default()
        }
    }

    pub fn with_prefetch_ahead(mut self, prefetch_ahead: u32) -> Self {
        self.prefetch_ahead = prefetch_ahead;
        self
    }

    pub fn with_seek_threshold(mut self, seek_threshold_ms: i64) -> Self {
        self.seek_threshold_ms = seek_threshold_ms;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_seek_cache_policy(mut self, seek_cache_policy: SeekCachePolicy) -> Self {
        self.seek_cache_policy = seek_cache_policy;
        self
    }

    /// Reject configurations the scheduler cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period_length_ms <= 0 {
            return Err(ConfigError::InvalidPeriodLength(self.period_length_ms));
        }
        if self.duration_ms <= 0 {
            return Err(ConfigError::InvalidDuration(self.duration_ms));
        }
        if !(self.line_height > 0.0) {
            return Err(ConfigError::InvalidLineHeight(self.line_height));
        }
        if !(self.font_size > 0.0) {
            return Err(ConfigError::InvalidFontSize(self.font_size));
        }
        if self.seek_threshold_ms < 0 {
            return Err(ConfigError::InvalidSeekThreshold(self.seek_threshold_ms));
        }
        Ok(())
    }

    /// Periods behind the current one whose surfaces may still be on screen
    pub fn retention_span(&self) -> f64 {
        (2 * self.duration_ms) as f64 / self.period_length_ms as f64
    }
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub danmaku: DanmakuConfig,
    /// Viewport used by the demo when no layout is available
    #[serde(default)]
    pub viewport: ViewportSettings,
}

/// Fallback viewport size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportSettings {
    pub width: f64,
    pub height: f64,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 360.0,
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "danmaku", "Danmaku")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Load settings from file, or return defaults if not found
    pub fn load() -> Self {
        Self::file_path()
            .and_then(|path| Self::load_from_file(&path).ok())
            .unwrap_or_default()
    }

    /// Load settings from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| SettingsError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    /// Save settings to the default file
    pub fn save(&self) -> Result<(), SettingsError> {
        if let Some(path) = Self::file_path() {
            self.save_to_file(&path)
        } else {
            Err(SettingsError::Io(
                "Could not determine config directory".to_string(),
            ))
        }
    }

    /// Save settings to a specific file
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Io(e.to_string()))?;
        }

        let content =
            serde_json::to_string_pretty(self).map_err(|e| SettingsError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| SettingsError::Io(e.to_string()))?;
        Ok(())
    }
}

/// Errors that can occur with settings
#[derive(Debug, Clone)]
pub enum SettingsError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "IO error: {}", e),
            SettingsError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for SettingsError {}

/// Configuration rejected before a scheduler starts
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidPeriodLength(i64),
    InvalidDuration(i64),
    InvalidLineHeight(f64),
    InvalidFontSize(f64),
    InvalidSeekThreshold(i64),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPeriodLength(v) => {
                write!(f, "period length must be positive, got {}ms", v)
            }
            ConfigError::InvalidDuration(v) => {
                write!(f, "crossing duration must be positive, got {}ms", v)
            }
            ConfigError::InvalidLineHeight(v) => {
                write!(f, "line height must be positive, got {}", v)
            }
            ConfigError::InvalidFontSize(v) => write!(f, "font size must be positive, got {}", v),
            ConfigError::InvalidSeekThreshold(v) => {
                write!(f, "seek threshold must not be negative, got {}ms", v)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DanmakuConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.prefetch_ahead, 1);
        assert_eq!(config.seek_threshold_ms, 1000);
        assert_eq!(config.seek_cache_policy, SeekCachePolicy::Retain);
    }

    #[test]
    fn test_validate_rejects_invariant_violations() {
        assert_eq!(
            DanmakuConfig::new(0, 5000, 30.0, 20.0).validate(),
            Err(ConfigError::InvalidPeriodLength(0))
        );
        assert_eq!(
            DanmakuConfig::new(1000, -1, 30.0, 20.0).validate(),
            Err(ConfigError::InvalidDuration(-1))
        );
        assert_eq!(
            DanmakuConfig::new(1000, 1000, 0.0, 20.0).validate(),
            Err(ConfigError::InvalidLineHeight(0.0))
        );
        assert!(matches!(
            DanmakuConfig::new(1000, 1000, 30.0, f64::NAN).validate(),
            Err(ConfigError::InvalidFontSize(_))
        ));
        assert_eq!(
            DanmakuConfig::default().with_seek_threshold(-5).validate(),
            Err(ConfigError::InvalidSeekThreshold(-5))
        );
    }

    #[test]
    fn test_retention_span() {
        let config = DanmakuConfig::new(10_000, 5_000, 30.0, 20.0);
        assert_eq!(config.retention_span(), 1.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "danmaku": { "period_length_ms": 4000, "retry_policy": "never" } }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.danmaku.period_length_ms, 4000);
        assert_eq!(settings.danmaku.retry_policy, RetryPolicy::Never);
        assert_eq!(settings.danmaku.duration_ms, 5000);
        assert_eq!(settings.viewport, ViewportSettings::default());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.danmaku = settings
            .danmaku
            .with_prefetch_ahead(3)
            .with_seek_cache_policy(SeekCachePolicy::Clear);
        settings.save_to_file(&path).unwrap();

        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::load_from_file(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(SettingsError::Io(_))));
    }
}
