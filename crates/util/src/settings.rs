//! Engine settings persistence for breachkit hosts.
//!
//! Settings live in a small JSON document under the standard configuration
//! directory (`~/.config/breachkit/settings.json` on most platforms). A
//! missing file yields defaults; a malformed file is reported and ignored so
//! a bad edit never prevents scripts from running.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::expand_tilde;

/// Environment variable allowing callers to override the settings file path.
pub const SETTINGS_PATH_ENV: &str = "BREACHKIT_SETTINGS_PATH";

/// Default filename for the JSON payload.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Error surfaced when reading or writing settings fails.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Tunables applied by the automation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Timeout applied to imported steps that do not declare one.
    pub default_step_timeout_ms: u64,
    /// Upper bound on step attempts within a single execution.
    pub max_transitions: u32,
    /// Ceiling applied to `wait(seconds)` inside capture expressions.
    pub max_wait_seconds: u64,
    /// Number of finished executions retained in memory; `None` keeps all.
    pub execution_history_limit: Option<usize>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_step_timeout_ms: 30_000,
            max_transitions: 1_000,
            max_wait_seconds: 300,
            execution_history_limit: None,
        }
    }
}

impl EngineSettings {
    /// Load settings from the default location.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(&default_settings_path())
    }

    /// Load settings from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(settings) => Ok(settings),
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        error = %error,
                        "Failed to parse settings file; using defaults"
                    );
                    Ok(Self::default())
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(SettingsError::Io(error)),
        }
    }

    /// Write settings as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }
}

/// Resolve the settings path, honouring [`SETTINGS_PATH_ENV`].
pub fn default_settings_path() -> PathBuf {
    if let Ok(path) = env::var(SETTINGS_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return expand_tilde(trimmed);
        }
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("breachkit")
        .join(SETTINGS_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings = EngineSettings::load_from(&temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, EngineSettings::default());
    }

    #[test]
    fn partial_file_fills_remaining_fields() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, r#"{"max_transitions": 12}"#).unwrap();

        let settings = EngineSettings::load_from(&path).unwrap();
        assert_eq!(settings.max_transitions, 12);
        assert_eq!(settings.default_step_timeout_ms, 30_000);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();

        let settings = EngineSettings::load_from(&path).unwrap();
        assert_eq!(settings, EngineSettings::default());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let settings = EngineSettings {
            execution_history_limit: Some(50),
            ..Default::default()
        };

        settings.save_to(&path).unwrap();
        assert_eq!(EngineSettings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn env_override_is_respected() {
        temp_env::with_var(SETTINGS_PATH_ENV, Some("/tmp/breachkit-custom.json"), || {
            assert_eq!(default_settings_path(), PathBuf::from("/tmp/breachkit-custom.json"));
        });
    }
}
