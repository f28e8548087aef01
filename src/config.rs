use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chart_points::DEFAULT_BUILDBOT_URL;
use crate::errors::{AppError, AppResult};
use crate::security::InputValidator;
use crate::uploader::RetryPolicy;

pub const DEFAULT_DASHBOARD_URL: &str = "https://chromeperf.appspot.com";

/// Environment variable overriding `buildbot_url`
pub const BUILDBOT_URL_ENV: &str = "BUILDBOT_BUILDBOTURL";

const MAX_RETRY_DELAY_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dashboard_url: String,
    pub max_retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub buildbot_url: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dashboard_url: DEFAULT_DASHBOARD_URL.to_string(),
            max_retry_attempts: 3,
            retry_delay_ms: 0,
            buildbot_url: DEFAULT_BUILDBOT_URL.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn retry_policy(&self) -> AppResult<RetryPolicy> {
        Ok(RetryPolicy::new(self.max_retry_attempts)?
            .with_delay(Duration::from_millis(self.retry_delay_ms)))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(BUILDBOT_URL_ENV) {
            if !url.trim().is_empty() {
                log::debug!("Using buildbot URL from {}", BUILDBOT_URL_ENV);
                self.buildbot_url = url;
            }
        }
    }
}

pub fn get_config_path() -> AppResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?
        .join("perf-uploader");

    Ok(config_dir.join("config.json"))
}

pub fn load_config() -> AppResult<Config> {
    load_config_from(&get_config_path()?)
}

/// Reads the config at `path`, writing the defaults there first when the
/// file does not exist yet.
pub fn load_config_from(path: &Path) -> AppResult<Config> {
    if path.exists() {
        let config_str = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_str).unwrap_or_else(|e| {
            log::warn!("Failed to parse config file: {}. Using defaults.", e);
            Config::default()
        });

        validate_config(&config)?;

        Ok(config)
    } else {
        let default_config = Config::default();
        save_config_to(path, &default_config)?;
        Ok(default_config)
    }
}

pub fn save_config_to(path: &Path, config: &Config) -> AppResult<()> {
    validate_config(config)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Keep the previous file around
    if path.exists() {
        let backup_path = path.with_extension("json.bak");
        if let Err(e) = fs::copy(path, &backup_path) {
            log::warn!("Failed to create config backup: {}", e);
        }
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(path, config_str)?;

    log::info!("Configuration saved to {}", path.display());
    Ok(())
}

pub fn validate_config(config: &Config) -> AppResult<()> {
    InputValidator::validate_dashboard_url(&config.dashboard_url)?;
    InputValidator::validate_retry_settings(config.max_retry_attempts)?;

    if config.retry_delay_ms > MAX_RETRY_DELAY_MS {
        return Err(AppError::validation(
            "retry_delay_ms",
            "Must be 60000ms or less",
        ));
    }

    if !config.buildbot_url.ends_with('/') {
        return Err(AppError::validation(
            "buildbot_url",
            "Must end with a trailing slash",
        ));
    }

    let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(AppError::validation("log_level", "Must be a valid log level"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());

        let policy = config.retry_policy().unwrap();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.retry_delay(), Duration::ZERO);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = Config::default();
        config.max_retry_attempts = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.max_retry_attempts = 11;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.retry_delay_ms = 120_000;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.dashboard_url = "not a url".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.buildbot_url = "http://build.chromium.org/p/chromium".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = load_config_from(&path).unwrap();

        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"max_retry_attempts": 5, "retry_delay_ms": 250}"#).unwrap();

        let config = load_config_from(&path).unwrap();

        assert_eq!(config.max_retry_attempts, 5);
        assert_eq!(config.dashboard_url, DEFAULT_DASHBOARD_URL);
        assert_eq!(
            config.retry_policy().unwrap().retry_delay(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_unparsable_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(load_config_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_save_keeps_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        save_config_to(&path, &Config::default()).unwrap();
        let mut config = Config::default();
        config.log_level = "debug".to_string();
        save_config_to(&path, &config).unwrap();

        assert!(path.with_extension("json.bak").exists());
        assert_eq!(load_config_from(&path).unwrap().log_level, "debug");
    }

    #[test]
    fn test_buildbot_url_env_override() {
        let mut config = Config::default();

        std::env::set_var(BUILDBOT_URL_ENV, "https://ci.example.org/p/perf/");
        config.apply_env_overrides();
        assert_eq!(config.buildbot_url, "https://ci.example.org/p/perf/");

        // Blank values leave the current setting alone
        std::env::set_var(BUILDBOT_URL_ENV, "   ");
        config.apply_env_overrides();
        assert_eq!(config.buildbot_url, "https://ci.example.org/p/perf/");

        std::env::remove_var(BUILDBOT_URL_ENV);
        let mut untouched = Config::default();
        untouched.apply_env_overrides();
        assert_eq!(untouched.buildbot_url, DEFAULT_BUILDBOT_URL);
    }

    #[test]
    fn test_invalid_config_is_not_saved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.max_retry_attempts = 50;

        assert!(save_config_to(&path, &config).is_err());
        assert!(!path.exists());
    }
}
