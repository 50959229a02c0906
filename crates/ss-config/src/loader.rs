//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "sessionsync.toml",
    "./config/config.toml",
    "./config/sessionsync.toml",
    "/etc/sessionsync/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        self.load_with(|key| env::var(key).ok())
    }

    /// Load configuration using `lookup` in place of the process environment
    pub fn load_with<F>(&self, lookup: F) -> Result<AppConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file(&lookup) {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, &lookup)?;
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file<F>(&self, lookup: &F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Some(path) = lookup("SESSIONSYNC_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::EnvError(format!("{} has invalid value {:?}", key, value)))
}

/// Apply environment variable overrides
fn apply_overrides<F>(config: &mut AppConfig, lookup: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // API
    if let Some(val) = lookup("SESSIONSYNC_API_URL") {
        config.api.base_url = val.trim_end_matches('/').to_string();
    }
    if let Some(val) = lookup("SESSIONSYNC_API_TIMEOUT_MS") {
        config.api.timeout_ms = parse_var("SESSIONSYNC_API_TIMEOUT_MS", &val)?;
    }
    if let Some(val) = lookup("SESSIONSYNC_API_RETRY_ATTEMPTS") {
        config.api.retry_attempts = parse_var("SESSIONSYNC_API_RETRY_ATTEMPTS", &val)?;
    }

    // Storage
    if let Some(val) = lookup("SESSIONSYNC_STORAGE_BACKEND") {
        config.storage.backend = val.to_ascii_lowercase();
    }
    if let Some(val) = lookup("SESSIONSYNC_TOKEN_PATH") {
        config.storage.token_path = val;
    }

    // Routes
    if let Some(val) = lookup("SESSIONSYNC_SIGN_IN_PATH") {
        config.routes.sign_in = val;
    }
    if let Some(val) = lookup("SESSIONSYNC_NOT_FOUND_PATH") {
        config.routes.not_found = val;
    }
    if let Some(val) = lookup("SESSIONSYNC_DASHBOARD_ROOT") {
        config.routes.dashboard_root = val;
    }

    // Integrations
    if let Some(val) = lookup("SESSIONSYNC_IMAGE_API_KEY") {
        config.integrations.image_api_key = val;
    }
    if let Some(val) = lookup("SESSIONSYNC_PAYMENT_PUBLIC_KEY") {
        config.integrations.payment_public_key = val;
    }

    // HTTP
    if let Some(val) = lookup("SESSIONSYNC_HTTP_HOST") {
        config.http.host = val;
    }
    if let Some(val) = lookup("SESSIONSYNC_HTTP_PORT") {
        config.http.port = parse_var("SESSIONSYNC_HTTP_PORT", &val)?;
    }

    // General
    if let Some(val) = lookup("SESSIONSYNC_DEV_MODE") {
        config.dev_mode = val.parse().unwrap_or(false);
    }

    Ok(())
}
