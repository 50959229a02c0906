//! SessionSync Configuration System
//!
//! TOML-based configuration with environment variable override support.

use serde::{Deserialize, Serialize};
use ss_common::Role;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Environment variable error: {0}")]
    EnvError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub routes: RoutesConfig,
    pub integrations: IntegrationsConfig,
    pub http: HttpConfig,

    /// Enable development mode
    pub dev_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            routes: RoutesConfig::default(),
            integrations: IntegrationsConfig::default(),
            http: HttpConfig::default(),
            dev_mode: false,
        }
    }
}

/// Upper bound on `api.retry_attempts`
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

/// Application backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout_ms: 10_000,
            retry_attempts: 2,
            retry_delay_ms: 100,
            user_agent: format!("SessionSync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Durable token storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend: file, memory
    pub backend: String,
    pub token_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "file".to_string(),
            token_path: "./data/session/token.json".to_string(),
        }
    }
}

/// Redirect targets and the path → role access policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    pub sign_in: String,
    pub not_found: String,
    pub dashboard_root: String,
    pub after_sign_in: String,
    /// Paths that require one specific role; absent paths accept any signed-in user
    pub policy: BTreeMap<String, String>,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        let mut policy = BTreeMap::new();
        policy.insert("/dashboard/booked_session".to_string(), "Student".to_string());

        Self {
            sign_in: "/sign_in".to_string(),
            not_found: "/not_found".to_string(),
            dashboard_root: "/dashboard".to_string(),
            after_sign_in: "/".to_string(),
            policy,
        }
    }
}

/// Keys handed through to external integrations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    pub image_api_key: String,
    pub payment_public_key: String,
}

/// HTTP configuration for the development harness
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        let loader = ConfigLoader::new();
        loader.load()
    }

    /// Check invariants the rest of the workspace relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.api.base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::ValidationError("api.base_url is empty".to_string()));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "api.base_url must be an http(s) URL, got {}",
                base_url
            )));
        }

        if !(1..=MAX_RETRY_ATTEMPTS).contains(&self.api.retry_attempts) {
            return Err(ConfigError::ValidationError(format!(
                "api.retry_attempts must be between 1 and {}, got {}",
                MAX_RETRY_ATTEMPTS, self.api.retry_attempts
            )));
        }

        if !matches!(self.storage.backend.as_str(), "file" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "storage.backend must be file or memory, got {}",
                self.storage.backend
            )));
        }

        let targets = [
            ("routes.sign_in", &self.routes.sign_in),
            ("routes.not_found", &self.routes.not_found),
            ("routes.dashboard_root", &self.routes.dashboard_root),
            ("routes.after_sign_in", &self.routes.after_sign_in),
        ];
        for (name, target) in targets {
            if !target.starts_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be an absolute path, got {}",
                    name, target
                )));
            }
        }

        for (path, role) in &self.routes.policy {
            role.parse::<Role>().map_err(|e| {
                ConfigError::ValidationError(format!("routes.policy[{}]: {}", path, e))
            })?;
        }

        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# SessionSync Configuration
# Environment variables override these settings

dev_mode = false

[api]
base_url = "http://localhost:5000"
timeout_ms = 10000
retry_attempts = 2
retry_delay_ms = 100

[storage]
backend = "file"  # file or memory
token_path = "./data/session/token.json"

[routes]
sign_in = "/sign_in"
not_found = "/not_found"
dashboard_root = "/dashboard"
after_sign_in = "/"

[routes.policy]
"/dashboard/booked_session" = "Student"

[integrations]
image_api_key = ""
payment_public_key = ""

[http]
port = 8080
host = "127.0.0.1"
"#
        .to_string()
    }
}
