use crate::error::ConfigError;
use crate::notice::NotifierInfo;
use log::{error, info, warn};
use serde::Deserialize;
use std::path::Path;

/// Default endpoint of the hosted notice API
pub const DEFAULT_SERVER_URI: &str = "https://api.airbrake.io/notifier_api/v2/notices";

/// Notifier configuration
///
/// Read-only to the rest of the crate: the builder and the client each hold
/// it behind an `Arc` and never mutate it after construction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Project API key, used when a notice does not carry its own
    pub api_key: String,
    /// Absolute URL notices are POSTed to
    pub server_uri: String,
    /// Name of the environment this process runs in
    pub environment_name: String,
    /// Version of the reporting application
    pub app_version: String,
    /// Root directory of the reporting application
    pub project_root: String,
    /// Environments for which notices are never sent (case-insensitive)
    pub development_environments: Vec<String>,
    /// Identity of this library in the notice document
    pub notifier: NotifierInfo,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            server_uri: DEFAULT_SERVER_URI.to_string(),
            environment_name: "production".to_string(),
            app_version: String::new(),
            project_root: String::new(),
            development_environments: vec!["development".to_string(), "test".to_string()],
            notifier: NotifierInfo::current(),
        }
    }
}

impl NotifierConfig {
    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: NotifierConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML configuration file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read, and a
    /// parse or validation error if its content is unusable.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Load configuration from an optional file, then apply `FAULTPOST_*`
    /// environment overrides
    ///
    /// A missing or invalid file falls back to the defaults; the reason is
    /// logged. Overrides that make the configuration invalid are rejected.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                match Self::from_file(path) {
                    Ok(config) => config,
                    Err(ConfigError::ReadError(e)) => {
                        warn!("Configuration file unreadable ({}), using defaults", e);
                        Self::default()
                    }
                    Err(e) => {
                        error!("Configuration error in '{}': {}", path.display(), e);
                        warn!("Using default configuration due to invalid config file");
                        Self::default()
                    }
                }
            }
            None => {
                info!("Using default configuration");
                Self::default()
            }
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup such as the process environment
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("FAULTPOST_API_KEY") {
            self.api_key = value;
        }
        if let Some(value) = lookup("FAULTPOST_SERVER_URI") {
            self.server_uri = value;
        }
        if let Some(value) = lookup("FAULTPOST_ENVIRONMENT") {
            self.environment_name = value;
        }
        if let Some(value) = lookup("FAULTPOST_APP_VERSION") {
            self.app_version = value;
        }
        if let Some(value) = lookup("FAULTPOST_PROJECT_ROOT") {
            self.project_root = value;
        }
        if let Some(value) = lookup("FAULTPOST_DEVELOPMENT_ENVIRONMENTS") {
            self.development_environments = value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    /// Check that the server URI is an absolute http(s) URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.server_uri).map_err(|e| {
            ConfigError::ValidationError(format!("server_uri '{}': {}", self.server_uri, e))
        })?;

        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ConfigError::ValidationError(format!(
                "server_uri must use http or https, got '{}'",
                other
            ))),
        }
    }

    /// Whether notices from `environment_name` are suppressed
    pub fn is_development_environment(&self, environment_name: &str) -> bool {
        let name = environment_name.to_lowercase();
        self.development_environments
            .iter()
            .any(|candidate| candidate.to_lowercase() == name)
    }
}
