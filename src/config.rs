//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)
//!
//! The loaded value is immutable and passed explicitly to every component
//! that needs it; no component reads ambient global state.

use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub federation: FederationConfig,
    pub instance: InstanceConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "links.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
    /// Deployment environment
    #[serde(default)]
    pub environment: Environment,
}

/// Deployment environment selector
///
/// Error responses include stack context only outside production.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://links.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }

    /// Base URL of the federation API surface
    pub fn api_url(&self) -> String {
        format!("{}/api", self.base_url())
    }
}

/// Federation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Maximum items per collection page
    pub page_size: u32,
    /// Exact (path-normalized) IRIs that are rejected outright
    #[serde(default)]
    pub blocked_iris: Vec<String>,
    /// Host substrings of blocked instances
    #[serde(default)]
    pub blocked_instances: Vec<String>,
}

/// Instance metadata, served through the service actor and nodeinfo
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceConfig {
    pub title: String,
    pub summary: String,
    /// Long-form description, markdown source
    pub description: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (KINDLING_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment as EnvSource, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.domain", "localhost")?
            .set_default("server.protocol", "http")?
            .set_default("server.environment", "dev")?
            .set_default("federation.page_size", 50)?
            .set_default("instance.title", "kindling")?
            .set_default("instance.summary", "a federated link aggregator")?
            .set_default("instance.description", "")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (KINDLING_*)
            .add_source(
                EnvSource::with_prefix("KINDLING")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        if !matches!(self.server.protocol.as_str(), "http" | "https") {
            return Err(crate::error::AppError::Config(format!(
                "server.protocol must be http or https, got {}",
                self.server.protocol
            )));
        }

        if self.federation.page_size == 0 {
            return Err(crate::error::AppError::Config(
                "federation.page_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
                environment: Environment::Dev,
            },
            federation: FederationConfig {
                page_size: 50,
                blocked_iris: vec![],
                blocked_instances: vec![],
            },
            instance: InstanceConfig {
                title: "kindling".to_string(),
                summary: "test".to_string(),
                description: String::new(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_page_size() {
        let mut config = valid_config();
        config.federation.page_size = 0;

        let error = config.validate().expect_err("page_size 0 must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("federation.page_size")
        ));
    }

    #[test]
    fn validate_rejects_unknown_protocol() {
        let mut config = valid_config();
        config.server.protocol = "gopher".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn api_url_is_rooted_under_base_url() {
        let config = valid_config();
        assert_eq!(config.server.base_url(), "http://localhost");
        assert_eq!(config.server.api_url(), "http://localhost/api");
    }
}
