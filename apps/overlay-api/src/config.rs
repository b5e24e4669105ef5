//! Service configuration
//!
//! Values come from an optional TOML file, then the `PORT` and
//! `DATABASE_URL` environment variables, then command-line flags.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:overlay-api.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted source PDF, in decoded bytes
    pub max_pdf_bytes: usize,
    /// Lifetime of a signing session when the request does not set one
    pub session_ttl_hours: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_pdf_bytes: 25 * 1024 * 1024,
            session_ttl_hours: 72,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string; missing sections take defaults
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML configuration")
    }

    /// Apply `PORT` and `DATABASE_URL` from the environment
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT: {}", port))?;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_config_uses_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [server]
            port = 8080

            [limits]
            session_ttl_hours = 24
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.limits.session_ttl_hours, 24);
        assert_eq!(config.limits.max_pdf_bytes, 25 * 1024 * 1024);
        assert_eq!(config.database, DatabaseConfig::default());
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(Config::parse("[server\nport = ").is_err());
        assert!(Config::parse("[server]\nport = \"high\"").is_err());
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = Config::from_file("/nonexistent/overlay.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/overlay.toml"));
    }
}
