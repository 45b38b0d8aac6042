//! Configuration management for the blueprint optimizer
//!
//! Supports configuration via:
//! 1. Config file (~/.config/blueprint-optimizer/config.toml)
//! 2. Environment variables (SUPABASE_URL, SUPABASE_SERVICE_ROLE_KEY, etc.)
//! 3. CLI arguments (override file/env settings)

use crate::optimization::{CompressionSettings, EdgePolicy, OptimizationConfig, ParameterLimits};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerSettings,

    /// Supabase auth and storage
    pub supabase: SupabaseSettings,

    /// Optimizer tuning
    pub optimization: OptimizationConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to listen on
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Supabase settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupabaseSettings {
    /// Project URL (can also use SUPABASE_URL env var)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Public key used for token verification (SUPABASE_ANON_KEY)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anon_key: Option<String>,

    /// Service key used for table access (SUPABASE_SERVICE_ROLE_KEY)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_role_key: Option<String>,
}

impl Config {
    /// Get default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("blueprint-optimizer")
            .join("config.toml")
    }

    /// Load config from default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from specific path
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default().with_env_overrides());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;

        Ok(config.with_env_overrides())
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("SUPABASE_URL") {
            self.supabase.url = Some(url);
        }
        if let Ok(key) = std::env::var("SUPABASE_ANON_KEY") {
            self.supabase.anon_key = Some(key);
        }
        if let Ok(key) = std::env::var("SUPABASE_SERVICE_ROLE_KEY") {
            self.supabase.service_role_key = Some(key);
        }
        if let Ok(addr) = std::env::var("BLUEPRINT_OPTIMIZER_BIND") {
            self.server.bind_addr = addr;
        }

        self
    }

    /// Save config to default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::default_path())
    }

    /// Save config to specific path
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Validate optimizer settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        let opt = &self.optimization;

        if !(0.0..=1.0).contains(&opt.similarity_threshold) {
            return Err(ConfigError::Invalid(format!(
                "optimization.similarity_threshold must be within 0..=1, got {}",
                opt.similarity_threshold
            )));
        }
        if opt.compression.chunk_overlap >= opt.compression.chunk_size {
            return Err(ConfigError::Invalid(
                "optimization.compression.chunk_overlap must be smaller than chunk_size"
                    .to_string(),
            ));
        }
        if opt.token_weight < 0.0 || opt.node_weight < 0.0 {
            return Err(ConfigError::Invalid(
                "improvement weights must not be negative".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate that the Supabase backend can be reached with these settings
    pub fn validate_supabase(&self) -> Result<(), ConfigError> {
        if self.supabase.url.is_none() {
            return Err(ConfigError::MissingRequired("SUPABASE_URL".to_string()));
        }
        if self.supabase.anon_key.is_none() {
            return Err(ConfigError::MissingRequired("SUPABASE_ANON_KEY".to_string()));
        }
        if self.supabase.service_role_key.is_none() {
            return Err(ConfigError::MissingRequired(
                "SUPABASE_SERVICE_ROLE_KEY".to_string(),
            ));
        }
        Ok(())
    }

    /// Generate example config content
    pub fn example() -> String {
        let example = Config::default();
        toml::to_string_pretty(&example).unwrap_or_default()
    }
}

/// Builder for creating Config programmatically
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server.bind_addr = addr.into();
        self
    }

    pub fn supabase_url(mut self, url: impl Into<String>) -> Self {
        self.config.supabase.url = Some(url.into());
        self
    }

    pub fn anon_key(mut self, key: impl Into<String>) -> Self {
        self.config.supabase.anon_key = Some(key.into());
        self
    }

    pub fn service_role_key(mut self, key: impl Into<String>) -> Self {
        self.config.supabase.service_role_key = Some(key.into());
        self
    }

    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.config.optimization.similarity_threshold = threshold;
        self
    }

    pub fn edge_policy(mut self, policy: EdgePolicy) -> Self {
        self.config.optimization.edge_policy = policy;
        self
    }

    pub fn compression(mut self, settings: CompressionSettings) -> Self {
        self.config.optimization.compression = settings;
        self
    }

    pub fn parameter_limits(mut self, limits: ParameterLimits) -> Self {
        self.config.optimization.parameter_limits = limits;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8000");
        assert_eq!(config.optimization.similarity_threshold, 0.7);
        assert_eq!(config.optimization.edge_policy, EdgePolicy::Preserve);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .supabase_url("https://project.supabase.co")
            .anon_key("anon")
            .service_role_key("service")
            .edge_policy(EdgePolicy::Rewire)
            .similarity_threshold(0.8)
            .build();

        assert!(config.validate_supabase().is_ok());
        assert_eq!(config.optimization.edge_policy, EdgePolicy::Rewire);
        assert_eq!(config.optimization.similarity_threshold, 0.8);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [optimization]
            similarity_threshold = 0.9
            edge_policy = "rewire"

            [optimization.compression]
            chunk_size = 800
            "#,
        )
        .unwrap();

        assert_eq!(config.optimization.similarity_threshold, 0.9);
        assert_eq!(config.optimization.edge_policy, EdgePolicy::Rewire);
        assert_eq!(config.optimization.compression.chunk_size, 800);
        assert_eq!(config.optimization.compression.chunk_overlap, 50);
        assert_eq!(config.optimization.parameter_limits.rules.len(), 4);
        assert_eq!(config.server.bind_addr, "0.0.0.0:8000");
    }

    #[test]
    fn test_rejects_bad_overlap() {
        let config = ConfigBuilder::new()
            .compression(CompressionSettings {
                chunk_size: 100,
                chunk_overlap: 100,
                ..Default::default()
            })
            .build();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_example_config() {
        let example = Config::example();
        assert!(example.contains("[server]"));
        assert!(example.contains("[optimization]"));
        assert!(example.contains("maxTokens"));

        let parsed: Config = toml::from_str(&example).unwrap();
        assert_eq!(parsed.optimization.parameter_limits, ParameterLimits::default());
    }
}
