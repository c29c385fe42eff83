//! Configuration for the SweetFlips core service.
//!
//! TOML file, `SWEETFLIPS_*` environment overrides, then validation. Every
//! field has a sensible default so the service runs without any config file.

use crate::errors::{ConfigurationError, SweetFlipsResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SweetFlipsConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_address: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub database_path: String,
    /// Converts above this many token cents get flagged by the anomaly
    /// heuristics.
    pub large_convert_cents: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: "./sweetflips.db".to_string(),
            large_convert_cents: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub session_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub min_stake_cents: u64,
    pub max_stake_cents: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 300,
            sweep_interval_secs: 300,
            min_stake_cents: 1,
            max_stake_cents: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 60,
            window_secs: 60,
        }
    }
}

/// Configuration loader with environment variable support.
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables.
    pub fn load(&self) -> SweetFlipsResult<SweetFlipsConfig> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            SweetFlipsConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> SweetFlipsResult<SweetFlipsConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e))
        })?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(&self, config: &mut SweetFlipsConfig) -> SweetFlipsResult<()> {
        if let Ok(addr) = env::var("SWEETFLIPS_LISTEN_ADDRESS") {
            config.server.listen_address = addr;
        }
        if let Ok(port) = env::var("SWEETFLIPS_PORT") {
            config.server.port = port.parse().map_err(|_| ConfigurationError::InvalidValue {
                field: "SWEETFLIPS_PORT".to_string(),
                value: port,
                reason: "Invalid port number".to_string(),
            })?;
        }
        if let Ok(path) = env::var("SWEETFLIPS_DATABASE_PATH") {
            config.ledger.database_path = path;
        }
        if let Ok(ttl) = env::var("SWEETFLIPS_SESSION_TTL_SECS") {
            config.game.session_ttl_secs =
                ttl.parse().map_err(|_| ConfigurationError::InvalidValue {
                    field: "SWEETFLIPS_SESSION_TTL_SECS".to_string(),
                    value: ttl,
                    reason: "Invalid duration in seconds".to_string(),
                })?;
        }
        if let Ok(enabled) = env::var("SWEETFLIPS_RATE_LIMIT_ENABLED") {
            config.rate_limit.enabled =
                enabled.parse().map_err(|_| ConfigurationError::InvalidValue {
                    field: "SWEETFLIPS_RATE_LIMIT_ENABLED".to_string(),
                    value: enabled,
                    reason: "Invalid boolean value".to_string(),
                })?;
        }
        Ok(())
    }

    fn validate(&self, config: &SweetFlipsConfig) -> SweetFlipsResult<()> {
        if config.server.port == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "server.port".to_string(),
                value: "0".to_string(),
                reason: "Port cannot be zero".to_string(),
            }
            .into());
        }

        if config.ledger.database_path.is_empty() {
            return Err(
                ConfigurationError::MissingRequired("ledger.database_path".to_string()).into(),
            );
        }

        if config.game.session_ttl_secs == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "game.session_ttl_secs".to_string(),
                value: "0".to_string(),
                reason: "Session TTL cannot be zero".to_string(),
            }
            .into());
        }

        if config.game.min_stake_cents > config.game.max_stake_cents {
            return Err(ConfigurationError::InvalidValue {
                field: "game.min_stake_cents".to_string(),
                value: config.game.min_stake_cents.to_string(),
                reason: "Minimum stake exceeds maximum stake".to_string(),
            }
            .into());
        }

        if config.rate_limit.enabled
            && (config.rate_limit.max_requests == 0 || config.rate_limit.window_secs == 0)
        {
            return Err(ConfigurationError::InvalidValue {
                field: "rate_limit.max_requests".to_string(),
                value: config.rate_limit.max_requests.to_string(),
                reason: "Rate limit window and request count must be non-zero when enabled"
                    .to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, config: &SweetFlipsConfig, path: &str) -> SweetFlipsResult<()> {
        let toml_string = toml::to_string_pretty(config).map_err(|e| {
            ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, toml_string).map_err(|e| {
            ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into()
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = SweetFlipsConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.game.session_ttl_secs, 300);
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn test_config_validation() {
        let loader = ConfigLoader::new();
        let mut config = SweetFlipsConfig::default();

        assert!(loader.validate(&config).is_ok());

        config.server.port = 0;
        assert!(loader.validate(&config).is_err());

        config = SweetFlipsConfig::default();
        config.game.min_stake_cents = 10;
        config.game.max_stake_cents = 5;
        assert!(loader.validate(&config).is_err());
    }

    #[test]
    fn test_save_and_load_config() -> SweetFlipsResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let original = SweetFlipsConfig::default();
        let loader = ConfigLoader::new();
        loader.save(&original, path)?;

        let loaded = ConfigLoader::new().with_path(path).load()?;
        assert_eq!(loaded.server.port, original.server.port);
        assert_eq!(loaded.game.max_stake_cents, original.game.max_stake_cents);

        Ok(())
    }

    #[test]
    fn test_missing_file_is_load_failure() {
        let err = ConfigLoader::new()
            .with_path("/nonexistent/sweetflips.toml")
            .load()
            .unwrap_err();
        assert_eq!(err.reason_code(), "CONFIGURATION_ERROR");
    }
}
