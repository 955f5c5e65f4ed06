use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub uploads: UploadConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Include store error text in 5xx bodies (development only)
    pub expose_error_details: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub directory: String,
    pub max_file_size_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub monthly_rollup_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/issues.db".to_string(),
                max_connections: 10,
                connection_timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0:5000".to_string(),
                default_page_size: 10,
                max_page_size: 100,
                expose_error_details: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            uploads: UploadConfig {
                directory: "./uploads".to_string(),
                max_file_size_mb: 20,
            },
            scheduler: SchedulerConfig {
                monthly_rollup_enabled: true,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let defaults = Self::default();

        let config = Config::builder()
            // Start with default values
            .set_default("database.url", defaults.database.url)?
            .set_default("database.max_connections", defaults.database.max_connections)?
            .set_default(
                "database.connection_timeout_secs",
                defaults.database.connection_timeout_secs,
            )?
            .set_default("server.bind_address", defaults.server.bind_address)?
            .set_default("server.default_page_size", defaults.server.default_page_size)?
            .set_default("server.max_page_size", defaults.server.max_page_size)?
            .set_default(
                "server.expose_error_details",
                defaults.server.expose_error_details,
            )?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.format", defaults.logging.format)?
            .set_default("uploads.directory", defaults.uploads.directory)?
            .set_default("uploads.max_file_size_mb", defaults.uploads.max_file_size_mb)?
            .set_default(
                "scheduler.monthly_rollup_enabled",
                defaults.scheduler.monthly_rollup_enabled,
            )?
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix
            .add_source(
                Environment::with_prefix("ISSUE_TRACKER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let mut app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        app_config.database.url = app_config.get_database_url();
        app_config.logging.level = app_config.get_log_level();

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate database config
        if !self.database.url.starts_with("sqlite:") {
            return Err(anyhow::anyhow!(
                "Only sqlite: database URLs are supported, got {}",
                self.database.url
            ));
        }
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than 0"));
        }
        if self.database.connection_timeout_secs == 0 {
            return Err(anyhow::anyhow!("connection_timeout_secs must be greater than 0"));
        }

        // Validate server config
        if self.server.bind_address.trim().is_empty() {
            return Err(anyhow::anyhow!("bind_address cannot be empty"));
        }
        if self.server.default_page_size == 0 || self.server.max_page_size == 0 {
            return Err(anyhow::anyhow!("page sizes must be greater than 0"));
        }
        if self.server.default_page_size > self.server.max_page_size {
            return Err(anyhow::anyhow!(
                "default_page_size ({}) cannot exceed max_page_size ({})",
                self.server.default_page_size,
                self.server.max_page_size
            ));
        }
        if self.server.max_page_size > 1000 {
            return Err(anyhow::anyhow!("max_page_size too large (max 1000)"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        // Validate upload config
        if self.uploads.directory.trim().is_empty() {
            return Err(anyhow::anyhow!("uploads.directory cannot be empty"));
        }
        if self.uploads.max_file_size_mb == 0 {
            return Err(anyhow::anyhow!("max_file_size_mb must be greater than 0"));
        }

        Ok(())
    }

    /// Get database URL from environment or config
    pub fn get_database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.database.url.clone())
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG")
            .ok()
            .filter(|level| ["trace", "debug", "info", "warn", "error"].contains(&level.as_str()))
            .unwrap_or_else(|| self.logging.level.clone())
    }

    /// Upload size cap in bytes
    #[must_use]
    pub const fn max_upload_bytes(&self) -> u64 {
        self.uploads.max_file_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.database.url, "sqlite:data/issues.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.server.max_page_size, 100);
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_upload_bytes() {
        let config = AppConfig::default();
        assert_eq!(config.max_upload_bytes(), 20 * 1024 * 1024);
    }
}
