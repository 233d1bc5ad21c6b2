use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub engine: ledger_core::Config,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            // Start with default configuration
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", 4)?
            .set_default("server.request_timeout_secs", 5)?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.run_migrations", true)?
            .set_default("redis.url", "")?
            .set_default("engine.cache_update_timeout_ms", 500)?
            .set_default("engine.populate_timeout_ms", 500)?
            .set_default(
                "engine.balance_ttl_secs",
                ledger_core::config::DEFAULT_BALANCE_TTL_SECS as i64,
            )?;

        // Add environment-specific config file if it exists
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        // Override with environment variables
        builder = builder.add_source(Environment::with_prefix("BALANCE_ENGINE").separator("__"));

        // Special handling for common env vars
        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }

        if let Ok(redis_url) = env::var("REDIS_URL") {
            builder = builder.set_override("redis.url", redis_url)?;
        }

        if let Ok(port) = env::var("BALANCE_ENGINE_PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.server.workers == 0 {
            return Err("At least one server worker is required".to_string());
        }

        if self.server.request_timeout_secs == 0 {
            return Err("Request timeout must be greater than 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL is required".to_string());
        }

        if self.database.min_connections > self.database.max_connections {
            return Err("Database min_connections cannot exceed max_connections".to_string());
        }

        if self.redis.url.is_empty() {
            return Err("Redis URL is required".to_string());
        }

        self.engine.validate().map_err(|e| e.to_string())
    }
}
