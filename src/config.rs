use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// SQLite path backing the statistics store and the reference executor
    pub url: String,
    /// Optional JSON file seeding the schema registry; empty means none
    pub models_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Global result-cache switch; off overrides any per-request directive
    pub enable: bool,
    pub max_size: usize,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("storage.url", "./semantic.db")?
            .set_default("storage.models_file", "")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("cache.enable", true)?
            .set_default("cache.max_size", 1000)?
            .set_default("cache.ttl_secs", 300)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?;

        // Load from environment variables
        if let Ok(database_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("storage.url", database_url)?;
        }

        if let Ok(models_file) = env::var("MODELS_FILE") {
            builder = builder.set_override("storage.models_file", models_file)?;
        }

        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(3000))?;
        }

        if let Ok(cache_enable) = env::var("QUERY_CACHE_ENABLE") {
            builder = builder
                .set_override("cache.enable", cache_enable.parse::<bool>().unwrap_or(true))?;
        }

        if let Ok(max_size) = env::var("QUERY_CACHE_MAX_SIZE") {
            builder = builder
                .set_override("cache.max_size", max_size.parse::<usize>().unwrap_or(1000) as u64)?;
        }

        if let Ok(ttl_secs) = env::var("QUERY_CACHE_TTL_SECS") {
            builder = builder
                .set_override("cache.ttl_secs", ttl_secs.parse::<u64>().unwrap_or(300))?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Ok(log_style) = env::var("RUST_LOG_STYLE") {
            builder = builder.set_override("logging.style", log_style)?;
        }

        // Try to load from .env file
        let _ = dotenv::dotenv();

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        // Clear environment variables for this test
        env::remove_var("DATABASE_URL");
        env::remove_var("HOST");
        env::remove_var("PORT");
        env::remove_var("QUERY_CACHE_ENABLE");

        let config = Config::from_env();
        assert!(config.is_ok());

        let config = config.unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.cache.enable);
        assert_eq!(config.cache.max_size, 1000);
    }
}
