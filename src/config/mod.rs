//! Application configuration management

use std::env;

use anyhow::{Context, Result};

use docgraph::orm::{DEFAULT_LIMIT, MAX_LIMIT, PaginationOptions};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host to bind
    pub host: String,

    /// Server port
    pub port: u16,

    /// SQLite database URL (`sqlite://path` or `sqlite::memory:`)
    pub database_url: String,

    /// Maximum pooled connections
    pub database_max_connections: u32,

    /// Limit applied when a paginate call omits one
    pub paginate_default_limit: i64,

    /// Upper bound for any requested limit
    pub paginate_max_limit: i64,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Prefer DATABASE_PATH (a file path), fall back to DATABASE_URL
        let database_url = match env::var("DATABASE_PATH") {
            Ok(path) => format!("sqlite://{}", path),
            Err(_) => env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./data/docgraph.db".to_string()),
        };

        let log_format = match env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "json".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => anyhow::bail!("Invalid LOG_FORMAT `{}` (expected json or pretty)", other),
        };

        let config = Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .context("Invalid PORT")?,

            database_url,

            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,

            paginate_default_limit: env::var("PAGINATE_DEFAULT_LIMIT")
                .unwrap_or_else(|_| DEFAULT_LIMIT.to_string())
                .parse()
                .context("Invalid PAGINATE_DEFAULT_LIMIT")?,

            paginate_max_limit: env::var("PAGINATE_MAX_LIMIT")
                .unwrap_or_else(|_| MAX_LIMIT.to_string())
                .parse()
                .context("Invalid PAGINATE_MAX_LIMIT")?,

            log_format,
        };

        if config.paginate_max_limit < 1 || config.paginate_default_limit < 1 {
            anyhow::bail!("PAGINATE_DEFAULT_LIMIT and PAGINATE_MAX_LIMIT must be at least 1");
        }
        Ok(config)
    }

    pub fn pagination(&self) -> PaginationOptions {
        PaginationOptions {
            default_limit: self.paginate_default_limit,
            max_limit: self.paginate_max_limit,
        }
    }

    /// Socket address string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
