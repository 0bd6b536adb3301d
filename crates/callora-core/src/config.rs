//! Application configuration
//!
//! Centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub rtc: RtcConfig,
    pub call: CallConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Comma-separated allowed CORS origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_cors_origins() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

/// Redis configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
}

/// Real-time media provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RtcConfig {
    /// Base URL of the credential issuer
    pub issuer_url: String,

    /// API key sent to the issuer, if required
    #[serde(default)]
    pub api_key: Option<String>,

    /// Timeout for a single issue request in milliseconds
    #[serde(default = "default_issue_timeout_ms")]
    pub issue_timeout_ms: u64,
}

fn default_issue_timeout_ms() -> u64 {
    2000
}

/// Call lifecycle configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CallConfig {
    /// Seconds a session may stay RINGING before the reaper cancels it
    #[serde(default = "default_ring_timeout")]
    pub ring_timeout_secs: i64,

    /// Hard ceiling on conversation length before the reaper force-ends it
    #[serde(default = "default_max_ongoing")]
    pub max_ongoing_secs: i64,

    /// Reaper sweep interval in seconds
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,

    /// TTL of a presence heartbeat before an account is considered offline
    #[serde(default = "default_presence_ttl")]
    pub presence_ttl_secs: u64,
}

fn default_ring_timeout() -> i64 {
    60
}

fn default_max_ongoing() -> i64 {
    14400 // 4 hours
}

fn default_reaper_interval() -> u64 {
    30
}

fn default_presence_ttl() -> u64 {
    90
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("server.cors_origins", "http://localhost:3000")?
            .set_default("database.max_connections", 20)?
            .set_default("rtc.issue_timeout_ms", 2000)?
            .set_default("call.ring_timeout_secs", 60)?
            .set_default("call.max_ongoing_secs", 14400)?
            .set_default("call.reaper_interval_secs", 30)?
            .set_default("call.presence_ttl_secs", 90)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with CALLORA_ prefix
            .add_source(
                Environment::with_prefix("CALLORA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ring_timeout_secs: 60,
            max_ongoing_secs: 14400,
            reaper_interval_secs: 30,
            presence_ttl_secs: 90,
        }
    }
}
