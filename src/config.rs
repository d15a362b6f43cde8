//! Runtime configuration
//!
//! The environment is read exactly once at startup into a typed `Config`
//! which is then passed by reference; nothing else in the crate touches
//! `std::env` for behavior.

use std::path::PathBuf;
use std::time::Duration;

/// Default on-disk database location (relative to the working directory)
pub const DEFAULT_DATABASE_PATH: &str = "./durandal-mcp-memory.db";

/// Full runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_path: String,
    /// Log level from LOG_LEVEL (CLI flags may override)
    pub log_level: Option<String>,
    /// Verbose console output
    pub verbose: bool,
    /// Debug-level logging
    pub debug: bool,
    /// Log every tool call payload at debug level
    pub log_mcp_tools: bool,
    /// Optional JSON-lines log file
    pub log_file: Option<PathBuf>,
    /// Optional dedicated error log file
    pub error_log_file: Option<PathBuf>,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    pub update: UpdateConfig,
}

/// Cache tuning knobs
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum entries per tier
    pub capacity: usize,
    /// Time-to-live for cached search results
    pub search_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            search_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Protocol server tuning knobs
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum concurrently processed requests
    pub max_in_flight: usize,
    /// How long in-flight requests may run after shutdown is requested
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 64,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Update-check configuration
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub enabled: bool,
    /// Minimum time between registry checks
    pub interval: Duration,
    /// Render a notification on stderr when a newer version exists
    pub notify: bool,
    /// Install the newer version automatically
    pub auto_update: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_millis(86_400_000),
            notify: true,
            auto_update: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            log_level: None,
            verbose: false,
            debug: false,
            log_mcp_tools: false,
            log_file: None,
            error_log_file: None,
            cache: CacheConfig::default(),
            server: ServerConfig::default(),
            update: UpdateConfig::default(),
        }
    }
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            if !path.trim().is_empty() {
                config.database_path = shellexpand::tilde(&path).to_string();
            }
        }
        config.log_level = std::env::var("LOG_LEVEL").ok().filter(|s| !s.is_empty());
        config.verbose = env_bool("VERBOSE", false);
        config.debug = env_bool("DEBUG", false);
        config.log_mcp_tools = env_bool("LOG_MCP_TOOLS", false);
        config.log_file = env_path("LOG_FILE");
        config.error_log_file = env_path("ERROR_LOG_FILE");

        config.update.enabled = env_bool("UPDATE_CHECK_ENABLED", true);
        if env_bool("NO_UPDATE_CHECK", false) {
            config.update.enabled = false;
        }
        config.update.notify = env_bool("UPDATE_NOTIFICATION", true);
        if env_bool("NO_UPDATE_NOTIFIER", false) {
            config.update.notify = false;
        }
        config.update.auto_update = env_bool("AUTO_UPDATE", false);
        if let Ok(ms) = std::env::var("UPDATE_CHECK_INTERVAL") {
            if let Ok(ms) = ms.trim().parse::<u64>() {
                config.update.interval = Duration::from_millis(ms);
            }
        }

        config
    }

    /// Effective log level after combining LOG_LEVEL and DEBUG
    pub fn effective_log_level(&self) -> &str {
        if let Some(level) = &self.log_level {
            return level.as_str();
        }
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.trim().to_lowercase();
            !(v.is_empty() || v == "0" || v == "false" || v == "no" || v == "off")
        }
        Err(_) => default,
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(|s| PathBuf::from(shellexpand::tilde(&s).to_string()))
}
