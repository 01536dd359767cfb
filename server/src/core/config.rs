use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use super::cli::CliConfig;
use super::constants::{
    DEFAULT_DIRECTORY_TIMEOUT_SECS, DEFAULT_FETCH_MAX_COUNT, DEFAULT_FETCH_TIMEOUT_MS,
    DEFAULT_HOST, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_PORT,
    DEFAULT_RATE_LIMIT_EVENTS_RPM, DEFAULT_RATE_LIMIT_MESSAGES_RPM, DEFAULT_RECLAIM_IDLE_MS,
    DEFAULT_REDIS_URL, REGISTRY_RESCAN_INTERVAL_SECS,
};
use crate::utils::crypto::generate_token;

// =============================================================================
// Queue Backend Enum
// =============================================================================

/// Message queue backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackendType {
    #[default]
    Memory,
    Redis,
}

impl fmt::Display for QueueBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueBackendType::Memory => write!(f, "memory"),
            QueueBackendType::Redis => write!(f, "redis"),
        }
    }
}

// =============================================================================
// KV Backend Enum
// =============================================================================

/// KV store backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KvBackendType {
    #[default]
    Memory,
    Redis,
}

impl fmt::Display for KvBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvBackendType::Memory => write!(f, "memory"),
            KvBackendType::Redis => write!(f, "redis"),
        }
    }
}

// =============================================================================
// File-based configuration (JSON)
// =============================================================================

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct AuthFileConfig {
    pub admin_token: Option<String>,
    pub publisher_name: Option<String>,
    pub publisher_password: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct QueueFileConfig {
    pub backend: Option<QueueBackendType>,
    pub redis_url: Option<String>,
    pub fetch_max_count: Option<usize>,
    pub fetch_timeout_ms: Option<u64>,
    pub reclaim_idle_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct KvFileConfig {
    pub backend: Option<KvBackendType>,
    pub redis_url: Option<String>,
    pub registry_rescan_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DirectoryFileConfig {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct RateLimitFileConfig {
    pub enabled: Option<bool>,
    pub events_rpm: Option<u32>,
    pub messages_rpm: Option<u32>,
}

/// File-based configuration, layered under CLI/env values.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub auth: Option<AuthFileConfig>,
    pub queue: Option<QueueFileConfig>,
    pub kv: Option<KvFileConfig>,
    pub directory: Option<DirectoryFileConfig>,
    pub rate_limit: Option<RateLimitFileConfig>,
    pub debug: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.warn_unknown_fields();
        Ok(config)
    }

    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(fields = %keys_str, "Unknown fields in config file (possible typos)");
        }
    }
}

// =============================================================================
// Resolved application configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Bearer token for admin routes. Generated once on first run if not
    /// supplied, then held only in memory for the lifetime of the process.
    pub admin_token: String,
    pub publisher_name: Option<String>,
    pub publisher_password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackendType,
    pub redis_url: String,
    pub fetch_max_count: usize,
    pub fetch_timeout_ms: u64,
    pub reclaim_idle_ms: u64,
}

#[derive(Debug, Clone)]
pub struct KvConfig {
    pub backend: KvBackendType,
    pub redis_url: String,
    pub registry_rescan_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub url: Option<String>,
    pub timeout_secs: u64,
    pub max_reconnect_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub events_rpm: u32,
    pub messages_rpm: u32,
}

/// Fully resolved, validated application configuration.
///
/// Layering order (lowest to highest precedence): built-in defaults, the
/// JSON config file (if `--config`/`RELAYBUS_CONFIG` points at one), then
/// CLI flags/environment variables (clap resolves CLI-over-env itself).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub debug: bool,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub queue: QueueConfig,
    pub kv: KvConfig,
    pub directory: DirectoryConfig,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    pub fn load(cli: &CliConfig) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => Some(FileConfig::load_from_file(path)?),
            None => None,
        };
        let file = file.unwrap_or_default();

        let server = ServerConfig {
            host: cli
                .host
                .clone()
                .or_else(|| file.server.as_ref().and_then(|s| s.host.clone()))
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli
                .port
                .or_else(|| file.server.as_ref().and_then(|s| s.port))
                .unwrap_or(DEFAULT_PORT),
        };

        let admin_token = cli
            .admin_token
            .clone()
            .or_else(|| file.auth.as_ref().and_then(|a| a.admin_token.clone()))
            .unwrap_or_else(|| {
                let token = generate_token(32);
                tracing::info!("No admin token configured, generated one for this run");
                token
            });

        let auth = AuthConfig {
            admin_token,
            publisher_name: cli
                .publisher_name
                .clone()
                .or_else(|| file.auth.as_ref().and_then(|a| a.publisher_name.clone())),
            publisher_password: cli
                .publisher_password
                .clone()
                .or_else(|| {
                    file.auth
                        .as_ref()
                        .and_then(|a| a.publisher_password.clone())
                }),
        };

        let queue = QueueConfig {
            backend: cli
                .queue_backend
                .or_else(|| file.queue.as_ref().and_then(|q| q.backend))
                .unwrap_or_default(),
            redis_url: cli
                .queue_redis_url
                .clone()
                .or_else(|| file.queue.as_ref().and_then(|q| q.redis_url.clone()))
                .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            fetch_max_count: file
                .queue
                .as_ref()
                .and_then(|q| q.fetch_max_count)
                .unwrap_or(DEFAULT_FETCH_MAX_COUNT),
            fetch_timeout_ms: file
                .queue
                .as_ref()
                .and_then(|q| q.fetch_timeout_ms)
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_MS),
            reclaim_idle_ms: file
                .queue
                .as_ref()
                .and_then(|q| q.reclaim_idle_ms)
                .unwrap_or(DEFAULT_RECLAIM_IDLE_MS),
        };

        let kv = KvConfig {
            backend: cli
                .kv_backend
                .or_else(|| file.kv.as_ref().and_then(|k| k.backend))
                .unwrap_or_default(),
            redis_url: cli
                .kv_redis_url
                .clone()
                .or_else(|| file.kv.as_ref().and_then(|k| k.redis_url.clone()))
                .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            registry_rescan_interval_secs: file
                .kv
                .as_ref()
                .and_then(|k| k.registry_rescan_interval_secs)
                .unwrap_or(REGISTRY_RESCAN_INTERVAL_SECS),
        };

        let directory = DirectoryConfig {
            url: cli
                .directory_url
                .clone()
                .or_else(|| file.directory.as_ref().and_then(|d| d.url.clone())),
            timeout_secs: cli
                .directory_timeout_secs
                .or_else(|| file.directory.as_ref().and_then(|d| d.timeout_secs))
                .unwrap_or(DEFAULT_DIRECTORY_TIMEOUT_SECS),
            max_reconnect_attempts: file
                .directory
                .as_ref()
                .and_then(|d| d.max_reconnect_attempts)
                .unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS),
        };

        let rate_limit = RateLimitConfig {
            enabled: cli
                .rate_limit_enabled
                .or_else(|| file.rate_limit.as_ref().and_then(|r| r.enabled))
                .unwrap_or(true),
            events_rpm: cli
                .rate_limit_events_rpm
                .or_else(|| file.rate_limit.as_ref().and_then(|r| r.events_rpm))
                .unwrap_or(DEFAULT_RATE_LIMIT_EVENTS_RPM),
            messages_rpm: cli
                .rate_limit_messages_rpm
                .or_else(|| file.rate_limit.as_ref().and_then(|r| r.messages_rpm))
                .unwrap_or(DEFAULT_RATE_LIMIT_MESSAGES_RPM),
        };

        let config = Self {
            debug: cli.debug || file.debug.unwrap_or(false),
            server,
            auth,
            queue,
            kv,
            directory,
            rate_limit,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            bail!("server.host must not be empty");
        }
        if self.server.port == 0 {
            bail!("server.port must be non-zero");
        }
        if matches!(self.queue.backend, QueueBackendType::Redis) && self.queue.redis_url.is_empty()
        {
            bail!("queue.redis_url is required when queue.backend is redis");
        }
        if matches!(self.kv.backend, KvBackendType::Redis) && self.kv.redis_url.is_empty() {
            bail!("kv.redis_url is required when kv.backend is redis");
        }
        Ok(())
    }
}

/// True when a host string means "bind to every interface"
pub fn is_all_interfaces(host: &str) -> bool {
    matches!(host, "0.0.0.0" | "::" | "[::]")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> CliConfig {
        CliConfig::default()
    }

    #[test]
    fn defaults_apply_when_nothing_set() {
        let config = AppConfig::load(&base_cli()).unwrap();
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.queue.backend, QueueBackendType::Memory);
        assert_eq!(config.kv.backend, KvBackendType::Memory);
        assert!(!config.auth.admin_token.is_empty());
    }

    #[test]
    fn cli_overrides_defaults() {
        let mut cli = base_cli();
        cli.host = Some("0.0.0.0".into());
        cli.port = Some(9000);
        cli.admin_token = Some("secret".into());
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.auth.admin_token, "secret");
    }

    #[test]
    fn redis_backend_requires_url_validation_passes_with_default() {
        let mut cli = base_cli();
        cli.queue_backend = Some(QueueBackendType::Redis);
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.queue.redis_url, DEFAULT_REDIS_URL);
    }

    #[test]
    fn all_interfaces_detection() {
        assert!(is_all_interfaces("0.0.0.0"));
        assert!(!is_all_interfaces("127.0.0.1"));
    }
}
