use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::{KvBackendType, QueueBackendType};
use super::constants::{
    ENV_ADMIN_TOKEN, ENV_CONFIG, ENV_DEBUG, ENV_DIRECTORY_TIMEOUT_SECS, ENV_DIRECTORY_URL,
    ENV_HOST, ENV_KV_BACKEND, ENV_KV_REDIS_URL, ENV_PORT, ENV_PUBLISHER_NAME,
    ENV_PUBLISHER_PASSWORD, ENV_QUEUE_BACKEND, ENV_QUEUE_REDIS_URL, ENV_RATE_LIMIT_ENABLED,
    ENV_RATE_LIMIT_EVENTS_RPM, ENV_RATE_LIMIT_MESSAGES_RPM,
};

#[derive(Parser)]
#[command(name = "relaybusd")]
#[command(version, about = "Directory-change provisioning bus", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Enable debug mode (verbose per-message tracing)
    #[arg(long, global = true, env = ENV_DEBUG)]
    pub debug: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Static bearer token for the admin API. Generated on first run if unset.
    #[arg(long, global = true, env = ENV_ADMIN_TOKEN)]
    pub admin_token: Option<String>,

    /// Default publisher username accepted on the event-ingress endpoint
    #[arg(long, global = true, env = ENV_PUBLISHER_NAME)]
    pub publisher_name: Option<String>,

    /// Default publisher password accepted on the event-ingress endpoint
    #[arg(long, global = true, env = ENV_PUBLISHER_PASSWORD)]
    pub publisher_password: Option<String>,

    /// Message queue backend (memory or redis)
    #[arg(long, global = true, env = ENV_QUEUE_BACKEND, value_parser = parse_queue_backend)]
    pub queue_backend: Option<QueueBackendType>,

    /// Redis URL for the queue backend
    #[arg(long, global = true, env = ENV_QUEUE_REDIS_URL)]
    pub queue_redis_url: Option<String>,

    /// KV backend (memory or redis)
    #[arg(long, global = true, env = ENV_KV_BACKEND, value_parser = parse_kv_backend)]
    pub kv_backend: Option<KvBackendType>,

    /// Redis URL for the KV backend
    #[arg(long, global = true, env = ENV_KV_REDIS_URL)]
    pub kv_redis_url: Option<String>,

    /// Base URL of the directory collaborator used by the pre-fill controller
    #[arg(long, global = true, env = ENV_DIRECTORY_URL)]
    pub directory_url: Option<String>,

    /// Request timeout in seconds for calls to the directory collaborator
    #[arg(long, global = true, env = ENV_DIRECTORY_TIMEOUT_SECS)]
    pub directory_timeout_secs: Option<u64>,

    /// Enable or disable rate limiting
    #[arg(long, global = true, env = ENV_RATE_LIMIT_ENABLED)]
    pub rate_limit_enabled: Option<bool>,

    /// Publisher/event ingress rate limit (requests per minute)
    #[arg(long, global = true, env = ENV_RATE_LIMIT_EVENTS_RPM)]
    pub rate_limit_events_rpm: Option<u32>,

    /// Subscription/message fetch rate limit (requests per minute)
    #[arg(long, global = true, env = ENV_RATE_LIMIT_MESSAGES_RPM)]
    pub rate_limit_messages_rpm: Option<u32>,
}

/// Parse queue backend from CLI/env string
fn parse_queue_backend(s: &str) -> Result<QueueBackendType, String> {
    match s.to_lowercase().as_str() {
        "memory" => Ok(QueueBackendType::Memory),
        "redis" => Ok(QueueBackendType::Redis),
        _ => Err(format!(
            "Invalid queue backend '{}'. Valid options: memory, redis",
            s
        )),
    }
}

/// Parse KV backend from CLI/env string
fn parse_kv_backend(s: &str) -> Result<KvBackendType, String> {
    match s.to_lowercase().as_str() {
        "memory" => Ok(KvBackendType::Memory),
        "redis" => Ok(KvBackendType::Redis),
        _ => Err(format!(
            "Invalid KV backend '{}'. Valid options: memory, redis",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the server (default command)
    Start,
    /// System maintenance commands
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum SystemCommands {
    /// Print the effective configuration and exit
    ShowConfig,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub debug: bool,
    pub config: Option<PathBuf>,
    pub admin_token: Option<String>,
    pub publisher_name: Option<String>,
    pub publisher_password: Option<String>,
    pub queue_backend: Option<QueueBackendType>,
    pub queue_redis_url: Option<String>,
    pub kv_backend: Option<KvBackendType>,
    pub kv_redis_url: Option<String>,
    pub directory_url: Option<String>,
    pub directory_timeout_secs: Option<u64>,
    pub rate_limit_enabled: Option<bool>,
    pub rate_limit_events_rpm: Option<u32>,
    pub rate_limit_messages_rpm: Option<u32>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        debug: cli.debug,
        config: cli.config,
        admin_token: cli.admin_token,
        publisher_name: cli.publisher_name,
        publisher_password: cli.publisher_password,
        queue_backend: cli.queue_backend,
        queue_redis_url: cli.queue_redis_url,
        kv_backend: cli.kv_backend,
        kv_redis_url: cli.kv_redis_url,
        directory_url: cli.directory_url,
        directory_timeout_secs: cli.directory_timeout_secs,
        rate_limit_enabled: cli.rate_limit_enabled,
        rate_limit_events_rpm: cli.rate_limit_events_rpm,
        rate_limit_messages_rpm: cli.rate_limit_messages_rpm,
    };
    (config, cli.command)
}
