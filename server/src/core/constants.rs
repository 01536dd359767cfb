// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "relaybus";

/// Application name in lowercase (for identifiers)
pub const APP_NAME_LOWER: &str = "relaybus";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "relaybus.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "RELAYBUS_CONFIG";

// =============================================================================
// Environment Variables - Debug
// =============================================================================

/// Environment variable for debug mode
pub const ENV_DEBUG: &str = "RELAYBUS_DEBUG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "RELAYBUS_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "RELAYBUS_PORT";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "RELAYBUS_LOG";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 7733;

// =============================================================================
// Queue Backend
// =============================================================================

/// Environment variable for queue backend (memory or redis)
pub const ENV_QUEUE_BACKEND: &str = "RELAYBUS_QUEUE_BACKEND";

/// Environment variable for queue Redis URL
pub const ENV_QUEUE_REDIS_URL: &str = "RELAYBUS_QUEUE_REDIS_URL";

/// Default Redis URL (works with Redis, Valkey, Dragonfly)
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";

/// Fixed name of the ingress stream that publishers write to
pub const STREAM_INCOMING: &str = "incoming";

/// Prefix for per-subscription delivery streams (`subscription:<name>`)
pub const STREAM_SUBSCRIPTION_PREFIX: &str = "subscription:";

/// Prefix for per-subscription pre-fill streams (`prefill:<name>`)
pub const STREAM_PREFILL_PREFIX: &str = "prefill:";

/// Default max number of messages returned from a single fetch call
pub const DEFAULT_FETCH_MAX_COUNT: usize = 100;

/// Default long-poll timeout for a fetch call with no messages ready
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 20_000;

/// Default minimum idle time before an unacked message becomes reclaimable
pub const DEFAULT_RECLAIM_IDLE_MS: u64 = 60_000;

// =============================================================================
// KV Backend
// =============================================================================

/// Environment variable for KV backend (memory or redis)
pub const ENV_KV_BACKEND: &str = "RELAYBUS_KV_BACKEND";

/// Environment variable for KV Redis URL
pub const ENV_KV_REDIS_URL: &str = "RELAYBUS_KV_REDIS_URL";

/// Key prefix for subscription records
pub const KV_SUBSCRIPTION_PREFIX: &str = "subscription:";

/// Interval between full subscription-registry rescans
pub const REGISTRY_RESCAN_INTERVAL_SECS: u64 = 300;

// =============================================================================
// Authentication
// =============================================================================

/// Environment variable for the admin bearer token
pub const ENV_ADMIN_TOKEN: &str = "RELAYBUS_ADMIN_TOKEN";

/// Environment variable for the default publisher credential (username)
pub const ENV_PUBLISHER_NAME: &str = "RELAYBUS_PUBLISHER_NAME";

/// Environment variable for the default publisher credential (password)
pub const ENV_PUBLISHER_PASSWORD: &str = "RELAYBUS_PUBLISHER_PASSWORD";

// =============================================================================
// Pre-fill Controller
// =============================================================================

/// Environment variable for the directory collaborator base URL
pub const ENV_DIRECTORY_URL: &str = "RELAYBUS_DIRECTORY_URL";

/// Environment variable for the directory collaborator request timeout (seconds)
pub const ENV_DIRECTORY_TIMEOUT_SECS: &str = "RELAYBUS_DIRECTORY_TIMEOUT_SECS";

/// Default directory collaborator request timeout in seconds
pub const DEFAULT_DIRECTORY_TIMEOUT_SECS: u64 = 30;

/// Default maximum reconnect attempts before a pre-fill task gives up
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

// =============================================================================
// Request Body Limits
// =============================================================================

/// Default body limit for API requests (1 MB)
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Body limit for event-ingress requests (8 MB)
pub const EVENTS_BODY_LIMIT: usize = 8 * 1024 * 1024;

// =============================================================================
// Shutdown
// =============================================================================

/// Graceful shutdown drain timeout in seconds
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Rate Limiting
// =============================================================================

/// Environment variable for rate limit enabled
pub const ENV_RATE_LIMIT_ENABLED: &str = "RELAYBUS_RATE_LIMIT_ENABLED";

/// Environment variable for the events (publisher) rate limit (requests per minute)
pub const ENV_RATE_LIMIT_EVENTS_RPM: &str = "RELAYBUS_RATE_LIMIT_EVENTS_RPM";

/// Environment variable for the messages (consumer) rate limit (requests per minute)
pub const ENV_RATE_LIMIT_MESSAGES_RPM: &str = "RELAYBUS_RATE_LIMIT_MESSAGES_RPM";

/// Default events rate limit (requests per minute)
pub const DEFAULT_RATE_LIMIT_EVENTS_RPM: u32 = 6000;

/// Default messages rate limit (requests per minute)
pub const DEFAULT_RATE_LIMIT_MESSAGES_RPM: u32 = 6000;

/// Rate limit window in seconds (fixed 1-minute window)
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

// =============================================================================
// Error Message Limits
// =============================================================================

/// Maximum length for an error message body
pub const ERROR_MESSAGE_MAX_LEN: usize = 2048;
