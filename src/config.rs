//! Configuration types for search-harvest

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Main configuration for [`JobController`](crate::JobController)
///
/// Fields are organized into sub-configs:
/// - [`storage`](StorageConfig) - object layout, chunk size, compose fan-in
/// - [`job`](JobConfig) - request defaults and loop timing
/// - [`retry`](RetryConfig) - backoff policy for the search API
/// - [`reddit`](RedditConfig) - search API credentials and endpoints
/// - [`api`](ApiConfig) - REST server settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Object storage layout and chunking
    #[serde(default)]
    pub storage: StorageConfig,

    /// Job defaults and loop timing
    #[serde(default)]
    pub job: JobConfig,

    /// Backoff policy for upstream calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Search API credentials
    #[serde(default)]
    pub reddit: RedditConfig,

    /// REST API server
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Build a configuration from defaults overlaid with process environment variables
    ///
    /// Recognized variables: `REDDIT_CLIENT_ID`, `REDDIT_CLIENT_SECRET`,
    /// `REDDIT_USER_AGENT`, `PORT`.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an injectable variable lookup
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(id) = non_empty("REDDIT_CLIENT_ID") {
            config.reddit.client_id = Some(id);
        }
        if let Some(secret) = non_empty("REDDIT_CLIENT_SECRET") {
            config.reddit.client_secret = Some(secret);
        }
        if let Some(agent) = non_empty("REDDIT_USER_AGENT") {
            config.reddit.user_agent = agent;
        }
        if let Some(port) = non_empty("PORT") {
            let port: u16 = port.trim().parse().map_err(|_| Error::Config {
                message: format!("PORT must be a valid port number, got '{}'", port),
                key: Some("PORT".to_string()),
            })?;
            config.api.bind_address.set_port(port);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the job machinery cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.storage.chunk_rows == 0 {
            return Err(Error::Config {
                message: "chunk_rows must be at least 1".to_string(),
                key: Some("chunk_rows".to_string()),
            });
        }
        if self.storage.compose_fan_in < 2 {
            return Err(Error::Config {
                message: "compose_fan_in must be at least 2".to_string(),
                key: Some("compose_fan_in".to_string()),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config {
                message: "max_attempts must be at least 1".to_string(),
                key: Some("max_attempts".to_string()),
            });
        }
        Ok(())
    }
}

/// Object storage layout and chunking
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Prefix under which job directories are created (default: "reddit_scrapes")
    #[serde(default = "default_results_prefix")]
    pub results_prefix: String,

    /// Prefix for checkpoint objects (default: "checkpointing")
    #[serde(default = "default_checkpoint_prefix")]
    pub checkpoint_prefix: String,

    /// Rows buffered per entity before a part is flushed (default: 200)
    #[serde(default = "default_chunk_rows")]
    pub chunk_rows: usize,

    /// Maximum sources per storage compose call (default: 32)
    #[serde(default = "default_compose_fan_in")]
    pub compose_fan_in: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            results_prefix: default_results_prefix(),
            checkpoint_prefix: default_checkpoint_prefix(),
            chunk_rows: default_chunk_rows(),
            compose_fan_in: default_compose_fan_in(),
        }
    }
}

/// Request defaults and loop timing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobConfig {
    /// Sub-target used when a start request names none (default: "nbadiscussion")
    #[serde(default = "default_sub_target")]
    pub default_sub_target: String,

    /// Recency filter used when a start request names none (default: "all")
    #[serde(default = "default_time_filter")]
    pub default_time_filter: String,

    /// Result ordering used when a start request names none (default: "new")
    #[serde(default = "default_sort")]
    pub default_sort: String,

    /// Per-search result limit when a start request names none (default: unlimited)
    #[serde(default)]
    pub default_limit: Option<u32>,

    /// Pause polling interval (default: 200 ms)
    #[serde(default = "default_pause_poll_interval", with = "millis_serde")]
    pub pause_poll_interval: Duration,

    /// Lifetime of signed result URLs (default: 1 hour)
    #[serde(default = "default_signed_url_ttl", with = "duration_serde")]
    pub signed_url_ttl: Duration,

    /// How long graceful shutdown waits for the loop to exit (default: 8 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            default_sub_target: default_sub_target(),
            default_time_filter: default_time_filter(),
            default_sort: default_sort(),
            default_limit: None,
            pause_poll_interval: default_pause_poll_interval(),
            signed_url_ttl: default_signed_url_ttl(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Retry configuration for upstream failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts before escalating (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay of any single backoff sleep (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,

    /// Margin added on top of a rate-limit wait hint (default: 1 second)
    #[serde(default = "default_rate_limit_margin", with = "duration_serde")]
    pub rate_limit_margin: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
            rate_limit_margin: default_rate_limit_margin(),
        }
    }
}

/// Search API credentials and endpoints
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RedditConfig {
    /// OAuth client id
    #[serde(default)]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: Option<String>,

    /// User agent sent with every request (default: "nba scrape agent")
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Base URL for authenticated API calls
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// OAuth token endpoint
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Timeout for a single HTTP request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Listing page size requested per search call (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            user_agent: default_user_agent(),
            api_base: default_api_base(),
            auth_url: default_auth_url(),
            request_timeout: default_request_timeout(),
            page_size: default_page_size(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:8080)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,

    /// CSV with a `player` column, read when `POST /scrape` names no players
    #[serde(default)]
    pub targets_file: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
            targets_file: None,
        }
    }
}

fn default_results_prefix() -> String {
    "reddit_scrapes".to_string()
}

fn default_checkpoint_prefix() -> String {
    "checkpointing".to_string()
}

fn default_chunk_rows() -> usize {
    200
}

fn default_compose_fan_in() -> usize {
    32
}

fn default_sub_target() -> String {
    "nbadiscussion".to_string()
}

fn default_time_filter() -> String {
    "all".to_string()
}

fn default_sort() -> String {
    "new".to_string()
}

fn default_pause_poll_interval() -> Duration {
    Duration::from_millis(200)
}

fn default_signed_url_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_rate_limit_margin() -> Duration {
    Duration::from_secs(1)
}

fn default_user_agent() -> String {
    "nba scrape agent".to_string()
}

fn default_api_base() -> String {
    "https://oauth.reddit.com".to_string()
}

fn default_auth_url() -> String {
    "https://www.reddit.com/api/v1/access_token".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_page_size() -> u32 {
    100
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
