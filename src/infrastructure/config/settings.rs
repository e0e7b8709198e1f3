use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Interval between liveness probes (ping) in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Read deadline in seconds, extended on every probe acknowledgment (pong)
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout: u64,
    /// Deadline for a single outbound send to a peer, in seconds
    #[serde(default = "default_send_timeout")]
    pub send_timeout: u64,
    /// How long to wait for the authentication frame, in seconds (0 = no limit)
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout: u64,
    /// Outbound frame buffer per connection
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_pong_timeout() -> u64 {
    60
}

fn default_send_timeout() -> u64 {
    5
}

fn default_auth_timeout() -> u64 {
    30
}

fn default_channel_capacity() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Conversation store backend: "memory" or "postgres"
    #[serde(default = "default_database_backend")]
    pub backend: String,
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u32,
}

fn default_database_backend() -> String {
    "memory".to_string()
}

fn default_database_url() -> String {
    "postgres://localhost:5432/argo".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_idle_timeout() -> u32 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "argo-relay".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3001)?
            .set_default("websocket.heartbeat_interval", 30)?
            .set_default("websocket.pong_timeout", 60)?
            .set_default("websocket.send_timeout", 5)?
            .set_default("websocket.auth_timeout", 30)?
            .set_default("database.backend", "memory")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER__PORT, JWT__SECRET, DATABASE__URL, WEBSOCKET__PONG_TIMEOUT, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            pong_timeout: default_pong_timeout(),
            send_timeout: default_send_timeout(),
            auth_timeout: default_auth_timeout(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_database_backend(),
            url: default_database_url(),
            pool_size: default_pool_size(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

/// Runtime timings for connection sessions, derived from [`WebSocketConfig`].
#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    pub heartbeat_interval: Duration,
    pub pong_timeout: Duration,
    pub send_timeout: Duration,
    pub auth_timeout: Option<Duration>,
    pub channel_capacity: usize,
}

impl From<&WebSocketConfig> for RelayConfig {
    fn from(config: &WebSocketConfig) -> Self {
        Self {
            // Zero would disable probing and reap every connection at once
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval.max(1)),
            pong_timeout: Duration::from_secs(config.pong_timeout.max(1)),
            send_timeout: Duration::from_secs(config.send_timeout),
            auth_timeout: (config.auth_timeout > 0)
                .then(|| Duration::from_secs(config.auth_timeout)),
            channel_capacity: config.channel_capacity.max(1),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from(&WebSocketConfig::default())
    }
}
