//! Server configuration. Every struct deserializes with defaults for missing fields, so a
//! host can load it from whatever format it already uses.

use crate::cors::CorsConfig;
use crate::error::ConfigError;
use nimbus_http::codec::ProxyMode;
use nimbus_http::connection::ConnectionConfig;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// One address to listen on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListenerConfig {
    pub address: SocketAddr,
    pub proxy_mode: ProxyMode,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from((Ipv4Addr::LOCALHOST, 2812)))
    }
}

impl ListenerConfig {
    pub fn new(address: SocketAddr) -> Self {
        Self { address, proxy_mode: ProxyMode::Disabled }
    }

    #[must_use]
    pub fn with_proxy_mode(mut self, proxy_mode: ProxyMode) -> Self {
        self.proxy_mode = proxy_mode;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub listeners: Vec<ListenerConfig>,
    pub max_content_length: usize,
    pub read_timeout_secs: u64,
    pub inline_threshold: u64,
    pub max_pipelined: usize,
    /// worker threads of the execution pool
    pub pool_workers: usize,
    /// handler invocations in flight before requests are answered with 503
    pub pool_capacity: usize,
    /// policy for handlers without their own
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let connection = ConnectionConfig::default();
        Self {
            listeners: vec![ListenerConfig::default()],
            max_content_length: connection.max_content_length,
            read_timeout_secs: connection.read_timeout.as_secs(),
            inline_threshold: connection.inline_threshold,
            max_pipelined: connection.max_pipelined,
            pool_workers: std::thread::available_parallelism().map_or(4, usize::from),
            pool_capacity: 1024,
            cors: CorsConfig::permissive(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listeners.is_empty() {
            return Err(ConfigError::NoListener);
        }

        let positive = [
            ("maxContentLength", self.max_content_length),
            ("maxPipelined", self.max_pipelined),
            ("poolWorkers", self.pool_workers),
            ("poolCapacity", self.pool_capacity),
        ];
        if let Some((field, _)) = positive.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero { field });
        }
        if self.read_timeout_secs == 0 {
            return Err(ConfigError::Zero { field: "readTimeoutSecs" });
        }

        self.cors.validate()
    }

    /// Transport settings for connections accepted on `listener`.
    pub fn connection_config(&self, listener: &ListenerConfig) -> ConnectionConfig {
        ConnectionConfig {
            max_content_length: self.max_content_length,
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            inline_threshold: self.inline_threshold,
            max_pipelined: self.max_pipelined,
            proxy_mode: listener.proxy_mode,
        }
    }
}
