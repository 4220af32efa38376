//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;
use synclitedb_core::BrokerConfig;

/// Port the broker listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 5555;

/// Configuration for the broker server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Time allowed for one request's broker work.
    pub request_timeout: Duration,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Registry and executor settings.
    pub broker: BrokerConfig,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_connections: 1000,
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 16 * 1024 * 1024,
            broker: BrokerConfig::default(),
        }
    }

    /// Sets the maximum concurrent connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the maximum request body size.
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Sets the broker configuration.
    pub fn with_broker(mut self, broker: BrokerConfig) -> Self {
        self.broker = broker;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 5555);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_body_bytes, 16 * 1024 * 1024);
        assert!(config.broker.atomic_batches);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("0.0.0.0:9000".parse().unwrap())
            .with_max_connections(0)
            .with_request_timeout(Duration::from_millis(250))
            .with_max_body_bytes(1024)
            .with_broker(BrokerConfig::new().atomic_batches(false));

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.max_body_bytes, 1024);
        assert!(!config.broker.atomic_batches);
    }
}
