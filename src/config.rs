//! Handshake configuration.
//!
//! Values that end up on the wire live in [`MessageConfig`] so that tests can
//! pin the nonce and timestamp. [`NodeConfig`] adds the peer address and the
//! deadlines, and can be read from the process environment.

use std::num::ParseIntError;
use std::time::Duration;

use thiserror::Error;

use super::network::Network;
use super::payload::{ServiceFlags, PROTOCOL_VERSION};

/// Default timeout for the TCP connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout waiting for the peer's version.
pub const DEFAULT_VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout waiting for the peer's verack.
pub const DEFAULT_VERACK_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_NODE_ADDRESS: &str = "NODE_ADDRESS";
pub const ENV_NODE_NETWORK: &str = "NODE_NETWORK";
pub const ENV_HANDSHAKE_TIMEOUT_SECS: &str = "HANDSHAKE_TIMEOUT_SECS";
pub const ENV_USER_AGENT: &str = "USER_AGENT";

/// User agent advertised when none is configured, e.g. `/btc-handshake:0.1.0/`
pub fn default_user_agent() -> String {
    const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
    const CARGO_PKG_NAME: &str = env!("CARGO_PKG_NAME");

    format!("/{}:{}/", CARGO_PKG_NAME, CARGO_PKG_VERSION)
}

/// Errors reading the configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown network {0:?}, expected mainnet, testnet or regtest")]
    InvalidNetwork(String),

    #[error("Invalid value {value:?} for {var}: {source}")]
    InvalidTimeout {
        var: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// Values used to build outbound messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageConfig {
    /// Network whose magic starts every header.
    pub network: Network,

    /// Protocol version advertised in the version payload.
    pub protocol_version: i32,

    /// Service bits advertised in the version payload.
    pub services: u64,

    /// User agent, at most 255 bytes once encoded.
    pub user_agent: String,

    pub nonce: u64,

    pub start_height: i32,

    pub relay: bool,

    /// Fixed Unix timestamp; the current time is used when unset.
    pub timestamp: Option<i64>,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            protocol_version: PROTOCOL_VERSION,
            services: ServiceFlags::NODE_NETWORK.to_u64(),
            user_agent: default_user_agent(),
            nonce: 0,
            start_height: 0,
            relay: false,
            timestamp: None,
        }
    }
}

impl MessageConfig {
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn with_services(mut self, services: ServiceFlags) -> Self {
        self.services = services.to_u64();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_start_height(mut self, start_height: i32) -> Self {
        self.start_height = start_height;
        self
    }

    pub fn with_relay(mut self, relay: bool) -> Self {
        self.relay = relay;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Configuration for a single handshake attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Address of the peer, `host:port`.
    pub address: String,

    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,

    /// Timeout for the peer's version to arrive.
    pub version_timeout: Duration,

    /// Timeout for the peer's verack, counted from when our verack is queued.
    pub verack_timeout: Duration,

    /// Values for the messages we send.
    pub message: MessageConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let message = MessageConfig::default();

        Self {
            address: local_address(message.network),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            version_timeout: DEFAULT_VERSION_TIMEOUT,
            verack_timeout: DEFAULT_VERACK_TIMEOUT,
            message,
        }
    }
}

impl NodeConfig {
    /// Create a new configuration for the specified peer address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_version_timeout(mut self, timeout: Duration) -> Self {
        self.version_timeout = timeout;
        self
    }

    pub fn with_verack_timeout(mut self, timeout: Duration) -> Self {
        self.verack_timeout = timeout;
        self
    }

    pub fn with_message(mut self, message: MessageConfig) -> Self {
        self.message = message;
        self
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let mut message = MessageConfig::default();
        if let Some(network) = var(ENV_NODE_NETWORK) {
            message.network = network.parse().map_err(ConfigError::InvalidNetwork)?;
        }
        if let Some(user_agent) = var(ENV_USER_AGENT) {
            message.user_agent = user_agent;
        }

        let mut config = Self {
            address: var(ENV_NODE_ADDRESS).unwrap_or_else(|| local_address(message.network)),
            message,
            ..Default::default()
        };

        if let Some(value) = var(ENV_HANDSHAKE_TIMEOUT_SECS) {
            let secs = value
                .trim()
                .parse::<u64>()
                .map_err(|source| ConfigError::InvalidTimeout {
                    var: ENV_HANDSHAKE_TIMEOUT_SECS,
                    value: value.clone(),
                    source,
                })?;
            config.verack_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn local_address(network: Network) -> String {
    format!("127.0.0.1:{}", network.default_port())
}
