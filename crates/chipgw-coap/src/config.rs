//! Configuration types for CoAP exchanges
//!
//! This module provides the protocol constants and the [`CoapConfig`]
//! structure that controls how the gateway talks to devices: default port,
//! retransmission timing, the exchange deadline and the Block2 payload bound.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default CoAP UDP port
pub const COAP_DEFAULT_PORT: u16 = 5683;

/// CoAP protocol version carried in every header
pub const COAP_VERSION: u8 = 1;

/// Initial retransmission timeout for confirmable messages
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 2000;

/// Upper bound of the random factor applied to the initial timeout
pub const ACK_RANDOM_FACTOR: f64 = 1.5;

/// Default number of retransmissions of a confirmable message
pub const DEFAULT_MAX_RETRANSMIT: u32 = 4;

/// Default overall deadline for one exchange
pub const DEFAULT_EXCHANGE_TIMEOUT_MS: u64 = 30_000;

/// Default bound on a reassembled payload
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Largest datagram the transport will read, the maximum UDP payload
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Configuration for CoAP exchanges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoapConfig {
    /// Port used when the target address carries none
    #[serde(default = "default_port")]
    pub default_port: u16,

    /// Initial retransmission timeout for confirmable requests
    #[serde(with = "humantime_serde", default = "default_ack_timeout")]
    pub ack_timeout: Duration,

    /// Number of retransmissions before giving up on an ACK
    #[serde(default = "default_max_retransmit")]
    pub max_retransmit: u32,

    /// Deadline for a whole exchange, Block2 transfers included
    #[serde(with = "humantime_serde", default = "default_exchange_timeout")]
    pub exchange_timeout: Duration,

    /// Maximum size of a reassembled payload in bytes
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,
}

fn default_port() -> u16 {
    COAP_DEFAULT_PORT
}

fn default_ack_timeout() -> Duration {
    Duration::from_millis(DEFAULT_ACK_TIMEOUT_MS)
}

fn default_max_retransmit() -> u32 {
    DEFAULT_MAX_RETRANSMIT
}

fn default_exchange_timeout() -> Duration {
    Duration::from_millis(DEFAULT_EXCHANGE_TIMEOUT_MS)
}

fn default_max_payload_size() -> usize {
    DEFAULT_MAX_PAYLOAD_SIZE
}

impl Default for CoapConfig {
    fn default() -> Self {
        Self {
            default_port: COAP_DEFAULT_PORT,
            ack_timeout: Duration::from_millis(DEFAULT_ACK_TIMEOUT_MS),
            max_retransmit: DEFAULT_MAX_RETRANSMIT,
            exchange_timeout: Duration::from_millis(DEFAULT_EXCHANGE_TIMEOUT_MS),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

/// Builder for CoapConfig
#[derive(Debug, Default)]
pub struct CoapConfigBuilder {
    config: CoapConfig,
}

impl CoapConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the port used for targets without an explicit one
    pub fn default_port(mut self, port: u16) -> Self {
        self.config.default_port = port;
        self
    }

    /// Set the initial retransmission timeout
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    /// Set the number of retransmissions
    pub fn max_retransmit(mut self, count: u32) -> Self {
        self.config.max_retransmit = count;
        self
    }

    /// Set the overall exchange deadline
    pub fn exchange_timeout(mut self, timeout: Duration) -> Self {
        self.config.exchange_timeout = timeout;
        self
    }

    /// Set the reassembled payload bound
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CoapConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
