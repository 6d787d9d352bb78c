//! chipgw Node - HTTP frontend for the CoAP device gateway
//!
//! Accepts `ANY /{targetAddress}/{path...}` and forwards it as a single CoAP
//! exchange to `coap://{targetAddress}{path}` through
//! [`chipgw_coap::CoapBridge`]. The device's answer comes back as JSON with
//! the remapped HTTP status; any failure becomes a generic 500.

pub mod server;

use chipgw_coap::{CoapBridge, CoapConfig};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub use server::create_router;

/// Default HTTP listen port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// HTTP bind address
    #[serde(default = "default_bind")]
    pub bind: IpAddr,

    /// HTTP listen port (0 = auto-assign)
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Settings for the outbound CoAP side
    #[serde(default)]
    pub coap: CoapConfig,
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: DEFAULT_HTTP_PORT,
            coap: CoapConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Socket address the HTTP server listens on
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Application state shared across handlers
pub struct AppState {
    /// Transcoding core used for every proxied request
    pub bridge: CoapBridge,
}

impl AppState {
    /// Create state around an existing bridge
    pub fn new(bridge: CoapBridge) -> Self {
        Self { bridge }
    }

    /// Create state talking to devices over UDP
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(CoapBridge::udp(config.coap.clone()))
    }
}
