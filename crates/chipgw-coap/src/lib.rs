//! HTTP to CoAP transcoding core for the chipgw device gateway
//!
//! This crate turns an HTTP-originated request for an embedded device into a
//! CoAP exchange and the device's reply back into an HTTP-equivalent
//! response with a JSON body.
//!
//! # Architecture
//!
//! The core operates in three layers:
//!
//! 1. **Transport** - [`CoapTransport`] runs one request/response exchange;
//!    [`UdpTransport`] implements it over UDP with confirmable retransmission
//!    and separate responses
//! 2. **Bridge** - [`CoapBridge`] resolves the target, builds the request,
//!    follows Block2 transfers and classifies the response status
//! 3. **Translation** - payload decoding (CBOR or UTF-8), JSON rendering with
//!    base64 byte strings, and the CoAP → HTTP status remap
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use chipgw_coap::{CoapBridge, CoapConfig, Method, OutboundRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = CoapBridge::udp(CoapConfig::default());
//!
//!     let request = OutboundRequest::new(
//!         "fdbf:1afc:5480:1:8a08:4ae9:e400:964d",
//!         "/info",
//!         Method::Get,
//!     );
//!     let response = bridge.translate(request).await?;
//!
//!     println!("{} {}", response.status, response.body);
//!     Ok(())
//! }
//! ```
//!
//! # Status Mapping
//!
//! | CoAP | HTTP |
//! |------|------|
//! | 2.05 | 200 |
//! | 2.03, 2.04 | 204 |
//! | 4.02 | 400 |
//! | other `a.b` | `a * 100 + b` (heuristic) |
//!
//! Only 2.xx responses are successes; anything else surfaces as
//! [`BridgeError::InvalidResponse`] with the decoded response attached.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod content_format;
pub mod error;
pub mod message;
pub mod request;
pub mod status;

pub mod bridge;
pub mod translator;
pub mod transport;

pub mod test_utils;

pub use bridge::CoapBridge;
pub use config::{CoapConfig, CoapConfigBuilder};
pub use content_format::ContentFormat;
pub use error::{BridgeError, ErrorKind, Result};
pub use message::{BlockOption, Code, Message, MessageType};
pub use request::{Method, OutboundRequest, TargetAddress};
pub use status::http_status;
pub use translator::{HttpEquivalentResponse, TranslatedPayload, TranslatedResponse};
pub use transport::{CoapTransport, ExchangeState, UdpTransport};

// Protocol constants re-exports
pub use config::{
    COAP_DEFAULT_PORT, DEFAULT_ACK_TIMEOUT_MS, DEFAULT_EXCHANGE_TIMEOUT_MS,
    DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_MAX_RETRANSMIT,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
