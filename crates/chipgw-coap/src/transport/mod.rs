//! Transports carrying CoAP exchanges to devices
//!
//! - [`udp::UdpTransport`] - CoAP over UDP (RFC 7252), the only transport
//!   devices speak today
//! - [`crate::test_utils::MockTransport`] - scripted responses for tests
//!
//! A transport runs exactly one request/response exchange per call. It owns
//! message-layer concerns (confirmable retransmission, empty ACKs, separate
//! responses) and hands back the matching response message. Block-wise
//! transfers and payload interpretation happen above it, in the bridge.

mod udp;

pub use udp::UdpTransport;

use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use std::net::SocketAddr;

/// Trait for CoAP transports
#[async_trait]
pub trait CoapTransport: Send + Sync {
    /// Send `request` to `endpoint` and wait for its response
    ///
    /// Returns the response message matching the request's token. Fails
    /// with a transport error on timeout, reset or malformed datagrams.
    async fn exchange(&self, endpoint: SocketAddr, request: Message) -> Result<Message>;

    /// Get the transport name (for logging)
    fn name(&self) -> &str;
}

/// State of a single exchange on the message layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Request sent, not yet acknowledged
    Dispatched,
    /// Request acknowledged, waiting for a separate response
    AwaitingResponse,
    /// Response received
    Completed,
    /// Exchange failed on the transport
    Failed,
}

impl std::fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeState::Dispatched => write!(f, "dispatched"),
            ExchangeState::AwaitingResponse => write!(f, "awaiting_response"),
            ExchangeState::Completed => write!(f, "completed"),
            ExchangeState::Failed => write!(f, "failed"),
        }
    }
}
