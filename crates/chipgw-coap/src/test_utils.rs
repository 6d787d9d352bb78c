//! Test utilities for gateway exchanges
//!
//! This module provides stand-ins for CoAP devices so the bridge and the HTTP
//! frontend can be tested without hardware:
//!
//! - [`MockTransport`] answers exchanges in-process from a responder closure
//!   and records every request it sees.
//! - [`spawn_udp_device`] runs a loopback UDP socket that speaks the CoAP wire
//!   format, for tests that exercise the real [`crate::UdpTransport`].
//!
//! # Example
//!
//! ```rust,ignore
//! use chipgw_coap::test_utils::MockTransport;
//! use chipgw_coap::{Code, ContentFormat, CoapBridge, CoapConfig};
//!
//! let transport = Arc::new(MockTransport::replying(
//!     Code::CONTENT,
//!     Some(ContentFormat::Cbor),
//!     vec![0xA1, 0x61, 0x78, 0x01],
//! ));
//! let bridge = CoapBridge::new(transport.clone(), CoapConfig::default());
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::config::MAX_DATAGRAM_SIZE;
use crate::content_format::ContentFormat;
use crate::error::Result;
use crate::message::{option, BlockOption, Code, Message, MessageType};
use crate::transport::CoapTransport;

/// Closure producing the device's answer to a request
pub type Responder = Arc<dyn Fn(SocketAddr, &Message) -> Result<Message> + Send + Sync>;

/// In-process transport with scripted responses
pub struct MockTransport {
    responder: Responder,
    delays: HashMap<SocketAddr, Duration>,
    requests: Mutex<Vec<(SocketAddr, Message)>>,
}

impl MockTransport {
    /// Create a mock answering every exchange through `responder`
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(SocketAddr, &Message) -> Result<Message> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            delays: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock answering every request with the same piggybacked response
    pub fn replying(code: Code, format: Option<ContentFormat>, payload: Vec<u8>) -> Self {
        Self::new(move |_, request| Ok(response_to(request, code, format, payload.clone())))
    }

    /// Delay answers to one endpoint
    pub fn with_delay(mut self, endpoint: SocketAddr, delay: Duration) -> Self {
        self.delays.insert(endpoint, delay);
        self
    }

    /// Every request seen so far, in order
    pub fn requests(&self) -> Vec<(SocketAddr, Message)> {
        self.requests.lock().clone()
    }

    /// Number of requests seen so far
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl CoapTransport for MockTransport {
    async fn exchange(&self, endpoint: SocketAddr, request: Message) -> Result<Message> {
        self.requests.lock().push((endpoint, request.clone()));

        if let Some(delay) = self.delays.get(&endpoint) {
            tokio::time::sleep(*delay).await;
        }

        (self.responder)(endpoint, &request)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Piggybacked response to `request`
pub fn response_to(
    request: &Message,
    code: Code,
    format: Option<ContentFormat>,
    payload: Vec<u8>,
) -> Message {
    let mut response = Message::new(
        MessageType::Acknowledgement,
        code,
        request.message_id,
        request.token.clone(),
    );
    if let Some(format) = format {
        response.add_uint_option(option::CONTENT_FORMAT, u32::from(format.id()));
    }
    response.payload = Bytes::from(payload);
    response
}

/// Responder serving `body` in Block2 blocks of `2^(szx + 4)` bytes
pub fn blockwise_responder(
    body: Vec<u8>,
    szx: u8,
    format: Option<ContentFormat>,
) -> impl Fn(SocketAddr, &Message) -> Result<Message> + Send + Sync + 'static {
    move |_, request| {
        let size = 1usize << (szx + 4);
        let num = request.block2()?.map(|block| block.num).unwrap_or(0) as usize;
        let start = (num * size).min(body.len());
        let end = (start + size).min(body.len());

        let mut response = response_to(request, Code::CONTENT, format, body[start..end].to_vec());
        if body.len() > size {
            let block = BlockOption {
                num: num as u32,
                more: end < body.len(),
                szx,
            };
            response.add_uint_option(option::BLOCK2, block.to_value());
        }
        Ok(response)
    }
}

/// CBOR encoding of any serializable value
pub fn cbor_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_cbor::to_vec(value).unwrap_or_default()
}

/// Spawn a loopback CoAP device on UDP
///
/// Every decodable datagram is passed to `handler`, and each message it
/// returns is sent back to the sender in order. Returning nothing drops the
/// request, which lets tests exercise retransmission and timeouts.
pub async fn spawn_udp_device<F>(handler: F) -> std::io::Result<SocketAddr>
where
    F: Fn(&Message) -> Vec<Message> + Send + Sync + 'static,
{
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    let addr = socket.local_addr()?;
    debug!(%addr, "Test device listening");

    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, peer) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(_) => break,
            };
            let Ok(message) = Message::decode(&buf[..len]) else {
                trace!(%peer, "Test device ignoring malformed datagram");
                continue;
            };
            for reply in handler(&message) {
                if let Ok(datagram) = reply.encode() {
                    let _ = socket.send_to(&datagram, peer).await;
                }
            }
        }
    });

    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_records_requests() {
        let transport = MockTransport::replying(Code::CONTENT, None, b"ok".to_vec());
        let endpoint: SocketAddr = "127.0.0.1:5683".parse().unwrap();
        let request = Message::new(
            MessageType::Confirmable,
            Code::GET,
            42,
            Bytes::from_static(&[7]),
        );

        let response = transport.exchange(endpoint, request).await.unwrap();
        assert_eq!(response.message_id, 42);
        assert_eq!(&response.token[..], &[7]);
        assert_eq!(&response.payload[..], b"ok");
        assert_eq!(transport.request_count(), 1);
        assert_eq!(transport.requests()[0].0, endpoint);
    }

    #[test]
    fn test_response_to_sets_format() {
        let request = Message::new(MessageType::Confirmable, Code::GET, 1, Bytes::new());
        let response = response_to(&request, Code::CONTENT, Some(ContentFormat::Cbor), vec![]);
        assert_eq!(response.content_format().unwrap(), Some(ContentFormat::Cbor));
    }

    #[test]
    fn test_cbor_bytes() {
        assert_eq!(cbor_bytes(&json!({"x": 1})), vec![0xA1, 0x61, 0x78, 0x01]);
    }
}
