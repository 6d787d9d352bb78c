//! CoapBridge - HTTP request to CoAP exchange translation
//!
//! This module turns one [`OutboundRequest`] into one CoAP exchange and the
//! device's answer into a [`TranslatedResponse`] or an HTTP-ready
//! [`HttpEquivalentResponse`].
//!
//! # Exchange Flow
//!
//! ```text
//! OutboundRequest
//!       │  resolve target, build CON request (Uri-Path per segment)
//!       ▼
//! ┌───────────────┐   Block2 M=1   ┌──────────────────────┐
//! │ CoapTransport │ ─────────────► │ request next block   │
//! │  exchange()   │ ◄───────────── │ concatenate payloads │
//! └───────────────┘                └──────────────────────┘
//!       │  code, Content-Format, full payload
//!       ▼
//! decode payload (CBOR or UTF-8)
//!       │
//!       ├─ code 2.xx ──► TranslatedResponse ──► HttpEquivalentResponse
//!       └─ otherwise ──► BridgeError::InvalidResponse (code, format, payload)
//! ```
//!
//! Exchanges are independent: the bridge holds no per-exchange state, so a
//! single instance serves any number of concurrent calls.

use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

use crate::config::CoapConfig;
use crate::content_format::TEXT_PLAIN;
use crate::error::{BridgeError, Result};
use crate::message::{option, random_message_id, random_token, BlockOption, Message, MessageType};
use crate::request::{OutboundRequest, TargetAddress};
use crate::transport::{CoapTransport, UdpTransport};
use crate::translator::{decode_payload, HttpEquivalentResponse, TranslatedResponse};

/// Translates HTTP-originated requests into CoAP exchanges
#[derive(Clone)]
pub struct CoapBridge {
    /// Transport running the exchanges
    transport: Arc<dyn CoapTransport>,
    /// Exchange settings
    config: CoapConfig,
}

impl CoapBridge {
    /// Create a bridge over the given transport
    pub fn new(transport: Arc<dyn CoapTransport>, config: CoapConfig) -> Self {
        Self { transport, config }
    }

    /// Create a bridge over UDP
    pub fn udp(config: CoapConfig) -> Self {
        Self::new(Arc::new(UdpTransport::new(config.clone())), config)
    }

    /// Get the bridge configuration
    pub fn config(&self) -> &CoapConfig {
        &self.config
    }

    /// Get the transport name
    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Run the exchange for `request` and decode the device's answer
    ///
    /// Succeeds only for 2.xx statuses. Any other status fails with
    /// [`BridgeError::InvalidResponse`] carrying the decoded response.
    pub async fn call(&self, request: OutboundRequest) -> Result<TranslatedResponse> {
        let started = Instant::now();
        let uri = request.uri();

        let endpoint = TargetAddress::parse(&request.target_address)?
            .resolve(self.config.default_port)
            .await?;

        let (response, payload) = tokio::time::timeout(
            self.config.exchange_timeout,
            self.fetch_all(endpoint, &request),
        )
        .await
        .map_err(|_| BridgeError::Timeout {
            duration_ms: self.config.exchange_timeout.as_millis() as u64,
        })??;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(
            %uri,
            %endpoint,
            code = %response.code,
            size = payload.len(),
            elapsed_ms,
            "Fetch took {}ms",
            elapsed_ms
        );

        let content_format = response
            .content_format()?
            .map(|format| format.label())
            .unwrap_or_else(|| TEXT_PLAIN.to_string());
        let payload = decode_payload(&content_format, &payload)?;

        let translated = TranslatedResponse {
            code: response.code.to_string(),
            content_format,
            payload,
        };

        if translated.is_success() {
            Ok(translated)
        } else {
            Err(BridgeError::InvalidResponse(Box::new(translated)))
        }
    }

    /// Run the exchange and render the HTTP response
    pub async fn translate(&self, request: OutboundRequest) -> Result<HttpEquivalentResponse> {
        self.call(request).await?.into_http()
    }

    /// Run the exchange, following Block2 until the last block
    ///
    /// Returns the first response (status and options) and the concatenated
    /// payload of all blocks. A non-success status on a later block ends the
    /// transfer and is returned in place of the first response.
    async fn fetch_all(
        &self,
        endpoint: SocketAddr,
        request: &OutboundRequest,
    ) -> Result<(Message, Bytes)> {
        let first = self
            .transport
            .exchange(endpoint, build_message(request, None))
            .await?;

        let mut block = match first.block2()? {
            Some(block) if block.num != 0 => {
                return Err(BridgeError::MalformedMessage(format!(
                    "first response carries block {}",
                    block.num
                )));
            }
            block => block,
        };

        let mut payload = BytesMut::from(&first.payload[..]);
        self.check_size(payload.len())?;

        while let Some(current) = block.filter(|b| b.more) {
            let next = BlockOption {
                num: current.num + 1,
                more: false,
                szx: current.szx,
            };
            trace!(%endpoint, block = next.num, size = next.size(), "Requesting next block");

            let response = self
                .transport
                .exchange(endpoint, build_message(request, Some(next)))
                .await?;

            if response.code.class() != 2 {
                let payload = response.payload.clone();
                return Ok((response, payload));
            }

            let received = response.block2()?.ok_or_else(|| {
                BridgeError::MalformedMessage("continuation response without Block2".to_string())
            })?;
            if received.num != next.num {
                return Err(BridgeError::MalformedMessage(format!(
                    "expected block {}, got {}",
                    next.num, received.num
                )));
            }
            if received.more && response.payload.is_empty() {
                return Err(BridgeError::MalformedMessage(format!(
                    "empty block {} with more to follow",
                    received.num
                )));
            }

            payload.extend_from_slice(&response.payload);
            self.check_size(payload.len())?;
            block = Some(received);
        }

        Ok((first, payload.freeze()))
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.config.max_payload_size {
            return Err(BridgeError::PayloadTooLarge {
                size,
                max: self.config.max_payload_size,
            });
        }
        Ok(())
    }
}

/// Build the CoAP request for `request`, optionally asking for a given block
pub fn build_message(request: &OutboundRequest, block2: Option<BlockOption>) -> Message {
    let mut message = Message::new(
        MessageType::Confirmable,
        request.method.code(),
        random_message_id(),
        random_token(),
    );
    message.set_path(&request.path);
    if let Some(block) = block2 {
        message.add_uint_option(option::BLOCK2, block.to_value());
    }
    message
}
