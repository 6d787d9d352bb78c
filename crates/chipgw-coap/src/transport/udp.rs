//! CoAP over UDP
//!
//! Each exchange binds its own ephemeral socket and connects it to the
//! device, so concurrent exchanges never see each other's datagrams and share
//! no state.
//!
//! # Message Layer
//!
//! - Confirmable requests are retransmitted with the same message ID until
//!   acknowledged, starting from a randomised `ack_timeout` and doubling,
//!   at most `max_retransmit` times.
//! - A piggybacked response (ACK carrying a response code) completes the
//!   exchange immediately.
//! - An empty ACK stops retransmission; the response then arrives as a
//!   separate CON or NON message with the request's token. Separate CON
//!   responses are acknowledged.
//! - A RST for the request's message ID fails the exchange.
//! - `exchange_timeout` bounds the whole exchange.

use async_trait::async_trait;
use rand::Rng;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

use super::{CoapTransport, ExchangeState};
use crate::config::{CoapConfig, ACK_RANDOM_FACTOR, MAX_DATAGRAM_SIZE};
use crate::error::{BridgeError, Result};
use crate::message::{Message, MessageType};

/// How an incoming datagram relates to the pending request
#[derive(Debug, PartialEq, Eq)]
enum Incoming {
    /// The response to the request
    Response,
    /// Empty ACK, response will follow separately
    EmptyAck,
    /// Device rejected the request
    Reset,
    /// Not part of this exchange
    Unrelated,
}

fn classify(request: &Message, incoming: &Message) -> Incoming {
    match incoming.message_type {
        MessageType::Acknowledgement if incoming.message_id == request.message_id => {
            if incoming.code.is_empty() {
                Incoming::EmptyAck
            } else if incoming.code.is_response() && incoming.token == request.token {
                Incoming::Response
            } else {
                Incoming::Unrelated
            }
        }
        MessageType::Reset if incoming.message_id == request.message_id => Incoming::Reset,
        MessageType::Confirmable | MessageType::NonConfirmable
            if incoming.code.is_response() && incoming.token == request.token =>
        {
            Incoming::Response
        }
        _ => Incoming::Unrelated,
    }
}

/// UDP transport for CoAP exchanges
pub struct UdpTransport {
    config: CoapConfig,
}

impl UdpTransport {
    /// Create a new UDP transport
    pub fn new(config: CoapConfig) -> Self {
        Self { config }
    }

    /// Get the transport configuration
    pub fn config(&self) -> &CoapConfig {
        &self.config
    }

    /// First retransmission timeout, randomised between 1 and 1.5 times `ack_timeout`
    fn initial_timeout(&self) -> Duration {
        let factor = rand::thread_rng().gen_range(1.0..ACK_RANDOM_FACTOR);
        self.config.ack_timeout.mul_f64(factor)
    }

    async fn bind_for(endpoint: SocketAddr) -> Result<UdpSocket> {
        let local: SocketAddr = if endpoint.is_ipv6() {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| BridgeError::Transport(format!("bind failed: {}", e)))?;
        socket
            .connect(endpoint)
            .await
            .map_err(|e| BridgeError::Transport(format!("connect to {} failed: {}", endpoint, e)))?;
        Ok(socket)
    }

    async fn run_exchange(&self, endpoint: SocketAddr, request: Message) -> Result<Message> {
        let socket = Self::bind_for(endpoint).await?;
        let datagram = request.encode()?;
        let confirmable = request.message_type == MessageType::Confirmable;

        send(&socket, &datagram).await?;
        let mut state = ExchangeState::Dispatched;
        trace!(%endpoint, message_id = request.message_id, %state, "Request sent");

        let mut retransmissions = 0u32;
        let mut timeout = self.initial_timeout();
        let mut retransmit_at = Instant::now() + timeout;
        // One spare byte so an oversize datagram shows up as overlong
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1];

        loop {
            let retransmitting = confirmable
                && state == ExchangeState::Dispatched
                && retransmissions < self.config.max_retransmit;

            let received = if retransmitting {
                match timeout_at(retransmit_at, socket.recv(&mut buf)).await {
                    Ok(received) => received,
                    Err(_) => {
                        retransmissions += 1;
                        timeout *= 2;
                        retransmit_at = Instant::now() + timeout;
                        debug!(
                            %endpoint,
                            message_id = request.message_id,
                            attempt = retransmissions,
                            "Retransmitting confirmable request"
                        );
                        send(&socket, &datagram).await?;
                        continue;
                    }
                }
            } else {
                socket.recv(&mut buf).await
            };

            let len = received.map_err(|e| BridgeError::Transport(format!("receive failed: {}", e)))?;
            if len > MAX_DATAGRAM_SIZE {
                warn!(%endpoint, "Datagram exceeds {} bytes", MAX_DATAGRAM_SIZE);
                return Err(BridgeError::PayloadTooLarge {
                    size: len,
                    max: MAX_DATAGRAM_SIZE,
                });
            }
            let incoming = Message::decode(&buf[..len]).map_err(|e| {
                warn!(%endpoint, size = len, "Malformed datagram from device");
                e
            })?;

            match classify(&request, &incoming) {
                Incoming::Response => {
                    if incoming.message_type == MessageType::Confirmable {
                        let ack = Message::empty_ack(incoming.message_id).encode()?;
                        send(&socket, &ack).await?;
                    }
                    state = ExchangeState::Completed;
                    trace!(%endpoint, code = %incoming.code, %state, "Response received");
                    return Ok(incoming);
                }
                Incoming::EmptyAck => {
                    state = ExchangeState::AwaitingResponse;
                    trace!(%endpoint, %state, "Request acknowledged, awaiting separate response");
                }
                Incoming::Reset => {
                    state = ExchangeState::Failed;
                    debug!(%endpoint, %state, "Device reset the exchange");
                    return Err(BridgeError::Reset);
                }
                Incoming::Unrelated => {
                    trace!(
                        %endpoint,
                        message_id = incoming.message_id,
                        "Ignoring unrelated datagram"
                    );
                }
            }
        }
    }
}

async fn send(socket: &UdpSocket, datagram: &[u8]) -> Result<()> {
    socket
        .send(datagram)
        .await
        .map_err(|e| BridgeError::Transport(format!("send failed: {}", e)))?;
    Ok(())
}

#[async_trait]
impl CoapTransport for UdpTransport {
    async fn exchange(&self, endpoint: SocketAddr, request: Message) -> Result<Message> {
        let deadline = Instant::now() + self.config.exchange_timeout;
        match timeout_at(deadline, self.run_exchange(endpoint, request)).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Timeout {
                duration_ms: self.config.exchange_timeout.as_millis() as u64,
            }),
        }
    }

    fn name(&self) -> &str {
        "udp"
    }
}
