//! Error types for gateway exchanges
//!
//! Every failure of a single HTTP → CoAP exchange is expressed as a
//! [`BridgeError`]. The variants fall into four families (see [`ErrorKind`]):
//! routing problems with the inbound request, transport failures of the CoAP
//! exchange, payload decode failures, and non-2.x device statuses.

use thiserror::Error;

use crate::translator::TranslatedResponse;

/// Main error type for gateway exchanges
#[derive(Error, Debug)]
pub enum BridgeError {
    // ===== Routing Errors =====
    /// Target address missing, malformed or unresolvable
    #[error("Invalid target address: {0}")]
    InvalidTarget(String),

    // ===== Transport Errors =====
    /// Generic transport failure (bind, send, receive)
    #[error("Transport error: {0}")]
    Transport(String),

    /// No response within the exchange deadline
    #[error("Exchange timed out after {duration_ms}ms")]
    Timeout {
        /// Deadline in milliseconds
        duration_ms: u64,
    },

    /// Device answered the request with a reset message
    #[error("Device reset the exchange")]
    Reset,

    /// Datagram that does not parse as a CoAP message
    #[error("Malformed CoAP message: {0}")]
    MalformedMessage(String),

    /// Reassembled payload exceeds the configured bound
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge {
        /// Bytes received so far
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// HTTP method with no CoAP counterpart
    #[error("Unsupported request method: {0}")]
    UnsupportedMethod(String),

    /// Dotted status code that cannot be mapped to HTTP
    #[error("Cannot map CoAP status {0} to HTTP")]
    InvalidStatus(String),

    // ===== Decode Errors =====
    /// Payload bytes malformed for the declared content format
    #[error("Payload decode error: {0}")]
    Decode(String),

    // ===== Protocol Status Errors =====
    /// Device answered with a non-2.x status
    #[error("Device returned status {}", .0.code)]
    InvalidResponse(Box<TranslatedResponse>),
}

/// Coarse classification of a [`BridgeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Inbound request could not be routed to a device
    Routing,
    /// The CoAP exchange itself failed
    Transport,
    /// Payload bytes were malformed
    Decode,
    /// Device returned a non-success status
    ProtocolStatus,
}

impl BridgeError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::InvalidTarget(_) => ErrorKind::Routing,
            BridgeError::Decode(_) => ErrorKind::Decode,
            BridgeError::InvalidResponse(_) => ErrorKind::ProtocolStatus,
            BridgeError::Transport(_)
            | BridgeError::Timeout { .. }
            | BridgeError::Reset
            | BridgeError::MalformedMessage(_)
            | BridgeError::PayloadTooLarge { .. }
            | BridgeError::UnsupportedMethod(_)
            | BridgeError::InvalidStatus(_) => ErrorKind::Transport,
        }
    }

    /// Check if this is a transport-level failure
    pub fn is_transport_error(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// Device response carried by a protocol status error
    pub fn response(&self) -> Option<&TranslatedResponse> {
        match self {
            BridgeError::InvalidResponse(response) => Some(response),
            _ => None,
        }
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::InvalidTarget(_) => "INVALID_TARGET",
            BridgeError::Transport(_) => "TRANSPORT_ERROR",
            BridgeError::Timeout { .. } => "TIMEOUT",
            BridgeError::Reset => "RESET",
            BridgeError::MalformedMessage(_) => "MALFORMED_MESSAGE",
            BridgeError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            BridgeError::UnsupportedMethod(_) => "UNSUPPORTED_METHOD",
            BridgeError::InvalidStatus(_) => "INVALID_STATUS",
            BridgeError::Decode(_) => "DECODE_ERROR",
            BridgeError::InvalidResponse(_) => "INVALID_RESPONSE",
        }
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<serde_cbor::Error> for BridgeError {
    fn from(err: serde_cbor::Error) -> Self {
        BridgeError::Decode(err.to_string())
    }
}
