//! CoAP message codec
//!
//! Encoding and decoding of CoAP messages as carried in UDP datagrams
//! (RFC 7252 §3), plus the Block2 option value from RFC 7959.
//!
//! # Wire Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |Ver| T |  TKL  |      Code     |          Message ID           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   Token (if any, TKL bytes) ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   Options (if any) ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |1 1 1 1 1 1 1 1|    Payload (if any) ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Options are delta-encoded against the previous option number. Delta and
//! length nibbles 13 and 14 announce one or two extension bytes; 15 is
//! reserved and only valid as part of the payload marker.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::config::COAP_VERSION;
use crate::content_format::ContentFormat;
use crate::error::{BridgeError, Result};

/// Byte separating options from the payload
pub const PAYLOAD_MARKER: u8 = 0xFF;

/// Longest token allowed by the protocol
pub const MAX_TOKEN_LENGTH: usize = 8;

/// Token length used for gateway requests
pub const TOKEN_LENGTH: usize = 4;

/// Option numbers used by the gateway
pub mod option {
    /// Uri-Host
    pub const URI_HOST: u16 = 3;
    /// ETag
    pub const ETAG: u16 = 4;
    /// Observe
    pub const OBSERVE: u16 = 6;
    /// Uri-Port
    pub const URI_PORT: u16 = 7;
    /// Uri-Path (one per path segment)
    pub const URI_PATH: u16 = 11;
    /// Content-Format
    pub const CONTENT_FORMAT: u16 = 12;
    /// Max-Age
    pub const MAX_AGE: u16 = 14;
    /// Uri-Query
    pub const URI_QUERY: u16 = 15;
    /// Accept
    pub const ACCEPT: u16 = 17;
    /// Block2 (RFC 7959)
    pub const BLOCK2: u16 = 23;
    /// Block1 (RFC 7959)
    pub const BLOCK1: u16 = 27;
    /// Size2 (RFC 7959)
    pub const SIZE2: u16 = 28;
}

/// CoAP message type
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Confirmable, must be acknowledged
    Confirmable = 0,
    /// Non-confirmable
    NonConfirmable = 1,
    /// Acknowledgement of a confirmable message
    Acknowledgement = 2,
    /// Reset, the receiver could not process the message
    Reset = 3,
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value & 0x03 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }
}

/// Request method or response code, written `class.detail`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code {
    class: u8,
    detail: u8,
}

impl Code {
    /// 0.00, used by empty messages
    pub const EMPTY: Code = Code::new(0, 0);
    /// 0.01
    pub const GET: Code = Code::new(0, 1);
    /// 0.02
    pub const POST: Code = Code::new(0, 2);
    /// 0.03
    pub const PUT: Code = Code::new(0, 3);
    /// 0.04
    pub const DELETE: Code = Code::new(0, 4);
    /// 0.05 (RFC 8132)
    pub const FETCH: Code = Code::new(0, 5);
    /// 0.06 (RFC 8132)
    pub const PATCH: Code = Code::new(0, 6);
    /// 0.07 (RFC 8132)
    pub const IPATCH: Code = Code::new(0, 7);
    /// 2.01 Created
    pub const CREATED: Code = Code::new(2, 1);
    /// 2.02 Deleted
    pub const DELETED: Code = Code::new(2, 2);
    /// 2.03 Valid
    pub const VALID: Code = Code::new(2, 3);
    /// 2.04 Changed
    pub const CHANGED: Code = Code::new(2, 4);
    /// 2.05 Content
    pub const CONTENT: Code = Code::new(2, 5);
    /// 4.00 Bad Request
    pub const BAD_REQUEST: Code = Code::new(4, 0);
    /// 4.02 Bad Option
    pub const BAD_OPTION: Code = Code::new(4, 2);
    /// 4.04 Not Found
    pub const NOT_FOUND: Code = Code::new(4, 4);
    /// 5.00 Internal Server Error
    pub const INTERNAL_SERVER_ERROR: Code = Code::new(5, 0);

    /// Build a code from its class (0-7) and detail (0-31)
    pub const fn new(class: u8, detail: u8) -> Self {
        Self {
            class: class & 0x07,
            detail: detail & 0x1F,
        }
    }

    /// Code class (the digit before the dot)
    pub fn class(&self) -> u8 {
        self.class
    }

    /// Code detail (the two digits after the dot)
    pub fn detail(&self) -> u8 {
        self.detail
    }

    /// Whether this is the empty code 0.00
    pub fn is_empty(&self) -> bool {
        self.class == 0 && self.detail == 0
    }

    /// Whether this is a request method
    pub fn is_request(&self) -> bool {
        self.class == 0 && self.detail != 0
    }

    /// Whether this is a response code (classes 2, 4 and 5)
    pub fn is_response(&self) -> bool {
        matches!(self.class, 2..=5)
    }
}

impl From<u8> for Code {
    fn from(byte: u8) -> Self {
        Code::new(byte >> 5, byte & 0x1F)
    }
}

impl From<Code> for u8 {
    fn from(code: Code) -> Self {
        (code.class << 5) | code.detail
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class, self.detail)
    }
}

/// Value of a Block1/Block2 option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOption {
    /// Block number
    pub num: u32,
    /// More blocks follow
    pub more: bool,
    /// Size exponent, block size is `2^(szx + 4)`
    pub szx: u8,
}

impl BlockOption {
    /// Largest size exponent (1024-byte blocks)
    pub const MAX_SZX: u8 = 6;

    /// Decode an option value
    pub fn from_value(value: u32) -> Result<Self> {
        let szx = (value & 0x07) as u8;
        if szx > Self::MAX_SZX {
            return Err(BridgeError::MalformedMessage(format!(
                "reserved block size exponent {}",
                szx
            )));
        }
        Ok(Self {
            num: value >> 4,
            more: value & 0x08 != 0,
            szx,
        })
    }

    /// Encode as an option value
    pub fn to_value(&self) -> u32 {
        (self.num << 4) | (u32::from(self.more) << 3) | u32::from(self.szx & 0x07)
    }

    /// Block size in bytes
    pub fn size(&self) -> usize {
        1 << (self.szx + 4)
    }
}

/// A CoAP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message type
    pub message_type: MessageType,
    /// Method or response code
    pub code: Code,
    /// Message ID, matches ACK/RST to CON
    pub message_id: u16,
    /// Token, matches responses to requests
    pub token: Bytes,
    /// Options in insertion order; sorted by number when encoded
    pub options: Vec<(u16, Bytes)>,
    /// Payload bytes
    pub payload: Bytes,
}

impl Message {
    /// Create a message without options or payload
    pub fn new(message_type: MessageType, code: Code, message_id: u16, token: Bytes) -> Self {
        Self {
            message_type,
            code,
            message_id,
            token,
            options: Vec::new(),
            payload: Bytes::new(),
        }
    }

    /// Empty ACK for a confirmable message
    pub fn empty_ack(message_id: u16) -> Self {
        Self::new(MessageType::Acknowledgement, Code::EMPTY, message_id, Bytes::new())
    }

    /// Add an option with the given value
    pub fn add_option(&mut self, number: u16, value: impl Into<Bytes>) {
        self.options.push((number, value.into()));
    }

    /// Add an unsigned integer option using the shortest encoding
    pub fn add_uint_option(&mut self, number: u16, value: u32) {
        self.add_option(number, encode_uint(value));
    }

    /// Replace every occurrence of an option with a single uint value
    pub fn set_uint_option(&mut self, number: u16, value: u32) {
        self.remove_option(number);
        self.add_uint_option(number, value);
    }

    /// Remove every occurrence of an option
    pub fn remove_option(&mut self, number: u16) {
        self.options.retain(|(n, _)| *n != number);
    }

    /// First value of an option
    pub fn option(&self, number: u16) -> Option<&Bytes> {
        self.options
            .iter()
            .find(|(n, _)| *n == number)
            .map(|(_, value)| value)
    }

    /// All values of a repeatable option, in order
    pub fn option_values(&self, number: u16) -> impl Iterator<Item = &Bytes> {
        self.options
            .iter()
            .filter(move |(n, _)| *n == number)
            .map(|(_, value)| value)
    }

    /// First value of an unsigned integer option
    pub fn uint_option(&self, number: u16) -> Result<Option<u32>> {
        self.option(number).map(|value| decode_uint(value)).transpose()
    }

    /// Set Uri-Path options from a slash separated path
    pub fn set_path(&mut self, path: &str) {
        self.remove_option(option::URI_PATH);
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            self.add_option(option::URI_PATH, Bytes::copy_from_slice(segment.as_bytes()));
        }
    }

    /// Path rebuilt from the Uri-Path options, with a leading slash
    pub fn path(&self) -> String {
        let mut path = String::new();
        for segment in self.option_values(option::URI_PATH) {
            path.push('/');
            path.push_str(&String::from_utf8_lossy(segment));
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }

    /// Declared content format, if any
    pub fn content_format(&self) -> Result<Option<ContentFormat>> {
        self.uint_option(option::CONTENT_FORMAT)?
            .map(|id| {
                u16::try_from(id).map(ContentFormat::from).map_err(|_| {
                    BridgeError::MalformedMessage(format!("content format {} out of range", id))
                })
            })
            .transpose()
    }

    /// Block2 option, if present
    pub fn block2(&self) -> Result<Option<BlockOption>> {
        self.uint_option(option::BLOCK2)?
            .map(BlockOption::from_value)
            .transpose()
    }

    /// Encode into a datagram
    pub fn encode(&self) -> Result<Bytes> {
        if self.token.len() > MAX_TOKEN_LENGTH {
            return Err(BridgeError::MalformedMessage(format!(
                "token of {} bytes exceeds {}",
                self.token.len(),
                MAX_TOKEN_LENGTH
            )));
        }

        let mut buf = BytesMut::with_capacity(4 + self.token.len() + self.payload.len() + 32);
        buf.put_u8((COAP_VERSION << 6) | ((self.message_type as u8) << 4) | self.token.len() as u8);
        buf.put_u8(self.code.into());
        buf.put_u16(self.message_id);
        buf.put_slice(&self.token);

        // Stable sort keeps repeated options (Uri-Path) in order
        let mut options: Vec<&(u16, Bytes)> = self.options.iter().collect();
        options.sort_by_key(|(number, _)| *number);

        let mut previous = 0u16;
        for (number, value) in options {
            let length = u16::try_from(value.len()).map_err(|_| {
                BridgeError::MalformedMessage(format!("option {} value too long", number))
            })?;
            let (delta_nibble, delta_ext) = split_extended(number - previous);
            let (length_nibble, length_ext) = split_extended(length);

            buf.put_u8((delta_nibble << 4) | length_nibble);
            put_extended(&mut buf, delta_nibble, delta_ext);
            put_extended(&mut buf, length_nibble, length_ext);
            buf.put_slice(value);
            previous = *number;
        }

        if !self.payload.is_empty() {
            buf.put_u8(PAYLOAD_MARKER);
            buf.put_slice(&self.payload);
        }

        Ok(buf.freeze())
    }

    /// Decode a datagram
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        if buf.remaining() < 4 {
            return Err(malformed("datagram shorter than header"));
        }

        let first = buf.get_u8();
        let version = first >> 6;
        if version != COAP_VERSION {
            return Err(BridgeError::MalformedMessage(format!(
                "unsupported version {}",
                version
            )));
        }
        let message_type = MessageType::from(first >> 4);
        let token_length = (first & 0x0F) as usize;
        if token_length > MAX_TOKEN_LENGTH {
            return Err(BridgeError::MalformedMessage(format!(
                "token length {} is reserved",
                token_length
            )));
        }
        let code = Code::from(buf.get_u8());
        let message_id = buf.get_u16();

        if code.is_empty() && data.len() != 4 {
            return Err(malformed("empty message with trailing bytes"));
        }
        if buf.remaining() < token_length {
            return Err(malformed("truncated token"));
        }
        let token = buf.copy_to_bytes(token_length);

        let mut message = Message::new(message_type, code, message_id, token);
        let mut previous = 0u16;
        while buf.has_remaining() {
            let header = buf.get_u8();
            if header == PAYLOAD_MARKER {
                if !buf.has_remaining() {
                    return Err(malformed("payload marker without payload"));
                }
                message.payload = buf.copy_to_bytes(buf.remaining());
                break;
            }

            let delta = read_extended(&mut buf, header >> 4)?;
            let length = read_extended(&mut buf, header & 0x0F)? as usize;
            let number = u16::try_from(u32::from(previous) + delta)
                .map_err(|_| malformed("option number overflow"))?;
            if buf.remaining() < length {
                return Err(malformed("truncated option value"));
            }
            message.options.push((number, buf.copy_to_bytes(length)));
            previous = number;
        }

        Ok(message)
    }
}

fn malformed(reason: &str) -> BridgeError {
    BridgeError::MalformedMessage(reason.to_string())
}

/// Split an option delta or length into its nibble and extension value
fn split_extended(value: u16) -> (u8, u16) {
    match value {
        0..=12 => (value as u8, 0),
        13..=268 => (13, value - 13),
        _ => (14, value - 269),
    }
}

fn put_extended(buf: &mut BytesMut, nibble: u8, extension: u16) {
    match nibble {
        13 => buf.put_u8(extension as u8),
        14 => buf.put_u16(extension),
        _ => {}
    }
}

fn read_extended(buf: &mut &[u8], nibble: u8) -> Result<u32> {
    match nibble {
        0..=12 => Ok(u32::from(nibble)),
        13 => {
            if buf.remaining() < 1 {
                return Err(malformed("truncated option extension"));
            }
            Ok(u32::from(buf.get_u8()) + 13)
        }
        14 => {
            if buf.remaining() < 2 {
                return Err(malformed("truncated option extension"));
            }
            Ok(u32::from(buf.get_u16()) + 269)
        }
        _ => Err(malformed("reserved option nibble 15")),
    }
}

/// Shortest big-endian encoding of an unsigned option value
pub fn encode_uint(value: u32) -> Bytes {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    Bytes::copy_from_slice(&bytes[skip..])
}

/// Decode an unsigned option value of up to four bytes
pub fn decode_uint(value: &[u8]) -> Result<u32> {
    if value.len() > 4 {
        return Err(malformed("uint option longer than 4 bytes"));
    }
    Ok(value.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
}

/// Random message ID for a new exchange
pub fn random_message_id() -> u16 {
    rand::random()
}

/// Random token for a new request
pub fn random_token() -> Bytes {
    let token: [u8; TOKEN_LENGTH] = rand::random();
    Bytes::copy_from_slice(&token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_display() {
        assert_eq!(Code::CONTENT.to_string(), "2.05");
        assert_eq!(Code::NOT_FOUND.to_string(), "4.04");
        assert_eq!(Code::new(5, 3).to_string(), "5.03");
        assert_eq!(Code::GET.to_string(), "0.01");
    }

    #[test]
    fn test_code_byte_conversion() {
        assert_eq!(u8::from(Code::CONTENT), 0x45);
        assert_eq!(Code::from(0x84), Code::NOT_FOUND);
        assert!(Code::from(0x01).is_request());
        assert!(Code::from(0x45).is_response());
        assert!(Code::from(0x00).is_empty());
    }

    #[test]
    fn test_encode_get_request() {
        let mut msg = Message::new(
            MessageType::Confirmable,
            Code::GET,
            0x1234,
            Bytes::from_static(&[0xAA, 0xBB]),
        );
        msg.set_path("/info");

        let encoded = msg.encode().unwrap();
        assert_eq!(
            &encoded[..],
            &[0x42, 0x01, 0x12, 0x34, 0xAA, 0xBB, 0xB4, b'i', b'n', b'f', b'o']
        );
    }

    #[test]
    fn test_decode_piggybacked_response() {
        // ACK 2.05, token 0x01, Content-Format 60, payload a1 61 78 01
        let data = [
            0x61, 0x45, 0x00, 0x07, 0x01, 0xC1, 0x3C, 0xFF, 0xA1, 0x61, 0x78, 0x01,
        ];
        let msg = Message::decode(&data).unwrap();

        assert_eq!(msg.message_type, MessageType::Acknowledgement);
        assert_eq!(msg.code, Code::CONTENT);
        assert_eq!(msg.message_id, 7);
        assert_eq!(&msg.token[..], &[0x01]);
        assert_eq!(msg.content_format().unwrap(), Some(ContentFormat::Cbor));
        assert_eq!(&msg.payload[..], &[0xA1, 0x61, 0x78, 0x01]);
    }

    #[test]
    fn test_extended_option_delta() {
        let mut msg = Message::new(MessageType::Confirmable, Code::GET, 1, Bytes::new());
        msg.add_uint_option(option::BLOCK2, 0x26);
        msg.add_option(300, Bytes::from_static(b"x"));

        let encoded = msg.encode().unwrap();
        // Block2: delta 23 -> nibble 13 + ext 10, length 1
        assert_eq!(&encoded[4..7], &[0xD1, 10, 0x26]);
        // Option 300: delta 277 -> nibble 14 + ext 8, length 1
        assert_eq!(&encoded[7..11], &[0xE1, 0x00, 0x08, b'x']);

        let decoded = Message::decode(&encoded).unwrap();
        assert_eq!(decoded.options, msg.options);
    }

    #[test]
    fn test_long_option_value() {
        let mut msg = Message::new(MessageType::Confirmable, Code::GET, 1, Bytes::new());
        let segment = "a".repeat(20);
        msg.set_path(&format!("/{}", segment));

        let encoded = msg.encode().unwrap();
        // Uri-Path: delta 11, length 20 -> nibble 13 + ext 7
        assert_eq!(&encoded[4..6], &[0xBD, 7]);
        assert_eq!(Message::decode(&encoded).unwrap().path(), format!("/{}", segment));
    }

    #[test]
    fn test_options_sorted_on_encode() {
        let mut msg = Message::new(MessageType::Confirmable, Code::GET, 1, Bytes::new());
        msg.add_uint_option(option::BLOCK2, 1);
        msg.set_path("/fs/init.lua");

        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.options[0].0, option::URI_PATH);
        assert_eq!(decoded.options[2].0, option::BLOCK2);
        assert_eq!(decoded.path(), "/fs/init.lua");
    }

    #[test]
    fn test_reserved_nibble_rejected() {
        let data = [0x40, 0x01, 0x00, 0x01, 0xF0];
        assert!(matches!(
            Message::decode(&data),
            Err(BridgeError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_payload_marker_without_payload_rejected() {
        let data = [0x40, 0x45, 0x00, 0x01, 0xFF];
        assert!(Message::decode(&data).is_err());
    }

    #[test]
    fn test_truncated_messages_rejected() {
        assert!(Message::decode(&[0x40, 0x01]).is_err());
        // TKL 4 with only two token bytes
        assert!(Message::decode(&[0x44, 0x01, 0x00, 0x01, 0xAA, 0xBB]).is_err());
        // Option length 3 with one byte left
        assert!(Message::decode(&[0x40, 0x45, 0x00, 0x01, 0xB3, b'a']).is_err());
        // Wrong version
        assert!(Message::decode(&[0x80, 0x45, 0x00, 0x01]).is_err());
    }

    #[test]
    fn test_empty_message_with_token_rejected() {
        assert!(Message::decode(&[0x61, 0x00, 0x00, 0x01, 0xAA]).is_err());
        let ack = Message::decode(&[0x60, 0x00, 0x00, 0x01]).unwrap();
        assert_eq!(ack, Message::empty_ack(1));
    }

    #[test]
    fn test_uint_encoding() {
        assert!(encode_uint(0).is_empty());
        assert_eq!(&encode_uint(60)[..], &[60]);
        assert_eq!(&encode_uint(0x0100)[..], &[0x01, 0x00]);
        assert_eq!(decode_uint(&[0x01, 0x00]).unwrap(), 256);
        assert_eq!(decode_uint(&[]).unwrap(), 0);
        assert!(decode_uint(&[1, 2, 3, 4, 5]).is_err());
    }

    #[test]
    fn test_block_option() {
        let block = BlockOption::from_value(0x2E).unwrap();
        assert_eq!(block.num, 2);
        assert!(block.more);
        assert_eq!(block.szx, 6);
        assert_eq!(block.size(), 1024);
        assert_eq!(block.to_value(), 0x2E);

        assert!(BlockOption::from_value(0x07).is_err());
    }

    #[test]
    fn test_wide_content_format_rejected() {
        let mut msg = Message::new(MessageType::Acknowledgement, Code::CONTENT, 1, Bytes::new());
        msg.add_uint_option(option::CONTENT_FORMAT, 0x1003C);

        let err = msg.content_format().unwrap_err();
        assert!(matches!(err, BridgeError::MalformedMessage(_)));
    }

    #[test]
    fn test_random_token_length() {
        assert_eq!(random_token().len(), TOKEN_LENGTH);
    }
}
