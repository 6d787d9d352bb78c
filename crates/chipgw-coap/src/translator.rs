//! Payload translation between CoAP and HTTP/JSON
//!
//! Devices answer with raw payload bytes and a content format. This module
//! decodes those bytes and renders the result as the JSON body the HTTP side
//! expects.
//!
//! # Format Mapping
//!
//! | CoAP Content-Format | Decoded as | JSON body |
//! |---------------------|------------|-----------|
//! | `application/cbor` | first CBOR item (`serde_cbor::Value`) | equivalent JSON value |
//! | anything else | UTF-8 text | JSON string |
//!
//! CBOR byte strings have no JSON counterpart and are rendered as standard
//! base64 text wherever they occur, map keys included.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_cbor::Value as CborValue;
use serde_json::{Map, Number, Value as JsonValue};
use tracing::trace;

use crate::content_format::{is_cbor, APPLICATION_CBOR};
use crate::error::{BridgeError, Result};
use crate::status;

/// Content type set on HTTP responses carrying decoded CBOR
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Decoded device payload
#[derive(Debug, Clone, PartialEq)]
pub enum TranslatedPayload {
    /// Payload of any non-CBOR format, read as UTF-8
    Text(String),
    /// Payload declared as CBOR
    Structured(CborValue),
}

impl TranslatedPayload {
    /// JSON form of the payload
    pub fn to_json(&self) -> JsonValue {
        match self {
            TranslatedPayload::Text(text) => JsonValue::String(text.clone()),
            TranslatedPayload::Structured(value) => cbor_to_json(value),
        }
    }

    /// Serialized JSON body
    pub fn render(&self) -> Result<String> {
        serde_json::to_string(&self.to_json()).map_err(|e| BridgeError::Decode(e.to_string()))
    }
}

/// Decode payload bytes according to the declared content format
///
/// CBOR payloads yield their first well-formed item; bytes after it are
/// ignored. Any other format is read as UTF-8 with invalid sequences
/// replaced, so only CBOR decoding can fail.
pub fn decode_payload(content_format: &str, bytes: &[u8]) -> Result<TranslatedPayload> {
    if is_cbor(content_format) {
        let mut deserializer = serde_cbor::Deserializer::from_slice(bytes);
        let value = CborValue::deserialize(&mut deserializer)?;
        trace!(size = bytes.len(), "Decoded CBOR payload");
        Ok(TranslatedPayload::Structured(value))
    } else {
        Ok(TranslatedPayload::Text(String::from_utf8_lossy(bytes).into_owned()))
    }
}

/// Convert a CBOR value to JSON
pub fn cbor_to_json(value: &CborValue) -> JsonValue {
    match value {
        CborValue::Null => JsonValue::Null,
        CborValue::Bool(b) => JsonValue::Bool(*b),
        CborValue::Integer(i) => integer_to_json(*i),
        CborValue::Float(f) => float_to_json(*f),
        CborValue::Bytes(bytes) => JsonValue::String(STANDARD.encode(bytes)),
        CborValue::Text(text) => JsonValue::String(text.clone()),
        CborValue::Array(items) => JsonValue::Array(items.iter().map(cbor_to_json).collect()),
        CborValue::Map(entries) => {
            let mut object = Map::with_capacity(entries.len());
            for (key, value) in entries {
                object.insert(map_key(key), cbor_to_json(value));
            }
            JsonValue::Object(object)
        }
        CborValue::Tag(_, inner) => cbor_to_json(inner),
        _ => JsonValue::Null,
    }
}

fn integer_to_json(i: i128) -> JsonValue {
    if let Ok(v) = i64::try_from(i) {
        JsonValue::Number(v.into())
    } else if let Ok(v) = u64::try_from(i) {
        JsonValue::Number(v.into())
    } else {
        float_to_json(i as f64)
    }
}

fn float_to_json(f: f64) -> JsonValue {
    // Integral floats render without a fraction, as JavaScript clients expect
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        return JsonValue::Number((f as i64).into());
    }
    Number::from_f64(f)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// JSON object keys must be strings
fn map_key(key: &CborValue) -> String {
    match key {
        CborValue::Text(text) => text.clone(),
        CborValue::Bytes(bytes) => STANDARD.encode(bytes),
        other => match cbor_to_json(other) {
            JsonValue::String(s) => s,
            json => json.to_string(),
        },
    }
}

/// A device response with its payload decoded
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedResponse {
    /// Dotted status code, e.g. "2.05"
    pub code: String,
    /// Content format label, "text/plain" when the device declared none
    pub content_format: String,
    /// Decoded payload
    pub payload: TranslatedPayload,
}

impl TranslatedResponse {
    /// Whether the device reported success
    pub fn is_success(&self) -> bool {
        status::is_success(&self.code)
    }

    /// HTTP status equivalent to the device status
    pub fn http_status(&self) -> Result<u16> {
        status::http_status(&self.code)
    }

    /// Whether the payload was declared as CBOR
    pub fn is_cbor(&self) -> bool {
        self.content_format == APPLICATION_CBOR
    }

    /// Render as an HTTP response
    pub fn into_http(self) -> Result<HttpEquivalentResponse> {
        Ok(HttpEquivalentResponse {
            status: self.http_status()?,
            content_type: self.is_cbor().then_some(JSON_CONTENT_TYPE),
            body: self.payload.render()?,
            content_format: self.content_format,
        })
    }
}

/// What the gateway writes back to the HTTP client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpEquivalentResponse {
    /// HTTP status code
    pub status: u16,
    /// Content type override, set for CBOR sources
    pub content_type: Option<&'static str>,
    /// JSON body
    pub body: String,
    /// Content format the device used
    pub content_format: String,
}
