//! CoAP Content-Format registry
//!
//! Devices declare payload encodings with a numeric Content-Format option.
//! The gateway reports formats by label (`application/cbor`, `text/plain`)
//! and falls back to the decimal id for formats it does not know.

use std::fmt;

/// Label reported when a response carries no Content-Format option
pub const TEXT_PLAIN: &str = "text/plain";

/// Label of the CBOR content format
pub const APPLICATION_CBOR: &str = "application/cbor";

/// Content formats known to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentFormat {
    /// 0, text/plain;charset=utf-8
    TextPlain,
    /// 40
    LinkFormat,
    /// 41
    Xml,
    /// 42
    OctetStream,
    /// 47
    Exi,
    /// 50
    Json,
    /// 60
    Cbor,
    /// Any other registered id
    Other(u16),
}

impl ContentFormat {
    /// Numeric Content-Format id
    pub fn id(&self) -> u16 {
        match self {
            ContentFormat::TextPlain => 0,
            ContentFormat::LinkFormat => 40,
            ContentFormat::Xml => 41,
            ContentFormat::OctetStream => 42,
            ContentFormat::Exi => 47,
            ContentFormat::Json => 50,
            ContentFormat::Cbor => 60,
            ContentFormat::Other(id) => *id,
        }
    }

    /// MIME-like label for this format
    pub fn label(&self) -> String {
        match self {
            ContentFormat::TextPlain => TEXT_PLAIN.to_string(),
            ContentFormat::LinkFormat => "application/link-format".to_string(),
            ContentFormat::Xml => "application/xml".to_string(),
            ContentFormat::OctetStream => "application/octet-stream".to_string(),
            ContentFormat::Exi => "application/exi".to_string(),
            ContentFormat::Json => "application/json".to_string(),
            ContentFormat::Cbor => APPLICATION_CBOR.to_string(),
            ContentFormat::Other(id) => id.to_string(),
        }
    }
}

impl From<u16> for ContentFormat {
    fn from(id: u16) -> Self {
        match id {
            0 => Self::TextPlain,
            40 => Self::LinkFormat,
            41 => Self::Xml,
            42 => Self::OctetStream,
            47 => Self::Exi,
            50 => Self::Json,
            60 => Self::Cbor,
            other => Self::Other(other),
        }
    }
}

impl From<ContentFormat> for u16 {
    fn from(format: ContentFormat) -> Self {
        format.id()
    }
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Whether a content format label denotes CBOR
pub fn is_cbor(label: &str) -> bool {
    label == APPLICATION_CBOR
}
