//! Status code mapping between CoAP and HTTP
//!
//! CoAP writes response codes as `class.detail` ("2.05"). The gateway maps
//! them to HTTP in two steps:
//!
//! 1. [`lookup_status`] consults a fixed table of the codes whose HTTP
//!    equivalent is not simply the digits of the dotted form.
//! 2. [`arithmetic_status`] computes `class * 100 + detail` for everything
//!    else. This is a heuristic that happens to line up for most 4.xx and
//!    5.xx codes ("4.04" → 404, "5.03" → 503); it is not defined by any
//!    protocol standard.

use crate::error::{BridgeError, Result};

/// Codes with an explicit HTTP mapping
const STATUS_TABLE: &[(&str, u16)] = &[
    ("2.05", 200),
    ("2.03", 204),
    ("2.04", 204),
    ("4.02", 400),
];

/// Whether a dotted code denotes success
pub fn is_success(code: &str) -> bool {
    code.starts_with('2')
}

/// Table lookup only
pub fn lookup_status(code: &str) -> Option<u16> {
    STATUS_TABLE
        .iter()
        .find(|(dotted, _)| *dotted == code)
        .map(|(_, status)| *status)
}

/// `class * 100 + detail`, or `None` if the code is not two dot-separated integers
pub fn arithmetic_status(code: &str) -> Option<u16> {
    let (class, detail) = code.split_once('.')?;
    let class: u16 = class.trim().parse().ok()?;
    let detail: u16 = detail.trim().parse().ok()?;
    class.checked_mul(100)?.checked_add(detail)
}

/// HTTP status for a dotted CoAP code: table first, arithmetic fallback second
pub fn http_status(code: &str) -> Result<u16> {
    let status = match lookup_status(code) {
        Some(status) => status,
        None => arithmetic_status(code).ok_or_else(|| BridgeError::InvalidStatus(code.to_string()))?,
    };

    if (100..=999).contains(&status) {
        Ok(status)
    } else {
        Err(BridgeError::InvalidStatus(code.to_string()))
    }
}
