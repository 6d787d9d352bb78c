//! Outbound request model
//!
//! An [`OutboundRequest`] is built once per inbound HTTP call and consumed by
//! the bridge. This module also turns the request's target address into a
//! socket address and its method into a CoAP method code.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::error::{BridgeError, Result};
use crate::message::Code;

/// CoAP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// FETCH (RFC 8132)
    Fetch,
    /// PATCH (RFC 8132)
    Patch,
    /// iPATCH (RFC 8132)
    IPatch,
}

impl Method {
    /// CoAP method code
    pub fn code(&self) -> Code {
        match self {
            Method::Get => Code::GET,
            Method::Post => Code::POST,
            Method::Put => Code::PUT,
            Method::Delete => Code::DELETE,
            Method::Fetch => Code::FETCH,
            Method::Patch => Code::PATCH,
            Method::IPatch => Code::IPATCH,
        }
    }

    /// Upper-case method name
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Fetch => "FETCH",
            Method::Patch => "PATCH",
            Method::IPatch => "IPATCH",
        }
    }
}

impl FromStr for Method {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "FETCH" => Ok(Method::Fetch),
            "PATCH" => Ok(Method::Patch),
            "IPATCH" => Ok(Method::IPatch),
            _ => Err(BridgeError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to forward to a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    /// Device address as given in the inbound URL
    pub target_address: String,
    /// Resource path, with a leading slash
    pub path: String,
    /// Request method
    pub method: Method,
}

impl OutboundRequest {
    /// Create a request, normalising the path to start with a slash
    pub fn new(target_address: impl Into<String>, path: impl Into<String>, method: Method) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };

        Self {
            target_address: target_address.into(),
            path,
            method,
        }
    }

    /// Parse the method from its HTTP name
    pub fn with_method_name(
        target_address: impl Into<String>,
        path: impl Into<String>,
        method: &str,
    ) -> Result<Self> {
        Ok(Self::new(target_address, path, method.parse()?))
    }

    /// The equivalent `coap://` URI, for logging
    pub fn uri(&self) -> String {
        let bare_ipv6 = self.target_address.matches(':').count() > 1;
        if bare_ipv6 && !self.target_address.starts_with('[') {
            format!("coap://[{}]{}", self.target_address, self.path)
        } else {
            format!("coap://{}{}", self.target_address, self.path)
        }
    }
}

/// A target address split into host and optional port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddress {
    /// IP literal
    Ip(IpAddr, Option<u16>),
    /// Host name to resolve
    Host(String, Option<u16>),
}

impl TargetAddress {
    /// Parse the forms accepted in the first URL segment:
    /// `fdbf::1`, `[fdbf::1]`, `[fdbf::1]:5684`, `10.0.0.7`, `10.0.0.7:5684`,
    /// `device.local` and `device.local:5684`.
    pub fn parse(target: &str) -> Result<Self> {
        let target = target.trim();
        if target.is_empty() {
            return Err(BridgeError::InvalidTarget("empty target address".to_string()));
        }

        if let Some(rest) = target.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| BridgeError::InvalidTarget(format!("unclosed bracket in {}", target)))?;
            let ip: IpAddr = host
                .parse()
                .map_err(|_| BridgeError::InvalidTarget(format!("invalid IPv6 literal {}", host)))?;
            let port = match after {
                "" => None,
                _ => Some(parse_port(after.strip_prefix(':').unwrap_or(after), target)?),
            };
            return Ok(TargetAddress::Ip(ip, port));
        }

        if let Ok(ip) = target.parse::<IpAddr>() {
            return Ok(TargetAddress::Ip(ip, None));
        }

        if let Ok(addr) = target.parse::<SocketAddr>() {
            return Ok(TargetAddress::Ip(addr.ip(), Some(addr.port())));
        }

        let (host, port) = match target.rsplit_once(':') {
            Some((host, port)) => (host, Some(parse_port(port, target)?)),
            None => (target, None),
        };
        if host.is_empty() || host.contains(':') || host.contains('/') {
            return Err(BridgeError::InvalidTarget(format!("invalid host {}", target)));
        }
        Ok(TargetAddress::Host(host.to_string(), port))
    }

    /// Resolve to a socket address, using `default_port` when none was given
    pub async fn resolve(&self, default_port: u16) -> Result<SocketAddr> {
        match self {
            TargetAddress::Ip(ip, port) => Ok(SocketAddr::new(*ip, port.unwrap_or(default_port))),
            TargetAddress::Host(host, port) => {
                let port = port.unwrap_or(default_port);
                let mut addrs = tokio::net::lookup_host((host.as_str(), port))
                    .await
                    .map_err(|e| BridgeError::InvalidTarget(format!("cannot resolve {}: {}", host, e)))?;
                addrs
                    .next()
                    .ok_or_else(|| BridgeError::InvalidTarget(format!("no address for {}", host)))
            }
        }
    }
}

fn parse_port(port: &str, target: &str) -> Result<u16> {
    port.parse()
        .map_err(|_| BridgeError::InvalidTarget(format!("invalid port in {}", target)))
}
