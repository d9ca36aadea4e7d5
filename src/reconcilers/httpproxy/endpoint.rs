// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Backend endpoint parsing.
//!
//! An `HTTPProxy` backend names its upstream as an absolute URL without path
//! (`https://10.0.0.1:8443`, `http://app.internal`). The parsed form tells the
//! builder which `EndpointSlice` address type to use, which port to publish,
//! and which `Host`/SNI the upstream expects.

use crate::errors::EndpointError;
use crate::constants::DEFAULT_HTTP_BACKEND_PORT;
use std::fmt;
use url::{Host, Url};

/// Upstream protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// `EndpointSlice` port name and app protocol.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// `EndpointSlice` address type of a backend host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressType {
    IPv4,
    IPv6,
    Fqdn,
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AddressType::IPv4 => "IPv4",
            AddressType::IPv6 => "IPv6",
            AddressType::Fqdn => "FQDN",
        })
    }
}

/// A validated backend endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedEndpoint {
    pub scheme: Scheme,
    /// Host as published in the `EndpointSlice` (IPv6 without brackets)
    pub host: String,
    pub address_type: AddressType,
    pub port: u16,
    /// `tls.hostname` override from the backend
    pub tls_hostname: Option<String>,
}

impl ParsedEndpoint {
    /// `Host` header (and SNI) the upstream expects, when it differs from
    /// whatever the client sent.
    ///
    /// The explicit `tls.hostname` wins; otherwise a DNS-named backend gets
    /// its own name. Bare-IP `http` backends have no virtual host.
    #[must_use]
    pub fn upstream_hostname(&self) -> Option<&str> {
        self.tls_hostname.as_deref().or(match self.address_type {
            AddressType::Fqdn => Some(self.host.as_str()),
            AddressType::IPv4 | AddressType::IPv6 => None,
        })
    }
}

/// Parse and validate a backend endpoint.
///
/// # Arguments
///
/// * `endpoint` - Absolute URL as written on the HTTPProxy
/// * `tls_hostname` - Optional `tls.hostname` of the backend
/// * `https_default_port` - Port used for `https` endpoints without one (443 or 8443)
///
/// # Errors
///
/// Returns [`EndpointError`] for invalid URLs, schemes other than `http`/`https`,
/// endpoints with a path, query or fragment, and `https` endpoints addressed by
/// IP without a `tls.hostname`.
pub fn parse_endpoint(
    endpoint: &str,
    tls_hostname: Option<&str>,
    https_default_port: u16,
) -> Result<ParsedEndpoint, EndpointError> {
    let url = Url::parse(endpoint).map_err(|e| EndpointError::InvalidUrl {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;

    let scheme = match url.scheme() {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        other => {
            return Err(EndpointError::UnsupportedScheme {
                endpoint: endpoint.to_string(),
                scheme: other.to_string(),
            })
        }
    };

    if !matches!(url.path(), "" | "/") || url.query().is_some() || url.fragment().is_some() {
        return Err(EndpointError::UnexpectedPath {
            endpoint: endpoint.to_string(),
        });
    }

    let (host, address_type) = match url.host() {
        Some(Host::Ipv4(ip)) => (ip.to_string(), AddressType::IPv4),
        Some(Host::Ipv6(ip)) => (ip.to_string(), AddressType::IPv6),
        Some(Host::Domain(name)) if !name.is_empty() => {
            (name.trim_end_matches('.').to_string(), AddressType::Fqdn)
        }
        _ => {
            return Err(EndpointError::MissingHost {
                endpoint: endpoint.to_string(),
            })
        }
    };

    let tls_hostname = tls_hostname
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(ToString::to_string);

    if scheme == Scheme::Https && address_type != AddressType::Fqdn && tls_hostname.is_none() {
        return Err(EndpointError::HttpsIpRequiresTlsHostname {
            endpoint: endpoint.to_string(),
        });
    }

    // `Url::port` is `None` when the port is the scheme default, so the
    // https policy port only applies when none was written.
    let port = url.port().unwrap_or(match scheme {
        Scheme::Http => DEFAULT_HTTP_BACKEND_PORT,
        Scheme::Https if has_explicit_default_port(endpoint, &url) => 443,
        Scheme::Https => https_default_port,
    });

    Ok(ParsedEndpoint {
        scheme,
        host,
        address_type,
        port,
        tls_hostname,
    })
}

/// `https://host:443` and `https://host` parse identically; look at the
/// authority text to tell them apart.
fn has_explicit_default_port(endpoint: &str, url: &Url) -> bool {
    let authority = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest)
        .split('/')
        .next()
        .unwrap_or_default();
    url.port().is_none() && authority.ends_with(":443")
}

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod endpoint_tests;
