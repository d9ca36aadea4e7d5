// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Domain registry lookups.
//!
//! The Domain reconciler refreshes registration data through the pluggable
//! [`RegistryClient`] trait. [`rdap::RdapRegistryClient`] implements it over
//! RDAP; [`timeout::TimeoutRegistryClient`] wraps any client with a deadline
//! that surfaces as [`RegistryError::Timeout`], distinct from lookup failures.
//!
//! # Example
//!
//! ```rust,no_run
//! use network_services_operator::registry::{rdap::RdapRegistryClient, timeout::TimeoutRegistryClient, RegistryClient};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = TimeoutRegistryClient::new(
//!     RdapRegistryClient::new("https://rdap.org", None)?,
//!     Duration::from_secs(30),
//! );
//! let lookup = client.lookup_domain("example.com").await?;
//! println!("registrar: {:?}", lookup.registration.registrar);
//! # Ok(())
//! # }
//! ```

pub mod rdap;
pub mod timeout;

use crate::errors::RegistryError;
use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// Registration data of the registered domain covering a name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationData {
    /// The registered domain that was found (may be a parent of the queried name)
    pub domain: String,
    pub registrar: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Nameservers listed by the registry (apex delegation)
    pub nameservers: Vec<String>,
}

/// Result of [`RegistryClient::lookup_domain`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainLookup {
    pub registration: RegistrationData,
    /// Nameservers of the zone cut closest to the queried name
    pub nameservers: Vec<String>,
    /// Protocol the data came from (`rdap` or `whois`)
    pub source: String,
}

impl DomainLookup {
    /// Returns `true` when the queried name is itself the registered domain.
    #[must_use]
    pub fn is_apex(&self, queried: &str) -> bool {
        self.registration
            .domain
            .eq_ignore_ascii_case(queried.trim_end_matches('.'))
    }
}

/// Addresses of a nameserver host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameserverInfo {
    pub name: String,
    pub addresses: Vec<IpAddr>,
}

/// Holder of an IP network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpRegistrant {
    pub network_name: Option<String>,
    pub organization: Option<String>,
    pub start_address: Option<String>,
    pub end_address: Option<String>,
}

/// Registry (RDAP/WHOIS) lookups.
#[async_trait::async_trait]
pub trait RegistryClient: Send + Sync {
    /// Look up the registration covering `name`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::RateLimited`] when the registry asks us to slow down,
    /// [`RegistryError::NotFound`] when no parent of `name` is registered.
    async fn lookup_domain(&self, name: &str) -> Result<DomainLookup, RegistryError>;

    /// Look up a nameserver host.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`RegistryClient::lookup_domain`].
    async fn lookup_nameserver(&self, name: &str) -> Result<NameserverInfo, RegistryError>;

    /// Look up who holds the network containing `ip`.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`RegistryClient::lookup_domain`].
    async fn lookup_ip_registrant(&self, ip: IpAddr) -> Result<IpRegistrant, RegistryError>;
}

/// Names to query, most specific first, stopping at two labels.
///
/// `a.b.example.com` yields `a.b.example.com`, `b.example.com`, `example.com`.
#[must_use]
pub fn registrable_candidates(name: &str) -> Vec<String> {
    let labels: Vec<&str> = name
        .trim_end_matches('.')
        .split('.')
        .filter(|l| !l.is_empty())
        .collect();
    if labels.len() < 2 {
        return Vec::new();
    }
    (0..=labels.len() - 2)
        .map(|i| labels[i..].join(".").to_ascii_lowercase())
        .collect()
}

/// Pick the nameservers of the zone cut closest to the queried name.
///
/// A delegation at the name itself overrides the registry's apex nameservers.
#[must_use]
pub fn closest_zone_cut_nameservers(own: &[String], apex: &[String]) -> Vec<String> {
    if own.is_empty() {
        apex.to_vec()
    } else {
        own.to_vec()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
