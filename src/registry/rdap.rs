// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! RDAP implementation of [`RegistryClient`].
//!
//! Domain lookups walk from the queried name towards its two-label parent and
//! stop at the first name the registry knows. HTTP 429 maps to
//! [`RegistryError::RateLimited`] (honouring `Retry-After`), HTTP 404 to
//! [`RegistryError::NotFound`].

use super::{
    closest_zone_cut_nameservers, registrable_candidates, DomainLookup, IpRegistrant,
    NameserverInfo, RegistrationData, RegistryClient,
};
use crate::errors::RegistryError;
use crate::verification::{normalize_name, DnsResolver};
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const PROVIDER: &str = "rdap";
const RDAP_CONTENT_TYPE: &str = "application/rdap+json";

/// RDAP client.
pub struct RdapRegistryClient {
    http: reqwest::Client,
    base_url: String,
    resolver: Option<Arc<dyn DnsResolver>>,
}

impl RdapRegistryClient {
    /// Build a client against `base_url` (a bootstrap service such as
    /// `https://rdap.org`). When `resolver` is given, delegations below the
    /// registered domain are discovered through NS lookups.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        resolver: Option<Arc<dyn DnsResolver>>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::limited(5))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            resolver,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str, name: &str) -> Result<T, RegistryError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, "RDAP query");

        let response = self
            .http
            .get(&url)
            .header(ACCEPT, RDAP_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| RegistryError::Lookup {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| parse_retry_after(v, Utc::now()));
                Err(RegistryError::RateLimited {
                    provider: PROVIDER.to_string(),
                    retry_after,
                })
            }
            StatusCode::NOT_FOUND => Err(RegistryError::NotFound {
                name: name.to_string(),
            }),
            status if !status.is_success() => Err(RegistryError::Lookup {
                name: name.to_string(),
                reason: format!("HTTP {status}"),
            }),
            _ => response.json::<T>().await.map_err(|e| RegistryError::Lookup {
                name: name.to_string(),
                reason: format!("malformed response: {e}"),
            }),
        }
    }

    async fn delegated_nameservers(&self, name: &str) -> Vec<String> {
        let Some(resolver) = &self.resolver else {
            return Vec::new();
        };
        match resolver.lookup_ns(name).await {
            Ok(nameservers) => nameservers,
            Err(e) => {
                debug!(name = %name, error = %e, "No delegation at name");
                Vec::new()
            }
        }
    }
}

#[async_trait::async_trait]
impl RegistryClient for RdapRegistryClient {
    async fn lookup_domain(&self, name: &str) -> Result<DomainLookup, RegistryError> {
        let mut registration = None;
        for candidate in registrable_candidates(name) {
            match self
                .fetch::<RdapDomain>(&format!("domain/{candidate}"), &candidate)
                .await
            {
                Ok(doc) => {
                    registration = Some(doc.into_registration(&candidate));
                    break;
                }
                Err(RegistryError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        let registration = registration.ok_or_else(|| RegistryError::NotFound {
            name: name.to_string(),
        })?;

        let own = self.delegated_nameservers(name).await;
        Ok(DomainLookup {
            nameservers: closest_zone_cut_nameservers(&own, &registration.nameservers),
            registration,
            source: PROVIDER.to_string(),
        })
    }

    async fn lookup_nameserver(&self, name: &str) -> Result<NameserverInfo, RegistryError> {
        let doc: RdapNameserver = self.fetch(&format!("nameserver/{name}"), name).await?;
        let addresses = doc
            .ip_addresses
            .map(|ips| {
                ips.v4
                    .iter()
                    .chain(ips.v6.iter())
                    .filter_map(|ip| ip.parse().ok())
                    .collect()
            })
            .unwrap_or_default();
        Ok(NameserverInfo {
            name: normalize_name(&doc.ldh_name),
            addresses,
        })
    }

    async fn lookup_ip_registrant(&self, ip: IpAddr) -> Result<IpRegistrant, RegistryError> {
        let doc: RdapIpNetwork = self.fetch(&format!("ip/{ip}"), &ip.to_string()).await?;
        let organization = doc
            .entities
            .iter()
            .find(|e| e.roles.iter().any(|r| r == "registrant"))
            .and_then(|e| e.vcard_text("org").or_else(|| e.vcard_text("fn")));
        Ok(IpRegistrant {
            network_name: doc.name,
            organization,
            start_address: doc.start_address,
            end_address: doc.end_address,
        })
    }
}

/// Parse a `Retry-After` header: delta seconds or an HTTP date.
#[must_use]
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdapDomain {
    #[serde(default)]
    ldh_name: Option<String>,
    #[serde(default)]
    events: Vec<RdapEvent>,
    #[serde(default)]
    entities: Vec<RdapEntity>,
    #[serde(default)]
    nameservers: Vec<RdapNameserver>,
}

impl RdapDomain {
    fn into_registration(self, queried: &str) -> RegistrationData {
        let event = |action: &str| {
            self.events
                .iter()
                .find(|e| e.event_action == action)
                .and_then(|e| DateTime::parse_from_rfc3339(&e.event_date).ok())
                .map(|t| t.with_timezone(&Utc))
        };
        let mut nameservers: Vec<String> = self
            .nameservers
            .iter()
            .map(|ns| normalize_name(&ns.ldh_name))
            .collect();
        nameservers.sort();
        nameservers.dedup();

        RegistrationData {
            domain: self
                .ldh_name
                .as_deref()
                .map_or_else(|| queried.to_string(), normalize_name),
            registrar: self
                .entities
                .iter()
                .find(|e| e.roles.iter().any(|r| r == "registrar"))
                .and_then(|e| e.vcard_text("fn").or_else(|| e.handle.clone())),
            created_at: event("registration"),
            expires_at: event("expiration"),
            nameservers,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdapEvent {
    event_action: String,
    event_date: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdapEntity {
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    handle: Option<String>,
    #[serde(default)]
    vcard_array: Option<Value>,
}

impl RdapEntity {
    /// Text value of a jCard property (`["vcard", [[name, {}, "text", value], ...]]`).
    fn vcard_text(&self, property: &str) -> Option<String> {
        self.vcard_array
            .as_ref()?
            .get(1)?
            .as_array()?
            .iter()
            .find(|entry| entry.get(0).and_then(Value::as_str) == Some(property))?
            .get(3)?
            .as_str()
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdapNameserver {
    ldh_name: String,
    #[serde(default)]
    ip_addresses: Option<RdapIpAddresses>,
}

#[derive(Deserialize)]
struct RdapIpAddresses {
    #[serde(default)]
    v4: Vec<String>,
    #[serde(default)]
    v6: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdapIpNetwork {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    start_address: Option<String>,
    #[serde(default)]
    end_address: Option<String>,
    #[serde(default)]
    entities: Vec<RdapEntity>,
}

#[cfg(test)]
#[path = "rdap_tests.rs"]
mod rdap_tests;
