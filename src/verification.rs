// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Domain ownership verification primitives.
//!
//! The Domain reconciler checks ownership through two injected seams:
//!
//! - [`DnsResolver`] looks up the TXT records of the challenge name (and the
//!   NS records of the domain, used to find the closest zone cut).
//! - [`HttpFetcher`] fetches the HTTP challenge URL.
//!
//! Production implementations use `hickory-resolver` and `reqwest`; tests
//! substitute deterministic fakes. Both implementations classify failures into
//! [`VerificationError`] so the state machine can tell "not published yet"
//! from "try again later" from "something is broken".

use crate::errors::VerificationError;
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;
use std::time::Duration;
use tracing::debug;

/// Looks up DNS records.
#[async_trait::async_trait]
pub trait DnsResolver: Send + Sync {
    /// Return every TXT string published at `name`.
    ///
    /// # Errors
    ///
    /// [`VerificationError::RecordNotFound`] when the name has no TXT records,
    /// [`VerificationError::Transient`] for timeouts and server failures.
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, VerificationError>;

    /// Return the nameservers delegated exactly at `name` (no parent walk),
    /// lowercased and without trailing dot.
    ///
    /// # Errors
    ///
    /// [`VerificationError::RecordNotFound`] when `name` is not a zone cut.
    async fn lookup_ns(&self, name: &str) -> Result<Vec<String>, VerificationError>;
}

/// Response of an HTTP challenge fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Fetches HTTP challenge URLs.
#[async_trait::async_trait]
pub trait HttpFetcher: Send + Sync {
    /// GET `url`.
    ///
    /// # Errors
    ///
    /// [`VerificationError::Transient`] for connection failures and timeouts.
    async fn get(&self, url: &str) -> Result<HttpResponse, VerificationError>;
}

/// [`DnsResolver`] backed by the system resolver configuration.
pub struct HickoryDnsResolver {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl HickoryDnsResolver {
    /// Build a resolver from `/etc/resolv.conf`.
    ///
    /// # Errors
    ///
    /// Returns an error if the system resolver configuration cannot be read.
    pub fn from_system_conf(timeout: Duration) -> Result<Self, ResolveError> {
        Ok(Self {
            resolver: TokioAsyncResolver::tokio_from_system_conf()?,
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl DnsResolver for HickoryDnsResolver {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, VerificationError> {
        let lookup = tokio::time::timeout(self.timeout, self.resolver.txt_lookup(name))
            .await
            .map_err(|_| VerificationError::Transient {
                name: name.to_string(),
                reason: format!("lookup timed out after {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| classify_resolve_error(name, &e))?;

        let records: Vec<String> = lookup
            .iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                    .collect::<String>()
            })
            .collect();
        debug!(name = %name, count = records.len(), "TXT lookup complete");
        Ok(records)
    }

    async fn lookup_ns(&self, name: &str) -> Result<Vec<String>, VerificationError> {
        let lookup = tokio::time::timeout(self.timeout, self.resolver.ns_lookup(name))
            .await
            .map_err(|_| VerificationError::Transient {
                name: name.to_string(),
                reason: format!("lookup timed out after {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| classify_resolve_error(name, &e))?;

        let mut nameservers: Vec<String> = lookup
            .iter()
            .map(|ns| normalize_name(&ns.0.to_utf8()))
            .collect();
        nameservers.sort();
        nameservers.dedup();
        Ok(nameservers)
    }
}

/// Lowercase a DNS name and strip the trailing dot.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Map a resolver error onto the verification taxonomy.
#[must_use]
pub fn classify_resolve_error(name: &str, err: &ResolveError) -> VerificationError {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => VerificationError::RecordNotFound {
            name: name.to_string(),
        },
        ResolveErrorKind::Timeout | ResolveErrorKind::Io(_) | ResolveErrorKind::Proto(_) => {
            VerificationError::Transient {
                name: name.to_string(),
                reason: err.to_string(),
            }
        }
        _ => VerificationError::Internal {
            name: name.to_string(),
            reason: err.to_string(),
        },
    }
}

/// [`HttpFetcher`] backed by `reqwest`.
pub struct ReqwestHttpFetcher {
    client: reqwest::Client,
}

impl ReqwestHttpFetcher {
    /// Build a fetcher whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .redirect(reqwest::redirect::Policy::limited(5))
                .build()?,
        })
    }
}

#[async_trait::async_trait]
impl HttpFetcher for ReqwestHttpFetcher {
    async fn get(&self, url: &str) -> Result<HttpResponse, VerificationError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_builder() {
                VerificationError::Internal {
                    name: url.to_string(),
                    reason: e.to_string(),
                }
            } else {
                VerificationError::Transient {
                    name: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| VerificationError::Transient {
                name: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
#[path = "verification_tests.rs"]
mod verification_tests;
