// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deadline adapter for registry clients.

use super::{DomainLookup, IpRegistrant, NameserverInfo, RegistryClient};
use crate::errors::RegistryError;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use tracing::warn;

/// Races every lookup of the wrapped client against a deadline.
///
/// An elapsed deadline returns [`RegistryError::Timeout`], which callers treat
/// as "upstream is slow" rather than "upstream said no".
pub struct TimeoutRegistryClient<C> {
    inner: C,
    timeout: Duration,
}

impl<C: RegistryClient> TimeoutRegistryClient<C> {
    #[must_use]
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn run<T>(
        &self,
        name: &str,
        lookup: impl Future<Output = Result<T, RegistryError>> + Send,
    ) -> Result<T, RegistryError> {
        if let Ok(result) = tokio::time::timeout(self.timeout, lookup).await {
            result
        } else {
            warn!(name = %name, timeout_secs = self.timeout.as_secs(), "Registry lookup timed out");
            Err(RegistryError::Timeout {
                name: name.to_string(),
                timeout: self.timeout,
            })
        }
    }
}

#[async_trait::async_trait]
impl<C: RegistryClient> RegistryClient for TimeoutRegistryClient<C> {
    async fn lookup_domain(&self, name: &str) -> Result<DomainLookup, RegistryError> {
        self.run(name, self.inner.lookup_domain(name)).await
    }

    async fn lookup_nameserver(&self, name: &str) -> Result<NameserverInfo, RegistryError> {
        self.run(name, self.inner.lookup_nameserver(name)).await
    }

    async fn lookup_ip_registrant(&self, ip: IpAddr) -> Result<IpRegistrant, RegistryError> {
        self.run(&ip.to_string(), self.inner.lookup_ip_registrant(ip))
            .await
    }
}

#[cfg(test)]
#[path = "timeout_tests.rs"]
mod timeout_tests;
