// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all controllers.
//!
//! One [`Context`] exists per upstream cluster. Every controller of that
//! cluster receives an `Arc<Context>` holding:
//! - The upstream cluster client (user-authored resources and their dependents)
//! - The downstream cluster client (`EnvoyPatchPolicy` objects)
//! - The operator configuration
//! - Injected seams for time, DNS, HTTP and registry lookups
//!
//! Reconcilers never reach for process-wide clients; fakes substitute any
//! seam in tests.

use crate::clock::Clock;
use crate::cluster::Cluster;
use crate::config::OperatorConfig;
use crate::registry::RegistryClient;
use crate::verification::{DnsResolver, HttpFetcher};
use chrono::{DateTime, Utc};
use kube::Client;
use std::sync::Arc;

/// Shared context passed to all controllers of one upstream cluster.
#[derive(Clone)]
pub struct Context {
    /// Cluster the watched resources live in
    pub cluster: Cluster,

    /// Cluster `EnvoyPatchPolicy` objects are written to
    pub downstream: Cluster,

    /// Operator configuration
    pub config: Arc<OperatorConfig>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    /// TXT and NS lookups for domain verification
    pub dns_resolver: Arc<dyn DnsResolver>,

    /// HTTP GET for domain verification
    pub http_fetcher: Arc<dyn HttpFetcher>,

    /// Domain registration lookups
    pub registry: Arc<dyn RegistryClient>,
}

impl Context {
    /// Client of the upstream cluster.
    #[must_use]
    pub fn client(&self) -> Client {
        self.cluster.client.clone()
    }

    /// Client of the downstream cluster.
    #[must_use]
    pub fn downstream_client(&self) -> Client {
        self.downstream.client.clone()
    }

    /// Current time according to the injected clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Namespace downstream objects derived from `upstream_namespace` go to.
    #[must_use]
    pub fn downstream_namespace(&self, upstream_namespace: &str) -> String {
        self.config
            .downstream
            .namespace
            .clone()
            .unwrap_or_else(|| upstream_namespace.to_string())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cluster", &self.cluster)
            .field("downstream", &self.downstream)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
