// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Multi-cluster client accessor.
//!
//! Upstream clusters hold the user-authored resources (`HTTPProxy`, `Domain`,
//! ...). The downstream cluster receives objects the data plane consumes
//! directly (`EnvoyPatchPolicy`). Each is addressed by the kube context name
//! it was loaded from; the empty name is the in-cluster (or default
//! kubeconfig) client.

use anyhow::{Context as _, Result};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// A named Kubernetes API client.
#[derive(Clone)]
pub struct Cluster {
    /// Kube context name; empty for the in-cluster client
    pub name: String,
    pub client: Client,
}

impl Cluster {
    #[must_use]
    pub fn new(name: impl Into<String>, client: Client) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster").field("name", &self.name).finish()
    }
}

/// Clients for every cluster the operator talks to, keyed by context name.
#[derive(Clone, Debug, Default)]
pub struct ClusterManager {
    clusters: BTreeMap<String, Cluster>,
}

impl ClusterManager {
    /// Build clients for the given kube contexts plus the default client.
    ///
    /// The default client (`Client::try_default`) is always registered under
    /// the empty name.
    ///
    /// # Errors
    ///
    /// Returns an error if any context cannot be loaded from the kubeconfig or
    /// its client cannot be built.
    pub async fn from_contexts(contexts: &[String]) -> Result<Self> {
        let mut manager = Self::default();

        debug!("Initializing default Kubernetes client");
        let default = Client::try_default()
            .await
            .context("building default Kubernetes client")?;
        manager.insert(Cluster::new("", default));

        for context in contexts.iter().filter(|c| !c.is_empty()) {
            let options = KubeConfigOptions {
                context: Some(context.clone()),
                ..Default::default()
            };
            let config = Config::from_kubeconfig(&options)
                .await
                .with_context(|| format!("loading kube context '{context}'"))?;
            let client = Client::try_from(config)
                .with_context(|| format!("building client for kube context '{context}'"))?;
            info!(context = %context, "Registered cluster");
            manager.insert(Cluster::new(context.clone(), client));
        }

        Ok(manager)
    }

    /// Register (or replace) a cluster.
    pub fn insert(&mut self, cluster: Cluster) {
        self.clusters.insert(cluster.name.clone(), cluster);
    }

    /// The cluster loaded from `name`; `""` is the default client.
    #[must_use]
    pub fn get_cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.get(name)
    }

    /// Clusters to run controllers against.
    ///
    /// When `upstream` is empty this is the default client alone.
    #[must_use]
    pub fn upstream_clusters(&self, upstream: &[String]) -> Vec<Cluster> {
        if upstream.is_empty() {
            return self.get_cluster("").cloned().into_iter().collect();
        }
        upstream
            .iter()
            .filter_map(|name| self.get_cluster(name).cloned())
            .collect()
    }

    /// Names of all registered clusters.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.clusters.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod cluster_tests;
