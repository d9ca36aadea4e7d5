// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `cluster.rs`

#[cfg(test)]
mod tests {
    use crate::cluster::*;
    use kube::{Client, Config};

    fn offline_client() -> Client {
        let config = Config::new("http://127.0.0.1:1".parse().unwrap());
        Client::try_from(config).unwrap()
    }

    #[tokio::test]
    async fn test_get_cluster_by_name() {
        let mut manager = ClusterManager::default();
        manager.insert(Cluster::new("", offline_client()));
        manager.insert(Cluster::new("edge-west", offline_client()));

        assert_eq!(manager.get_cluster("edge-west").unwrap().name, "edge-west");
        assert!(manager.get_cluster("").is_some());
        assert!(manager.get_cluster("missing").is_none());
        assert_eq!(manager.names(), vec!["", "edge-west"]);
    }

    #[tokio::test]
    async fn test_upstream_clusters_defaults_to_local() {
        let mut manager = ClusterManager::default();
        manager.insert(Cluster::new("", offline_client()));
        manager.insert(Cluster::new("edge-west", offline_client()));

        let local = manager.upstream_clusters(&[]);
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].name, "");

        let named = manager.upstream_clusters(&["edge-west".to_string(), "gone".to_string()]);
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].name, "edge-west");
    }
}
