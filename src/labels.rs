// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! This module defines standard Kubernetes labels and operator-specific labels/annotations
//! to ensure consistency across all resources created by the controller.

use std::collections::BTreeMap;

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

/// Label tying an `EndpointSlice` to the (virtual) service it backs
pub const K8S_SERVICE_NAME: &str = "kubernetes.io/service-name";

/// Label identifying the controller that manages an `EndpointSlice`
pub const K8S_ENDPOINT_SLICE_MANAGED_BY: &str = "endpointslice.kubernetes.io/managed-by";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/part-of` on every object this operator creates
pub const PART_OF_NETWORK_SERVICES: &str = "network-services-operator";

/// Value for `endpointslice.kubernetes.io/managed-by`
pub const ENDPOINT_SLICE_MANAGER: &str = "networking.firestoned.io/httpproxy";

// ============================================================================
// Source Labels (DNS records)
// ============================================================================

/// Kind of the object a `DNSRecordSet` was derived from
pub const SOURCE_KIND_LABEL: &str = "networking.firestoned.io/source-kind";

/// Name of the object a `DNSRecordSet` was derived from
pub const SOURCE_NAME_LABEL: &str = "networking.firestoned.io/source-name";

/// Namespace of the object a `DNSRecordSet` was derived from
pub const SOURCE_NAMESPACE_LABEL: &str = "networking.firestoned.io/source-namespace";

/// Annotation carrying the hostname a `DNSRecordSet` publishes
pub const HOSTNAME_ANNOTATION: &str = "networking.firestoned.io/hostname";

// ============================================================================
// Upstream Labels (objects written to the downstream cluster)
// ============================================================================

/// Name of the upstream cluster an object was derived from
pub const UPSTREAM_CLUSTER_LABEL: &str = "networking.firestoned.io/upstream-cluster";

/// Kind of the upstream object a downstream object was derived from
pub const UPSTREAM_KIND_LABEL: &str = "networking.firestoned.io/upstream-kind";

/// Name of the upstream object a downstream object was derived from
pub const UPSTREAM_NAME_LABEL: &str = "networking.firestoned.io/upstream-name";

/// Namespace of the upstream object a downstream object was derived from
pub const UPSTREAM_NAMESPACE_LABEL: &str = "networking.firestoned.io/upstream-namespace";

// ============================================================================
// ACME Challenge Labels
// ============================================================================

/// Name of the cert-manager `Challenge` an HTTP-01 solver route serves
pub const ACME_CHALLENGE_NAME_LABEL: &str = "networking.firestoned.io/acme-challenge-name";

/// Namespace of the cert-manager `Challenge` an HTTP-01 solver route serves
pub const ACME_CHALLENGE_NAMESPACE_LABEL: &str =
    "networking.firestoned.io/acme-challenge-namespace";

// ============================================================================
// Annotations
// ============================================================================

/// Annotation cert-manager sets on HTTP-01 challenges naming the solver gateway
pub const ACME_GATEWAY_ANNOTATION: &str = "networking.firestoned.io/acme-gateway";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer for `HTTPProxy` resources (removes downstream patch policies)
pub const FINALIZER_HTTP_PROXY: &str = "networking.firestoned.io/httpproxy-finalizer";

/// Finalizer for `TrafficProtectionPolicy` resources (recomputes gateway patches)
pub const FINALIZER_TRAFFIC_PROTECTION_POLICY: &str =
    "networking.firestoned.io/trafficprotectionpolicy-finalizer";

/// Build the label set tying a `DNSRecordSet` to its source object.
#[must_use]
pub fn dns_source_labels(
    managed_by: &str,
    source_kind: &str,
    source_name: &str,
    source_namespace: &str,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_MANAGED_BY.to_string(), managed_by.to_string()),
        (SOURCE_KIND_LABEL.to_string(), source_kind.to_string()),
        (SOURCE_NAME_LABEL.to_string(), source_name.to_string()),
        (SOURCE_NAMESPACE_LABEL.to_string(), source_namespace.to_string()),
    ])
}

/// Build the label set identifying an upstream object on a downstream object.
#[must_use]
pub fn upstream_labels(
    cluster: &str,
    kind: &str,
    name: &str,
    namespace: &str,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_PART_OF.to_string(), PART_OF_NETWORK_SERVICES.to_string()),
        (UPSTREAM_CLUSTER_LABEL.to_string(), cluster_label_value(cluster)),
        (UPSTREAM_KIND_LABEL.to_string(), kind.to_string()),
        (UPSTREAM_NAME_LABEL.to_string(), name.to_string()),
        (UPSTREAM_NAMESPACE_LABEL.to_string(), namespace.to_string()),
    ])
}

/// Render a label selector string (`k1=v1,k2=v2`) from a label map.
#[must_use]
pub fn selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Label values cannot be empty strings in selectors that should match the
/// in-cluster client, so the unnamed cluster is written as `local`.
fn cluster_label_value(cluster: &str) -> String {
    if cluster.is_empty() {
        "local".to_string()
    } else {
        cluster.to_string()
    }
}

#[cfg(test)]
#[path = "labels_tests.rs"]
mod labels_tests;
