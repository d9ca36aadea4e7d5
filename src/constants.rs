// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the network services operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for all operator-owned CRDs
pub const API_GROUP: &str = "networking.firestoned.io";

/// Kind name for `HTTPProxy` resource
pub const KIND_HTTP_PROXY: &str = "HTTPProxy";

/// Kind name for `Domain` resource
pub const KIND_DOMAIN: &str = "Domain";

/// Kind name for `Connector` resource
pub const KIND_CONNECTOR: &str = "Connector";

/// Kind name for `TrafficProtectionPolicy` resource
pub const KIND_TRAFFIC_PROTECTION_POLICY: &str = "TrafficProtectionPolicy";

/// Gateway API group
pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";

/// Kind name for Gateway API `Gateway`
pub const KIND_GATEWAY: &str = "Gateway";

/// Kind name for Gateway API `HTTPRoute`
pub const KIND_HTTP_ROUTE: &str = "HTTPRoute";

/// Envoy Gateway API group
pub const ENVOY_GATEWAY_API_GROUP: &str = "gateway.envoyproxy.io";

/// Kind name for Envoy Gateway `HTTPRouteFilter`
pub const KIND_HTTP_ROUTE_FILTER: &str = "HTTPRouteFilter";

/// Kind name for Envoy Gateway `EnvoyPatchPolicy`
pub const KIND_ENVOY_PATCH_POLICY: &str = "EnvoyPatchPolicy";

/// API group of `EndpointSlice` backend references
pub const DISCOVERY_API_GROUP: &str = "discovery.k8s.io";

/// Kind name for `EndpointSlice`
pub const KIND_ENDPOINT_SLICE: &str = "EndpointSlice";

/// Kind name for DNS operator `DNSRecordSet`
pub const KIND_DNS_RECORD_SET: &str = "DNSRecordSet";

/// Controller name reported in Gateway API ancestor statuses
pub const CONTROLLER_NAME: &str = "networking.firestoned.io/network-services-operator";

/// Field manager used for server-side apply and status writes
pub const FIELD_MANAGER: &str = "network-services-operator";

// ============================================================================
// Gateway Listener Constants
// ============================================================================

/// Name of the default plain HTTP listener on every managed Gateway
pub const DEFAULT_HTTP_LISTENER_NAME: &str = "default-http";

/// Name of the default HTTPS listener on every managed Gateway
pub const DEFAULT_HTTPS_LISTENER_NAME: &str = "default-https";

/// Port of the plain HTTP listeners
pub const HTTP_LISTENER_PORT: i32 = 80;

/// Port of the HTTPS listeners
pub const HTTPS_LISTENER_PORT: i32 = 443;

/// Default upstream port for `http://` backends without an explicit port
pub const DEFAULT_HTTP_BACKEND_PORT: u16 = 80;

/// Default upstream port for `https://` backends without an explicit port
pub const DEFAULT_HTTPS_BACKEND_PORT: u16 = 443;

/// Body returned by the direct-response filter when a connector tunnel is down
pub const TUNNEL_OFFLINE_BODY: &str = "Tunnel not online";

/// Status code returned by the direct-response filter when a connector tunnel is down
pub const TUNNEL_OFFLINE_STATUS_CODE: i32 = 503;

/// Envoy xDS type URL for route configuration patches
pub const ENVOY_ROUTE_CONFIGURATION_TYPE_URL: &str =
    "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";

/// Envoy xDS type URL for cluster patches
pub const ENVOY_CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";

// ============================================================================
// DNS Constants
// ============================================================================

/// Number of hex characters of the hostname hash used in `DNSRecordSet` names
pub const DNS_RECORD_NAME_HASH_LEN: usize = 8;

/// Default TTL for DNS records written by the operator (5 minutes)
pub const DEFAULT_DNS_RECORD_TTL_SECS: i64 = 300;

/// Default `app.kubernetes.io/managed-by` value for operator-owned DNS records
pub const DEFAULT_DNS_MANAGED_BY: &str = "network-services-operator";

// ============================================================================
// Domain Verification Constants
// ============================================================================

/// Default TXT record prefix for DNS ownership challenges
pub const DEFAULT_TXT_RECORD_PREFIX: &str = "_datum-custom-hostname";

/// Default URL path for HTTP ownership challenges (the domain UID is appended)
pub const DEFAULT_HTTP_TOKEN_PATH: &str = "/.well-known/datum-custom-hostname-challenge";

/// Length of generated verification tokens
pub const VERIFICATION_TOKEN_LENGTH: usize = 32;

/// Default timeout for DNS and HTTP verification lookups (10 seconds)
pub const DEFAULT_VERIFICATION_TIMEOUT_SECS: u64 = 10;

/// Default timeout for registry (RDAP/WHOIS) lookups (30 seconds)
pub const DEFAULT_REGISTRY_TIMEOUT_SECS: u64 = 30;

/// Default interval between registration refreshes (24 hours)
pub const DEFAULT_REGISTRATION_REFRESH_SECS: u64 = 86_400;

/// Default base backoff when a registry rate-limits without `Retry-After` (5 minutes)
pub const DEFAULT_RATE_LIMIT_BACKOFF_SECS: u64 = 300;

/// Default jitter applied to verification and registration schedules (percent)
pub const DEFAULT_JITTER_PERCENT: u8 = 10;

/// Default RDAP bootstrap service
pub const DEFAULT_RDAP_BASE_URL: &str = "https://rdap.org";

// ============================================================================
// Connector Constants
// ============================================================================

/// Default duration after which an unrenewed connector lease is considered expired
pub const DEFAULT_CONNECTOR_LEASE_DURATION_SECS: i32 = 30;

// ============================================================================
// Controller Error Handling Constants
// ============================================================================

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Requeue duration after an optimistic-concurrency conflict (1 second)
pub const CONFLICT_REQUEUE_DURATION_SECS: u64 = 1;

/// Smallest requeue the schedulers will ever ask for (1 second)
pub const MIN_REQUEUE_DURATION_SECS: u64 = 1;

/// Requeue interval for resources that are fully programmed (5 minutes)
pub const READY_REQUEUE_DURATION_SECS: u64 = 300;

/// Requeue interval for resources that are still converging (30 seconds)
pub const PENDING_REQUEUE_DURATION_SECS: u64 = 30;

/// Page size for list operations
pub const KUBE_LIST_PAGE_SIZE: u32 = 100;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
