// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) owned by the network services operator.
//!
//! # Resource Types
//!
//! ## Traffic
//!
//! - [`HTTPProxy`] - Hostnames and routing rules, reconciled into a Gateway,
//!   an HTTPRoute and EndpointSlices
//! - [`TrafficProtectionPolicy`] - WAF (Coraza / OWASP CRS) settings attached
//!   to Gateways, listeners, HTTPRoutes or route rules
//!
//! ## Ownership
//!
//! - [`Domain`] - A domain name, its ownership verification and registration data
//!
//! ## Tunnels
//!
//! - [`ConnectorClass`] - Cluster-scoped class naming the connector implementation
//! - [`Connector`] - A tunnel endpoint that backends can route through
//!
//! # Example: Creating an HTTPProxy
//!
//! ```rust,no_run
//! use network_services_operator::crd::{HTTPProxyRule, HTTPProxyRuleBackend, HTTPProxySpec};
//!
//! let spec = HTTPProxySpec {
//!     hostnames: vec!["app.example.com".to_string()],
//!     rules: vec![HTTPProxyRule {
//!         backends: vec![HTTPProxyRuleBackend {
//!             endpoint: "https://backend.internal:8443".to_string(),
//!             ..Default::default()
//!         }],
//!         ..Default::default()
//!     }],
//! };
//! ```

use crate::gateway_api::{HTTPRouteFilter, HTTPRouteMatch};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition represents an observation of a resource's current state.
///
/// Conditions are upserted by type: writing a condition whose status, reason,
/// message and observed generation match the existing one is a no-op, and
/// `lastTransitionTime` only moves when the status flips.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition, e.g. `Accepted`, `Programmed`, `Ready`.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(default)]
    pub reason: String,

    /// Human-readable message indicating details about the transition.
    #[serde(default)]
    pub message: String,

    /// Generation of the resource this condition was computed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

// ============================================================================
// HTTPProxy
// ============================================================================

/// `HTTPProxy` exposes backends on one or more hostnames.
///
/// # Example
///
/// ```yaml
/// apiVersion: networking.firestoned.io/v1alpha
/// kind: HTTPProxy
/// metadata:
///   name: web
///   namespace: default
/// spec:
///   hostnames:
///     - app.example.com
///   rules:
///     - name: api
///       matches:
///         - path:
///             type: PathPrefix
///             value: /api
///       backends:
///         - endpoint: https://10.0.0.12
///           tls:
///             hostname: api.internal
///     - backends:
///         - endpoint: http://localhost:3000
///           connector:
///             name: laptop
/// ```
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "networking.firestoned.io",
    version = "v1alpha",
    kind = "HTTPProxy",
    plural = "httpproxies",
    shortname = "hp",
    namespaced,
    doc = "HTTPProxy routes requests for a set of hostnames to backend endpoints, optionally through a Connector tunnel.",
    printcolumn = r#"{"name":"Hostnames","type":"string","jsonPath":".status.hostnames"}"#,
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type=='Programmed')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "HTTPProxyStatus")]
#[serde(rename_all = "camelCase")]
pub struct HTTPProxySpec {
    /// Custom hostnames the proxy answers on, in addition to its canonical hostname.
    #[serde(default)]
    pub hostnames: Vec<String>,

    /// Routing rules, evaluated in Gateway API order.
    pub rules: Vec<HTTPProxyRule>,
}

/// One routing rule of an `HTTPProxy`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPProxyRule {
    /// Rule name, addressable as an HTTPRoute rule section name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Request matches; empty matches every request.
    #[serde(default)]
    pub matches: Vec<HTTPRouteMatch>,

    /// Filters applied to every request of the rule.
    #[serde(default)]
    pub filters: Vec<HTTPRouteFilter>,

    /// Backends requests are forwarded to.
    #[serde(default)]
    pub backends: Vec<HTTPProxyRuleBackend>,
}

/// A backend of an `HTTPProxy` rule.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPProxyRuleBackend {
    /// Absolute `http://` or `https://` URL without path, e.g. `https://10.0.0.1:8443`.
    pub endpoint: String,

    /// Route this backend through a tunnel instead of connecting directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<ConnectorReference>,

    /// Upstream TLS settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<BackendTLS>,

    /// Filters applied to requests sent to this backend.
    #[serde(default)]
    pub filters: Vec<HTTPRouteFilter>,
}

/// Reference to a `Connector` in the same namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConnectorReference {
    pub name: String,
}

/// Upstream TLS settings of a backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackendTLS {
    /// SNI and `Host` presented upstream. Required for `https://` endpoints
    /// addressed by IP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// `HTTPProxy` status
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPProxyStatus {
    /// Addresses copied from the Gateway status.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<ProxyAddress>,

    /// Canonical hostname followed by the custom hostnames.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// An address the proxy is reachable on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProxyAddress {
    /// `IPAddress` or `Hostname`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub address_type: Option<String>,
    pub value: String,
}

// ============================================================================
// Domain
// ============================================================================

/// `Domain` proves ownership of a domain name and tracks its registration.
///
/// # Example
///
/// ```yaml
/// apiVersion: networking.firestoned.io/v1alpha
/// kind: Domain
/// metadata:
///   name: example-com
/// spec:
///   domainName: example.com
/// ```
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "networking.firestoned.io",
    version = "v1alpha",
    kind = "Domain",
    namespaced,
    doc = "Domain represents a domain name whose ownership is verified through DNS or HTTP challenges.",
    printcolumn = r#"{"name":"Domain","type":"string","jsonPath":".spec.domainName"}"#,
    printcolumn = r#"{"name":"Verified","type":"string","jsonPath":".status.conditions[?(@.type=='Verified')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "DomainStatus")]
#[serde(rename_all = "camelCase")]
pub struct DomainSpec {
    /// Fully qualified domain name, without trailing dot.
    #[schemars(regex(
        pattern = r"^([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$"
    ))]
    pub domain_name: String,

    /// Request a registration refresh no earlier than this RFC3339 time.
    /// Honored once, when the last refresh predates it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_registration_refresh_attempt: Option<String>,
}

/// `Domain` status
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<DomainVerificationStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<Registration>,

    /// `true` when the domain is a registrable apex (e.g. `example.com`).
    #[serde(default)]
    pub apex: bool,

    /// Nameservers authoritative for the domain (closest zone cut).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Challenges a user publishes to prove ownership.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainVerificationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_record: Option<DNSVerificationRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_token: Option<HTTPVerificationToken>,

    /// RFC3339 time of the next verification attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_verification_attempt: Option<String>,

    /// Number of failed verification attempts so far.
    #[serde(default)]
    pub attempts: u32,
}

/// DNS TXT record to publish.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DNSVerificationRecord {
    pub name: String,
    pub r#type: String,
    pub content: String,
}

/// HTTP token to serve.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HTTPVerificationToken {
    pub url: String,
    pub body: String,
}

/// Registration data from the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registrar: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,

    /// Registry protocol the data came from (`rdap` or `whois`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh_attempt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_refresh_attempt: Option<String>,
}

// ============================================================================
// Connectors
// ============================================================================

/// `ConnectorClass` names the implementation responsible for connectors.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "networking.firestoned.io",
    version = "v1alpha",
    kind = "ConnectorClass",
    doc = "ConnectorClass is a cluster-scoped class of Connectors."
)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorClassSpec {
    /// Controller implementing connectors of this class.
    pub controller_name: String,
}

/// `Connector` is a tunnel endpoint backends can route through.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "networking.firestoned.io",
    version = "v1alpha",
    kind = "Connector",
    namespaced,
    doc = "Connector is a tunnel endpoint that HTTPProxy backends can route through.",
    printcolumn = r#"{"name":"Class","type":"string","jsonPath":".spec.connectorClassName"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#
)]
#[kube(status = "ConnectorStatus")]
#[serde(rename_all = "camelCase")]
pub struct ConnectorSpec {
    pub connector_class_name: String,
}

/// `Connector` status
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorStatus {
    /// Published by the connector agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_details: Option<ConnectionDetails>,

    /// Lease the agent renews while connected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_ref: Option<LeaseReference>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// How to reach a connector.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKeyConnectionDetails>,
}

/// Public-key addressed connector.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyConnectionDetails {
    /// Endpoint identifier (public key)
    pub id: String,

    /// Relay URL the connector is reachable through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_relay: Option<String>,

    /// Direct addresses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<PublicKeyDiscoveryAddress>,
}

/// Direct address of a connector.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PublicKeyDiscoveryAddress {
    pub address: String,
    pub port: i32,
}

/// Reference to a `Lease` in the connector namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LeaseReference {
    pub name: String,
}

// ============================================================================
// TrafficProtectionPolicy
// ============================================================================

/// `TrafficProtectionPolicy` enables a web application firewall on its targets.
///
/// # Example
///
/// ```yaml
/// apiVersion: networking.firestoned.io/v1alpha
/// kind: TrafficProtectionPolicy
/// metadata:
///   name: waf
/// spec:
///   targetRefs:
///     - group: gateway.networking.k8s.io
///       kind: HTTPRoute
///       name: web
///       sectionName: api
///   mode: Enforce
///   ruleSets:
///     - type: OWASPCoreRuleSet
///       owaspCoreRuleSet:
///         paranoiaLevels:
///           blocking: 2
///           detection: 3
///         ruleExclusions:
///           ids: [920350]
/// ```
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "networking.firestoned.io",
    version = "v1alpha",
    kind = "TrafficProtectionPolicy",
    namespaced,
    doc = "TrafficProtectionPolicy attaches a web application firewall configuration to Gateways, listeners, HTTPRoutes or route rules.",
    printcolumn = r#"{"name":"Mode","type":"string","jsonPath":".spec.mode"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "TrafficProtectionPolicyStatus")]
#[serde(rename_all = "camelCase")]
pub struct TrafficProtectionPolicySpec {
    /// Targets the policy attaches to.
    pub target_refs: Vec<PolicyTargetReference>,

    /// Enforcement mode.
    #[serde(default)]
    pub mode: TrafficProtectionMode,

    /// Rule sets to load.
    #[serde(default)]
    pub rule_sets: Vec<TrafficProtectionRuleSet>,

    /// Percentage of requests inspected (0-100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0, max = 100))]
    pub sampling_percentage: Option<u8>,
}

/// Policy target, optionally narrowed to a listener or rule.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTargetReference {
    pub group: String,
    pub kind: String,
    pub name: String,
    /// Listener name (Gateway) or rule name (HTTPRoute).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

/// Enforcement mode of a policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum TrafficProtectionMode {
    /// Log matches without blocking.
    #[default]
    Observe,
    /// Block requests exceeding the anomaly thresholds.
    Enforce,
    /// Do not inspect.
    Disabled,
}

/// Rule set type discriminator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RuleSetType {
    #[default]
    #[serde(rename = "OWASPCoreRuleSet")]
    OwaspCoreRuleSet,
}

/// A rule set of a policy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrafficProtectionRuleSet {
    #[serde(rename = "type")]
    pub rule_set_type: RuleSetType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owasp_core_rule_set: Option<OwaspCoreRuleSet>,
}

/// OWASP Core Rule Set tuning.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OwaspCoreRuleSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paranoia_levels: Option<ParanoiaLevels>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_thresholds: Option<ScoreThresholds>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_exclusions: Option<RuleExclusions>,
}

/// CRS paranoia levels (1-4).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParanoiaLevels {
    #[serde(default = "default_paranoia_level")]
    #[schemars(range(min = 1, max = 4))]
    pub blocking: u8,

    #[serde(default = "default_paranoia_level")]
    #[schemars(range(min = 1, max = 4))]
    pub detection: u8,
}

impl Default for ParanoiaLevels {
    fn default() -> Self {
        Self {
            blocking: default_paranoia_level(),
            detection: default_paranoia_level(),
        }
    }
}

fn default_paranoia_level() -> u8 {
    1
}

/// CRS anomaly score thresholds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreThresholds {
    #[serde(default = "default_inbound_threshold")]
    pub inbound: u32,

    #[serde(default = "default_outbound_threshold")]
    pub outbound: u32,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            inbound: default_inbound_threshold(),
            outbound: default_outbound_threshold(),
        }
    }
}

fn default_inbound_threshold() -> u32 {
    5
}

fn default_outbound_threshold() -> u32 {
    4
}

/// Rules removed from the rule set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuleExclusions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<u32>,

    /// Inclusive ranges written `<from>-<to>`, e.g. `920000-920999`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id_ranges: Vec<String>,
}

/// `TrafficProtectionPolicy` status
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrafficProtectionPolicyStatus {
    #[serde(default)]
    pub ancestors: Vec<PolicyAncestorStatus>,
}

/// Status of a policy with respect to one ancestor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAncestorStatus {
    pub ancestor_ref: AncestorReference,
    pub controller_name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// The object (Gateway, optionally a listener) a policy status refers to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AncestorReference {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
