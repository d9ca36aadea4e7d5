// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Gateway API (`gateway.networking.k8s.io/v1`) types.
//!
//! Only the subset of `Gateway` and `HTTPRoute` this operator reads or writes
//! is modelled. Status types keep unknown fields so a status round trip never
//! drops what the gateway implementation wrote.
//!
//! The route match and filter types are shared with [`crate::crd::HTTPProxy`],
//! which embeds them verbatim, so they also derive `JsonSchema`.
//!
//! The Gateway API CRDs default several fields on admission (match type
//! `PathPrefix`, backend `weight: 1`, certificate ref kind `Secret`, ...).
//! `apply_defaults` fills the same values in locally so a desired object
//! serializes exactly like the stored one and unchanged specs are never
//! rewritten.

use crate::constants::{GATEWAY_API_GROUP, KIND_GATEWAY};
use crate::crd::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ============================================================================
// Shared route types
// ============================================================================

/// Request match criteria of a route rule.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRouteMatch {
    /// Path match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<HTTPPathMatch>,

    /// Header matches (all must match)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HTTPHeaderMatch>,

    /// Query parameter matches (all must match)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_params: Vec<HTTPQueryParamMatch>,

    /// HTTP method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// Path match of a route rule.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPPathMatch {
    /// `Exact`, `PathPrefix` or `RegularExpression`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub match_type: Option<String>,

    /// Path value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Header match of a route rule.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPHeaderMatch {
    /// `Exact` or `RegularExpression`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub match_type: Option<String>,

    /// Header name
    pub name: String,

    /// Header value
    pub value: String,
}

/// Query parameter match of a route rule.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPQueryParamMatch {
    /// `Exact` or `RegularExpression`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub match_type: Option<String>,

    /// Parameter name
    pub name: String,

    /// Parameter value
    pub value: String,
}

/// Filter type discriminator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum HTTPRouteFilterType {
    #[default]
    RequestHeaderModifier,
    ResponseHeaderModifier,
    RequestRedirect,
    #[serde(rename = "URLRewrite")]
    UrlRewrite,
    ExtensionRef,
}

/// Filter applied to requests or responses of a rule or backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRouteFilter {
    /// Which of the filter bodies below applies
    #[serde(rename = "type")]
    pub filter_type: HTTPRouteFilterType,

    /// Request header modifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_header_modifier: Option<HTTPHeaderFilter>,

    /// Response header modifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_header_modifier: Option<HTTPHeaderFilter>,

    /// Redirect response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_redirect: Option<HTTPRequestRedirectFilter>,

    /// Host/path rewrite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_rewrite: Option<HTTPURLRewriteFilter>,

    /// Implementation-specific filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_ref: Option<LocalObjectReference>,
}

/// Header modifications.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPHeaderFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set: Vec<HTTPHeader>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<HTTPHeader>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

/// A header name/value pair.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HTTPHeader {
    pub name: String,
    pub value: String,
}

/// Redirect response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRequestRedirectFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<HTTPPathModifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i32>,
}

/// Host and path rewrite.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPURLRewriteFilter {
    /// Value of the `Host` header sent upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Path rewrite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<HTTPPathModifier>,
}

/// Path rewrite or redirect.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPPathModifier {
    /// `ReplaceFullPath` or `ReplacePrefixMatch`
    #[serde(rename = "type")]
    pub modifier_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_full_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_prefix_match: Option<String>,
}

/// Reference to an object in the same namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LocalObjectReference {
    pub group: String,
    pub kind: String,
    pub name: String,
}

const DEFAULT_PATH_MATCH_TYPE: &str = "PathPrefix";
const DEFAULT_VALUE_MATCH_TYPE: &str = "Exact";

impl HTTPRouteMatch {
    fn apply_defaults(&mut self) {
        let path = self.path.get_or_insert_with(HTTPPathMatch::default);
        path.match_type
            .get_or_insert_with(|| DEFAULT_PATH_MATCH_TYPE.to_string());
        path.value.get_or_insert_with(|| "/".to_string());
        for header in &mut self.headers {
            header
                .match_type
                .get_or_insert_with(|| DEFAULT_VALUE_MATCH_TYPE.to_string());
        }
        for param in &mut self.query_params {
            param
                .match_type
                .get_or_insert_with(|| DEFAULT_VALUE_MATCH_TYPE.to_string());
        }
    }
}

impl HTTPRouteFilter {
    fn apply_defaults(&mut self) {
        if let Some(redirect) = &mut self.request_redirect {
            redirect.status_code.get_or_insert(302);
        }
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// Gateway spec.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1",
    kind = "Gateway",
    namespaced,
    status = "GatewayStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    pub gateway_class_name: String,
    #[serde(default)]
    pub listeners: Vec<Listener>,
}

/// A listener of a Gateway.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub port: i32,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<GatewayTLSConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_routes: Option<AllowedRoutes>,
}

/// TLS settings of a listener.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTLSConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificate_refs: Vec<SecretObjectReference>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

/// Reference to a certificate Secret.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretObjectReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Which routes may attach to a listener.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedRoutes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<RouteNamespaces>,
}

/// Namespaces from which routes may attach.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteNamespaces {
    /// `Same`, `All` or `Selector`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

/// Gateway status.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<GatewayStatusAddress>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<ListenerStatus>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An address assigned to a Gateway.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatusAddress {
    /// `IPAddress` or `Hostname`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub address_type: Option<String>,
    pub value: String,
}

/// Status of one listener.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatus {
    pub name: String,
    #[serde(default)]
    pub attached_routes: i32,
    #[serde(default)]
    pub supported_kinds: Vec<RouteGroupKind>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A route kind a listener supports.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteGroupKind {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub kind: String,
}

impl GatewaySpec {
    /// Fill the values the Gateway CRD defaults on admission.
    pub fn apply_defaults(&mut self) {
        for listener in &mut self.listeners {
            listener
                .allowed_routes
                .get_or_insert_with(AllowedRoutes::default)
                .namespaces
                .get_or_insert_with(RouteNamespaces::default)
                .from
                .get_or_insert_with(|| "Same".to_string());
            if let Some(tls) = &mut listener.tls {
                tls.mode.get_or_insert_with(|| "Terminate".to_string());
                for cert in &mut tls.certificate_refs {
                    cert.group.get_or_insert_with(String::new);
                    cert.kind.get_or_insert_with(|| "Secret".to_string());
                }
            }
        }
    }
}

impl Gateway {
    /// Gateway-level condition of the given type.
    #[must_use]
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.status
            .as_ref()?
            .conditions
            .iter()
            .find(|c| c.r#type == condition_type)
    }

    /// Listener-level condition of the given type.
    #[must_use]
    pub fn listener_condition(&self, listener: &str, condition_type: &str) -> Option<&Condition> {
        self.status
            .as_ref()?
            .listeners
            .iter()
            .find(|l| l.name == listener)?
            .conditions
            .iter()
            .find(|c| c.r#type == condition_type)
    }

    /// Returns `true` when the gateway-level condition is `True` for the
    /// current generation.
    #[must_use]
    pub fn is_condition_true(&self, condition_type: &str) -> bool {
        self.condition(condition_type).is_some_and(|c| {
            c.status == "True"
                && c.observed_generation
                    .is_none_or(|g| Some(g) == self.metadata.generation)
        })
    }

    /// Returns `true` when the listener-level condition is `True`.
    #[must_use]
    pub fn is_listener_condition_true(&self, listener: &str, condition_type: &str) -> bool {
        self.listener_condition(listener, condition_type)
            .is_some_and(|c| c.status == "True")
    }

    /// The first `Hostname`-typed status address, if any.
    #[must_use]
    pub fn hostname_address(&self) -> Option<&str> {
        self.status
            .as_ref()?
            .addresses
            .iter()
            .find(|a| a.address_type.as_deref() == Some("Hostname"))
            .map(|a| a.value.as_str())
    }

    /// Hostname clients resolve to reach this gateway.
    ///
    /// The address published by the gateway implementation wins; before one
    /// exists the name is derived from the gateway UID. `None` only for an
    /// unsaved gateway with no address.
    #[must_use]
    pub fn canonical_hostname(&self, target_domain: &str) -> Option<String> {
        if let Some(address) = self.hostname_address() {
            return Some(address.trim_end_matches('.').to_string());
        }
        let uid = self.metadata.uid.as_deref()?;
        Some(format!("{uid}.{}", target_domain.trim_end_matches('.')))
    }

    /// Hostnames of all listeners, in listener order, without duplicates.
    #[must_use]
    pub fn listener_hostnames(&self) -> Vec<String> {
        let mut hostnames: Vec<String> = Vec::new();
        for hostname in self.spec.listeners.iter().filter_map(|l| l.hostname.as_ref()) {
            if !hostnames.contains(hostname) {
                hostnames.push(hostname.clone());
            }
        }
        hostnames
    }
}

// ============================================================================
// HTTPRoute
// ============================================================================

/// HTTPRoute spec.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1",
    kind = "HTTPRoute",
    namespaced,
    status = "HTTPRouteStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRouteSpec {
    #[serde(default)]
    pub parent_refs: Vec<ParentReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
    #[serde(default)]
    pub rules: Vec<HTTPRouteRule>,
}

/// Reference to a parent (Gateway or listener) of a route.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

/// One rule of a route.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRouteRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<HTTPRouteMatch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<HTTPRouteFilter>,
    #[serde(default)]
    pub backend_refs: Vec<HTTPBackendRef>,
}

/// Backend of a route rule.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HTTPBackendRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<HTTPRouteFilter>,
}

impl HTTPRouteSpec {
    /// Fill the values the HTTPRoute CRD defaults on admission.
    pub fn apply_defaults(&mut self) {
        for parent in &mut self.parent_refs {
            parent
                .group
                .get_or_insert_with(|| GATEWAY_API_GROUP.to_string());
            parent.kind.get_or_insert_with(|| KIND_GATEWAY.to_string());
        }
        if self.rules.is_empty() {
            self.rules.push(HTTPRouteRule::default());
        }
        for rule in &mut self.rules {
            if rule.matches.is_empty() {
                rule.matches.push(HTTPRouteMatch::default());
            }
            rule.matches.iter_mut().for_each(HTTPRouteMatch::apply_defaults);
            rule.filters.iter_mut().for_each(HTTPRouteFilter::apply_defaults);
            for backend in &mut rule.backend_refs {
                backend.group.get_or_insert_with(String::new);
                backend.kind.get_or_insert_with(|| "Service".to_string());
                backend.weight.get_or_insert(1);
                backend.filters.iter_mut().for_each(HTTPRouteFilter::apply_defaults);
            }
        }
    }
}

/// HTTPRoute status.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRouteStatus {
    #[serde(default)]
    pub parents: Vec<RouteParentStatus>,
}

/// Status of a route with respect to one parent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteParentStatus {
    pub parent_ref: ParentReference,
    #[serde(default)]
    pub controller_name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
