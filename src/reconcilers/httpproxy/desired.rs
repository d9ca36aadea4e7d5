// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired-state builder for `HTTPProxy` resources.
//!
//! [`collect_desired_resources`] turns an `HTTPProxy` plus operator
//! configuration into the full set of dependents:
//!
//! - One `Gateway` (same name and namespace as the proxy) with the two default
//!   listeners and one HTTP + HTTPS listener pair per custom hostname
//! - One `HTTPRoute` (same name and namespace) with one rule per proxy rule
//! - One `EndpointSlice` per direct backend
//! - For connector rules: tunnel routes (patched in by an `EnvoyPatchPolicy`)
//!   or, while the connector is offline, a direct-response `HTTPRouteFilter`
//!
//! All functions here are pure; the reconciler owns every API call.

use crate::config::GatewayConfig;
use crate::constants::{
    DEFAULT_HTTPS_LISTENER_NAME, DEFAULT_HTTP_LISTENER_NAME, DISCOVERY_API_GROUP,
    ENVOY_GATEWAY_API_GROUP, GATEWAY_API_GROUP, HTTPS_LISTENER_PORT, HTTP_LISTENER_PORT,
    KIND_ENDPOINT_SLICE, KIND_GATEWAY, KIND_HTTP_ROUTE_FILTER, TUNNEL_OFFLINE_BODY,
    TUNNEL_OFFLINE_STATUS_CODE,
};
use crate::crd::{Connector, HTTPProxy, HTTPProxyRule};
use crate::envoy_gateway::{
    HTTPDirectResponseFilter, HTTPRouteFilter as EnvoyHTTPRouteFilter, HTTPRouteFilterSpec,
};
use crate::errors::EndpointError;
use crate::gateway_api::{
    AllowedRoutes, Gateway, GatewaySpec, GatewayTLSConfig, HTTPBackendRef, HTTPRoute,
    HTTPRouteFilter, HTTPRouteFilterType, HTTPRouteRule, HTTPRouteSpec, HTTPURLRewriteFilter,
    Listener, LocalObjectReference, ParentReference, RouteNamespaces, SecretObjectReference,
};
use crate::labels::{
    ENDPOINT_SLICE_MANAGER, K8S_ENDPOINT_SLICE_MANAGED_BY, K8S_PART_OF, K8S_SERVICE_NAME,
    PART_OF_NETWORK_SERVICES,
};
use crate::reconcilers::dns::hostname_hash;
use crate::reconcilers::httpproxy::endpoint::{parse_endpoint, ParsedEndpoint};
use crate::reconcilers::status::is_condition_true;
use crate::status_reasons::CONDITION_TYPE_READY;
use k8s_openapi::api::discovery::v1::{Endpoint, EndpointConditions, EndpointPort, EndpointSlice};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use url::Url;

/// Everything an `HTTPProxy` expands into.
#[derive(Clone, Debug)]
pub struct DesiredResources {
    pub gateway: Gateway,
    pub http_route: HTTPRoute,
    pub endpoint_slices: Vec<EndpointSlice>,
    /// Direct-response filter used by rules whose connector is offline
    pub offline_filter: Option<EnvoyHTTPRouteFilter>,
    /// Connector rules whose connector is online
    pub tunnels: Vec<TunnelRoute>,
}

/// A rule routed through an online connector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TunnelRoute {
    /// Index of the rule in the `HTTPProxy` (and `HTTPRoute`) spec
    pub rule_index: usize,
    /// Connector name
    pub connector_name: String,
    /// Connector endpoint id (public key)
    pub connector_id: String,
    /// Host the tunnel cluster dials
    pub relay_host: String,
    /// Port the tunnel cluster dials
    pub relay_port: u16,
    /// `host:port` requested through the tunnel
    pub authority: String,
}

/// Listener names of the HTTP and HTTPS listeners serving `hostname`.
#[must_use]
pub fn hostname_listener_names(hostname: &str) -> (String, String) {
    let hash = hostname_hash(hostname);
    (format!("http-{hash}"), format!("https-{hash}"))
}

/// Name of the `EndpointSlice` backing backend `backend` of rule `rule`.
#[must_use]
pub fn endpoint_slice_name(proxy_name: &str, rule: usize, backend: usize) -> String {
    format!("{proxy_name}-rule-{rule}-backend-{backend}")
}

/// Name of the direct-response filter used while a connector is offline.
#[must_use]
pub fn offline_filter_name(proxy_name: &str) -> String {
    format!("{proxy_name}-connector-offline")
}

/// Compute every dependent of `proxy`.
///
/// # Arguments
///
/// * `proxy` - The `HTTPProxy` being reconciled
/// * `config` - Gateway settings of the operator
/// * `connectors` - Connectors of the proxy namespace, by name
///
/// # Errors
///
/// Returns [`EndpointError`] when a backend endpoint is invalid, including
/// `https` endpoints addressed by IP without `tls.hostname`.
pub fn collect_desired_resources(
    proxy: &HTTPProxy,
    config: &GatewayConfig,
    connectors: &BTreeMap<String, Connector>,
) -> Result<DesiredResources, EndpointError> {
    let name = proxy.name_any();
    let namespace = proxy.namespace().unwrap_or_default();

    let mut rules = Vec::with_capacity(proxy.spec.rules.len());
    let mut endpoint_slices = Vec::new();
    let mut tunnels = Vec::new();
    let mut needs_offline_filter = false;

    for (rule_index, rule) in proxy.spec.rules.iter().enumerate() {
        let parsed = rule
            .backends
            .iter()
            .map(|backend| {
                parse_endpoint(
                    &backend.endpoint,
                    backend.tls.as_ref().and_then(|t| t.hostname.as_deref()),
                    config.https_backend_port,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut route_rule = HTTPRouteRule {
            name: rule.name.clone(),
            matches: rule.matches.clone(),
            filters: rule.filters.clone(),
            backend_refs: Vec::new(),
        };

        match connector_backend(rule, rule_index)? {
            Some(connector_name) => {
                let tunnel = connectors
                    .get(connector_name)
                    .filter(|c| {
                        is_condition_true(
                            c.status.as_ref().map_or(&[][..], |s| s.conditions.as_slice()),
                            CONDITION_TYPE_READY,
                        )
                    })
                    .and_then(|c| tunnel_route(c, rule_index, &parsed[0]));

                match tunnel {
                    Some(tunnel) => tunnels.push(tunnel),
                    None => {
                        needs_offline_filter = true;
                        route_rule.filters.push(offline_extension_ref(&name));
                    }
                }
            }
            None => {
                for (backend_index, (backend, endpoint)) in
                    rule.backends.iter().zip(&parsed).enumerate()
                {
                    let slice_name = endpoint_slice_name(&name, rule_index, backend_index);
                    endpoint_slices.push(build_endpoint_slice(&slice_name, &namespace, endpoint));
                    route_rule.backend_refs.push(HTTPBackendRef {
                        group: Some(DISCOVERY_API_GROUP.to_string()),
                        kind: Some(KIND_ENDPOINT_SLICE.to_string()),
                        name: slice_name,
                        namespace: None,
                        port: Some(i32::from(endpoint.port)),
                        weight: None,
                        filters: backend.filters.clone(),
                    });
                }
            }
        }

        if let Some(rewrite) = synthesized_url_rewrite(rule, &parsed) {
            route_rule.filters.push(rewrite);
        }
        rules.push(route_rule);
    }

    let offline_filter = needs_offline_filter.then(|| {
        let mut filter = EnvoyHTTPRouteFilter::new(
            &offline_filter_name(&name),
            HTTPRouteFilterSpec {
                direct_response: Some(HTTPDirectResponseFilter::plain_text(
                    TUNNEL_OFFLINE_STATUS_CODE,
                    TUNNEL_OFFLINE_BODY,
                )),
            },
        );
        filter.metadata.namespace = Some(namespace.clone());
        filter.metadata.labels = Some(part_of_labels());
        filter
    });

    let mut http_route = HTTPRoute::new(
        &name,
        HTTPRouteSpec {
            parent_refs: vec![ParentReference {
                group: Some(GATEWAY_API_GROUP.to_string()),
                kind: Some(KIND_GATEWAY.to_string()),
                namespace: None,
                name: name.clone(),
                section_name: None,
                port: None,
            }],
            hostnames: Vec::new(),
            rules,
        },
    );
    http_route.spec.apply_defaults();
    http_route.metadata.namespace = Some(namespace.clone());
    http_route.metadata.labels = Some(part_of_labels());

    Ok(DesiredResources {
        gateway: build_gateway(proxy, config),
        http_route,
        endpoint_slices,
        offline_filter,
        tunnels,
    })
}

/// Build the `Gateway` of a proxy.
#[must_use]
pub fn build_gateway(proxy: &HTTPProxy, config: &GatewayConfig) -> Gateway {
    let name = proxy.name_any();
    let namespace = proxy.namespace().unwrap_or_default();

    let default_certs = config
        .default_listener_tls
        .certificate_refs
        .iter()
        .map(|c| SecretObjectReference {
            group: None,
            kind: None,
            name: c.name.clone(),
            namespace: c.namespace.clone(),
        })
        .collect();

    let mut listeners = vec![
        http_listener(DEFAULT_HTTP_LISTENER_NAME, None),
        https_listener(DEFAULT_HTTPS_LISTENER_NAME, None, default_certs, config),
    ];

    for hostname in unique_hostnames(&proxy.spec.hostnames) {
        let (http_name, https_name) = hostname_listener_names(&hostname);
        let cert = SecretObjectReference {
            group: None,
            kind: None,
            name: format!("{name}-{}-tls", hostname_hash(&hostname)),
            namespace: None,
        };
        listeners.push(http_listener(&http_name, Some(&hostname)));
        listeners.push(https_listener(&https_name, Some(&hostname), vec![cert], config));
    }

    let mut gateway = Gateway::new(
        &name,
        GatewaySpec {
            gateway_class_name: config.gateway_class_name.clone(),
            listeners,
        },
    );
    gateway.spec.apply_defaults();
    gateway.metadata = ObjectMeta {
        name: Some(name),
        namespace: Some(namespace),
        labels: Some(part_of_labels()),
        annotations: (!config.annotations.is_empty()).then(|| config.annotations.clone()),
        ..ObjectMeta::default()
    };
    gateway
}

/// Build the `EndpointSlice` publishing one parsed backend.
#[must_use]
pub fn build_endpoint_slice(name: &str, namespace: &str, endpoint: &ParsedEndpoint) -> EndpointSlice {
    let mut labels = part_of_labels();
    labels.insert(K8S_SERVICE_NAME.to_string(), name.to_string());
    labels.insert(
        K8S_ENDPOINT_SLICE_MANAGED_BY.to_string(),
        ENDPOINT_SLICE_MANAGER.to_string(),
    );

    EndpointSlice {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..ObjectMeta::default()
        },
        address_type: endpoint.address_type.to_string(),
        endpoints: vec![Endpoint {
            addresses: vec![endpoint.host.clone()],
            conditions: Some(EndpointConditions {
                ready: Some(true),
                serving: Some(true),
                terminating: Some(false),
            }),
            ..Endpoint::default()
        }],
        ports: Some(vec![EndpointPort {
            name: Some(endpoint.scheme.as_str().to_string()),
            port: Some(i32::from(endpoint.port)),
            protocol: Some("TCP".to_string()),
            app_protocol: Some(endpoint.scheme.as_str().to_string()),
        }]),
    }
}

/// Connector named by a rule, if it is a connector rule.
///
/// A connector rule routes every backend through the same connector, so only
/// the first backend's connector is used; direct backends alongside it are
/// rejected.
fn connector_backend(rule: &HTTPProxyRule, rule_index: usize) -> Result<Option<&str>, EndpointError> {
    let connector = rule
        .backends
        .iter()
        .find_map(|b| b.connector.as_ref().map(|c| c.name.as_str()));
    if connector.is_some() && rule.backends.iter().any(|b| b.connector.is_none()) {
        return Err(EndpointError::MixedConnectorBackends { rule: rule_index });
    }
    Ok(connector)
}

/// Tunnel route for an online connector; `None` when it publishes no address.
fn tunnel_route(connector: &Connector, rule_index: usize, endpoint: &ParsedEndpoint) -> Option<TunnelRoute> {
    let details = connector
        .status
        .as_ref()?
        .connection_details
        .as_ref()?
        .public_key
        .as_ref()?;

    let relay = details
        .home_relay
        .as_deref()
        .and_then(|r| Url::parse(r).ok())
        .and_then(|url| Some((url.host_str()?.to_string(), url.port_or_known_default()?)));
    let (relay_host, relay_port) = match relay {
        Some(relay) => relay,
        None => details
            .addresses
            .iter()
            .find_map(|a| Some((a.address.clone(), u16::try_from(a.port).ok()?)))?,
    };

    let authority = if endpoint.host.contains(':') {
        format!("[{}]:{}", endpoint.host, endpoint.port)
    } else {
        format!("{}:{}", endpoint.host, endpoint.port)
    };

    Some(TunnelRoute {
        rule_index,
        connector_name: connector.name_any(),
        connector_id: details.id.clone(),
        relay_host,
        relay_port,
        authority,
    })
}

/// A `URLRewrite` presenting the backend's virtual hostname upstream, unless
/// the rule or one of its backends already rewrites the URL.
fn synthesized_url_rewrite(rule: &HTTPProxyRule, parsed: &[ParsedEndpoint]) -> Option<HTTPRouteFilter> {
    let has_rewrite = rule
        .filters
        .iter()
        .chain(rule.backends.iter().flat_map(|b| b.filters.iter()))
        .any(|f| f.filter_type == HTTPRouteFilterType::UrlRewrite);
    if has_rewrite {
        return None;
    }

    let hostname = parsed.iter().find_map(ParsedEndpoint::upstream_hostname)?;
    Some(HTTPRouteFilter {
        filter_type: HTTPRouteFilterType::UrlRewrite,
        url_rewrite: Some(HTTPURLRewriteFilter {
            hostname: Some(hostname.to_string()),
            path: None,
        }),
        ..HTTPRouteFilter::default()
    })
}

fn offline_extension_ref(proxy_name: &str) -> HTTPRouteFilter {
    HTTPRouteFilter {
        filter_type: HTTPRouteFilterType::ExtensionRef,
        extension_ref: Some(LocalObjectReference {
            group: ENVOY_GATEWAY_API_GROUP.to_string(),
            kind: KIND_HTTP_ROUTE_FILTER.to_string(),
            name: offline_filter_name(proxy_name),
        }),
        ..HTTPRouteFilter::default()
    }
}

fn http_listener(name: &str, hostname: Option<&str>) -> Listener {
    Listener {
        name: name.to_string(),
        hostname: hostname.map(ToString::to_string),
        port: HTTP_LISTENER_PORT,
        protocol: "HTTP".to_string(),
        tls: None,
        allowed_routes: Some(same_namespace_routes()),
    }
}

fn https_listener(
    name: &str,
    hostname: Option<&str>,
    certificate_refs: Vec<SecretObjectReference>,
    config: &GatewayConfig,
) -> Listener {
    Listener {
        name: name.to_string(),
        hostname: hostname.map(ToString::to_string),
        port: HTTPS_LISTENER_PORT,
        protocol: "HTTPS".to_string(),
        tls: Some(GatewayTLSConfig {
            mode: Some("Terminate".to_string()),
            certificate_refs,
            options: config.listener_tls_options.clone(),
        }),
        allowed_routes: Some(same_namespace_routes()),
    }
}

fn same_namespace_routes() -> AllowedRoutes {
    AllowedRoutes {
        namespaces: Some(RouteNamespaces {
            from: Some("Same".to_string()),
        }),
    }
}

/// Lowercased hostnames in spec order, duplicates dropped.
fn unique_hostnames(hostnames: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(hostnames.len());
    for hostname in hostnames {
        let hostname = hostname.trim().trim_end_matches('.').to_ascii_lowercase();
        if !hostname.is_empty() && !seen.contains(&hostname) {
            seen.push(hostname);
        }
    }
    seen
}

fn part_of_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(K8S_PART_OF.to_string(), PART_OF_NETWORK_SERVICES.to_string())])
}

#[cfg(test)]
#[path = "desired_tests.rs"]
mod desired_tests;
