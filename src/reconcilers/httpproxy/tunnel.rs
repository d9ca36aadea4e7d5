// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Envoy patches routing connector rules through their tunnel.
//!
//! A connector rule has no backend refs, so Envoy Gateway renders its routes
//! as direct responses. The patch policy built here replaces each of those
//! direct responses with a route to a per-rule cluster named
//! `httproute/<ns>/<name>/rule/<i>`, and adds that cluster pointing at the
//! connector relay. The requested authority and connector id travel as
//! request headers.
//!
//! Only listeners the live Gateway reports `Programmed` have a route
//! configuration to patch; the others are skipped until they are.

use crate::constants::{
    ENVOY_CLUSTER_TYPE_URL, ENVOY_ROUTE_CONFIGURATION_TYPE_URL, GATEWAY_API_GROUP, KIND_GATEWAY,
};
use crate::status_reasons::CONDITION_TYPE_PROGRAMMED;
use crate::envoy_gateway::{
    EnvoyJSONPatchConfig, EnvoyPatchPolicy, EnvoyPatchPolicySpec, JSONPatchOperation,
    LocalPolicyTargetReference,
};
use crate::gateway_api::Gateway;
use crate::reconcilers::httpproxy::desired::TunnelRoute;
use kube::ResourceExt;
use serde_json::{json, Value};

/// Header carrying the `host:port` the connector should dial.
pub const TUNNEL_AUTHORITY_HEADER: &str = "x-tunnel-authority";

/// Header carrying the connector endpoint id.
pub const TUNNEL_CONNECTOR_HEADER: &str = "x-tunnel-connector-id";

/// Name of the patch policy carrying the tunnel patches of a gateway.
#[must_use]
pub fn tunnel_policy_name(gateway_name: &str) -> String {
    format!("{gateway_name}-connector-tunnels")
}

/// Envoy cluster a tunnel rule is routed to.
#[must_use]
pub fn tunnel_cluster_name(route_namespace: &str, route_name: &str, rule_index: usize) -> String {
    format!("httproute/{route_namespace}/{route_name}/rule/{rule_index}")
}

/// xDS name of the route configuration of one gateway listener.
#[must_use]
pub fn route_configuration_name(namespace: &str, gateway_name: &str, listener: &str) -> String {
    format!("{namespace}/{gateway_name}/{listener}")
}

/// JSONPath selecting every route generated for one rule of one `HTTPRoute`.
#[must_use]
pub fn rule_routes_json_path(route_namespace: &str, route_name: &str, rule_index: usize) -> String {
    format!(
        "..routes[?(@.name =~ '^{}/match/.*')]",
        tunnel_cluster_name(route_namespace, route_name, rule_index)
    )
}

/// Build the tunnel patch policy for `gateway`.
///
/// Returns `None` when there are no tunnels; the caller deletes any existing
/// policy in that case.
///
/// # Arguments
///
/// * `gateway` - Live gateway; its `Programmed` listeners are patched
/// * `namespace` - Namespace the gateway is rendered in by Envoy Gateway
/// * `tunnels` - Online connector rules of the gateway's route
#[must_use]
pub fn build_tunnel_patch_policy(
    gateway: &Gateway,
    namespace: &str,
    tunnels: &[TunnelRoute],
) -> Option<EnvoyPatchPolicy> {
    if tunnels.is_empty() {
        return None;
    }

    let gateway_name = gateway.name_any();
    // The HTTPRoute shares the gateway's name.
    let route_name = gateway_name.as_str();
    let programmed: Vec<&str> = gateway
        .spec
        .listeners
        .iter()
        .map(|l| l.name.as_str())
        .filter(|name| gateway.is_listener_condition_true(name, CONDITION_TYPE_PROGRAMMED))
        .collect();
    let mut json_patches = Vec::new();

    for tunnel in tunnels {
        let cluster = tunnel_cluster_name(namespace, route_name, tunnel.rule_index);
        let json_path = rule_routes_json_path(namespace, route_name, tunnel.rule_index);

        for listener in &programmed {
            let resource = route_configuration_name(namespace, &gateway_name, listener);
            json_patches.push(route_patch(&resource, &json_path, "remove", "/direct_response", None));
            json_patches.push(route_patch(
                &resource,
                &json_path,
                "add",
                "/route",
                Some(json!({
                    "cluster": cluster,
                    "timeout": "0s",
                    "upgrade_configs": [{ "upgrade_type": "websocket" }],
                })),
            ));
            json_patches.push(route_patch(
                &resource,
                &json_path,
                "add",
                "/request_headers_to_add",
                Some(json!([
                    header(TUNNEL_AUTHORITY_HEADER, &tunnel.authority),
                    header(TUNNEL_CONNECTOR_HEADER, &tunnel.connector_id),
                ])),
            ));
        }

        json_patches.push(EnvoyJSONPatchConfig {
            resource_type: ENVOY_CLUSTER_TYPE_URL.to_string(),
            name: cluster.clone(),
            operation: JSONPatchOperation {
                op: "add".to_string(),
                path: Some(String::new()),
                value: Some(tunnel_cluster(&cluster, tunnel)),
                ..JSONPatchOperation::default()
            },
        });
    }

    let mut policy = EnvoyPatchPolicy::new(
        &tunnel_policy_name(&gateway_name),
        EnvoyPatchPolicySpec {
            target_ref: LocalPolicyTargetReference {
                group: GATEWAY_API_GROUP.to_string(),
                kind: KIND_GATEWAY.to_string(),
                name: gateway_name,
            },
            patch_type: "JSONPatch".to_string(),
            json_patches,
            priority: None,
        },
    );
    policy.metadata.namespace = Some(namespace.to_string());
    Some(policy)
}

fn route_patch(
    resource: &str,
    json_path: &str,
    op: &str,
    path: &str,
    value: Option<Value>,
) -> EnvoyJSONPatchConfig {
    EnvoyJSONPatchConfig {
        resource_type: ENVOY_ROUTE_CONFIGURATION_TYPE_URL.to_string(),
        name: resource.to_string(),
        operation: JSONPatchOperation {
            op: op.to_string(),
            path: Some(path.to_string()),
            json_path: Some(json_path.to_string()),
            from: None,
            value,
        },
    }
}

fn header(key: &str, value: &str) -> Value {
    json!({
        "header": { "key": key, "value": value },
        "append_action": "OVERWRITE_IF_EXISTS_OR_ADD",
    })
}

fn tunnel_cluster(name: &str, tunnel: &TunnelRoute) -> Value {
    json!({
        "name": name,
        "type": "STRICT_DNS",
        "connect_timeout": "10s",
        "load_assignment": {
            "cluster_name": name,
            "endpoints": [{
                "lb_endpoints": [{
                    "endpoint": {
                        "address": {
                            "socket_address": {
                                "address": tunnel.relay_host,
                                "port_value": tunnel.relay_port,
                            }
                        }
                    }
                }]
            }]
        },
        "typed_extension_protocol_options": {
            "envoy.extensions.upstreams.http.v3.HttpProtocolOptions": {
                "@type": "type.googleapis.com/envoy.extensions.upstreams.http.v3.HttpProtocolOptions",
                "explicit_http_config": { "http2_protocol_options": { "allow_connect": true } }
            }
        }
    })
}

#[cfg(test)]
#[path = "tunnel_tests.rs"]
mod tunnel_tests;
