// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Envoy patches carrying compiled WAF directives.
//!
//! Every accepted attachment adds a per-filter config to the route
//! configuration of each listener in scope. The JSONPath narrows the patch:
//!
//! - gateway: every virtual host of the gateway
//! - listener: virtual hosts of that listener
//! - route / rule: routes of the `HTTPRoute` (or one rule of it) below the
//!   virtual host predicate above
//!
//! Route-level config overrides virtual-host config in Envoy, so a route
//! attachment and a gateway attachment on the same traffic do not stack.
//!
//! Generated virtual hosts and routes usually have no `typed_per_filter_config`
//! at all, and a JSON patch `add` below a missing member fails. Each patch
//! therefore adds the whole map in one operation.

use crate::constants::{ENVOY_ROUTE_CONFIGURATION_TYPE_URL, GATEWAY_API_GROUP, KIND_GATEWAY};
use crate::envoy_gateway::{
    EnvoyJSONPatchConfig, EnvoyPatchPolicy, EnvoyPatchPolicySpec, JSONPatchOperation,
    LocalPolicyTargetReference,
};
use crate::errors::PolicyError;
use crate::gateway_api::Gateway;
use crate::reconcilers::httpproxy::tunnel::route_configuration_name;
use crate::reconcilers::policy::attachment::{PatchScope, RouteSelector};
use kube::ResourceExt;
use serde::Serialize;
use serde_json::json;

/// HTTP filter the per-route WAF config is keyed by.
pub const WAF_FILTER_NAME: &str = "envoy.filters.http.golang";

/// Member of a virtual host or route holding per-filter configs.
const TYPED_PER_FILTER_CONFIG_PATH: &str = "/typed_per_filter_config";

/// Plugin name of the Coraza filter.
pub const WAF_PLUGIN_NAME: &str = "coraza-waf";

/// Patch policy priority; runs after the tunnel patches.
const WAF_PATCH_PRIORITY: i32 = 10;

/// Name of the patch policy carrying the WAF patches of a gateway.
#[must_use]
pub fn waf_policy_name(gateway_name: &str) -> String {
    format!("{gateway_name}-traffic-protection")
}

/// Directives of one accepted attachment, with its scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopedDirectives {
    pub scope: PatchScope,
    pub directives: Vec<String>,
}

#[derive(Serialize)]
struct CorazaConfig<'a> {
    directives: &'a [String],
}

/// JSONPath selecting the virtual hosts of `gateway`, optionally one listener.
#[must_use]
pub fn virtual_host_json_path(namespace: &str, gateway: &str, listener: Option<&str>) -> String {
    match listener {
        Some(listener) => format!("..virtual_hosts[?(@.name =~ '^{namespace}/{gateway}/{listener}/.*')]"),
        None => format!("..virtual_hosts[?(@.name =~ '^{namespace}/{gateway}/.*')]"),
    }
}

/// JSONPath of a patch scope, rendered in `namespace`.
#[must_use]
pub fn scope_json_path(namespace: &str, scope: &PatchScope) -> String {
    let virtual_hosts = virtual_host_json_path(namespace, &scope.gateway, scope.listener.as_deref());
    match &scope.route {
        None => virtual_hosts,
        Some(RouteSelector { name, rule_index, .. }) => {
            let rule = rule_index.map_or_else(|| ".*".to_string(), |i| format!("{i}/match/.*"));
            format!("{virtual_hosts}.routes[?(@.name =~ '^httproute/{namespace}/{name}/rule/{rule}')]")
        }
    }
}

/// Build the WAF patch policy of `gateway` from the accepted attachments
/// scoped to it.
///
/// Returns `Ok(None)` when nothing applies to the gateway.
///
/// # Errors
///
/// Returns [`PolicyError::PatchSerialization`] if a filter config cannot be
/// serialized.
pub fn build_waf_patch_policy(
    gateway: &Gateway,
    namespace: &str,
    attachments: &[ScopedDirectives],
) -> Result<Option<EnvoyPatchPolicy>, PolicyError> {
    let gateway_name = gateway.name_any();
    let mut json_patches = Vec::new();

    for attachment in attachments.iter().filter(|a| a.scope.gateway == gateway_name) {
        let config = serde_json::to_value(CorazaConfig {
            directives: &attachment.directives,
        })
        .map_err(|source| PolicyError::PatchSerialization {
            target: format!("{namespace}/{gateway_name}"),
            source,
        })?;
        let value = json!({
            WAF_FILTER_NAME: {
                "@type": "type.googleapis.com/envoy.extensions.filters.http.golang.v3alpha.ConfigsPerRoute",
                "plugins_config": {
                    WAF_PLUGIN_NAME: {
                        "config": {
                            "@type": "type.googleapis.com/xds.type.v3.TypedStruct",
                            "value": config,
                        }
                    }
                }
            }
        });
        let json_path = scope_json_path(namespace, &attachment.scope);

        let listeners = gateway
            .spec
            .listeners
            .iter()
            .filter(|l| attachment.scope.listener.as_ref().is_none_or(|want| &l.name == want));
        for listener in listeners {
            json_patches.push(EnvoyJSONPatchConfig {
                resource_type: ENVOY_ROUTE_CONFIGURATION_TYPE_URL.to_string(),
                name: route_configuration_name(namespace, &gateway_name, &listener.name),
                operation: JSONPatchOperation {
                    op: "add".to_string(),
                    path: Some(TYPED_PER_FILTER_CONFIG_PATH.to_string()),
                    json_path: Some(json_path.clone()),
                    from: None,
                    value: Some(value.clone()),
                },
            });
        }
    }

    if json_patches.is_empty() {
        return Ok(None);
    }

    let mut policy = EnvoyPatchPolicy::new(
        &waf_policy_name(&gateway_name),
        EnvoyPatchPolicySpec {
            target_ref: LocalPolicyTargetReference {
                group: GATEWAY_API_GROUP.to_string(),
                kind: KIND_GATEWAY.to_string(),
                name: gateway_name,
            },
            patch_type: "JSONPatch".to_string(),
            json_patches,
            priority: Some(WAF_PATCH_PRIORITY),
        },
    );
    policy.metadata.namespace = Some(namespace.to_string());
    Ok(Some(policy))
}

#[cfg(test)]
#[path = "patches_tests.rs"]
mod patches_tests;
