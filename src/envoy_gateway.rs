// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Envoy Gateway (`gateway.envoyproxy.io/v1alpha1`) types.
//!
//! - [`EnvoyPatchPolicy`] carries JSON patches applied to the generated xDS
//!   resources of a Gateway. Connector tunnels and traffic protection policies
//!   are both expressed as patches.
//! - [`HTTPRouteFilter`] is the Envoy Gateway extension filter; the operator
//!   only uses its direct-response form.

use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `EnvoyPatchPolicy` spec.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "gateway.envoyproxy.io",
    version = "v1alpha1",
    kind = "EnvoyPatchPolicy",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyPatchPolicySpec {
    /// Gateway the patches apply to
    pub target_ref: LocalPolicyTargetReference,

    /// Always `JSONPatch`
    #[serde(rename = "type")]
    pub patch_type: String,

    /// Ordered patches
    #[serde(default)]
    pub json_patches: Vec<EnvoyJSONPatchConfig>,

    /// Relative order among policies targeting the same Gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

/// Reference to the policy target.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPolicyTargetReference {
    pub group: String,
    pub kind: String,
    pub name: String,
}

/// One JSON patch against one xDS resource.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvoyJSONPatchConfig {
    /// xDS type URL of the patched resource
    #[serde(rename = "type")]
    pub resource_type: String,

    /// Name of the patched resource (`<namespace>/<gateway>/<listener>` for
    /// route configurations)
    pub name: String,

    /// The patch operation
    pub operation: JSONPatchOperation,
}

/// RFC 6902 operation, optionally addressed through a JSONPath.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JSONPatchOperation {
    /// `add`, `remove`, `replace`, `move`, `copy` or `test`
    pub op: String,

    /// JSON pointer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// JSONPath selecting the nodes `path` is relative to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,

    /// Source pointer for `move` and `copy`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Value for `add`, `replace` and `test`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Envoy Gateway `HTTPRouteFilter` spec.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "gateway.envoyproxy.io",
    version = "v1alpha1",
    kind = "HTTPRouteFilter",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRouteFilterSpec {
    /// Fixed response returned instead of forwarding upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_response: Option<HTTPDirectResponseFilter>,
}

/// Fixed response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HTTPDirectResponseFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<CustomResponseBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i32>,
}

/// Body of a fixed response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomResponseBody {
    /// Always `Inline` for operator-generated filters
    #[serde(rename = "type")]
    pub body_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<String>,
}

impl HTTPDirectResponseFilter {
    /// A plain-text fixed response.
    #[must_use]
    pub fn plain_text(status_code: i32, body: &str) -> Self {
        Self {
            content_type: Some("text/plain".to_string()),
            body: Some(CustomResponseBody {
                body_type: "Inline".to_string(),
                inline: Some(body.to_string()),
            }),
            status_code: Some(status_code),
        }
    }
}
