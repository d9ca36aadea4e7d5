// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Narrow typed view of cert-manager ACME `Challenge` objects.
//!
//! cert-manager types are not linked into the operator. Challenges are read as
//! [`DynamicObject`]s and converted into [`AcmeChallenge`], which carries only
//! the fields the HTTP-01 router reads. Conversion goes through `serde_json`,
//! so a schema mismatch surfaces as a typed error instead of a panic deep in
//! field-path lookups.

use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::ResourceExt;
use serde::Deserialize;
use std::collections::BTreeMap;

/// cert-manager ACME API group
pub const ACME_GROUP: &str = "acme.cert-manager.io";

/// cert-manager ACME API version
pub const ACME_VERSION: &str = "v1";

/// Kind of ACME challenges
pub const KIND_CHALLENGE: &str = "Challenge";

/// Challenge type served by the HTTP-01 router
pub const CHALLENGE_TYPE_HTTP01: &str = "HTTP-01";

/// States after which cert-manager no longer needs the challenge presented.
const FINAL_STATES: [&str; 4] = ["valid", "invalid", "expired", "errored"];

/// `ApiResource` for dynamic access to `Challenge` objects.
#[must_use]
pub fn challenge_api_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(ACME_GROUP, ACME_VERSION, KIND_CHALLENGE),
        "challenges",
    )
}

/// The fields of a cert-manager `Challenge` the operator reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcmeChallenge {
    pub name: String,
    pub namespace: String,
    pub uid: Option<String>,
    pub annotations: BTreeMap<String, String>,
    /// Hostname being validated
    pub dns_name: String,
    /// Token served under `/.well-known/acme-challenge/`
    pub token: String,
    /// Key authorization returned as the response body
    pub key: String,
    /// `HTTP-01` or `DNS-01`
    pub challenge_type: String,
    /// cert-manager state (`pending`, `valid`, ...); empty before first sync
    pub state: String,
    pub presented: bool,
    pub processing: bool,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ChallengeSpecView {
    #[serde(default)]
    dns_name: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    key: String,
    #[serde(default, rename = "type")]
    challenge_type: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ChallengeStatusView {
    #[serde(default)]
    state: String,
    #[serde(default)]
    presented: bool,
    #[serde(default)]
    processing: bool,
}

/// Error converting a dynamic object into an [`AcmeChallenge`].
#[derive(Debug, thiserror::Error)]
pub enum ChallengeViewError {
    #[error("challenge {0} has no namespace")]
    MissingNamespace(String),
    #[error("challenge {name} has a malformed {field}: {source}")]
    Malformed {
        name: String,
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl TryFrom<&DynamicObject> for AcmeChallenge {
    type Error = ChallengeViewError;

    fn try_from(obj: &DynamicObject) -> Result<Self, Self::Error> {
        let name = obj.name_any();
        let namespace = obj
            .namespace()
            .ok_or_else(|| ChallengeViewError::MissingNamespace(name.clone()))?;

        let spec: ChallengeSpecView = match obj.data.get("spec") {
            Some(value) => serde_json::from_value(value.clone()).map_err(|source| {
                ChallengeViewError::Malformed {
                    name: name.clone(),
                    field: "spec",
                    source,
                }
            })?,
            None => ChallengeSpecView::default(),
        };
        let status: ChallengeStatusView = match obj.data.get("status") {
            Some(value) => serde_json::from_value(value.clone()).map_err(|source| {
                ChallengeViewError::Malformed {
                    name: name.clone(),
                    field: "status",
                    source,
                }
            })?,
            None => ChallengeStatusView::default(),
        };

        Ok(Self {
            uid: obj.uid(),
            annotations: obj.annotations().clone(),
            name,
            namespace,
            dns_name: spec.dns_name.trim_end_matches('.').to_ascii_lowercase(),
            token: spec.token,
            key: spec.key,
            challenge_type: spec.challenge_type,
            state: status.state,
            presented: status.presented,
            processing: status.processing,
        })
    }
}

impl AcmeChallenge {
    /// Returns `true` while the challenge response must be served.
    #[must_use]
    pub fn needs_solver(&self) -> bool {
        self.challenge_type == CHALLENGE_TYPE_HTTP01
            && !self.token.is_empty()
            && !self.key.is_empty()
            && !FINAL_STATES.contains(&self.state.as_str())
    }

    /// Request path the ACME server fetches.
    #[must_use]
    pub fn solver_path(&self) -> String {
        format!("/.well-known/acme-challenge/{}", self.token)
    }
}

#[cfg(test)]
#[path = "cert_manager_tests.rs"]
mod cert_manager_tests;
