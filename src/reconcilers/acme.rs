// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! ACME HTTP-01 challenge routing.
//!
//! cert-manager creates a `Challenge` per hostname it validates. For hostnames
//! served by a managed Gateway, the operator answers the challenge at the edge:
//! an Envoy Gateway `HTTPRouteFilter` returns the key authorization, and an
//! `HTTPRoute` on the hostname's HTTP listener sends
//! `/.well-known/acme-challenge/<token>` to it.
//!
//! Both objects carry the challenge identity as labels instead of an owner
//! reference to the foreign `Challenge`. Every pass also deletes solver
//! objects whose challenge is gone or finished.

use crate::cert_manager::{challenge_api_resource, AcmeChallenge};
use crate::constants::{
    ENVOY_GATEWAY_API_GROUP, GATEWAY_API_GROUP, KIND_GATEWAY, KIND_HTTP_ROUTE, KIND_HTTP_ROUTE_FILTER,
};
use crate::context::Context;
use crate::envoy_gateway::{HTTPDirectResponseFilter, HTTPRouteFilter as EnvoyHTTPRouteFilter, HTTPRouteFilterSpec};
use crate::errors::OwnershipError;
use crate::gateway_api::{
    Gateway, HTTPPathMatch, HTTPRoute, HTTPRouteFilter, HTTPRouteFilterType, HTTPRouteMatch,
    HTTPRouteRule, HTTPRouteSpec, LocalObjectReference, ParentReference,
};
use crate::labels::{
    ACME_CHALLENGE_NAMESPACE_LABEL, ACME_CHALLENGE_NAME_LABEL, ACME_GATEWAY_ANNOTATION, K8S_PART_OF,
    PART_OF_NETWORK_SERVICES,
};
use crate::metrics;
use crate::reconcilers::pagination::list_all;
use crate::reconcilers::resources::{create_or_update, delete_if_exists, OperationResult};
use anyhow::Result;
use kube::api::ListParams;
use kube::core::DynamicObject;
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use tracing::{debug, info, warn};

/// Name of the route and filter solving `challenge_name`.
#[must_use]
pub fn solver_name(challenge_name: &str) -> String {
    format!("acme-{challenge_name}")
}

/// Labels identifying the solver objects of a challenge.
#[must_use]
pub fn solver_labels(challenge: &AcmeChallenge) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_PART_OF.to_string(), PART_OF_NETWORK_SERVICES.to_string()),
        (ACME_CHALLENGE_NAME_LABEL.to_string(), challenge.name.clone()),
        (ACME_CHALLENGE_NAMESPACE_LABEL.to_string(), challenge.namespace.clone()),
    ])
}

/// Gateway and HTTP listener that serve the challenge hostname.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolverTarget {
    pub gateway: String,
    pub listener: String,
}

/// Find the HTTP listener answering for the challenge hostname.
///
/// Only gateways of `gateway_class_name` are considered. The gateway named by
/// the challenge's solver annotation is preferred; otherwise gateways are
/// tried by name.
#[must_use]
pub fn find_solver_target(
    challenge: &AcmeChallenge,
    gateways: &[Gateway],
    gateway_class_name: &str,
) -> Option<SolverTarget> {
    let mut candidates: Vec<&Gateway> = gateways
        .iter()
        .filter(|g| g.spec.gateway_class_name == gateway_class_name)
        .collect();
    candidates.sort_by_key(|g| g.name_any());
    if let Some(preferred) = challenge.annotations.get(ACME_GATEWAY_ANNOTATION) {
        candidates.sort_by_key(|g| g.name_any() != *preferred);
    }

    candidates.into_iter().find_map(|gateway| {
        gateway
            .spec
            .listeners
            .iter()
            .find(|l| {
                l.protocol == "HTTP"
                    && l.hostname
                        .as_deref()
                        .is_some_and(|h| h.trim_end_matches('.').eq_ignore_ascii_case(&challenge.dns_name))
            })
            .map(|l| SolverTarget {
                gateway: gateway.name_any(),
                listener: l.name.clone(),
            })
    })
}

/// Direct-response filter returning the key authorization.
#[must_use]
pub fn build_solver_filter(challenge: &AcmeChallenge) -> EnvoyHTTPRouteFilter {
    let mut filter = EnvoyHTTPRouteFilter::new(
        &solver_name(&challenge.name),
        HTTPRouteFilterSpec {
            direct_response: Some(HTTPDirectResponseFilter::plain_text(200, &challenge.key)),
        },
    );
    filter.metadata.namespace = Some(challenge.namespace.clone());
    filter.metadata.labels = Some(solver_labels(challenge));
    filter
}

/// Route sending the challenge path on the target listener to the solver filter.
#[must_use]
pub fn build_solver_route(challenge: &AcmeChallenge, target: &SolverTarget) -> HTTPRoute {
    let name = solver_name(&challenge.name);
    let mut route = HTTPRoute::new(
        &name,
        HTTPRouteSpec {
            parent_refs: vec![ParentReference {
                group: Some(GATEWAY_API_GROUP.to_string()),
                kind: Some(KIND_GATEWAY.to_string()),
                namespace: None,
                name: target.gateway.clone(),
                section_name: Some(target.listener.clone()),
                port: None,
            }],
            hostnames: vec![challenge.dns_name.clone()],
            rules: vec![HTTPRouteRule {
                name: None,
                matches: vec![HTTPRouteMatch {
                    path: Some(HTTPPathMatch {
                        match_type: Some("Exact".to_string()),
                        value: Some(challenge.solver_path()),
                    }),
                    ..HTTPRouteMatch::default()
                }],
                filters: vec![HTTPRouteFilter {
                    filter_type: HTTPRouteFilterType::ExtensionRef,
                    extension_ref: Some(LocalObjectReference {
                        group: ENVOY_GATEWAY_API_GROUP.to_string(),
                        kind: KIND_HTTP_ROUTE_FILTER.to_string(),
                        name: name.clone(),
                    }),
                    ..HTTPRouteFilter::default()
                }],
                backend_refs: vec![],
            }],
        },
    );
    route.spec.apply_defaults();
    route.metadata.namespace = Some(challenge.namespace.clone());
    route.metadata.labels = Some(solver_labels(challenge));
    route
}

/// Solver object names whose challenge is not in `active`.
///
/// `labelled` pairs each solver object name with its challenge-name label.
#[must_use]
pub fn orphaned_solvers(labelled: &[(String, String)], active: &BTreeSet<String>) -> Vec<String> {
    labelled
        .iter()
        .filter(|(_, challenge)| !active.contains(challenge))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Reconciles one cert-manager `Challenge`.
///
/// # Errors
///
/// Returns an error if the challenge cannot be read as an ACME challenge or
/// an API call fails.
pub async fn reconcile_challenge(ctx: &Context, obj: &DynamicObject) -> Result<()> {
    let challenge = AcmeChallenge::try_from(obj)?;
    let namespace = challenge.namespace.clone();
    let name = solver_name(&challenge.name);

    debug!(namespace = %namespace, challenge = %challenge.name, "Reconciling ACME challenge");

    let route_api: Api<HTTPRoute> = Api::namespaced(ctx.client(), &namespace);
    let filter_api: Api<EnvoyHTTPRouteFilter> = Api::namespaced(ctx.client(), &namespace);

    let target = if challenge.needs_solver() && obj.meta().deletion_timestamp.is_none() {
        let gateways = list_all(
            &Api::<Gateway>::namespaced(ctx.client(), &namespace),
            ListParams::default(),
        )
        .await?;
        find_solver_target(&challenge, &gateways, &ctx.config.gateway.gateway_class_name)
    } else {
        None
    };

    match target {
        Some(target) => {
            info!(
                namespace = %namespace,
                challenge = %challenge.name,
                gateway = %target.gateway,
                listener = %target.listener,
                "Serving ACME HTTP-01 challenge"
            );
            let labels = solver_labels(&challenge);
            let filter = build_solver_filter(&challenge);
            apply_labelled(&filter_api, &filter, &labels, |live, want| live.spec = want.spec.clone()).await?;
            let route = build_solver_route(&challenge, &target);
            apply_labelled(&route_api, &route, &labels, |live, want| live.spec = want.spec.clone()).await?;
        }
        None => {
            delete_solver(&route_api, &filter_api, &name).await?;
        }
    }

    collect_orphans(ctx, &namespace).await
}

/// Delete solver routes and filters of `namespace` whose challenge no longer
/// needs them.
///
/// # Errors
///
/// Returns an error if listing or deleting fails.
pub async fn collect_orphans(ctx: &Context, namespace: &str) -> Result<()> {
    let challenge_api: Api<DynamicObject> =
        Api::namespaced_with(ctx.client(), namespace, &challenge_api_resource());
    let active: BTreeSet<String> = challenge_api
        .list(&ListParams::default())
        .await?
        .items
        .iter()
        .filter_map(|obj| AcmeChallenge::try_from(obj).ok())
        .filter(AcmeChallenge::needs_solver)
        .map(|c| c.name)
        .collect();

    let by_label = ListParams::default().labels(ACME_CHALLENGE_NAME_LABEL);
    let route_api: Api<HTTPRoute> = Api::namespaced(ctx.client(), namespace);
    let filter_api: Api<EnvoyHTTPRouteFilter> = Api::namespaced(ctx.client(), namespace);

    let routes = challenge_labelled(list_all(&route_api, by_label.clone()).await?);
    for orphan in orphaned_solvers(&routes, &active) {
        if delete_if_exists(&route_api, &orphan).await? {
            info!(namespace = %namespace, route = %orphan, "Deleted orphaned ACME solver route");
            metrics::record_resource_deleted(KIND_HTTP_ROUTE);
        }
    }
    let filters = challenge_labelled(list_all(&filter_api, by_label).await?);
    for orphan in orphaned_solvers(&filters, &active) {
        if delete_if_exists(&filter_api, &orphan).await? {
            info!(namespace = %namespace, filter = %orphan, "Deleted orphaned ACME solver filter");
            metrics::record_resource_deleted(KIND_HTTP_ROUTE_FILTER);
        }
    }
    Ok(())
}

fn challenge_labelled<K: ResourceExt>(objects: Vec<K>) -> Vec<(String, String)> {
    objects
        .into_iter()
        .filter_map(|o| {
            let challenge = o.labels().get(ACME_CHALLENGE_NAME_LABEL)?.clone();
            Some((o.name_any(), challenge))
        })
        .collect()
}

async fn delete_solver(
    route_api: &Api<HTTPRoute>,
    filter_api: &Api<EnvoyHTTPRouteFilter>,
    name: &str,
) -> Result<()> {
    if delete_if_exists(route_api, name).await? {
        metrics::record_resource_deleted(KIND_HTTP_ROUTE);
    }
    if delete_if_exists(filter_api, name).await? {
        metrics::record_resource_deleted(KIND_HTTP_ROUTE_FILTER);
    }
    Ok(())
}

/// Write a solver object, refusing to take over an object that carries
/// another challenge's labels.
async fn apply_labelled<T>(
    api: &Api<T>,
    desired: &T,
    labels: &BTreeMap<String, String>,
    sync: fn(&mut T, &T),
) -> Result<()>
where
    T: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned,
{
    let (_, operation) = create_or_update(api, desired.clone(), |live| {
        let current = live.labels().get(ACME_CHALLENGE_NAME_LABEL);
        let wanted = labels.get(ACME_CHALLENGE_NAME_LABEL);
        if live.meta().resource_version.is_some() && current != wanted {
            warn!(name = %live.name_any(), "Solver object exists without matching challenge labels");
            return Err(OwnershipError::Conflict {
                kind: T::kind(&()).to_string(),
                namespace: live.namespace().unwrap_or_default(),
                name: live.name_any(),
                owner_kind: "Challenge".to_string(),
                owner_name: current.cloned().unwrap_or_default(),
            }
            .into());
        }
        live.labels_mut()
            .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        sync(live, desired);
        Ok(())
    })
    .await?;

    match operation {
        OperationResult::Created => metrics::record_resource_created(&T::kind(&())),
        OperationResult::Updated => metrics::record_resource_updated(&T::kind(&())),
        OperationResult::Unchanged => {}
    }
    Ok(())
}

#[cfg(test)]
#[path = "acme_tests.rs"]
mod acme_tests;
