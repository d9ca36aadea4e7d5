// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `HTTPProxy` reconciliation.
//!
//! Each pass recomputes the proxy's dependents with
//! [`desired::collect_desired_resources`], writes them with
//! [`create_or_update`], and then reads the live Gateway back to fill in the
//! proxy status:
//!
//! - `Accepted` - every backend endpoint is valid
//! - `Programmed` - no dependent is owned by someone else and the Gateway is
//!   programmed (the `default-https` listener too when a rule uses a connector)
//! - `HostnamesVerified` - every custom hostname listener was accepted
//! - `DNSRecordsProgrammed` - mirrored from the Gateway
//!
//! Connector tunnels are wired through an `EnvoyPatchPolicy` in the
//! downstream cluster. Owner references cannot reach it there, so the
//! `HTTPProxy` finalizer deletes it explicitly.

pub mod desired;
pub mod endpoint;
pub mod tunnel;

use crate::constants::{
    DEFAULT_HTTPS_LISTENER_NAME, KIND_ENDPOINT_SLICE, KIND_ENVOY_PATCH_POLICY, KIND_HTTP_PROXY,
    KIND_HTTP_ROUTE_FILTER, PENDING_REQUEUE_DURATION_SECS,
};
use crate::context::Context;
use crate::crd::{Condition, Connector, HTTPProxy, HTTPProxyStatus, ProxyAddress};
use crate::envoy_gateway::{EnvoyPatchPolicy, HTTPRouteFilter as EnvoyHTTPRouteFilter};
use crate::errors::ownership_conflict;
use crate::gateway_api::{Gateway, HTTPRoute};
use crate::labels::{
    upstream_labels, ENDPOINT_SLICE_MANAGER, FINALIZER_HTTP_PROXY, K8S_ENDPOINT_SLICE_MANAGED_BY,
    UPSTREAM_NAMESPACE_LABEL, UPSTREAM_NAME_LABEL,
};
use crate::metrics;
use crate::reconcilers::finalizers::{ensure_finalizer, handle_deletion, FinalizerCleanup};
use crate::reconcilers::pagination::{list_all, list_labelled};
use crate::reconcilers::resources::{
    controller_reference, create_or_update, delete_if_exists, delete_if_owned,
    ensure_controller_reference, ensure_upstream_labels, is_controlled_by, OperationResult,
};
use crate::reconcilers::result::{ReconcileResult, StatusPatch};
use crate::reconcilers::status::{create_condition, find_condition, remove_condition, set_condition};
use crate::status_reasons::{
    CONDITION_TYPE_ACCEPTED, CONDITION_TYPE_DNS_RECORDS_PROGRAMMED,
    CONDITION_TYPE_HOSTNAMES_VERIFIED, CONDITION_TYPE_PROGRAMMED, REASON_ACCEPTED,
    REASON_CONFLICT, REASON_HOSTNAMES_VERIFIED, REASON_INVALID, REASON_PENDING,
    REASON_PROGRAMMED, REASON_UNVERIFIED_HOSTNAMES_PRESENT, STATUS_FALSE, STATUS_TRUE,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use desired::{collect_desired_resources, hostname_listener_names, DesiredResources};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ListParams;
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, info, warn};
use tunnel::{build_tunnel_patch_policy, tunnel_policy_name};

/// Reconciles an `HTTPProxy`.
///
/// # Returns
///
/// The requeue the proxy asks for; `None` once it is fully programmed.
///
/// # Errors
///
/// Returns an error when an API call fails. Ownership conflicts and invalid
/// backends are reported through status conditions instead.
pub async fn reconcile_httpproxy(ctx: &Context, proxy: &HTTPProxy) -> Result<Option<Duration>> {
    let namespace = proxy.namespace().unwrap_or_default();
    let name = proxy.name_any();

    info!("Reconciling HTTPProxy: {}/{}", namespace, name);

    if proxy.metadata.deletion_timestamp.is_some() {
        handle_deletion(ctx, proxy, FINALIZER_HTTP_PROXY).await?;
        return Ok(None);
    }
    ensure_finalizer(&ctx.client(), proxy, FINALIZER_HTTP_PROXY).await?;

    let generation = proxy.metadata.generation;
    let now = ctx.now();
    let api: Api<HTTPProxy> = Api::namespaced(ctx.client(), &namespace);
    let mut status = proxy.status.clone().unwrap_or_default();
    let mut result = ReconcileResult::new();

    let connectors = load_connectors(ctx, proxy).await?;
    let desired = match collect_desired_resources(proxy, &ctx.config.gateway, &connectors) {
        Ok(desired) => desired,
        Err(e) => {
            warn!(namespace = %namespace, name = %name, error = %e, "HTTPProxy has invalid backends");
            set_condition(
                &mut status.conditions,
                create_condition(CONDITION_TYPE_ACCEPTED, STATUS_FALSE, REASON_INVALID, &e.to_string(), generation),
                now,
            );
            set_condition(
                &mut status.conditions,
                create_condition(
                    CONDITION_TYPE_PROGRAMMED,
                    STATUS_FALSE,
                    REASON_INVALID,
                    "Dependents were not programmed because the proxy is invalid",
                    generation,
                ),
                now,
            );
            if let Some(patch) = StatusPatch::if_changed(api, proxy, proxy.status.as_ref(), &status)? {
                result.add_status_write(patch);
            }
            return result.complete().await;
        }
    };
    set_condition(
        &mut status.conditions,
        create_condition(
            CONDITION_TYPE_ACCEPTED,
            STATUS_TRUE,
            REASON_ACCEPTED,
            "HTTPProxy is valid",
            generation,
        ),
        now,
    );

    let applied = apply_dependents(ctx, proxy, &desired, &mut result).await?;

    if applied.conflicts.is_empty() {
        if let Some(gateway) = &applied.gateway {
            status = status_from_gateway(proxy, gateway, &ctx.config.gateway.target_domain, status, now);
            if let Err(e) = sync_tunnel_policy(ctx, proxy, &desired, gateway).await {
                match ownership_conflict(&e) {
                    Some(conflict) => {
                        set_condition(
                            &mut status.conditions,
                            create_condition(
                                CONDITION_TYPE_PROGRAMMED,
                                STATUS_FALSE,
                                REASON_CONFLICT,
                                &conflict.to_string(),
                                generation,
                            ),
                            now,
                        );
                    }
                    None => result.add_error(e.context("syncing connector tunnel patch policy")),
                }
            }
        }
    } else {
        warn!(
            namespace = %namespace,
            name = %name,
            conflicts = ?applied.conflicts,
            "HTTPProxy dependents are owned by another controller"
        );
        set_condition(
            &mut status.conditions,
            create_condition(
                CONDITION_TYPE_PROGRAMMED,
                STATUS_FALSE,
                REASON_CONFLICT,
                &applied.conflicts.join("; "),
                generation,
            ),
            now,
        );
    }

    if !is_programmed(&status) {
        result.set_requeue_after(Duration::from_secs(PENDING_REQUEUE_DURATION_SECS));
    }
    if let Some(patch) = StatusPatch::if_changed(api, proxy, proxy.status.as_ref(), &status)? {
        result.add_status_write(patch);
    }

    debug!(namespace = %namespace, name = %name, outcome = ?result, "HTTPProxy reconcile finished");
    result.complete().await
}

/// Dependents written in one pass.
struct AppliedDependents {
    /// Live Gateway, when it was written
    gateway: Option<Gateway>,
    /// One message per dependent owned by another controller
    conflicts: Vec<String>,
}

async fn apply_dependents(
    ctx: &Context,
    proxy: &HTTPProxy,
    desired: &DesiredResources,
    result: &mut ReconcileResult,
) -> Result<AppliedDependents> {
    let namespace = proxy.namespace().unwrap_or_default();
    let owner_ref = controller_reference(proxy)?;
    let owner_uid = owner_ref.uid.clone();
    let client = ctx.client();

    let mut applied = AppliedDependents {
        gateway: None,
        conflicts: Vec::new(),
    };

    let gateway_api: Api<Gateway> = Api::namespaced(client.clone(), &namespace);
    match apply_owned(&gateway_api, &desired.gateway, &owner_ref, |live, want| {
        live.spec = want.spec.clone();
    })
    .await
    {
        Ok(gateway) => applied.gateway = Some(gateway),
        Err(e) => record_apply_error(e, &mut applied.conflicts, result),
    }

    let route_api: Api<HTTPRoute> = Api::namespaced(client.clone(), &namespace);
    if let Err(e) = apply_owned(&route_api, &desired.http_route, &owner_ref, |live, want| {
        live.spec = want.spec.clone();
    })
    .await
    {
        record_apply_error(e, &mut applied.conflicts, result);
    }

    let slice_api: Api<EndpointSlice> = Api::namespaced(client.clone(), &namespace);
    for slice in &desired.endpoint_slices {
        if let Err(e) = apply_owned(&slice_api, slice, &owner_ref, |live, want| {
            live.address_type.clone_from(&want.address_type);
            live.endpoints.clone_from(&want.endpoints);
            live.ports.clone_from(&want.ports);
        })
        .await
        {
            record_apply_error(e, &mut applied.conflicts, result);
        }
    }

    let filter_api: Api<EnvoyHTTPRouteFilter> = Api::namespaced(client.clone(), &namespace);
    match &desired.offline_filter {
        Some(filter) => {
            if let Err(e) = apply_owned(&filter_api, filter, &owner_ref, |live, want| {
                live.spec = want.spec.clone();
            })
            .await
            {
                record_apply_error(e, &mut applied.conflicts, result);
            }
        }
        None => {
            let name = desired::offline_filter_name(&proxy.name_any());
            if delete_if_owned(&filter_api, &name, &owner_uid).await? {
                metrics::record_resource_deleted(KIND_HTTP_ROUTE_FILTER);
            }
        }
    }

    let desired_slices: BTreeSet<String> = desired
        .endpoint_slices
        .iter()
        .map(ResourceExt::name_any)
        .collect();
    let managed = BTreeMap::from([(
        K8S_ENDPOINT_SLICE_MANAGED_BY.to_string(),
        ENDPOINT_SLICE_MANAGER.to_string(),
    )]);
    for stale in list_labelled(&slice_api, &managed)
        .await?
        .into_iter()
        .filter(|s| is_controlled_by(s, &owner_uid) && !desired_slices.contains(&s.name_any()))
    {
        if delete_if_exists(&slice_api, &stale.name_any()).await? {
            metrics::record_resource_deleted(KIND_ENDPOINT_SLICE);
        }
    }

    Ok(applied)
}

/// Write `desired` as a dependent controlled by `owner_ref`.
///
/// Labels and annotations of `desired` are merged into the live object;
/// `sync` copies the rest of the desired state.
async fn apply_owned<T>(
    api: &Api<T>,
    desired: &T,
    owner_ref: &OwnerReference,
    sync: fn(&mut T, &T),
) -> Result<T>
where
    T: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned,
{
    let (live, operation) = create_or_update(api, desired.clone(), |live| {
        ensure_controller_reference(live, owner_ref)?;
        if !desired.labels().is_empty() {
            live.labels_mut()
                .extend(desired.labels().iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if !desired.annotations().is_empty() {
            live.annotations_mut()
                .extend(desired.annotations().iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        sync(live, desired);
        Ok(())
    })
    .await?;

    match operation {
        OperationResult::Created => metrics::record_resource_created(&T::kind(&())),
        OperationResult::Updated => metrics::record_resource_updated(&T::kind(&())),
        OperationResult::Unchanged => {}
    }
    Ok(live)
}

fn record_apply_error(err: anyhow::Error, conflicts: &mut Vec<String>, result: &mut ReconcileResult) {
    match ownership_conflict(&err) {
        Some(conflict) => conflicts.push(conflict.to_string()),
        None => result.add_error(err),
    }
}

/// Connectors of the proxy namespace, when any rule references one.
async fn load_connectors(ctx: &Context, proxy: &HTTPProxy) -> Result<BTreeMap<String, Connector>> {
    let uses_connector = proxy
        .spec
        .rules
        .iter()
        .flat_map(|r| r.backends.iter())
        .any(|b| b.connector.is_some());
    if !uses_connector {
        return Ok(BTreeMap::new());
    }

    let namespace = proxy.namespace().unwrap_or_default();
    let api: Api<Connector> = Api::namespaced(ctx.client(), &namespace);
    Ok(list_all(&api, ListParams::default())
        .await?
        .into_iter()
        .map(|c| (c.name_any(), c))
        .collect())
}

/// Write or delete the downstream tunnel patch policy of a proxy.
///
/// Patches are only written once the `default-https` listener is programmed;
/// before that Envoy Gateway has not rendered the route configurations the
/// patches address.
async fn sync_tunnel_policy(
    ctx: &Context,
    proxy: &HTTPProxy,
    desired: &DesiredResources,
    gateway: &Gateway,
) -> Result<()> {
    let upstream_namespace = proxy.namespace().unwrap_or_default();
    let namespace = ctx.downstream_namespace(&upstream_namespace);

    let Some(policy) = build_tunnel_patch_policy(gateway, &namespace, &desired.tunnels) else {
        delete_tunnel_policy(ctx, proxy).await?;
        return Ok(());
    };

    if !gateway.is_listener_condition_true(DEFAULT_HTTPS_LISTENER_NAME, CONDITION_TYPE_PROGRAMMED) {
        debug!(
            namespace = %upstream_namespace,
            name = %proxy.name_any(),
            "Waiting for the default-https listener before wiring connector tunnels"
        );
        return Ok(());
    }

    let labels = upstream_labels(
        &ctx.cluster.name,
        KIND_HTTP_PROXY,
        &proxy.name_any(),
        &upstream_namespace,
    );
    let api: Api<EnvoyPatchPolicy> = Api::namespaced(ctx.downstream_client(), &namespace);
    let (_, operation) = create_or_update(&api, policy.clone(), |live| {
        ensure_upstream_labels(live, &labels)?;
        live.spec = policy.spec.clone();
        Ok(())
    })
    .await?;
    match operation {
        OperationResult::Created => metrics::record_resource_created(KIND_ENVOY_PATCH_POLICY),
        OperationResult::Updated => metrics::record_resource_updated(KIND_ENVOY_PATCH_POLICY),
        OperationResult::Unchanged => {}
    }
    Ok(())
}

/// Delete the downstream tunnel patch policy of `proxy` when it carries the
/// proxy's upstream labels.
///
/// # Errors
///
/// Returns an error if the downstream API calls fail.
pub async fn delete_tunnel_policy(ctx: &Context, proxy: &HTTPProxy) -> Result<bool> {
    let upstream_namespace = proxy.namespace().unwrap_or_default();
    let namespace = ctx.downstream_namespace(&upstream_namespace);
    let name = tunnel_policy_name(&proxy.name_any());
    let api: Api<EnvoyPatchPolicy> = Api::namespaced(ctx.downstream_client(), &namespace);

    let Some(live) = api.get_opt(&name).await? else {
        return Ok(false);
    };
    let labels = live.labels();
    let ours = labels.get(UPSTREAM_NAME_LABEL) == Some(&proxy.name_any())
        && labels.get(UPSTREAM_NAMESPACE_LABEL) == Some(&upstream_namespace);
    if !ours {
        warn!(namespace = %namespace, name = %name, "Patch policy belongs to another source, leaving it");
        return Ok(false);
    }

    let deleted = delete_if_exists(&api, &name).await?;
    if deleted {
        metrics::record_resource_deleted(KIND_ENVOY_PATCH_POLICY);
    }
    Ok(deleted)
}

#[async_trait::async_trait]
impl FinalizerCleanup for HTTPProxy {
    async fn cleanup(&self, ctx: &Context) -> Result<()> {
        if delete_tunnel_policy(ctx, self).await? {
            info!(
                "Deleted connector tunnel patch policy of HTTPProxy {}/{}",
                self.namespace().unwrap_or_default(),
                self.name_any()
            );
        }
        Ok(())
    }
}

/// Fold the live Gateway into the proxy status.
///
/// Sets addresses, hostnames, `Programmed` and `HostnamesVerified`, and
/// mirrors the Gateway's `DNSRecordsProgrammed` condition (removing it when
/// the Gateway has none).
#[must_use]
pub fn status_from_gateway(
    proxy: &HTTPProxy,
    gateway: &Gateway,
    target_domain: &str,
    mut status: HTTPProxyStatus,
    now: DateTime<Utc>,
) -> HTTPProxyStatus {
    let generation = proxy.metadata.generation;

    status.addresses = gateway
        .status
        .as_ref()
        .map(|s| {
            s.addresses
                .iter()
                .map(|a| ProxyAddress {
                    address_type: a.address_type.clone(),
                    value: a.value.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    let (verified, unverified) = partition_custom_hostnames(proxy, gateway);
    status.hostnames = gateway
        .canonical_hostname(target_domain)
        .into_iter()
        .chain(verified)
        .collect();

    set_condition(&mut status.conditions, programmed_condition(proxy, gateway, generation), now);
    set_condition(
        &mut status.conditions,
        hostnames_verified_condition(&unverified, generation),
        now,
    );

    match find_condition(
        gateway.status.as_ref().map_or(&[][..], |s| s.conditions.as_slice()),
        CONDITION_TYPE_DNS_RECORDS_PROGRAMMED,
    ) {
        Some(dns) => {
            set_condition(
                &mut status.conditions,
                Condition {
                    observed_generation: generation,
                    ..dns.clone()
                },
                now,
            );
        }
        None => {
            remove_condition(&mut status.conditions, CONDITION_TYPE_DNS_RECORDS_PROGRAMMED);
        }
    }

    status
}

/// `Programmed` condition of a proxy given its live Gateway.
#[must_use]
pub fn programmed_condition(proxy: &HTTPProxy, gateway: &Gateway, generation: Option<i64>) -> Condition {
    if !gateway.is_condition_true(CONDITION_TYPE_PROGRAMMED) {
        return create_condition(
            CONDITION_TYPE_PROGRAMMED,
            STATUS_FALSE,
            REASON_PENDING,
            "Waiting for the Gateway to be programmed",
            generation,
        );
    }

    let uses_connector = proxy
        .spec
        .rules
        .iter()
        .flat_map(|r| r.backends.iter())
        .any(|b| b.connector.is_some());
    if uses_connector
        && !gateway.is_listener_condition_true(DEFAULT_HTTPS_LISTENER_NAME, CONDITION_TYPE_PROGRAMMED)
    {
        return create_condition(
            CONDITION_TYPE_PROGRAMMED,
            STATUS_FALSE,
            REASON_PENDING,
            "Waiting for listener default-https to be programmed",
            generation,
        );
    }

    create_condition(
        CONDITION_TYPE_PROGRAMMED,
        STATUS_TRUE,
        REASON_PROGRAMMED,
        "Gateway and HTTPRoute are programmed",
        generation,
    )
}

fn hostnames_verified_condition(unverified: &[String], generation: Option<i64>) -> Condition {
    if unverified.is_empty() {
        return create_condition(
            CONDITION_TYPE_HOSTNAMES_VERIFIED,
            STATUS_TRUE,
            REASON_HOSTNAMES_VERIFIED,
            "All hostnames are verified",
            generation,
        );
    }
    create_condition(
        CONDITION_TYPE_HOSTNAMES_VERIFIED,
        STATUS_FALSE,
        REASON_UNVERIFIED_HOSTNAMES_PRESENT,
        &format!("Unverified hostnames: {}", unverified.join(", ")),
        generation,
    )
}

/// Split the proxy's custom hostnames by whether their HTTPS listener was accepted.
fn partition_custom_hostnames(proxy: &HTTPProxy, gateway: &Gateway) -> (Vec<String>, Vec<String>) {
    let mut seen = BTreeSet::new();
    let mut verified = Vec::new();
    let mut unverified = Vec::new();
    for hostname in &proxy.spec.hostnames {
        let hostname = hostname.to_ascii_lowercase();
        if !seen.insert(hostname.clone()) {
            continue;
        }
        let (_, https) = hostname_listener_names(&hostname);
        if gateway.is_listener_condition_true(&https, CONDITION_TYPE_ACCEPTED) {
            verified.push(hostname);
        } else {
            unverified.push(hostname);
        }
    }
    (verified, unverified)
}

fn is_programmed(status: &HTTPProxyStatus) -> bool {
    crate::reconcilers::status::is_condition_true(&status.conditions, CONDITION_TYPE_PROGRAMMED)
}
