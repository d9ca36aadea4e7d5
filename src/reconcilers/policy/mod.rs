// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `TrafficProtectionPolicy` reconciliation.
//!
//! Attachment is decided across all policies of a namespace, so every pass
//! resolves the whole namespace, writes the status of the policy being
//! reconciled and rewrites the WAF patch policy of every managed gateway in
//! it. Patch policies live downstream and carry the upstream gateway
//! identity as labels.

pub mod attachment;
pub mod coraza;
pub mod patches;

use crate::constants::{KIND_ENVOY_PATCH_POLICY, KIND_GATEWAY, PENDING_REQUEUE_DURATION_SECS};
use crate::context::Context;
use crate::crd::TrafficProtectionPolicy;
use crate::envoy_gateway::EnvoyPatchPolicy;
use crate::errors::ownership_conflict;
use crate::gateway_api::{Gateway, HTTPRoute};
use crate::labels::{upstream_labels, FINALIZER_TRAFFIC_PROTECTION_POLICY, UPSTREAM_KIND_LABEL, UPSTREAM_NAME_LABEL, UPSTREAM_NAMESPACE_LABEL};
use crate::metrics;
use crate::reconcilers::finalizers::{ensure_finalizer, handle_deletion, FinalizerCleanup};
use crate::reconcilers::pagination::list_all;
use crate::reconcilers::resources::{create_or_update, delete_if_exists, ensure_upstream_labels, OperationResult};
use crate::reconcilers::result::{ReconcileResult, StatusPatch};
use anyhow::Result;
use attachment::{ancestor_statuses, resolve_attachments, Attachment};
use coraza::compile_directives;
use kube::api::ListParams;
use kube::{Api, ResourceExt};
use patches::{build_waf_patch_policy, waf_policy_name, ScopedDirectives};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Compiled directives per policy name, and the compile error of the
/// policies that failed.
#[must_use]
pub fn compile_policies(
    policies: &[TrafficProtectionPolicy],
) -> (BTreeMap<String, Vec<String>>, BTreeMap<String, String>) {
    let mut compiled = BTreeMap::new();
    let mut invalid = BTreeMap::new();
    for policy in policies {
        match compile_directives(&policy.spec) {
            Ok(directives) => {
                compiled.insert(policy.name_any(), directives);
            }
            Err(e) => {
                invalid.insert(policy.name_any(), e.to_string());
            }
        }
    }
    (compiled, invalid)
}

/// Pair every accepted attachment scope with its policy's directives, in
/// attachment order.
#[must_use]
pub fn scoped_directives(
    attachments: &[Attachment],
    compiled: &BTreeMap<String, Vec<String>>,
) -> Vec<ScopedDirectives> {
    attachments
        .iter()
        .filter(|a| a.is_accepted())
        .filter_map(|a| compiled.get(&a.policy).map(|d| (a, d)))
        .flat_map(|(a, directives)| {
            a.scopes.iter().map(move |scope| ScopedDirectives {
                scope: scope.clone(),
                directives: directives.clone(),
            })
        })
        .collect()
}

/// Namespace-wide view of policies, gateways and attachments.
struct Resolution {
    gateways: Vec<Gateway>,
    attachments: Vec<Attachment>,
    scoped: Vec<ScopedDirectives>,
}

async fn resolve_namespace(ctx: &Context, namespace: &str) -> Result<Resolution> {
    let client = ctx.client();
    let policies = list_all(
        &Api::<TrafficProtectionPolicy>::namespaced(client.clone(), namespace),
        ListParams::default(),
    )
    .await?;
    let gateways: Vec<Gateway> = list_all(&Api::<Gateway>::namespaced(client.clone(), namespace), ListParams::default())
        .await?
        .into_iter()
        .filter(|g| g.spec.gateway_class_name == ctx.config.gateway.gateway_class_name)
        .collect();
    let routes = list_all(&Api::<HTTPRoute>::namespaced(client, namespace), ListParams::default()).await?;

    let (compiled, invalid) = compile_policies(&policies);
    let attachments = resolve_attachments(&policies, &gateways, &routes, &invalid);
    let scoped = scoped_directives(&attachments, &compiled);
    Ok(Resolution {
        gateways,
        attachments,
        scoped,
    })
}

/// Reconciles a `TrafficProtectionPolicy`.
///
/// # Errors
///
/// Returns an error if listing, a patch policy write or the status write fails.
pub async fn reconcile_traffic_protection_policy(
    ctx: &Context,
    policy: &TrafficProtectionPolicy,
) -> Result<Option<Duration>> {
    let namespace = policy.namespace().unwrap_or_default();
    let name = policy.name_any();

    info!("Reconciling TrafficProtectionPolicy: {}/{}", namespace, name);

    if policy.metadata.deletion_timestamp.is_some() {
        handle_deletion(ctx, policy, FINALIZER_TRAFFIC_PROTECTION_POLICY).await?;
        return Ok(None);
    }
    ensure_finalizer(&ctx.client(), policy, FINALIZER_TRAFFIC_PROTECTION_POLICY).await?;

    let resolution = resolve_namespace(ctx, &namespace).await?;
    let mut result = ReconcileResult::new();

    if let Err(e) = sync_patch_policies(ctx, &namespace, &resolution).await {
        match ownership_conflict(&e) {
            Some(conflict) => {
                warn!(namespace = %namespace, name = %name, conflict = %conflict, "WAF patch policy owned by another source");
                result.set_requeue_after(Duration::from_secs(PENDING_REQUEUE_DURATION_SECS));
            }
            None => result.add_error(e.context("syncing WAF patch policies")),
        }
    }

    let current = policy.status.clone().unwrap_or_default();
    let mut status = current.clone();
    status.ancestors = ancestor_statuses(
        &current.ancestors,
        &resolution.attachments,
        &name,
        policy.metadata.generation,
        ctx.now(),
    );
    let accepted = resolution
        .attachments
        .iter()
        .filter(|a| a.policy == name)
        .all(Attachment::is_accepted);
    debug!(namespace = %namespace, name = %name, accepted = accepted, "Resolved policy attachments");
    if !accepted {
        // Targets appear or get released by other policies.
        result.set_requeue_after(Duration::from_secs(PENDING_REQUEUE_DURATION_SECS));
    }

    let api: Api<TrafficProtectionPolicy> = Api::namespaced(ctx.client(), &namespace);
    if let Some(patch) = StatusPatch::if_changed(api, policy, policy.status.as_ref(), &status)? {
        result.add_status_write(patch);
    }
    result.complete().await
}

/// Write or delete the WAF patch policy of every managed gateway of the namespace.
async fn sync_patch_policies(ctx: &Context, upstream_namespace: &str, resolution: &Resolution) -> Result<()> {
    let namespace = ctx.downstream_namespace(upstream_namespace);
    let api: Api<EnvoyPatchPolicy> = Api::namespaced(ctx.downstream_client(), &namespace);

    for gateway in &resolution.gateways {
        let gateway_name = gateway.name_any();
        let labels = upstream_labels(&ctx.cluster.name, KIND_GATEWAY, &gateway_name, upstream_namespace);

        let Some(desired) = build_waf_patch_policy(gateway, &namespace, &resolution.scoped)? else {
            delete_waf_policy(&api, &gateway_name, upstream_namespace).await?;
            continue;
        };

        let (_, operation) = create_or_update(&api, desired.clone(), |live| {
            ensure_upstream_labels(live, &labels)?;
            live.spec = desired.spec.clone();
            Ok(())
        })
        .await?;
        match operation {
            OperationResult::Created => metrics::record_resource_created(KIND_ENVOY_PATCH_POLICY),
            OperationResult::Updated => metrics::record_resource_updated(KIND_ENVOY_PATCH_POLICY),
            OperationResult::Unchanged => {}
        }
    }
    Ok(())
}

async fn delete_waf_policy(api: &Api<EnvoyPatchPolicy>, gateway_name: &str, upstream_namespace: &str) -> Result<()> {
    let name = waf_policy_name(gateway_name);
    let Some(live) = api.get_opt(&name).await? else {
        return Ok(());
    };
    let labels = live.labels();
    let ours = labels.get(UPSTREAM_KIND_LABEL).map(String::as_str) == Some(KIND_GATEWAY)
        && labels.get(UPSTREAM_NAME_LABEL).map(String::as_str) == Some(gateway_name)
        && labels.get(UPSTREAM_NAMESPACE_LABEL).map(String::as_str) == Some(upstream_namespace);
    if ours && delete_if_exists(api, &name).await? {
        info!("Deleted WAF patch policy {}", name);
        metrics::record_resource_deleted(KIND_ENVOY_PATCH_POLICY);
    }
    Ok(())
}

#[async_trait::async_trait]
impl FinalizerCleanup for TrafficProtectionPolicy {
    /// Recompile the namespace without this policy so its patches disappear.
    async fn cleanup(&self, ctx: &Context) -> Result<()> {
        let namespace = self.namespace().unwrap_or_default();
        let resolution = resolve_namespace(ctx, &namespace).await?;
        sync_patch_policies(ctx, &namespace, &resolution).await
    }
}
