// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Gateway reconciliation.
//!
//! Envoy Gateway programs the Gateways this operator creates. This controller
//! adds what Envoy Gateway does not know about:
//!
//! - Listener hostnames must belong to a verified `Domain` of the gateway
//!   namespace; other listeners are marked `Accepted=False` with reason
//!   `UnverifiedHostname`
//! - DNS records for the listener hostnames, summarised in the gateway-level
//!   `DNSRecordsProgrammed` condition
//!
//! Envoy Gateway owns the rest of the Gateway status. The status write is a
//! merge patch carrying only the condition lists this controller changed,
//! guarded by `resourceVersion` so a concurrent write by Envoy Gateway turns
//! into a conflict and a requeue instead of being overwritten.

use crate::constants::PENDING_REQUEUE_DURATION_SECS;
use crate::context::Context;
use crate::crd::Domain;
use crate::gateway_api::{Gateway, GatewayStatus, ListenerStatus};
use crate::reconcilers::dns::records::program_dns_records;
use crate::reconcilers::pagination::list_all;
use crate::reconcilers::result::{ReconcileResult, StatusPatch};
use crate::reconcilers::status::{create_condition, find_condition, remove_condition, set_condition};
use crate::status_reasons::{
    CONDITION_TYPE_ACCEPTED, CONDITION_TYPE_DNS_RECORDS_PROGRAMMED, CONDITION_TYPE_VERIFIED,
    REASON_UNVERIFIED_HOSTNAME, STATUS_FALSE,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use kube::api::ListParams;
use kube::{Api, ResourceExt};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Reconciles a `Gateway` of the configured GatewayClass.
///
/// # Returns
///
/// The requeue the gateway asks for; `None` when nothing is pending.
///
/// # Errors
///
/// Returns an error if listing domains or DNS objects fails, or a status
/// write fails for a reason other than a conflict.
pub async fn reconcile_gateway(ctx: &Context, gateway: &Gateway) -> Result<Option<Duration>> {
    let namespace = gateway.namespace().unwrap_or_default();
    let name = gateway.name_any();

    if gateway.spec.gateway_class_name != ctx.config.gateway.gateway_class_name {
        debug!(
            namespace = %namespace,
            name = %name,
            class = %gateway.spec.gateway_class_name,
            "Ignoring Gateway of another class"
        );
        return Ok(None);
    }
    if gateway.metadata.deletion_timestamp.is_some() {
        return Ok(None);
    }

    info!("Reconciling Gateway: {}/{}", namespace, name);
    let now = ctx.now();

    let domains = list_all(
        &Api::<Domain>::namespaced(ctx.client(), &namespace),
        ListParams::default(),
    )
    .await?;

    let current = gateway.status.clone().unwrap_or_default();
    let mut status = current.clone();
    let unverified = mark_unverified_listeners(gateway, &domains, &mut status, now);
    if !unverified.is_empty() {
        info!(
            namespace = %namespace,
            name = %name,
            hostnames = ?unverified,
            "Gateway has listeners with unverified hostnames"
        );
    }

    let mut result = ReconcileResult::new();
    match program_dns_records(&ctx.client(), &ctx.config, gateway).await {
        Ok(dns) => match dns.condition(gateway.metadata.generation) {
            Some(condition) => {
                if condition.status == STATUS_FALSE {
                    result.set_requeue_after(Duration::from_secs(PENDING_REQUEUE_DURATION_SECS));
                }
                set_condition(&mut status.conditions, condition, now);
            }
            None => {
                remove_condition(&mut status.conditions, CONDITION_TYPE_DNS_RECORDS_PROGRAMMED);
            }
        },
        Err(e) => result.add_error(e.context("programming DNS records")),
    }

    if !unverified.is_empty() {
        result.set_requeue_after(Duration::from_secs(PENDING_REQUEUE_DURATION_SECS));
    }

    if let Some(body) = owned_status_patch(&current, &status)? {
        let api: Api<Gateway> = Api::namespaced(ctx.client(), &namespace);
        result.add_status_write(StatusPatch::new(api, gateway, &body)?);
    }
    result.complete().await
}

/// The part of the Gateway status this controller writes.
///
/// `desired` is `current` with this controller's conditions applied. Only the
/// gateway `conditions` and the `listeners` list are ever included, each only
/// when it changed; addresses and anything else stay untouched.
///
/// # Returns
///
/// `None` when neither list changed.
///
/// # Errors
///
/// Returns an error if a condition list cannot be serialized.
pub fn owned_status_patch(current: &GatewayStatus, desired: &GatewayStatus) -> Result<Option<Value>> {
    let mut body = Map::new();
    if current.conditions != desired.conditions {
        body.insert("conditions".to_string(), serde_json::to_value(&desired.conditions)?);
    }
    if current.listeners != desired.listeners {
        body.insert("listeners".to_string(), serde_json::to_value(&desired.listeners)?);
    }
    Ok((!body.is_empty()).then_some(Value::Object(body)))
}

/// Returns `true` when `hostname` equals, or is a subdomain of, the name of a
/// `Domain` whose `Verified` condition is `True`.
#[must_use]
pub fn hostname_verified(hostname: &str, domains: &[Domain]) -> bool {
    let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();
    let hostname = hostname.strip_prefix("*.").unwrap_or(&hostname);
    domains.iter().any(|domain| {
        let verified = domain.status.as_ref().is_some_and(|s| {
            crate::reconcilers::status::is_condition_true(&s.conditions, CONDITION_TYPE_VERIFIED)
        });
        let name = domain.spec.domain_name.trim_end_matches('.').to_ascii_lowercase();
        verified
            && (hostname == name
                || hostname
                    .strip_suffix(name.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.')))
    })
}

/// Set `Accepted=False, Reason=UnverifiedHostname` on listeners whose
/// hostname is not covered by a verified domain.
///
/// A verified listener only loses a condition this controller wrote earlier;
/// conditions set by the gateway implementation are left alone.
///
/// # Returns
///
/// The unverified hostnames, in listener order.
pub fn mark_unverified_listeners(
    gateway: &Gateway,
    domains: &[Domain],
    status: &mut GatewayStatus,
    now: DateTime<Utc>,
) -> Vec<String> {
    let generation = gateway.metadata.generation;
    let mut unverified = Vec::new();

    for listener in &gateway.spec.listeners {
        let Some(hostname) = listener.hostname.as_deref() else {
            continue;
        };

        let position = status.listeners.iter().position(|l| l.name == listener.name);
        if hostname_verified(hostname, domains) {
            if let Some(existing) = position.map(|i| &mut status.listeners[i]) {
                let ours = find_condition(&existing.conditions, CONDITION_TYPE_ACCEPTED)
                    .is_some_and(|c| c.reason == REASON_UNVERIFIED_HOSTNAME);
                if ours {
                    remove_condition(&mut existing.conditions, CONDITION_TYPE_ACCEPTED);
                }
            }
            continue;
        }

        if !unverified.iter().any(|h| h == hostname) {
            unverified.push(hostname.to_string());
        }
        let index = position.unwrap_or_else(|| {
            status.listeners.push(ListenerStatus {
                name: listener.name.clone(),
                ..ListenerStatus::default()
            });
            status.listeners.len() - 1
        });
        set_condition(
            &mut status.listeners[index].conditions,
            create_condition(
                CONDITION_TYPE_ACCEPTED,
                STATUS_FALSE,
                REASON_UNVERIFIED_HOSTNAME,
                &format!("Hostname {hostname} is not covered by a verified Domain"),
                generation,
            ),
            now,
        );
    }

    unverified
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod gateway_tests;
