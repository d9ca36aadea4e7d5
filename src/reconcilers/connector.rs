// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Connector reconciliation.
//!
//! A connector agent proves it is alive by renewing a coordination `Lease`
//! named after its `Connector`. The operator owns that lease (it creates it
//! before the agent ever connects) and derives `Ready` from its renew time.

use crate::constants::PENDING_REQUEUE_DURATION_SECS;
use crate::context::Context;
use crate::crd::{Condition, Connector, ConnectorClass, LeaseReference};
use crate::errors::ownership_conflict;
use crate::metrics;
use crate::reconcilers::resources::{
    controller_reference, create_or_update, ensure_controller_reference, OperationResult,
};
use crate::reconcilers::result::{ReconcileResult, StatusPatch};
use crate::reconcilers::status::{create_condition, requeue_until, set_condition};
use crate::status_reasons::{
    CONDITION_TYPE_ACCEPTED, CONDITION_TYPE_READY, REASON_ACCEPTED, REASON_CONFLICT,
    REASON_CONNECTOR_CLASS_NOT_FOUND, REASON_LEASE_EXPIRED, REASON_PENDING, REASON_READY,
    STATUS_FALSE, STATUS_TRUE,
};
use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use kube::{Api, ResourceExt};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Liveness of a connector lease.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaseState {
    /// The agent never renewed the lease
    NeverRenewed,
    /// Renewed recently; stays live until `expires_at`
    Live { expires_at: DateTime<Utc> },
    /// Last renewal is older than the lease duration
    Expired { expired_at: DateTime<Utc> },
}

/// Convert a k8s-openapi (jiff) timestamp into a chrono `DateTime<Utc>`.
fn to_chrono(ts: k8s_openapi::jiff::Timestamp) -> DateTime<Utc> {
    let mut secs = ts.as_second();
    let mut nanos = ts.subsec_nanosecond();
    if nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }
    DateTime::from_timestamp(secs, nanos.unsigned_abs())
        .expect("jiff timestamp range fits in chrono")
}

/// Evaluate `lease` at `now`.
///
/// The lease's own `leaseDurationSeconds` wins over `default_duration_seconds`.
#[must_use]
pub fn lease_state(lease: &Lease, now: DateTime<Utc>, default_duration_seconds: i32) -> LeaseState {
    let Some(renewed) = lease.spec.as_ref().and_then(|s| s.renew_time.as_ref()) else {
        return LeaseState::NeverRenewed;
    };
    let seconds = lease
        .spec
        .as_ref()
        .and_then(|s| s.lease_duration_seconds)
        .unwrap_or(default_duration_seconds);
    let expires_at = to_chrono(renewed.0) + ChronoDuration::seconds(i64::from(seconds));
    if expires_at > now {
        LeaseState::Live { expires_at }
    } else {
        LeaseState::Expired {
            expired_at: expires_at,
        }
    }
}

/// `Ready` condition and requeue for a lease state.
#[must_use]
pub fn readiness(state: &LeaseState, now: DateTime<Utc>, generation: Option<i64>) -> (Condition, Duration) {
    let pending = Duration::from_secs(PENDING_REQUEUE_DURATION_SECS);
    match state {
        LeaseState::NeverRenewed => (
            create_condition(
                CONDITION_TYPE_READY,
                STATUS_FALSE,
                REASON_PENDING,
                "Waiting for the connector to renew its lease",
                generation,
            ),
            pending,
        ),
        LeaseState::Live { expires_at } => (
            create_condition(
                CONDITION_TYPE_READY,
                STATUS_TRUE,
                REASON_READY,
                "Connector lease is current",
                generation,
            ),
            requeue_until(*expires_at, now),
        ),
        LeaseState::Expired { expired_at } => (
            create_condition(
                CONDITION_TYPE_READY,
                STATUS_FALSE,
                REASON_LEASE_EXPIRED,
                &format!("Connector lease expired at {}", expired_at.to_rfc3339()),
                generation,
            ),
            pending,
        ),
    }
}

/// Reconciles a `Connector`.
///
/// # Errors
///
/// Returns an error if the class lookup, the lease write or the status write fails.
/// A lease controlled by another object is reported as `Ready=False`,
/// `Reason=Conflict` instead.
pub async fn reconcile_connector(ctx: &Context, connector: &Connector) -> Result<Option<Duration>> {
    let namespace = connector.namespace().unwrap_or_default();
    let name = connector.name_any();
    let generation = connector.metadata.generation;
    let now = ctx.now();

    info!("Reconciling Connector: {}/{}", namespace, name);

    if connector.metadata.deletion_timestamp.is_some() {
        return Ok(None);
    }

    let api: Api<Connector> = Api::namespaced(ctx.client(), &namespace);
    let mut status = connector.status.clone().unwrap_or_default();
    let mut result = ReconcileResult::new();

    let classes: Api<ConnectorClass> = Api::all(ctx.client());
    let class_name = &connector.spec.connector_class_name;
    if classes.get_opt(class_name).await?.is_none() {
        debug!(namespace = %namespace, name = %name, class = %class_name, "ConnectorClass not found");
        let message = format!("ConnectorClass {class_name} not found");
        set_condition(
            &mut status.conditions,
            create_condition(
                CONDITION_TYPE_ACCEPTED,
                STATUS_FALSE,
                REASON_CONNECTOR_CLASS_NOT_FOUND,
                &message,
                generation,
            ),
            now,
        );
        set_condition(
            &mut status.conditions,
            create_condition(
                CONDITION_TYPE_READY,
                STATUS_FALSE,
                REASON_CONNECTOR_CLASS_NOT_FOUND,
                &message,
                generation,
            ),
            now,
        );
        result.set_requeue_after(Duration::from_secs(PENDING_REQUEUE_DURATION_SECS));
        if let Some(patch) = StatusPatch::if_changed(api, connector, connector.status.as_ref(), &status)? {
            result.add_status_write(patch);
        }
        return result.complete().await;
    }
    set_condition(
        &mut status.conditions,
        create_condition(
            CONDITION_TYPE_ACCEPTED,
            STATUS_TRUE,
            REASON_ACCEPTED,
            "ConnectorClass found",
            generation,
        ),
        now,
    );

    match ensure_lease(ctx, connector).await {
        Ok(lease) => {
            status.lease_ref = Some(LeaseReference { name: lease.name_any() });
            let state = lease_state(&lease, now, ctx.config.connector.lease_duration_seconds);
            let (ready, requeue) = readiness(&state, now, generation);
            debug!(namespace = %namespace, name = %name, state = ?state, "Evaluated connector lease");
            set_condition(&mut status.conditions, ready, now);
            result.set_requeue_after(requeue);
        }
        Err(e) => match ownership_conflict(&e) {
            Some(conflict) => {
                warn!(namespace = %namespace, name = %name, "{conflict}");
                status.lease_ref = None;
                set_condition(
                    &mut status.conditions,
                    create_condition(
                        CONDITION_TYPE_READY,
                        STATUS_FALSE,
                        REASON_CONFLICT,
                        &conflict.to_string(),
                        generation,
                    ),
                    now,
                );
                result.set_requeue_after(Duration::from_secs(PENDING_REQUEUE_DURATION_SECS));
            }
            None => return Err(e),
        },
    }

    if let Some(patch) = StatusPatch::if_changed(api, connector, connector.status.as_ref(), &status)? {
        result.add_status_write(patch);
    }
    result.complete().await
}

/// Create the connector's lease if missing, without touching renewals.
async fn ensure_lease(ctx: &Context, connector: &Connector) -> Result<Lease> {
    let namespace = connector.namespace().unwrap_or_default();
    let name = connector.name_any();
    let owner_ref = controller_reference(connector)?;
    let duration = ctx.config.connector.lease_duration_seconds;

    let api: Api<Lease> = Api::namespaced(ctx.client(), &namespace);
    let mut shell = Lease::default();
    shell.metadata.name = Some(name);
    shell.metadata.namespace = Some(namespace);

    let (lease, operation) = create_or_update(&api, shell, |lease| {
        ensure_controller_reference(lease, &owner_ref)?;
        let spec = lease.spec.get_or_insert_with(LeaseSpec::default);
        if spec.lease_duration_seconds.is_none() {
            spec.lease_duration_seconds = Some(duration);
        }
        Ok(())
    })
    .await?;
    if operation == OperationResult::Created {
        metrics::record_resource_created("Lease");
    }
    Ok(lease)
}

#[cfg(test)]
#[path = "connector_tests.rs"]
mod connector_tests;
