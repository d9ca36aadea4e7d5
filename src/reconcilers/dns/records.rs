// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `DNSRecordSet` lifecycle for the hostnames of one Gateway.
//!
//! Every pass:
//!
//! 1. Collects the listener hostnames, skipping the gateway's canonical hostname
//! 2. Resolves each hostname to its most specific verified zone
//! 3. Refuses hostnames already published by a record this gateway does not own,
//!    and never adopts an existing record set without this gateway's labels
//! 4. Writes a CNAME (or ALIAS at the zone apex) pointing at the canonical hostname
//! 5. Deletes this gateway's records that were not written in this pass
//! 6. Folds the per-hostname outcomes into the `DNSRecordsProgrammed` condition
//!
//! Hostnames are processed one after another; a failure leaves the writes of
//! earlier hostnames in place.

use crate::config::OperatorConfig;
use crate::constants::{KIND_DNS_RECORD_SET, KIND_GATEWAY};
use crate::crd::{Condition, Domain};
use crate::dns_operator::{DNSRecordSet, DNSRecordSetSpec, DNSZone, RecordEntry, TargetContent, ZoneReference};
use crate::errors::ownership_conflict;
use crate::gateway_api::Gateway;
use crate::labels::{dns_source_labels, HOSTNAME_ANNOTATION};
use crate::metrics;
use crate::reconcilers::dns::zones::{resolve_zone, ResolvedZone, ZoneResolution};
use crate::reconcilers::dns::{absolute_name, dns_record_set_name};
use crate::reconcilers::pagination::list_all;
use crate::reconcilers::resources::{
    controller_reference, create_or_update, delete_if_exists, ensure_controller_reference,
    ensure_managed_labels, OperationResult,
};
use crate::reconcilers::status::create_condition;
use crate::status_reasons::{
    CONDITION_TYPE_DNS_RECORDS_PROGRAMMED, REASON_ALL_CREATED, REASON_CONFLICT,
    REASON_DOMAIN_NOT_VERIFIED, REASON_NOT_APPLICABLE, REASON_PARTIAL_FAILURE,
    REASON_RECORD_CREATED, REASON_RECORD_FAILED, REASON_RECORD_UPDATED, STATUS_FALSE, STATUS_TRUE,
};
use anyhow::Result;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Outcome for one hostname.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordState {
    /// No zone this controller can publish in
    NotApplicable,
    /// A `Domain` exists but its zone is not verified
    DomainNotVerified,
    /// A record this gateway does not own already publishes the hostname
    Conflict,
    /// The record set was created
    Created,
    /// The record set was changed
    Updated,
    /// The record set already matched
    Unchanged,
    /// The write failed
    Failed,
}

impl RecordState {
    /// `true` when the hostname counts towards the aggregate condition.
    #[must_use]
    pub fn is_applicable(&self) -> bool {
        *self != RecordState::NotApplicable
    }

    /// `true` when a record set for the hostname is in place.
    #[must_use]
    pub fn is_programmed(&self) -> bool {
        matches!(
            self,
            RecordState::Created | RecordState::Updated | RecordState::Unchanged
        )
    }

    /// Status reason describing this outcome.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            RecordState::NotApplicable => REASON_NOT_APPLICABLE,
            RecordState::DomainNotVerified => REASON_DOMAIN_NOT_VERIFIED,
            RecordState::Conflict => REASON_CONFLICT,
            RecordState::Created => REASON_RECORD_CREATED,
            RecordState::Updated | RecordState::Unchanged => REASON_RECORD_UPDATED,
            RecordState::Failed => REASON_RECORD_FAILED,
        }
    }
}

/// Outcome for one hostname with a human-readable detail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostnameOutcome {
    pub hostname: String,
    pub state: RecordState,
    pub message: String,
}

impl HostnameOutcome {
    fn new(hostname: &str, state: RecordState, message: impl Into<String>) -> Self {
        Self {
            hostname: hostname.to_string(),
            state,
            message: message.into(),
        }
    }
}

/// Result of one DNS pass over a gateway.
#[derive(Clone, Debug, Default)]
pub struct DnsProgrammingResult {
    pub outcomes: Vec<HostnameOutcome>,
    /// Record sets removed by garbage collection
    pub deleted: Vec<String>,
}

impl DnsProgrammingResult {
    /// Aggregate `DNSRecordsProgrammed` condition; `None` when no hostname applies.
    #[must_use]
    pub fn condition(&self, observed_generation: Option<i64>) -> Option<Condition> {
        aggregate_condition(&self.outcomes, observed_generation)
    }
}

/// Fold per-hostname outcomes into the `DNSRecordsProgrammed` condition.
///
/// `NotApplicable` hostnames are left out entirely. With no applicable
/// hostname there is nothing to report and the condition is absent.
#[must_use]
pub fn aggregate_condition(
    outcomes: &[HostnameOutcome],
    observed_generation: Option<i64>,
) -> Option<Condition> {
    let applicable: Vec<&HostnameOutcome> =
        outcomes.iter().filter(|o| o.state.is_applicable()).collect();
    if applicable.is_empty() {
        return None;
    }

    let programmed = applicable.iter().filter(|o| o.state.is_programmed()).count();
    if programmed == applicable.len() {
        return Some(create_condition(
            CONDITION_TYPE_DNS_RECORDS_PROGRAMMED,
            STATUS_TRUE,
            REASON_ALL_CREATED,
            &format!("All {programmed} DNS records programmed"),
            observed_generation,
        ));
    }

    let failures = applicable
        .iter()
        .filter(|o| !o.state.is_programmed())
        .map(|o| format!("{} ({}: {})", o.hostname, o.state.reason(), o.message))
        .collect::<Vec<_>>()
        .join("; ");
    Some(create_condition(
        CONDITION_TYPE_DNS_RECORDS_PROGRAMMED,
        STATUS_FALSE,
        REASON_PARTIAL_FAILURE,
        &format!(
            "{programmed} of {} DNS records programmed: {failures}",
            applicable.len()
        ),
        observed_generation,
    ))
}

/// Hostnames this controller publishes for `gateway`.
///
/// Names are lowercased and deduplicated. Wildcards and the canonical
/// hostname are skipped; the canonical name is published elsewhere.
#[must_use]
pub fn gateway_dns_hostnames(gateway: &Gateway, canonical: Option<&str>) -> Vec<String> {
    let mut hostnames: Vec<String> = Vec::new();
    for hostname in gateway.listener_hostnames() {
        let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();
        if hostname.starts_with("*.")
            || canonical.is_some_and(|c| c.eq_ignore_ascii_case(&hostname))
            || hostnames.contains(&hostname)
        {
            continue;
        }
        hostnames.push(hostname);
    }
    hostnames
}

/// The record set publishing `hostname` that this gateway must not touch.
///
/// A record set blocks when it carries the hostname annotation for the same
/// hostname in the same zone and is either not managed by this controller or
/// sourced from a different object.
#[must_use]
pub fn find_conflict<'a>(
    existing: &'a [DNSRecordSet],
    hostname: &str,
    zone_ref: &str,
    own_labels: &BTreeMap<String, String>,
) -> Option<&'a DNSRecordSet> {
    existing.iter().find(|record| {
        let publishes_hostname = record
            .annotations()
            .get(HOSTNAME_ANNOTATION)
            .is_some_and(|h| h.trim_end_matches('.').eq_ignore_ascii_case(hostname));
        publishes_hostname
            && record.spec.dns_zone_ref.name == zone_ref
            && !carries_labels(record, own_labels)
    })
}

/// Names of this source's record sets that were not written in this pass.
///
/// Only record sets carrying every label of `own_labels` are candidates, so
/// records of other gateways or other controllers are never returned.
#[must_use]
pub fn stale_record_sets(
    existing: &[DNSRecordSet],
    desired: &BTreeSet<String>,
    own_labels: &BTreeMap<String, String>,
) -> Vec<String> {
    existing
        .iter()
        .filter(|record| carries_labels(record, own_labels))
        .map(ResourceExt::name_any)
        .filter(|name| !desired.contains(name))
        .collect()
}

/// Build the desired record set for `hostname`.
#[must_use]
pub fn build_record_set(
    gateway_name: &str,
    namespace: &str,
    hostname: &str,
    zone: &ResolvedZone,
    target: &str,
    ttl: i64,
    labels: &BTreeMap<String, String>,
) -> DNSRecordSet {
    let target = TargetContent {
        content: absolute_name(target),
    };
    let (record_type, cname, alias) = if zone.hostname_is_apex {
        ("ALIAS", None, Some(target))
    } else {
        ("CNAME", Some(target), None)
    };

    let mut record_set = DNSRecordSet::new(
        &dns_record_set_name(gateway_name, hostname),
        DNSRecordSetSpec {
            dns_zone_ref: ZoneReference {
                name: zone.zone_ref.clone(),
            },
            record_type: record_type.to_string(),
            records: vec![RecordEntry {
                name: absolute_name(hostname),
                ttl: Some(ttl),
                cname,
                alias,
            }],
        },
    );
    record_set.metadata.namespace = Some(namespace.to_string());
    record_set.metadata.labels = Some(labels.clone());
    record_set.metadata.annotations = Some(BTreeMap::from([(
        HOSTNAME_ANNOTATION.to_string(),
        hostname.to_string(),
    )]));
    record_set
}

/// Program DNS records for every hostname of `gateway`.
///
/// # Errors
///
/// Returns an error when related objects cannot be listed or garbage
/// collection fails. Per-hostname write failures are reported as
/// [`RecordState::Failed`] outcomes instead.
pub async fn program_dns_records(
    client: &Client,
    config: &OperatorConfig,
    gateway: &Gateway,
) -> Result<DnsProgrammingResult> {
    let namespace = gateway.namespace().unwrap_or_default();
    let gateway_name = gateway.name_any();
    let Some(canonical) = gateway.canonical_hostname(&config.gateway.target_domain) else {
        debug!(namespace = %namespace, name = %gateway_name, "Gateway has no canonical hostname yet");
        return Ok(DnsProgrammingResult::default());
    };

    let own_labels = dns_source_labels(&config.dns.managed_by, KIND_GATEWAY, &gateway_name, &namespace);
    let owner_ref = controller_reference(gateway)?;

    let domains = list_all(&Api::<Domain>::namespaced(client.clone(), &namespace), ListParams::default()).await?;
    let zones = list_all(&Api::<DNSZone>::namespaced(client.clone(), &namespace), ListParams::default()).await?;
    let record_api: Api<DNSRecordSet> = Api::namespaced(client.clone(), &namespace);
    let existing = list_all(&record_api, ListParams::default()).await?;

    let mut result = DnsProgrammingResult::default();
    let mut desired_names = BTreeSet::new();

    for hostname in gateway_dns_hostnames(gateway, Some(&canonical)) {
        let zone = match resolve_zone(&hostname, &domains, &zones) {
            ZoneResolution::Resolved(zone) => zone,
            ZoneResolution::NotApplicable => {
                result.outcomes.push(HostnameOutcome::new(
                    &hostname,
                    RecordState::NotApplicable,
                    "no verified domain covers this hostname",
                ));
                continue;
            }
            ZoneResolution::DomainNotVerified { domain_name } => {
                result.outcomes.push(HostnameOutcome::new(
                    &hostname,
                    RecordState::DomainNotVerified,
                    format!("DNS zone of domain {domain_name} is not verified"),
                ));
                continue;
            }
        };

        if let Some(conflict) = find_conflict(&existing, &hostname, &zone.zone_ref, &own_labels) {
            warn!(
                namespace = %namespace,
                gateway = %gateway_name,
                hostname = %hostname,
                record = %conflict.name_any(),
                "Hostname already published by another record set"
            );
            result.outcomes.push(HostnameOutcome::new(
                &hostname,
                RecordState::Conflict,
                format!("DNSRecordSet {} already publishes this hostname", conflict.name_any()),
            ));
            continue;
        }

        let desired = build_record_set(
            &gateway_name,
            &namespace,
            &hostname,
            &zone,
            &canonical,
            config.dns.record_ttl,
            &own_labels,
        );
        desired_names.insert(desired.name_any());
        result
            .outcomes
            .push(apply_record_set(&record_api, desired, &owner_ref, &own_labels, &hostname).await);
    }

    for stale in stale_record_sets(&existing, &desired_names, &own_labels) {
        if delete_if_exists(&record_api, &stale).await? {
            info!(namespace = %namespace, gateway = %gateway_name, record = %stale, "Deleted stale DNSRecordSet");
            metrics::record_resource_deleted(KIND_DNS_RECORD_SET);
            result.deleted.push(stale);
        }
    }

    Ok(result)
}

async fn apply_record_set(
    api: &Api<DNSRecordSet>,
    desired: DNSRecordSet,
    owner_ref: &OwnerReference,
    own_labels: &BTreeMap<String, String>,
    hostname: &str,
) -> HostnameOutcome {
    let mut shell = DNSRecordSet::new(&desired.name_any(), desired.spec.clone());
    shell.metadata.namespace.clone_from(&desired.metadata.namespace);

    let applied = create_or_update(api, shell, |record| {
        ensure_managed_labels(record, own_labels)?;
        ensure_controller_reference(record, owner_ref)?;
        record
            .labels_mut()
            .extend(own_labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        record.annotations_mut().insert(
            HOSTNAME_ANNOTATION.to_string(),
            hostname.to_string(),
        );
        record.spec = desired.spec.clone();
        Ok(())
    })
    .await;

    match applied {
        Ok((_, OperationResult::Created)) => {
            metrics::record_resource_created(KIND_DNS_RECORD_SET);
            HostnameOutcome::new(hostname, RecordState::Created, "record created")
        }
        Ok((_, OperationResult::Updated)) => {
            metrics::record_resource_updated(KIND_DNS_RECORD_SET);
            HostnameOutcome::new(hostname, RecordState::Updated, "record updated")
        }
        Ok((_, OperationResult::Unchanged)) => {
            HostnameOutcome::new(hostname, RecordState::Unchanged, "record up to date")
        }
        Err(e) => match ownership_conflict(&e) {
            Some(conflict) => HostnameOutcome::new(hostname, RecordState::Conflict, conflict.to_string()),
            None => {
                warn!(hostname = %hostname, error = %e, "Failed to write DNSRecordSet");
                metrics::record_error(KIND_DNS_RECORD_SET, "write_failed");
                HostnameOutcome::new(hostname, RecordState::Failed, format!("{e:#}"))
            }
        },
    }
}

fn carries_labels(record: &DNSRecordSet, labels: &BTreeMap<String, String>) -> bool {
    let have = record.labels();
    labels.iter().all(|(k, v)| have.get(k) == Some(v))
}

#[cfg(test)]
#[path = "records_tests.rs"]
mod records_tests;
