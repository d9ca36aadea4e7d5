// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `Domain` reconciliation.
//!
//! Verification and registration refresh run on independent schedules kept
//! in status (`nextVerificationAttempt`, `nextRefreshAttempt`). A pass does
//! whatever is due and requeues at the earliest next wake time.
//!
//! Once verified, `VerifiedDNSZone` reports whether a `DNSZone` for the
//! domain exists in the namespace; the DNS record manager only writes into
//! zones of domains where it is `True`.

pub mod registration;
pub mod schedule;
pub mod verification;

use crate::context::Context;
use crate::crd::{Condition, Domain, DomainStatus};
use crate::dns_operator::DNSZone;
use crate::reconcilers::pagination::list_all;
use crate::reconcilers::result::{ReconcileResult, StatusPatch};
use crate::reconcilers::status::{
    create_condition, is_condition_true, remove_condition, requeue_until, set_condition,
};
use crate::status_reasons::{
    CONDITION_TYPE_VERIFIED, CONDITION_TYPE_VERIFIED_DNS, CONDITION_TYPE_VERIFIED_DNS_ZONE,
    CONDITION_TYPE_VERIFIED_HTTP, REASON_DNS_ZONE_NOT_FOUND, REASON_DNS_ZONE_VERIFIED,
    STATUS_FALSE, STATUS_TRUE,
};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use kube::api::ListParams;
use kube::{Api, ResourceExt};
use registration::refresh_registration;
use schedule::{after, registration_due, verification_due, verification_retry_delay, Due};
use std::time::Duration;
use tracing::{debug, info};
use verification::{check_dns, check_http, ensure_challenges, verified_condition, CheckOutcome};

/// Reconciles a `Domain`.
///
/// # Errors
///
/// Returns an error if listing DNS zones or the status write fails.
/// Verification and registry failures are reported in conditions.
pub async fn reconcile_domain(ctx: &Context, domain: &Domain) -> Result<Option<Duration>> {
    let namespace = domain.namespace().unwrap_or_default();
    let name = domain.name_any();
    let generation = domain.metadata.generation;

    info!("Reconciling Domain: {}/{}", namespace, name);

    if domain.metadata.deletion_timestamp.is_some() {
        return Ok(None);
    }

    let now = ctx.now();
    let mut status = domain.status.clone().unwrap_or_default();
    let mut wake: Vec<DateTime<Utc>> = Vec::new();

    if let Some(next) = verify(ctx, domain, &mut status, now).await {
        wake.push(next);
    }

    let zones = list_all(
        &Api::<DNSZone>::namespaced(ctx.client(), &namespace),
        ListParams::default(),
    )
    .await?;
    match dns_zone_condition(domain, &status, &zones) {
        Some(condition) => {
            set_condition(&mut status.conditions, condition, now);
        }
        None => {
            remove_condition(&mut status.conditions, CONDITION_TYPE_VERIFIED_DNS_ZONE);
        }
    }

    let domain_name = domain.spec.domain_name.trim_end_matches('.').to_ascii_lowercase();
    match registration_due(&domain.spec, status.registration.as_ref(), now) {
        Due::Now { expedited } => {
            debug!(namespace = %namespace, name = %name, expedited = expedited, "Refreshing registration");
            let outcome = refresh_registration(
                ctx.registry.as_ref(),
                &domain_name,
                status.registration.as_ref(),
                now,
                &ctx.config.domain_registration,
                generation,
            )
            .await;
            status.registration = Some(outcome.registration);
            if let Some(apex) = outcome.apex {
                status.apex = apex;
            }
            if let Some(nameservers) = outcome.nameservers {
                status.nameservers = nameservers;
            }
            set_condition(&mut status.conditions, outcome.condition, now);
            wake.push(outcome.next_attempt);
        }
        Due::At(next) => wake.push(next),
    }

    let mut result = ReconcileResult::new();
    if let Some(earliest) = wake.into_iter().min() {
        result.set_requeue_after(requeue_until(earliest, now));
    }

    let api: Api<Domain> = Api::namespaced(ctx.client(), &namespace);
    if let Some(patch) = StatusPatch::if_changed(api, domain, domain.status.as_ref(), &status)? {
        result.add_status_write(patch);
    }
    result.complete().await
}

/// Run the verification step when due.
///
/// # Returns
///
/// The next verification attempt, or `None` once verified.
async fn verify(
    ctx: &Context,
    domain: &Domain,
    status: &mut DomainStatus,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let config = &ctx.config.domain_verification;
    let generation = domain.metadata.generation;
    let mut verification = ensure_challenges(domain, status.verification.as_ref(), config);

    if is_condition_true(&status.conditions, CONDITION_TYPE_VERIFIED) {
        verification.next_verification_attempt = None;
        status.verification = Some(verification);
        return None;
    }

    if let Due::At(next) = verification_due(verification.next_verification_attempt.as_deref(), now) {
        status.verification = Some(verification);
        return Some(next);
    }

    let dns = match &verification.dns_record {
        Some(record) => check_dns(ctx.dns_resolver.as_ref(), record).await,
        None => CheckOutcome::NotFound("No DNS challenge".to_string()),
    };
    let http = match &verification.http_token {
        Some(token) => check_http(ctx.http_fetcher.as_ref(), token).await,
        None => CheckOutcome::NotFound("No HTTP challenge".to_string()),
    };
    debug!(
        namespace = %domain.namespace().unwrap_or_default(),
        name = %domain.name_any(),
        dns = ?dns,
        http = ?http,
        "Checked domain challenges"
    );

    let verified = verified_condition(&dns, &http, generation);
    let next = if verified.status == STATUS_TRUE {
        info!(domain = %domain.spec.domain_name, "Domain ownership verified");
        // A method that did not pass stops reporting once the domain is verified.
        for (outcome, condition_type) in [(&dns, CONDITION_TYPE_VERIFIED_DNS), (&http, CONDITION_TYPE_VERIFIED_HTTP)] {
            if outcome.is_verified() {
                set_condition(&mut status.conditions, outcome.condition(condition_type, generation), now);
            } else {
                remove_condition(&mut status.conditions, condition_type);
            }
        }
        verification.next_verification_attempt = None;
        verification.attempts = 0;
        None
    } else {
        set_condition(&mut status.conditions, dns.condition(CONDITION_TYPE_VERIFIED_DNS, generation), now);
        set_condition(&mut status.conditions, http.condition(CONDITION_TYPE_VERIFIED_HTTP, generation), now);
        let next = after(now, verification_retry_delay(verification.attempts, config));
        verification.attempts = verification.attempts.saturating_add(1);
        verification.next_verification_attempt = Some(next.to_rfc3339_opts(SecondsFormat::Secs, true));
        Some(next)
    };
    set_condition(&mut status.conditions, verified, now);
    status.verification = Some(verification);
    next
}

/// `VerifiedDNSZone` for a domain; `None` while the domain is unverified.
#[must_use]
pub fn dns_zone_condition(domain: &Domain, status: &DomainStatus, zones: &[DNSZone]) -> Option<Condition> {
    if !is_condition_true(&status.conditions, CONDITION_TYPE_VERIFIED) {
        return None;
    }
    let domain_name = domain.spec.domain_name.trim_end_matches('.');
    let zone = zones
        .iter()
        .filter(|z| z.spec.domain_name.trim_end_matches('.').eq_ignore_ascii_case(domain_name))
        .min_by_key(|z| z.name_any());
    Some(match zone {
        Some(zone) => create_condition(
            CONDITION_TYPE_VERIFIED_DNS_ZONE,
            STATUS_TRUE,
            REASON_DNS_ZONE_VERIFIED,
            &format!("DNSZone {} serves {domain_name}", zone.name_any()),
            domain.metadata.generation,
        ),
        None => create_condition(
            CONDITION_TYPE_VERIFIED_DNS_ZONE,
            STATUS_FALSE,
            REASON_DNS_ZONE_NOT_FOUND,
            &format!("No DNSZone for {domain_name} in this namespace"),
            domain.metadata.generation,
        ),
    })
}
