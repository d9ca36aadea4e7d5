// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Registration refresh.

use crate::clock::with_jitter;
use crate::config::DomainRegistrationConfig;
use crate::crd::{Condition, Registration};
use crate::errors::RegistryError;
use crate::metrics;
use crate::reconcilers::domain::schedule::{after, rate_limit_backoff};
use crate::reconcilers::status::create_condition;
use crate::registry::{DomainLookup, RegistryClient};
use crate::status_reasons::{
    CONDITION_TYPE_REGISTRATION_REFRESHED, REASON_RATE_LIMITED, REASON_REGISTRATION_NOT_FOUND,
    REASON_REGISTRATION_REFRESHED, REASON_REGISTRY_LOOKUP_FAILED, REASON_REGISTRY_TIMEOUT,
    STATUS_FALSE, STATUS_TRUE,
};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

/// What one refresh produced.
#[derive(Clone, Debug, PartialEq)]
pub struct RefreshOutcome {
    pub registration: Registration,
    /// `Some` only after a successful lookup
    pub apex: Option<bool>,
    /// Nameservers of the closest zone cut; `Some` only after a successful lookup
    pub nameservers: Option<Vec<String>>,
    pub condition: Condition,
    pub next_attempt: DateTime<Utc>,
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Query the registry for `domain_name` and fold the answer into the
/// previous registration data.
///
/// Failures keep the previous data and only move the schedule.
pub async fn refresh_registration(
    registry: &dyn RegistryClient,
    domain_name: &str,
    previous: Option<&Registration>,
    now: DateTime<Utc>,
    config: &DomainRegistrationConfig,
    generation: Option<i64>,
) -> RefreshOutcome {
    let result = registry.lookup_domain(domain_name).await;
    metrics::record_registry_lookup(lookup_outcome(&result));
    fold_lookup(result, domain_name, previous, now, config, generation)
}

/// `outcome` label of the registry lookup counter.
#[must_use]
pub fn lookup_outcome(result: &Result<DomainLookup, RegistryError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(RegistryError::RateLimited { .. }) => "rate_limited",
        Err(RegistryError::NotFound { .. }) => "not_found",
        Err(RegistryError::Timeout { .. }) => "timeout",
        Err(RegistryError::Lookup { .. }) => "error",
    }
}

/// Pure part of [`refresh_registration`].
#[must_use]
pub fn fold_lookup(
    result: Result<DomainLookup, RegistryError>,
    domain_name: &str,
    previous: Option<&Registration>,
    now: DateTime<Utc>,
    config: &DomainRegistrationConfig,
    generation: Option<i64>,
) -> RefreshOutcome {
    let mut registration = previous.cloned().unwrap_or_default();
    registration.last_refresh_attempt = Some(timestamp(now));

    let (condition, delay, apex, nameservers) = match result {
        Ok(lookup) => {
            debug!(domain = %domain_name, source = %lookup.source, "Registration refreshed");
            let apex = lookup.is_apex(domain_name);
            registration.registrar = lookup.registration.registrar.clone();
            registration.created_at = lookup.registration.created_at.map(timestamp);
            registration.expires_at = lookup.registration.expires_at.map(timestamp);
            registration.nameservers = lookup.registration.nameservers.clone();
            registration.source = Some(lookup.source.clone());
            (
                create_condition(
                    CONDITION_TYPE_REGISTRATION_REFRESHED,
                    STATUS_TRUE,
                    REASON_REGISTRATION_REFRESHED,
                    &format!("Registration data refreshed from {}", lookup.source),
                    generation,
                ),
                with_jitter(config.refresh_interval, config.jitter_percent),
                Some(apex),
                Some(lookup.nameservers),
            )
        }
        Err(e) => {
            warn!(domain = %domain_name, error = %e, "Registration refresh failed");
            let (reason, delay) = match &e {
                RegistryError::RateLimited { retry_after, .. } => (
                    REASON_RATE_LIMITED,
                    rate_limit_backoff(*retry_after, config.rate_limit_backoff),
                ),
                RegistryError::NotFound { .. } => (
                    REASON_REGISTRATION_NOT_FOUND,
                    with_jitter(config.refresh_interval, config.jitter_percent),
                ),
                RegistryError::Timeout { .. } => (REASON_REGISTRY_TIMEOUT, config.rate_limit_backoff),
                RegistryError::Lookup { .. } => (REASON_REGISTRY_LOOKUP_FAILED, config.rate_limit_backoff),
            };
            (
                create_condition(
                    CONDITION_TYPE_REGISTRATION_REFRESHED,
                    STATUS_FALSE,
                    reason,
                    &e.to_string(),
                    generation,
                ),
                delay,
                None,
                None,
            )
        }
    };

    let next_attempt = after(now, delay);
    registration.next_refresh_attempt = Some(timestamp(next_attempt));
    RefreshOutcome {
        registration,
        apex,
        nameservers,
        condition,
        next_attempt,
    }
}

#[cfg(test)]
#[path = "registration_tests.rs"]
mod registration_tests;
