// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! When to verify and when to refresh registration data.

use crate::clock::with_jitter;
use crate::config::DomainVerificationConfig;
use crate::constants::PENDING_REQUEUE_DURATION_SECS;
use crate::crd::{DomainSpec, Registration};
use crate::reconcilers::status::parse_timestamp;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Whether a scheduled step runs in this pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Due {
    /// Run now; `expedited` when a user-requested refresh triggered it
    Now { expedited: bool },
    /// Not before the given time
    At(DateTime<Utc>),
}

/// Delay before the next verification attempt after `attempts` failures.
///
/// The last configured interval repeats once the list is exhausted.
#[must_use]
pub fn verification_retry_delay(attempts: u32, config: &DomainVerificationConfig) -> Duration {
    let Some(last) = config.retry_intervals.last() else {
        return Duration::from_secs(PENDING_REQUEUE_DURATION_SECS);
    };
    let index = usize::try_from(attempts).unwrap_or(usize::MAX);
    let base = config.retry_intervals.get(index).unwrap_or(last);
    with_jitter(*base, config.jitter_percent)
}

/// Whether verification is due, given the stored next attempt.
#[must_use]
pub fn verification_due(next_attempt: Option<&str>, now: DateTime<Utc>) -> Due {
    match parse_timestamp(next_attempt) {
        Some(next) if next > now => Due::At(next),
        _ => Due::Now { expedited: false },
    }
}

/// Whether the registration refresh is due.
///
/// `desiredRegistrationRefreshAttempt` forces a refresh once: when it is not
/// in the future and the last attempt predates it. Afterwards the stored
/// `nextRefreshAttempt` applies again.
#[must_use]
pub fn registration_due(spec: &DomainSpec, registration: Option<&Registration>, now: DateTime<Utc>) -> Due {
    let last = registration.and_then(|r| parse_timestamp(r.last_refresh_attempt.as_deref()));
    let desired = parse_timestamp(spec.desired_registration_refresh_attempt.as_deref());

    if let Some(desired) = desired {
        if desired <= now && last.is_none_or(|last| last < desired) {
            return Due::Now { expedited: true };
        }
    }

    match registration.and_then(|r| parse_timestamp(r.next_refresh_attempt.as_deref())) {
        Some(next) if next > now => Due::At(next),
        _ => Due::Now { expedited: false },
    }
}

/// Backoff after a rate-limited lookup: the registry's `Retry-After` when
/// present, otherwise twice the configured base.
#[must_use]
pub fn rate_limit_backoff(retry_after: Option<Duration>, base: Duration) -> Duration {
    retry_after.unwrap_or_else(|| base.saturating_mul(2))
}

/// `now + delay`, saturating far in the future on overflow.
#[must_use]
pub fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod schedule_tests;
