// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers.
//!
//! This module provides utility functions for creating and managing status
//! conditions following the Kubernetes conventions.
//!
//! # Condition Format
//!
//! - `type`: The aspect of the resource being reported (e.g., "Programmed")
//! - `status`: "True", "False", or "Unknown"
//! - `reason`: A programmatic identifier (CamelCase)
//! - `message`: A human-readable explanation
//! - `observedGeneration`: The `metadata.generation` the condition was computed from
//! - `lastTransitionTime`: RFC3339 timestamp when the status last flipped
//!
//! Conditions are upserted by type. [`set_condition`] only reports a change
//! when status, reason, message or observed generation differ, which keeps
//! repeated reconciles of an unchanged object from writing status at all.
//! It also stamps `lastTransitionTime` from the time the caller passes in,
//! normally [`Context::now`](crate::context::Context::now).
//!
//! # Example
//!
//! ```rust,no_run
//! use network_services_operator::reconcilers::status::{create_condition, set_condition};
//!
//! let mut conditions = Vec::new();
//! let changed = set_condition(
//!     &mut conditions,
//!     create_condition("Accepted", "True", "Accepted", "Spec is valid", Some(1)),
//!     chrono::Utc::now(),
//! );
//! assert!(changed);
//! ```

use crate::constants::MIN_REQUEUE_DURATION_SECS;
use crate::crd::Condition;
use crate::status_reasons::STATUS_TRUE;
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

/// Create a new condition.
///
/// # Arguments
///
/// * `condition_type` - The type of condition (e.g., "Ready", "Programmed")
/// * `status` - The status: "True", "False", or "Unknown"
/// * `reason` - A programmatic identifier in `CamelCase`
/// * `message` - A human-readable explanation
/// * `observed_generation` - Generation of the object the condition describes
///
/// # Returns
///
/// A new `Condition` without `lastTransitionTime`; [`set_condition`] stamps
/// it when the condition is stored.
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        observed_generation,
        last_transition_time: None,
    }
}

/// Find a condition by type.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Returns `true` when the condition exists with status `True`.
#[must_use]
pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    find_condition(conditions, condition_type).is_some_and(|c| c.status == STATUS_TRUE)
}

/// Upsert a condition by type.
///
/// The existing entry is replaced only when status, reason, message or
/// observed generation differ. `lastTransitionTime` is carried over from the
/// existing entry unless the status flipped, in which case it is set to `now`.
///
/// # Returns
///
/// `true` when the list changed.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    mut condition: Condition,
    now: DateTime<Utc>,
) -> bool {
    let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    match conditions
        .iter_mut()
        .find(|c| c.r#type == condition.r#type)
    {
        Some(existing) => {
            if existing.status == condition.status
                && existing.reason == condition.reason
                && existing.message == condition.message
                && existing.observed_generation == condition.observed_generation
            {
                return false;
            }
            condition.last_transition_time = if existing.status == condition.status {
                existing.last_transition_time.clone().or(Some(stamp))
            } else {
                Some(stamp)
            };
            *existing = condition;
            true
        }
        None => {
            condition.last_transition_time = Some(stamp);
            conditions.push(condition);
            true
        }
    }
}

/// Remove a condition by type.
///
/// # Returns
///
/// `true` when a condition was removed.
pub fn remove_condition(conditions: &mut Vec<Condition>, condition_type: &str) -> bool {
    let before = conditions.len();
    conditions.retain(|c| c.r#type != condition_type);
    conditions.len() != before
}

/// Convert a wake-up time into a requeue delay.
///
/// Wake times in the past, or less than a second away, yield a one second
/// requeue so a skewed clock never produces a zero or negative delay.
#[must_use]
pub fn requeue_until(wake: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let floor = Duration::from_secs(MIN_REQUEUE_DURATION_SECS);
    (wake - now)
        .to_std()
        .map_or(floor, |delay| delay.max(floor))
}

/// Parse an RFC3339 timestamp written into a status field.
#[must_use]
pub fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
