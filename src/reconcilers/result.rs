// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Accumulator for partial reconcile outcomes.
//!
//! A reconcile is split into independent steps (apply dependents, program DNS,
//! write status). Each step returns a [`ReconcileResult`]; the orchestrator
//! [`merge`](ReconcileResult::merge)s them, short-circuits with
//! [`should_return`](ReconcileResult::should_return) where later steps depend on
//! earlier ones, and finally calls [`complete`](ReconcileResult::complete) to
//! flush every deferred status write.
//!
//! Status writes are deferred so that one failed step never prevents other,
//! independently computed status fields from being persisted.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut result = apply_dependents(&ctx, &proxy).await;
//! if result.should_return() {
//!     return result.complete().await;
//! }
//! result.merge(program_dns(&ctx, &gateway).await);
//! result.add_status_write(StatusPatch::new(api, &proxy, &status)?);
//! result.complete().await
//! ```

use crate::constants::CONFLICT_REQUEUE_DURATION_SECS;
use crate::errors::is_conflict;
use anyhow::Result;
use kube::api::{Patch, PatchParams};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, warn};

/// Identity of an object whose status is written.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    /// Key of a typed object.
    #[must_use]
    pub fn of<K: Resource<DynamicType = ()>>(obj: &K) -> Self {
        Self {
            kind: K::kind(&()).to_string(),
            namespace: obj.meta().namespace.clone(),
            name: obj.meta().name.clone().unwrap_or_default(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// A deferred status write.
#[async_trait::async_trait]
pub trait StatusWrite: Send + Sync {
    /// Object the write targets; a later write for the same key replaces an earlier one.
    fn key(&self) -> ObjectKey;

    /// Persist the status.
    async fn write(&self) -> Result<(), kube::Error>;
}

/// Status merge-patch guarded by the object's `resourceVersion`.
///
/// The precondition turns a concurrent modification into an HTTP 409 that
/// [`ReconcileResult::complete`] converts into a short requeue.
pub struct StatusPatch<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    api: Api<K>,
    key: ObjectKey,
    resource_version: Option<String>,
    status: serde_json::Value,
}

impl<K> StatusPatch<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    /// Build a status patch for `obj`.
    ///
    /// # Errors
    ///
    /// Returns an error if `status` cannot be serialized.
    pub fn new<S: Serialize>(api: Api<K>, obj: &K, status: &S) -> Result<Self> {
        Ok(Self {
            api,
            key: ObjectKey::of(obj),
            resource_version: obj.resource_version(),
            status: serde_json::to_value(status)?,
        })
    }

    /// Build a status patch only when `desired` differs from `current`.
    ///
    /// # Errors
    ///
    /// Returns an error if either status cannot be serialized.
    pub fn if_changed<S: Serialize>(
        api: Api<K>,
        obj: &K,
        current: Option<&S>,
        desired: &S,
    ) -> Result<Option<Self>> {
        let desired_value = serde_json::to_value(desired)?;
        let current_value = current.map(serde_json::to_value).transpose()?;
        if current_value.as_ref() == Some(&desired_value) {
            return Ok(None);
        }
        Ok(Some(Self {
            api,
            key: ObjectKey::of(obj),
            resource_version: obj.resource_version(),
            status: desired_value,
        }))
    }
}

#[async_trait::async_trait]
impl<K> StatusWrite for StatusPatch<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    fn key(&self) -> ObjectKey {
        self.key.clone()
    }

    async fn write(&self) -> Result<(), kube::Error> {
        let patch = json!({
            "metadata": { "resourceVersion": self.resource_version },
            "status": self.status,
        });
        self.api
            .patch_status(&self.key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Several independent failures of one reconcile.
#[derive(Debug, thiserror::Error)]
#[error("{}", .0.iter().map(|e| format!("{e:#}")).collect::<Vec<_>>().join("; "))]
pub struct MultiError(pub Vec<anyhow::Error>);

/// Mergeable outcome of one or more reconcile steps.
#[derive(Default)]
pub struct ReconcileResult {
    requeue_after: Option<Duration>,
    errors: Vec<anyhow::Error>,
    stop_processing: bool,
    status_writes: BTreeMap<ObjectKey, Box<dyn StatusWrite>>,
}

impl Debug for ReconcileResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileResult")
            .field("requeue_after", &self.requeue_after)
            .field("errors", &self.errors)
            .field("stop_processing", &self.stop_processing)
            .field("status_writes", &self.status_writes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ReconcileResult {
    /// An empty result: no error, no requeue, no status writes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A result carrying one error.
    #[must_use]
    pub fn from_error(err: anyhow::Error) -> Self {
        Self {
            errors: vec![err],
            ..Self::default()
        }
    }

    /// A result asking to be called again after `after`.
    #[must_use]
    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
            ..Self::default()
        }
    }

    /// A result telling the orchestrator to skip the remaining steps.
    #[must_use]
    pub fn stop() -> Self {
        Self {
            stop_processing: true,
            ..Self::default()
        }
    }

    /// Record an error.
    pub fn add_error(&mut self, err: anyhow::Error) {
        self.errors.push(err);
    }

    /// Ask to be called again after `after` (replaces a previous request).
    pub fn set_requeue_after(&mut self, after: Duration) {
        self.requeue_after = Some(after);
    }

    /// Defer a status write until [`complete`](Self::complete).
    pub fn add_status_write<W: StatusWrite + 'static>(&mut self, write: W) {
        self.status_writes.insert(write.key(), Box::new(write));
    }

    /// Fold `other` into `self`.
    ///
    /// Errors are joined, `other`'s requeue wins when set, stop flags are
    /// OR-ed and status writes are unioned by object key (`other` wins).
    pub fn merge(&mut self, other: ReconcileResult) {
        self.errors.extend(other.errors);
        if other.requeue_after.is_some() {
            self.requeue_after = other.requeue_after;
        }
        self.stop_processing |= other.stop_processing;
        self.status_writes.extend(other.status_writes);
    }

    /// `true` when the caller should stop running further steps.
    #[must_use]
    pub fn should_return(&self) -> bool {
        !self.errors.is_empty()
            || self.requeue_after.is_some_and(|d| !d.is_zero())
            || self.stop_processing
    }

    /// Requested requeue, if any.
    #[must_use]
    pub fn requeue_after(&self) -> Option<Duration> {
        self.requeue_after
    }

    /// `true` when at least one error was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of deferred status writes.
    #[must_use]
    pub fn pending_status_writes(&self) -> usize {
        self.status_writes.len()
    }

    /// Flush every deferred status write and produce the final outcome.
    ///
    /// A write that fails with HTTP 409 becomes a one second requeue when no
    /// other error was recorded; otherwise it is reported with the rest.
    ///
    /// # Errors
    ///
    /// Returns the recorded error, or a [`MultiError`] when there are several.
    pub async fn complete(mut self) -> Result<Option<Duration>> {
        let mut conflicts = Vec::new();
        for (key, write) in std::mem::take(&mut self.status_writes) {
            match write.write().await {
                Ok(()) => debug!(object = %key, "Status updated"),
                Err(e) if is_conflict(&e) => {
                    debug!(object = %key, "Status update conflicted, will retry");
                    conflicts.push(anyhow::Error::new(e).context(format!("updating status of {key}")));
                }
                Err(e) => {
                    warn!(object = %key, error = %e, "Status update failed");
                    self.errors
                        .push(anyhow::Error::new(e).context(format!("updating status of {key}")));
                }
            }
        }

        if self.errors.is_empty() && !conflicts.is_empty() {
            return Ok(Some(Duration::from_secs(CONFLICT_REQUEUE_DURATION_SECS)));
        }
        self.errors.extend(conflicts);

        match self.errors.len() {
            0 => Ok(self.requeue_after.filter(|d| !d.is_zero())),
            1 => Err(self.errors.remove(0)),
            _ => Err(MultiError(self.errors).into()),
        }
    }
}

#[cfg(test)]
#[path = "result_tests.rs"]
mod result_tests;
