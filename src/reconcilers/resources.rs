// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic create-or-update helpers for dependent resources.
//!
//! [`create_or_update`] fetches an object (or starts from a shell carrying only
//! its name and namespace), runs a mutator that sets owner references, labels
//! and spec, and writes the object back only when the mutator actually changed
//! something. Repeated reconciles of an unchanged parent therefore issue no
//! writes at all.
//!
//! Mutators detect foreign ownership with [`ensure_controller_reference`] or
//! [`ensure_upstream_labels`]; both return an [`OwnershipError`] which callers
//! recover with [`crate::errors::ownership_conflict`] and report as a
//! `Conflict` status reason.
//!
//! # Example
//!
//! ```rust,no_run
//! use network_services_operator::gateway_api::HTTPRoute;
//! use network_services_operator::reconcilers::resources::{
//!     controller_reference, create_or_update, ensure_controller_reference,
//! };
//! use kube::Api;
//! use anyhow::Result;
//!
//! async fn example(api: &Api<HTTPRoute>, owner: &network_services_operator::crd::HTTPProxy, desired: HTTPRoute) -> Result<()> {
//!     let owner_ref = controller_reference(owner)?;
//!     let shell = HTTPRoute::new("web", Default::default());
//!     create_or_update(api, shell, |route| {
//!         ensure_controller_reference(route, &owner_ref)?;
//!         route.spec = desired.spec.clone();
//!         Ok(())
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

use crate::constants::FIELD_MANAGER;
use crate::errors::{is_not_found, OwnershipError};
use crate::labels::{
    K8S_MANAGED_BY, SOURCE_NAME_LABEL, UPSTREAM_KIND_LABEL, UPSTREAM_NAMESPACE_LABEL,
    UPSTREAM_NAME_LABEL,
};
use anyhow::{anyhow, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, info};

/// What [`create_or_update`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationResult {
    /// The object did not exist and was created
    Created,
    /// The object existed and the mutator changed it
    Updated,
    /// The object existed and the mutator left it as it was
    Unchanged,
}

/// Fetch-or-initialize an object, mutate it, and write it only if it changed.
///
/// The update is a full replace carrying the fetched `resourceVersion`, so a
/// concurrent modification fails with HTTP 409 instead of being overwritten.
///
/// # Arguments
///
/// * `api` - API handle scoped to the object's namespace
/// * `shell` - Object carrying at least `metadata.name`; used when the object does not exist
/// * `mutate` - Sets owner references, labels and spec on the fetched or shell object
///
/// # Returns
///
/// The object as returned by the API server (or as fetched when unchanged) and
/// the operation that was performed.
///
/// # Errors
///
/// Returns an error if the shell has no name, the mutator fails (including
/// [`OwnershipError`]), or an API call fails.
pub async fn create_or_update<T, F>(
    api: &Api<T>,
    shell: T,
    mutate: F,
) -> Result<(T, OperationResult)>
where
    T: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned,
    F: FnOnce(&mut T) -> Result<()>,
{
    let name = shell
        .meta()
        .name
        .clone()
        .ok_or_else(|| anyhow!("{} must have a name", T::kind(&())))?;
    let namespace = shell.namespace().unwrap_or_default();

    match api.get_opt(&name).await? {
        Some(live) => {
            let mut obj = live.clone();
            mutate(&mut obj)?;
            if !differs(&live, &obj)? {
                debug!(
                    kind = %T::kind(&()),
                    namespace = %namespace,
                    name = %name,
                    "Resource unchanged, skipping write"
                );
                return Ok((live, OperationResult::Unchanged));
            }
            let updated = api.replace(&name, &post_params(), &obj).await?;
            info!("Updated {} {}/{}", T::kind(&()), namespace, name);
            Ok((updated, OperationResult::Updated))
        }
        None => {
            let mut obj = shell;
            mutate(&mut obj)?;
            let created = api.create(&post_params(), &obj).await?;
            info!("Created {} {}/{}", T::kind(&()), namespace, name);
            Ok((created, OperationResult::Created))
        }
    }
}

/// Delete an object, treating "already gone" as success.
///
/// # Returns
///
/// `true` when the object existed and a delete was issued.
///
/// # Errors
///
/// Returns an error for any API failure other than 404.
pub async fn delete_if_exists<T>(api: &Api<T>, name: &str) -> Result<bool>
where
    T: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!("Deleted {} {}", T::kind(&()), name);
            Ok(true)
        }
        Err(e) if is_not_found(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Delete an object only when `owner_uid` is its controller.
///
/// # Returns
///
/// `true` when a delete was issued.
///
/// # Errors
///
/// Returns an error for any API failure other than 404.
pub async fn delete_if_owned<T>(api: &Api<T>, name: &str, owner_uid: &str) -> Result<bool>
where
    T: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned,
{
    match api.get_opt(name).await? {
        Some(live) if is_controlled_by(&live, owner_uid) => delete_if_exists(api, name).await,
        Some(_) => {
            debug!(kind = %T::kind(&()), name = %name, "Not deleting object controlled by another owner");
            Ok(false)
        }
        None => Ok(false),
    }
}

/// Returns `true` when the controller owner reference of `obj` has `owner_uid`.
#[must_use]
pub fn is_controlled_by<T: Resource>(obj: &T, owner_uid: &str) -> bool {
    obj.meta()
        .owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| r.controller == Some(true) && r.uid == owner_uid))
}

/// Build the controller owner reference pointing at `owner`.
///
/// # Errors
///
/// Returns an error if the owner has no name or UID (not yet persisted).
pub fn controller_reference<O>(owner: &O) -> Result<OwnerReference>
where
    O: Resource<DynamicType = ()>,
{
    owner.controller_owner_ref(&()).ok_or_else(|| {
        anyhow!(
            "{} {} has no uid, cannot own dependents",
            O::kind(&()),
            owner.meta().name.as_deref().unwrap_or_default()
        )
    })
}

/// Make `owner_ref` the controller owner of `obj`.
///
/// # Errors
///
/// Returns [`OwnershipError::Conflict`] when `obj` already has a controller
/// owner with a different UID. The object is left untouched in that case.
pub fn ensure_controller_reference<T>(
    obj: &mut T,
    owner_ref: &OwnerReference,
) -> Result<(), OwnershipError>
where
    T: Resource<DynamicType = ()>,
{
    let foreign = obj
        .owner_references()
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner_ref.uid)
        .map(|r| (r.kind.clone(), r.name.clone()));

    if let Some((owner_kind, owner_name)) = foreign {
        return Err(OwnershipError::Conflict {
            kind: T::kind(&()).to_string(),
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
            owner_kind,
            owner_name,
        });
    }

    let refs = obj.meta_mut().owner_references.get_or_insert_with(Vec::new);
    match refs.iter_mut().find(|r| r.uid == owner_ref.uid) {
        Some(existing) => *existing = owner_ref.clone(),
        None => refs.push(owner_ref.clone()),
    }
    Ok(())
}

/// Label-based ownership for objects that cannot carry an owner reference
/// (they live in another cluster or namespace than their source).
///
/// # Errors
///
/// Returns [`OwnershipError::Conflict`] when `obj` already carries upstream
/// labels naming a different source object.
pub fn ensure_upstream_labels<T>(
    obj: &mut T,
    labels: &BTreeMap<String, String>,
) -> Result<(), OwnershipError>
where
    T: Resource<DynamicType = ()>,
{
    let current = obj.labels();
    let foreign = [UPSTREAM_KIND_LABEL, UPSTREAM_NAME_LABEL, UPSTREAM_NAMESPACE_LABEL]
        .iter()
        .any(|key| match (current.get(*key), labels.get(*key)) {
            (Some(have), Some(want)) => have != want,
            _ => false,
        });

    if foreign {
        return Err(OwnershipError::Conflict {
            kind: T::kind(&()).to_string(),
            namespace: obj.meta().namespace.clone().unwrap_or_default(),
            name: obj.meta().name.clone().unwrap_or_default(),
            owner_kind: current.get(UPSTREAM_KIND_LABEL).cloned().unwrap_or_default(),
            owner_name: format!(
                "{}/{}",
                current.get(UPSTREAM_NAMESPACE_LABEL).cloned().unwrap_or_default(),
                current.get(UPSTREAM_NAME_LABEL).cloned().unwrap_or_default()
            ),
        });
    }

    obj.labels_mut()
        .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(())
}

/// Refuse to adopt an existing object that does not carry `labels`.
///
/// Objects that have never been persisted (no `resourceVersion`) are always
/// accepted; anything already stored must have been written by this
/// controller for this source.
///
/// # Errors
///
/// Returns [`OwnershipError::Conflict`] naming the object's `managed-by`
/// label (or `unmanaged`) when a stored object lacks any of `labels`.
pub fn ensure_managed_labels<T>(
    obj: &T,
    labels: &BTreeMap<String, String>,
) -> Result<(), OwnershipError>
where
    T: Resource<DynamicType = ()>,
{
    if obj.meta().resource_version.is_none() {
        return Ok(());
    }
    let current = obj.labels();
    if labels.iter().all(|(k, v)| current.get(k) == Some(v)) {
        return Ok(());
    }

    Err(OwnershipError::Conflict {
        kind: T::kind(&()).to_string(),
        namespace: obj.namespace().unwrap_or_default(),
        name: obj.name_any(),
        owner_kind: current
            .get(K8S_MANAGED_BY)
            .cloned()
            .unwrap_or_else(|| "unmanaged".to_string()),
        owner_name: current.get(SOURCE_NAME_LABEL).cloned().unwrap_or_default(),
    })
}

/// Returns `true` when `desired` serializes differently from `live`.
///
/// # Errors
///
/// Returns an error if either object cannot be serialized.
pub fn differs<T: Serialize>(live: &T, desired: &T) -> Result<bool> {
    Ok(serde_json::to_value(live)? != serde_json::to_value(desired)?)
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PostParams::default()
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
