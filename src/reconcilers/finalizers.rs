// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic finalizer management for namespaced resources.
//!
//! Owner references cover dependents in the same cluster and namespace. Objects
//! written elsewhere (downstream `EnvoyPatchPolicy` objects) or state derived
//! from a set of resources (policy attachments) need explicit cleanup, which
//! runs through [`handle_deletion`] before the finalizer is released.
//!
//! # Example
//!
//! ```rust,ignore
//! use network_services_operator::context::Context;
//! use network_services_operator::crd::HTTPProxy;
//! use network_services_operator::reconcilers::finalizers::{
//!     ensure_finalizer, handle_deletion, FinalizerCleanup,
//! };
//!
//! #[async_trait::async_trait]
//! impl FinalizerCleanup for HTTPProxy {
//!     async fn cleanup(&self, ctx: &Context) -> anyhow::Result<()> {
//!         // Delete downstream objects
//!         Ok(())
//!     }
//! }
//!
//! async fn reconcile(ctx: &Context, proxy: HTTPProxy) -> anyhow::Result<()> {
//!     if proxy.metadata.deletion_timestamp.is_some() {
//!         return handle_deletion(ctx, &proxy, FINALIZER).await;
//!     }
//!     ensure_finalizer(&ctx.client(), &proxy, FINALIZER).await?;
//!     Ok(())
//! }
//! ```

use crate::context::Context;
use anyhow::Result;
use kube::api::{Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use tracing::info;

/// Cleanup that must finish before a resource's finalizer is released.
#[async_trait::async_trait]
pub trait FinalizerCleanup: Resource + ResourceExt + Clone {
    /// Perform cleanup operations before the finalizer is removed.
    ///
    /// # Errors
    ///
    /// An error keeps the finalizer in place; deletion stays blocked until a
    /// later reconcile succeeds.
    async fn cleanup(&self, ctx: &Context) -> Result<()>;
}

/// Returns `true` when `finalizer` is present on the resource.
#[must_use]
pub fn has_finalizer<T: Resource>(resource: &T, finalizer: &str) -> bool {
    resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Add a finalizer to a resource if not already present.
///
/// # Arguments
///
/// * `client` - Kubernetes client for accessing the API
/// * `resource` - The resource to add the finalizer to
/// * `finalizer` - The finalizer string to add
///
/// # Errors
///
/// Returns an error if the API patch operation fails.
pub async fn ensure_finalizer<T>(client: &Client, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    if has_finalizer(resource, finalizer) {
        return Ok(());
    }

    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    info!(
        "Adding finalizer {} to {} {}/{}",
        finalizer,
        T::kind(&()),
        namespace,
        name
    );

    let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
    finalizers.push(finalizer.to_string());

    let api: Api<T> = Api::namespaced(client.clone(), &namespace);
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;

    Ok(())
}

/// Remove a finalizer from a resource.
///
/// Use [`handle_deletion`] instead when cleanup must run first.
///
/// # Errors
///
/// Returns an error if the API patch operation fails.
pub async fn remove_finalizer<T>(client: &Client, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    if !has_finalizer(resource, finalizer) {
        return Ok(());
    }

    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    info!(
        "Removing finalizer {} from {} {}/{}",
        finalizer,
        T::kind(&()),
        namespace,
        name
    );

    let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
    finalizers.retain(|f| f != finalizer);

    let api: Api<T> = Api::namespaced(client.clone(), &namespace);
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;

    Ok(())
}

/// Run the resource's cleanup and release its finalizer.
///
/// Does nothing when the finalizer was already removed.
///
/// # Errors
///
/// Returns an error if cleanup or the finalizer removal fails; the finalizer
/// stays on the resource in both cases.
pub async fn handle_deletion<T>(ctx: &Context, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + FinalizerCleanup
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>
        + Sync,
{
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    info!("{} {}/{} is being deleted", T::kind(&()), namespace, name);

    if has_finalizer(resource, finalizer) {
        info!("Running cleanup for {} {}/{}", T::kind(&()), namespace, name);
        resource.cleanup(ctx).await?;
        remove_finalizer(&ctx.client(), resource, finalizer).await?;
    }

    Ok(())
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
