// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Paged list helpers.
//!
//! Reconcilers re-read related objects (domains, zones, record sets,
//! policies) on every pass. Listing in pages keeps a namespace with thousands
//! of objects from producing one huge response.

use crate::constants::KUBE_LIST_PAGE_SIZE;
use crate::labels::selector_string;
use anyhow::Result;
use kube::{api::ListParams, Api, Resource};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::debug;

/// List every object visible through `api`, following continue tokens.
///
/// # Errors
///
/// Returns an error if any page request fails.
pub async fn list_all<K>(api: &Api<K>, mut list_params: ListParams) -> Result<Vec<K>>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    list_params.limit = Some(KUBE_LIST_PAGE_SIZE);

    let mut items = Vec::new();
    let mut pages = 0_u32;
    loop {
        pages += 1;
        let page = api.list(&list_params).await?;
        items.extend(page.items);

        match page.metadata.continue_ {
            Some(token) if !token.is_empty() => list_params.continue_token = Some(token),
            _ => break,
        }
    }

    debug!(
        kind = %K::kind(&()),
        pages,
        items = items.len(),
        "Listed resources"
    );
    Ok(items)
}

/// List every object carrying all of `labels`.
///
/// # Errors
///
/// Returns an error if any page request fails.
pub async fn list_labelled<K>(api: &Api<K>, labels: &BTreeMap<String, String>) -> Result<Vec<K>>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    list_all(api, labelled_params(labels)).await
}

/// List parameters selecting objects that carry all of `labels`.
#[must_use]
pub fn labelled_params(labels: &BTreeMap<String, String>) -> ListParams {
    ListParams::default().labels(&selector_string(labels))
}

#[cfg(test)]
#[path = "pagination_tests.rs"]
mod pagination_tests;
