// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Watch mappers: which primary objects a change of a related object
//! re-evaluates.
//!
//! Each mapper is called synchronously by the controller with the changed
//! object and reads the controller's in-memory store of primary objects.
//!
//! # Example
//!
//! ```rust,no_run
//! use network_services_operator::crd::{Connector, HTTPProxy};
//! use network_services_operator::selector::proxies_for_connector;
//! use kube::runtime::reflector::Store;
//!
//! # fn example(store: Store<HTTPProxy>, connector: Connector) {
//! for proxy in proxies_for_connector(&store, &connector) {
//!     println!("HTTPProxy {} routes through this connector", proxy.name);
//! }
//! # }
//! ```

use crate::crd::{Connector, Domain, HTTPProxy};
use crate::dns_operator::DNSZone;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Resource, ResourceExt};

/// Every object of `store` in the namespace of `changed`.
pub fn same_namespace<K, C>(store: &Store<K>, changed: &C) -> Vec<ObjectRef<K>>
where
    K: Resource<DynamicType = ()> + Clone,
    C: ResourceExt,
{
    let namespace = changed.namespace();
    store
        .state()
        .iter()
        .filter(|obj| obj.namespace() == namespace)
        .map(|obj| ObjectRef::from_obj(&**obj))
        .collect()
}

/// `HTTPProxy` objects with a backend routed through `connector`.
///
/// Connector references are namespace-local, so only proxies of the
/// connector's namespace are candidates.
pub fn proxies_for_connector(store: &Store<HTTPProxy>, connector: &Connector) -> Vec<ObjectRef<HTTPProxy>> {
    let namespace = connector.namespace();
    let name = connector.name_any();
    store
        .state()
        .iter()
        .filter(|proxy| proxy.namespace() == namespace)
        .filter(|proxy| {
            proxy
                .spec
                .rules
                .iter()
                .flat_map(|rule| rule.backends.iter())
                .any(|backend| backend.connector.as_ref().is_some_and(|c| c.name == name))
        })
        .map(|proxy| ObjectRef::from_obj(&**proxy))
        .collect()
}

/// `Domain` objects whose name is served by `zone`.
pub fn domains_for_zone(store: &Store<Domain>, zone: &DNSZone) -> Vec<ObjectRef<Domain>> {
    let namespace = zone.namespace();
    let zone_domain = zone.spec.domain_name.trim_end_matches('.');
    store
        .state()
        .iter()
        .filter(|domain| domain.namespace() == namespace)
        .filter(|domain| {
            domain
                .spec
                .domain_name
                .trim_end_matches('.')
                .eq_ignore_ascii_case(zone_domain)
        })
        .map(|domain| ObjectRef::from_obj(&**domain))
        .collect()
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod selector_tests;
