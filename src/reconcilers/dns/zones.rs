// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Zone resolution for gateway hostnames.
//!
//! A hostname can be published in any zone that is a suffix of it and backed
//! by both a `Domain` whose `VerifiedDNSZone` condition is `True` and a
//! `DNSZone` for the same name. Candidates are tried most specific first.

use crate::crd::Domain;
use crate::dns_operator::DNSZone;
use crate::reconcilers::status::is_condition_true;
use crate::status_reasons::CONDITION_TYPE_VERIFIED_DNS_ZONE;
use kube::ResourceExt;

/// Where a hostname can be published.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ZoneResolution {
    /// No candidate zone has a `Domain`
    NotApplicable,
    /// The closest candidate with a `Domain` is not verified (or has no zone)
    DomainNotVerified {
        /// Domain name of that candidate
        domain_name: String,
    },
    /// A verified zone was found
    Resolved(ResolvedZone),
}

/// A verified zone for a hostname.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedZone {
    /// Name of the `DNSZone` object
    pub zone_ref: String,
    /// Zone apex, e.g. `example.com`
    pub zone_domain: String,
    /// Name of the `Domain` object that verified the zone
    pub domain_ref: String,
    /// `true` when the hostname is the zone apex (published as ALIAS)
    pub hostname_is_apex: bool,
}

/// Candidate zone names for `hostname`, most specific first.
///
/// The hostname itself is a candidate only when it has exactly two labels;
/// single-label names have no candidates.
///
/// ```
/// use network_services_operator::reconcilers::dns::zones::possible_zone_names;
///
/// assert_eq!(possible_zone_names("v1.api.example.com"), vec!["api.example.com", "example.com"]);
/// assert_eq!(possible_zone_names("example.com"), vec!["example.com"]);
/// assert!(possible_zone_names("localhost").is_empty());
/// ```
#[must_use]
pub fn possible_zone_names(hostname: &str) -> Vec<String> {
    let normalized = hostname.trim_end_matches('.').to_ascii_lowercase();
    let labels: Vec<&str> = normalized.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Vec::new();
    }
    if labels.len() == 2 {
        return vec![normalized];
    }
    (1..=labels.len() - 2)
        .map(|start| labels[start..].join("."))
        .collect()
}

/// Resolve the zone `hostname` is published in.
///
/// Several `Domain` objects for the same name are considered in name order,
/// so the outcome never depends on list order.
#[must_use]
pub fn resolve_zone(hostname: &str, domains: &[Domain], zones: &[DNSZone]) -> ZoneResolution {
    let normalized = hostname.trim_end_matches('.').to_ascii_lowercase();
    let mut unverified: Option<String> = None;

    for candidate in possible_zone_names(&normalized) {
        let mut matching: Vec<&Domain> = domains
            .iter()
            .filter(|d| d.spec.domain_name.trim_end_matches('.').eq_ignore_ascii_case(&candidate))
            .collect();
        if matching.is_empty() {
            continue;
        }
        matching.sort_by_key(|d| d.name_any());

        let verified = matching.into_iter().find(|d| {
            is_condition_true(
                d.status.as_ref().map_or(&[][..], |s| s.conditions.as_slice()),
                CONDITION_TYPE_VERIFIED_DNS_ZONE,
            )
        });
        let zone = zones
            .iter()
            .filter(|z| z.spec.domain_name.trim_end_matches('.').eq_ignore_ascii_case(&candidate))
            .min_by_key(|z| z.name_any());

        match (verified, zone) {
            (Some(domain), Some(zone)) => {
                return ZoneResolution::Resolved(ResolvedZone {
                    zone_ref: zone.name_any(),
                    zone_domain: candidate.clone(),
                    domain_ref: domain.name_any(),
                    hostname_is_apex: normalized == candidate,
                });
            }
            _ => {
                unverified.get_or_insert(candidate);
            }
        }
    }

    match unverified {
        Some(domain_name) => ZoneResolution::DomainNotVerified { domain_name },
        None => ZoneResolution::NotApplicable,
    }
}

#[cfg(test)]
#[path = "zones_tests.rs"]
mod zones_tests;
