// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Coraza directive compilation.
//!
//! A policy compiles to an ordered list of SecLang directives. Coraza reads
//! them top to bottom, so the order below is part of the output contract:
//!
//! 1. `Include @coraza.conf-recommended` and the `SecRuleEngine` mode
//! 2. `Include @crs-setup.conf`
//! 3. CRS tuning (`SecAction` setting paranoia, thresholds and sampling)
//! 4. `Include @owasp_crs/*.conf`
//! 5. Rule exclusions, which only apply to rules already loaded

use crate::crd::{
    OwaspCoreRuleSet, RuleSetType, TrafficProtectionMode, TrafficProtectionPolicySpec,
};
use crate::errors::PolicyError;

/// Coraza engine mode of a policy mode.
#[must_use]
pub fn rule_engine(mode: TrafficProtectionMode) -> &'static str {
    match mode {
        TrafficProtectionMode::Observe => "DetectionOnly",
        TrafficProtectionMode::Enforce => "On",
        TrafficProtectionMode::Disabled => "Off",
    }
}

/// Compile `spec` into Coraza directives.
///
/// A `Disabled` policy compiles to the engine directive alone. A policy
/// without rule sets loads the Core Rule Set with its defaults.
///
/// # Errors
///
/// Returns [`PolicyError::InvalidIdRange`] for a malformed exclusion range.
pub fn compile_directives(spec: &TrafficProtectionPolicySpec) -> Result<Vec<String>, PolicyError> {
    let engine = format!("SecRuleEngine {}", rule_engine(spec.mode));
    if spec.mode == TrafficProtectionMode::Disabled {
        return Ok(vec![engine]);
    }

    let default_crs = OwaspCoreRuleSet::default();
    let crs = spec
        .rule_sets
        .iter()
        .filter(|rs| rs.rule_set_type == RuleSetType::OwaspCoreRuleSet)
        .find_map(|rs| rs.owasp_core_rule_set.as_ref())
        .unwrap_or(&default_crs);

    let mut directives = vec![
        "Include @coraza.conf-recommended".to_string(),
        engine,
        "Include @crs-setup.conf".to_string(),
    ];

    let paranoia = crs.paranoia_levels.clone().unwrap_or_default();
    directives.push(format!(
        "SecAction \"id:900000,phase:1,pass,t:none,nolog,setvar:tx.blocking_paranoia_level={}\"",
        paranoia.blocking
    ));
    directives.push(format!(
        "SecAction \"id:900001,phase:1,pass,t:none,nolog,setvar:tx.detection_paranoia_level={}\"",
        paranoia.detection.max(paranoia.blocking)
    ));

    let thresholds = crs.score_thresholds.clone().unwrap_or_default();
    directives.push(format!(
        "SecAction \"id:900110,phase:1,pass,t:none,nolog,setvar:tx.inbound_anomaly_score_threshold={},setvar:tx.outbound_anomaly_score_threshold={}\"",
        thresholds.inbound, thresholds.outbound
    ));

    if let Some(sampling) = spec.sampling_percentage {
        directives.push(format!(
            "SecAction \"id:900400,phase:1,pass,nolog,setvar:tx.sampling_percentage={}\"",
            sampling.min(100)
        ));
    }

    directives.push("Include @owasp_crs/*.conf".to_string());

    if let Some(exclusions) = &crs.rule_exclusions {
        for tag in &exclusions.tags {
            directives.push(format!("SecRuleRemoveByTag \"{tag}\""));
        }
        for id in &exclusions.ids {
            directives.push(format!("SecRuleRemoveById {id}"));
        }
        for range in &exclusions.id_ranges {
            let (from, to) = parse_id_range(range)?;
            directives.push(format!("SecRuleRemoveById {from}-{to}"));
        }
    }

    Ok(directives)
}

/// Parse `<from>-<to>` into an inclusive range.
///
/// # Errors
///
/// Returns [`PolicyError::InvalidIdRange`] when either bound is not a number
/// or `from > to`.
pub fn parse_id_range(range: &str) -> Result<(u32, u32), PolicyError> {
    let invalid = || PolicyError::InvalidIdRange {
        range: range.to_string(),
    };
    let (from, to) = range.trim().split_once('-').ok_or_else(invalid)?;
    let from: u32 = from.trim().parse().map_err(|_| invalid())?;
    let to: u32 = to.trim().parse().map_err(|_| invalid())?;
    if from > to {
        return Err(invalid());
    }
    Ok((from, to))
}

#[cfg(test)]
#[path = "coraza_tests.rs"]
mod coraza_tests;
