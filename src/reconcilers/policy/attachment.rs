// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Policy attachment resolution.
//!
//! Policies target a Gateway (optionally one listener) or an HTTPRoute
//! (optionally one named rule). The most specific attachment wins: route
//! rules are claimed first, then whole routes, listeners and finally whole
//! gateways. A route or rule claim also holds the gateways and listeners the
//! route is attached to, so a less specific policy on any of them is
//! `Conflicted`. Within one level the oldest policy wins.

use crate::constants::{CONTROLLER_NAME, GATEWAY_API_GROUP, KIND_GATEWAY, KIND_HTTP_ROUTE};
use crate::crd::{AncestorReference, Condition, PolicyAncestorStatus, PolicyTargetReference, TrafficProtectionPolicy};
use crate::gateway_api::{Gateway, HTTPRoute};
use crate::reconcilers::status::{create_condition, set_condition};
use crate::status_reasons::{
    CONDITION_TYPE_ACCEPTED, REASON_ACCEPTED, REASON_CONFLICTED, REASON_INVALID,
    REASON_TARGET_NOT_FOUND, STATUS_FALSE, STATUS_TRUE,
};
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Route part of a patch scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteSelector {
    pub namespace: String,
    pub name: String,
    /// Index of the targeted rule; `None` for the whole route
    pub rule_index: Option<usize>,
}

/// Where on a gateway an attachment applies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchScope {
    pub gateway: String,
    /// Listener the attachment is limited to
    pub listener: Option<String>,
    pub route: Option<RouteSelector>,
}

/// Outcome of one target reference of one policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttachmentState {
    Accepted,
    /// Another policy holds the target; carries that policy's name
    Conflicted { holder: String },
    TargetNotFound { message: String },
    /// The policy cannot be compiled
    Invalid { message: String },
}

/// One resolved target reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    /// Name of the policy
    pub policy: String,
    pub target_ref: PolicyTargetReference,
    pub state: AttachmentState,
    /// Gateways (and listeners) the attachment reports status against
    pub ancestors: Vec<AncestorReference>,
    /// Patch scopes, one per ancestor; empty unless accepted
    pub scopes: Vec<PatchScope>,
}

impl Attachment {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.state == AttachmentState::Accepted
    }

    /// The `Accepted` condition reported on every ancestor.
    #[must_use]
    pub fn condition(&self, generation: Option<i64>) -> Condition {
        let target = describe_target(&self.target_ref);
        match &self.state {
            AttachmentState::Accepted => create_condition(
                CONDITION_TYPE_ACCEPTED,
                STATUS_TRUE,
                REASON_ACCEPTED,
                &format!("Policy attached to {target}"),
                generation,
            ),
            AttachmentState::Conflicted { holder } => create_condition(
                CONDITION_TYPE_ACCEPTED,
                STATUS_FALSE,
                REASON_CONFLICTED,
                &format!("Policy {holder} is already attached to {target} or a more specific part of it"),
                generation,
            ),
            AttachmentState::TargetNotFound { message } => create_condition(
                CONDITION_TYPE_ACCEPTED,
                STATUS_FALSE,
                REASON_TARGET_NOT_FOUND,
                message,
                generation,
            ),
            AttachmentState::Invalid { message } => create_condition(
                CONDITION_TYPE_ACCEPTED,
                STATUS_FALSE,
                REASON_INVALID,
                message,
                generation,
            ),
        }
    }
}

/// How specific a target reference is; lower values are resolved first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Specificity {
    RouteRule,
    Route,
    Listener,
    Gateway,
}

impl Specificity {
    #[must_use]
    pub fn of(target_ref: &PolicyTargetReference) -> Self {
        match (target_ref.kind.as_str(), target_ref.section_name.is_some()) {
            (KIND_HTTP_ROUTE, true) => Specificity::RouteRule,
            (KIND_HTTP_ROUTE, false) => Specificity::Route,
            (_, true) => Specificity::Listener,
            (_, false) => Specificity::Gateway,
        }
    }
}

/// Claims made so far, most specific first.
///
/// Every accepted claim is also recorded against the gateways and listeners
/// above it, so a later, less specific claim on any of those is refused.
#[derive(Debug, Default)]
struct Claims {
    rules: BTreeMap<(String, String), String>,
    /// First rule claim per route
    rules_of_route: BTreeMap<String, String>,
    routes: BTreeMap<String, String>,
    listeners: BTreeMap<(String, String), String>,
    gateways: BTreeMap<String, String>,
    /// Route claims through a listener parent reference
    below_listener: BTreeMap<(String, String), String>,
    /// Route claims through a parent reference naming no listener
    below_all_listeners: BTreeMap<String, String>,
    /// Any listener, route or rule claim under a gateway
    below_gateway: BTreeMap<String, String>,
}

impl Claims {
    /// Claim `target_ref` for `policy`; returns the policy already holding it,
    /// or a more specific part of it, on conflict.
    fn claim(&mut self, target_ref: &PolicyTargetReference, scopes: &[PatchScope], policy: &str) -> Result<(), String> {
        let name = target_ref.name.clone();
        let section = target_ref.section_name.clone().unwrap_or_default();
        let held = match Specificity::of(target_ref) {
            Specificity::RouteRule => self.rules.get(&(name.clone(), section.clone())),
            Specificity::Route => self.routes.get(&name).or_else(|| self.rules_of_route.get(&name)),
            Specificity::Listener => self
                .listeners
                .get(&(name.clone(), section.clone()))
                .or_else(|| self.below_listener.get(&(name.clone(), section.clone())))
                .or_else(|| self.below_all_listeners.get(&name)),
            Specificity::Gateway => self.gateways.get(&name).or_else(|| self.below_gateway.get(&name)),
        };
        if let Some(holder) = held {
            return Err(holder.clone());
        }

        let policy = policy.to_string();
        match Specificity::of(target_ref) {
            Specificity::RouteRule => {
                self.rules.insert((name.clone(), section), policy.clone());
                self.rules_of_route.entry(name).or_insert_with(|| policy.clone());
            }
            Specificity::Route => {
                self.routes.insert(name, policy.clone());
            }
            Specificity::Listener => {
                self.below_gateway.entry(name.clone()).or_insert_with(|| policy.clone());
                self.listeners.insert((name, section), policy);
                return Ok(());
            }
            Specificity::Gateway => {
                self.gateways.insert(name, policy);
                return Ok(());
            }
        }
        for scope in scopes {
            self.below_gateway
                .entry(scope.gateway.clone())
                .or_insert_with(|| policy.clone());
            match &scope.listener {
                Some(listener) => self
                    .below_listener
                    .entry((scope.gateway.clone(), listener.clone()))
                    .or_insert_with(|| policy.clone()),
                None => self
                    .below_all_listeners
                    .entry(scope.gateway.clone())
                    .or_insert_with(|| policy.clone()),
            };
        }
        Ok(())
    }
}

/// Order policies oldest first, by name on ties. Deleting policies are dropped.
#[must_use]
pub fn attachment_order(policies: &[TrafficProtectionPolicy]) -> Vec<&TrafficProtectionPolicy> {
    let mut ordered: Vec<&TrafficProtectionPolicy> = policies
        .iter()
        .filter(|p| p.metadata.deletion_timestamp.is_none())
        .collect();
    ordered.sort_by(|a, b| {
        let created = |p: &TrafficProtectionPolicy| p.metadata.creation_timestamp.as_ref().map(|t| t.0);
        created(*a)
            .cmp(&created(*b))
            .then_with(|| a.name_any().cmp(&b.name_any()))
    });
    ordered
}

/// Resolve every target reference of `policies` against the gateways and
/// routes of their namespace.
///
/// Claims are made most specific first: route rules, whole routes, listeners,
/// then whole gateways, each level in [`attachment_order`]. The result is in
/// [`attachment_order`], target references in spec order.
///
/// `invalid` names policies that failed to compile; their references resolve
/// to [`AttachmentState::Invalid`] and claim nothing.
#[must_use]
pub fn resolve_attachments(
    policies: &[TrafficProtectionPolicy],
    gateways: &[Gateway],
    routes: &[HTTPRoute],
    invalid: &BTreeMap<String, String>,
) -> Vec<Attachment> {
    let mut attachments = Vec::new();
    // Resolved scopes waiting for a claim, by attachment index.
    let mut pending: Vec<(usize, Vec<PatchScope>)> = Vec::new();

    for policy in attachment_order(policies) {
        let policy_name = policy.name_any();
        let namespace = policy.namespace().unwrap_or_default();

        for target_ref in &policy.spec.target_refs {
            let mut attachment = Attachment {
                policy: policy_name.clone(),
                target_ref: target_ref.clone(),
                state: AttachmentState::Accepted,
                ancestors: Vec::new(),
                scopes: Vec::new(),
            };

            let resolved = match (target_ref.group.as_str(), target_ref.kind.as_str()) {
                (GATEWAY_API_GROUP, KIND_GATEWAY) => resolve_gateway_target(target_ref, &namespace, gateways),
                (GATEWAY_API_GROUP, KIND_HTTP_ROUTE) => {
                    resolve_route_target(target_ref, &namespace, routes, gateways)
                }
                _ => Err(format!(
                    "Unsupported target kind {}/{}",
                    target_ref.group, target_ref.kind
                )),
            };

            match resolved {
                Err(message) => {
                    attachment.state = AttachmentState::TargetNotFound { message };
                    attachment.ancestors.push(target_ancestor(target_ref, &namespace));
                }
                Ok((ancestors, scopes)) => {
                    attachment.ancestors = ancestors;
                    match invalid.get(&policy_name) {
                        Some(message) => {
                            attachment.state = AttachmentState::Invalid {
                                message: message.clone(),
                            };
                        }
                        None => pending.push((attachments.len(), scopes)),
                    }
                }
            }
            attachments.push(attachment);
        }
    }

    // Stable: within one level the attachment order is kept.
    pending.sort_by_key(|(index, _)| Specificity::of(&attachments[*index].target_ref));
    let mut claims = Claims::default();
    for (index, scopes) in pending {
        let attachment = &mut attachments[index];
        match claims.claim(&attachment.target_ref, &scopes, &attachment.policy) {
            Ok(()) => attachment.scopes = scopes,
            Err(holder) => attachment.state = AttachmentState::Conflicted { holder },
        }
    }

    attachments
}

type Resolved = Result<(Vec<AncestorReference>, Vec<PatchScope>), String>;

fn resolve_gateway_target(target_ref: &PolicyTargetReference, namespace: &str, gateways: &[Gateway]) -> Resolved {
    let gateway = gateways
        .iter()
        .find(|g| g.name_any() == target_ref.name)
        .ok_or_else(|| format!("Gateway {} not found", target_ref.name))?;

    if let Some(listener) = &target_ref.section_name {
        if !gateway.spec.listeners.iter().any(|l| &l.name == listener) {
            return Err(format!(
                "Gateway {} has no listener named {listener}",
                target_ref.name
            ));
        }
    }

    Ok((
        vec![gateway_ancestor(namespace, &target_ref.name, target_ref.section_name.clone())],
        vec![PatchScope {
            gateway: target_ref.name.clone(),
            listener: target_ref.section_name.clone(),
            route: None,
        }],
    ))
}

fn resolve_route_target(
    target_ref: &PolicyTargetReference,
    namespace: &str,
    routes: &[HTTPRoute],
    gateways: &[Gateway],
) -> Resolved {
    let route = routes
        .iter()
        .find(|r| r.name_any() == target_ref.name)
        .ok_or_else(|| format!("HTTPRoute {} not found", target_ref.name))?;

    let rule_index = match &target_ref.section_name {
        None => None,
        Some(rule) => Some(
            route
                .spec
                .rules
                .iter()
                .position(|r| r.name.as_deref() == Some(rule.as_str()))
                .ok_or_else(|| format!("HTTPRoute {} has no rule named {rule}", target_ref.name))?,
        ),
    };

    let mut ancestors = Vec::new();
    let mut scopes = Vec::new();
    for parent in &route.spec.parent_refs {
        let is_gateway = parent.kind.as_deref().is_none_or(|k| k == KIND_GATEWAY);
        let same_namespace = parent.namespace.as_deref().is_none_or(|ns| ns == namespace);
        if !is_gateway || !same_namespace || !gateways.iter().any(|g| g.name_any() == parent.name) {
            continue;
        }
        ancestors.push(gateway_ancestor(namespace, &parent.name, parent.section_name.clone()));
        scopes.push(PatchScope {
            gateway: parent.name.clone(),
            listener: parent.section_name.clone(),
            route: Some(RouteSelector {
                namespace: namespace.to_string(),
                name: target_ref.name.clone(),
                rule_index,
            }),
        });
    }

    if ancestors.is_empty() {
        return Err(format!(
            "HTTPRoute {} is not attached to a Gateway in namespace {namespace}",
            target_ref.name
        ));
    }
    Ok((ancestors, scopes))
}

fn gateway_ancestor(namespace: &str, name: &str, section_name: Option<String>) -> AncestorReference {
    AncestorReference {
        group: GATEWAY_API_GROUP.to_string(),
        kind: KIND_GATEWAY.to_string(),
        namespace: namespace.to_string(),
        name: name.to_string(),
        section_name,
    }
}

fn target_ancestor(target_ref: &PolicyTargetReference, namespace: &str) -> AncestorReference {
    AncestorReference {
        group: target_ref.group.clone(),
        kind: target_ref.kind.clone(),
        namespace: namespace.to_string(),
        name: target_ref.name.clone(),
        section_name: target_ref.section_name.clone(),
    }
}

fn describe_target(target_ref: &PolicyTargetReference) -> String {
    match &target_ref.section_name {
        Some(section) => format!("{} {} section {section}", target_ref.kind, target_ref.name),
        None => format!("{} {}", target_ref.kind, target_ref.name),
    }
}

/// Fold the attachments of `policy_name` into its ancestor statuses.
///
/// Entries written by other controllers are kept; ours are rebuilt, with
/// existing conditions updated in place so unchanged ones keep their
/// transition time.
#[must_use]
pub fn ancestor_statuses(
    current: &[PolicyAncestorStatus],
    attachments: &[Attachment],
    policy_name: &str,
    generation: Option<i64>,
    now: DateTime<Utc>,
) -> Vec<PolicyAncestorStatus> {
    let mut statuses: Vec<PolicyAncestorStatus> = current
        .iter()
        .filter(|s| s.controller_name != CONTROLLER_NAME)
        .cloned()
        .collect();

    for attachment in attachments.iter().filter(|a| a.policy == policy_name) {
        let condition = attachment.condition(generation);
        for ancestor in &attachment.ancestors {
            if let Some(existing) = statuses
                .iter_mut()
                .find(|s| s.controller_name == CONTROLLER_NAME && &s.ancestor_ref == ancestor)
            {
                // Several references can share an ancestor; a failure wins.
                if condition.status == STATUS_FALSE {
                    set_condition(&mut existing.conditions, condition.clone(), now);
                }
                continue;
            }
            let mut conditions = current
                .iter()
                .find(|s| s.controller_name == CONTROLLER_NAME && &s.ancestor_ref == ancestor)
                .map(|s| s.conditions.clone())
                .unwrap_or_default();
            set_condition(&mut conditions, condition.clone(), now);
            statuses.push(PolicyAncestorStatus {
                ancestor_ref: ancestor.clone(),
                controller_name: CONTROLLER_NAME.to_string(),
                conditions,
            });
        }
    }

    statuses
}

#[cfg(test)]
#[path = "attachment_tests.rs"]
mod attachment_tests;
