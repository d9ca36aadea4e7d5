// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `attachment.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{
        AncestorReference, PolicyAncestorStatus, PolicyTargetReference, TrafficProtectionPolicy,
        TrafficProtectionPolicySpec,
    };
    use crate::gateway_api::{
        Gateway, GatewaySpec, HTTPRoute, HTTPRouteRule, HTTPRouteSpec, Listener, ParentReference,
    };
    use crate::reconcilers::policy::attachment::*;
    use crate::reconcilers::status::create_condition;
    use crate::testing::test_now;
    use chrono::{TimeZone, Utc};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use k8s_openapi::jiff::Timestamp;
    use std::collections::BTreeMap;

    fn target(kind: &str, name: &str, section: Option<&str>) -> PolicyTargetReference {
        PolicyTargetReference {
            group: "gateway.networking.k8s.io".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            section_name: section.map(ToString::to_string),
        }
    }

    fn policy(name: &str, minute: u32, targets: Vec<PolicyTargetReference>) -> TrafficProtectionPolicy {
        let mut policy = TrafficProtectionPolicy::new(
            name,
            TrafficProtectionPolicySpec {
                target_refs: targets,
                ..Default::default()
            },
        );
        policy.metadata.namespace = Some("team-a".to_string());
        policy.metadata.creation_timestamp =
            Some(Time(
            Timestamp::from_second(
                Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0)
                    .unwrap()
                    .timestamp(),
            )
            .unwrap(),
        ));
        policy
    }

    fn gateway() -> Gateway {
        let mut gw = Gateway::new(
            "web",
            GatewaySpec {
                gateway_class_name: "envoy".to_string(),
                listeners: vec![Listener {
                    name: "default-https".to_string(),
                    ..Default::default()
                }],
            },
        );
        gw.metadata.namespace = Some("team-a".to_string());
        gw
    }

    fn route() -> HTTPRoute {
        let mut route = HTTPRoute::new(
            "web",
            HTTPRouteSpec {
                parent_refs: vec![ParentReference {
                    name: "web".to_string(),
                    ..Default::default()
                }],
                hostnames: vec![],
                rules: vec![
                    HTTPRouteRule {
                        name: Some("api".to_string()),
                        ..Default::default()
                    },
                    HTTPRouteRule {
                        name: Some("static".to_string()),
                        ..Default::default()
                    },
                ],
            },
        );
        route.metadata.namespace = Some("team-a".to_string());
        route
    }

    fn resolve(policies: &[TrafficProtectionPolicy]) -> Vec<Attachment> {
        resolve_attachments(policies, &[gateway()], &[route()], &BTreeMap::new())
    }

    #[test]
    fn test_second_policy_on_same_rule_is_conflicted() {
        // Listed newest first; creation time decides.
        let policies = vec![
            policy("second", 5, vec![target("HTTPRoute", "web", Some("api"))]),
            policy("first", 1, vec![target("HTTPRoute", "web", Some("api"))]),
        ];

        let attachments = resolve(&policies);

        assert_eq!(attachments[0].policy, "first");
        assert!(attachments[0].is_accepted());
        assert_eq!(
            attachments[0].scopes[0].route.as_ref().unwrap().rule_index,
            Some(0)
        );
        assert_eq!(attachments[1].policy, "second");
        assert_eq!(
            attachments[1].state,
            AttachmentState::Conflicted {
                holder: "first".to_string()
            }
        );
        assert!(attachments[1].scopes.is_empty());
        assert_eq!(attachments[1].condition(Some(1)).reason, "Conflicted");
    }

    #[test]
    fn test_different_rules_do_not_conflict() {
        let policies = vec![
            policy("a", 1, vec![target("HTTPRoute", "web", Some("api"))]),
            policy("b", 2, vec![target("HTTPRoute", "web", Some("static"))]),
        ];

        assert!(resolve(&policies).iter().all(Attachment::is_accepted));
    }

    fn conflicted_by(attachment: &Attachment) -> Option<&str> {
        match &attachment.state {
            AttachmentState::Conflicted { holder } => Some(holder),
            _ => None,
        }
    }

    #[test]
    fn test_listener_wins_over_older_whole_gateway() {
        let policies = vec![
            policy("whole", 1, vec![target("Gateway", "web", None)]),
            policy("listener", 2, vec![target("Gateway", "web", Some("default-https"))]),
        ];

        let attachments = resolve(&policies);

        assert_eq!(attachments[0].policy, "whole");
        assert_eq!(conflicted_by(&attachments[0]), Some("listener"));
        assert!(attachments[0].scopes.is_empty());
        assert!(attachments[1].is_accepted());
    }

    #[test]
    fn test_route_wins_over_listener_and_gateway() {
        let policies = vec![
            policy("whole", 1, vec![target("Gateway", "web", None)]),
            policy("listener", 2, vec![target("Gateway", "web", Some("default-https"))]),
            policy("routewide", 3, vec![target("HTTPRoute", "web", None)]),
        ];

        let attachments = resolve(&policies);

        assert_eq!(conflicted_by(&attachments[0]), Some("routewide"));
        assert_eq!(conflicted_by(&attachments[1]), Some("routewide"));
        assert!(attachments[2].is_accepted());
        assert_eq!(attachments[2].scopes.len(), 1);
        assert!(attachments[0]
            .condition(None)
            .message
            .contains("Policy routewide is already attached"));
    }

    #[test]
    fn test_route_through_other_listener_leaves_listener_free() {
        let mut gw = gateway();
        gw.spec.listeners.push(Listener {
            name: "default-http".to_string(),
            ..Default::default()
        });
        let mut rt = route();
        rt.spec.parent_refs[0].section_name = Some("default-http".to_string());
        let policies = vec![
            policy("whole", 1, vec![target("Gateway", "web", None)]),
            policy("listener", 2, vec![target("Gateway", "web", Some("default-https"))]),
            policy("rule", 3, vec![target("HTTPRoute", "web", Some("api"))]),
        ];

        let attachments = resolve_attachments(&policies, &[gw], &[rt], &BTreeMap::new());

        assert_eq!(conflicted_by(&attachments[0]), Some("rule"));
        assert!(attachments[1].is_accepted());
        assert!(attachments[2].is_accepted());
    }

    #[test]
    fn test_rule_wins_over_whole_route() {
        let policies = vec![
            policy("routewide", 1, vec![target("HTTPRoute", "web", None)]),
            policy("rule", 2, vec![target("HTTPRoute", "web", Some("static"))]),
        ];

        let attachments = resolve(&policies);

        assert_eq!(conflicted_by(&attachments[0]), Some("rule"));
        assert!(attachments[1].is_accepted());
    }

    #[test]
    fn test_missing_sections_are_target_not_found() {
        let policies = vec![policy(
            "p",
            1,
            vec![
                target("Gateway", "web", Some("nope")),
                target("HTTPRoute", "web", Some("nope")),
                target("HTTPRoute", "missing", None),
            ],
        )];

        let attachments = resolve(&policies);

        for attachment in &attachments {
            assert!(matches!(attachment.state, AttachmentState::TargetNotFound { .. }));
            assert_eq!(attachment.condition(None).reason, "TargetNotFound");
        }
        assert_eq!(attachments[2].ancestors[0].kind, "HTTPRoute");
    }

    #[test]
    fn test_route_ancestor_is_parent_gateway() {
        let attachments = resolve(&[policy("p", 1, vec![target("HTTPRoute", "web", None)])]);

        assert_eq!(attachments[0].ancestors[0].kind, "Gateway");
        assert_eq!(attachments[0].ancestors[0].name, "web");
        assert_eq!(attachments[0].scopes[0].route.as_ref().unwrap().rule_index, None);
    }

    #[test]
    fn test_invalid_policy_claims_nothing() {
        let policies = vec![
            policy("broken", 1, vec![target("Gateway", "web", None)]),
            policy("good", 2, vec![target("Gateway", "web", None)]),
        ];
        let invalid = BTreeMap::from([("broken".to_string(), "bad range".to_string())]);

        let attachments = resolve_attachments(&policies, &[gateway()], &[route()], &invalid);

        assert!(matches!(attachments[0].state, AttachmentState::Invalid { .. }));
        assert!(attachments[1].is_accepted());
    }

    #[test]
    fn test_deleting_policies_release_their_targets() {
        let mut gone = policy("gone", 1, vec![target("Gateway", "web", None)]);
        gone.metadata.deletion_timestamp = gone.metadata.creation_timestamp.clone();
        let policies = vec![gone, policy("next", 2, vec![target("Gateway", "web", None)])];

        let attachments = resolve(&policies);

        assert_eq!(attachments.len(), 1);
        assert!(attachments[0].is_accepted());
    }

    #[test]
    fn test_ancestor_statuses_keep_foreign_entries() {
        let foreign = PolicyAncestorStatus {
            ancestor_ref: AncestorReference {
                name: "web".to_string(),
                ..Default::default()
            },
            controller_name: "example.com/other".to_string(),
            conditions: vec![create_condition("Accepted", "True", "Accepted", "", None)],
        };
        let attachments = resolve(&[policy("p", 1, vec![target("Gateway", "web", None)])]);

        let statuses = ancestor_statuses(&[foreign.clone()], &attachments, "p", Some(3), test_now());
        let again = ancestor_statuses(&statuses, &attachments, "p", Some(3), test_now());

        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0], foreign);
        assert_eq!(statuses[1].conditions[0].observed_generation, Some(3));
        assert_eq!(statuses, again);
    }
}
