// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `connector.rs`

#[cfg(test)]
mod tests {
    use crate::config::OperatorConfig;
    use crate::crd::{Connector, ConnectorClass, ConnectorClassSpec, ConnectorSpec};
    use crate::reconcilers::connector::*;
    use crate::reconcilers::status::find_condition;
    use crate::testing::{fake_api_context, test_now, FakeApiServer};
    use chrono::Duration as ChronoDuration;
    use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, OwnerReference};
    use k8s_openapi::jiff::Timestamp;
    use std::time::Duration;

    fn lease(renewed_secs_ago: Option<i64>, duration: Option<i32>) -> Lease {
        Lease {
            spec: Some(LeaseSpec {
                renew_time: renewed_secs_ago
                    .map(|s| {
                        let t = test_now() - ChronoDuration::seconds(s);
                        MicroTime(
                            Timestamp::new(t.timestamp(), t.timestamp_subsec_nanos() as i32)
                                .unwrap(),
                        )
                    }),
                lease_duration_seconds: duration,
                ..LeaseSpec::default()
            }),
            ..Lease::default()
        }
    }

    #[test]
    fn test_never_renewed_is_pending() {
        let state = lease_state(&lease(None, Some(30)), test_now(), 30);
        assert_eq!(state, LeaseState::NeverRenewed);

        let (condition, requeue) = readiness(&state, test_now(), Some(1));
        assert_eq!(condition.status, "False");
        assert_eq!(condition.reason, "Pending");
        assert_eq!(requeue, Duration::from_secs(30));
    }

    #[test]
    fn test_recent_renewal_is_ready_until_expiry() {
        let state = lease_state(&lease(Some(10), Some(30)), test_now(), 60);
        assert_eq!(
            state,
            LeaseState::Live {
                expires_at: test_now() + ChronoDuration::seconds(20)
            }
        );

        let (condition, requeue) = readiness(&state, test_now(), Some(1));
        assert_eq!(condition.status, "True");
        assert_eq!(condition.reason, "Ready");
        assert_eq!(requeue, Duration::from_secs(20));
    }

    #[test]
    fn test_stale_renewal_is_expired() {
        let state = lease_state(&lease(Some(31), Some(30)), test_now(), 30);
        assert!(matches!(state, LeaseState::Expired { .. }));

        let (condition, _) = readiness(&state, test_now(), Some(1));
        assert_eq!(condition.status, "False");
        assert_eq!(condition.reason, "LeaseExpired");
    }

    #[test]
    fn test_default_duration_applies_without_lease_duration() {
        let state = lease_state(&lease(Some(45), None), test_now(), 60);

        assert!(matches!(state, LeaseState::Live { .. }));
    }

    #[test]
    fn test_expiry_exactly_now_is_expired() {
        let state = lease_state(&lease(Some(30), Some(30)), test_now(), 30);

        assert!(matches!(state, LeaseState::Expired { .. }));
    }


    fn connector() -> Connector {
        let mut connector = Connector::new(
            "edge",
            ConnectorSpec {
                connector_class_name: "tunnel".to_string(),
            },
        );
        connector.metadata.namespace = Some("team-a".to_string());
        connector.metadata.uid = Some("connector-uid".to_string());
        connector.metadata.generation = Some(1);
        connector
    }

    fn api_with_class() -> FakeApiServer {
        let server = FakeApiServer::new();
        server.insert(&ConnectorClass::new(
            "tunnel",
            ConnectorClassSpec {
                controller_name: "example.com/tunnel".to_string(),
            },
        ));
        server.insert(&connector());
        server
    }

    #[tokio::test]
    async fn test_new_connector_gets_lease_and_stable_status() {
        let server = api_with_class();
        let ctx = fake_api_context(OperatorConfig::default(), &server);

        reconcile_connector(&ctx, &connector()).await.unwrap();

        let lease: Lease = server.get(Some("team-a"), "edge").unwrap();
        let owner = &lease.metadata.owner_references.as_ref().unwrap()[0];
        assert_eq!(owner.uid, "connector-uid");
        assert_eq!(owner.controller, Some(true));
        let stored: Connector = server.get(Some("team-a"), "edge").unwrap();
        let status = stored.status.clone().unwrap();
        assert_eq!(status.lease_ref.unwrap().name, "edge");
        let ready = find_condition(&status.conditions, "Ready").unwrap();
        assert_eq!(ready.reason, "Pending");
        assert_eq!(ready.last_transition_time.as_deref(), Some("2025-06-01T12:00:00Z"));

        server.clear_requests();
        reconcile_connector(&ctx, &stored).await.unwrap();
        assert!(server.writes().is_empty(), "unexpected writes: {:?}", server.writes());
    }

    #[tokio::test]
    async fn test_foreign_lease_reports_conflict_and_is_left_alone() {
        let server = api_with_class();
        let mut foreign = Lease::default();
        foreign.metadata.name = Some("edge".to_string());
        foreign.metadata.namespace = Some("team-a".to_string());
        foreign.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            name: "someone-else".to_string(),
            uid: "other-uid".to_string(),
            controller: Some(true),
            block_owner_deletion: None,
        }]);
        server.insert(&foreign);
        let before: Lease = server.get(Some("team-a"), "edge").unwrap();
        let ctx = fake_api_context(OperatorConfig::default(), &server);

        reconcile_connector(&ctx, &connector()).await.unwrap();

        assert!(!server.writes().iter().any(|w| w.contains("/leases")));
        assert_eq!(server.get::<Lease>(Some("team-a"), "edge").unwrap(), before);
        let status = server
            .get::<Connector>(Some("team-a"), "edge")
            .unwrap()
            .status
            .unwrap();
        assert!(status.lease_ref.is_none());
        let ready = find_condition(&status.conditions, "Ready").unwrap();
        assert_eq!(ready.status, "False");
        assert_eq!(ready.reason, "Conflict");
        assert!(ready.message.contains("Deployment someone-else"));
    }
}
