// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `cert_manager.rs`

#[cfg(test)]
mod tests {
    use crate::cert_manager::*;
    use kube::core::DynamicObject;
    use serde_json::json;

    fn challenge(spec: serde_json::Value, status: serde_json::Value) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "acme.cert-manager.io/v1",
            "kind": "Challenge",
            "metadata": {
                "name": "web-cert-1-2-3",
                "namespace": "default",
                "uid": "c-uid",
            },
            "spec": spec,
            "status": status,
        }))
        .unwrap()
    }

    #[test]
    fn test_view_reads_documented_fields() {
        let obj = challenge(
            json!({
                "dnsName": "App.Example.com.",
                "token": "tok",
                "key": "tok.thumb",
                "type": "HTTP-01",
                "url": "https://acme.example/chall/1",
            }),
            json!({ "state": "pending", "presented": true, "processing": true }),
        );

        let view = AcmeChallenge::try_from(&obj).unwrap();

        assert_eq!(view.name, "web-cert-1-2-3");
        assert_eq!(view.namespace, "default");
        assert_eq!(view.uid.as_deref(), Some("c-uid"));
        assert_eq!(view.dns_name, "app.example.com");
        assert_eq!(view.token, "tok");
        assert_eq!(view.key, "tok.thumb");
        assert!(view.presented);
        assert!(view.needs_solver());
        assert_eq!(view.solver_path(), "/.well-known/acme-challenge/tok");
    }

    #[test]
    fn test_final_state_no_longer_needs_solver() {
        for state in ["valid", "invalid", "expired", "errored"] {
            let obj = challenge(
                json!({ "dnsName": "a.example.com", "token": "t", "key": "k", "type": "HTTP-01" }),
                json!({ "state": state }),
            );
            assert!(!AcmeChallenge::try_from(&obj).unwrap().needs_solver());
        }
    }

    #[test]
    fn test_dns01_is_ignored() {
        let obj = challenge(
            json!({ "dnsName": "a.example.com", "token": "t", "key": "k", "type": "DNS-01" }),
            json!({}),
        );
        assert!(!AcmeChallenge::try_from(&obj).unwrap().needs_solver());
    }

    #[test]
    fn test_malformed_spec_is_a_typed_error() {
        let obj = challenge(json!({ "token": 42 }), json!({}));
        let err = AcmeChallenge::try_from(&obj).unwrap_err();
        assert!(matches!(
            err,
            ChallengeViewError::Malformed { field: "spec", .. }
        ));
    }
}
