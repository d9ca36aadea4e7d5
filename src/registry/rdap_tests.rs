// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `rdap.rs`

#[cfg(test)]
mod tests {
    use crate::errors::{RegistryError, VerificationError};
    use crate::registry::rdap::*;
    use crate::registry::RegistryClient;
    use crate::verification::DnsResolver;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticNs(Vec<String>);

    #[async_trait::async_trait]
    impl DnsResolver for StaticNs {
        async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, VerificationError> {
            Err(VerificationError::RecordNotFound {
                name: name.to_string(),
            })
        }

        async fn lookup_ns(&self, name: &str) -> Result<Vec<String>, VerificationError> {
            if self.0.is_empty() {
                Err(VerificationError::RecordNotFound {
                    name: name.to_string(),
                })
            } else {
                Ok(self.0.clone())
            }
        }
    }

    fn example_com() -> serde_json::Value {
        json!({
            "objectClassName": "domain",
            "ldhName": "EXAMPLE.COM",
            "events": [
                { "eventAction": "registration", "eventDate": "1995-08-14T04:00:00Z" },
                { "eventAction": "expiration", "eventDate": "2026-08-13T04:00:00Z" }
            ],
            "entities": [{
                "roles": ["registrar"],
                "handle": "376",
                "vcardArray": ["vcard", [["version", {}, "text", "4.0"], ["fn", {}, "text", "RESERVED-IANA"]]]
            }],
            "nameservers": [
                { "ldhName": "B.IANA-SERVERS.NET" },
                { "ldhName": "A.IANA-SERVERS.NET" }
            ]
        })
    }

    #[tokio::test]
    async fn test_lookup_domain_parses_registration() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/domain/example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(example_com()))
            .mount(&server)
            .await;

        let client = RdapRegistryClient::new(&server.uri(), None).unwrap();
        let lookup = client.lookup_domain("example.com").await.unwrap();

        assert_eq!(lookup.source, "rdap");
        assert_eq!(lookup.registration.domain, "example.com");
        assert_eq!(lookup.registration.registrar.as_deref(), Some("RESERVED-IANA"));
        assert_eq!(
            lookup.registration.created_at,
            Some(Utc.with_ymd_and_hms(1995, 8, 14, 4, 0, 0).unwrap())
        );
        assert_eq!(
            lookup.nameservers,
            vec!["a.iana-servers.net", "b.iana-servers.net"]
        );
        assert!(lookup.is_apex("example.com"));
    }

    #[tokio::test]
    async fn test_lookup_subdomain_walks_to_registered_parent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/domain/example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(example_com()))
            .mount(&server)
            .await;

        let client = RdapRegistryClient::new(&server.uri(), None).unwrap();
        let lookup = client.lookup_domain("api.example.com").await.unwrap();

        assert_eq!(lookup.registration.domain, "example.com");
        assert!(!lookup.is_apex("api.example.com"));
        assert_eq!(lookup.nameservers.len(), 2);
    }

    #[tokio::test]
    async fn test_subdomain_delegation_overrides_apex_nameservers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/domain/example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(example_com()))
            .mount(&server)
            .await;

        let resolver = Arc::new(StaticNs(vec!["ns1.sub-dns.net".to_string()]));
        let client = RdapRegistryClient::new(&server.uri(), Some(resolver)).unwrap();
        let lookup = client.lookup_domain("api.example.com").await.unwrap();

        assert_eq!(lookup.nameservers, vec!["ns1.sub-dns.net"]);
        assert_eq!(lookup.registration.nameservers.len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limited_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let client = RdapRegistryClient::new(&server.uri(), None).unwrap();
        let err = client.lookup_domain("example.com").await.unwrap_err();

        assert_eq!(
            err,
            RegistryError::RateLimited {
                provider: "rdap".to_string(),
                retry_after: Some(Duration::from_secs(7)),
            }
        );
    }

    #[tokio::test]
    async fn test_unregistered_domain_is_not_found() {
        let server = MockServer::start().await;
        let client = RdapRegistryClient::new(&server.uri(), None).unwrap();

        let err = client.lookup_domain("nope.example").await.unwrap_err();

        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_lookup_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = RdapRegistryClient::new(&server.uri(), None).unwrap();
        let err = client.lookup_domain("example.com").await.unwrap_err();

        assert!(matches!(err, RegistryError::Lookup { .. }));
    }

    #[tokio::test]
    async fn test_lookup_nameserver_and_ip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nameserver/a.iana-servers.net"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ldhName": "A.IANA-SERVERS.NET",
                "ipAddresses": { "v4": ["199.43.135.53"], "v6": ["2001:500:8f::53"] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ip/199.43.135.53"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "ICANN-NET",
                "startAddress": "199.43.132.0",
                "endAddress": "199.43.135.255",
                "entities": [{
                    "roles": ["registrant"],
                    "vcardArray": ["vcard", [["fn", {}, "text", "ICANN"]]]
                }]
            })))
            .mount(&server)
            .await;

        let client = RdapRegistryClient::new(&server.uri(), None).unwrap();
        let ns = client.lookup_nameserver("a.iana-servers.net").await.unwrap();
        assert_eq!(ns.addresses.len(), 2);

        let holder = client
            .lookup_ip_registrant("199.43.135.53".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(holder.network_name.as_deref(), Some("ICANN-NET"));
        assert_eq!(holder.organization.as_deref(), Some("ICANN"));
    }

    #[test]
    fn test_parse_retry_after() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(parse_retry_after("120", now), Some(Duration::from_secs(120)));
        assert_eq!(
            parse_retry_after("Wed, 01 Jan 2025 00:00:30 +0000", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }
}
