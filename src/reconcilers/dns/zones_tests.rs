// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `zones.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{Domain, DomainSpec, DomainStatus};
    use crate::dns_operator::{DNSZone, DNSZoneSpec};
    use crate::reconcilers::dns::zones::*;
    use crate::reconcilers::status::create_condition;

    fn domain(name: &str, domain_name: &str, zone_verified: bool) -> Domain {
        let mut domain = Domain::new(
            name,
            DomainSpec {
                domain_name: domain_name.to_string(),
                desired_registration_refresh_attempt: None,
            },
        );
        domain.status = Some(DomainStatus {
            conditions: vec![create_condition(
                "VerifiedDNSZone",
                if zone_verified { "True" } else { "False" },
                if zone_verified { "DNSZoneVerified" } else { "DNSZoneNotFound" },
                "",
                None,
            )],
            ..Default::default()
        });
        domain
    }

    fn zone(name: &str, domain_name: &str) -> DNSZone {
        DNSZone::new(
            name,
            DNSZoneSpec {
                domain_name: domain_name.to_string(),
                dns_zone_class_name: None,
            },
        )
    }

    #[test]
    fn test_possible_zone_names() {
        assert_eq!(
            possible_zone_names("v1.api.example.com"),
            vec!["api.example.com".to_string(), "example.com".to_string()]
        );
        assert_eq!(possible_zone_names("www.example.com"), vec!["example.com".to_string()]);
        assert_eq!(possible_zone_names("example.com"), vec!["example.com".to_string()]);
        assert_eq!(possible_zone_names("Example.COM."), vec!["example.com".to_string()]);
        assert!(possible_zone_names("localhost").is_empty());
        assert!(possible_zone_names("").is_empty());
        assert!(possible_zone_names("bad..example.com").is_empty());
    }

    #[test]
    fn test_most_specific_zone_wins() {
        let domains = vec![
            domain("example", "example.com", true),
            domain("api", "api.example.com", true),
        ];
        let zones = vec![zone("example-com", "example.com"), zone("api-example-com", "api.example.com")];

        let resolution = resolve_zone("v1.api.example.com", &domains, &zones);

        assert_eq!(
            resolution,
            ZoneResolution::Resolved(ResolvedZone {
                zone_ref: "api-example-com".to_string(),
                zone_domain: "api.example.com".to_string(),
                domain_ref: "api".to_string(),
                hostname_is_apex: false,
            })
        );
    }

    #[test]
    fn test_falls_back_to_parent_zone_when_child_unverified() {
        let domains = vec![
            domain("example", "example.com", true),
            domain("api", "api.example.com", false),
        ];
        let zones = vec![zone("example-com", "example.com")];

        match resolve_zone("v1.api.example.com", &domains, &zones) {
            ZoneResolution::Resolved(zone) => assert_eq!(zone.zone_domain, "example.com"),
            other => panic!("expected resolved zone, got {other:?}"),
        }
    }

    #[test]
    fn test_apex_hostname() {
        let domains = vec![domain("example", "example.com", true)];
        let zones = vec![zone("example-com", "example.com")];

        match resolve_zone("example.com", &domains, &zones) {
            ZoneResolution::Resolved(zone) => assert!(zone.hostname_is_apex),
            other => panic!("expected resolved zone, got {other:?}"),
        }
    }

    #[test]
    fn test_unverified_domain() {
        let domains = vec![domain("example", "example.com", false)];
        let zones = vec![zone("example-com", "example.com")];

        assert_eq!(
            resolve_zone("www.example.com", &domains, &zones),
            ZoneResolution::DomainNotVerified {
                domain_name: "example.com".to_string()
            }
        );
    }

    #[test]
    fn test_verified_domain_without_zone_is_not_verified() {
        let domains = vec![domain("example", "example.com", true)];

        assert!(matches!(
            resolve_zone("www.example.com", &domains, &[]),
            ZoneResolution::DomainNotVerified { .. }
        ));
    }

    #[test]
    fn test_no_domain_is_not_applicable() {
        let zones = vec![zone("example-com", "example.com")];

        assert_eq!(
            resolve_zone("www.example.org", &[], &zones),
            ZoneResolution::NotApplicable
        );
        assert_eq!(resolve_zone("localhost", &[], &zones), ZoneResolution::NotApplicable);
    }

    #[test]
    fn test_duplicate_domains_resolved_by_name() {
        let domains = vec![
            domain("zz-example", "example.com", true),
            domain("aa-example", "example.com", true),
        ];
        let zones = vec![zone("example-com", "example.com")];

        match resolve_zone("www.example.com", &domains, &zones) {
            ZoneResolution::Resolved(zone) => assert_eq!(zone.domain_ref, "aa-example"),
            other => panic!("expected resolved zone, got {other:?}"),
        }
    }
}
