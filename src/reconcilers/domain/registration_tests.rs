// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `registration.rs`

#[cfg(test)]
mod tests {
    use crate::config::DomainRegistrationConfig;
    use crate::crd::Registration;
    use crate::errors::RegistryError;
    use crate::reconcilers::domain::registration::*;
    use crate::registry::{DomainLookup, RegistrationData};
    use crate::testing::{test_now, FakeRegistry};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::time::Duration;

    fn config() -> DomainRegistrationConfig {
        DomainRegistrationConfig {
            refresh_interval: Duration::from_secs(3600),
            jitter_percent: 0,
            rate_limit_backoff: Duration::from_secs(60),
            ..Default::default()
        }
    }

    fn lookup() -> DomainLookup {
        DomainLookup {
            registration: RegistrationData {
                domain: "example.com".to_string(),
                registrar: Some("Example Registrar".to_string()),
                created_at: Some(Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap()),
                expires_at: None,
                nameservers: vec!["ns1.example.net".to_string()],
            },
            nameservers: vec!["ns1.sub.example.com".to_string()],
            source: "rdap".to_string(),
        }
    }

    #[tokio::test]
    async fn test_successful_refresh_stamps_registration() {
        let registry = FakeRegistry::new(Ok(lookup()));
        let now = test_now();

        let outcome =
            refresh_registration(&registry, "example.com", None, now, &config(), Some(1)).await;

        assert_eq!(registry.calls(), 1);
        assert_eq!(outcome.condition.status, "True");
        assert_eq!(outcome.condition.reason, "RegistrationRefreshed");
        assert_eq!(outcome.apex, Some(true));
        assert_eq!(outcome.nameservers, Some(vec!["ns1.sub.example.com".to_string()]));
        assert_eq!(outcome.registration.registrar.as_deref(), Some("Example Registrar"));
        assert_eq!(outcome.registration.created_at.as_deref(), Some("2001-01-01T00:00:00Z"));
        assert_eq!(outcome.registration.source.as_deref(), Some("rdap"));
        assert_eq!(outcome.registration.last_refresh_attempt.as_deref(), Some("2025-06-01T12:00:00Z"));
        assert_eq!(outcome.next_attempt, now + ChronoDuration::hours(1));
    }

    #[test]
    fn test_rate_limit_honours_retry_after() {
        let now = test_now();
        let outcome = fold_lookup(
            Err(RegistryError::RateLimited {
                provider: "rdap".to_string(),
                retry_after: Some(Duration::from_secs(7)),
            }),
            "example.com",
            None,
            now,
            &config(),
            None,
        );

        assert_eq!(outcome.condition.reason, "RateLimited");
        assert!(outcome.next_attempt >= now + ChronoDuration::seconds(7));
        assert!(outcome.next_attempt <= now + ChronoDuration::seconds(8));
    }

    #[test]
    fn test_rate_limit_without_retry_after_doubles_base() {
        let now = test_now();
        let outcome = fold_lookup(
            Err(RegistryError::RateLimited {
                provider: "rdap".to_string(),
                retry_after: None,
            }),
            "example.com",
            None,
            now,
            &config(),
            None,
        );

        assert!(outcome.next_attempt >= now + ChronoDuration::seconds(120));
    }

    #[test]
    fn test_failure_keeps_previous_data() {
        let previous = Registration {
            registrar: Some("Old".to_string()),
            ..Default::default()
        };
        let outcome = fold_lookup(
            Err(RegistryError::Timeout {
                name: "example.com".to_string(),
                timeout: Duration::from_secs(30),
            }),
            "example.com",
            Some(&previous),
            test_now(),
            &config(),
            None,
        );

        assert_eq!(outcome.condition.reason, "RegistryTimeout");
        assert_eq!(outcome.registration.registrar.as_deref(), Some("Old"));
        assert!(outcome.apex.is_none());
        assert!(outcome.nameservers.is_none());
    }

    #[test]
    fn test_subdomain_is_not_apex() {
        let outcome = fold_lookup(Ok(lookup()), "app.example.com", None, test_now(), &config(), None);

        assert_eq!(outcome.apex, Some(false));
    }


    #[tokio::test]
    async fn test_refresh_counts_lookup_outcome() {
        let counter = crate::metrics::REGISTRY_LOOKUPS_TOTAL.with_label_values(&["timeout"]);
        let before = counter.get();
        let registry = FakeRegistry::new(Err(RegistryError::Timeout {
            name: "example.com".to_string(),
            timeout: Duration::from_secs(10),
        }));

        let outcome = refresh_registration(&registry, "example.com", None, test_now(), &config(), None).await;

        assert_eq!(outcome.condition.reason, "RegistryTimeout");
        assert!(counter.get() >= before + 1.0);
    }

    #[test]
    fn test_lookup_outcome_labels() {
        assert_eq!(lookup_outcome(&Ok(lookup())), "success");
        assert_eq!(
            lookup_outcome(&Err(RegistryError::NotFound {
                name: "example.com".to_string()
            })),
            "not_found"
        );
        assert_eq!(
            lookup_outcome(&Err(RegistryError::RateLimited {
                provider: "rdap".to_string(),
                retry_after: None,
            })),
            "rate_limited"
        );
    }
}
