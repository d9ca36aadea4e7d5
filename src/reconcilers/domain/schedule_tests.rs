// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `schedule.rs`

#[cfg(test)]
mod tests {
    use crate::config::DomainVerificationConfig;
    use crate::crd::{DomainSpec, Registration};
    use crate::reconcilers::domain::schedule::*;
    use crate::testing::test_now;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn spec(desired: Option<&str>) -> DomainSpec {
        DomainSpec {
            domain_name: "example.com".to_string(),
            desired_registration_refresh_attempt: desired.map(ToString::to_string),
        }
    }

    fn registration(last: &str, next: &str) -> Registration {
        Registration {
            last_refresh_attempt: Some(last.to_string()),
            next_refresh_attempt: Some(next.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_rate_limit_retry_after_is_verbatim() {
        let base = Duration::from_secs(300);
        assert_eq!(rate_limit_backoff(Some(Duration::from_secs(7)), base), Duration::from_secs(7));
        assert!(rate_limit_backoff(None, base) >= base * 2);
    }

    #[test]
    fn test_verification_delay_walks_intervals_and_repeats_last() {
        let config = DomainVerificationConfig {
            retry_intervals: vec![Duration::from_secs(5), Duration::from_secs(60)],
            jitter_percent: 0,
            ..Default::default()
        };

        assert_eq!(verification_retry_delay(0, &config), Duration::from_secs(5));
        assert_eq!(verification_retry_delay(1, &config), Duration::from_secs(60));
        assert_eq!(verification_retry_delay(9, &config), Duration::from_secs(60));
    }

    #[test]
    fn test_verification_jitter_stays_in_window() {
        let config = DomainVerificationConfig {
            retry_intervals: vec![Duration::from_secs(100)],
            jitter_percent: 10,
            ..Default::default()
        };

        let delay = verification_retry_delay(0, &config);

        assert!(delay >= Duration::from_secs(100));
        assert!(delay <= Duration::from_secs(110));
    }

    #[test]
    fn test_verification_due_when_unset_or_past() {
        let now = test_now();
        assert_eq!(verification_due(None, now), Due::Now { expedited: false });
        assert_eq!(
            verification_due(Some("2025-06-01T11:00:00Z"), now),
            Due::Now { expedited: false }
        );
        assert!(matches!(
            verification_due(Some("2025-06-01T13:00:00Z"), now),
            Due::At(_)
        ));
    }

    #[test]
    fn test_expedite_is_one_shot() {
        let now = test_now();
        let desired = spec(Some("2025-06-01T11:30:00Z"));

        // Last attempt predates the request: refresh now.
        let stale = registration("2025-06-01T10:00:00Z", "2025-06-02T10:00:00Z");
        assert_eq!(registration_due(&desired, Some(&stale), now), Due::Now { expedited: true });

        // Already refreshed after the request: back to the normal cadence.
        let fresh = registration("2025-06-01T11:45:00Z", "2025-06-02T11:45:00Z");
        assert!(matches!(registration_due(&desired, Some(&fresh), now), Due::At(_)));
    }

    #[test]
    fn test_future_expedite_is_ignored() {
        let now = test_now();
        let desired = spec(Some("2025-06-01T13:00:00Z"));
        let stale = registration("2025-06-01T10:00:00Z", "2025-06-02T10:00:00Z");

        assert!(matches!(registration_due(&desired, Some(&stale), now), Due::At(_)));
    }

    #[test]
    fn test_registration_due_without_history() {
        assert_eq!(
            registration_due(&spec(None), None, test_now()),
            Due::Now { expedited: false }
        );
    }

    #[test]
    fn test_after_adds_delay() {
        let now = test_now();
        assert_eq!(after(now, Duration::from_secs(7)), now + ChronoDuration::seconds(7));
    }
}
