// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `status.rs`

#[cfg(test)]
mod tests {
    use crate::crd::Condition;
    use crate::reconcilers::status::*;
    use crate::testing::test_now;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::time::Duration;

    fn condition(status: &str, reason: &str, message: &str, generation: i64) -> Condition {
        Condition {
            r#type: "Programmed".to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation: Some(generation),
            last_transition_time: Some(format!("2025-01-0{generation}T00:00:00Z")),
        }
    }

    #[test]
    fn test_create_condition_sets_all_fields() {
        let c = create_condition("Ready", "True", "Ready", "ok", Some(4));

        assert_eq!(c.r#type, "Ready");
        assert_eq!(c.status, "True");
        assert_eq!(c.reason, "Ready");
        assert_eq!(c.message, "ok");
        assert_eq!(c.observed_generation, Some(4));
        assert!(c.last_transition_time.is_none());
    }

    #[test]
    fn test_set_condition_appends_new_type() {
        let mut conditions = Vec::new();
        assert!(set_condition(
            &mut conditions,
            create_condition("Programmed", "True", "Programmed", "ok", Some(1)),
            test_now()
        ));
        assert_eq!(conditions.len(), 1);
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2025-06-01T12:00:00Z")
        );
    }

    #[test]
    fn test_set_condition_identical_is_noop() {
        let mut conditions = vec![condition("True", "Programmed", "ok", 1)];
        let mut same = condition("True", "Programmed", "ok", 1);
        same.last_transition_time = Some("2030-01-01T00:00:00Z".to_string());

        assert!(!set_condition(&mut conditions, same, test_now()));
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2025-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_set_condition_keeps_transition_time_when_status_unchanged() {
        let mut conditions = vec![condition("False", "Pending", "waiting", 1)];

        assert!(set_condition(
            &mut conditions,
            condition("False", "Conflict", "owned elsewhere", 2),
            test_now()
        ));
        assert_eq!(conditions[0].reason, "Conflict");
        assert_eq!(conditions[0].observed_generation, Some(2));
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2025-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_set_condition_moves_transition_time_on_flip() {
        let mut conditions = vec![condition("False", "Pending", "waiting", 1)];

        assert!(set_condition(
            &mut conditions,
            condition("True", "Programmed", "ok", 2),
            test_now()
        ));
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2025-06-01T12:00:00Z")
        );
    }

    #[test]
    fn test_remove_condition() {
        let mut conditions = vec![condition("True", "Programmed", "ok", 1)];

        assert!(remove_condition(&mut conditions, "Programmed"));
        assert!(conditions.is_empty());
        assert!(!remove_condition(&mut conditions, "Programmed"));
    }

    #[test]
    fn test_is_condition_true() {
        let mut accepted = condition("False", "Pending", "waiting", 2);
        accepted.r#type = "Accepted".to_string();
        let conditions = vec![condition("True", "Programmed", "ok", 2), accepted];

        assert!(is_condition_true(&conditions, "Programmed"));
        assert!(!is_condition_true(&conditions, "Accepted"));
        assert!(!is_condition_true(&conditions, "Ready"));
    }

    #[test]
    fn test_requeue_until_floors_past_and_near_times() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        assert_eq!(requeue_until(now, now), Duration::from_secs(1));
        assert_eq!(
            requeue_until(now - ChronoDuration::hours(1), now),
            Duration::from_secs(1)
        );
        assert_eq!(
            requeue_until(now + ChronoDuration::milliseconds(300), now),
            Duration::from_secs(1)
        );
        assert_eq!(
            requeue_until(now + ChronoDuration::seconds(90), now),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp(Some("2025-06-01T12:00:00Z")).is_some());
        assert!(parse_timestamp(Some("yesterday")).is_none());
        assert!(parse_timestamp(None).is_none());
    }
}
