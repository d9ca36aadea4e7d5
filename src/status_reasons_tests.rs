// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `status_reasons.rs`

#[cfg(test)]
mod tests {
    use crate::status_reasons::*;

    #[test]
    fn test_user_facing_reasons_are_stable() {
        assert_eq!(REASON_PENDING, "Pending");
        assert_eq!(REASON_CONNECTOR_CLASS_NOT_FOUND, "ConnectorClassNotFound");
        assert_eq!(REASON_CONFLICT, "Conflict");
        assert_eq!(REASON_NOT_APPLICABLE, "NotApplicable");
        assert_eq!(REASON_DOMAIN_NOT_VERIFIED, "DomainNotVerified");
        assert_eq!(REASON_RECORD_CREATED, "RecordCreated");
        assert_eq!(REASON_RECORD_UPDATED, "RecordUpdated");
        assert_eq!(REASON_ALL_CREATED, "AllCreated");
        assert_eq!(REASON_PARTIAL_FAILURE, "PartialFailure");
        assert_eq!(REASON_CONFLICTED, "Conflicted");
        assert_eq!(REASON_TARGET_NOT_FOUND, "TargetNotFound");
        assert_eq!(REASON_UNVERIFIED_HOSTNAMES_PRESENT, "UnverifiedHostnamesPresent");
    }

    #[test]
    fn test_condition_types_are_stable() {
        assert_eq!(CONDITION_TYPE_ACCEPTED, "Accepted");
        assert_eq!(CONDITION_TYPE_PROGRAMMED, "Programmed");
        assert_eq!(CONDITION_TYPE_READY, "Ready");
        assert_eq!(CONDITION_TYPE_HOSTNAMES_VERIFIED, "HostnamesVerified");
        assert_eq!(CONDITION_TYPE_DNS_RECORDS_PROGRAMMED, "DNSRecordsProgrammed");
        assert_eq!(CONDITION_TYPE_VERIFIED_DNS_ZONE, "VerifiedDNSZone");
    }

    #[test]
    fn test_reasons_are_camel_case() {
        let reasons = [
            REASON_ACCEPTED,
            REASON_PROGRAMMED,
            REASON_PENDING,
            REASON_CONFLICT,
            REASON_INVALID,
            REASON_HOSTNAMES_VERIFIED,
            REASON_UNVERIFIED_HOSTNAME,
            REASON_RECORD_FAILED,
            REASON_LEASE_EXPIRED,
            REASON_PENDING_VERIFICATION,
            REASON_VERIFICATION_RECORD_NOT_FOUND,
            REASON_VERIFICATION_INTERNAL_ERROR,
            REASON_RATE_LIMITED,
        ];

        for reason in reasons {
            assert!(
                reason.chars().next().is_some_and(|c| c.is_ascii_uppercase()),
                "{reason} must start with an uppercase letter"
            );
            assert!(
                reason.chars().all(|c| c.is_ascii_alphanumeric()),
                "{reason} must be alphanumeric"
            );
        }
    }
}
