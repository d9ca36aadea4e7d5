// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Standard Kubernetes status condition types and reasons for operator resources.
//!
//! This module defines constants for condition types and reasons following Kubernetes
//! and Gateway API conventions. Reasons are programmatic identifiers in CamelCase that
//! explain why a condition has a particular status. Downstream tooling matches these
//! strings exactly, so they must never change once released.
//!
//! # Condition Types per Resource
//!
//! - **`HTTPProxy`** → `Accepted`, `Programmed`, `HostnamesVerified`, `DNSRecordsProgrammed`
//! - **`Gateway`** → `DNSRecordsProgrammed` (the gateway implementation owns the rest)
//! - **`Domain`** → `Verified`, `VerifiedDNS`, `VerifiedHTTP`, `VerifiedDNSZone`,
//!   `RegistrationRefreshed`
//! - **`Connector`** → `Accepted`, `Ready`
//! - **`TrafficProtectionPolicy`** ancestors → `Accepted`
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   conditions:
//!     - type: Accepted
//!       status: "True"
//!       reason: Accepted
//!       message: "The HTTPProxy has been scheduled"
//!     - type: Programmed
//!       status: "False"
//!       reason: Conflict
//!       message: "Gateway default/web is owned by HTTPProxy default/other"
//!     - type: DNSRecordsProgrammed
//!       status: "False"
//!       reason: PartialFailure
//!       message: "1 of 2 hostnames programmed"
//! ```

// ============================================================================
// Condition Types
// ============================================================================

/// Resource spec is valid and dependents were accepted.
pub const CONDITION_TYPE_ACCEPTED: &str = "Accepted";

/// Dependents are live and the data plane reports them programmed.
pub const CONDITION_TYPE_PROGRAMMED: &str = "Programmed";

/// Resource is ready for use (connectors).
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Every custom hostname on the resource has been verified.
pub const CONDITION_TYPE_HOSTNAMES_VERIFIED: &str = "HostnamesVerified";

/// Aggregate DNS record state for the resource's hostnames.
pub const CONDITION_TYPE_DNS_RECORDS_PROGRAMMED: &str = "DNSRecordsProgrammed";

/// Domain ownership was verified by any method.
pub const CONDITION_TYPE_VERIFIED: &str = "Verified";

/// Domain ownership verification via DNS TXT record.
pub const CONDITION_TYPE_VERIFIED_DNS: &str = "VerifiedDNS";

/// Domain ownership verification via HTTP token.
pub const CONDITION_TYPE_VERIFIED_HTTP: &str = "VerifiedHTTP";

/// Domain is verified and a DNS zone for it exists.
pub const CONDITION_TYPE_VERIFIED_DNS_ZONE: &str = "VerifiedDNSZone";

/// Registration data was refreshed from the registry.
pub const CONDITION_TYPE_REGISTRATION_REFRESHED: &str = "RegistrationRefreshed";

// ============================================================================
// Condition Status Values
// ============================================================================

/// Condition status `True`
pub const STATUS_TRUE: &str = "True";

/// Condition status `False`
pub const STATUS_FALSE: &str = "False";

// ============================================================================
// Common Reasons
// ============================================================================

/// Resource was accepted.
pub const REASON_ACCEPTED: &str = "Accepted";

/// Dependents are programmed.
pub const REASON_PROGRAMMED: &str = "Programmed";

/// Work is in progress; the condition will be re-evaluated.
pub const REASON_PENDING: &str = "Pending";

/// A dependent object is owned by another controller.
///
/// **Usage:**
/// - `Programmed=False` on an `HTTPProxy` whose Gateway/HTTPRoute is owned elsewhere
/// - per-hostname DNS state when a foreign `DNSRecordSet` claims the hostname
pub const REASON_CONFLICT: &str = "Conflict";

/// Resource spec failed validation; the user must edit it.
pub const REASON_INVALID: &str = "Invalid";

/// Resource is ready.
pub const REASON_READY: &str = "Ready";

// ============================================================================
// HTTPProxy Reasons
// ============================================================================

/// All custom hostnames are verified.
pub const REASON_HOSTNAMES_VERIFIED: &str = "HostnamesVerified";

/// At least one custom hostname is not verified yet.
pub const REASON_UNVERIFIED_HOSTNAMES_PRESENT: &str = "UnverifiedHostnamesPresent";

// ============================================================================
// Gateway Listener Reasons
// ============================================================================

/// A listener hostname is not covered by a verified `Domain`.
pub const REASON_UNVERIFIED_HOSTNAME: &str = "UnverifiedHostname";

// ============================================================================
// DNS Record Reasons
// ============================================================================

/// Hostname has no resolvable zone, or no verified `Domain`+`DNSZone` pair covers it.
pub const REASON_NOT_APPLICABLE: &str = "NotApplicable";

/// A `Domain` covers the hostname but its `VerifiedDNSZone` condition is not `True`.
pub const REASON_DOMAIN_NOT_VERIFIED: &str = "DomainNotVerified";

/// The hostname's record was created.
pub const REASON_RECORD_CREATED: &str = "RecordCreated";

/// The hostname's record was updated (or was already up to date).
pub const REASON_RECORD_UPDATED: &str = "RecordUpdated";

/// Writing the hostname's record failed.
pub const REASON_RECORD_FAILED: &str = "RecordFailed";

/// Every applicable hostname has a programmed record.
pub const REASON_ALL_CREATED: &str = "AllCreated";

/// Some applicable hostnames have no programmed record.
pub const REASON_PARTIAL_FAILURE: &str = "PartialFailure";

// ============================================================================
// Connector Reasons
// ============================================================================

/// The referenced `ConnectorClass` does not exist.
pub const REASON_CONNECTOR_CLASS_NOT_FOUND: &str = "ConnectorClassNotFound";

/// The connector lease was not renewed within its duration.
pub const REASON_LEASE_EXPIRED: &str = "LeaseExpired";

// ============================================================================
// Policy Attachment Reasons
// ============================================================================

/// Another policy already attached to this target.
pub const REASON_CONFLICTED: &str = "Conflicted";

/// The target (or its section) does not exist.
pub const REASON_TARGET_NOT_FOUND: &str = "TargetNotFound";

// ============================================================================
// Domain Reasons
// ============================================================================

/// Domain ownership verified.
pub const REASON_VERIFIED: &str = "Verified";

/// Verification is scheduled and has not succeeded yet.
pub const REASON_PENDING_VERIFICATION: &str = "PendingVerification";

/// The TXT record (or HTTP token) was not found; retried on schedule.
pub const REASON_VERIFICATION_RECORD_NOT_FOUND: &str = "VerificationRecordNotFound";

/// The verification check failed for a non-DNS reason.
pub const REASON_VERIFICATION_INTERNAL_ERROR: &str = "VerificationInternalError";

/// The domain is verified and a `DNSZone` for it exists.
pub const REASON_DNS_ZONE_VERIFIED: &str = "DNSZoneVerified";

/// The domain is verified but no `DNSZone` for it exists.
pub const REASON_DNS_ZONE_NOT_FOUND: &str = "DNSZoneNotFound";

/// Registration data refreshed.
pub const REASON_REGISTRATION_REFRESHED: &str = "RegistrationRefreshed";

/// The registry rate-limited the lookup.
pub const REASON_RATE_LIMITED: &str = "RateLimited";

/// The registry has no record of the domain.
pub const REASON_REGISTRATION_NOT_FOUND: &str = "RegistrationNotFound";

/// The registry lookup timed out.
pub const REASON_REGISTRY_TIMEOUT: &str = "RegistryTimeout";

/// The registry lookup failed.
pub const REASON_REGISTRY_LOOKUP_FAILED: &str = "RegistryLookupFailed";
