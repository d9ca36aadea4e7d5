// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed error types for the network services operator.
//!
//! This module provides specialized error types for:
//! - Ownership conflicts on dependent objects (`CreateOrUpdate`)
//! - Backend endpoint URL validation in the `HTTPProxy` desired-state builder
//! - Registry (RDAP/WHOIS) lookups, including rate limiting and timeouts
//! - Domain ownership verification lookups
//! - Policy patch compilation
//!
//! Reconcilers use `anyhow::Result` at their boundary; these typed errors are
//! recovered with `downcast_ref` where a caller must map them to a status reason
//! rather than a hard failure.

use std::time::Duration;
use thiserror::Error;

/// A dependent object exists but is controlled by a different owner.
///
/// Returned by `CreateOrUpdate` mutators. Callers surface it as a `Conflict`
/// status reason; it never fails the reconcile.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OwnershipError {
    /// The live object has a controller owner reference naming another object
    #[error("{kind} {namespace}/{name} is owned by {owner_kind} {owner_name}")]
    Conflict {
        /// Kind of the dependent object
        kind: String,
        /// Namespace of the dependent object
        namespace: String,
        /// Name of the dependent object
        name: String,
        /// Kind of the controller owner found on the object
        owner_kind: String,
        /// Name of the controller owner found on the object
        owner_name: String,
    },
}

/// Errors raised while parsing an `HTTPProxy` backend endpoint.
///
/// These are permanent spec errors: the user must edit the `HTTPProxy`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// The endpoint is not a valid absolute URL
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidUrl {
        /// The endpoint as written on the HTTPProxy
        endpoint: String,
        /// Parser failure description
        reason: String,
    },

    /// The endpoint scheme is neither `http` nor `https`
    #[error("unsupported scheme '{scheme}' in endpoint '{endpoint}', expected http or https")]
    UnsupportedScheme {
        /// The endpoint as written on the HTTPProxy
        endpoint: String,
        /// The scheme that was found
        scheme: String,
    },

    /// The endpoint has no host component
    #[error("endpoint '{endpoint}' has no host")]
    MissingHost {
        /// The endpoint as written on the HTTPProxy
        endpoint: String,
    },

    /// An `https` endpoint addresses a bare IP but no `tls.hostname` was given
    #[error("HTTPS endpoint with IP address requires tls.hostname: {endpoint}")]
    HttpsIpRequiresTlsHostname {
        /// The endpoint as written on the HTTPProxy
        endpoint: String,
    },

    /// The endpoint carries a path, query or fragment
    #[error("endpoint '{endpoint}' must not contain a path, query or fragment")]
    UnexpectedPath {
        /// The endpoint as written on the HTTPProxy
        endpoint: String,
    },

    /// A rule combines connector backends with direct backends
    #[error("rule {rule} mixes connector and direct backends")]
    MixedConnectorBackends {
        /// Index of the rule in the `HTTPProxy` spec
        rule: usize,
    },
}

/// Errors returned by a `RegistryClient`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry asked us to slow down
    #[error("registry {provider} rate limited the lookup{}", retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited {
        /// Registry provider that rate limited us (e.g. `rdap`)
        provider: String,
        /// Explicit `Retry-After` duration, if the registry sent one
        retry_after: Option<Duration>,
    },

    /// The registry has no record of the queried name
    #[error("registry has no record of '{name}'")]
    NotFound {
        /// The queried name
        name: String,
    },

    /// The lookup did not finish within its deadline
    #[error("registry lookup for '{name}' timed out after {}s", timeout.as_secs())]
    Timeout {
        /// The queried name
        name: String,
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// Any other lookup failure (transport, malformed response, HTTP error)
    #[error("registry lookup for '{name}' failed: {reason}")]
    Lookup {
        /// The queried name
        name: String,
        /// Failure description
        reason: String,
    },
}

/// Errors returned by domain ownership verification primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// The TXT record or HTTP token does not exist (yet)
    #[error("verification record '{name}' not found")]
    RecordNotFound {
        /// Record name or URL that was checked
        name: String,
    },

    /// Temporary failure (DNS timeout, SERVFAIL, connection reset)
    #[error("transient failure checking '{name}': {reason}")]
    Transient {
        /// Record name or URL that was checked
        name: String,
        /// Failure description
        reason: String,
    },

    /// Any non-DNS failure
    #[error("internal error checking '{name}': {reason}")]
    Internal {
        /// Record name or URL that was checked
        name: String,
        /// Failure description
        reason: String,
    },
}

/// Errors raised while compiling policy attachments into Envoy patches.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// A patch value could not be serialized
    #[error("failed to build patch for {target}: {source}")]
    PatchSerialization {
        /// Target the patch was being built for
        target: String,
        /// Serialization failure
        #[source]
        source: serde_json::Error,
    },

    /// A rule exclusion id range is not `<from>-<to>` with `from <= to`
    #[error("invalid rule id range '{range}': expected '<from>-<to>'")]
    InvalidIdRange {
        /// Range as written in the policy
        range: String,
    },
}

/// Returns `true` when the Kubernetes API answered 404.
#[must_use]
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Returns `true` when the Kubernetes API answered 409 (resourceVersion conflict
/// or already-exists).
#[must_use]
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// Returns `true` when any error in the chain is a Kubernetes 409.
#[must_use]
pub fn chain_is_conflict(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<kube::Error>().is_some_and(is_conflict))
}

/// Returns the ownership conflict in the error chain, if any.
#[must_use]
pub fn ownership_conflict(err: &anyhow::Error) -> Option<&OwnershipError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<OwnershipError>())
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
