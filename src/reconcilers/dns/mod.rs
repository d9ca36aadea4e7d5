// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS record lifecycle for gateway hostnames.
//!
//! - [`zones`] - Finds the most specific verified zone for a hostname
//! - [`records`] - Writes, conflict-checks and garbage collects `DNSRecordSet`
//!   objects and aggregates the `DNSRecordsProgrammed` condition

pub mod records;
pub mod zones;

use crate::constants::DNS_RECORD_NAME_HASH_LEN;
use sha2::{Digest, Sha256};

/// First hex characters of the SHA-256 of a normalized hostname.
///
/// Hostnames are compared case-insensitively and without a trailing dot, so
/// `App.Example.com.` and `app.example.com` hash the same.
#[must_use]
pub fn hostname_hash(hostname: &str) -> String {
    let normalized = hostname.trim_end_matches('.').to_ascii_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    let mut hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex.truncate(DNS_RECORD_NAME_HASH_LEN);
    hex
}

/// Deterministic `DNSRecordSet` name for a gateway hostname.
#[must_use]
pub fn dns_record_set_name(gateway_name: &str, hostname: &str) -> String {
    format!("{gateway_name}-{}", hostname_hash(hostname))
}

/// Absolute (trailing-dot) form of a DNS name.
#[must_use]
pub fn absolute_name(name: &str) -> String {
    format!("{}.", name.trim_end_matches('.').to_ascii_lowercase())
}
