// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS operator (`dns.networking.miloapis.com/v1alpha1`) types.
//!
//! The operator reads [`DNSZone`] objects to find where a hostname can be
//! published and writes [`DNSRecordSet`] objects (CNAME or ALIAS) pointing
//! gateway hostnames at the gateway's canonical address.

use crate::crd::Condition;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// `DNSZone` spec.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "dns.networking.miloapis.com",
    version = "v1alpha1",
    kind = "DNSZone",
    namespaced,
    status = "DNSZoneStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct DNSZoneSpec {
    /// Zone apex, e.g. `example.com`
    pub domain_name: String,

    /// Zone class selecting the DNS provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_zone_class_name: Option<String>,
}

/// `DNSZone` status.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DNSZoneStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,
}

/// `DNSRecordSet` spec.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "dns.networking.miloapis.com",
    version = "v1alpha1",
    kind = "DNSRecordSet",
    namespaced,
    status = "DNSRecordSetStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct DNSRecordSetSpec {
    /// Zone the records are published in
    pub dns_zone_ref: ZoneReference,

    /// `CNAME` or `ALIAS`
    pub record_type: String,

    /// Records of `record_type`
    #[serde(default)]
    pub records: Vec<RecordEntry>,
}

/// Reference to a `DNSZone` in the same namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneReference {
    pub name: String,
}

/// One record of a record set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEntry {
    /// Absolute owner name (trailing dot)
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cname: Option<TargetContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<TargetContent>,
}

/// Target of a CNAME or ALIAS record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetContent {
    /// Absolute target name (trailing dot)
    pub content: String,
}

/// `DNSRecordSet` status.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DNSRecordSetStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
