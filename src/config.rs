// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Operator configuration.
//!
//! The operator reads one YAML document (path given by `--config`). Every field
//! has a default, so an empty file or no file at all yields a working
//! configuration.
//!
//! # Example
//!
//! ```yaml
//! gateway:
//!   gatewayClassName: envoy-gateway
//!   targetDomain: edge.example.net
//!   httpsBackendPort: 8443
//! dns:
//!   managedBy: network-services-operator
//! domainVerification:
//!   retryIntervals: ["5s", "30s", "5m"]
//! domainRegistration:
//!   refreshInterval: 24h
//!   rateLimitBackoff: 5m
//! ```
//!
//! Durations are written as `<number><unit>` segments (`500ms`, `30s`, `5m`,
//! `1h`, `2d`, or combinations such as `1h30m`).

use crate::constants::{
    DEFAULT_CONNECTOR_LEASE_DURATION_SECS, DEFAULT_DNS_MANAGED_BY, DEFAULT_DNS_RECORD_TTL_SECS,
    DEFAULT_HTTPS_BACKEND_PORT, DEFAULT_HTTP_TOKEN_PATH, DEFAULT_JITTER_PERCENT,
    DEFAULT_RATE_LIMIT_BACKOFF_SECS, DEFAULT_RDAP_BASE_URL, DEFAULT_REGISTRATION_REFRESH_SECS,
    DEFAULT_REGISTRY_TIMEOUT_SECS, DEFAULT_TXT_RECORD_PREFIX, DEFAULT_VERIFICATION_TIMEOUT_SECS,
    METRICS_SERVER_BIND_ADDRESS, METRICS_SERVER_PORT,
};
use anyhow::{bail, Context as _, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Top-level operator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    /// Settings for Gateways derived from `HTTPProxy` resources
    pub gateway: GatewayConfig,

    /// Settings for `DNSRecordSet` objects
    pub dns: DnsConfig,

    /// Domain ownership verification settings
    pub domain_verification: DomainVerificationConfig,

    /// Domain registration refresh settings
    pub domain_registration: DomainRegistrationConfig,

    /// Connector lease settings
    pub connector: ConnectorConfig,

    /// Where downstream objects (`EnvoyPatchPolicy`) are written
    pub downstream: DownstreamConfig,

    /// Kube contexts of the upstream clusters to reconcile. Empty means the
    /// in-cluster (or default kubeconfig) client only.
    pub clusters: Vec<String>,

    /// Metrics server settings
    pub metrics: MetricsConfig,
}

/// Settings for Gateways derived from `HTTPProxy` resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    /// `GatewayClass` every derived Gateway uses
    pub gateway_class_name: String,

    /// Domain under which every Gateway gets its canonical hostname
    /// (`<gateway-uid>.<targetDomain>`)
    pub target_domain: String,

    /// Annotations copied onto every derived Gateway (e.g. a cert-manager issuer)
    pub annotations: BTreeMap<String, String>,

    /// TLS settings of the `default-https` listener
    pub default_listener_tls: ListenerTlsConfig,

    /// TLS options applied to every HTTPS listener
    pub listener_tls_options: BTreeMap<String, String>,

    /// Upstream port for `https://` backends without an explicit port (443 or 8443)
    pub https_backend_port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_class_name: "envoy-gateway".to_string(),
            target_domain: "edge.firestoned.io".to_string(),
            annotations: BTreeMap::new(),
            default_listener_tls: ListenerTlsConfig::default(),
            listener_tls_options: BTreeMap::new(),
            https_backend_port: DEFAULT_HTTPS_BACKEND_PORT,
        }
    }
}

/// TLS certificate references for a listener.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListenerTlsConfig {
    /// Secret references holding the listener certificate
    pub certificate_refs: Vec<CertificateRefConfig>,
}

/// Reference to a TLS certificate Secret.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRefConfig {
    /// Secret name
    pub name: String,

    /// Secret namespace (defaults to the Gateway namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Settings for `DNSRecordSet` objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DnsConfig {
    /// Value of `app.kubernetes.io/managed-by` on records this operator writes
    pub managed_by: String,

    /// TTL written on every record
    pub record_ttl: i64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            managed_by: DEFAULT_DNS_MANAGED_BY.to_string(),
            record_ttl: DEFAULT_DNS_RECORD_TTL_SECS,
        }
    }
}

/// Domain ownership verification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomainVerificationConfig {
    /// Label prepended to the domain for the TXT challenge
    pub txt_record_prefix: String,

    /// URL path of the HTTP challenge; the domain UID is appended
    pub http_token_path: String,

    /// Delays between verification attempts; the last entry repeats
    #[serde(with = "duration_list")]
    pub retry_intervals: Vec<Duration>,

    /// Jitter added to each delay, as a percentage of the delay
    pub jitter_percent: u8,

    /// Timeout for one TXT lookup or HTTP GET
    #[serde(with = "duration_string")]
    pub lookup_timeout: Duration,
}

impl Default for DomainVerificationConfig {
    fn default() -> Self {
        Self {
            txt_record_prefix: DEFAULT_TXT_RECORD_PREFIX.to_string(),
            http_token_path: DEFAULT_HTTP_TOKEN_PATH.to_string(),
            retry_intervals: vec![
                Duration::from_secs(5),
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(300),
                Duration::from_secs(900),
            ],
            jitter_percent: DEFAULT_JITTER_PERCENT,
            lookup_timeout: Duration::from_secs(DEFAULT_VERIFICATION_TIMEOUT_SECS),
        }
    }
}

/// Domain registration refresh settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomainRegistrationConfig {
    /// Interval between registration refreshes
    #[serde(with = "duration_string")]
    pub refresh_interval: Duration,

    /// Jitter added to the refresh interval, as a percentage
    pub jitter_percent: u8,

    /// Base backoff after a rate-limited lookup without `Retry-After`
    #[serde(with = "duration_string")]
    pub rate_limit_backoff: Duration,

    /// Deadline for one registry lookup
    #[serde(with = "duration_string")]
    pub lookup_timeout: Duration,

    /// Base URL of the RDAP service
    pub rdap_base_url: String,
}

impl Default for DomainRegistrationConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(DEFAULT_REGISTRATION_REFRESH_SECS),
            jitter_percent: DEFAULT_JITTER_PERCENT,
            rate_limit_backoff: Duration::from_secs(DEFAULT_RATE_LIMIT_BACKOFF_SECS),
            lookup_timeout: Duration::from_secs(DEFAULT_REGISTRY_TIMEOUT_SECS),
            rdap_base_url: DEFAULT_RDAP_BASE_URL.to_string(),
        }
    }
}

/// Connector lease settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectorConfig {
    /// Seconds after the last renewal at which a connector is no longer ready
    pub lease_duration_seconds: i32,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            lease_duration_seconds: DEFAULT_CONNECTOR_LEASE_DURATION_SECS,
        }
    }
}

/// Where downstream objects are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DownstreamConfig {
    /// Kube context of the downstream cluster (default: the in-cluster client)
    pub kube_context: Option<String>,

    /// Namespace for downstream objects (default: the upstream object's namespace)
    pub namespace: Option<String>,
}

/// Metrics server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsConfig {
    /// Bind address of the metrics server
    pub bind_address: String,

    /// Port of the metrics server
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            bind_address: METRICS_SERVER_BIND_ADDRESS.to_string(),
            port: METRICS_SERVER_PORT,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from an optional YAML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path of the YAML document, or `None` for defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid YAML for this
    /// schema, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("loading config file {}", path.display()))
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is invalid or fails validation.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = if raw.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.gateway.https_backend_port, 443 | 8443) {
            bail!(
                "gateway.httpsBackendPort must be 443 or 8443, got {}",
                self.gateway.https_backend_port
            );
        }
        if self.gateway.gateway_class_name.is_empty() {
            bail!("gateway.gatewayClassName must not be empty");
        }
        if self.domain_verification.retry_intervals.is_empty() {
            bail!("domainVerification.retryIntervals must contain at least one interval");
        }
        if self.domain_verification.jitter_percent > 100
            || self.domain_registration.jitter_percent > 100
        {
            bail!("jitterPercent must be between 0 and 100");
        }
        if self.connector.lease_duration_seconds <= 0 {
            bail!("connector.leaseDurationSeconds must be positive");
        }
        if self.dns.managed_by.is_empty() {
            bail!("dns.managedBy must not be empty");
        }
        Ok(())
    }
}

/// Parse a duration string such as `30s`, `5m`, `1h30m` or `500ms`.
///
/// # Errors
///
/// Returns an error for empty input, unknown units or numbers without a unit.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input.is_empty() {
        bail!("empty duration");
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        if digits == 0 {
            bail!("invalid duration '{input}': expected a number");
        }
        let value: u64 = rest[..digits]
            .parse()
            .with_context(|| format!("invalid duration '{input}'"))?;
        rest = &rest[digits..];

        let unit_len = rest.chars().take_while(char::is_ascii_alphabetic).count();
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        total += match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            "d" => Duration::from_secs(value * 86_400),
            "" => bail!("invalid duration '{input}': missing unit"),
            other => bail!("invalid duration '{input}': unknown unit '{other}'"),
        };
    }
    Ok(total)
}

/// Render a duration in the largest whole unit that represents it exactly.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        return format!("{millis}ms");
    }
    let secs = duration.as_secs();
    match secs {
        0 => "0s".to_string(),
        s if s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s % 3600 == 0 => format!("{}h", s / 3600),
        s if s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{s}s"),
    }
}

mod duration_string {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(D::Error::custom)
    }
}

mod duration_list {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &[Duration], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(value.iter().map(|d| super::format_duration(*d)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Duration>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|raw| super::parse_duration(raw).map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
