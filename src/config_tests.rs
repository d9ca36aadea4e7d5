// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

#[cfg(test)]
mod tests {
    use crate::config::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(172_800));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("5w").is_err());
        assert!(parse_duration("m5").is_err());
    }

    #[test]
    fn test_format_duration_picks_largest_unit() {
        assert_eq!(format_duration(Duration::from_secs(86_400)), "1d");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = OperatorConfig::from_yaml("").unwrap();
        assert_eq!(config, OperatorConfig::default());
        assert_eq!(config.gateway.https_backend_port, 443);
        assert_eq!(config.dns.managed_by, "network-services-operator");
    }

    #[test]
    fn test_partial_document_keeps_other_defaults() {
        let yaml = r#"
gateway:
  gatewayClassName: edge
  httpsBackendPort: 8443
domainVerification:
  retryIntervals: ["1s", "10s"]
domainRegistration:
  rateLimitBackoff: 2m
"#;
        let config = OperatorConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.gateway.gateway_class_name, "edge");
        assert_eq!(config.gateway.https_backend_port, 8443);
        assert_eq!(
            config.domain_verification.retry_intervals,
            vec![Duration::from_secs(1), Duration::from_secs(10)]
        );
        assert_eq!(
            config.domain_registration.rate_limit_backoff,
            Duration::from_secs(120)
        );
        assert_eq!(
            config.domain_registration.refresh_interval,
            DomainRegistrationConfig::default().refresh_interval
        );
    }

    #[test]
    fn test_validation_rejects_bad_backend_port() {
        let err = OperatorConfig::from_yaml("gateway:\n  httpsBackendPort: 9443\n").unwrap_err();
        assert!(err.to_string().contains("httpsBackendPort"));
    }

    #[test]
    fn test_validation_rejects_empty_retry_intervals() {
        let err =
            OperatorConfig::from_yaml("domainVerification:\n  retryIntervals: []\n").unwrap_err();
        assert!(err.to_string().contains("retryIntervals"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dns:\n  managedBy: edge-operator\n  recordTtl: 60").unwrap();

        let config = OperatorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.dns.managed_by, "edge-operator");
        assert_eq!(config.dns.record_ttl, 60);
    }

    #[test]
    fn test_load_without_path_is_default() {
        assert_eq!(OperatorConfig::load(None).unwrap(), OperatorConfig::default());
    }

    #[test]
    fn test_durations_serialize_as_strings() {
        let yaml = serde_yaml::to_string(&OperatorConfig::default()).unwrap();
        assert!(yaml.contains("refreshInterval: 1d"));
        assert!(yaml.contains("- 5s"));
    }
}
