// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `endpoint.rs`

#[cfg(test)]
mod tests {
    use crate::errors::EndpointError;
    use crate::reconcilers::httpproxy::endpoint::*;

    #[test]
    fn test_http_defaults_to_port_80() {
        let parsed = parse_endpoint("http://app.internal", None, 443).unwrap();

        assert_eq!(parsed.scheme, Scheme::Http);
        assert_eq!(parsed.host, "app.internal");
        assert_eq!(parsed.address_type, AddressType::Fqdn);
        assert_eq!(parsed.port, 80);
        assert_eq!(parsed.upstream_hostname(), Some("app.internal"));
    }

    #[test]
    fn test_https_default_port_follows_policy() {
        assert_eq!(
            parse_endpoint("https://app.internal", None, 8443)
                .unwrap()
                .port,
            8443
        );
        assert_eq!(
            parse_endpoint("https://app.internal", None, 443).unwrap().port,
            443
        );
        assert_eq!(
            parse_endpoint("https://app.internal:443", None, 8443)
                .unwrap()
                .port,
            443
        );
        assert_eq!(
            parse_endpoint("https://app.internal:9443/", None, 8443)
                .unwrap()
                .port,
            9443
        );
    }

    #[test]
    fn test_address_types() {
        let v4 = parse_endpoint("http://10.0.0.12:8080", None, 443).unwrap();
        assert_eq!(v4.address_type, AddressType::IPv4);
        assert_eq!(v4.upstream_hostname(), None);

        let v6 = parse_endpoint("http://[2001:db8::1]", None, 443).unwrap();
        assert_eq!(v6.address_type, AddressType::IPv6);
        assert_eq!(v6.host, "2001:db8::1");
        assert_eq!(v6.address_type.to_string(), "IPv6");
    }

    #[test]
    fn test_https_ip_requires_tls_hostname() {
        let err = parse_endpoint("https://10.0.0.12", None, 443).unwrap_err();
        assert!(err
            .to_string()
            .contains("HTTPS endpoint with IP address requires tls.hostname"));

        let parsed = parse_endpoint("https://10.0.0.12", Some("api.internal"), 443).unwrap();
        assert_eq!(parsed.upstream_hostname(), Some("api.internal"));
    }

    #[test]
    fn test_rejects_unsupported_scheme_and_paths() {
        assert!(matches!(
            parse_endpoint("grpc://app.internal", None, 443),
            Err(EndpointError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            parse_endpoint("http://app.internal/api", None, 443),
            Err(EndpointError::UnexpectedPath { .. })
        ));
        assert!(matches!(
            parse_endpoint("not a url", None, 443),
            Err(EndpointError::InvalidUrl { .. })
        ));
    }
}
