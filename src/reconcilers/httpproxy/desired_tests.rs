// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `desired.rs`

#[cfg(test)]
mod tests {
    use crate::config::GatewayConfig;
    use crate::crd::{
        BackendTLS, ConnectionDetails, Connector, ConnectorReference, ConnectorSpec,
        ConnectorStatus, HTTPProxy, HTTPProxyRule, HTTPProxyRuleBackend, HTTPProxySpec,
        PublicKeyConnectionDetails,
    };
    use crate::gateway_api::{HTTPRouteFilter, HTTPRouteFilterType, HTTPURLRewriteFilter};
    use crate::reconcilers::httpproxy::desired::*;
    use crate::reconcilers::status::create_condition;
    use std::collections::BTreeMap;

    fn backend(endpoint: &str) -> HTTPProxyRuleBackend {
        HTTPProxyRuleBackend {
            endpoint: endpoint.to_string(),
            ..Default::default()
        }
    }

    fn proxy(hostnames: &[&str], rules: Vec<HTTPProxyRule>) -> HTTPProxy {
        let mut proxy = HTTPProxy::new(
            "web",
            HTTPProxySpec {
                hostnames: hostnames.iter().map(ToString::to_string).collect(),
                rules,
            },
        );
        proxy.metadata.namespace = Some("team-a".to_string());
        proxy.metadata.uid = Some("7c1d6c2e".to_string());
        proxy
    }

    fn rule(backends: Vec<HTTPProxyRuleBackend>) -> HTTPProxyRule {
        HTTPProxyRule {
            backends,
            ..Default::default()
        }
    }

    fn connector_backend(name: &str) -> HTTPProxyRuleBackend {
        HTTPProxyRuleBackend {
            endpoint: "http://localhost:3000".to_string(),
            connector: Some(ConnectorReference {
                name: name.to_string(),
            }),
            ..Default::default()
        }
    }

    fn connector(name: &str, ready: bool) -> Connector {
        let mut connector = Connector::new(
            name,
            ConnectorSpec {
                connector_class_name: "tunnels".to_string(),
            },
        );
        connector.metadata.namespace = Some("team-a".to_string());
        connector.status = Some(ConnectorStatus {
            connection_details: Some(ConnectionDetails {
                public_key: Some(PublicKeyConnectionDetails {
                    id: "pk-123".to_string(),
                    home_relay: Some("https://relay.example.net".to_string()),
                    addresses: Vec::new(),
                }),
            }),
            lease_ref: None,
            conditions: vec![create_condition(
                "Ready",
                if ready { "True" } else { "False" },
                if ready { "Ready" } else { "LeaseExpired" },
                "",
                None,
            )],
        });
        connector
    }

    #[test]
    fn test_custom_hostnames_add_listener_pairs() {
        let proxy = proxy(
            &["a.example.com", "b.example.com"],
            vec![rule(vec![backend("http://app.internal")])],
        );

        let desired =
            collect_desired_resources(&proxy, &GatewayConfig::default(), &BTreeMap::new()).unwrap();
        let listeners = &desired.gateway.spec.listeners;

        assert_eq!(listeners.len(), 6);
        assert_eq!(listeners[0].name, "default-http");
        assert_eq!(listeners[0].port, 80);
        assert_eq!(listeners[1].name, "default-https");
        assert_eq!(listeners[1].port, 443);
        assert_eq!(
            listeners
                .iter()
                .filter(|l| l.hostname.as_deref() == Some("a.example.com"))
                .map(|l| l.protocol.as_str())
                .collect::<Vec<_>>(),
            vec!["HTTP", "HTTPS"]
        );
        let (http_b, https_b) = hostname_listener_names("b.example.com");
        assert!(listeners.iter().any(|l| l.name == http_b));
        assert!(listeners.iter().any(|l| l.name == https_b));
    }

    #[test]
    fn test_duplicate_hostnames_share_one_listener_pair() {
        let proxy = proxy(
            &["a.example.com", "A.example.com."],
            vec![rule(vec![backend("http://app.internal")])],
        );

        let desired =
            collect_desired_resources(&proxy, &GatewayConfig::default(), &BTreeMap::new()).unwrap();

        assert_eq!(desired.gateway.spec.listeners.len(), 4);
    }

    #[test]
    fn test_https_bare_ip_without_tls_hostname_fails() {
        let proxy = proxy(&[], vec![rule(vec![backend("https://10.0.0.12")])]);

        let err = collect_desired_resources(&proxy, &GatewayConfig::default(), &BTreeMap::new())
            .unwrap_err();

        assert!(err
            .to_string()
            .contains("HTTPS endpoint with IP address requires tls.hostname"));
    }

    #[test]
    fn test_endpoint_slice_per_backend() {
        let proxy = proxy(
            &[],
            vec![
                rule(vec![backend("http://10.0.0.12:8080"), backend("http://[2001:db8::1]")]),
                rule(vec![backend("https://api.internal")]),
            ],
        );

        let desired =
            collect_desired_resources(&proxy, &GatewayConfig::default(), &BTreeMap::new()).unwrap();
        let slices = &desired.endpoint_slices;

        assert_eq!(slices.len(), 3);
        assert_eq!(slices[0].metadata.name.as_deref(), Some("web-rule-0-backend-0"));
        assert_eq!(slices[0].address_type, "IPv4");
        assert_eq!(slices[1].address_type, "IPv6");
        assert_eq!(slices[2].metadata.name.as_deref(), Some("web-rule-1-backend-0"));
        assert_eq!(slices[2].address_type, "FQDN");
        let port = &slices[2].ports.as_ref().unwrap()[0];
        assert_eq!(port.port, Some(443));
        assert_eq!(port.app_protocol.as_deref(), Some("https"));

        let refs = &desired.http_route.spec.rules[0].backend_refs;
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].kind.as_deref(), Some("EndpointSlice"));
        assert_eq!(refs[0].port, Some(8080));
    }

    #[test]
    fn test_https_backend_port_policy() {
        let proxy = proxy(&[], vec![rule(vec![backend("https://api.internal")])]);
        let config = GatewayConfig {
            https_backend_port: 8443,
            ..GatewayConfig::default()
        };

        let desired = collect_desired_resources(&proxy, &config, &BTreeMap::new()).unwrap();

        assert_eq!(desired.http_route.spec.rules[0].backend_refs[0].port, Some(8443));
    }

    #[test]
    fn test_url_rewrite_synthesized_for_tls_hostname() {
        let proxy = proxy(
            &[],
            vec![rule(vec![HTTPProxyRuleBackend {
                endpoint: "https://10.0.0.12".to_string(),
                tls: Some(BackendTLS {
                    hostname: Some("api.internal".to_string()),
                }),
                ..Default::default()
            }])],
        );

        let desired =
            collect_desired_resources(&proxy, &GatewayConfig::default(), &BTreeMap::new()).unwrap();
        let filters = &desired.http_route.spec.rules[0].filters;

        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].filter_type, HTTPRouteFilterType::UrlRewrite);
        assert_eq!(
            filters[0].url_rewrite.as_ref().unwrap().hostname.as_deref(),
            Some("api.internal")
        );
    }

    #[test]
    fn test_explicit_url_rewrite_is_kept() {
        let explicit = HTTPRouteFilter {
            filter_type: HTTPRouteFilterType::UrlRewrite,
            url_rewrite: Some(HTTPURLRewriteFilter {
                hostname: Some("custom.internal".to_string()),
                path: None,
            }),
            ..Default::default()
        };
        let proxy = proxy(
            &[],
            vec![HTTPProxyRule {
                filters: vec![explicit.clone()],
                backends: vec![backend("http://api.internal")],
                ..Default::default()
            }],
        );

        let desired =
            collect_desired_resources(&proxy, &GatewayConfig::default(), &BTreeMap::new()).unwrap();

        assert_eq!(desired.http_route.spec.rules[0].filters, vec![explicit]);
    }

    #[test]
    fn test_bare_ip_http_backend_gets_no_rewrite() {
        let proxy = proxy(&[], vec![rule(vec![backend("http://10.0.0.12")])]);

        let desired =
            collect_desired_resources(&proxy, &GatewayConfig::default(), &BTreeMap::new()).unwrap();

        assert!(desired.http_route.spec.rules[0].filters.is_empty());
    }

    #[test]
    fn test_connector_not_ready_uses_offline_filter() {
        let proxy = proxy(&[], vec![rule(vec![connector_backend("laptop")])]);
        let connectors = BTreeMap::from([("laptop".to_string(), connector("laptop", false))]);

        let desired =
            collect_desired_resources(&proxy, &GatewayConfig::default(), &connectors).unwrap();
        let route_rule = &desired.http_route.spec.rules[0];

        assert!(route_rule.backend_refs.is_empty());
        assert!(desired.endpoint_slices.is_empty());
        assert!(desired.tunnels.is_empty());
        let extension = route_rule
            .filters
            .iter()
            .find_map(|f| f.extension_ref.as_ref())
            .unwrap();
        assert_eq!(extension.kind, "HTTPRouteFilter");
        assert_eq!(extension.name, "web-connector-offline");

        let offline = desired.offline_filter.unwrap();
        let response = offline.spec.direct_response.unwrap();
        assert_eq!(response.status_code, Some(503));
        assert_eq!(
            response.body.unwrap().inline.as_deref(),
            Some("Tunnel not online")
        );
    }

    #[test]
    fn test_missing_connector_is_offline() {
        let proxy = proxy(&[], vec![rule(vec![connector_backend("missing")])]);

        let desired =
            collect_desired_resources(&proxy, &GatewayConfig::default(), &BTreeMap::new()).unwrap();

        assert!(desired.offline_filter.is_some());
    }

    #[test]
    fn test_connector_ready_produces_tunnel() {
        let proxy = proxy(&[], vec![rule(vec![connector_backend("laptop")])]);
        let connectors = BTreeMap::from([("laptop".to_string(), connector("laptop", true))]);

        let desired =
            collect_desired_resources(&proxy, &GatewayConfig::default(), &connectors).unwrap();

        assert!(desired.offline_filter.is_none());
        assert!(desired.http_route.spec.rules[0].backend_refs.is_empty());
        assert_eq!(
            desired.tunnels,
            vec![TunnelRoute {
                rule_index: 0,
                connector_name: "laptop".to_string(),
                connector_id: "pk-123".to_string(),
                relay_host: "relay.example.net".to_string(),
                relay_port: 443,
                authority: "localhost:3000".to_string(),
            }]
        );
    }

    #[test]
    fn test_mixed_connector_rule_is_rejected() {
        let proxy = proxy(
            &[],
            vec![rule(vec![connector_backend("laptop"), backend("http://app.internal")])],
        );

        assert!(
            collect_desired_resources(&proxy, &GatewayConfig::default(), &BTreeMap::new())
                .is_err()
        );
    }

    #[test]
    fn test_build_is_deterministic() {
        let proxy = proxy(
            &["a.example.com"],
            vec![rule(vec![backend("https://api.internal")])],
        );
        let config = GatewayConfig::default();

        let first = collect_desired_resources(&proxy, &config, &BTreeMap::new()).unwrap();
        let second = collect_desired_resources(&proxy, &config, &BTreeMap::new()).unwrap();

        assert_eq!(first.gateway.spec, second.gateway.spec);
        assert_eq!(first.http_route.spec, second.http_route.spec);
        assert_eq!(first.endpoint_slices, second.endpoint_slices);
    }

    #[test]
    fn test_desired_objects_carry_admission_defaults() {
        let proxy = proxy(
            &["www.example.com"],
            vec![rule(vec![backend("http://10.0.0.10:8080")])],
        );

        let desired =
            collect_desired_resources(&proxy, &GatewayConfig::default(), &BTreeMap::new()).unwrap();

        let rule = &desired.http_route.spec.rules[0];
        let path = rule.matches[0].path.as_ref().unwrap();
        assert_eq!(path.match_type.as_deref(), Some("PathPrefix"));
        assert_eq!(path.value.as_deref(), Some("/"));
        assert_eq!(rule.backend_refs[0].weight, Some(1));

        let (_, https) = hostname_listener_names("www.example.com");
        let listener = desired
            .gateway
            .spec
            .listeners
            .iter()
            .find(|l| l.name == https)
            .unwrap();
        let cert = &listener.tls.as_ref().unwrap().certificate_refs[0];
        assert_eq!(cert.kind.as_deref(), Some("Secret"));
        assert_eq!(cert.group.as_deref(), Some(""));
    }

    #[test]
    fn test_explicit_matches_are_not_replaced() {
        let mut with_match = rule(vec![backend("http://10.0.0.10:8080")]);
        with_match.matches = vec![crate::gateway_api::HTTPRouteMatch {
            path: Some(crate::gateway_api::HTTPPathMatch {
                match_type: Some("Exact".to_string()),
                value: Some("/healthz".to_string()),
            }),
            ..Default::default()
        }];
        let proxy = proxy(&[], vec![with_match]);

        let desired =
            collect_desired_resources(&proxy, &GatewayConfig::default(), &BTreeMap::new()).unwrap();

        let matches = &desired.http_route.spec.rules[0].matches;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].path.as_ref().unwrap().value.as_deref(), Some("/healthz"));
    }
}
