// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # Network Services Operator
//!
//! A Kubernetes operator that turns high-level networking intent into
//! Gateway API, Envoy Gateway and DNS objects.
//!
//! ## Overview
//!
//! - `HTTPProxy` resources become a `Gateway`, an `HTTPRoute` and the
//!   `EndpointSlice`s behind it, plus `EnvoyPatchPolicy` patches when a
//!   backend is reached through a `Connector` tunnel
//! - `Gateway` listener hostnames are only programmed once a verified
//!   `Domain` covers them; verified hostnames get `DNSRecordSet`s
//! - `Domain` resources are verified through DNS TXT or HTTP challenges and
//!   enriched with registration data from RDAP
//! - `TrafficProtectionPolicy` resources attach a Coraza WAF to Gateways and
//!   routes through Envoy patches
//! - cert-manager ACME HTTP-01 challenges get solver routes on the Gateway
//!   serving the challenged hostname
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types owned by this operator
//! - [`gateway_api`], [`envoy_gateway`], [`dns_operator`], [`cert_manager`] -
//!   Types of the resources this operator writes or reads
//! - [`reconcilers`] - Reconciliation logic for each resource type
//! - [`context`] - Shared context handed to every controller
//! - [`cluster`] - Upstream and downstream cluster clients
//! - [`verification`] - DNS and HTTP lookups behind domain verification
//! - [`registry`] - Domain registration lookups
//!
//! ## Example
//!
//! ```rust,no_run
//! use network_services_operator::crd::{HTTPProxy, HTTPProxyRule, HTTPProxyRuleBackend, HTTPProxySpec};
//!
//! let proxy = HTTPProxy::new(
//!     "web",
//!     HTTPProxySpec {
//!         hostnames: vec!["www.example.com".to_string()],
//!         rules: vec![HTTPProxyRule {
//!             backends: vec![HTTPProxyRuleBackend {
//!                 endpoint: "https://origin.example.net".to_string(),
//!                 ..Default::default()
//!             }],
//!             ..Default::default()
//!         }],
//!     },
//! );
//! ```

pub mod cert_manager;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod dns_operator;
pub mod envoy_gateway;
pub mod errors;
pub mod gateway_api;
pub mod labels;
pub mod metrics;
pub mod reconcilers;
pub mod registry;
pub mod selector;
pub mod status_reasons;
pub mod verification;

#[cfg(test)]
mod testing;

#[cfg(test)]
mod status_reasons_tests;
