// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation controllers for network service resources.
//!
//! Each reconciler recomputes the full desired state of one object from its
//! spec and related objects, converges the live dependents toward it and
//! reports the outcome through status conditions.
//!
//! # Reconciliation Architecture
//!
//! 1. **Read** - Spec plus related objects, fresh from the API server
//! 2. **Derive** - Desired dependents from pure builders
//! 3. **Apply** - [`resources::create_or_update`] writes only what changed;
//!    a dependent owned by someone else becomes a `Conflict` condition
//! 4. **Status** - Conditions are folded into a copy of the status and written
//!    once at the end through [`result::ReconcileResult::complete`]
//!
//! # Available Reconcilers
//!
//! - [`reconcile_httpproxy`] - Gateway, HTTPRoute, EndpointSlices and tunnel patches of an `HTTPProxy`
//! - [`reconcile_gateway`] - Listener hostname verification and DNS records of a `Gateway`
//! - [`reconcile_connector`] - Lease-based readiness of a `Connector`
//! - [`reconcile_domain`] - Ownership verification and registration data of a `Domain`
//! - [`reconcile_traffic_protection_policy`] - WAF attachment and Envoy patches
//! - [`reconcile_challenge`] - ACME HTTP-01 solver routes
//!
//! # Example: Running a Reconciler
//!
//! ```rust,no_run
//! use network_services_operator::context::Context;
//! use network_services_operator::crd::HTTPProxy;
//! use network_services_operator::reconcilers::reconcile_httpproxy;
//!
//! async fn run(ctx: &Context, proxy: &HTTPProxy) -> anyhow::Result<()> {
//!     if let Some(requeue) = reconcile_httpproxy(ctx, proxy).await? {
//!         println!("requeue in {requeue:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod acme;
pub mod connector;
pub mod dns;
pub mod domain;
pub mod finalizers;
pub mod gateway;
pub mod httpproxy;
pub mod pagination;
pub mod policy;
pub mod resources;
pub mod result;
pub mod status;

pub use acme::reconcile_challenge;
pub use connector::reconcile_connector;
pub use domain::reconcile_domain;
pub use gateway::reconcile_gateway;
pub use httpproxy::reconcile_httpproxy;
pub use policy::reconcile_traffic_protection_policy;
