// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::coordination::v1::Lease;
use kube::{
    api::DynamicObject,
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Resource, ResourceExt,
};
use network_services_operator::{
    cert_manager::{challenge_api_resource, KIND_CHALLENGE},
    clock::SystemClock,
    cluster::ClusterManager,
    config::OperatorConfig,
    constants::{
        CONFLICT_REQUEUE_DURATION_SECS, ERROR_REQUEUE_DURATION_SECS, KIND_CONNECTOR, KIND_DOMAIN, KIND_GATEWAY, KIND_HTTP_PROXY,
        KIND_TRAFFIC_PROTECTION_POLICY, READY_REQUEUE_DURATION_SECS, TOKIO_WORKER_THREADS,
    },
    context::Context,
    crd::{Connector, Domain, HTTPProxy, TrafficProtectionPolicy},
    dns_operator::DNSZone,
    errors::chain_is_conflict,
    gateway_api::{Gateway, HTTPRoute},
    metrics,
    reconcilers::{
        reconcile_challenge, reconcile_connector, reconcile_domain, reconcile_gateway,
        reconcile_httpproxy, reconcile_traffic_protection_policy,
    },
    registry::{rdap::RdapRegistryClient, timeout::TimeoutRegistryClient, RegistryClient},
    selector::{domains_for_zone, proxies_for_connector, same_namespace},
    verification::{DnsResolver, HickoryDnsResolver, HttpFetcher, ReqwestHttpFetcher},
};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

/// Network services operator
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path of the YAML configuration file
    #[arg(long, env = "NETWORK_SERVICES_CONFIG")]
    config: Option<PathBuf>,
}

type ControllerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

fn main() -> Result<()> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("network-services-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    // Respects RUST_LOG (default: info) and RUST_LOG_FORMAT (json or text)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting network services operator");

    let config = Arc::new(OperatorConfig::load(args.config.as_deref())?);
    debug!(config = ?config, "Configuration loaded");

    let mut contexts = config.clusters.clone();
    contexts.extend(config.downstream.kube_context.iter().cloned());
    let clusters = ClusterManager::from_contexts(&contexts).await?;
    info!(clusters = ?clusters.names(), "Kubernetes clients initialized");

    let downstream_name = config.downstream.kube_context.clone().unwrap_or_default();
    let downstream = clusters
        .get_cluster(&downstream_name)
        .cloned()
        .with_context(|| format!("downstream cluster '{downstream_name}' is not registered"))?;

    let dns_resolver: Arc<dyn DnsResolver> = Arc::new(
        HickoryDnsResolver::from_system_conf(config.domain_verification.lookup_timeout)
            .context("building DNS resolver")?,
    );
    let http_fetcher: Arc<dyn HttpFetcher> = Arc::new(
        ReqwestHttpFetcher::new(config.domain_verification.lookup_timeout)
            .context("building HTTP client")?,
    );
    let rdap = RdapRegistryClient::new(
        &config.domain_registration.rdap_base_url,
        Some(dns_resolver.clone()),
    )
    .context("building RDAP client")?;
    let registry: Arc<dyn RegistryClient> = Arc::new(TimeoutRegistryClient::new(
        rdap,
        config.domain_registration.lookup_timeout,
    ));

    let metrics_addr: SocketAddr = format!("{}:{}", config.metrics.bind_address, config.metrics.port)
        .parse()
        .context("parsing metrics server address")?;

    let mut tasks: Vec<ControllerFuture> = vec![Box::pin(metrics::serve(metrics_addr))];
    for cluster in clusters.upstream_clusters(&config.clusters) {
        let ctx = Arc::new(Context {
            cluster,
            downstream: downstream.clone(),
            config: config.clone(),
            clock: Arc::new(SystemClock),
            dns_resolver: dns_resolver.clone(),
            http_fetcher: http_fetcher.clone(),
            registry: registry.clone(),
        });
        tasks.push(Box::pin(run_cluster_controllers(ctx)));
    }

    info!("Starting all controllers");

    // Controllers should never exit; the first one that does ends the process
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for shutdown signal")?;
            info!("Received shutdown signal, stopping controllers");
            Ok(())
        }
        (result, index, _) = futures::future::select_all(tasks) => {
            error!("CRITICAL: task {} exited unexpectedly: {:?}", index, result);
            result?;
            anyhow::bail!("task {index} exited unexpectedly without error")
        }
    }
}

/// Run every controller against one upstream cluster.
async fn run_cluster_controllers(ctx: Arc<Context>) -> Result<()> {
    let cluster = ctx.cluster.name.clone();
    info!(cluster = %cluster, "Starting controllers for cluster");

    tokio::select! {
        result = run_httpproxy_controller(ctx.clone()) => {
            error!(cluster = %cluster, "CRITICAL: HTTPProxy controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("HTTPProxy controller exited unexpectedly without error")
        }
        result = run_gateway_controller(ctx.clone()) => {
            error!(cluster = %cluster, "CRITICAL: Gateway controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Gateway controller exited unexpectedly without error")
        }
        result = run_connector_controller(ctx.clone()) => {
            error!(cluster = %cluster, "CRITICAL: Connector controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Connector controller exited unexpectedly without error")
        }
        result = run_domain_controller(ctx.clone()) => {
            error!(cluster = %cluster, "CRITICAL: Domain controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Domain controller exited unexpectedly without error")
        }
        result = run_traffic_protection_policy_controller(ctx.clone()) => {
            error!(cluster = %cluster, "CRITICAL: TrafficProtectionPolicy controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("TrafficProtectionPolicy controller exited unexpectedly without error")
        }
        result = run_challenge_controller(ctx.clone()) => {
            error!(cluster = %cluster, "CRITICAL: Challenge controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Challenge controller exited unexpectedly without error")
        }
    }
}

/// Run the `HTTPProxy` controller
///
/// A `Connector` change re-evaluates the proxies routed through it.
async fn run_httpproxy_controller(ctx: Arc<Context>) -> Result<()> {
    info!("Starting HTTPProxy controller");

    let client = ctx.client();
    let controller = Controller::new(Api::<HTTPProxy>::all(client.clone()), Config::default());
    let proxies = controller.store();
    controller
        .owns(Api::<Gateway>::all(client.clone()), Config::default())
        .owns(Api::<HTTPRoute>::all(client.clone()), Config::default())
        .watches(Api::<Connector>::all(client), Config::default(), move |connector| {
            proxies_for_connector(&proxies, &connector)
        })
        .run(reconcile_httpproxy_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Run the `Gateway` controller
///
/// A `Domain` change re-evaluates every Gateway of its namespace.
async fn run_gateway_controller(ctx: Arc<Context>) -> Result<()> {
    info!("Starting Gateway controller");

    let client = ctx.client();
    let controller = Controller::new(Api::<Gateway>::all(client.clone()), Config::default());
    let gateways = controller.store();
    controller
        .watches(Api::<Domain>::all(client), Config::default(), move |domain| {
            same_namespace(&gateways, &domain)
        })
        .run(reconcile_gateway_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Run the `Connector` controller
async fn run_connector_controller(ctx: Arc<Context>) -> Result<()> {
    info!("Starting Connector controller");

    let client = ctx.client();
    Controller::new(Api::<Connector>::all(client.clone()), Config::default())
        .owns(Api::<Lease>::all(client), Config::default())
        .run(reconcile_connector_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Run the `Domain` controller
///
/// A `DNSZone` change re-evaluates the domains it serves.
async fn run_domain_controller(ctx: Arc<Context>) -> Result<()> {
    info!("Starting Domain controller");

    let client = ctx.client();
    let controller = Controller::new(Api::<Domain>::all(client.clone()), Config::default());
    let domains = controller.store();
    controller
        .watches(Api::<DNSZone>::all(client), Config::default(), move |zone| {
            domains_for_zone(&domains, &zone)
        })
        .run(reconcile_domain_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Run the `TrafficProtectionPolicy` controller
///
/// A `Gateway` change re-evaluates every policy of its namespace.
async fn run_traffic_protection_policy_controller(ctx: Arc<Context>) -> Result<()> {
    info!("Starting TrafficProtectionPolicy controller");

    let client = ctx.client();
    let controller = Controller::new(
        Api::<TrafficProtectionPolicy>::all(client.clone()),
        Config::default(),
    );
    let policies = controller.store();
    controller
        .watches(Api::<Gateway>::all(client), Config::default(), move |gateway| {
            same_namespace(&policies, &gateway)
        })
        .run(reconcile_traffic_protection_policy_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Run the cert-manager `Challenge` controller
async fn run_challenge_controller(ctx: Arc<Context>) -> Result<()> {
    info!("Starting Challenge controller");

    let resource = challenge_api_resource();
    let api = Api::<DynamicObject>::all_with(ctx.client(), &resource);
    Controller::new_with(api, Config::default(), resource)
        .run(reconcile_challenge_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Turn a reconcile outcome into a controller action and record metrics.
fn finish(
    kind: &str,
    name: &str,
    started: Instant,
    result: Result<Option<Duration>>,
) -> Result<Action, ReconcileError> {
    match result {
        Ok(requeue) => {
            metrics::record_reconciliation_success(kind, started.elapsed());
            info!("Successfully reconciled {}: {}", kind, name);
            match requeue {
                Some(after) => {
                    metrics::record_reconciliation_requeue(kind, "pending");
                    debug!("{} {} requeueing in {:?}", kind, name, after);
                    Ok(Action::requeue(after))
                }
                None => Ok(Action::requeue(Duration::from_secs(
                    READY_REQUEUE_DURATION_SECS,
                ))),
            }
        }
        Err(e) if chain_is_conflict(&e) => {
            metrics::record_reconciliation_requeue(kind, "conflict");
            debug!("{} {} hit a write conflict, retrying: {:#}", kind, name, e);
            Ok(Action::requeue(Duration::from_secs(CONFLICT_REQUEUE_DURATION_SECS)))
        }
        Err(e) => {
            metrics::record_reconciliation_error(kind, started.elapsed());
            error!("Failed to reconcile {} {}: {:#}", kind, name, e);
            Err(e.into())
        }
    }
}

/// Reconcile wrapper for `HTTPProxy`
async fn reconcile_httpproxy_wrapper(
    proxy: Arc<HTTPProxy>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let started = Instant::now();
    let result = reconcile_httpproxy(&ctx, &proxy).await;
    finish(KIND_HTTP_PROXY, &proxy.name_any(), started, result)
}

/// Reconcile wrapper for `Gateway`
async fn reconcile_gateway_wrapper(
    gateway: Arc<Gateway>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let started = Instant::now();
    let result = reconcile_gateway(&ctx, &gateway).await;
    finish(KIND_GATEWAY, &gateway.name_any(), started, result)
}

/// Reconcile wrapper for `Connector`
async fn reconcile_connector_wrapper(
    connector: Arc<Connector>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let started = Instant::now();
    let result = reconcile_connector(&ctx, &connector).await;
    finish(KIND_CONNECTOR, &connector.name_any(), started, result)
}

/// Reconcile wrapper for `Domain`
async fn reconcile_domain_wrapper(
    domain: Arc<Domain>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let started = Instant::now();
    let result = reconcile_domain(&ctx, &domain).await;
    finish(KIND_DOMAIN, &domain.name_any(), started, result)
}

/// Reconcile wrapper for `TrafficProtectionPolicy`
async fn reconcile_traffic_protection_policy_wrapper(
    policy: Arc<TrafficProtectionPolicy>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let started = Instant::now();
    let result = reconcile_traffic_protection_policy(&ctx, &policy).await;
    finish(KIND_TRAFFIC_PROTECTION_POLICY, &policy.name_any(), started, result)
}

/// Reconcile wrapper for cert-manager `Challenge`
async fn reconcile_challenge_wrapper(
    challenge: Arc<DynamicObject>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let started = Instant::now();
    let result = reconcile_challenge(&ctx, &challenge).await.map(|()| None);
    finish(KIND_CHALLENGE, &challenge.name_any(), started, result)
}

/// Error policy for all controllers
fn error_policy<K>(resource: Arc<K>, err: &ReconcileError, _ctx: Arc<Context>) -> Action
where
    K: Resource,
{
    warn!(name = %resource.name_any(), error = %err, "Reconcile failed, retrying");
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}
