// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use axum::{http::StatusCode, routing::get, Router};
use clap::Parser;
use egress_operator::{
    config::OperatorConfig,
    constants::{ERROR_REQUEUE_DURATION_SECS, RESYNC_INTERVAL_SECS},
    context::Context,
    crd::ExternalService,
    labels::{APP_EGRESS_GATEWAY, APP_LABEL},
    logging::init_tracing,
    metrics::{gather_metrics, record_reconciliation_error, record_reconciliation_success},
    reconcilers::{owning_external_service, reconcile_external_service},
};
use futures::StreamExt;
use k8s_openapi::api::{
    apps::v1::Deployment,
    autoscaling::v1::HorizontalPodAutoscaler,
    core::v1::{ConfigMap, Service},
    networking::v1::NetworkPolicy,
    policy::v1::PodDisruptionBudget,
};
use kube::{
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, ResourceExt,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

/// Kubernetes operator running Envoy egress gateways for `ExternalService`s.
#[derive(Debug, Parser)]
#[command(name = "egress-operator", version, about)]
struct Args {
    /// Address the Prometheus `/metrics` endpoint listens on
    #[arg(long, default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    /// Generate a PodDisruptionBudget for every gateway
    #[arg(long)]
    enable_pod_disruption_budgets: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .thread_name("egress-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    init_tracing();

    info!("Starting egress operator");

    let mut config = OperatorConfig::from_env();
    config.enable_pod_disruption_budgets |= args.enable_pod_disruption_budgets;
    debug!(?config, "Operator configuration loaded");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let ctx = Arc::new(Context::new(client, config));

    // Neither task should ever exit; if one does, the process exits with it
    tokio::select! {
        result = run_externalservice_controller(ctx) => {
            error!("CRITICAL: ExternalService controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("ExternalService controller exited unexpectedly without error")
        }
        result = serve_metrics(args.metrics_addr) => {
            error!("CRITICAL: metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Metrics server exited unexpectedly without error")
        }
    }
}

/// Run the `ExternalService` controller.
///
/// Generated objects are watched in the operator namespace and mapped back to
/// their owner, so drift or deletion of a child triggers a reconcile.
async fn run_externalservice_controller(ctx: Arc<Context>) -> Result<()> {
    info!(
        namespace = %ctx.config.namespace,
        "Starting ExternalService controller"
    );

    let api = Api::<ExternalService>::all(ctx.client.clone());
    let children = Config::default().labels(&format!("{APP_LABEL}={APP_EGRESS_GATEWAY}"));

    Controller::new(api, Config::default())
        .watches(
            ctx.generated::<ConfigMap>(),
            children.clone(),
            owning_external_service::<ConfigMap>,
        )
        .watches(
            ctx.generated::<Deployment>(),
            children.clone(),
            owning_external_service::<Deployment>,
        )
        .watches(
            ctx.generated::<Service>(),
            children.clone(),
            owning_external_service::<Service>,
        )
        .watches(
            ctx.generated::<HorizontalPodAutoscaler>(),
            children.clone(),
            owning_external_service::<HorizontalPodAutoscaler>,
        )
        .watches(
            ctx.generated::<NetworkPolicy>(),
            children.clone(),
            owning_external_service::<NetworkPolicy>,
        )
        .watches(
            ctx.generated::<PodDisruptionBudget>(),
            children,
            owning_external_service::<PodDisruptionBudget>,
        )
        .run(reconcile_externalservice_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Reconcile wrapper for `ExternalService`
async fn reconcile_externalservice_wrapper(
    es: Arc<ExternalService>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();

    match reconcile_external_service(ctx, (*es).clone()).await {
        Ok(()) => {
            record_reconciliation_success(start.elapsed());
            debug!("Reconciled ExternalService: {}", es.name_any());
            Ok(Action::requeue(Duration::from_secs(RESYNC_INTERVAL_SECS)))
        }
        Err(e) => {
            record_reconciliation_error(start.elapsed());
            error!("Failed to reconcile ExternalService {}: {:#}", es.name_any(), e);
            Err(e.into())
        }
    }
}

/// Error policy for controller
fn error_policy(_resource: Arc<ExternalService>, _err: &ReconcileError, _ctx: Arc<Context>) -> Action {
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

/// Serve the Prometheus registry over HTTP.
async fn serve_metrics(addr: SocketAddr) -> Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
    info!(addr = %addr, "Serving metrics");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    gather_metrics().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
