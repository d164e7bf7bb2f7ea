// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `ExternalService` reconciliation logic.
//!
//! One pass compiles the Envoy bootstrap and drives every generated object
//! through the create-or-patch engine in a fixed order:
//!
//! 1. `ConfigMap` carrying the bootstrap document
//! 2. `Deployment` running the gateway (pod template carries the config hash)
//! 3. `HorizontalPodAutoscaler`
//! 4. `NetworkPolicy`
//! 5. `Service`, whose cutover label depends on `Deployment` readiness
//! 6. `PodDisruptionBudget`, when enabled
//!
//! Any step failing aborts the pass; the controller retries it with backoff.
//! Children are removed by owner-reference garbage collection, so there is no
//! deletion path.

use crate::config::OperatorConfig;
use crate::constants::{API_GROUP_VERSION, KIND_EXTERNAL_SERVICE};
use crate::context::Context;
use crate::crd::ExternalService;
use crate::cutover::{next_state, CutoverState};
use crate::envoy::compile;
use crate::labels::HIJACK_DNS_LABEL;
use crate::reconcilers::resources::{reconcile_object, reconcile_object_with, ObjectStore};
use crate::resources::{
    build_autoscaler, build_configmap, build_deployment, build_network_policy,
    build_pod_disruption_budget, build_service,
};
use anyhow::{Context as _, Result};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reconciles an `ExternalService`.
///
/// The object is re-read first so a deletion racing the event ends the pass
/// quietly instead of recreating children that are about to be collected.
///
/// # Example
///
/// ```rust,no_run
/// use egress_operator::config::OperatorConfig;
/// use egress_operator::context::Context;
/// use egress_operator::crd::ExternalService;
/// use egress_operator::reconcilers::reconcile_external_service;
/// use kube::Client;
/// use std::sync::Arc;
///
/// async fn handle(es: ExternalService) -> anyhow::Result<()> {
///     let client = Client::try_default().await?;
///     let ctx = Arc::new(Context::new(client, OperatorConfig::from_env()));
///     reconcile_external_service(ctx, es).await
/// }
/// ```
///
/// # Errors
///
/// Returns an error if compilation fails or any Kubernetes API call fails.
pub async fn reconcile_external_service(ctx: Arc<Context>, es: ExternalService) -> Result<()> {
    let name = es.name_any();
    info!("Reconciling ExternalService: {}", name);

    let Some(es) = ObjectStore::get(&ctx.external_services(), &name)
        .await
        .with_context(|| format!("unable to fetch ExternalService {name}"))?
    else {
        debug!(name = %name, "ExternalService no longer exists, nothing to do");
        return Ok(());
    };

    let config: &OperatorConfig = &ctx.config;
    let compiled = compile(&name, &es.spec)?;
    debug!(
        name = %name,
        admin_port = compiled.admin_port,
        hash = %compiled.hash,
        "Compiled Envoy bootstrap"
    );

    let configmaps = ctx.generated::<ConfigMap>();
    reconcile_object(&configmaps, &build_configmap(&es, config, &compiled)?)
        .await
        .context("unable to reconcile ConfigMap")?;

    let deployments = ctx.generated::<Deployment>();
    reconcile_object(&deployments, &build_deployment(&es, config, &compiled)?)
        .await
        .context("unable to reconcile Deployment")?;

    let autoscalers = ctx.generated::<HorizontalPodAutoscaler>();
    reconcile_object(&autoscalers, &build_autoscaler(&es, config)?)
        .await
        .context("unable to reconcile HorizontalPodAutoscaler")?;

    let policies = ctx.generated::<NetworkPolicy>();
    reconcile_object(&policies, &build_network_policy(&es, config)?)
        .await
        .context("unable to reconcile NetworkPolicy")?;

    let deployment = ObjectStore::get(&deployments, &name)
        .await
        .context("unable to read Deployment readiness")?;
    let ready = is_ready(deployment.as_ref());

    let services = ctx.generated::<Service>();
    reconcile_object_with(&services, &name, |stored| {
        Ok(desired_service(&es, config, ready, stored)?)
    })
    .await
    .context("unable to reconcile Service")?;

    if config.enable_pod_disruption_budgets {
        let budgets = ctx.generated::<PodDisruptionBudget>();
        reconcile_object(&budgets, &build_pod_disruption_budget(&es, config)?)
            .await
            .context("unable to reconcile PodDisruptionBudget")?;
    }

    info!("Successfully reconciled ExternalService: {}", name);
    Ok(())
}

/// `true` when the gateway `Deployment` reports at least one ready replica.
#[must_use]
pub fn is_ready(deployment: Option<&Deployment>) -> bool {
    deployment
        .and_then(|d| d.status.as_ref())
        .and_then(|s| s.ready_replicas)
        .is_some_and(|ready| ready > 0)
}

/// Previous cutover state recorded on the stored `Service`, if any.
#[must_use]
pub fn previous_state(stored: Option<&Service>) -> Option<CutoverState> {
    let value = stored.and_then(|svc| svc.labels().get(HIJACK_DNS_LABEL).cloned());
    let state = CutoverState::from_label(value.as_deref());
    if value.is_some() && state.is_none() {
        warn!(
            label = HIJACK_DNS_LABEL,
            value = ?value,
            "Ignoring unrecognised cutover label value"
        );
    }
    state
}

/// Build the `Service` with the cutover label derived from readiness and the
/// label on the stored object.
///
/// # Errors
///
/// Returns an error if the `ExternalService` is missing its name or uid.
pub fn desired_service(
    es: &ExternalService,
    config: &OperatorConfig,
    ready: bool,
    stored: Option<&Service>,
) -> Result<Service, crate::errors::ConfigError> {
    let previous = previous_state(stored);
    let state = next_state(es.spec.hijack_dns, ready, previous);
    if previous != Some(state) {
        info!(
            name = %es.name_any(),
            from = ?previous,
            to = %state,
            "Cutover state changing"
        );
    }
    build_service(es, config, state)
}

/// The `ExternalService` owning a generated object.
///
/// Used to map child events back to their parent. `ExternalService` is
/// cluster-scoped, so the reference carries no namespace.
pub fn owning_external_service<K: Resource>(object: K) -> Option<ObjectRef<ExternalService>> {
    object
        .meta()
        .owner_references
        .as_ref()?
        .iter()
        .find(|owner| owner.kind == KIND_EXTERNAL_SERVICE && owner.api_version == API_GROUP_VERSION)
        .map(|owner| ObjectRef::new(&owner.name))
}

#[cfg(test)]
#[path = "externalservice_tests.rs"]
mod externalservice_tests;
