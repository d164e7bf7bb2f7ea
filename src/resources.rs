// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Egress gateway Kubernetes resource builders
//!
//! This module builds the objects generated for each `ExternalService`
//! (`ConfigMap`, `Deployment`, `Service`, `HorizontalPodAutoscaler`,
//! `NetworkPolicy`, `PodDisruptionBudget`). All functions are pure and easily
//! testable; writing them to the cluster is the reconcilers' job.

use crate::config::OperatorConfig;
use crate::constants::{
    API_GROUP_VERSION, CONFIG_VOLUME_MODE, CONTAINER_NAME_GATEWAY, ENVOY_CONFIG_KEY,
    ENVOY_CONFIG_MOUNT_PATH, KIND_EXTERNAL_SERVICE, PDB_MAX_UNAVAILABLE, PRE_STOP_SLEEP_SECS,
    PROGRESS_DEADLINE_SECS, READINESS_FAILURE_THRESHOLD, READINESS_PATH, READINESS_PERIOD_SECS,
    READINESS_TIMEOUT_SECS, REVISION_HISTORY_LIMIT, TERMINATION_GRACE_PERIOD_SECS,
    VOLUME_ENVOY_CONFIG,
};
use crate::crd::ExternalService;
use crate::cutover::CutoverState;
use crate::envoy::CompiledConfig;
use crate::errors::ConfigError;
use crate::labels::{
    ADMIN_PORT_ANNOTATION, ALLOWED_LABEL_PREFIX, APP_EGRESS_GATEWAY, APP_LABEL,
    CONFIG_HASH_ANNOTATION, DNS_NAME_ANNOTATION, GATEWAY_LABEL, HIJACK_DNS_LABEL,
    TOPOLOGY_MODE_ANNOTATION, TOPOLOGY_MODE_AUTO,
};
use k8s_openapi::api::{
    apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment},
    autoscaling::v1::{
        CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
    },
    core::v1::{
        ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, ExecAction,
        HTTPGetAction, Lifecycle, LifecycleHandler, PodSecurityContext, PodSpec, PodTemplateSpec,
        Probe, Service, ServicePort, ServiceSpec, Toleration, TopologySpreadConstraint, Volume,
        VolumeMount,
    },
    networking::v1::NetworkPolicy,
    policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec},
};
use k8s_openapi::apimachinery::pkg::{
    apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference},
    util::intstr::IntOrString,
};
use kube::ResourceExt;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// Labels shared by every generated object.
///
/// `app=egress-gateway` marks fleet membership for the DNS plane and
/// `egress.monzo.com/gateway` names the owning `ExternalService`.
#[must_use]
pub fn build_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), APP_EGRESS_GATEWAY.to_string()),
        (GATEWAY_LABEL.to_string(), name.to_string()),
    ])
}

/// Labels used to select gateway pods.
#[must_use]
pub fn build_selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(GATEWAY_LABEL.to_string(), name.to_string())])
}

/// Annotations shared by every generated object.
#[must_use]
pub fn build_annotations(es: &ExternalService, config: &OperatorConfig) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::from([(
        DNS_NAME_ANNOTATION.to_string(),
        es.spec.dns_name.clone(),
    )]);

    if config.enable_service_topology_mode {
        let mode = es
            .spec
            .service_topology_mode
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(TOPOLOGY_MODE_AUTO);
        annotations.insert(TOPOLOGY_MODE_ANNOTATION.to_string(), mode.to_string());
    }

    annotations
}

/// Builds owner references pointing at the `ExternalService`.
///
/// Children are garbage collected by Kubernetes when the `ExternalService` is deleted.
///
/// # Errors
///
/// Returns [`ConfigError::MissingMetadata`] if the object has no name or uid
/// (it was never persisted).
pub fn build_owner_references(es: &ExternalService) -> Result<Vec<OwnerReference>, ConfigError> {
    let name = es
        .metadata
        .name
        .clone()
        .ok_or(ConfigError::MissingMetadata { field: "name" })?;
    let uid = es
        .metadata
        .uid
        .clone()
        .ok_or(ConfigError::MissingMetadata { field: "uid" })?;

    Ok(vec![OwnerReference {
        api_version: API_GROUP_VERSION.to_string(),
        kind: KIND_EXTERNAL_SERVICE.to_string(),
        name,
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    }])
}

fn build_metadata(
    es: &ExternalService,
    config: &OperatorConfig,
) -> Result<ObjectMeta, ConfigError> {
    Ok(ObjectMeta {
        name: Some(es.name_any()),
        namespace: Some(config.namespace.clone()),
        labels: Some(build_labels(&es.name_any())),
        annotations: Some(build_annotations(es, config)),
        owner_references: Some(build_owner_references(es)?),
        ..Default::default()
    })
}

/// Builds the `ConfigMap` carrying the Envoy bootstrap document.
///
/// # Errors
///
/// Returns an error if the `ExternalService` is missing its name or uid.
pub fn build_configmap(
    es: &ExternalService,
    config: &OperatorConfig,
    compiled: &CompiledConfig,
) -> Result<ConfigMap, ConfigError> {
    Ok(ConfigMap {
        metadata: build_metadata(es, config)?,
        data: Some(BTreeMap::from([(
            ENVOY_CONFIG_KEY.to_string(),
            compiled.document.clone(),
        )])),
        ..Default::default()
    })
}

/// Builds the gateway `Deployment`.
///
/// The pod template carries the bootstrap hash and admin port as annotations,
/// so a config change rolls the pods even though the `ConfigMap` name is stable.
/// `spec.replicas` is left unset; the autoscaler owns it.
///
/// # Errors
///
/// Returns an error if the `ExternalService` is missing its name or uid.
pub fn build_deployment(
    es: &ExternalService,
    config: &OperatorConfig,
    compiled: &CompiledConfig,
) -> Result<Deployment, ConfigError> {
    let name = es.name_any();
    debug!(
        name = %name,
        namespace = %config.namespace,
        admin_port = compiled.admin_port,
        "Building Deployment for ExternalService"
    );

    let mut pod_annotations = build_annotations(es, config);
    pod_annotations.insert(CONFIG_HASH_ANNOTATION.to_string(), compiled.hash.clone());
    pod_annotations.insert(
        ADMIN_PORT_ANNOTATION.to_string(),
        compiled.admin_port.to_string(),
    );

    let selector = LabelSelector {
        match_labels: Some(build_selector_labels(&name)),
        ..Default::default()
    };

    Ok(Deployment {
        metadata: build_metadata(es, config)?,
        spec: Some(DeploymentSpec {
            progress_deadline_seconds: Some(PROGRESS_DEADLINE_SECS),
            revision_history_limit: Some(REVISION_HISTORY_LIMIT),
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".into()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_unavailable: Some(IntOrString::String(
                        config.rolling_update_max_unavailable.clone(),
                    )),
                    max_surge: Some(IntOrString::String(config.rolling_update_max_surge.clone())),
                }),
            }),
            selector: selector.clone(),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(build_labels(&name)),
                    annotations: Some(pod_annotations),
                    ..Default::default()
                }),
                spec: Some(build_pod_spec(es, config, compiled.admin_port, &selector)),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn build_pod_spec(
    es: &ExternalService,
    config: &OperatorConfig,
    admin_port: u16,
    selector: &LabelSelector,
) -> PodSpec {
    let args = es.spec.envoy_log_level.as_ref().map(|level| {
        vec![
            "-c".to_string(),
            format!("{ENVOY_CONFIG_MOUNT_PATH}/{ENVOY_CONFIG_KEY}"),
            "--log-level".to_string(),
            level.clone(),
        ]
    });

    let ports = es
        .spec
        .ports
        .iter()
        .map(|p| ContainerPort {
            container_port: p.port,
            protocol: Some(p.protocol().as_str().into()),
            ..Default::default()
        })
        .collect();

    let gateway = Container {
        name: CONTAINER_NAME_GATEWAY.into(),
        image: Some(config.envoy_image.clone()),
        image_pull_policy: Some("IfNotPresent".into()),
        args,
        ports: Some(ports),
        volume_mounts: Some(vec![VolumeMount {
            name: VOLUME_ENVOY_CONFIG.into(),
            mount_path: ENVOY_CONFIG_MOUNT_PATH.into(),
            ..Default::default()
        }]),
        // Envoy does not drain outbound listeners; give open connections time to close
        lifecycle: Some(Lifecycle {
            pre_stop: Some(LifecycleHandler {
                exec: Some(ExecAction {
                    command: Some(vec!["/bin/sleep".into(), PRE_STOP_SLEEP_SECS.to_string()]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        termination_message_path: Some("/dev/termination-log".into()),
        termination_message_policy: Some("File".into()),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some(READINESS_PATH.into()),
                port: IntOrString::Int(i32::from(admin_port)),
                scheme: Some("HTTP".into()),
                ..Default::default()
            }),
            failure_threshold: Some(READINESS_FAILURE_THRESHOLD),
            period_seconds: Some(READINESS_PERIOD_SECS),
            success_threshold: Some(1),
            timeout_seconds: Some(READINESS_TIMEOUT_SECS),
            ..Default::default()
        }),
        resources: Some(es.spec.resources()),
        env: Some(vec![EnvVar {
            name: "ENVOY_UID".into(),
            value: Some("0".into()),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let tolerations = config.taint_toleration.as_ref().map(|t| {
        vec![Toleration {
            key: Some(t.key.clone()),
            value: Some(t.value.clone()),
            effect: Some("NoSchedule".into()),
            ..Default::default()
        }]
    });

    let node_selector = config
        .node_selector
        .as_ref()
        .map(|(k, v)| BTreeMap::from([(k.clone(), v.clone())]));

    let topology_spread_constraints = (!config.topology_spread.is_empty()).then(|| {
        config
            .topology_spread
            .iter()
            .map(|c| TopologySpreadConstraint {
                topology_key: c.topology_key.clone(),
                max_skew: c.max_skew,
                when_unsatisfiable: "ScheduleAnyway".into(),
                label_selector: Some(selector.clone()),
                ..Default::default()
            })
            .collect()
    });

    PodSpec {
        containers: vec![gateway],
        tolerations,
        node_selector,
        topology_spread_constraints,
        restart_policy: Some("Always".into()),
        scheduler_name: Some("default-scheduler".into()),
        security_context: Some(PodSecurityContext::default()),
        termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD_SECS),
        dns_policy: Some("Default".into()),
        volumes: Some(vec![Volume {
            name: VOLUME_ENVOY_CONFIG.into(),
            config_map: Some(ConfigMapVolumeSource {
                name: es.name_any(),
                default_mode: Some(CONFIG_VOLUME_MODE),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// Builds the gateway `Service` (the routing object) with its cutover label.
///
/// # Errors
///
/// Returns an error if the `ExternalService` is missing its name or uid.
pub fn build_service(
    es: &ExternalService,
    config: &OperatorConfig,
    state: CutoverState,
) -> Result<Service, ConfigError> {
    let name = es.name_any();
    let mut metadata = build_metadata(es, config)?;
    metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert(HIJACK_DNS_LABEL.to_string(), state.as_label().to_string());

    let ports = es
        .spec
        .ports
        .iter()
        .map(|p| ServicePort {
            name: Some(format!(
                "{}-{}-{}",
                name,
                p.protocol().as_str().to_lowercase(),
                p.port
            )),
            protocol: Some(p.protocol().as_str().into()),
            port: p.port,
            target_port: Some(IntOrString::Int(p.port)),
            ..Default::default()
        })
        .collect();

    Ok(Service {
        metadata,
        spec: Some(ServiceSpec {
            selector: Some(build_selector_labels(&name)),
            ports: Some(ports),
            session_affinity: Some("None".into()),
            type_: Some("ClusterIP".into()),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Builds the `HorizontalPodAutoscaler` scaling the gateway `Deployment` on CPU.
///
/// # Errors
///
/// Returns an error if the `ExternalService` is missing its name or uid.
pub fn build_autoscaler(
    es: &ExternalService,
    config: &OperatorConfig,
) -> Result<HorizontalPodAutoscaler, ConfigError> {
    Ok(HorizontalPodAutoscaler {
        metadata: build_metadata(es, config)?,
        spec: Some(HorizontalPodAutoscalerSpec {
            min_replicas: Some(es.spec.min_replicas()),
            max_replicas: es.spec.max_replicas(),
            target_cpu_utilization_percentage: Some(es.spec.target_cpu_utilization()),
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".into()),
                kind: "Deployment".into(),
                name: es.name_any(),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Builds the ingress `NetworkPolicy` for the gateway pods.
///
/// Pods in any namespace labelled `egress.monzo.com/allowed-<name>=true` may
/// reach the gateway ports; everything else is denied.
///
/// # Errors
///
/// Returns an error if the `ExternalService` is missing its name or uid, or the
/// policy cannot be assembled.
pub fn build_network_policy(
    es: &ExternalService,
    config: &OperatorConfig,
) -> Result<NetworkPolicy, ConfigError> {
    let name = es.name_any();
    let metadata = build_metadata(es, config)?;

    let ports: Vec<_> = es
        .spec
        .ports
        .iter()
        .map(|p| json!({"protocol": p.protocol().as_str(), "port": p.port}))
        .collect();

    let allowed = BTreeMap::from([(format!("{ALLOWED_LABEL_PREFIX}{name}"), "true")]);
    let spec = json!({
        "podSelector": {"matchLabels": build_selector_labels(&name)},
        "policyTypes": ["Ingress"],
        "ingress": [{
            "ports": ports,
            "from": [{
                "namespaceSelector": {},
                "podSelector": {"matchLabels": allowed}
            }]
        }]
    });

    let mut policy: NetworkPolicy = serde_json::from_value(json!({ "spec": spec })).map_err(
        |e| ConfigError::Serialization {
            name: name.clone(),
            reason: e.to_string(),
        },
    )?;
    policy.metadata = metadata;
    Ok(policy)
}

/// Builds the `PodDisruptionBudget` for the gateway pods.
///
/// # Errors
///
/// Returns an error if the `ExternalService` is missing its name or uid.
pub fn build_pod_disruption_budget(
    es: &ExternalService,
    config: &OperatorConfig,
) -> Result<PodDisruptionBudget, ConfigError> {
    Ok(PodDisruptionBudget {
        metadata: build_metadata(es, config)?,
        spec: Some(PodDisruptionBudgetSpec {
            max_unavailable: Some(IntOrString::String(PDB_MAX_UNAVAILABLE.into())),
            selector: Some(LabelSelector {
                match_labels: Some(build_labels(&es.name_any())),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
