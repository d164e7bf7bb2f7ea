// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for egress gateways.
//!
//! An [`ExternalService`] declares one external, DNS-addressed service that
//! in-cluster workloads should reach through a fleet of Envoy gateways. Every
//! generated object (bootstrap `ConfigMap`, `Deployment`, `Service`, autoscaler,
//! `NetworkPolicy`, optional `PodDisruptionBudget`) is derived from it.
//!
//! # Example
//!
//! ```rust,no_run
//! use egress_operator::crd::{ExternalServicePort, ExternalServiceSpec, Protocol};
//!
//! let spec = ExternalServiceSpec {
//!     dns_name: "api.github.com".to_string(),
//!     ports: vec![ExternalServicePort {
//!         port: 443,
//!         protocol: Some(Protocol::Tcp),
//!     }],
//!     hijack_dns: true,
//!     ..Default::default()
//! };
//! ```

use crate::constants::{
    DEFAULT_CPU_LIMIT, DEFAULT_CPU_REQUEST, DEFAULT_MAX_REPLICAS, DEFAULT_MEMORY_LIMIT,
    DEFAULT_MEMORY_REQUEST, DEFAULT_MIN_REPLICAS, DEFAULT_TARGET_CPU_UTILIZATION,
};
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Transport protocol of a gateway port.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    /// Upper-case wire name, as used in cluster names and Kubernetes port specs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A port on which the external service may be called.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalServicePort {
    /// The port on the given protocol.
    #[schemars(range(min = 1, max = 65535))]
    pub port: i32,

    /// The protocol (TCP or UDP) which traffic must match. Defaults to TCP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

impl ExternalServicePort {
    /// Effective protocol, defaulting to TCP.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.protocol.unwrap_or_default()
    }
}

/// `ExternalService` fronts an external DNS name with a fleet of Envoy gateways.
///
/// # Example
///
/// ```yaml
/// apiVersion: egress.monzo.com/v1
/// kind: ExternalService
/// metadata:
///   name: github
/// spec:
///   dnsName: github.com
///   hijackDns: true
///   ports:
///     - port: 443
///     - port: 53
///       protocol: UDP
///   ipOverride:
///     - 140.82.121.4
/// ```
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "egress.monzo.com",
    version = "v1",
    kind = "ExternalService",
    shortname = "es",
    doc = "ExternalService routes traffic for an external DNS name through a fleet of in-cluster Envoy gateways, optionally hijacking DNS so clients reach the gateway transparently."
)]
#[kube(status = "ExternalServiceStatus")]
#[serde(rename_all = "camelCase")]
pub struct ExternalServiceSpec {
    /// DNS name of the external service.
    pub dns_name: String,

    /// Ports on which the external service may be called.
    #[serde(default)]
    pub ports: Vec<ExternalServicePort>,

    /// Minimum number of gateways to run. Defaults to 3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,

    /// Maximum number of gateways to run, enforced by the autoscaler. Defaults to 12.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,

    /// Target average CPU utilization over all gateways, as a percentage of request. Defaults to 50.
    #[serde(
        default,
        rename = "targetCPUUtilizationPercentage",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_cpu_utilization_percentage: Option<i32>,

    /// Compute resources for gateway pods. Defaults to 100m/50Mi requests and 2/1Gi limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Label the gateway `Service` so the DNS plane rewrites `dnsName` to it.
    #[serde(default)]
    pub hijack_dns: bool,

    /// Static addresses used before falling back to live DNS resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_override: Option<Vec<String>>,

    /// Maximum connections Envoy opens to all hosts of an upstream cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envoy_cluster_max_connections: Option<u32>,

    /// Value for Envoy's `--log-level` flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envoy_log_level: Option<String>,

    /// Envoy `dns_refresh_rate` for the upstream cluster, in seconds. Zero leaves it unset.
    #[serde(default)]
    pub envoy_dns_refresh_rate_s: i64,

    /// Envoy `respect_dns_ttl` for the upstream cluster.
    #[serde(default, rename = "envoyRespectDnsTTL")]
    pub envoy_respect_dns_ttl: bool,

    /// Overrides the global default topology-aware routing mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_topology_mode: Option<String>,

    /// Emit admin access logs as JSON instead of a text line.
    #[serde(default)]
    pub envoy_json_admin_access_logs: bool,

    /// Emit cluster access logs as JSON instead of a text line.
    #[serde(default)]
    pub envoy_json_cluster_access_logs: bool,
}

/// Observed state of an `ExternalService`. Not written by the operator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExternalServiceStatus {}

impl ExternalServiceSpec {
    #[must_use]
    pub fn min_replicas(&self) -> i32 {
        self.min_replicas.unwrap_or(DEFAULT_MIN_REPLICAS)
    }

    #[must_use]
    pub fn max_replicas(&self) -> i32 {
        self.max_replicas.unwrap_or(DEFAULT_MAX_REPLICAS)
    }

    #[must_use]
    pub fn target_cpu_utilization(&self) -> i32 {
        self.target_cpu_utilization_percentage
            .unwrap_or(DEFAULT_TARGET_CPU_UTILIZATION)
    }

    /// Gateway compute resources, falling back to the default requests and limits.
    #[must_use]
    pub fn resources(&self) -> ResourceRequirements {
        if let Some(resources) = &self.resources {
            return resources.clone();
        }

        let list = |cpu: &str, memory: &str| {
            BTreeMap::from([
                ("cpu".to_string(), Quantity(cpu.to_string())),
                ("memory".to_string(), Quantity(memory.to_string())),
            ])
        };

        ResourceRequirements {
            requests: Some(list(DEFAULT_CPU_REQUEST, DEFAULT_MEMORY_REQUEST)),
            limits: Some(list(DEFAULT_CPU_LIMIT, DEFAULT_MEMORY_LIMIT)),
            ..Default::default()
        }
    }

    /// Static override addresses, empty when unset.
    #[must_use]
    pub fn ip_overrides(&self) -> &[String] {
        self.ip_override.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
