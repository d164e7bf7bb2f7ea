// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Compiles an `ExternalService` into an Envoy bootstrap document.
//!
//! Each port entry yields one listener and one `LOGICAL_DNS` cluster. When
//! static IP overrides are set, each port also gets a health-checked `STATIC`
//! override cluster and an aggregate cluster that prefers the override before
//! falling back to live DNS; the listener then targets the aggregate.
//!
//! The document is serialized through a `serde_json::Value`, whose maps are
//! key-sorted, so identical input always yields byte-identical YAML.

use super::access_log::{stdout_access_log, LogKind};
use super::ports::allocate_admin_port;
use super::types::{
    AccessLog, Address, Admin, AggregateClusterConfig, Bootstrap, CircuitBreakers, Cluster,
    ClusterLoadAssignment, CustomClusterType, DiscoveryType, DnsLookupFamily, EmptyConfig,
    Endpoint, Filter, FilterChain, HealthCheck, HealthCheckConfig, LbEndpoint, LbPolicy, Listener,
    LocalityLbEndpoints, Node, ProxyConfig, SocketProtocol, StaticResources, TcpKeepalive,
    Thresholds, TypedConfig, UpstreamConnectionOptions,
};
use crate::constants::{
    CLUSTER_CONNECT_TIMEOUT, HEALTH_CHECK_HEALTHY_THRESHOLD, HEALTH_CHECK_INTERVAL,
    HEALTH_CHECK_TIMEOUT, HEALTH_CHECK_UNHEALTHY_THRESHOLD, LISTEN_ADDRESS, TCP_KEEPALIVE_INTERVAL_SECS,
    TCP_KEEPALIVE_PROBES, TCP_KEEPALIVE_TIME_SECS,
};
use crate::crd::{ExternalServicePort, ExternalServiceSpec, Protocol};
use crate::errors::ConfigError;
use sha2::{Digest, Sha256};
use tracing::debug;

const TCP_PROXY_FILTER: &str = "envoy.tcp_proxy";
const TCP_PROXY_TYPE: &str = "type.googleapis.com/envoy.extensions.filters.network.tcp_proxy.v3.TcpProxy";
const UDP_PROXY_FILTER: &str = "envoy.filters.udp_listener.udp_proxy";
const UDP_PROXY_TYPE: &str =
    "type.googleapis.com/envoy.extensions.filters.udp.udp_proxy.v3.UdpProxyConfig";
const AGGREGATE_CLUSTER: &str = "envoy.clusters.aggregate";
const AGGREGATE_CLUSTER_TYPE: &str =
    "type.googleapis.com/envoy.extensions.clusters.aggregate.v3.ClusterConfig";
const HEALTH_CHECK_EVENT_LOG: &str = "/dev/stdout";

/// Result of compiling one `ExternalService`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledConfig {
    /// Port the Envoy admin interface listens on
    pub admin_port: u16,
    /// Bootstrap document in YAML form
    pub document: String,
    /// SHA-256 of `document`, hex encoded
    pub hash: String,
}

/// Canonical cluster and listener name for a port: `{name}_{PROTOCOL}_{port}`.
#[must_use]
pub fn cluster_name(name: &str, port: &ExternalServicePort) -> String {
    format!("{}_{}_{}", name, port.protocol(), port.port)
}

/// Compile an `ExternalService` spec into a serialized bootstrap document and its content hash.
///
/// # Errors
///
/// Fails when no admin port is free or the document cannot be serialized.
pub fn compile(name: &str, spec: &ExternalServiceSpec) -> Result<CompiledConfig, ConfigError> {
    let admin_port = allocate_admin_port(name, &spec.ports)?;
    let bootstrap = build_bootstrap(name, spec, admin_port);
    let document = render(name, &bootstrap)?;
    let hash = config_hash(&document);

    debug!(
        name = %name,
        admin_port = admin_port,
        clusters = bootstrap.static_resources.clusters.len(),
        listeners = bootstrap.static_resources.listeners.len(),
        hash = %hash,
        "Compiled Envoy bootstrap"
    );

    Ok(CompiledConfig {
        admin_port,
        document,
        hash,
    })
}

/// Build the bootstrap model for `spec` with the given admin port.
#[must_use]
pub fn build_bootstrap(name: &str, spec: &ExternalServiceSpec, admin_port: u16) -> Bootstrap {
    let cluster_log = stdout_access_log(LogKind::Cluster, spec.envoy_json_cluster_access_logs);

    let mut static_resources = StaticResources::default();
    for port in &spec.ports {
        let (clusters, listener) = build_port(name, spec, port, &cluster_log);
        static_resources.clusters.extend(clusters);
        static_resources.listeners.push(listener);
    }

    Bootstrap {
        node: Node {
            cluster: name.to_string(),
        },
        admin: Admin {
            address: Address::socket(LISTEN_ADDRESS, u32::from(admin_port), SocketProtocol::Tcp),
            access_log: stdout_access_log(LogKind::Admin, spec.envoy_json_admin_access_logs),
        },
        static_resources,
    }
}

/// Serialize the bootstrap to YAML with keys in sorted order.
///
/// # Errors
///
/// Returns [`ConfigError::Serialization`] if either serializer fails.
pub fn render(name: &str, bootstrap: &Bootstrap) -> Result<String, ConfigError> {
    let to_error = |reason: String| ConfigError::Serialization {
        name: name.to_string(),
        reason,
    };
    let value = serde_json::to_value(bootstrap).map_err(|e| to_error(e.to_string()))?;
    serde_yaml::to_string(&value).map_err(|e| to_error(e.to_string()))
}

/// Hex-encoded SHA-256 of a rendered document.
#[must_use]
pub fn config_hash(document: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Clusters (in priority order) and the listener for one port entry.
fn build_port(
    name: &str,
    spec: &ExternalServiceSpec,
    port: &ExternalServicePort,
    cluster_log: &[AccessLog],
) -> (Vec<Cluster>, Listener) {
    let protocol = SocketProtocol::from(port.protocol());
    let dynamic_name = cluster_name(name, port);
    // Port numbers are schema-bounded to 1..=65535
    let port_value = u32::try_from(port.port).unwrap_or_default();

    let mut clusters = vec![dynamic_cluster(&dynamic_name, spec, port_value, protocol)];
    let mut listener_target = dynamic_name.clone();

    if !spec.ip_overrides().is_empty() {
        let override_cluster = override_cluster(&dynamic_name, spec, port_value, protocol);
        let aggregate = aggregate_cluster(
            &format!("{dynamic_name}-aggregate"),
            vec![override_cluster.name.clone(), dynamic_name.clone()],
        );
        listener_target = aggregate.name.clone();
        clusters.insert(0, override_cluster);
        clusters.insert(0, aggregate);
    }

    if let Some(max_connections) = spec.envoy_cluster_max_connections {
        let breakers = CircuitBreakers {
            thresholds: vec![Thresholds { max_connections }],
        };
        for cluster in &mut clusters {
            cluster.circuit_breakers = Some(breakers.clone());
        }
    }

    let (filter_name, type_url, stat_prefix) = match port.protocol() {
        Protocol::Tcp => (TCP_PROXY_FILTER, TCP_PROXY_TYPE, "tcp_proxy"),
        Protocol::Udp => (UDP_PROXY_FILTER, UDP_PROXY_TYPE, "udp_proxy"),
    };

    let listener = Listener {
        name: dynamic_name,
        address: Address::socket(LISTEN_ADDRESS, port_value, protocol),
        filter_chains: vec![FilterChain {
            filters: vec![Filter {
                name: filter_name,
                typed_config: TypedConfig {
                    type_url,
                    config: ProxyConfig {
                        stat_prefix,
                        cluster: listener_target,
                        access_log: cluster_log.to_vec(),
                    },
                },
            }],
        }],
    };

    (clusters, listener)
}

fn dns_refresh_rate(spec: &ExternalServiceSpec) -> Option<String> {
    (spec.envoy_dns_refresh_rate_s != 0).then(|| format!("{}s", spec.envoy_dns_refresh_rate_s))
}

fn dynamic_cluster(
    name: &str,
    spec: &ExternalServiceSpec,
    port_value: u32,
    protocol: SocketProtocol,
) -> Cluster {
    Cluster {
        name: name.to_string(),
        discovery_type: Some(DiscoveryType::LogicalDns),
        connect_timeout: CLUSTER_CONNECT_TIMEOUT,
        lb_policy: Some(LbPolicy::RoundRobin),
        dns_lookup_family: Some(DnsLookupFamily::V4Only),
        upstream_connection_options: Some(UpstreamConnectionOptions {
            tcp_keepalive: TcpKeepalive {
                keepalive_probes: TCP_KEEPALIVE_PROBES,
                keepalive_time: TCP_KEEPALIVE_TIME_SECS,
                keepalive_interval: TCP_KEEPALIVE_INTERVAL_SECS,
            },
        }),
        dns_refresh_rate: dns_refresh_rate(spec),
        respect_dns_ttl: spec.envoy_respect_dns_ttl,
        load_assignment: Some(ClusterLoadAssignment {
            cluster_name: name.to_string(),
            endpoints: vec![LocalityLbEndpoints {
                lb_endpoints: vec![LbEndpoint {
                    endpoint: Endpoint {
                        address: Address::socket(spec.dns_name.as_str(), port_value, protocol),
                        health_check_config: None,
                    },
                }],
            }],
        }),
        ..Default::default()
    }
}

fn override_cluster(
    dynamic_name: &str,
    spec: &ExternalServiceSpec,
    port_value: u32,
    protocol: SocketProtocol,
) -> Cluster {
    let name = format!("{dynamic_name}-override");
    let endpoints = spec
        .ip_overrides()
        .iter()
        .map(|ip| LocalityLbEndpoints {
            lb_endpoints: vec![LbEndpoint {
                endpoint: Endpoint {
                    address: Address::socket(ip.as_str(), port_value, protocol),
                    health_check_config: Some(HealthCheckConfig { port_value }),
                },
            }],
        })
        .collect();

    Cluster {
        discovery_type: Some(DiscoveryType::Static),
        connect_timeout: CLUSTER_CONNECT_TIMEOUT,
        close_connections_on_host_health_failure: true,
        health_checks: vec![HealthCheck {
            timeout: HEALTH_CHECK_TIMEOUT,
            interval: HEALTH_CHECK_INTERVAL,
            reuse_connection: false,
            unhealthy_threshold: HEALTH_CHECK_UNHEALTHY_THRESHOLD,
            healthy_threshold: HEALTH_CHECK_HEALTHY_THRESHOLD,
            event_log_path: HEALTH_CHECK_EVENT_LOG,
            tcp_health_check: EmptyConfig::default(),
        }],
        lb_policy: Some(LbPolicy::RoundRobin),
        dns_lookup_family: Some(DnsLookupFamily::V4Only),
        load_assignment: Some(ClusterLoadAssignment {
            cluster_name: name.clone(),
            endpoints,
        }),
        dns_refresh_rate: dns_refresh_rate(spec),
        respect_dns_ttl: spec.envoy_respect_dns_ttl,
        name,
        ..Default::default()
    }
}

fn aggregate_cluster(name: &str, priority: Vec<String>) -> Cluster {
    Cluster {
        name: name.to_string(),
        connect_timeout: CLUSTER_CONNECT_TIMEOUT,
        lb_policy: Some(LbPolicy::ClusterProvided),
        cluster_type: Some(CustomClusterType {
            name: AGGREGATE_CLUSTER,
            typed_config: TypedConfig {
                type_url: AGGREGATE_CLUSTER_TYPE,
                config: AggregateClusterConfig { clusters: priority },
            },
        }),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "compiler_tests.rs"]
mod compiler_tests;
