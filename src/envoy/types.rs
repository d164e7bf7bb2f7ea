// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Envoy v3 bootstrap document model.
//!
//! Only the subset of the bootstrap schema the gateways use is modelled. Field
//! names serialize to the camelCase JSON form Envoy accepts in YAML, and
//! optional fields are omitted when unset.

use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bootstrap {
    pub node: Node,
    pub admin: Admin,
    pub static_resources: StaticResources,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Node {
    pub cluster: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub address: Address,
    pub access_log: Vec<AccessLog>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StaticResources {
    pub clusters: Vec<Cluster>,
    pub listeners: Vec<Listener>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SocketProtocol {
    Tcp,
    Udp,
}

impl From<crate::crd::Protocol> for SocketProtocol {
    fn from(protocol: crate::crd::Protocol) -> Self {
        match protocol {
            crate::crd::Protocol::Tcp => SocketProtocol::Tcp,
            crate::crd::Protocol::Udp => SocketProtocol::Udp,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub socket_address: SocketAddress,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketAddress {
    pub address: String,
    pub port_value: u32,
    pub protocol: SocketProtocol,
}

impl Address {
    #[must_use]
    pub fn socket(address: impl Into<String>, port_value: u32, protocol: SocketProtocol) -> Self {
        Self {
            socket_address: SocketAddress {
                address: address.into(),
                port_value,
                protocol,
            },
        }
    }
}

/// A typed extension config, serialized as `{"@type": ..., <fields>}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TypedConfig<T> {
    #[serde(rename = "@type")]
    pub type_url: &'static str,
    #[serde(flatten)]
    pub config: T,
}

// ============================================================================
// Access logs
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLog {
    pub name: &'static str,
    pub typed_config: TypedConfig<StdoutAccessLog>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StdoutAccessLog {
    pub log_format: SubstitutionFormatString,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstitutionFormatString {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_format_source: Option<DataSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_format: Option<std::collections::BTreeMap<&'static str, &'static str>>,
    pub omit_empty_values: bool,
    pub content_type: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub inline_string: String,
}

// ============================================================================
// Clusters
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryType {
    Static,
    LogicalDns,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LbPolicy {
    RoundRobin,
    ClusterProvided,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DnsLookupFamily {
    V4Only,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub discovery_type: Option<DiscoveryType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_type: Option<CustomClusterType>,
    pub connect_timeout: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lb_policy: Option<LbPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_lookup_family: Option<DnsLookupFamily>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_connection_options: Option<UpstreamConnectionOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_refresh_rate: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub respect_dns_ttl: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub close_connections_on_host_health_failure: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub health_checks: Vec<HealthCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_assignment: Option<ClusterLoadAssignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breakers: Option<CircuitBreakers>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomClusterType {
    pub name: &'static str,
    pub typed_config: TypedConfig<AggregateClusterConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AggregateClusterConfig {
    pub clusters: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamConnectionOptions {
    pub tcp_keepalive: TcpKeepalive,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpKeepalive {
    pub keepalive_probes: u32,
    pub keepalive_time: u32,
    pub keepalive_interval: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub timeout: &'static str,
    pub interval: &'static str,
    pub reuse_connection: bool,
    pub unhealthy_threshold: u32,
    pub healthy_threshold: u32,
    pub event_log_path: &'static str,
    pub tcp_health_check: EmptyConfig,
}

/// Serializes as `{}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EmptyConfig {}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterLoadAssignment {
    pub cluster_name: String,
    pub endpoints: Vec<LocalityLbEndpoints>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalityLbEndpoints {
    pub lb_endpoints: Vec<LbEndpoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LbEndpoint {
    pub endpoint: Endpoint,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_config: Option<HealthCheckConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckConfig {
    pub port_value: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CircuitBreakers {
    pub thresholds: Vec<Thresholds>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub max_connections: u32,
}

// ============================================================================
// Listeners
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub name: String,
    pub address: Address,
    pub filter_chains: Vec<FilterChain>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilterChain {
    pub filters: Vec<Filter>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub name: &'static str,
    pub typed_config: TypedConfig<ProxyConfig>,
}

/// Shared shape of the TCP and UDP proxy filter configs.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub stat_prefix: &'static str,
    pub cluster: String,
    pub access_log: Vec<AccessLog>,
}
