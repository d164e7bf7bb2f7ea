// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the egress operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the `ExternalService` CRD
pub const API_GROUP: &str = "egress.monzo.com";

/// API version for the `ExternalService` CRD
pub const API_VERSION: &str = "v1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "egress.monzo.com/v1";

/// Kind name for `ExternalService` resource
pub const KIND_EXTERNAL_SERVICE: &str = "ExternalService";

/// Field manager recorded on writes made by the controller
pub const FIELD_MANAGER: &str = "egress-operator";

/// Namespace that holds every generated gateway object unless overridden
pub const DEFAULT_NAMESPACE: &str = "egress-operator-system";

// ============================================================================
// Spec Defaults
// ============================================================================

/// Default minimum gateway replicas
pub const DEFAULT_MIN_REPLICAS: i32 = 3;

/// Default maximum gateway replicas
pub const DEFAULT_MAX_REPLICAS: i32 = 12;

/// Default autoscaler CPU utilization target (percent of request)
pub const DEFAULT_TARGET_CPU_UTILIZATION: i32 = 50;

/// Default gateway CPU request
pub const DEFAULT_CPU_REQUEST: &str = "100m";

/// Default gateway memory request
pub const DEFAULT_MEMORY_REQUEST: &str = "50Mi";

/// Default gateway CPU limit
pub const DEFAULT_CPU_LIMIT: &str = "2";

/// Default gateway memory limit
pub const DEFAULT_MEMORY_LIMIT: &str = "1Gi";

// ============================================================================
// Envoy Bootstrap Constants
// ============================================================================

/// First candidate for the Envoy admin listener port (inclusive)
pub const ADMIN_PORT_RANGE_START: u16 = 11000;

/// End of the admin listener port range (exclusive)
pub const ADMIN_PORT_RANGE_END: u16 = 32768;

/// Address every listener and the admin interface bind to
pub const LISTEN_ADDRESS: &str = "0.0.0.0";

/// Upstream connect timeout for every generated cluster
pub const CLUSTER_CONNECT_TIMEOUT: &str = "1s";

/// TCP keepalive probe count on upstream connections
pub const TCP_KEEPALIVE_PROBES: u32 = 3;

/// TCP keepalive idle time (seconds)
pub const TCP_KEEPALIVE_TIME_SECS: u32 = 30;

/// TCP keepalive probe interval (seconds)
pub const TCP_KEEPALIVE_INTERVAL_SECS: u32 = 5;

/// Override cluster health check timeout
pub const HEALTH_CHECK_TIMEOUT: &str = "1s";

/// Override cluster health check interval
pub const HEALTH_CHECK_INTERVAL: &str = "10s";

/// Consecutive failures before an override host is marked unhealthy
pub const HEALTH_CHECK_UNHEALTHY_THRESHOLD: u32 = 2;

/// Consecutive successes before an override host is marked healthy
pub const HEALTH_CHECK_HEALTHY_THRESHOLD: u32 = 3;

/// Key of the bootstrap document inside the generated `ConfigMap`
pub const ENVOY_CONFIG_KEY: &str = "envoy.yaml";

/// Directory the bootstrap `ConfigMap` is mounted at
pub const ENVOY_CONFIG_MOUNT_PATH: &str = "/etc/envoy";

// ============================================================================
// Gateway Workload Constants
// ============================================================================

/// Default Envoy image for gateway pods
pub const DEFAULT_ENVOY_IMAGE: &str = "envoyproxy/envoy:v1.25.9";

/// Name of the gateway container
pub const CONTAINER_NAME_GATEWAY: &str = "gateway";

/// Name of the volume carrying the bootstrap document
pub const VOLUME_ENVOY_CONFIG: &str = "envoy-config";

/// Readiness probe path served by the Envoy admin interface
pub const READINESS_PATH: &str = "/ready";

/// Readiness probe period
pub const READINESS_PERIOD_SECS: i32 = 10;

/// Readiness probe timeout
pub const READINESS_TIMEOUT_SECS: i32 = 1;

/// Readiness probe failure threshold
pub const READINESS_FAILURE_THRESHOLD: i32 = 3;

/// Seconds the pre-stop hook waits for connections to drain
pub const PRE_STOP_SLEEP_SECS: u32 = 25;

/// Pod termination grace period
pub const TERMINATION_GRACE_PERIOD_SECS: i64 = 30;

/// Deployment progress deadline
pub const PROGRESS_DEADLINE_SECS: i32 = 600;

/// Deployment revision history limit
pub const REVISION_HISTORY_LIMIT: i32 = 10;

/// Default rolling update max unavailable / max surge
pub const DEFAULT_ROLLING_UPDATE_PERCENT: &str = "25%";

/// Pod disruption budget max unavailable
pub const PDB_MAX_UNAVAILABLE: &str = "25%";

/// `ConfigMap` volume file mode (0644)
pub const CONFIG_VOLUME_MODE: i32 = 420;

// ============================================================================
// Controller Error Handling Constants
// ============================================================================

/// Requeue delay after a failed reconciliation
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Periodic resync of a healthy `ExternalService`
pub const RESYNC_INTERVAL_SECS: u64 = 300;

// ============================================================================
// DNS Plane Constants
// ============================================================================

/// Name of the DNS-plane startup directive
pub const DNS_PLUGIN_NAME: &str = "egressoperator";

/// Bound on waiting for the first full fleet sync
pub const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 10;

/// Time to wait for the upstream resolver before answering SERVFAIL
pub const UPSTREAM_TIMEOUT_SECS: u64 = 5;

/// EDNS UDP payload size advertised to clients
pub const MAX_UDP_PAYLOAD: u16 = 4096;

/// Idle timeout for DNS-over-TCP client connections
pub const TCP_IDLE_TIMEOUT_SECS: u64 = 30;

/// Queries forwarded upstream at the same time
pub const MAX_CONCURRENT_QUERIES: usize = 1024;
