// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all generated objects.
//!
//! The DNS plane selects fleet members by [`APP_LABEL`] and reads
//! [`DNS_NAME_ANNOTATION`] off every member, so these keys are a contract
//! between the controller and `egress-dns`.

// ============================================================================
// Gateway Labels
// ============================================================================

/// Label marking an object as part of the gateway fleet
pub const APP_LABEL: &str = "app";

/// Value of [`APP_LABEL`] on every gateway object
pub const APP_EGRESS_GATEWAY: &str = "egress-gateway";

/// Label naming the `ExternalService` that owns the object
pub const GATEWAY_LABEL: &str = "egress.monzo.com/gateway";

/// Cutover state label carried on the gateway `Service`
pub const HIJACK_DNS_LABEL: &str = "egress.monzo.com/hijack-dns";

/// Prefix of the pod label that grants access to one gateway
pub const ALLOWED_LABEL_PREFIX: &str = "egress.monzo.com/allowed-";

// ============================================================================
// Gateway Annotations
// ============================================================================

/// External DNS name fronted by the gateway
pub const DNS_NAME_ANNOTATION: &str = "egress.monzo.com/dns-name";

/// Hash of the bootstrap document, forces a rollout when the config changes
pub const CONFIG_HASH_ANNOTATION: &str = "egress.monzo.com/config-hash";

/// Envoy admin port allocated for this gateway
pub const ADMIN_PORT_ANNOTATION: &str = "egress.monzo.com/admin-port";

/// Kubernetes topology-aware routing hint
pub const TOPOLOGY_MODE_ANNOTATION: &str = "service.kubernetes.io/topology-mode";

/// Value used for [`TOPOLOGY_MODE_ANNOTATION`] when the `ExternalService` does not choose one
pub const TOPOLOGY_MODE_AUTO: &str = "Auto";

// ============================================================================
// Well-known topology keys
// ============================================================================

/// Default zone topology key for spread constraints
pub const TOPOLOGY_ZONE_KEY: &str = "topology.kubernetes.io/zone";

/// Default hostname topology key for spread constraints
pub const TOPOLOGY_HOSTNAME_KEY: &str = "kubernetes.io/hostname";
