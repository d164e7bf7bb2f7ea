// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Operator configuration.
//!
//! [`OperatorConfig`] is built once at startup and threaded through every
//! builder and reconciler. Nothing below `main` reads the process environment.
//!
//! # Environment
//!
//! | Variable | Effect |
//! |---|---|
//! | `EGRESS_NAMESPACE` | Namespace for every generated object |
//! | `ENVOY_IMAGE` | Gateway container image |
//! | `ENABLE_POD_DISRUPTION_BUDGETS` | `true` to generate PDBs |
//! | `ENABLE_SERVICE_TOPOLOGY_MODE` | `true` to annotate objects with a topology mode |
//! | `TAINT_TOLERATION_KEY` / `TAINT_TOLERATION_VALUE` | Add a `NoSchedule` toleration |
//! | `NODE_SELECTOR_KEY` / `NODE_SELECTOR_VALUE` | Pin gateway pods to matching nodes |
//! | `ENABLE_POD_TOPOLOGY_SPREAD` | `true` to add spread constraints |
//! | `POD_TOPOLOGY_ZONE_MAX_SKEW[_KEY]` | Zone spread constraint |
//! | `POD_TOPOLOGY_HOSTNAME_MAX_SKEW[_KEY]` | Hostname spread constraint |
//! | `ROLLING_UPDATE_MAX_UNAVAILABLE` / `ROLLING_UPDATE_MAX_SURGE` | Deployment rollout bounds |

use crate::constants::{DEFAULT_ENVOY_IMAGE, DEFAULT_NAMESPACE, DEFAULT_ROLLING_UPDATE_PERCENT};
use crate::labels::{TOPOLOGY_HOSTNAME_KEY, TOPOLOGY_ZONE_KEY};

/// A `NoSchedule` toleration added to every gateway pod.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaintToleration {
    pub key: String,
    pub value: String,
}

/// One `ScheduleAnyway` topology spread constraint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpreadConstraint {
    pub topology_key: String,
    pub max_skew: i32,
}

/// Runtime configuration shared by all reconcilers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace every generated object is written to
    pub namespace: String,
    /// Gateway container image
    pub envoy_image: String,
    /// Generate a `PodDisruptionBudget` per gateway
    pub enable_pod_disruption_budgets: bool,
    /// Annotate objects with `service.kubernetes.io/topology-mode`
    pub enable_service_topology_mode: bool,
    pub taint_toleration: Option<TaintToleration>,
    pub node_selector: Option<(String, String)>,
    pub topology_spread: Vec<SpreadConstraint>,
    pub rolling_update_max_unavailable: String,
    pub rolling_update_max_surge: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            envoy_image: DEFAULT_ENVOY_IMAGE.to_string(),
            enable_pod_disruption_budgets: false,
            enable_service_topology_mode: false,
            taint_toleration: None,
            node_selector: None,
            topology_spread: Vec::new(),
            rolling_update_max_unavailable: DEFAULT_ROLLING_UPDATE_PERCENT.to_string(),
            rolling_update_max_surge: DEFAULT_ROLLING_UPDATE_PERCENT.to_string(),
        }
    }
}

impl OperatorConfig {
    /// Build the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// Unset variables fall back to their defaults. A toleration or node
    /// selector is only produced when both its key and value are set.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let or_default = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let is_true = |key: &str| lookup(key).as_deref() == Some("true");

        let taint_toleration = match (
            lookup("TAINT_TOLERATION_KEY"),
            lookup("TAINT_TOLERATION_VALUE"),
        ) {
            (Some(key), Some(value)) => Some(TaintToleration { key, value }),
            _ => None,
        };

        let node_selector = match (lookup("NODE_SELECTOR_KEY"), lookup("NODE_SELECTOR_VALUE")) {
            (Some(key), Some(value)) => Some((key, value)),
            _ => None,
        };

        let mut topology_spread = Vec::new();
        if is_true("ENABLE_POD_TOPOLOGY_SPREAD") {
            let constraints = [
                ("POD_TOPOLOGY_ZONE_MAX_SKEW", TOPOLOGY_ZONE_KEY),
                ("POD_TOPOLOGY_HOSTNAME_MAX_SKEW", TOPOLOGY_HOSTNAME_KEY),
            ];
            for (skew_var, default_key) in constraints {
                if let Some(skew) = lookup(skew_var) {
                    topology_spread.push(SpreadConstraint {
                        topology_key: lookup(&format!("{skew_var}_KEY"))
                            .unwrap_or_else(|| default_key.to_string()),
                        max_skew: skew.trim().parse().unwrap_or(1),
                    });
                }
            }
        }

        Self {
            namespace: or_default("EGRESS_NAMESPACE", DEFAULT_NAMESPACE),
            envoy_image: lookup("ENVOY_IMAGE").unwrap_or_else(|| DEFAULT_ENVOY_IMAGE.to_string()),
            enable_pod_disruption_budgets: is_true("ENABLE_POD_DISRUPTION_BUDGETS"),
            enable_service_topology_mode: is_true("ENABLE_SERVICE_TOPOLOGY_MODE"),
            taint_toleration,
            node_selector,
            topology_spread,
            rolling_update_max_unavailable: or_default(
                "ROLLING_UPDATE_MAX_UNAVAILABLE",
                DEFAULT_ROLLING_UPDATE_PERCENT,
            ),
            rolling_update_max_surge: or_default(
                "ROLLING_UPDATE_MAX_SURGE",
                DEFAULT_ROLLING_UPDATE_PERCENT,
            ),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
