// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the `ExternalService` controller.
//!
//! The controller receives an `Arc<Context>` holding the Kubernetes client and
//! the operator configuration. Generated objects always live in
//! [`OperatorConfig::namespace`], so the typed APIs for them are built here.

use crate::config::OperatorConfig;
use crate::crd::ExternalService;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;

/// Shared context passed to every reconciliation.
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client for API operations
    pub client: Client,

    /// Operator configuration, read once at startup
    pub config: Arc<OperatorConfig>,
}

impl Context {
    #[must_use]
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    /// API for a generated kind in the operator namespace.
    #[must_use]
    pub fn generated<K>(&self) -> Api<K>
    where
        K: Resource<Scope = kube::core::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    /// API for the cluster-scoped `ExternalService` resources.
    #[must_use]
    pub fn external_services(&self) -> Api<ExternalService> {
        Api::all(self.client.clone())
    }
}
