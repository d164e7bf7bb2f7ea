// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic create-or-patch engine for the objects generated per `ExternalService`.
//!
//! Every generated kind goes through [`reconcile_object_with`]:
//!
//! 1. Read the stored object by name.
//! 2. If absent, create the desired object.
//! 3. Otherwise merge labels, annotations and owner references additively onto
//!    a copy of the stored object, replace its structural fields with the
//!    desired ones (keeping fields another controller owns, see [`Managed`]),
//!    and compute a JSON merge patch against the stored object.
//! 4. Skip the write when the patch is empty. A `404` on patch means the object
//!    raced to deletion and is reported as [`Outcome::Gone`].
//!
//! Storage access is behind [`ObjectStore`], implemented for [`kube::Api`] with
//! retries on transient API errors.
//!
//! # Example
//!
//! ```rust,no_run
//! use egress_operator::reconcilers::resources::reconcile_object;
//! use k8s_openapi::api::core::v1::ConfigMap;
//! use kube::{Api, Client};
//!
//! async fn example(client: Client, desired: ConfigMap) -> anyhow::Result<()> {
//!     let api: Api<ConfigMap> = Api::namespaced(client, "egress-operator-system");
//!     let outcome = reconcile_object(&api, &desired).await?;
//!     println!("ConfigMap {}", outcome.as_str());
//!     Ok(())
//! }
//! ```

use crate::constants::FIELD_MANAGER;
use crate::metrics::record_object_outcome;
use crate::reconcilers::merge::{
    is_empty_patch, merge_owner_references, merge_patch, merge_string_maps,
};
use crate::reconcilers::retry::retry_api_call;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use tracing::{debug, info};

/// Result of reconciling one generated object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The object did not exist and was created
    Created,
    /// The stored object differed and was patched
    Patched,
    /// The stored object already matched; no write was issued
    Unchanged,
    /// The object disappeared between read and patch
    Gone,
}

impl Outcome {
    /// Metric/log label for the outcome.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Patched => "patched",
            Outcome::Unchanged => "unchanged",
            Outcome::Gone => "gone",
        }
    }
}

/// Minimal read/create/patch surface the engine needs from the API server.
#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    /// Fetch an object by name, `None` if it does not exist.
    async fn get(&self, name: &str) -> Result<Option<K>>;

    /// Create a new object.
    async fn create(&self, object: &K) -> Result<K>;

    /// Apply a JSON merge patch. Returns `None` when the object no longer exists.
    async fn patch_merge(&self, name: &str, patch: &Value) -> Result<Option<K>>;
}

#[async_trait]
impl<K> ObjectStore<K> for Api<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<Option<K>> {
        retry_api_call(|| self.get_opt(name), &format!("get {name}")).await
    }

    async fn create(&self, object: &K) -> Result<K> {
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        retry_api_call(|| Api::create(self, &params, object), "create object").await
    }

    async fn patch_merge(&self, name: &str, patch: &Value) -> Result<Option<K>> {
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PatchParams::default()
        };
        let body = Patch::Merge(patch);
        match retry_api_call(|| self.patch(name, &params, &body), &format!("patch {name}")).await {
            Ok(object) => Ok(Some(object)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<kube::Error>(),
        Some(kube::Error::Api(response)) if response.code == 404
    )
}

/// A kind the engine knows how to update in place.
pub trait Managed:
    Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static
{
    /// Replace this object's structural fields with `desired`'s, keeping
    /// fields owned by other controllers.
    fn adopt_structure(&mut self, desired: &Self);
}

impl Managed for ConfigMap {
    fn adopt_structure(&mut self, desired: &Self) {
        self.data.clone_from(&desired.data);
        self.binary_data.clone_from(&desired.binary_data);
    }
}

impl Managed for Deployment {
    // Replica count belongs to the autoscaler
    fn adopt_structure(&mut self, desired: &Self) {
        let replicas = self.spec.as_ref().and_then(|s| s.replicas);
        self.spec.clone_from(&desired.spec);
        if let Some(spec) = self.spec.as_mut() {
            spec.replicas = replicas;
        }
    }
}

impl Managed for Service {
    // Addresses and families are assigned by the API server
    fn adopt_structure(&mut self, desired: &Self) {
        let stored = self.spec.take().unwrap_or_default();
        let mut spec = desired.spec.clone().unwrap_or_default();
        spec.cluster_ip = stored.cluster_ip;
        spec.cluster_ips = stored.cluster_ips;
        spec.ip_families = stored.ip_families;
        spec.ip_family_policy = stored.ip_family_policy;
        spec.internal_traffic_policy = stored.internal_traffic_policy;
        self.spec = Some(spec);
    }
}

impl Managed for HorizontalPodAutoscaler {
    fn adopt_structure(&mut self, desired: &Self) {
        self.spec.clone_from(&desired.spec);
    }
}

impl Managed for NetworkPolicy {
    fn adopt_structure(&mut self, desired: &Self) {
        self.spec.clone_from(&desired.spec);
    }
}

impl Managed for PodDisruptionBudget {
    fn adopt_structure(&mut self, desired: &Self) {
        self.spec.clone_from(&desired.spec);
    }
}

/// Build the object that should be stored given the stored and desired objects.
///
/// Metadata maps and owner references are merged additively; structure comes
/// from `desired` via [`Managed::adopt_structure`].
#[must_use]
pub fn merge_desired<K: Managed>(stored: &K, desired: &K) -> K {
    let mut merged = stored.clone();
    let from = desired.meta();
    let current = stored.meta();

    let meta = merged.meta_mut();
    meta.labels = merge_string_maps(current.labels.as_ref(), from.labels.as_ref());
    meta.annotations = merge_string_maps(current.annotations.as_ref(), from.annotations.as_ref());
    meta.owner_references =
        merge_owner_references(current.owner_references.as_ref(), from.owner_references.as_ref());

    merged.adopt_structure(desired);
    merged
}

/// Reconcile one object, building the desired state from the stored one.
///
/// `build` receives the currently stored object (if any) so builders whose
/// output depends on previous state, such as the cutover label, can read it.
///
/// # Errors
///
/// Returns an error if the store fails, `build` fails, or the objects cannot
/// be converted to JSON. A missing object at patch time is not an error.
pub async fn reconcile_object_with<K, S, F>(store: &S, name: &str, build: F) -> Result<Outcome>
where
    K: Managed,
    S: ObjectStore<K> + ?Sized,
    F: FnOnce(Option<&K>) -> Result<K>,
{
    let kind = K::kind(&());
    let stored = store
        .get(name)
        .await
        .with_context(|| format!("failed to read {kind} {name}"))?;
    let desired = build(stored.as_ref())?;

    let outcome = match stored {
        None => {
            store
                .create(&desired)
                .await
                .with_context(|| format!("failed to create {kind} {name}"))?;
            info!(kind = %kind, name = %name, "Created object");
            Outcome::Created
        }
        Some(stored) => {
            let merged = merge_desired(&stored, &desired);
            let patch = merge_patch(&serde_json::to_value(&stored)?, &serde_json::to_value(&merged)?);

            if is_empty_patch(&patch) {
                debug!(kind = %kind, name = %name, "Object up to date");
                Outcome::Unchanged
            } else {
                debug!(kind = %kind, name = %name, patch = %patch, "Patching object");
                match store
                    .patch_merge(name, &patch)
                    .await
                    .with_context(|| format!("failed to patch {kind} {name}"))?
                {
                    Some(_) => {
                        info!(kind = %kind, name = %name, "Patched object");
                        Outcome::Patched
                    }
                    None => {
                        debug!(kind = %kind, name = %name, "Object deleted before patch");
                        Outcome::Gone
                    }
                }
            }
        }
    };

    record_object_outcome(&kind, outcome.as_str());
    Ok(outcome)
}

/// Reconcile one object whose desired state does not depend on the stored one.
///
/// # Errors
///
/// Returns an error if `desired` has no name or [`reconcile_object_with`] fails.
pub async fn reconcile_object<K, S>(store: &S, desired: &K) -> Result<Outcome>
where
    K: Managed,
    S: ObjectStore<K> + ?Sized,
{
    let name = desired
        .meta()
        .name
        .clone()
        .ok_or_else(|| anyhow!("{} must have a name", K::kind(&())))?;
    reconcile_object_with(store, &name, |_| Ok(desired.clone())).await
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
