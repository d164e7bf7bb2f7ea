// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `resources.rs`

#[cfg(test)]
mod tests {
    use crate::reconcilers::resources::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
    use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
    use serde_json::Value;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const TEST_NAME: &str = "github";

    /// In-memory store that applies merge patches the way the API server does
    /// and counts every write.
    struct FakeStore<K> {
        objects: Mutex<HashMap<String, K>>,
        writes: AtomicUsize,
        vanish_on_patch: bool,
    }

    impl<K: Managed> FakeStore<K> {
        fn new() -> Self {
            Self {
                objects: Mutex::new(HashMap::new()),
                writes: AtomicUsize::new(0),
                vanish_on_patch: false,
            }
        }

        fn with(object: K) -> Self {
            let store = Self::new();
            let name = object.meta().name.clone().unwrap();
            store.objects.lock().unwrap().insert(name, object);
            store
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        fn stored(&self, name: &str) -> K {
            self.objects.lock().unwrap()[name].clone()
        }
    }

    fn apply_merge_patch(target: &mut Value, patch: &Value) {
        match patch {
            Value::Object(entries) => {
                if !target.is_object() {
                    *target = Value::Object(serde_json::Map::new());
                }
                let map = target.as_object_mut().unwrap();
                for (key, value) in entries {
                    if value.is_null() {
                        map.remove(key);
                    } else {
                        apply_merge_patch(map.entry(key.clone()).or_insert(Value::Null), value);
                    }
                }
            }
            other => *target = other.clone(),
        }
    }

    #[async_trait]
    impl<K: Managed> ObjectStore<K> for FakeStore<K> {
        async fn get(&self, name: &str) -> Result<Option<K>> {
            Ok(self.objects.lock().unwrap().get(name).cloned())
        }

        async fn create(&self, object: &K) -> Result<K> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let name = object.meta().name.clone().ok_or_else(|| anyhow!("no name"))?;
            self.objects.lock().unwrap().insert(name, object.clone());
            Ok(object.clone())
        }

        async fn patch_merge(&self, name: &str, patch: &Value) -> Result<Option<K>> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut objects = self.objects.lock().unwrap();
            if self.vanish_on_patch {
                objects.remove(name);
                return Ok(None);
            }
            let Some(current) = objects.get(name) else {
                return Ok(None);
            };
            let mut json = serde_json::to_value(current)?;
            apply_merge_patch(&mut json, patch);
            let updated: K = serde_json::from_value(json)?;
            objects.insert(name.to_string(), updated.clone());
            Ok(Some(updated))
        }
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn configmap(data: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(TEST_NAME.to_string()),
                namespace: Some("egress-operator-system".to_string()),
                labels: Some(labels(&[("app", "egress-gateway")])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("envoy.yaml".to_string(), data.to_string())])),
            ..Default::default()
        }
    }

    fn deployment(replicas: Option<i32>, image: &str) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(TEST_NAME.to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas,
                selector: LabelSelector {
                    match_labels: Some(labels(&[("egress.monzo.com/gateway", TEST_NAME)])),
                    ..Default::default()
                },
                min_ready_seconds: Some(0),
                paused: Some(false),
                strategy: None,
                template: k8s_openapi::api::core::v1::PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        annotations: Some(labels(&[("egress.monzo.com/config-hash", image)])),
                        ..Default::default()
                    }),
                    spec: None,
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_creates_when_missing() {
        let store = FakeStore::new();
        let outcome = reconcile_object(&store, &configmap("v1")).await.unwrap();
        assert_eq!(outcome, Outcome::Created);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_second_pass_issues_no_writes() {
        let store = FakeStore::new();
        let desired = configmap("v1");

        reconcile_object(&store, &desired).await.unwrap();
        let outcome = reconcile_object(&store, &desired).await.unwrap();

        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_changed_data_is_patched() {
        let store = FakeStore::with(configmap("v1"));
        let outcome = reconcile_object(&store, &configmap("v2")).await.unwrap();

        assert_eq!(outcome, Outcome::Patched);
        assert_eq!(store.stored(TEST_NAME).data.unwrap()["envoy.yaml"], "v2");

        let again = reconcile_object(&store, &configmap("v2")).await.unwrap();
        assert_eq!(again, Outcome::Unchanged);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_external_labels_and_annotations_survive() {
        let mut existing = configmap("v1");
        existing.metadata.labels = Some(labels(&[("app", "old"), ("team", "payments")]));
        existing.metadata.annotations = Some(labels(&[("kubectl.kubernetes.io/note", "x")]));
        let store = FakeStore::with(existing);

        let outcome = reconcile_object(&store, &configmap("v1")).await.unwrap();
        assert_eq!(outcome, Outcome::Patched);

        let stored = store.stored(TEST_NAME).metadata;
        let stored_labels = stored.labels.unwrap();
        assert_eq!(stored_labels["app"], "egress-gateway");
        assert_eq!(stored_labels["team"], "payments");
        assert_eq!(stored.annotations.unwrap()["kubectl.kubernetes.io/note"], "x");
    }

    #[tokio::test]
    async fn test_deployment_replicas_owned_by_autoscaler() {
        let store = FakeStore::with(deployment(Some(7), "hash-a"));

        let outcome = reconcile_object(&store, &deployment(None, "hash-a"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Unchanged);

        let outcome = reconcile_object(&store, &deployment(None, "hash-b"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Patched);
        assert_eq!(store.stored(TEST_NAME).spec.unwrap().replicas, Some(7));
    }

    #[tokio::test]
    async fn test_service_cluster_ip_is_kept() {
        let service = |cluster_ip: Option<&str>| Service {
            metadata: ObjectMeta {
                name: Some(TEST_NAME.to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                cluster_ip: cluster_ip.map(str::to_string),
                cluster_ips: cluster_ip.map(|ip| vec![ip.to_string()]),
                ip_families: cluster_ip.map(|_| vec!["IPv4".to_string()]),
                type_: Some("ClusterIP".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let store = FakeStore::with(service(Some("10.0.0.12")));

        let outcome = reconcile_object(&store, &service(None)).await.unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_vanished_object_is_benign() {
        let mut store = FakeStore::with(configmap("v1"));
        store.vanish_on_patch = true;

        let outcome = reconcile_object(&store, &configmap("v2")).await.unwrap();
        assert_eq!(outcome, Outcome::Gone);
    }

    #[tokio::test]
    async fn test_builder_sees_stored_object() {
        let store = FakeStore::with(configmap("v1"));

        let outcome = reconcile_object_with(&store, TEST_NAME, |stored: Option<&ConfigMap>| {
            let previous = stored
                .and_then(|cm| cm.data.as_ref())
                .map(|d| d["envoy.yaml"].clone())
                .unwrap_or_default();
            Ok(configmap(&format!("{previous}+next")))
        })
        .await
        .unwrap();

        assert_eq!(outcome, Outcome::Patched);
        assert_eq!(store.stored(TEST_NAME).data.unwrap()["envoy.yaml"], "v1+next");
    }

    #[tokio::test]
    async fn test_builder_error_aborts_without_write() {
        let store: FakeStore<ConfigMap> = FakeStore::new();
        let result = reconcile_object_with(&store, TEST_NAME, |_| Err(anyhow!("boom"))).await;
        assert!(result.is_err());
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_nameless_object_is_rejected() {
        let store: FakeStore<ConfigMap> = FakeStore::new();
        let mut desired = configmap("v1");
        desired.metadata.name = None;
        assert!(reconcile_object(&store, &desired).await.is_err());
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::Created.as_str(), "created");
        assert_eq!(Outcome::Patched.as_str(), "patched");
        assert_eq!(Outcome::Unchanged.as_str(), "unchanged");
        assert_eq!(Outcome::Gone.as_str(), "gone");
    }
}
