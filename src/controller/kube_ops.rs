//! Kubernetes operations used by the controller.
//!
//! [`KubeOps`] is the seam between reconcile logic and the API server:
//! get/create/update for every owned resource kind, pod updates and pod
//! listing by label selector. [`KubeOpsImpl`] talks to a real cluster;
//! tests substitute an in-memory implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::controller::error::Result;
use crate::crd::{RedisReplication, RedisReplicationStatus};
use crate::resources::common::OPERATOR_NAME;

/// Platform operations consumed by reconcile logic.
///
/// `get_*` return `Ok(None)` when the object does not exist.
#[async_trait]
pub trait KubeOps: Send + Sync {
    /// Get a RedisReplication by namespace and name
    async fn get_redis_replication(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RedisReplication>>;

    /// Merge-patch the status subresource of a RedisReplication
    async fn patch_redis_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RedisReplicationStatus,
    ) -> Result<()>;

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;
    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()>;
    async fn update_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()>;

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>>;
    async fn create_stateful_set(&self, namespace: &str, sts: &StatefulSet) -> Result<()>;
    async fn update_stateful_set(&self, namespace: &str, sts: &StatefulSet) -> Result<()>;

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;
    async fn create_service(&self, namespace: &str, service: &Service) -> Result<()>;
    async fn update_service(&self, namespace: &str, service: &Service) -> Result<()>;

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>>;
    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()>;
    async fn update_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()>;

    /// Write the labels and owner references of an existing pod
    ///
    /// Fails with not-found if the pod is gone.
    async fn update_pod(&self, namespace: &str, pod: &Pod) -> Result<()>;

    /// List pods matching every label in `selector`
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>>;
}

/// Real Kubernetes implementation of [`KubeOps`]
pub struct KubeOpsImpl {
    client: Client,
}

impl KubeOpsImpl {
    /// Create a new KubeOpsImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_opt<K>(&self, namespace: &str, name: &str) -> Result<Option<K>>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
    {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn create<K>(&self, namespace: &str, obj: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + std::fmt::Debug,
    {
        let params = PostParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        };
        self.api::<K>(namespace).create(&params, obj).await?;
        debug!(kind = %K::kind(&()), name = %obj.name_any(), "Created resource");
        Ok(())
    }

    /// Update through server-side apply; unchanged bodies are no-ops on the server.
    async fn apply<K>(&self, namespace: &str, obj: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + std::fmt::Debug,
    {
        let name = obj.name_any();
        self.api::<K>(namespace)
            .patch(
                &name,
                &PatchParams::apply(OPERATOR_NAME).force(),
                &Patch::Apply(obj),
            )
            .await?;
        debug!(kind = %K::kind(&()), name = %name, "Updated resource");
        Ok(())
    }
}

/// Render a label map as a `k=v,k=v` selector string.
pub fn label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl KubeOps for KubeOpsImpl {
    async fn get_redis_replication(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RedisReplication>> {
        self.get_opt(namespace, name).await
    }

    async fn patch_redis_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RedisReplicationStatus,
    ) -> Result<()> {
        let patch = serde_json::json!({ "status": status });
        self.api::<RedisReplication>(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        self.get_opt(namespace, name).await
    }

    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()> {
        self.create(namespace, config_map).await
    }

    async fn update_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()> {
        self.apply(namespace, config_map).await
    }

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>> {
        self.get_opt(namespace, name).await
    }

    async fn create_stateful_set(&self, namespace: &str, sts: &StatefulSet) -> Result<()> {
        self.create(namespace, sts).await
    }

    async fn update_stateful_set(&self, namespace: &str, sts: &StatefulSet) -> Result<()> {
        self.apply(namespace, sts).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        self.get_opt(namespace, name).await
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<()> {
        self.create(namespace, service).await
    }

    async fn update_service(&self, namespace: &str, service: &Service) -> Result<()> {
        self.apply(namespace, service).await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        self.get_opt(namespace, name).await
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()> {
        self.create(namespace, deployment).await
    }

    async fn update_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()> {
        self.apply(namespace, deployment).await
    }

    async fn update_pod(&self, namespace: &str, pod: &Pod) -> Result<()> {
        // Merge patch: labels merge key-by-key, ownerReferences is replaced whole
        let patch = serde_json::json!({
            "metadata": {
                "labels": pod.metadata.labels,
                "ownerReferences": pod.metadata.owner_references,
            }
        });
        self.api::<Pod>(namespace)
            .patch(&pod.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        let params = ListParams::default().labels(&label_selector(selector));
        let pods = self.api::<Pod>(namespace).list(&params).await?;
        Ok(pods.items)
    }
}
