//! redis-operator library crate
//!
//! This module exports the controller, CRD definitions, Redis client and
//! resource generators, and wires the controller's watches.

pub mod client;
pub mod controller;
pub mod crd;
pub mod health;
pub mod resources;

pub use health::HealthState;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::{Stream, StreamExt, TryStreamExt};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::PartialObjectMeta;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::{Config as WatcherConfig, Event};
use kube::runtime::{Controller, WatchStreamExt, metadata_watcher, predicates, reflector, watcher};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use controller::{context::Context, reconciler::reconcile};
use crd::RedisReplication;
use resources::common::{LABEL_MANAGED_BY, OPERATOR_NAME};

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Default watcher configuration for every watch.
fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Watcher configuration narrowed to pods this operator manages.
fn managed_pods_watcher_config() -> WatcherConfig {
    default_watcher_config().labels(&format!("{LABEL_MANAGED_BY}={OPERATOR_NAME}"))
}

/// Reflector-backed stream of RedisReplications, filtered to spec changes.
///
/// Status writes do not bump the generation, so they never retrigger.
fn create_filtered_stream<K>(
    api: Api<K>,
    watcher_config: WatcherConfig,
) -> (
    reflector::Store<K>,
    impl Stream<Item = Result<K, watcher::Error>>,
)
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, watcher_config))
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicates::generation);
    (reader, stream)
}

/// Predicate firing when either the generation or the annotations change.
pub fn generation_or_annotations<K: Resource>(obj: &K) -> Option<u64> {
    let mut hasher = DefaultHasher::new();
    obj.meta().generation.hash(&mut hasher);
    obj.annotations().hash(&mut hasher);
    Some(hasher.finish())
}

/// The RedisReplication a pod points back to through its non-controlling
/// owner reference, if any.
pub fn secondary_owner_of(meta: &ObjectMeta) -> Option<ObjectRef<RedisReplication>> {
    let namespace = meta.namespace.as_deref()?;
    let kind = RedisReplication::kind(&());
    let api_version = RedisReplication::api_version(&());
    meta.owner_references
        .iter()
        .flatten()
        .find(|owner| {
            owner.controller != Some(true)
                && owner.kind == kind
                && owner.api_version == api_version
        })
        .map(|owner| ObjectRef::new(&owner.name).within(namespace))
}

/// Run the operator controller with optional namespace scoping.
///
/// When `namespace` is `Some(ns)`, only watches resources in that namespace.
/// When `namespace` is `None`, watches resources cluster-wide.
pub async fn run_controller_scoped(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    namespace: Option<&str>,
) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    info!(
        "Starting controller for RedisReplication resources (scope: {})",
        scope_msg
    );

    // Mark as ready once we start the controller
    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let ctx = Arc::new(Context::new(client.clone(), health_state));

    let replications: Api<RedisReplication> = scoped_api(client.clone(), namespace);
    let statefulsets: Api<StatefulSet> = scoped_api(client.clone(), namespace);
    let deployments: Api<Deployment> = scoped_api(client.clone(), namespace);
    let services: Api<Service> = scoped_api(client.clone(), namespace);
    let configmaps: Api<ConfigMap> = scoped_api(client.clone(), namespace);
    let pods: Api<Pod> = scoped_api(client.clone(), namespace);

    let watcher_config = default_watcher_config();

    let (reader, resource_stream) = create_filtered_stream(replications, watcher_config.clone());

    // StatefulSet status churns constantly while pods start; only spec and
    // annotation changes matter
    let statefulset_stream = watcher(statefulsets, watcher_config.clone())
        .default_backoff()
        .touched_objects()
        .predicate_filter(generation_or_annotations::<StatefulSet>);

    // Pod deletions only. Pods are linked back through the secondary owner
    // reference added during sync.
    let pod_deletions = metadata_watcher(pods, managed_pods_watcher_config())
        .default_backoff()
        .try_filter_map(|event| async move {
            Ok::<_, watcher::Error>(match event {
                Event::Delete(pod) => Some(pod),
                _ => None,
            })
        });

    Controller::for_stream(resource_stream, reader)
        .owns_stream(statefulset_stream)
        .owns_stream(metadata_watcher(deployments, watcher_config.clone()).touched_objects())
        .owns_stream(metadata_watcher(services, watcher_config.clone()).touched_objects())
        .owns_stream(metadata_watcher(configmaps, watcher_config).touched_objects())
        .watches_stream(pod_deletions, |pod: PartialObjectMeta<Pod>| {
            secondary_owner_of(&pod.metadata)
        })
        .run(reconcile, controller::reconciler::error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    // Related watch events can still fire for a deleted object
                    let is_not_found = match &e {
                        kube::runtime::controller::Error::ObjectNotFound(_) => true,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) => {
                            err.is_not_found()
                        }
                        _ => false,
                    };
                    if is_not_found {
                        debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    // This should never complete in normal operation
    error!("Controller stream ended unexpectedly");
}
