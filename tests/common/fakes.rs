//! In-memory collaborators for driving the controller without a cluster.
//!
//! `FakeKube` stores objects keyed by namespace and name and logs every
//! write. `FakeRedis` simulates replication roles and sentinel monitors
//! per IP and logs every command that changes them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::ResourceExt;
use redis_operator::client::{RedisError, RedisTarget, SentinelMaster};
use redis_operator::controller::error::{Error, Result};
use redis_operator::controller::kube_ops::KubeOps;
use redis_operator::controller::redis_ops::RedisOps;
use redis_operator::crd::{RedisReplication, RedisReplicationStatus};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// A write recorded by [`FakeKube`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KubeWrite {
    Create { kind: &'static str, name: String },
    Update { kind: &'static str, name: String },
    PatchStatus { name: String },
}

#[derive(Default)]
struct KubeState {
    replications: BTreeMap<Key, RedisReplication>,
    config_maps: BTreeMap<Key, ConfigMap>,
    stateful_sets: BTreeMap<Key, StatefulSet>,
    services: BTreeMap<Key, Service>,
    deployments: BTreeMap<Key, Deployment>,
    pods: Vec<Pod>,
    writes: Vec<KubeWrite>,
}

/// In-memory [`KubeOps`].
#[derive(Default)]
pub struct FakeKube {
    state: Mutex<KubeState>,
}

impl FakeKube {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replication(self, resource: &RedisReplication) -> Self {
        let ns = resource.namespace().unwrap_or_default();
        self.state
            .lock()
            .unwrap()
            .replications
            .insert(key(&ns, &resource.name_any()), resource.clone());
        self
    }

    pub fn with_stateful_set(self, sts: StatefulSet) -> Self {
        let ns = sts.namespace().unwrap_or_default();
        self.state
            .lock()
            .unwrap()
            .stateful_sets
            .insert(key(&ns, &sts.name_any()), sts);
        self
    }

    pub fn with_deployment(self, deployment: Deployment) -> Self {
        let ns = deployment.namespace().unwrap_or_default();
        self.state
            .lock()
            .unwrap()
            .deployments
            .insert(key(&ns, &deployment.name_any()), deployment);
        self
    }

    pub fn with_pods(self, pods: impl IntoIterator<Item = Pod>) -> Self {
        self.state.lock().unwrap().pods.extend(pods);
        self
    }

    pub fn writes(&self) -> Vec<KubeWrite> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }

    /// Names of pods written through `update_pod`, in write order.
    pub fn pod_updates(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                KubeWrite::Update { kind: "Pod", name } => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn pod(&self, name: &str) -> Option<Pod> {
        self.state
            .lock()
            .unwrap()
            .pods
            .iter()
            .find(|p| p.name_any() == name)
            .cloned()
    }

    pub fn status(&self, namespace: &str, name: &str) -> Option<RedisReplicationStatus> {
        self.state
            .lock()
            .unwrap()
            .replications
            .get(&key(namespace, name))
            .and_then(|r| r.status.clone())
    }

    pub fn has_config_map(&self, namespace: &str, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .config_maps
            .contains_key(&key(namespace, name))
    }

    pub fn has_service(&self, namespace: &str, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .services
            .contains_key(&key(namespace, name))
    }

    pub fn has_deployment(&self, namespace: &str, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .deployments
            .contains_key(&key(namespace, name))
    }

    fn record(&self, write: KubeWrite) {
        self.state.lock().unwrap().writes.push(write);
    }
}

fn put<K: ResourceExt + Clone>(map: &mut BTreeMap<Key, K>, namespace: &str, obj: &K) {
    map.insert(key(namespace, &obj.name_any()), obj.clone());
}

#[async_trait]
impl KubeOps for FakeKube {
    async fn get_redis_replication(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RedisReplication>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .replications
            .get(&key(namespace, name))
            .cloned())
    }

    async fn patch_redis_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RedisReplicationStatus,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(resource) = state.replications.get_mut(&key(namespace, name)) else {
            return Err(Error::NotFound {
                kind: "RedisReplication",
                name: name.to_string(),
            });
        };
        resource.status = Some(status.clone());
        state.writes.push(KubeWrite::PatchStatus {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .config_maps
            .get(&key(namespace, name))
            .cloned())
    }

    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()> {
        put(&mut self.state.lock().unwrap().config_maps, namespace, config_map);
        self.record(KubeWrite::Create {
            kind: "ConfigMap",
            name: config_map.name_any(),
        });
        Ok(())
    }

    async fn update_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()> {
        put(&mut self.state.lock().unwrap().config_maps, namespace, config_map);
        self.record(KubeWrite::Update {
            kind: "ConfigMap",
            name: config_map.name_any(),
        });
        Ok(())
    }

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .stateful_sets
            .get(&key(namespace, name))
            .cloned())
    }

    async fn create_stateful_set(&self, namespace: &str, sts: &StatefulSet) -> Result<()> {
        put(&mut self.state.lock().unwrap().stateful_sets, namespace, sts);
        self.record(KubeWrite::Create {
            kind: "StatefulSet",
            name: sts.name_any(),
        });
        Ok(())
    }

    async fn update_stateful_set(&self, namespace: &str, sts: &StatefulSet) -> Result<()> {
        put(&mut self.state.lock().unwrap().stateful_sets, namespace, sts);
        self.record(KubeWrite::Update {
            kind: "StatefulSet",
            name: sts.name_any(),
        });
        Ok(())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .services
            .get(&key(namespace, name))
            .cloned())
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<()> {
        put(&mut self.state.lock().unwrap().services, namespace, service);
        self.record(KubeWrite::Create {
            kind: "Service",
            name: service.name_any(),
        });
        Ok(())
    }

    async fn update_service(&self, namespace: &str, service: &Service) -> Result<()> {
        put(&mut self.state.lock().unwrap().services, namespace, service);
        self.record(KubeWrite::Update {
            kind: "Service",
            name: service.name_any(),
        });
        Ok(())
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .deployments
            .get(&key(namespace, name))
            .cloned())
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()> {
        put(&mut self.state.lock().unwrap().deployments, namespace, deployment);
        self.record(KubeWrite::Create {
            kind: "Deployment",
            name: deployment.name_any(),
        });
        Ok(())
    }

    async fn update_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()> {
        put(&mut self.state.lock().unwrap().deployments, namespace, deployment);
        self.record(KubeWrite::Update {
            kind: "Deployment",
            name: deployment.name_any(),
        });
        Ok(())
    }

    async fn update_pod(&self, namespace: &str, pod: &Pod) -> Result<()> {
        let name = pod.name_any();
        let mut state = self.state.lock().unwrap();
        let Some(stored) = state
            .pods
            .iter_mut()
            .find(|p| p.name_any() == name && p.namespace().as_deref() == Some(namespace))
        else {
            return Err(Error::NotFound { kind: "Pod", name });
        };
        stored.metadata.labels = pod.metadata.labels.clone();
        stored.metadata.owner_references = pod.metadata.owner_references.clone();
        state.writes.push(KubeWrite::Update { kind: "Pod", name });
        Ok(())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pods
            .iter()
            .filter(|p| p.namespace().as_deref() == Some(namespace))
            .filter(|p| {
                let labels = p.labels();
                selector.iter().all(|(k, v)| labels.get(k) == Some(v))
            })
            .cloned()
            .collect())
    }
}

/// A command recorded by [`FakeRedis`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisCall {
    ReplicaOfNoOne { host: String },
    ReplicaOf { host: String, master: String },
    SentinelRemove { sentinel: String },
    SentinelMonitor {
        sentinel: String,
        master: String,
        port: u16,
        quorum: i32,
    },
    SentinelSetAuthPass { sentinel: String },
}

#[derive(Default)]
struct RedisState {
    /// Followed master per Redis node; `None` means the node is a master.
    nodes: HashMap<String, Option<String>>,
    sentinels: HashMap<String, Option<SentinelMaster>>,
    unreachable: HashSet<String>,
    calls: Vec<RedisCall>,
}

/// In-memory [`RedisOps`].
#[derive(Default)]
pub struct FakeRedis {
    state: Mutex<RedisState>,
}

impl FakeRedis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_master(self, ip: &str) -> Self {
        self.state.lock().unwrap().nodes.insert(ip.to_string(), None);
        self
    }

    pub fn with_replica(self, ip: &str, master: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .nodes
            .insert(ip.to_string(), Some(master.to_string()));
        self
    }

    /// A sentinel monitoring `host:6379`.
    pub fn with_sentinel(self, ip: &str, host: &str) -> Self {
        self.state.lock().unwrap().sentinels.insert(
            ip.to_string(),
            Some(SentinelMaster {
                host: host.to_string(),
                port: 6379,
            }),
        );
        self
    }

    pub fn with_unreachable(self, ip: &str) -> Self {
        self.state.lock().unwrap().unreachable.insert(ip.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RedisCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// IPs currently acting as master, sorted.
    pub fn masters(&self) -> Vec<String> {
        let mut masters: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .nodes
            .iter()
            .filter(|(_, following)| following.is_none())
            .map(|(ip, _)| ip.clone())
            .collect();
        masters.sort();
        masters
    }

    pub fn following(&self, ip: &str) -> Option<String> {
        self.state.lock().unwrap().nodes.get(ip).cloned().flatten()
    }

    pub fn monitored(&self, sentinel: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .sentinels
            .get(sentinel)
            .cloned()
            .flatten()
            .map(|m| m.host)
    }

    fn check_reachable(&self, host: &str) -> Result<()> {
        if self.state.lock().unwrap().unreachable.contains(host) {
            return Err(Error::redis(
                host,
                RedisError::UnexpectedReply {
                    command: "PING".to_string(),
                    reply: "connection refused".to_string(),
                },
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RedisOps for FakeRedis {
    async fn info_replication(&self, host: &str, _target: &RedisTarget) -> Result<String> {
        self.check_reachable(host)?;
        let state = self.state.lock().unwrap();
        match state.nodes.get(host) {
            Some(Some(master)) => Ok(format!(
                "# Replication\r\nrole:slave\r\nmaster_host:{master}\r\nmaster_port:6379\r\nmaster_link_status:up\r\n"
            )),
            // A fresh Redis starts as master
            Some(None) | None => {
                Ok("# Replication\r\nrole:master\r\nconnected_slaves:0\r\n".to_string())
            }
        }
    }

    async fn replica_of_no_one(&self, host: &str, _target: &RedisTarget) -> Result<()> {
        self.check_reachable(host)?;
        let mut state = self.state.lock().unwrap();
        state.nodes.insert(host.to_string(), None);
        state.calls.push(RedisCall::ReplicaOfNoOne {
            host: host.to_string(),
        });
        Ok(())
    }

    async fn replica_of(
        &self,
        host: &str,
        _target: &RedisTarget,
        master_host: &str,
    ) -> Result<()> {
        self.check_reachable(host)?;
        let mut state = self.state.lock().unwrap();
        state
            .nodes
            .insert(host.to_string(), Some(master_host.to_string()));
        state.calls.push(RedisCall::ReplicaOf {
            host: host.to_string(),
            master: master_host.to_string(),
        });
        Ok(())
    }

    async fn sentinel_get_master_addr(
        &self,
        sentinel_host: &str,
    ) -> Result<Option<SentinelMaster>> {
        self.check_reachable(sentinel_host)?;
        let state = self.state.lock().unwrap();
        Ok(match state.sentinels.get(sentinel_host) {
            Some(record) => record.clone(),
            // Fresh sentinels load the placeholder monitor
            None => Some(SentinelMaster {
                host: "127.0.0.1".to_string(),
                port: 6379,
            }),
        })
    }

    async fn sentinel_remove(&self, sentinel_host: &str) -> Result<()> {
        self.check_reachable(sentinel_host)?;
        let mut state = self.state.lock().unwrap();
        state.sentinels.insert(sentinel_host.to_string(), None);
        state.calls.push(RedisCall::SentinelRemove {
            sentinel: sentinel_host.to_string(),
        });
        Ok(())
    }

    async fn sentinel_monitor(
        &self,
        sentinel_host: &str,
        master_host: &str,
        master_port: u16,
        quorum: i32,
    ) -> Result<()> {
        self.check_reachable(sentinel_host)?;
        let mut state = self.state.lock().unwrap();
        state.sentinels.insert(
            sentinel_host.to_string(),
            Some(SentinelMaster {
                host: master_host.to_string(),
                port: master_port,
            }),
        );
        state.calls.push(RedisCall::SentinelMonitor {
            sentinel: sentinel_host.to_string(),
            master: master_host.to_string(),
            port: master_port,
            quorum,
        });
        Ok(())
    }

    async fn sentinel_set_auth_pass(&self, sentinel_host: &str, _password: &str) -> Result<()> {
        self.check_reachable(sentinel_host)?;
        self.state
            .lock()
            .unwrap()
            .calls
            .push(RedisCall::SentinelSetAuthPass {
                sentinel: sentinel_host.to_string(),
            });
        Ok(())
    }
}
