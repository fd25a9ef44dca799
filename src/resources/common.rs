//! Common resource generation utilities.
//!
//! Names, labels and owner references shared by every generated resource.
//! Labels are handled through [`ResourceLabels`] rather than open maps so
//! the controller only ever reads the keys it owns.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::crd::RedisReplication;

/// Name used as field manager, event reporter and `managed-by` label.
pub const OPERATOR_NAME: &str = "redis-operator";

pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_ROLE: &str = "redisoperator.smoketurner.com/role";

/// Which tier a pod or resource belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Component {
    Redis,
    Sentinel,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Redis => "redis",
            Component::Sentinel => "sentinel",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "redis" => Some(Component::Redis),
            "sentinel" => Some(Component::Sentinel),
            _ => None,
        }
    }
}

/// Value of the role label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoleLabel {
    Master,
    Replica,
    Sentinel,
}

impl RoleLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleLabel::Master => "master",
            RoleLabel::Replica => "replica",
            RoleLabel::Sentinel => "sentinel",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "master" => Some(RoleLabel::Master),
            "replica" => Some(RoleLabel::Replica),
            "sentinel" => Some(RoleLabel::Sentinel),
            _ => None,
        }
    }
}

/// The fixed label set carried by managed resources and pods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceLabels {
    pub controller: String,
    pub component: Component,
    pub instance: String,
    pub role: Option<RoleLabel>,
}

impl ResourceLabels {
    /// Labels for the Redis tier of `resource`.
    pub fn redis(resource: &RedisReplication) -> Self {
        Self::new(resource, Component::Redis)
    }

    /// Labels for the sentinel tier of `resource`.
    pub fn sentinel(resource: &RedisReplication) -> Self {
        Self::new(resource, Component::Sentinel)
    }

    fn new(resource: &RedisReplication, component: Component) -> Self {
        Self {
            controller: OPERATOR_NAME.to_string(),
            component,
            instance: resource.name_any(),
            role: None,
        }
    }

    /// Same labels with the role set.
    pub fn with_role(mut self, role: RoleLabel) -> Self {
        self.role = Some(role);
        self
    }

    /// Labels without the role, as used by workload selectors.
    pub fn selector(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_MANAGED_BY.to_string(), self.controller.clone()),
            (LABEL_COMPONENT.to_string(), self.component.as_str().to_string()),
            (LABEL_INSTANCE.to_string(), self.instance.clone()),
        ])
    }

    /// Full label map, including the role when set.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut labels = self.selector();
        if let Some(role) = self.role {
            labels.insert(LABEL_ROLE.to_string(), role.as_str().to_string());
        }
        labels
    }

    /// Read the known keys from a label map. Unrecognised keys are ignored;
    /// `None` is returned when a required key is missing or has an unknown value.
    pub fn from_map(labels: &BTreeMap<String, String>) -> Option<Self> {
        Some(Self {
            controller: labels.get(LABEL_MANAGED_BY)?.clone(),
            component: Component::parse(labels.get(LABEL_COMPONENT)?)?,
            instance: labels.get(LABEL_INSTANCE)?.clone(),
            role: labels.get(LABEL_ROLE).and_then(|r| RoleLabel::parse(r)),
        })
    }
}

/// Name of the redis.conf ConfigMap and the StatefulSet.
pub fn redis_name(resource: &RedisReplication) -> String {
    resource.name_any()
}

/// Name of the sentinel ConfigMap and Deployment.
pub fn sentinel_name(resource: &RedisReplication) -> String {
    format!("{}-sentinel", resource.name_any())
}

/// Name of the Service selecting pods with `role`.
pub fn role_service_name(resource: &RedisReplication, role: RoleLabel) -> String {
    format!("{}-{}", resource.name_any(), role.as_str())
}

/// Controlling owner reference, set on every generated resource.
pub fn owner_reference(resource: &RedisReplication) -> OwnerReference {
    OwnerReference {
        api_version: RedisReplication::api_version(&()).to_string(),
        kind: RedisReplication::kind(&()).to_string(),
        name: resource.name_any(),
        uid: resource.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Non-controlling owner reference added to pods so their deletion
/// triggers a reconcile of the owning RedisReplication.
pub fn secondary_owner_reference(resource: &RedisReplication) -> OwnerReference {
    OwnerReference {
        api_version: RedisReplication::api_version(&()).to_string(),
        kind: RedisReplication::kind(&()).to_string(),
        name: resource.name_any(),
        uid: resource.uid().unwrap_or_default(),
        controller: None,
        block_owner_deletion: None,
    }
}

/// Whether `meta` already carries a non-controlling reference to `resource`.
pub fn has_secondary_owner(meta: &ObjectMeta, resource: &RedisReplication) -> bool {
    let kind = RedisReplication::kind(&());
    let name = resource.name_any();
    meta.owner_references.iter().flatten().any(|owner| {
        owner.controller != Some(true) && owner.kind == kind && owner.name == name
    })
}

/// Metadata shared by generated resources: name, namespace, labels, owner.
pub fn object_meta(
    resource: &RedisReplication,
    name: String,
    labels: &ResourceLabels,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: resource.namespace(),
        labels: Some(labels.to_map()),
        owner_references: Some(vec![owner_reference(resource)]),
        ..Default::default()
    }
}
