//! Service generation for role-based access.
//!
//! Creates one Service per role:
//! - **master**: the single writable node
//! - **replica**: read-only nodes
//! - **sentinel**: the sentinel tier (sentinel mode only)
//!
//! Each selects pods by the role label the controller keeps in sync with
//! the live replication role.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::crd::{RedisReplication, SENTINEL_PORT};
use crate::resources::common::{ResourceLabels, RoleLabel, object_meta, role_service_name};

/// Generate the Service selecting pods labelled with `role`.
pub fn generate_role_service(
    resource: &RedisReplication,
    role: RoleLabel,
    redis_port: u16,
) -> Service {
    let (labels, port_name, port) = match role {
        RoleLabel::Master | RoleLabel::Replica => {
            (ResourceLabels::redis(resource), "redis", redis_port)
        }
        RoleLabel::Sentinel => (ResourceLabels::sentinel(resource), "sentinel", SENTINEL_PORT),
    };
    let labels = labels.with_role(role);

    Service {
        metadata: object_meta(resource, role_service_name(resource, role), &labels),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(labels.to_map()),
            ports: Some(vec![ServicePort {
                name: Some(port_name.to_string()),
                port: i32::from(port),
                target_port: Some(IntOrString::Int(i32::from(port))),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// All Services for `resource`: master and replica, plus sentinel when
/// a sentinel tier is managed.
pub fn generate_services(resource: &RedisReplication, redis_port: u16) -> Vec<Service> {
    let mut roles = vec![RoleLabel::Master, RoleLabel::Replica];
    if resource.spec.has_sentinels() {
        roles.push(RoleLabel::Sentinel);
    }
    roles
        .into_iter()
        .map(|role| generate_role_service(resource, role, redis_port))
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap
)]
mod tests {
    use super::*;
    use crate::crd::ClusterMode;
    use crate::resources::common::tests::test_resource;
    use crate::resources::common::{LABEL_COMPONENT, LABEL_ROLE};

    #[test]
    fn test_master_service_selects_master_role() {
        let resource = test_resource("cache", ClusterMode::MasterSlave);
        let service = generate_role_service(&resource, RoleLabel::Master, 6379);

        assert_eq!(service.metadata.name.as_deref(), Some("cache-master"));
        let spec = service.spec.unwrap();
        let selector = spec.selector.unwrap();
        assert_eq!(selector.get(LABEL_ROLE), Some(&"master".to_string()));
        assert_eq!(selector.get(LABEL_COMPONENT), Some(&"redis".to_string()));
        assert_eq!(spec.ports.unwrap()[0].port, 6379);
    }

    #[test]
    fn test_sentinel_service_uses_sentinel_port() {
        let resource = test_resource("cache", ClusterMode::Sentinel);
        let service = generate_role_service(&resource, RoleLabel::Sentinel, 6379);

        let spec = service.spec.unwrap();
        assert_eq!(spec.ports.unwrap()[0].port, 26379);
        assert_eq!(
            spec.selector.unwrap().get(LABEL_COMPONENT),
            Some(&"sentinel".to_string())
        );
    }

    #[test]
    fn test_generate_services_per_mode() {
        let plain = test_resource("cache", ClusterMode::MasterSlave);
        let names: Vec<_> = generate_services(&plain, 6379)
            .into_iter()
            .map(|s| s.metadata.name.unwrap())
            .collect();
        assert_eq!(names, vec!["cache-master", "cache-replica"]);

        let monitored = test_resource("cache", ClusterMode::Sentinel);
        assert_eq!(generate_services(&monitored, 6379).len(), 3);
    }
}
