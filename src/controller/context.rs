//! Shared context for the controller.
//!
//! The Context holds the platform and store collaborators handed to every
//! reconcile, plus the event reporter and health state.

use std::sync::Arc;

use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};

use crate::controller::kube_ops::{KubeOps, KubeOpsImpl};
use crate::controller::redis_ops::{FredRedisOps, RedisOps};
use crate::crd::RedisReplication;
use crate::health::HealthState;
use crate::resources::common::OPERATOR_NAME;

/// Field manager name for the operator
pub const FIELD_MANAGER: &str = OPERATOR_NAME;

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Orchestration-platform operations
    pub kube: Arc<dyn KubeOps>,
    /// Store-protocol operations
    pub redis: Arc<dyn RedisOps>,
    /// Kubernetes client used for events. `None` disables events.
    client: Option<Client>,
    /// Event reporter identity
    reporter: Reporter,
    /// Optional health state for metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
}

impl Context {
    /// Create a context backed by a real cluster
    pub fn new(client: Client, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            kube: Arc::new(KubeOpsImpl::new(client.clone())),
            redis: Arc::new(FredRedisOps::new()),
            client: Some(client),
            reporter: reporter(),
            health_state,
        }
    }

    /// Create a context from arbitrary collaborators. Events are not published.
    pub fn with_ops(
        kube: Arc<dyn KubeOps>,
        redis: Arc<dyn RedisOps>,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        Self {
            kube,
            redis,
            client: None,
            reporter: reporter(),
            health_state,
        }
    }

    /// Publish a normal event for a resource
    pub async fn publish_normal_event(
        &self,
        resource: &RedisReplication,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.publish(resource, EventType::Normal, reason, action, note)
            .await;
    }

    /// Publish a warning event for a resource
    pub async fn publish_warning_event(
        &self,
        resource: &RedisReplication,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.publish(resource, EventType::Warning, reason, action, note)
            .await;
    }

    async fn publish(
        &self,
        resource: &RedisReplication,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let Some(client) = self.client.clone() else {
            tracing::debug!(reason = %reason, "Event publishing disabled");
            return;
        };
        let recorder = Recorder::new(client, self.reporter.clone());
        let object_ref = resource.object_ref(&());
        if let Err(e) = recorder
            .publish(
                &Event {
                    type_,
                    reason: reason.into(),
                    note,
                    action: action.into(),
                    secondary: None,
                },
                &object_ref,
            )
            .await
        {
            tracing::warn!(reason = %reason, error = %e, "Failed to publish event");
        }
    }
}

fn reporter() -> Reporter {
    Reporter {
        controller: FIELD_MANAGER.into(),
        instance: std::env::var("POD_NAME").ok(),
    }
}
