//! Reconciliation loop for RedisReplication.
//!
//! One pass re-reads the object, records its phase, runs the sync pipeline
//! for its mode and turns the first error into a requeue delay. Passes never
//! sleep; waiting is always a requeue.

use std::sync::Arc;
use std::time::Instant;

use kube::{ResourceExt, runtime::controller::Action};
use tracing::{debug, error, info, warn};

use crate::controller::backoff::requeue_after;
use crate::controller::check_and_heal::HealOutcome;
use crate::controller::context::Context;
use crate::controller::error::{Error, ErrorKind};
use crate::controller::status::{CONVERGED_REASON, ConditionBuilder, advance_phase};
use crate::controller::sync::{SyncReport, Syncer};
use crate::crd::{RedisPhase, RedisReplication, RedisReplicationStatus};

/// Reconcile a RedisReplication
pub async fn reconcile(obj: Arc<RedisReplication>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    debug!(name = %name, namespace = %namespace, "Reconciling RedisReplication");

    // The cached copy may be stale; act on the latest version
    let Some(current) = ctx.kube.get_redis_replication(&namespace, &name).await? else {
        debug!(name = %name, namespace = %namespace, "RedisReplication no longer exists");
        return Ok(Action::await_change());
    };

    let result = reconcile_object(&current, &ctx, &namespace).await;

    if let Some(ref health_state) = ctx.health_state {
        let duration = start_time.elapsed().as_secs_f64();
        health_state
            .metrics
            .record_reconcile(&namespace, &name, duration);
    }
    result
}

async fn reconcile_object(
    obj: &RedisReplication,
    ctx: &Context,
    namespace: &str,
) -> Result<Action, Error> {
    let name = obj.name_any();
    let generation = obj.metadata.generation;
    let mut status = obj.status.clone().unwrap_or_default();

    let phase = advance_phase(obj.status.as_ref(), generation);
    if status.phase != Some(phase) {
        info!(
            name = %name,
            from = ?status.phase,
            to = %phase,
            "Phase transition"
        );
        status.phase = Some(phase);
        ctx.kube.patch_redis_status(namespace, &name, &status).await?;
    }

    let outcome = match obj.spec.validate() {
        Ok(()) => {
            Syncer::new(ctx.kube.as_ref(), ctx.redis.as_ref())
                .sync(obj, phase)
                .await
        }
        Err(message) => Err(Error::Validation(message)),
    };

    match outcome {
        Ok(report) => {
            on_converged(obj, ctx, namespace, status, &report).await?;
            Ok(Action::await_change())
        }
        Err(e) => on_failed(obj, ctx, namespace, status, e).await,
    }
}

/// Mark the object running, record what healing did and stop requeueing.
async fn on_converged(
    obj: &RedisReplication,
    ctx: &Context,
    namespace: &str,
    mut status: RedisReplicationStatus,
    report: &SyncReport,
) -> Result<(), Error> {
    let name = obj.name_any();
    let generation = obj.metadata.generation;

    match &report.heal {
        Some(HealOutcome::Bootstrapped { master }) => {
            ctx.publish_normal_event(
                obj,
                "MasterElected",
                "Bootstrap",
                Some(format!("Elected {master} as master")),
            )
            .await;
        }
        Some(HealOutcome::Demoted { endorsed, demoted }) => {
            ctx.publish_normal_event(
                obj,
                "SplitBrainHealed",
                "Heal",
                Some(format!(
                    "Attached {} to sentinel-endorsed master {endorsed}",
                    demoted.join(", ")
                )),
            )
            .await;
        }
        Some(HealOutcome::Converged) | None => {}
    }

    if let Some(ref health_state) = ctx.health_state {
        let metrics = &health_state.metrics;
        match &report.heal {
            Some(HealOutcome::Bootstrapped { .. }) => metrics.record_heal("bootstrap", 1),
            Some(HealOutcome::Demoted { demoted, .. }) => {
                metrics.record_heal("demote_master", demoted.len() as u64)
            }
            _ => {}
        }
        metrics.record_heal("repoint_replica", report.replicas_repointed as u64);
        metrics.record_heal("reconfigure_sentinel", report.sentinels_reconfigured as u64);
    }

    let newly_running =
        status.phase != Some(RedisPhase::Running) || status.observed_generation != generation;

    let mut conditions = ConditionBuilder::from_existing(std::mem::take(&mut status.conditions));
    conditions.ready(true, CONVERGED_REASON, "Topology converged", generation);
    let conditions_changed = conditions.is_changed();
    status.conditions = conditions.build();

    if newly_running || conditions_changed {
        status.phase = Some(RedisPhase::Running);
        status.observed_generation = generation;
        ctx.kube.patch_redis_status(namespace, &name, &status).await?;
    }

    if newly_running {
        info!(name = %name, namespace = %namespace, "RedisReplication is running");
        ctx.publish_normal_event(
            obj,
            "Running",
            "Reconciling",
            Some(format!(
                "{} replicas converged in {} mode",
                obj.spec.replicas, obj.spec.cluster_mode
            )),
        )
        .await;
    }
    Ok(())
}

/// Log, publish and record a failed pass, then requeue at the classified delay.
///
/// The phase is left untouched.
async fn on_failed(
    obj: &RedisReplication,
    ctx: &Context,
    namespace: &str,
    mut status: RedisReplicationStatus,
    error: Error,
) -> Result<Action, Error> {
    let name = obj.name_any();
    let kind = error.kind();
    let delay = requeue_after(&error);
    let reason = failure_reason(&error);

    log_failure(&name, namespace, &error, kind, delay);

    match &error {
        Error::NoMaster | Error::MultipleMasters(_) | Error::UnsupportedMode(_) => {
            ctx.publish_warning_event(obj, reason, "Reconciling", Some(error.to_string()))
                .await;
        }
        Error::Validation(_) => {
            ctx.publish_warning_event(obj, reason, "Validating", Some(error.to_string()))
                .await;
        }
        _ => {}
    }

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(namespace, &name);
        health_state.metrics.record_requeue(kind.as_str());
    }

    let mut conditions = ConditionBuilder::from_existing(std::mem::take(&mut status.conditions));
    conditions.ready(false, reason, &error.to_string(), obj.metadata.generation);
    if conditions.is_changed() {
        status.conditions = conditions.build();
        // Best effort: the requeue below matters more than the condition
        if let Err(e) = ctx.kube.patch_redis_status(namespace, &name, &status).await {
            warn!(name = %name, error = %e, "Failed to update Ready condition");
        }
    }

    Ok(Action::requeue(delay))
}

/// Reason string for the Ready condition and warning events.
pub fn failure_reason(error: &Error) -> &'static str {
    match error {
        Error::Validation(_) => "InvalidSpec",
        Error::UnsupportedMode(_) => "UnsupportedMode",
        other => other.kind().as_str(),
    }
}

fn log_failure(
    name: &str,
    namespace: &str,
    error: &Error,
    kind: ErrorKind,
    delay: std::time::Duration,
) {
    let retry_secs = delay.as_secs();
    match kind {
        ErrorKind::NotFound => {
            debug!(name = %name, namespace = %namespace, error = %error, retry_secs, "Dependent resource not found")
        }
        ErrorKind::AllPodsReadyPending => {
            info!(name = %name, namespace = %namespace, error = %error, retry_secs, "Waiting for pods")
        }
        ErrorKind::MasterBeingElected | ErrorKind::MultipleMasters => {
            warn!(name = %name, namespace = %namespace, error = %error, retry_secs, "Topology not converged")
        }
        ErrorKind::NoMaster => {
            error!(
                name = %name,
                namespace = %namespace,
                retry_secs,
                "Cluster has no master; promote a replica manually"
            )
        }
        ErrorKind::Unknown => {
            error!(name = %name, namespace = %namespace, error = %error, retry_secs, "Reconcile failed")
        }
    }
}

/// Error policy for the controller
///
/// Only errors escaping `reconcile` itself (reading the object or writing
/// its phase) reach here.
pub fn error_policy(obj: Arc<RedisReplication>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(&namespace, &name);
        health_state.metrics.record_requeue(error.kind().as_str());
    }

    let delay = requeue_after(error);
    log_failure(&name, &namespace, error, error.kind(), delay);
    Action::requeue(delay)
}
