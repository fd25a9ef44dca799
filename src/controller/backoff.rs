//! Requeue delays per error kind.
//!
//! Reconciles never sleep; a failed pass is simply re-run after the delay
//! chosen here.

use std::time::Duration;

use crate::controller::error::{Error, ErrorKind};

/// A dependent resource is still being created.
pub const NOT_FOUND_DELAY: Duration = Duration::from_secs(5);
/// Pods are starting.
pub const PODS_PENDING_DELAY: Duration = Duration::from_secs(20);
/// Topology needs a failover or a human.
pub const TOPOLOGY_DELAY: Duration = Duration::from_secs(60);
/// Everything else.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(30);

/// Delay bucket for an error kind.
pub fn delay_for(kind: ErrorKind) -> Duration {
    match kind {
        ErrorKind::NotFound => NOT_FOUND_DELAY,
        ErrorKind::AllPodsReadyPending => PODS_PENDING_DELAY,
        ErrorKind::NoMaster | ErrorKind::MasterBeingElected | ErrorKind::MultipleMasters => {
            TOPOLOGY_DELAY
        }
        ErrorKind::Unknown => DEFAULT_DELAY,
    }
}

/// Requeue delay for an error.
pub fn requeue_after(error: &Error) -> Duration {
    delay_for(error.kind())
}
