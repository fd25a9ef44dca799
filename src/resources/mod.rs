//! Resource generation module.
//!
//! Pure functions building the Kubernetes resources owned by a
//! RedisReplication. No API calls happen here.
//!
//! ## Resources Generated
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | ConfigMap `<name>` | redis.conf |
//! | ConfigMap `<name>-sentinel` | sentinel.conf (sentinel mode) |
//! | StatefulSet `<name>` | Redis pods |
//! | Deployment `<name>-sentinel` | Sentinel pods (sentinel mode) |
//! | Service `<name>-master` / `-replica` / `-sentinel` | Role-based access |

pub mod common;
pub mod configmap;
pub mod deployment;
pub mod services;
pub mod statefulset;

// Re-export commonly used items from common
pub use common::{ResourceLabels, RoleLabel, owner_reference, secondary_owner_reference};
