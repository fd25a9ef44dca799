//! Controller module for redis-operator.
//!
//! Contains the reconcile entry point, the sync pipelines and the pieces
//! they are built from.
//!
//! ## Layers
//!
//! - `reconciler`: one pass per object, phase bookkeeping, requeue policy
//! - `sync`: ordered step lists per cluster mode
//! - `check_and_heal`: master-count check, bootstrap and split-brain healing
//! - `ensure`: idempotent create-or-update of child resources, replica
//!   wiring, sentinel monitors, pod owners and role labels
//! - `node_state` / `topology`: live role queries and role changes
//! - `kube_ops` / `redis_ops`: collaborator traits and their real clients

pub mod backoff;
pub mod check_and_heal;
pub mod context;
pub mod ensure;
pub mod error;
pub mod kube_ops;
pub mod node_state;
pub mod pods;
pub mod reconciler;
pub mod redis_ops;
pub mod status;
pub mod sync;
pub mod topology;
