//! Error types for the controller.
//!
//! Every failure a reconcile pass can hit is an [`Error`]; [`ErrorKind`]
//! groups them into the buckets the backoff classifier understands.

use thiserror::Error;

use crate::client::RedisError;

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Error talking to a Redis or sentinel process
    #[error("Redis error on {address}: {source}")]
    Redis {
        address: String,
        #[source]
        source: RedisError,
    },

    /// A dependent resource does not exist yet
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    /// Fewer ready pods than desired
    #[error("{ready}/{desired} {tier} pods ready")]
    PodsNotReady {
        tier: &'static str,
        ready: usize,
        desired: usize,
    },

    /// Plain mode lost its master
    #[error("cluster has no master")]
    NoMaster,

    /// Sentinel mode has no master while sentinels fail over
    #[error("master is being elected")]
    MasterBeingElected,

    /// More than one node claims to be master
    #[error("{0} nodes claim to be master")]
    MultipleMasters(usize),

    /// Bootstrap election found nothing to elect
    #[error("no ready pods available")]
    NoReadyPods,

    /// Validation error in resource spec
    #[error("Validation error: {0}")]
    Validation(String),

    /// clusterMode the controller does not manage
    #[error("cluster mode '{0}' is not supported")]
    UnsupportedMode(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used for requeue delays and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AllPodsReadyPending,
    NoMaster,
    MasterBeingElected,
    MultipleMasters,
    Unknown,
}

impl ErrorKind {
    /// Reason string used in conditions, events and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AllPodsReadyPending => "PodsNotReady",
            ErrorKind::NoMaster => "NoMaster",
            ErrorKind::MasterBeingElected => "MasterBeingElected",
            ErrorKind::MultipleMasters => "MultipleMasters",
            ErrorKind::Unknown => "ReconcileError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Wrap a Redis error with the address it came from.
    pub fn redis(address: impl Into<String>, source: RedisError) -> Self {
        Error::Redis {
            address: address.into(),
            source,
        }
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube(kube::Error::Api(e)) => e.code == 404,
            _ => false,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        if self.is_not_found() {
            return ErrorKind::NotFound;
        }
        match self {
            Error::PodsNotReady { .. } => ErrorKind::AllPodsReadyPending,
            Error::NoMaster => ErrorKind::NoMaster,
            Error::MasterBeingElected => ErrorKind::MasterBeingElected,
            Error::MultipleMasters(_) => ErrorKind::MultipleMasters,
            _ => ErrorKind::Unknown,
        }
    }
}

/// Result type alias for controller operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
