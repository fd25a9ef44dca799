//! Types shared by the Redis client and the controller.

use std::str::FromStr;

use crate::client::parsing::ParseError;

/// Replication role of a Redis node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Master,
    Replica,
}

impl NodeRole {
    /// Value used for the role label on pods.
    pub fn label_value(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::Replica => "replica",
        }
    }
}

impl FromStr for NodeRole {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "master" => Ok(NodeRole::Master),
            // INFO reports "slave"; labels use "replica"
            "slave" | "replica" => Ok(NodeRole::Replica),
            other => Err(ParseError::UnexpectedReply(format!("unknown role: {other}"))),
        }
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label_value())
    }
}

/// Connection settings for the Redis tier of one RedisReplication.
#[derive(Clone, PartialEq, Eq)]
pub struct RedisTarget {
    /// Port every Redis pod listens on.
    pub port: u16,
    /// Password sent with AUTH, if `requirepass` is set.
    pub password: Option<String>,
}

impl RedisTarget {
    pub fn new(port: u16, password: Option<String>) -> Self {
        Self { port, password }
    }
}

// Keep the password out of logs.
impl std::fmt::Debug for RedisTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTarget")
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Master address a sentinel reports for the monitored group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelMaster {
    pub host: String,
    pub port: u16,
}
