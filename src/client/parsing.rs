//! Parsing of Redis `INFO replication` and sentinel replies.
//!
//! All functions are pure so they can be tested without a server.

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

use crate::client::types::NodeRole;

/// Errors that can occur during parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to compile regex: {0}")]
    RegexCompilation(String),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
}

/// Parse `key:value` lines from INFO output, skipping `#` section headers.
///
/// # Example
/// ```
/// use redis_operator::client::parsing::parse_info_output;
///
/// let info = "# Replication\nrole:slave\nmaster_host:10.0.0.7\n";
/// let parsed = parse_info_output(info).unwrap();
/// assert_eq!(parsed.get("role"), Some(&"slave".to_string()));
/// ```
pub fn parse_info_output(info: &str) -> Result<HashMap<String, String>, ParseError> {
    let kv_regex =
        Regex::new(r"^([\w-]+):(.*)$").map_err(|e| ParseError::RegexCompilation(e.to_string()))?;

    let mut result = HashMap::new();
    for line in info.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(caps) = kv_regex.captures(line)
            && let (Some(key), Some(value)) = (caps.get(1), caps.get(2))
        {
            result.insert(key.as_str().to_string(), value.as_str().trim().to_string());
        }
    }
    Ok(result)
}

/// Extract the address a replica follows from `INFO replication` text.
///
/// Returns `None` when the text carries no IPv4 `master_host`, which is the
/// case for masters.
pub fn parse_master_host(info: &str) -> Result<Option<String>, ParseError> {
    let host_regex = Regex::new(r"master_host:([0-9.]+)")
        .map_err(|e| ParseError::RegexCompilation(e.to_string()))?;
    Ok(host_regex
        .captures(info)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string()))
}

/// Structured view of `INFO replication`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationInfo {
    /// Role reported by the node, if recognised.
    pub role: Option<NodeRole>,
    /// Address of the followed master (replicas only).
    pub master_host: Option<String>,
    /// Port of the followed master (replicas only).
    pub master_port: Option<u16>,
    /// Link status to the master ("up" or "down").
    pub master_link_status: Option<String>,
}

impl ReplicationInfo {
    /// Parse from `INFO replication` output.
    pub fn parse(info: &str) -> Result<Self, ParseError> {
        let parsed = parse_info_output(info)?;
        Ok(ReplicationInfo {
            role: parsed.get("role").and_then(|r| r.parse().ok()),
            master_host: parse_master_host(info)?,
            master_port: parsed.get("master_port").and_then(|v| v.parse().ok()),
            master_link_status: parsed.get("master_link_status").cloned(),
        })
    }

    /// Whether the node is currently a master.
    pub fn is_master(&self) -> bool {
        self.role == Some(NodeRole::Master)
    }
}
