//! Redis client wrapper using the fred crate.
//!
//! Each client talks to exactly one node (a Redis server or a sentinel).
//! The controller opens a short-lived client per command and closes it
//! afterwards, so no connection state survives between reconciles.

use std::time::Duration;

use fred::cmd;
use fred::prelude::*;
use fred::types::InfoKind;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::client::parsing::ParseError;
use crate::client::types::SentinelMaster;

/// Connection timeout for a single node.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
/// Default timeout for a single command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur during Redis operations.
#[derive(Error, Debug)]
pub enum RedisError {
    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: String, reply: String },
}

/// Client connected to a single Redis or sentinel process.
pub struct RedisClient {
    client: Client,
    host: String,
    port: u16,
}

impl RedisClient {
    /// Connect to a single node.
    ///
    /// # Arguments
    /// * `host` - Pod IP to connect to
    /// * `port` - Port number
    /// * `password` - Optional password for AUTH
    #[instrument(skip_all, fields(host = %host, port = %port))]
    pub async fn connect_single(
        host: &str,
        port: u16,
        password: Option<&str>,
    ) -> Result<Self, RedisError> {
        let config = Config {
            server: ServerConfig::Centralized {
                server: Server::new(host, port),
            },
            password: password.map(str::to_string),
            ..Default::default()
        };

        let client = Builder::from_config(config)
            .with_performance_config(|perf| {
                perf.default_command_timeout = COMMAND_TIMEOUT;
            })
            .with_connection_config(|conn| {
                conn.connection_timeout = CONNECTION_TIMEOUT;
            })
            .build()?;

        client.init().await?;
        debug!("Connected to Redis node");

        Ok(Self {
            client,
            host: host.to_string(),
            port,
        })
    }

    /// Address this client is connected to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Close the connection.
    pub async fn close(&self) -> Result<(), RedisError> {
        self.client.quit().await?;
        Ok(())
    }

    /// Raw `INFO replication` text.
    #[instrument(skip(self), fields(node = %self.address()))]
    pub async fn info_replication(&self) -> Result<String, RedisError> {
        let response: String = self.client.info(Some(InfoKind::Replication)).await?;
        Ok(response)
    }

    /// `REPLICAOF NO ONE`: promote this node to master.
    #[instrument(skip(self), fields(node = %self.address()))]
    pub async fn replica_of_no_one(&self) -> Result<(), RedisError> {
        let _: Value = self
            .client
            .custom(cmd!("REPLICAOF"), vec!["NO", "ONE"])
            .await?;
        Ok(())
    }

    /// `REPLICAOF <host> <port>`: follow the given master.
    #[instrument(skip(self), fields(node = %self.address()))]
    pub async fn replica_of(&self, master_host: &str, master_port: u16) -> Result<(), RedisError> {
        let _: Value = self
            .client
            .custom(
                cmd!("REPLICAOF"),
                vec![master_host.to_string(), master_port.to_string()],
            )
            .await?;
        Ok(())
    }

    /// `SENTINEL get-master-addr-by-name <name>`.
    ///
    /// Returns `None` when the sentinel does not know the group.
    #[instrument(skip(self), fields(node = %self.address()))]
    pub async fn sentinel_get_master_addr(
        &self,
        master_name: &str,
    ) -> Result<Option<SentinelMaster>, RedisError> {
        let reply: Value = self
            .client
            .custom(
                cmd!("SENTINEL"),
                vec!["get-master-addr-by-name", master_name],
            )
            .await?;
        parse_master_addr_reply(reply)
    }

    /// `SENTINEL REMOVE <name>`.
    #[instrument(skip(self), fields(node = %self.address()))]
    pub async fn sentinel_remove(&self, master_name: &str) -> Result<(), RedisError> {
        let _: Value = self
            .client
            .custom(cmd!("SENTINEL"), vec!["REMOVE", master_name])
            .await?;
        Ok(())
    }

    /// `SENTINEL MONITOR <name> <host> <port> <quorum>`.
    #[instrument(skip(self), fields(node = %self.address()))]
    pub async fn sentinel_monitor(
        &self,
        master_name: &str,
        master_host: &str,
        master_port: u16,
        quorum: i32,
    ) -> Result<(), RedisError> {
        let _: Value = self
            .client
            .custom(
                cmd!("SENTINEL"),
                vec![
                    "MONITOR".to_string(),
                    master_name.to_string(),
                    master_host.to_string(),
                    master_port.to_string(),
                    quorum.to_string(),
                ],
            )
            .await?;
        Ok(())
    }

    /// `SENTINEL SET <name> auth-pass <password>`.
    #[instrument(skip(self, password), fields(node = %self.address()))]
    pub async fn sentinel_set_auth_pass(
        &self,
        master_name: &str,
        password: &str,
    ) -> Result<(), RedisError> {
        let _: Value = self
            .client
            .custom(
                cmd!("SENTINEL"),
                vec!["SET", master_name, "auth-pass", password],
            )
            .await?;
        Ok(())
    }
}

/// Interpret the two-element `[host, port]` reply of `get-master-addr-by-name`.
fn parse_master_addr_reply(reply: Value) -> Result<Option<SentinelMaster>, RedisError> {
    let unexpected = |reply: &Value| RedisError::UnexpectedReply {
        command: "SENTINEL get-master-addr-by-name".to_string(),
        reply: format!("{reply:?}"),
    };

    match reply {
        Value::Null => Ok(None),
        Value::Array(ref items) => match items.as_slice() {
            [] => Ok(None),
            [host, port] => {
                let host = host.as_string().ok_or_else(|| unexpected(&reply))?;
                let port = port
                    .as_string()
                    .and_then(|p| p.parse::<u16>().ok())
                    .ok_or_else(|| unexpected(&reply))?;
                Ok(Some(SentinelMaster { host, port }))
            }
            _ => Err(unexpected(&reply)),
        },
        other => Err(unexpected(&other)),
    }
}
