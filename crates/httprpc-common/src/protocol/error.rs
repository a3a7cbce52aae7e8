use std::time::Duration;

use thiserror::Error;

use super::status::RpcStatus;

/// Failure of a single RPC call, a nameserver lookup or client setup.
///
/// Transport-level variants (`ConnectAcquire`, `Send`, `Read`, `Timeout`)
/// describe a broken exchange. `RemoteStatus` is an application-level failure:
/// the exchange completed but the peer answered with a status other than 200.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("failed to resolve service {0}: no reachable endpoint")]
    Resolution(String),

    #[error("failed to acquire connection from {addr}: {reason}")]
    ConnectAcquire { addr: String, reason: String },

    #[error("failed to send request to {addr}: {reason}")]
    Send { addr: String, reason: String },

    #[error("failed to read response from {addr}: {reason}")]
    Read { addr: String, reason: String },

    #[error("timed out after {}ms talking to {addr}", .elapsed.as_millis())]
    Timeout { addr: String, elapsed: Duration },

    #[error("{body}")]
    RemoteStatus { status: u16, body: String },

    #[error("marshal error: {0}")]
    Marshal(String),

    #[error("nameserver replied with status {0:?}")]
    Protocol(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RpcError {
    /// Whether the connection that produced this error must be dropped
    /// instead of being returned to its pool.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RpcError::Send { .. } | RpcError::Read { .. } | RpcError::Timeout { .. }
        )
    }

    /// Code/message pair for this failure.
    pub fn status(&self) -> RpcStatus {
        match self {
            RpcError::RemoteStatus { status, body } => RpcStatus::new(i32::from(*status), body.clone()),
            other => RpcStatus::local(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Marshal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
