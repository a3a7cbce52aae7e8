//! httprpc Common Types and Transport
//!
//! This crate provides the wire types, error handling and HTTP connection
//! transport shared by the httprpc client and its command-line front end.
//!
//! # Overview
//!
//! httprpc issues POST-style RPC calls over pooled keep-alive HTTP/1.1
//! connections. Callers address services by name; a nameserver maps names
//! to `host:port` addresses and is itself reached through the same mechanism.
//!
//! - **Protocol Layer**: nameserver request/response bodies, [`RpcStatus`],
//!   [`RpcError`] and JSON marshalling
//! - **Transport Layer**: the [`Connection`](transport::Connection) capability
//!   set and its hyper-backed implementation
//!
//! # Example
//!
//! ```
//! use httprpc_common::{RpcError, RpcStatus};
//!
//! let result: Result<(), RpcError> = Err(RpcError::RemoteStatus {
//!     status: 404,
//!     body: "not found".to_string(),
//! });
//! assert_eq!(RpcStatus::from(&result), RpcStatus::new(404, "not found"));
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
