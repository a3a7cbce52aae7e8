//! HTTP RPC Transport Layer
//!
//! This module provides the connection abstraction the client pools and
//! drives through one request/response exchange at a time.
//!
//! # Architecture
//!
//! - **Transport**: HTTP/1.1 over TCP with keep-alive connections
//! - **Requests**: `POST <service path>` with a caller-supplied content type
//! - **Responses**: status code plus a body read in bounded chunks
//!
//! # Components
//!
//! - **[`Connection`]**: the capability set a pooled connection exposes
//! - **[`HttpConnection`]**: hyper-backed implementation of [`Connection`]
//! - **[`probe`]**: bare TCP reachability check used by the connection monitor

pub mod connection;
pub mod http;

pub use connection::{request_target, Connection, RequestHead};
pub use http::{probe, HttpConnection};
