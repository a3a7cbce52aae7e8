use async_trait::async_trait;
use std::time::Duration;

use crate::protocol::error::Result;

/// Request line and headers configured before each exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub path: String,
    pub content_type: String,
    pub keep_alive: bool,
}

impl Default for RequestHead {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            content_type: "application/json".to_string(),
            keep_alive: true,
        }
    }
}

/// One reusable connection to a single address.
///
/// A connection carries one exchange at a time. The caller drives it as:
/// `reset` → `set_rw_timeout` → `configure_request` → `send` →
/// `read_body_chunk` until it returns 0 → `http_status`.
#[async_trait]
pub trait Connection: Send {
    /// Drops any state left over from the previous exchange.
    fn reset(&mut self);

    fn set_rw_timeout(&mut self, timeout: Duration);

    fn configure_request(&mut self, path: &str, content_type: &str, keep_alive: bool);

    /// Sends the configured request with `body` and waits for the response head.
    async fn send(&mut self, body: &[u8]) -> Result<()>;

    /// Copies the next piece of the response body into `buf`.
    ///
    /// Returns `Ok(0)` once the body is exhausted.
    async fn read_body_chunk(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Status of the last response, 0 before any response arrived.
    fn http_status(&self) -> u16;

    /// Whether the peer or the transport has closed this connection.
    fn is_closed(&self) -> bool;
}

/// Turns a service name into an HTTP request target.
pub fn request_target(service: &str) -> String {
    if service.starts_with('/') {
        service.to_string()
    } else {
        format!("/{}", service)
    }
}
