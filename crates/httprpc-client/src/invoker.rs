use httprpc_common::protocol::error::{Result, RpcError};
use httprpc_common::transport::request_target;
use std::time::Duration;
use tracing::debug;

use crate::guard::ConnectionGuard;
use crate::pool::Pool;

/// Size of the buffer response bodies are read through
pub const READ_CHUNK_SIZE: usize = 8192;

/// Performs one request/response exchange against one pool.
///
/// # Connection reuse
///
/// The connection goes back to its pool after a complete exchange, including
/// one that ended in a non-200 status. It is discarded after a transport
/// failure (see [`RpcError::is_transport`]), since the stream may then hold a
/// partial message.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcInvoker;

impl RpcInvoker {
    pub fn new() -> Self {
        Self
    }

    /// Posts `body` to the service path `service` and returns the full
    /// response body.
    ///
    /// A zero `timeout` keeps the read/write timeout of the pool.
    ///
    /// # Errors
    ///
    /// - `RpcError::ConnectAcquire` if no connection could be checked out
    /// - `RpcError::Send`, `RpcError::Read` or `RpcError::Timeout` on I/O failure
    /// - `RpcError::RemoteStatus` carrying the body for any status but 200
    pub async fn attempt(
        &self,
        pool: &dyn Pool,
        service: &str,
        content_type: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let mut conn = ConnectionGuard::acquire(pool).await?;

        conn.reset();
        if !timeout.is_zero() {
            conn.set_rw_timeout(timeout);
        }
        conn.configure_request(&request_target(service), content_type, true);

        if let Err(e) = conn.send(body).await {
            conn.set_keep(!e.is_transport());
            return Err(e);
        }

        let mut response = Vec::new();
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match conn.read_body_chunk(&mut buf).await {
                Ok(0) => break,
                Ok(n) => response.extend_from_slice(&buf[..n]),
                Err(e) => {
                    conn.set_keep(!e.is_transport());
                    return Err(e);
                }
            }
        }

        let status = conn.http_status();
        debug!(
            addr = %pool.addr(),
            service = %service,
            status,
            bytes = response.len(),
            "RPC exchange finished"
        );

        if status != 200 {
            return Err(RpcError::RemoteStatus {
                status,
                body: String::from_utf8_lossy(&response).into_owned(),
            });
        }

        Ok(response)
    }
}
