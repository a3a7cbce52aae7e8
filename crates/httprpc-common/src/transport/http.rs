//! HTTP/1.1 client connection
//!
//! [`HttpConnection`] owns one TCP stream driven through hyper's low-level
//! client connection API, so the stream is never shared between callers and
//! can be parked in a pool between exchanges.

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::client::conn::http1::{self, SendRequest};
use hyper::header::{CONNECTION, CONTENT_TYPE, HOST};
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use super::connection::{Connection, RequestHead};
use crate::protocol::error::{Result, RpcError};

/// A keep-alive HTTP/1.1 connection to one address.
///
/// # Example
///
/// ```no_run
/// use httprpc_common::transport::{Connection, HttpConnection};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let secs = Duration::from_secs(5);
/// let mut conn = HttpConnection::connect("127.0.0.1:8080", secs, secs).await?;
/// conn.configure_request("/orders", "application/json", true);
/// conn.send(b"{}").await?;
///
/// let mut buf = [0u8; 8192];
/// while conn.read_body_chunk(&mut buf).await? > 0 {}
/// println!("status {}", conn.http_status());
/// # Ok(())
/// # }
/// ```
pub struct HttpConnection {
    addr: String,
    sender: SendRequest<Full<Bytes>>,
    /// Timeout restored by `reset`
    base_rw_timeout: Duration,
    rw_timeout: Duration,
    head: RequestHead,
    body: Option<Incoming>,
    pending: Bytes,
    status: u16,
}

impl HttpConnection {
    /// Opens a TCP connection to `addr` and performs the HTTP/1.1 handshake.
    ///
    /// `rw_timeout` applies to every exchange unless overridden with
    /// [`set_rw_timeout`](Connection::set_rw_timeout) until the next `reset`.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::ConnectAcquire` if the address does not answer within
    /// `connect_timeout` or the handshake fails.
    pub async fn connect(addr: &str, connect_timeout: Duration, rw_timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| RpcError::ConnectAcquire {
                addr: addr.to_string(),
                reason: format!("connect timed out after {}ms", connect_timeout.as_millis()),
            })?
            .map_err(|e| RpcError::ConnectAcquire {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        let _ = stream.set_nodelay(true);

        let (sender, conn) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| RpcError::ConnectAcquire {
                addr: addr.to_string(),
                reason: format!("handshake failed: {}", e),
            })?;

        let conn_addr = addr.to_string();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(addr = %conn_addr, "connection closed with error: {}", e);
            }
        });

        Ok(Self {
            addr: addr.to_string(),
            sender,
            base_rw_timeout: rw_timeout,
            rw_timeout,
            head: RequestHead::default(),
            body: None,
            pending: Bytes::new(),
            status: 0,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Connection for HttpConnection {
    fn reset(&mut self) {
        self.head = RequestHead::default();
        self.rw_timeout = self.base_rw_timeout;
        self.body = None;
        self.pending = Bytes::new();
        self.status = 0;
    }

    fn set_rw_timeout(&mut self, timeout: Duration) {
        self.rw_timeout = timeout;
    }

    fn configure_request(&mut self, path: &str, content_type: &str, keep_alive: bool) {
        self.head = RequestHead {
            path: path.to_string(),
            content_type: content_type.to_string(),
            keep_alive,
        };
    }

    async fn send(&mut self, body: &[u8]) -> Result<()> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.head.path.as_str())
            .header(HOST, self.addr.as_str())
            .header(CONTENT_TYPE, self.head.content_type.as_str())
            .header(CONNECTION, if self.head.keep_alive { "keep-alive" } else { "close" })
            .body(Full::new(Bytes::copy_from_slice(body)))
            .map_err(|e| RpcError::Send {
                addr: self.addr.clone(),
                reason: format!("failed to build request: {}", e),
            })?;

        let (rw_timeout, addr) = (self.rw_timeout, self.addr.clone());
        let sender = &mut self.sender;
        let exchange = async move {
            sender.ready().await?;
            sender.send_request(request).await
        };
        let response = tokio::time::timeout(rw_timeout, exchange)
            .await
            .map_err(|_| RpcError::Timeout {
                addr: addr.clone(),
                elapsed: rw_timeout,
            })?
            .map_err(|e| RpcError::Send {
                addr,
                reason: e.to_string(),
            })?;

        self.status = response.status().as_u16();
        self.body = Some(response.into_body());
        Ok(())
    }

    async fn read_body_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if !self.pending.is_empty() {
                let n = buf.len().min(self.pending.len());
                buf[..n].copy_from_slice(&self.pending[..n]);
                self.pending = self.pending.split_off(n);
                return Ok(n);
            }

            let Some(mut body) = self.body.take() else {
                return Ok(0);
            };
            let rw_timeout = self.rw_timeout;
            let frame = tokio::time::timeout(rw_timeout, body.frame())
                .await
                .map_err(|_| RpcError::Timeout {
                    addr: self.addr.clone(),
                    elapsed: rw_timeout,
                })?;

            match frame {
                None => return Ok(0),
                Some(Err(e)) => {
                    return Err(RpcError::Read {
                        addr: self.addr.clone(),
                        reason: e.to_string(),
                    })
                }
                Some(Ok(frame)) => {
                    // Trailers carry no body bytes
                    if let Ok(data) = frame.into_data() {
                        self.pending = data;
                    }
                    self.body = Some(body);
                }
            }
        }
    }

    fn http_status(&self) -> u16 {
        self.status
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Checks that `addr` accepts TCP connections within `timeout`.
pub async fn probe(addr: &str, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(RpcError::ConnectAcquire {
            addr: addr.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(RpcError::Timeout {
            addr: addr.to_string(),
            elapsed: timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::server::conn::http1 as server_http1;
    use hyper::service::service_fn;
    use hyper::{Response, StatusCode};
    use std::convert::Infallible;
    use tokio::net::TcpListener;

    const SECS_1: Duration = Duration::from_secs(1);

    /// Serves every connection with a handler that answers with `status` and
    /// echoes the request path, content type and body back.
    async fn spawn_echo_server(status: StatusCode) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| async move {
                        let path = req.uri().path().to_string();
                        let content_type = req
                            .headers()
                            .get(CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("")
                            .to_string();
                        let body = req.into_body().collect().await.unwrap().to_bytes();
                        let reply = format!(
                            "{} {} {}",
                            path,
                            content_type,
                            String::from_utf8_lossy(&body)
                        );
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(status)
                                .body(Full::new(Bytes::from(reply)))
                                .unwrap(),
                        )
                    });
                    let _ = server_http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        addr
    }

    async fn read_all(conn: &mut HttpConnection) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = conn.read_body_chunk(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[tokio::test]
    async fn test_exchange_reads_body_in_small_chunks() {
        let addr = spawn_echo_server(StatusCode::OK).await;
        let mut conn = HttpConnection::connect(&addr, SECS_1, SECS_1)
            .await
            .unwrap();

        conn.configure_request("/orders", "text/plain", true);
        conn.send(b"hello").await.unwrap();
        let body = read_all(&mut conn).await;

        assert_eq!(conn.http_status(), 200);
        assert_eq!(body, b"/orders text/plain hello");
    }

    #[tokio::test]
    async fn test_connection_is_reused_after_reset() {
        let addr = spawn_echo_server(StatusCode::OK).await;
        let mut conn = HttpConnection::connect(&addr, SECS_1, SECS_1)
            .await
            .unwrap();

        for i in 0..3 {
            conn.set_rw_timeout(Duration::from_millis(1));
            conn.reset();
            assert_eq!(conn.http_status(), 0);
            assert_eq!(conn.rw_timeout, SECS_1);
            conn.configure_request("/echo", "application/json", true);
            conn.send(format!("{}", i).as_bytes()).await.unwrap();
            let body = read_all(&mut conn).await;
            assert_eq!(body, format!("/echo application/json {}", i).as_bytes());
        }
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_non_200_status_is_reported() {
        let addr = spawn_echo_server(StatusCode::NOT_FOUND).await;
        let mut conn = HttpConnection::connect(&addr, SECS_1, SECS_1)
            .await
            .unwrap();

        conn.configure_request("/missing", "application/json", true);
        conn.send(b"").await.unwrap();
        read_all(&mut conn).await;
        assert_eq!(conn.http_status(), 404);
    }

    #[tokio::test]
    async fn test_connect_refused_is_acquire_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = HttpConnection::connect(&addr, SECS_1, SECS_1).await;
        assert!(matches!(result, Err(RpcError::ConnectAcquire { .. })));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        // Accepts but never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let mut conn = HttpConnection::connect(&addr, SECS_1, SECS_1)
            .await
            .unwrap();
        conn.set_rw_timeout(Duration::from_millis(100));
        conn.configure_request("/slow", "application/json", true);

        let result = conn.send(b"{}").await;
        assert!(matches!(result, Err(RpcError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_probe() {
        let addr = spawn_echo_server(StatusCode::OK).await;
        assert!(probe(&addr, Duration::from_secs(1)).await.is_ok());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = listener.local_addr().unwrap().to_string();
        drop(listener);
        assert!(probe(&dead, Duration::from_secs(1)).await.is_err());
    }
}
