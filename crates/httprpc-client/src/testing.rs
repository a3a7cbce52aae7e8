//! In-memory pools and connections for unit tests.

use async_trait::async_trait;
use httprpc_common::protocol::error::{Result, RpcError};
use httprpc_common::transport::{Connection, RequestHead};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::pool::{Pool, PoolManager};

/// What a mock connection answers.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
    pub send_fails: bool,
    pub read_fails: bool,
}

impl Reply {
    pub fn ok(body: &[u8]) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: &[u8]) -> Self {
        Self {
            status,
            body: body.to_vec(),
            send_fails: false,
            read_fails: false,
        }
    }

    pub fn send_error() -> Self {
        Self {
            send_fails: true,
            ..Self::ok(b"")
        }
    }

    pub fn read_error() -> Self {
        Self {
            read_fails: true,
            ..Self::ok(b"")
        }
    }
}

/// One request seen by a mock connection.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub head: RequestHead,
    pub body: Vec<u8>,
    pub rw_timeout: Option<Duration>,
    pub resets: usize,
}

pub struct MockConnection {
    pub reply: Reply,
    pub closed: bool,
    head: RequestHead,
    rw_timeout: Option<Duration>,
    resets: usize,
    status: u16,
    cursor: usize,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl MockConnection {
    pub fn new(reply: Reply, log: Arc<Mutex<Vec<Recorded>>>) -> Self {
        Self {
            reply,
            closed: false,
            head: RequestHead::default(),
            rw_timeout: None,
            resets: 0,
            status: 0,
            cursor: 0,
            log,
        }
    }

    pub fn ok(body: &[u8]) -> Self {
        Self::new(Reply::ok(body), Arc::default())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn reset(&mut self) {
        self.resets += 1;
        self.head = RequestHead::default();
        self.rw_timeout = None;
        self.status = 0;
        self.cursor = 0;
    }

    fn set_rw_timeout(&mut self, timeout: Duration) {
        self.rw_timeout = Some(timeout);
    }

    fn configure_request(&mut self, path: &str, content_type: &str, keep_alive: bool) {
        self.head = RequestHead {
            path: path.to_string(),
            content_type: content_type.to_string(),
            keep_alive,
        };
    }

    async fn send(&mut self, body: &[u8]) -> Result<()> {
        if self.reply.send_fails {
            return Err(RpcError::Send {
                addr: "mock".to_string(),
                reason: "broken pipe".to_string(),
            });
        }
        self.log.lock().unwrap().push(Recorded {
            head: self.head.clone(),
            body: body.to_vec(),
            rw_timeout: self.rw_timeout,
            resets: self.resets,
        });
        self.status = self.reply.status;
        Ok(())
    }

    async fn read_body_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.reply.read_fails {
            return Err(RpcError::Read {
                addr: "mock".to_string(),
                reason: "connection reset".to_string(),
            });
        }
        let rest = &self.reply.body[self.cursor..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.cursor += n;
        Ok(n)
    }

    fn http_status(&self) -> u16 {
        self.status
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

pub struct MockPool {
    addr: String,
    alive: AtomicBool,
    pub reply: Mutex<Reply>,
    pub fail_checkout: AtomicBool,
    pub checkouts: AtomicUsize,
    pub kept: AtomicUsize,
    pub discarded: AtomicUsize,
    pub log: Arc<Mutex<Vec<Recorded>>>,
}

impl MockPool {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            alive: AtomicBool::new(true),
            reply: Mutex::new(Reply::ok(b"")),
            fail_checkout: AtomicBool::new(false),
            checkouts: AtomicUsize::new(0),
            kept: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
            log: Arc::default(),
        }
    }

    pub fn answer(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pool for MockPool {
    fn addr(&self) -> &str {
        &self.addr
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    async fn checkout(&self) -> Result<Box<dyn Connection>> {
        self.checkouts.fetch_add(1, Ordering::SeqCst);
        if self.fail_checkout.load(Ordering::SeqCst) {
            return Err(RpcError::ConnectAcquire {
                addr: self.addr.clone(),
                reason: "connection refused".to_string(),
            });
        }
        let reply = self.reply.lock().unwrap().clone();
        Ok(Box::new(MockConnection::new(reply, self.log.clone())))
    }

    fn checkin(&self, _conn: Box<dyn Connection>, keep: bool) {
        if keep {
            self.kept.fetch_add(1, Ordering::SeqCst);
        } else {
            self.discarded.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Default)]
pub struct MockPoolManager {
    pools: Mutex<HashMap<String, Arc<MockPool>>>,
    pub sets: Mutex<Vec<(String, Duration, Duration)>>,
    pub removed: Mutex<Vec<String>>,
}

impl MockPoolManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pool registered for `addr`; panics if there is none.
    pub fn pool(&self, addr: &str) -> Arc<MockPool> {
        self.pools.lock().unwrap()[addr].clone()
    }

    pub fn set_addrs(&self) -> Vec<String> {
        self.sets.lock().unwrap().iter().map(|(a, _, _)| a.clone()).collect()
    }
}

impl PoolManager for MockPoolManager {
    fn get(&self, addr: &str) -> Option<Arc<dyn Pool>> {
        self.pools
            .lock()
            .unwrap()
            .get(addr)
            .map(|p| p.clone() as Arc<dyn Pool>)
    }

    fn set(&self, addr: &str, connect_timeout: Duration, rw_timeout: Duration) {
        self.sets
            .lock()
            .unwrap()
            .push((addr.to_string(), connect_timeout, rw_timeout));
        self.pools
            .lock()
            .unwrap()
            .entry(addr.to_string())
            .or_insert_with(|| Arc::new(MockPool::new(addr)));
    }

    fn remove(&self, addr: &str) {
        self.removed.lock().unwrap().push(addr.to_string());
        self.pools.lock().unwrap().remove(addr);
    }

    fn pools(&self) -> Vec<Arc<dyn Pool>> {
        self.pools
            .lock()
            .unwrap()
            .values()
            .map(|p| p.clone() as Arc<dyn Pool>)
            .collect()
    }
}
