use async_trait::async_trait;
use httprpc_common::protocol::error::Result;
use httprpc_common::transport::{Connection, HttpConnection};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;

/// A set of reusable connections to one address.
///
/// Pools are shared between every task dispatching to that address, so all
/// methods take `&self` and implementations synchronize internally.
#[async_trait]
pub trait Pool: Send + Sync {
    fn addr(&self) -> &str;

    /// Whether the address is currently believed reachable.
    fn is_alive(&self) -> bool;

    /// Records the outcome of an external reachability check.
    fn set_alive(&self, alive: bool);

    /// Takes an idle connection or opens a new one.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::ConnectAcquire` when no connection can be produced.
    async fn checkout(&self) -> Result<Box<dyn Connection>>;

    /// Hands a connection back. With `keep == false` the connection is
    /// dropped instead of being parked for reuse.
    fn checkin(&self, conn: Box<dyn Connection>, keep: bool);
}

/// Keyed store of pools, one per address.
pub trait PoolManager: Send + Sync {
    fn get(&self, addr: &str) -> Option<Arc<dyn Pool>>;

    /// Registers `addr`. An address that already has a pool keeps it, along
    /// with the timeouts it was first registered with.
    fn set(&self, addr: &str, connect_timeout: Duration, rw_timeout: Duration);

    fn remove(&self, addr: &str);

    /// Snapshot of every registered pool.
    fn pools(&self) -> Vec<Arc<dyn Pool>>;
}

/// Pool of keep-alive HTTP connections to one address.
///
/// # Architecture
///
/// - Idle connections are reused LIFO; ones whose transport closed while
///   parked are discarded at checkout
/// - At most `max_idle` connections are parked, extras are closed on checkin
/// - A failed connect marks the pool dead; it becomes eligible again after
///   `retry_interval`, or as soon as the connection monitor reaches it
pub struct HttpPool {
    addr: String,
    connect_timeout: Duration,
    rw_timeout: Duration,
    max_idle: usize,
    retry_interval: Duration,
    idle: Mutex<Vec<Box<dyn Connection>>>,
    dead_since: Mutex<Option<Instant>>,
}

impl HttpPool {
    pub fn new(
        addr: impl Into<String>,
        connect_timeout: Duration,
        rw_timeout: Duration,
        max_idle: usize,
        retry_interval: Duration,
    ) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            rw_timeout,
            max_idle,
            retry_interval,
            idle: Mutex::new(Vec::new()),
            dead_since: Mutex::new(None),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn rw_timeout(&self) -> Duration {
        self.rw_timeout
    }

    /// Number of parked connections.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn take_idle(&self) -> Option<Box<dyn Connection>> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(conn) = idle.pop() {
            if conn.is_closed() {
                debug!(addr = %self.addr, "Removing closed connection from pool");
                continue;
            }
            return Some(conn);
        }
        None
    }
}

#[async_trait]
impl Pool for HttpPool {
    fn addr(&self) -> &str {
        &self.addr
    }

    fn is_alive(&self) -> bool {
        match *self.dead_since.lock().unwrap_or_else(PoisonError::into_inner) {
            None => true,
            Some(since) => since.elapsed() >= self.retry_interval,
        }
    }

    fn set_alive(&self, alive: bool) {
        let mut dead_since = self.dead_since.lock().unwrap_or_else(PoisonError::into_inner);
        match (alive, dead_since.is_some()) {
            (true, true) => {
                info!(addr = %self.addr, "Pool is alive again");
                *dead_since = None;
            }
            (false, false) => {
                warn!(addr = %self.addr, "Pool marked dead");
                *dead_since = Some(Instant::now());
            }
            // Refresh the timestamp so the retry interval restarts
            (false, true) => *dead_since = Some(Instant::now()),
            (true, false) => {}
        }
    }

    async fn checkout(&self) -> Result<Box<dyn Connection>> {
        if let Some(conn) = self.take_idle() {
            return Ok(conn);
        }

        match HttpConnection::connect(&self.addr, self.connect_timeout, self.rw_timeout).await {
            Ok(conn) => {
                self.set_alive(true);
                Ok(Box::new(conn))
            }
            Err(e) => {
                self.set_alive(false);
                Err(e)
            }
        }
    }

    fn checkin(&self, conn: Box<dyn Connection>, keep: bool) {
        if !keep || conn.is_closed() {
            debug!(addr = %self.addr, "Dropping connection instead of returning it to pool");
            return;
        }

        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }
}

/// [`PoolManager`] handing out [`HttpPool`]s.
pub struct HttpPoolManager {
    pools: RwLock<HashMap<String, Arc<HttpPool>>>,
    max_idle: usize,
    retry_interval: Duration,
}

impl HttpPoolManager {
    pub fn new(max_idle: usize, retry_interval: Duration) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            max_idle,
            retry_interval,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.pool_max_idle, config.pool_retry_interval())
    }

    /// Concrete pool for `addr`, for callers needing [`HttpPool`] specifics.
    pub fn http_pool(&self, addr: &str) -> Option<Arc<HttpPool>> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(addr)
            .cloned()
    }
}

impl Default for HttpPoolManager {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl PoolManager for HttpPoolManager {
    fn get(&self, addr: &str) -> Option<Arc<dyn Pool>> {
        self.http_pool(addr).map(|pool| pool as Arc<dyn Pool>)
    }

    fn set(&self, addr: &str, connect_timeout: Duration, rw_timeout: Duration) {
        let mut pools = self.pools.write().unwrap_or_else(PoisonError::into_inner);
        pools.entry(addr.to_string()).or_insert_with(|| {
            debug!(addr = %addr, "Creating connection pool");
            Arc::new(HttpPool::new(
                addr,
                connect_timeout,
                rw_timeout,
                self.max_idle,
                self.retry_interval,
            ))
        });
    }

    fn remove(&self, addr: &str) {
        let removed = self
            .pools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(addr);
        if removed.is_some() {
            debug!(addr = %addr, "Removed connection pool");
        }
    }

    fn pools(&self) -> Vec<Arc<dyn Pool>> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|pool| pool.clone() as Arc<dyn Pool>)
            .collect()
    }
}
