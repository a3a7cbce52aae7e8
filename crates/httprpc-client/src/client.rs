use httprpc_common::protocol::error::{Result, RpcError};
use httprpc_common::protocol::nameserver::NAMESERVER_SERVICES;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::balancer::RoundRobin;
use crate::config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::monitor::{ConnectionMonitor, MonitorConfig};
use crate::nameserver::NameserverClient;
use crate::pool::{HttpPoolManager, PoolManager};
use crate::registry::{ReconcilePolicy, ServiceRegistry};
use crate::sync::{SyncReport, SyncScheduler, SyncWorker};

struct MonitorTask {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// HTTP RPC client addressing services by name.
///
/// Addresses are registered explicitly with [`add_service`](Self::add_service)
/// or discovered through a nameserver registered with
/// [`add_nameserver`](Self::add_nameserver). Calls go round robin over the
/// live addresses of a service and fail over to the next one on error.
///
/// The client is `Send + Sync`; share it behind an `Arc` to call it from many
/// tasks. Background tasks need a tokio runtime and stop when the client is
/// dropped or [`shutdown`](Self::shutdown) is awaited.
///
/// # Example
///
/// ```no_run
/// use httprpc_client::{ClientConfig, HttpRpcClient};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpRpcClient::new(ClientConfig::default());
/// client.add_nameserver("10.0.0.1:8090")?;
/// client.auto_sync_services(Duration::from_secs(3));
///
/// let body = client
///     .invoke_rpc("/orders/get", "application/json", br#"{"id":7}"#, Duration::from_secs(1))
///     .await?;
/// println!("{}", String::from_utf8_lossy(&body));
/// # Ok(())
/// # }
/// ```
pub struct HttpRpcClient {
    config: ClientConfig,
    pools: Arc<dyn PoolManager>,
    registry: Arc<ServiceRegistry>,
    dispatcher: Dispatcher,
    sync: SyncScheduler,
    monitor: Mutex<Option<MonitorTask>>,
}

impl HttpRpcClient {
    /// Creates a client backed by pooled HTTP/1.1 connections.
    pub fn new(config: ClientConfig) -> Self {
        let pools = Arc::new(HttpPoolManager::from_config(&config));
        Self::with_pool_manager(config, pools)
    }

    /// Creates a client on top of a caller-supplied pool manager.
    pub fn with_pool_manager(config: ClientConfig, pools: Arc<dyn PoolManager>) -> Self {
        let registry = Arc::new(ServiceRegistry::new(
            pools.clone(),
            config.connect_timeout(),
            config.rw_timeout(),
        ));
        let balancer = Arc::new(RoundRobin::new(registry.clone(), config.rotation));
        let nameserver = NameserverClient::new(balancer.clone(), config.nameserver_timeout());
        let policy = ReconcilePolicy {
            delete_stale: config.sync_delete_stale,
            delete_exempt: config.sync_delete_nameserver,
        };
        let sync = SyncScheduler::new(SyncWorker::new(registry.clone(), nameserver.clone(), policy));

        Self {
            dispatcher: Dispatcher::new(balancer, nameserver),
            config,
            pools,
            registry,
            sync,
            monitor: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pool_manager(&self) -> &Arc<dyn PoolManager> {
        &self.pools
    }

    /// Starts the connection monitor. Returns `false` if it already runs.
    pub fn start_connect_monitor(&self) -> bool {
        let mut monitor = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        if monitor.is_some() {
            return false;
        }

        let shutdown = CancellationToken::new();
        let handle = ConnectionMonitor::new(
            self.pools.clone(),
            MonitorConfig::from(&self.config),
            shutdown.clone(),
        )
        .spawn();
        *monitor = Some(MonitorTask { shutdown, handle });
        true
    }

    /// Starts background sync every `interval`. Returns `false` if it already
    /// runs, in which case the running interval is kept.
    pub fn auto_sync_services(&self, interval: Duration) -> bool {
        self.sync.start(interval)
    }

    /// Starts background sync with the configured interval.
    pub fn auto_sync_services_default(&self) -> bool {
        self.sync.start(self.config.sync_interval())
    }

    /// Stops background sync and waits for its task to exit.
    pub async fn stop_sync_services(&self) -> bool {
        self.sync.stop().await
    }

    /// Posts `body` to service `name` and returns the response body.
    ///
    /// `timeout` bounds each read and write of every attempt; zero keeps the
    /// timeout the address was registered with. Use
    /// [`RpcStatus::from`](httprpc_common::RpcStatus) on the result for the
    /// code/message form.
    ///
    /// # Errors
    ///
    /// - `RpcError::Resolution` when the service has no live address, even
    ///   after asking the nameserver
    /// - the last attempt's failure when every live address failed
    pub async fn invoke_rpc(
        &self,
        name: &str,
        content_type: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.dispatcher.invoke(name, content_type, body, timeout).await
    }

    /// Registers `addr` as serving `name`, skipping discovery.
    ///
    /// The timeouts apply when `addr` gets its connection pool, which happens
    /// on the first registration of that address under any name.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Config` for an empty address or name.
    pub fn add_service(
        &self,
        addr: &str,
        name: &str,
        connect_timeout: Duration,
        rw_timeout: Duration,
    ) -> Result<bool> {
        if addr.is_empty() {
            return Err(RpcError::Config(format!("empty address for service {}", name)));
        }
        if name.is_empty() {
            return Err(RpcError::Config(format!("empty service name for {}", addr)));
        }

        let added = self.registry.add_addr(name, addr, connect_timeout, rw_timeout);
        if added {
            info!(service = %name, addr = %addr, "Added service address");
        }
        Ok(added)
    }

    /// [`add_service`](Self::add_service) for several names at once.
    pub fn add_services<S: AsRef<str>>(
        &self,
        addr: &str,
        names: &[S],
        connect_timeout: Duration,
        rw_timeout: Duration,
    ) -> Result<()> {
        for name in names {
            self.add_service(addr, name.as_ref(), connect_timeout, rw_timeout)?;
        }
        Ok(())
    }

    /// Registers a nameserver address under every nameserver service name.
    pub fn add_nameserver(&self, addr: &str) -> Result<()> {
        self.add_services(
            addr,
            &NAMESERVER_SERVICES,
            self.config.connect_timeout(),
            self.config.rw_timeout(),
        )
    }

    /// Makes `name` known to background sync without giving it an address.
    /// Returns `false` if the service was already known.
    pub fn track_service(&self, name: &str) -> bool {
        let (_, existed) = self.registry.get_or_create(name);
        !existed
    }

    /// Asks the nameserver for the addresses of `name` without caching them.
    pub async fn resolve_service(&self, name: &str) -> Result<Vec<String>> {
        self.dispatcher.nameserver().find_service(name).await
    }

    /// Asks the nameserver for the addresses of several services at once.
    pub async fn resolve_services(&self, names: &[String]) -> Result<HashMap<String, BTreeSet<String>>> {
        self.dispatcher.nameserver().find_services(names).await
    }

    /// Cached addresses of `name`.
    pub fn service_addrs(&self, name: &str) -> Vec<String> {
        self.registry.addrs(name)
    }

    /// Every cached service name, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names = self.registry.snapshot_names();
        names.sort();
        names
    }

    /// Runs one sync pass now, independently of the background schedule.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        self.sync.worker().sync_once().await
    }

    /// Stops background sync and the connection monitor, waiting for both.
    pub async fn shutdown(&self) {
        self.sync.stop().await;

        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(monitor) = monitor {
            monitor.shutdown.cancel();
            if let Err(e) = monitor.handle.await {
                warn!("Connection monitor task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for HttpRpcClient {
    fn drop(&mut self) {
        let monitor = self.monitor.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(monitor) = monitor.take() {
            monitor.shutdown.cancel();
            monitor.handle.abort();
        }
    }
}
