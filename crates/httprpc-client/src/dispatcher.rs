use httprpc_common::protocol::error::{Result, RpcError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::balancer::RoundRobin;
use crate::invoker::RpcInvoker;
use crate::nameserver::NameserverClient;
use crate::pool::Pool;

/// Tries `pools` in order and returns the first successful response.
///
/// Every kind of failure moves on to the next pool, a non-200 status
/// included. When all fail the last failure is returned.
pub(crate) async fn failover(
    invoker: &RpcInvoker,
    pools: &[Arc<dyn Pool>],
    service: &str,
    content_type: &str,
    body: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>> {
    let mut last_error = RpcError::Resolution(service.to_string());

    for (attempt, pool) in pools.iter().enumerate() {
        match invoker
            .attempt(pool.as_ref(), service, content_type, body, timeout)
            .await
        {
            Ok(response) => return Ok(response),
            Err(e) => {
                warn!(
                    service = %service,
                    addr = %pool.addr(),
                    attempt = attempt + 1,
                    candidates = pools.len(),
                    "RPC attempt failed: {}",
                    e
                );
                last_error = e;
            }
        }
    }

    Err(last_error)
}

/// Selects endpoints for a service and fails over between them.
///
/// # Resolution
///
/// Live pools come from the local cache first. On a miss the nameserver's
/// find-service operation is asked once, every returned address is cached,
/// and selection is retried. A service that is still unreachable fails with
/// `RpcError::Resolution`.
pub struct Dispatcher {
    balancer: Arc<RoundRobin>,
    invoker: RpcInvoker,
    nameserver: NameserverClient,
}

impl Dispatcher {
    pub fn new(balancer: Arc<RoundRobin>, nameserver: NameserverClient) -> Self {
        Self {
            balancer,
            invoker: RpcInvoker::new(),
            nameserver,
        }
    }

    pub fn nameserver(&self) -> &NameserverClient {
        &self.nameserver
    }

    /// Live pools for `name` in rotation order, consulting the nameserver
    /// on a cache miss.
    pub async fn select_pools(&self, name: &str) -> Result<Vec<Arc<dyn Pool>>> {
        let pools = self.balancer.live_pools(name);
        if !pools.is_empty() {
            return Ok(pools);
        }

        debug!(service = %name, "No live endpoint cached, asking nameserver");
        let addrs = match self.nameserver.find_service(name).await {
            Ok(addrs) => addrs,
            Err(e) => {
                error!(service = %name, "Nameserver lookup failed: {}", e);
                return Err(RpcError::Resolution(name.to_string()));
            }
        };

        let registry = self.balancer.registry();
        for addr in &addrs {
            registry.add_addr_default(name, addr);
        }

        let pools = self.balancer.live_pools(name);
        if pools.is_empty() {
            return Err(RpcError::Resolution(name.to_string()));
        }
        Ok(pools)
    }

    /// Invokes `name`, failing over across its live endpoints.
    pub async fn invoke(
        &self,
        name: &str,
        content_type: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let pools = self.select_pools(name).await?;
        failover(&self.invoker, &pools, name, content_type, body, timeout).await
    }
}
