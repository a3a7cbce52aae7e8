//! Nameserver lookups
//!
//! The nameserver is an ordinary HTTP RPC service: its operations are
//! service names registered against its address like any other. Lookups
//! therefore go through the same round-robin and failover path as user
//! calls, with one difference: a lookup never triggers another lookup. If
//! no nameserver address is cached and alive the lookup fails.

use httprpc_common::protocol::error::{Result, RpcError};
use httprpc_common::protocol::nameserver::{FIND_SERVICE, FIND_SERVICES, STATUS_OK};
use httprpc_common::protocol::{
    FindServiceRequest, FindServiceResponse, FindServicesRequest, FindServicesResponse, JsonCodec,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::balancer::RoundRobin;
use crate::dispatcher::failover;
use crate::invoker::RpcInvoker;

const CONTENT_TYPE: &str = "application/json";

/// Client for the nameserver's find-service and find-services operations.
#[derive(Clone)]
pub struct NameserverClient {
    balancer: Arc<RoundRobin>,
    invoker: RpcInvoker,
    timeout: Duration,
}

impl NameserverClient {
    pub fn new(balancer: Arc<RoundRobin>, timeout: Duration) -> Self {
        Self {
            balancer,
            invoker: RpcInvoker::new(),
            timeout,
        }
    }

    async fn call(&self, operation: &str, body: &[u8]) -> Result<Vec<u8>> {
        let pools = self.balancer.live_pools(operation);
        if pools.is_empty() {
            return Err(RpcError::Resolution(operation.to_string()));
        }
        failover(&self.invoker, &pools, operation, CONTENT_TYPE, body, self.timeout).await
    }

    /// Addresses currently serving `name`, in the order the nameserver lists
    /// them. Blank entries are dropped since they can never be dialled.
    ///
    /// # Errors
    ///
    /// - `RpcError::Resolution` when no nameserver address is cached and alive
    /// - the last transport or status failure when every nameserver failed
    /// - `RpcError::Marshal` for an unparsable reply
    /// - `RpcError::Protocol` when the reply status is not `"ok"`
    pub async fn find_service(&self, name: &str) -> Result<Vec<String>> {
        let request = FindServiceRequest {
            service_path: name.to_string(),
        };
        let reply = self.call(FIND_SERVICE, &JsonCodec::encode(&request)?).await?;

        let response: FindServiceResponse = JsonCodec::decode(&reply)?;
        if response.status != STATUS_OK {
            return Err(RpcError::Protocol(response.status));
        }

        let addrs: Vec<String> = response
            .server_addrs
            .into_iter()
            .filter(|addr| !addr.is_empty())
            .collect();
        debug!(service = %name, addrs = ?addrs, "Resolved service");
        Ok(addrs)
    }

    /// Live address sets of every name in `names` the nameserver knows.
    ///
    /// Names missing from the reply are missing from the returned map. Errors
    /// are those of [`find_service`](Self::find_service).
    pub async fn find_services(&self, names: &[String]) -> Result<HashMap<String, BTreeSet<String>>> {
        let request = FindServicesRequest {
            service_paths: names.to_vec(),
        };
        let reply = self.call(FIND_SERVICES, &JsonCodec::encode(&request)?).await?;

        let response: FindServicesResponse = JsonCodec::decode(&reply)?;
        if response.status != STATUS_OK {
            return Err(RpcError::Protocol(response.status));
        }

        Ok(response
            .service_infos
            .into_iter()
            .map(|(name, info)| (name, info.server_addrs))
            .collect())
    }
}
