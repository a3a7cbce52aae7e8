pub mod balancer;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod guard;
pub mod invoker;
pub mod monitor;
pub mod nameserver;
pub mod pool;
pub mod registry;
pub mod sync;

#[cfg(test)]
mod testing;

pub use balancer::RoundRobin;
pub use client::HttpRpcClient;
pub use config::{ClientConfig, RotationPolicy};
pub use dispatcher::Dispatcher;
pub use guard::ConnectionGuard;
pub use invoker::RpcInvoker;
pub use monitor::{ConnectionMonitor, MonitorConfig};
pub use nameserver::NameserverClient;
pub use pool::{HttpPool, HttpPoolManager, Pool, PoolManager};
pub use registry::{ReconcilePolicy, ReconcileReport, ServiceEntry, ServiceRegistry};
pub use sync::{SyncReport, SyncScheduler, SyncWorker};

pub use httprpc_common::{RpcError, RpcStatus};
