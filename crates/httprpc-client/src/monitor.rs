use httprpc_common::protocol::error::Result;
use httprpc_common::transport::probe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::pool::{Pool, PoolManager};

/// Connection monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub check_interval: Duration,
    pub connect_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_millis(1000),
        }
    }
}

impl From<&ClientConfig> for MonitorConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            check_interval: config.monitor_check_interval(),
            connect_timeout: config.monitor_connect_timeout(),
        }
    }
}

/// Ticker for check rounds. A round that overruns the period delays the next
/// one instead of firing the missed ticks back to back.
pub(crate) fn check_ticker(period: Duration) -> Interval {
    // interval() panics on a zero period
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Periodically probes every registered pool and records whether its
/// address accepts connections.
///
/// Dispatch skips dead pools, so this is what brings a pool back after its
/// address recovers.
pub struct ConnectionMonitor {
    pools: Arc<dyn PoolManager>,
    config: MonitorConfig,
    shutdown: CancellationToken,
}

impl ConnectionMonitor {
    pub fn new(pools: Arc<dyn PoolManager>, config: MonitorConfig, shutdown: CancellationToken) -> Self {
        Self {
            pools,
            config,
            shutdown,
        }
    }

    /// Starts the monitor task. It runs until the shutdown token is cancelled.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        info!(
            interval_ms = self.config.check_interval.as_millis() as u64,
            "Connection monitor started"
        );
        let mut interval = check_ticker(self.config.check_interval);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => self.check_all_pools().await,
            }
        }

        info!("Connection monitor stopped");
    }

    /// Probes every pool in parallel and applies the outcomes.
    pub async fn check_all_pools(&self) {
        let pools = self.pools.pools();

        let checks: Vec<_> = pools
            .into_iter()
            .map(|pool| {
                let timeout = self.config.connect_timeout;
                async move {
                    let result = Self::check_pool(pool.as_ref(), timeout).await;
                    (pool, result)
                }
            })
            .collect();

        for (pool, result) in futures::future::join_all(checks).await {
            if let Err(e) = &result {
                debug!(addr = %pool.addr(), "Probe failed: {}", e);
            }
            pool.set_alive(result.is_ok());
        }
    }

    async fn check_pool(pool: &dyn Pool, timeout: Duration) -> Result<()> {
        probe(pool.addr(), timeout).await
    }
}
