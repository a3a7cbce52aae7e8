//! Background service sync
//!
//! Keeps the registry in line with the nameserver by periodically asking it
//! for the live addresses of every cached service.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ snapshot  ┌──────────┐  find-services  ┌────────────┐
//! │ SyncWorker   │ ────────► │ Registry │                 │ Nameserver │
//! │  (tokio task)│ ◄──────── │          │ ◄── reconcile ─ │   reply    │
//! └──────────────┘           └──────────┘                 └────────────┘
//! ```
//!
//! The registry lock is only held for the snapshot and for each reconcile
//! write, never across the lookup. A failed lookup leaves the registry as it
//! was and the loop carries on with its next tick.

use httprpc_common::protocol::error::Result;
use httprpc_common::protocol::nameserver::NAMESERVER_SERVICES;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::nameserver::NameserverClient;
use crate::registry::{ReconcilePolicy, ServiceRegistry};

/// Shortest pause between two ticks, however long a tick took
pub const MIN_SLEEP: Duration = Duration::from_secs(1);

/// Outcome of one sync tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Services the nameserver reported on
    pub services: usize,
    pub added: usize,
    pub removed: usize,
}

/// One reconciliation pass, shared by the scheduler task and on-demand syncs.
#[derive(Clone)]
pub struct SyncWorker {
    registry: Arc<ServiceRegistry>,
    nameserver: NameserverClient,
    policy: ReconcilePolicy,
}

impl SyncWorker {
    pub fn new(registry: Arc<ServiceRegistry>, nameserver: NameserverClient, policy: ReconcilePolicy) -> Self {
        Self {
            registry,
            nameserver,
            policy,
        }
    }

    /// Runs one tick: snapshot, lookup, reconcile.
    ///
    /// # Errors
    ///
    /// Returns the lookup error; the registry is left untouched in that case.
    pub async fn sync_once(&self) -> Result<SyncReport> {
        let names = self.registry.snapshot_names();
        if names.is_empty() {
            return Ok(SyncReport::default());
        }

        let live = self.nameserver.find_services(&names).await?;

        let mut report = SyncReport::default();
        for name in &names {
            let Some(addrs) = live.get(name) else {
                continue;
            };
            let changes = self
                .registry
                .reconcile(name, addrs, self.policy, &NAMESERVER_SERVICES);
            report.services += 1;
            report.added += changes.added.len();
            report.removed += changes.removed.len();
        }

        Ok(report)
    }

    async fn run(self, interval: Duration, shutdown: CancellationToken) {
        info!(interval_ms = interval.as_millis() as u64, "Service sync started");

        while !shutdown.is_cancelled() {
            let started = Instant::now();
            match self.sync_once().await {
                Ok(report) if report.added + report.removed > 0 => {
                    info!(
                        services = report.services,
                        added = report.added,
                        removed = report.removed,
                        "Service sync applied changes"
                    );
                }
                Ok(_) => debug!("Service sync found no changes"),
                Err(e) => error!("Service sync failed: {}", e),
            }

            let pause = interval.saturating_sub(started.elapsed()).max(MIN_SLEEP);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("Service sync stopped");
    }
}

struct Running {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the background sync task.
///
/// The scheduler is either stopped or running; starting a running scheduler
/// or stopping a stopped one does nothing.
pub struct SyncScheduler {
    worker: SyncWorker,
    running: Mutex<Option<Running>>,
}

impl SyncScheduler {
    pub fn new(worker: SyncWorker) -> Self {
        Self {
            worker,
            running: Mutex::new(None),
        }
    }

    pub fn worker(&self) -> &SyncWorker {
        &self.worker
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Starts the sync task. Returns `false` if it was already running.
    pub fn start(&self, interval: Duration) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return false;
        }

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(self.worker.clone().run(interval, shutdown.clone()));
        *running = Some(Running { shutdown, handle });
        true
    }

    /// Stops the sync task and waits for it to exit. A tick in progress is
    /// finished first. Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(running) = running else {
            return false;
        };

        running.shutdown.cancel();
        if let Err(e) = running.handle.await {
            warn!("Service sync task ended abnormally: {}", e);
        }
        true
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        let running = self.running.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = running.take() {
            running.shutdown.cancel();
            running.handle.abort();
        }
    }
}
