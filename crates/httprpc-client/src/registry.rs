use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::info;

use crate::config::RotationPolicy;
use crate::pool::PoolManager;

/// Cached addresses of one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub name: String,
    pub addrs: Vec<String>,
    /// Round-robin cursor, reduced modulo the current address count on use
    pub cursor: usize,
}

impl ServiceEntry {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            addrs: Vec::new(),
            cursor: 0,
        }
    }

    /// Advances the cursor and returns the addresses starting at the new
    /// rotation point.
    fn rotate(&mut self, policy: RotationPolicy) -> Vec<String> {
        let len = self.addrs.len();
        let mut rotated = Vec::with_capacity(len);
        match policy {
            RotationPolicy::PerAddress => {
                for _ in 0..len {
                    self.cursor = self.cursor.wrapping_add(1);
                    rotated.push(self.addrs[self.cursor % len].clone());
                }
            }
            RotationPolicy::PerCall => {
                self.cursor = self.cursor.wrapping_add(1);
                let start = self.cursor % len;
                rotated.extend(self.addrs[start..].iter().cloned());
                rotated.extend(self.addrs[..start].iter().cloned());
            }
        }
        rotated
    }
}

/// What [`ServiceRegistry::reconcile`] may delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcilePolicy {
    /// Remove cached addresses missing from the live set
    pub delete_stale: bool,
    /// Apply `delete_stale` to exempt services as well
    pub delete_exempt: bool,
}

/// Address changes made by one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Mapping from service name to its cached addresses.
///
/// # Thread Safety
///
/// One registry-wide mutex guards every entry. No I/O is performed while it
/// is held, so callers doing network work first take a snapshot
/// ([`snapshot_names`](Self::snapshot_names)) and come back for the write.
///
/// Entries are never removed; a service whose addresses all disappear keeps
/// an empty entry so that background sync keeps asking about it.
pub struct ServiceRegistry {
    services: Mutex<HashMap<String, ServiceEntry>>,
    pools: Arc<dyn PoolManager>,
    connect_timeout: Duration,
    rw_timeout: Duration,
}

impl ServiceRegistry {
    /// Creates a registry that registers newly learned addresses with `pools`.
    ///
    /// `connect_timeout` and `rw_timeout` are used for addresses learned
    /// through reconciliation, which carries no timeouts of its own.
    pub fn new(pools: Arc<dyn PoolManager>, connect_timeout: Duration, rw_timeout: Duration) -> Self {
        Self {
            services: Mutex::new(HashMap::new()),
            pools,
            connect_timeout,
            rw_timeout,
        }
    }

    pub fn pool_manager(&self) -> &Arc<dyn PoolManager> {
        &self.pools
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ServiceEntry>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a snapshot of the entry for `name`, creating an empty one if
    /// needed, and whether it existed before.
    pub fn get_or_create(&self, name: &str) -> (ServiceEntry, bool) {
        let mut services = self.lock();
        let existed = services.contains_key(name);
        let entry = services
            .entry(name.to_string())
            .or_insert_with(|| ServiceEntry::new(name));
        (entry.clone(), existed)
    }

    /// Adds `addr` to `name`, creating the entry if needed.
    ///
    /// Returns `false` if the address was already listed or is empty.
    pub fn add_addr(&self, name: &str, addr: &str, connect_timeout: Duration, rw_timeout: Duration) -> bool {
        if addr.is_empty() {
            return false;
        }

        let mut services = self.lock();
        let entry = services
            .entry(name.to_string())
            .or_insert_with(|| ServiceEntry::new(name));
        if entry.addrs.iter().any(|a| a == addr) {
            return false;
        }

        entry.addrs.push(addr.to_string());
        self.pools.set(addr, connect_timeout, rw_timeout);
        true
    }

    /// Adds `addr` with the registry's default timeouts.
    pub fn add_addr_default(&self, name: &str, addr: &str) -> bool {
        self.add_addr(name, addr, self.connect_timeout, self.rw_timeout)
    }

    /// Advances the round-robin cursor of `name` and returns its addresses in
    /// rotation order.
    ///
    /// Returns `None` when the service has no addresses; an entry is created
    /// for an unknown service so that later syncs pick it up.
    pub fn rotate(&self, name: &str, policy: RotationPolicy) -> Option<Vec<String>> {
        let mut services = self.lock();
        let entry = services
            .entry(name.to_string())
            .or_insert_with(|| ServiceEntry::new(name));
        if entry.addrs.is_empty() {
            return None;
        }
        Some(entry.rotate(policy))
    }

    pub fn snapshot_names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Current addresses of `name`, empty if unknown.
    pub fn addrs(&self, name: &str) -> Vec<String> {
        self.lock()
            .get(name)
            .map(|entry| entry.addrs.clone())
            .unwrap_or_default()
    }

    /// Merges the live address set reported for `name` into its entry.
    ///
    /// With `policy.delete_stale`, addresses absent from `live` are removed,
    /// except for services listed in `exempt` unless `policy.delete_exempt`
    /// is also set. Addresses in `live` not yet cached are appended with the
    /// default timeouts. A removed address loses its pool once no other
    /// service lists it.
    pub fn reconcile(
        &self,
        name: &str,
        live: &BTreeSet<String>,
        policy: ReconcilePolicy,
        exempt: &[&str],
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut services = self.lock();

        let Some(entry) = services.get_mut(name) else {
            return report;
        };

        let may_delete = policy.delete_stale && (policy.delete_exempt || !exempt.contains(&name));
        if may_delete {
            entry.addrs.retain(|addr| {
                let keep = live.contains(addr);
                if !keep {
                    info!(service = %name, addr = %addr, "Deleting service address");
                    report.removed.push(addr.clone());
                }
                keep
            });
        }

        for addr in live {
            if addr.is_empty() || entry.addrs.contains(addr) {
                continue;
            }
            info!(service = %name, addr = %addr, "Adding service address");
            entry.addrs.push(addr.clone());
            report.added.push(addr.clone());
        }

        for addr in &report.added {
            self.pools.set(addr, self.connect_timeout, self.rw_timeout);
        }
        for addr in &report.removed {
            let still_used = services.values().any(|e| e.addrs.contains(addr));
            if !still_used {
                self.pools.remove(addr);
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPoolManager;

    const SECS_30: Duration = Duration::from_secs(30);

    fn registry() -> (ServiceRegistry, Arc<MockPoolManager>) {
        let manager = MockPoolManager::new();
        let registry = ServiceRegistry::new(manager.clone(), SECS_30, SECS_30);
        (registry, manager)
    }

    fn set(addrs: &[&str]) -> BTreeSet<String> {
        addrs.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_get_or_create_reports_existence() {
        let (registry, _) = registry();

        let (entry, existed) = registry.get_or_create("/orders");
        assert!(!existed);
        assert_eq!(entry.name, "/orders");
        assert!(entry.addrs.is_empty());

        let (_, existed) = registry.get_or_create("/orders");
        assert!(existed);
    }

    #[test]
    fn test_add_addr_is_idempotent() {
        let (registry, manager) = registry();
        for _ in 0..5 {
            registry.add_addr("/orders", "10.0.0.1:8080", SECS_30, SECS_30);
        }
        assert_eq!(registry.addrs("/orders"), vec!["10.0.0.1:8080"]);
        assert_eq!(manager.set_addrs(), vec!["10.0.0.1:8080"]);
    }

    #[test]
    fn test_add_addr_passes_timeouts_to_pool_manager() {
        let (registry, manager) = registry();
        registry.add_addr("/orders", "a:1", Duration::from_secs(1), Duration::from_secs(2));

        let sets = manager.sets.lock().unwrap().clone();
        assert_eq!(
            sets,
            vec![("a:1".to_string(), Duration::from_secs(1), Duration::from_secs(2))]
        );
    }

    #[test]
    fn test_add_empty_addr_rejected() {
        let (registry, manager) = registry();
        assert!(!registry.add_addr_default("/orders", ""));
        assert!(registry.addrs("/orders").is_empty());
        assert!(manager.set_addrs().is_empty());
    }

    #[test]
    fn test_snapshot_names() {
        let (registry, _) = registry();
        registry.add_addr_default("/a", "a:1");
        registry.get_or_create("/b");

        let mut names = registry.snapshot_names();
        names.sort();
        assert_eq!(names, vec!["/a", "/b"]);
    }

    #[test]
    fn test_rotate_unknown_service_creates_empty_entry() {
        let (registry, _) = registry();
        assert!(registry.rotate("/orders", RotationPolicy::PerCall).is_none());
        let (_, existed) = registry.get_or_create("/orders");
        assert!(existed);
    }

    #[test]
    fn test_rotate_per_call_cycles_first_address() {
        let (registry, _) = registry();
        for addr in ["a:1", "b:1", "c:1"] {
            registry.add_addr_default("/svc", addr);
        }

        let firsts: Vec<String> = (0..6)
            .map(|_| registry.rotate("/svc", RotationPolicy::PerCall).unwrap()[0].clone())
            .collect();
        assert_eq!(firsts, vec!["b:1", "c:1", "a:1", "b:1", "c:1", "a:1"]);

        let all = registry.rotate("/svc", RotationPolicy::PerCall).unwrap();
        assert_eq!(all, vec!["b:1", "c:1", "a:1"]);
    }

    #[test]
    fn test_rotate_per_address_advances_by_address_count() {
        let (registry, _) = registry();
        for addr in ["a:1", "b:1", "c:1"] {
            registry.add_addr_default("/svc", addr);
        }

        // Cursor moves by three per selection, so the start never changes
        for _ in 0..4 {
            let order = registry.rotate("/svc", RotationPolicy::PerAddress).unwrap();
            assert_eq!(order, vec!["b:1", "c:1", "a:1"]);
        }
        let (entry, _) = registry.get_or_create("/svc");
        assert_eq!(entry.cursor, 12);
    }

    #[test]
    fn test_rotate_uses_current_length_after_shrink() {
        let (registry, _) = registry();
        for addr in ["a:1", "b:1", "c:1", "d:1"] {
            registry.add_addr_default("/svc", addr);
        }
        for _ in 0..3 {
            registry.rotate("/svc", RotationPolicy::PerCall);
        }

        registry.reconcile(
            "/svc",
            &set(&["a:1"]),
            ReconcilePolicy { delete_stale: true, delete_exempt: false },
            &[],
        );
        let order = registry.rotate("/svc", RotationPolicy::PerCall).unwrap();
        assert_eq!(order, vec!["a:1"]);
    }

    #[test]
    fn test_reconcile_adds_and_deletes() {
        let (registry, manager) = registry();
        registry.add_addr_default("/svc", "old:1");
        registry.add_addr_default("/svc", "keep:1");

        let report = registry.reconcile(
            "/svc",
            &set(&["keep:1", "new:1"]),
            ReconcilePolicy { delete_stale: true, delete_exempt: false },
            &[],
        );

        assert_eq!(report.added, vec!["new:1"]);
        assert_eq!(report.removed, vec!["old:1"]);
        assert_eq!(registry.addrs("/svc"), vec!["keep:1", "new:1"]);
        assert_eq!(*manager.removed.lock().unwrap(), vec!["old:1".to_string()]);
        assert!(manager.set_addrs().contains(&"new:1".to_string()));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let (registry, _) = registry();
        registry.add_addr_default("/svc", "old:1");
        let live = set(&["a:1", "b:1"]);
        let policy = ReconcilePolicy { delete_stale: true, delete_exempt: false };

        registry.reconcile("/svc", &live, policy, &[]);
        let once = registry.addrs("/svc");
        let second = registry.reconcile("/svc", &live, policy, &[]);

        assert!(second.is_empty());
        assert_eq!(registry.addrs("/svc"), once);
    }

    #[test]
    fn test_reconcile_without_delete_only_adds() {
        let (registry, _) = registry();
        registry.add_addr_default("/svc", "old:1");

        let report = registry.reconcile("/svc", &set(&["new:1"]), ReconcilePolicy::default(), &[]);
        assert!(report.removed.is_empty());
        assert_eq!(registry.addrs("/svc"), vec!["old:1", "new:1"]);
    }

    #[test]
    fn test_reconcile_respects_exemption() {
        let (registry, _) = registry();
        registry.add_addr_default("/ns/find", "ns:1");
        let policy = ReconcilePolicy { delete_stale: true, delete_exempt: false };

        let report = registry.reconcile("/ns/find", &BTreeSet::new(), policy, &["/ns/find"]);
        assert!(report.removed.is_empty());
        assert_eq!(registry.addrs("/ns/find"), vec!["ns:1"]);
    }

    #[test]
    fn test_reconcile_override_deletes_exempt() {
        let (registry, _) = registry();
        registry.add_addr_default("/ns/find", "ns:1");
        let policy = ReconcilePolicy { delete_stale: true, delete_exempt: true };

        let report = registry.reconcile("/ns/find", &BTreeSet::new(), policy, &["/ns/find"]);
        assert_eq!(report.removed, vec!["ns:1"]);
        assert!(registry.addrs("/ns/find").is_empty());
    }

    #[test]
    fn test_reconcile_keeps_pool_shared_with_other_service() {
        let (registry, manager) = registry();
        registry.add_addr_default("/a", "shared:1");
        registry.add_addr_default("/b", "shared:1");
        let policy = ReconcilePolicy { delete_stale: true, delete_exempt: false };

        registry.reconcile("/a", &BTreeSet::new(), policy, &[]);
        assert!(registry.addrs("/a").is_empty());
        assert!(manager.removed.lock().unwrap().is_empty());

        registry.reconcile("/b", &BTreeSet::new(), policy, &[]);
        assert_eq!(*manager.removed.lock().unwrap(), vec!["shared:1".to_string()]);
    }

    #[test]
    fn test_reconcile_skips_empty_and_unknown() {
        let (registry, _) = registry();
        let report = registry.reconcile("/missing", &set(&["a:1"]), ReconcilePolicy::default(), &[]);
        assert!(report.is_empty());
        assert!(registry.snapshot_names().is_empty());

        registry.get_or_create("/svc");
        let report = registry.reconcile("/svc", &set(&["", "a:1"]), ReconcilePolicy::default(), &[]);
        assert_eq!(report.added, vec!["a:1"]);
    }
}
