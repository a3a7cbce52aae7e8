use std::sync::Arc;

use crate::config::RotationPolicy;
use crate::pool::Pool;
use crate::registry::ServiceRegistry;

/// Round-robin selection over the cached addresses of a service
pub struct RoundRobin {
    registry: Arc<ServiceRegistry>,
    policy: RotationPolicy,
}

impl RoundRobin {
    pub fn new(registry: Arc<ServiceRegistry>, policy: RotationPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    /// Pools of `name` that are alive, in rotation order.
    ///
    /// Advances the service cursor even when every pool turns out dead.
    /// Addresses without a pool (removed concurrently) are skipped.
    pub fn live_pools(&self, name: &str) -> Vec<Arc<dyn Pool>> {
        let Some(addrs) = self.registry.rotate(name, self.policy) else {
            return Vec::new();
        };

        let pools = self.registry.pool_manager();
        addrs
            .iter()
            .filter_map(|addr| pools.get(addr))
            .filter(|pool| pool.is_alive())
            .collect()
    }
}
