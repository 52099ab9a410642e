//! Backend pool management.
//!
//! # Responsibilities
//! - Group instances under their logical backend name
//! - Apply the configured load balancing algorithm to select an instance
//! - Hand out leases for in-flight tracking

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{BackendConfig, Strategy};
use crate::load_balancer::{
    backend::{AddressError, Backend, BackendLease},
    least_conn::LeastConnections,
    eligible,
    round_robin::RoundRobin,
    LoadBalancer,
};

#[derive(Debug)]
struct Group {
    backends: Vec<Arc<Backend>>,
    balancer: Box<dyn LoadBalancer>,
}

/// Resolves logical backend names to live instances.
#[derive(Debug)]
pub struct BackendManager {
    groups: HashMap<String, Group>,
}

impl BackendManager {
    /// Build from configuration. Any unusable address aborts construction.
    pub fn new(configs: &[BackendConfig], strategy: Strategy) -> Result<Self, AddressError> {
        let mut grouped: HashMap<String, Vec<Arc<Backend>>> = HashMap::new();
        for config in configs {
            let backend = Backend::new(config.name.clone(), &config.address, config.max_connections)?;
            grouped
                .entry(config.name.clone())
                .or_default()
                .push(Arc::new(backend));
        }

        let groups = grouped
            .into_iter()
            .map(|(name, backends)| {
                let balancer: Box<dyn LoadBalancer> = match strategy {
                    Strategy::RoundRobin => Box::new(RoundRobin::new()),
                    Strategy::LeastConnections => Box::new(LeastConnections::new()),
                };
                (name, Group { backends, balancer })
            })
            .collect();

        Ok(Self { groups })
    }

    /// Lease an instance of `name`, or `None` if no instance can take the request.
    pub fn get(&self, name: &str) -> Option<BackendLease> {
        let Some(group) = self.groups.get(name) else {
            tracing::debug!(backend = %name, "Backend name not registered");
            return None;
        };

        let picked = group
            .balancer
            .next_server(&group.backends)
            .and_then(|backend| backend.try_lease());
        if picked.is_some() {
            return picked;
        }

        // The pick can fill up between selection and lease; any other eligible instance will do.
        let fallback = group
            .backends
            .iter()
            .filter(|backend| eligible(backend))
            .find_map(|backend| backend.try_lease());
        if fallback.is_none() {
            tracing::debug!(
                backend = %name,
                instances = group.backends.len(),
                "No eligible instance"
            );
        }
        fallback
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    /// All instances across every backend name (for health checking).
    pub fn all_backends(&self) -> Vec<Arc<Backend>> {
        self.groups
            .values()
            .flat_map(|group| group.backends.iter())
            .cloned()
            .collect()
    }
}
