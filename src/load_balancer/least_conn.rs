//! Least connections load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{backend::Backend, eligible, LoadBalancer};

/// Least connections selector.
/// Selects the eligible instance with the fewest in-flight requests.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        // On a tie the first declared instance wins (stability)
        backends
            .iter()
            .filter(|b| eligible(b))
            .min_by_key(|b| b.active())
            .cloned()
    }
}
