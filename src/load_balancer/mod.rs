//! Backend name resolution and load balancing.
//!
//! # Data Flow
//! ```text
//! Route matched → backend name identified
//!     → pool.rs (instances registered under that name)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through instances)
//!         - least_conn.rs (pick instance with fewest in-flight requests)
//!     → backend.rs (lease a slot on the instance)
//!     → Return lease, or None when nothing can take the request
//! ```
//!
//! # Design Decisions
//! - Load balancer is stateless apart from its rotation counter
//! - Unhealthy and saturated instances excluded from selection
//! - No retries: a failed selection is reported to the caller

use std::sync::Arc;

pub mod backend;
pub mod least_conn;
pub mod pool;
pub mod round_robin;

pub use backend::{AddressError, Backend, BackendLease, HealthState};
pub use pool::BackendManager;

/// Instance selection strategy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick an instance that is healthy and has capacity.
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;
}

fn eligible(backend: &Backend) -> bool {
    backend.is_healthy() && backend.has_capacity()
}
