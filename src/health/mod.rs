//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe each backend instance
//!     → Update the instance's health state
//!
//! Passive health checks (proxy::dispatcher):
//!     Upstream failure observed
//!     → Increment failure count
//!     → Mark unhealthy once the threshold is reached
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary
//! - State transitions require consecutive successes/failures
//! - Health state is per-instance, not per-backend-name

pub mod active;

pub use active::HealthMonitor;
