//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (ordered rule scan)
//!     → matcher.rs (segment-wise pattern evaluation)
//!     → Return: matched RoutingRule or NoMatch
//!
//! Route Compilation (at startup or reload):
//!     RouteConfig[]
//!     → Compile patterns
//!     → Freeze as immutable RouteTable
//!     → Publish via atomic snapshot swap
//! ```
//!
//! # Design Decisions
//! - Routes compiled once, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route
//! - First match wins (declaration order)

pub mod matcher;
pub mod router;

pub use matcher::{PathPattern, PatternError, Segment};
pub use router::{AuthPolicy, RouteTable, RouteTableError, RoutingRule};
