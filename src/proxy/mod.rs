//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Admission (backend name + request)
//!     → dispatcher.rs (lease instance from load_balancer)
//!     → headers.rs (hop-by-hop strip, X-Forwarded-*)
//!     → hyper client (streamed body)
//!     → backend response relayed verbatim
//! ```

pub mod dispatcher;
pub mod headers;

pub use dispatcher::Dispatcher;
