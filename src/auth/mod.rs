//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     AuthConfig → keys.rs (env var / key file) → validator.rs (TokenValidator)
//!
//! Per request:
//!     filter.rs (route policy lookup)
//!     → credential.rs (Authorization: Bearer <token>)
//!     → validator.rs (signature, expiry, subject)
//!     → Admission (request + identity header) or GatewayError
//! ```

pub mod credential;
pub mod filter;
pub mod keys;
pub mod validator;

pub use credential::Credential;
pub use filter::{Admission, AuthenticationFilter, AuthenticationOutcome};
pub use keys::{KeyError, KeyMaterial};
pub use validator::{Claims, TokenError, TokenValidator, ValidatorOptions};
