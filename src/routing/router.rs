//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routing rules in declaration order
//! - Look up the first rule whose pattern matches a path
//! - Return the matched rule or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in declaration order; first match wins, no longest-prefix logic
//! - Explicit NoMatch rather than silent default
//! - Construction fails fast on empty patterns or backend names

use serde::{Deserialize, Serialize};

use crate::config::RouteConfig;
use crate::routing::matcher::{PathPattern, PatternError};

/// Authentication requirement attached to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthPolicy {
    /// No credential required or inspected.
    Public,
    /// A valid bearer token is required.
    #[default]
    Protected,
}

impl AuthPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthPolicy::Public => "public",
            AuthPolicy::Protected => "protected",
        }
    }
}

/// One declared mapping of path pattern to backend and policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingRule {
    pub pattern: PathPattern,
    pub backend: String,
    pub policy: AuthPolicy,
}

impl RoutingRule {
    pub fn new(
        pattern: &str,
        backend: impl Into<String>,
        policy: AuthPolicy,
    ) -> Result<Self, RouteTableError> {
        let backend = backend.into();
        let pattern = PathPattern::parse(pattern).map_err(|source| RouteTableError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        if backend.trim().is_empty() {
            return Err(RouteTableError::EmptyBackend {
                pattern: pattern.to_string(),
            });
        }
        Ok(Self {
            pattern,
            backend,
            policy,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.pattern.matches(path)
    }
}

/// Errors raised while building a route table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteTableError {
    #[error("invalid route pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: PatternError,
    },
    #[error("route '{pattern}' has an empty backend name")]
    EmptyBackend { pattern: String },
}

/// Ordered, immutable collection of routing rules.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<RoutingRule>,
}

impl RouteTable {
    /// Build from already-compiled rules, keeping their order.
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self { rules }
    }

    /// Compile route declarations in order. The first invalid declaration aborts construction.
    pub fn from_config(routes: &[RouteConfig]) -> Result<Self, RouteTableError> {
        let rules = routes
            .iter()
            .map(|r| RoutingRule::new(&r.path, r.backend.clone(), r.auth))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules))
    }

    /// Return the first rule matching `path`, or `None` for no match.
    pub fn resolve(&self, path: &str) -> Option<&RoutingRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
