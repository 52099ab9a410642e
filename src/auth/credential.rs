//! Bearer credential extraction.

use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::error::GatewayError;

/// Required scheme prefix, case-sensitive, single space.
pub const BEARER_PREFIX: &str = "Bearer ";

/// A bearer credential borrowed from the request headers.
///
/// Lives only for the duration of one filter invocation.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Credential<'a> {
    raw: &'a str,
    token: &'a str,
}

impl std::fmt::Debug for Credential<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Token value stays out of logs
        f.debug_struct("Credential")
            .field("scheme", &self.scheme())
            .field("token_len", &self.token.len())
            .finish()
    }
}

impl<'a> Credential<'a> {
    /// Extract from the first `Authorization` header.
    pub fn from_headers(headers: &'a HeaderMap) -> Result<Self, GatewayError> {
        let value = headers
            .get(AUTHORIZATION)
            .ok_or(GatewayError::MissingCredential)?;
        // Opaque bytes cannot carry the literal scheme.
        let raw = value.to_str().map_err(|_| GatewayError::MalformedScheme)?;
        Self::parse(raw)
    }

    /// Parse a raw `Authorization` header value.
    pub fn parse(raw: &'a str) -> Result<Self, GatewayError> {
        let token = raw
            .strip_prefix(BEARER_PREFIX)
            .ok_or(GatewayError::MalformedScheme)?;
        if token.is_empty() {
            return Err(GatewayError::EmptyToken);
        }
        Ok(Self { raw, token })
    }

    pub fn scheme(&self) -> &'static str {
        "Bearer"
    }

    pub fn token(&self) -> &'a str {
        self.token
    }

    pub fn raw_header_value(&self) -> &'a str {
        self.raw
    }
}
