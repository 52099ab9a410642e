//! Bearer token verification.
//!
//! # Responsibilities
//! - Verify token structure (three dot-separated segments)
//! - Verify the signature under the configured key
//! - Enforce expiry (strictly in the future) and optional issuer/audience
//! - Expose the verified subject claim
//!
//! # Design Decisions
//! - Stateless apart from read-only key material; safe to share across tasks
//! - Verification is local and offline; no network round-trip on the hot path
//! - `validate` returns a boolean: failure is an expected outcome, not an error to escape with
//! - Subject extraction always re-verifies; unverified claims are never read

use std::collections::HashSet;
use std::str::FromStr;

use jsonwebtoken::{errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::auth::keys::{KeyError, KeyMaterial};
use crate::config::AuthConfig;

/// Claims the gateway reads from a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Claims {
    /// Principal identifier (username / user id).
    pub sub: String,
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(default)]
    pub iat: Option<u64>,
    #[serde(default)]
    pub iss: Option<String>,
}

/// Why a token was refused. Never carries the token itself.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token does not have three segments")]
    Malformed,
    #[error("token is expired")]
    Expired,
    #[error("token has an empty subject")]
    EmptySubject,
    #[error("token verification failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl TokenError {
    /// Short label for debug logs.
    pub fn label(&self) -> &'static str {
        match self {
            TokenError::Malformed => "malformed",
            TokenError::Expired => "expired",
            TokenError::EmptySubject => "empty_subject",
            TokenError::Jwt(e) => match e.kind() {
                JwtErrorKind::InvalidSignature => "bad_signature",
                JwtErrorKind::ExpiredSignature => "expired",
                JwtErrorKind::InvalidAlgorithm => "algorithm_mismatch",
                JwtErrorKind::InvalidIssuer => "bad_issuer",
                JwtErrorKind::InvalidAudience => "bad_audience",
                JwtErrorKind::MissingRequiredClaim(_) => "missing_claim",
                _ => "undecodable",
            },
        }
    }
}

/// Options beyond algorithm and key.
#[derive(Debug, Clone, Default)]
pub struct ValidatorOptions {
    pub leeway_secs: u64,
    pub require_expiry: bool,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl From<&AuthConfig> for ValidatorOptions {
    fn from(config: &AuthConfig) -> Self {
        Self {
            leeway_secs: config.leeway_secs,
            require_expiry: config.require_expiry,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        }
    }
}

/// Verifies signed tokens under one algorithm and key.
///
/// Key material is intentionally not printable via Debug.
#[derive(Clone)]
pub struct TokenValidator {
    algorithm: Algorithm,
    decoding_key: DecodingKey,
    validation: Validation,
    leeway_secs: u64,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("algorithm", &self.algorithm)
            .field("validation", &self.validation)
            .finish()
    }
}

impl TokenValidator {
    pub fn new(
        algorithm: Algorithm,
        key: &KeyMaterial,
        options: ValidatorOptions,
    ) -> Result<Self, KeyError> {
        let decoding_key = key.decoding_key(algorithm)?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = options.leeway_secs;
        validation.validate_exp = true;
        let mut required: HashSet<String> = HashSet::from(["sub".to_string()]);
        if options.require_expiry {
            required.insert("exp".to_string());
        }
        validation.required_spec_claims = required;
        if let Some(issuer) = &options.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &options.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            algorithm,
            decoding_key,
            validation,
            leeway_secs: options.leeway_secs,
        })
    }

    /// Build from configuration, loading key material from its external source.
    pub fn from_config(config: &AuthConfig) -> Result<Self, KeyError> {
        let algorithm = Algorithm::from_str(&config.algorithm)
            .map_err(|_| KeyError::UnsupportedAlgorithm(config.algorithm.clone()))?;
        let key = KeyMaterial::load(config)?;
        Self::new(algorithm, &key, ValidatorOptions::from(config))
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Verify `token` and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        if token.split('.').count() != 3 {
            return Err(TokenError::Malformed);
        }

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        let claims = data.claims;

        // Expiry must be strictly in the future.
        if let Some(exp) = claims.exp {
            let now = jsonwebtoken::get_current_timestamp();
            if exp.saturating_add(self.leeway_secs) <= now {
                return Err(TokenError::Expired);
            }
        }
        if claims.sub.trim().is_empty() {
            return Err(TokenError::EmptySubject);
        }

        Ok(claims)
    }

    /// True if `token` is well-formed, correctly signed and unexpired.
    pub fn validate(&self, token: &str) -> bool {
        self.verify(token).is_ok()
    }

    /// Subject of a valid token; `None` if the token does not verify.
    pub fn extract_subject(&self, token: &str) -> Option<String> {
        self.verify(token).ok().map(|claims| claims.sub)
    }
}
