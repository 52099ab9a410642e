//! Verification key material.
//!
//! Keys come from outside the binary: an environment variable (HMAC secrets)
//! or a file (HMAC secret bytes or a PEM public key). Anything unreadable,
//! empty or mismatched with the algorithm is a startup error.

use std::path::PathBuf;

use jsonwebtoken::{Algorithm, DecodingKey};

use crate::config::AuthConfig;

/// Key family an algorithm verifies with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Hmac,
    Rsa,
    Ec,
    Ed,
}

impl KeyFamily {
    pub fn of(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => KeyFamily::Hmac,
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => KeyFamily::Rsa,
            Algorithm::ES256 | Algorithm::ES384 => KeyFamily::Ec,
            Algorithm::EdDSA => KeyFamily::Ed,
        }
    }
}

/// Errors loading or interpreting key material.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("unsupported algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    #[error("no key source configured (set auth.secret_env or auth.key_file)")]
    NoSource,
    #[error("environment variable '{0}' is not set")]
    MissingEnv(String),
    #[error("failed to read key file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("key material is empty")]
    Empty,
    #[error("{0:?} algorithms require a PEM public key in auth.key_file")]
    PemRequired(KeyFamily),
    #[error("invalid key: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

/// Raw key bytes as loaded from the configured source.
#[derive(Clone)]
pub struct KeyMaterial {
    bytes: Vec<u8>,
    from_file: bool,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key bytes
        f.debug_struct("KeyMaterial")
            .field("len", &self.bytes.len())
            .field("from_file", &self.from_file)
            .finish()
    }
}

impl KeyMaterial {
    /// Wrap an in-memory HMAC secret.
    pub fn from_secret(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: secret.into(),
            from_file: false,
        }
    }

    /// Wrap PEM bytes (public key).
    pub fn from_pem(pem: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: pem.into(),
            from_file: true,
        }
    }

    /// Load from `auth.key_file` if set, else from the `auth.secret_env` variable.
    pub fn load(config: &AuthConfig) -> Result<Self, KeyError> {
        let material = if let Some(path) = &config.key_file {
            let bytes = std::fs::read(path).map_err(|source| KeyError::Io {
                path: path.clone(),
                source,
            })?;
            Self::from_pem(bytes)
        } else if let Some(var) = &config.secret_env {
            let value = std::env::var(var).map_err(|_| KeyError::MissingEnv(var.clone()))?;
            Self::from_secret(value.into_bytes())
        } else {
            return Err(KeyError::NoSource);
        };

        if material.trimmed().is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(material)
    }

    /// File contents lose surrounding whitespace; env secrets are used byte for byte.
    fn trimmed(&self) -> &[u8] {
        if self.from_file {
            self.bytes.trim_ascii()
        } else {
            &self.bytes
        }
    }

    /// Build the decoding key for `algorithm`.
    pub fn decoding_key(&self, algorithm: Algorithm) -> Result<DecodingKey, KeyError> {
        let family = KeyFamily::of(algorithm);
        let bytes = self.trimmed();
        if bytes.is_empty() {
            return Err(KeyError::Empty);
        }
        match family {
            KeyFamily::Hmac => Ok(DecodingKey::from_secret(bytes)),
            _ if !self.from_file => Err(KeyError::PemRequired(family)),
            KeyFamily::Rsa => Ok(DecodingKey::from_rsa_pem(bytes)?),
            KeyFamily::Ec => Ok(DecodingKey::from_ec_pem(bytes)?),
            KeyFamily::Ed => Ok(DecodingKey::from_ed_pem(bytes)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, Validation};

    #[test]
    fn test_families() {
        assert_eq!(KeyFamily::of(Algorithm::HS256), KeyFamily::Hmac);
        assert_eq!(KeyFamily::of(Algorithm::PS512), KeyFamily::Rsa);
        assert_eq!(KeyFamily::of(Algorithm::ES384), KeyFamily::Ec);
        assert_eq!(KeyFamily::of(Algorithm::EdDSA), KeyFamily::Ed);
    }

    #[test]
    fn test_hmac_from_secret() {
        let key = KeyMaterial::from_secret("s3cret");
        assert!(key.decoding_key(Algorithm::HS256).is_ok());
    }

    #[test]
    fn test_empty_secret_rejected() {
        let key = KeyMaterial::from_secret("");
        assert!(matches!(key.decoding_key(Algorithm::HS256), Err(KeyError::Empty)));
        let key = KeyMaterial::from_pem("  \n");
        assert!(matches!(key.decoding_key(Algorithm::HS256), Err(KeyError::Empty)));
    }

    fn verifies(key: &DecodingKey, token: &str) -> bool {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        jsonwebtoken::decode::<serde_json::Value>(token, key, &validation).is_ok()
    }

    #[test]
    fn test_env_secret_keeps_surrounding_whitespace() {
        let secret = " padded secret\n";
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({ "sub": "alice" }),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        let exact = KeyMaterial::from_secret(secret).decoding_key(Algorithm::HS256).unwrap();
        assert!(verifies(&exact, &token));

        let from_file = KeyMaterial::from_pem(secret).decoding_key(Algorithm::HS256).unwrap();
        assert!(!verifies(&from_file, &token));
    }

    #[test]
    fn test_asymmetric_requires_pem_file() {
        let key = KeyMaterial::from_secret("s3cret");
        assert!(matches!(
            key.decoding_key(Algorithm::RS256),
            Err(KeyError::PemRequired(KeyFamily::Rsa))
        ));
    }

    #[test]
    fn test_garbage_pem_rejected() {
        let key = KeyMaterial::from_pem("not a pem");
        assert!(matches!(key.decoding_key(Algorithm::RS256), Err(KeyError::Invalid(_))));
    }

    #[test]
    fn test_load_missing_env() {
        let config = AuthConfig {
            secret_env: Some("API_GATEWAY_TEST_UNSET_SECRET_VAR".into()),
            ..AuthConfig::default()
        };
        assert!(matches!(KeyMaterial::load(&config), Err(KeyError::MissingEnv(_))));
    }

    #[test]
    fn test_load_no_source() {
        let config = AuthConfig {
            secret_env: None,
            key_file: None,
            ..AuthConfig::default()
        };
        assert!(matches!(KeyMaterial::load(&config), Err(KeyError::NoSource)));
    }

    #[test]
    fn test_load_missing_file() {
        let config = AuthConfig {
            key_file: Some("/nonexistent/api-gateway/jwt.key".into()),
            ..AuthConfig::default()
        };
        assert!(matches!(KeyMaterial::load(&config), Err(KeyError::Io { .. })));
    }
}
