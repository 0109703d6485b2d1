//! CLI bearer token minting and verification.
//!
//! # Purpose
//! The command-line client authenticates with a short-lived HS256 JWT signed
//! by the server secret. Tokens carry the caller's name, email and groups.
//!
//! # Key invariants
//! - Only HS256 is accepted; `exp` is mandatory and validated.
//! - The secret never leaves the process and is never logged.
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use registry_authz::Subject;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliClaims {
    pub name: String,
    pub email: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

impl CliClaims {
    pub fn into_subject(self) -> Subject {
        Subject::user(self.name, self.email).with_groups(self.groups)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("key error: {0}")]
    Key(String),
}

#[derive(Clone)]
pub struct CliTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for CliTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliTokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CliTokenIssuer {
    /// # Errors
    /// - `TokenError::Key` when the secret is empty.
    pub fn new(secret: &str, ttl: Duration) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::Key("token secret must not be empty".to_string()));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token for `subject` expiring after the configured TTL.
    pub fn mint(&self, subject: &Subject) -> Result<String, TokenError> {
        let now = unix_now();
        let claims = CliClaims {
            name: subject.name.clone(),
            email: subject.email.clone(),
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
            groups: subject.groups.clone(),
        };
        self.encode(&claims)
    }

    pub fn encode(&self, claims: &CliClaims) -> Result<String, TokenError> {
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.encoding_key,
        )?)
    }

    /// Verify signature, algorithm and expiry.
    pub fn verify(&self, token: &str) -> Result<CliClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        validation.leeway = 0;
        let data = jsonwebtoken::decode::<CliClaims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
