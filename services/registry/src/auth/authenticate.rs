//! Caller authentication.
//!
//! # Purpose
//! Resolves the caller from one of three mutually exclusive credentials, tried
//! in a fixed order:
//! 1. a CLI bearer JWT (`Authorization: Bearer <jwt>`),
//! 2. an API key (`Authorization: Bearer x-api-key:<key>` or `X-API-Key`),
//! 3. a browser session cookie.
//!
//! The first parser that succeeds wins. When all fail, every parser's error is
//! kept so the 401 response can say why.
//!
//! # Key invariants
//! - A parser that sees a credential meant for another parser reports
//!   `UnexpectedOrigin` instead of trying to validate it.
//! - Authentication never rejects a request by itself; `require_authentication`
//!   and `require_authority` do.
use crate::api::error::{api_unauthorized, api_unauthorized_with};
use crate::auth::api_keys::ApiKeyManager;
use crate::auth::cli_token::CliTokenIssuer;
use crate::auth::context::RequestContext;
use crate::auth::session::Sessions;
use crate::observability::record_authn_attempt;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use registry_authz::Subject;
use thiserror::Error;

pub const AUTHORIZATION_SOURCE: &str = "Authorization";
pub const API_KEY_SOURCE: &str = "X-API-Key";
pub const SESSION_SOURCE: &str = "Session";

pub const API_KEY_HEADER: &str = "x-api-key";
const BEARER_PREFIX: &str = "Bearer ";
const API_KEY_TOKEN_PREFIX: &str = "x-api-key:";

pub const AUTHORITY_REQUIRED: &str = "An API key is required to perform this operation.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("{0}: missing")]
    Missing(&'static str),
    #[error("{0}: invalid format")]
    InvalidFormat(&'static str),
    #[error("{0}: {1}")]
    InvalidValue(&'static str, String),
    #[error("{0}: unexpected origin")]
    UnexpectedOrigin(&'static str),
}

#[derive(Clone)]
pub struct Authenticator {
    tokens: CliTokenIssuer,
    api_keys: ApiKeyManager,
    sessions: Sessions,
}

impl Authenticator {
    pub fn new(tokens: CliTokenIssuer, api_keys: ApiKeyManager, sessions: Sessions) -> Self {
        Self {
            tokens,
            api_keys,
            sessions,
        }
    }

    /// Try every parser in order.
    ///
    /// # Errors
    /// - All parser errors, in parser order, when none succeeds.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Subject, Vec<AuthError>> {
        let mut errors = Vec::with_capacity(3);

        match self.from_cli_token(headers) {
            Ok(subject) => {
                record_authn_attempt("cli", "success");
                return Ok(subject);
            }
            Err(err) => errors.push(err),
        }
        match self.from_api_key(headers).await {
            Ok(subject) => {
                record_authn_attempt("api_key", "success");
                return Ok(subject);
            }
            Err(err) => errors.push(err),
        }
        match self.sessions.subject(headers) {
            Ok(subject) => {
                record_authn_attempt("session", "success");
                return Ok(subject);
            }
            Err(err) => errors.push(err),
        }

        record_authn_attempt("none", "failure");
        Err(errors)
    }

    fn from_cli_token(&self, headers: &HeaderMap) -> Result<Subject, AuthError> {
        let header = headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::Missing(AUTHORIZATION_SOURCE))?;
        let token = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::InvalidFormat(AUTHORIZATION_SOURCE))?;
        if token.starts_with(API_KEY_TOKEN_PREFIX) {
            return Err(AuthError::UnexpectedOrigin(AUTHORIZATION_SOURCE));
        }
        let claims = self.tokens.verify(token).map_err(|err| {
            tracing::debug!(error = %err, "cli token rejected");
            AuthError::InvalidValue(
                AUTHORIZATION_SOURCE,
                "token either expired or inexistent".to_string(),
            )
        })?;
        Ok(claims.into_subject())
    }

    async fn from_api_key(&self, headers: &HeaderMap) -> Result<Subject, AuthError> {
        let (source, key) = match headers.get(AUTHORIZATION) {
            Some(header) => {
                let key = header
                    .to_str()
                    .ok()
                    .and_then(|value| value.strip_prefix(BEARER_PREFIX))
                    .and_then(|value| value.trim().strip_prefix(API_KEY_TOKEN_PREFIX))
                    .ok_or(AuthError::UnexpectedOrigin(AUTHORIZATION_SOURCE))?;
                (AUTHORIZATION_SOURCE, key)
            }
            None => {
                let header = headers
                    .get(API_KEY_HEADER)
                    .ok_or(AuthError::Missing(API_KEY_SOURCE))?;
                let key = header
                    .to_str()
                    .map_err(|_| AuthError::InvalidFormat(API_KEY_SOURCE))?;
                (API_KEY_SOURCE, key)
            }
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(AuthError::InvalidFormat(source));
        }
        self.api_keys.get_user_details(key).await.map_err(|err| {
            tracing::debug!(error = %err, "api key rejected");
            AuthError::InvalidValue(source, err.to_string())
        })
    }
}

/// Resolve the caller and store the outcome as a [`RequestContext`].
pub async fn attempt_authentication(
    State(authenticator): State<Authenticator>,
    mut request: Request,
    next: Next,
) -> Response {
    let context = match authenticator.authenticate(request.headers()).await {
        Ok(subject) => RequestContext::authenticated(subject),
        Err(errors) => {
            RequestContext::unauthenticated(errors.iter().map(ToString::to_string).collect())
        }
    };
    request.extensions_mut().insert(context);
    next.run(request).await
}

/// Reject with 401 and the collected parser errors when no subject was resolved.
pub async fn require_authentication(request: Request, next: Next) -> Response {
    let context = request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_default();
    if context.subject.is_none() {
        return api_unauthorized_with("authentication required", context.auth_errors)
            .into_response();
    }
    next.run(request).await
}

/// Reject with 401 unless the caller authenticated with an API key.
pub async fn require_authority(request: Request, next: Next) -> Response {
    let has_authority = request
        .extensions()
        .get::<RequestContext>()
        .and_then(|context| context.subject.as_ref())
        .is_some_and(Subject::is_api_key);
    if !has_authority {
        return api_unauthorized(AUTHORITY_REQUIRED).into_response();
    }
    next.run(request).await
}
