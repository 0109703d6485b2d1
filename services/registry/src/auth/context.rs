//! Typed per-request authentication context.
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use registry_authz::Subject;
use std::convert::Infallible;

/// Outcome of credential resolution, stored in request extensions by
/// `attempt_authentication`.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub subject: Option<Subject>,
    pub auth_errors: Vec<String>,
}

impl RequestContext {
    pub fn authenticated(subject: Subject) -> Self {
        Self {
            subject: Some(subject),
            auth_errors: Vec::new(),
        }
    }

    pub fn unauthenticated(errors: Vec<String>) -> Self {
        Self {
            subject: None,
            auth_errors: errors,
        }
    }

    /// The resolved subject, or the anonymous subject when none was resolved.
    pub fn subject_or_anonymous(&self) -> Subject {
        self.subject.clone().unwrap_or_else(Subject::anonymous)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}
