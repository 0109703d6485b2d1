use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("unknown target: {0}")]
    UnknownTarget(String),
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("cannot decompose resource: {0}")]
    InvalidResource(String),
    #[error("element not supported: {0}")]
    Unsupported(String),
}

pub type AuthzResult<T> = Result<T, AuthzError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RbacError {
    #[error("element not supported: {0}")]
    Unsupported(String),
    #[error("subject not authorized")]
    UnauthorizedSubject,
    #[error("rule backend failure: {0}")]
    Backend(String),
}

impl From<AuthzError> for RbacError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Unsupported(element) => RbacError::Unsupported(element),
            other => RbacError::Unsupported(other.to_string()),
        }
    }
}
