//! HTTP API request/response types.
//!
//! # Purpose
//! Payload shapes for the registry REST API and OpenAPI schema generation.
use crate::model::{ApiKey, Authority, AuthorityKey};
use chrono::{DateTime, Utc};
use registry_authz::{Policy, Subject};
use registry_common::{ApiKeyId, AuthorityId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct SystemInfo {
    pub service: String,
    pub api_version: String,
    pub storage_backend: String,
    pub durable_storage: bool,
    pub default_role: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
    /// Per-credential reasons when authentication failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct AuthorityCreateRequest {
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub policy_url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorityListResponse {
    pub items: Vec<Authority>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct AuthorityKeyRequest {
    pub key_id: String,
    pub ascii_armor: String,
    #[serde(default)]
    pub trust_signature: String,
}

impl From<AuthorityKeyRequest> for AuthorityKey {
    fn from(request: AuthorityKeyRequest) -> Self {
        AuthorityKey {
            id: Default::default(),
            key_id: request.key_id,
            ascii_armor: request.ascii_armor,
            trust_signature: request.trust_signature,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ApiKeyGrantRequest {
    pub label: String,
    /// Hours until expiry; zero or negative never expires.
    #[serde(default)]
    pub expire_in_hours: i64,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub policies: Vec<Policy>,
}

/// Returned once at grant time; `id` is the secret clients present.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ApiKeyGrantResponse {
    #[schema(value_type = String, format = Uuid)]
    pub id: ApiKeyId,
    pub label: String,
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ApiKeyView {
    #[schema(value_type = String, format = Uuid)]
    pub id: ApiKeyId,
    #[schema(value_type = String, format = Uuid)]
    pub authority_id: AuthorityId,
    pub label: String,
    pub expiration: Option<DateTime<Utc>>,
    #[schema(value_type = Vec<Object>)]
    pub policies: Vec<Policy>,
}

impl From<ApiKey> for ApiKeyView {
    fn from(key: ApiKey) -> Self {
        ApiKeyView {
            id: key.id,
            authority_id: key.authority_id,
            label: key.label,
            expiration: key.expiration,
            policies: key.policies,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyListResponse {
    pub items: Vec<ApiKeyView>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct WhoAmI {
    pub name: String,
    pub email: String,
    pub authority: String,
    #[schema(value_type = Option<String>, format = Uuid)]
    pub authority_id: Option<AuthorityId>,
    pub groups: Vec<String>,
}

impl From<Subject> for WhoAmI {
    fn from(subject: Subject) -> Self {
        WhoAmI {
            name: subject.name,
            email: subject.email,
            authority: subject.authority,
            authority_id: subject.authority_id,
            groups: subject.groups,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: u64,
}

/// Self-description of the API key used for the request.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ApiKeySelf {
    #[schema(value_type = String, format = Uuid)]
    pub authority_id: AuthorityId,
    pub authority: String,
    pub owner: String,
    pub policies: usize,
}
