//! Persistence for authorities, their signing keys, and API keys.
//!
//! # Notes
//! Deleting an API key that is already gone succeeds; lazy expiry and revoke
//! may race and both must be no-ops on the loser's side.
use crate::model::{ApiKey, Authority, AuthorityKey, AuthorityPatch};
use async_trait::async_trait;
use registry_common::{ApiKeyId, AuthorityId, AuthorityKeyId};
use thiserror::Error;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unexpected(err.into())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(err.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn list_authorities(&self) -> StoreResult<Vec<Authority>>;
    async fn get_authority(&self, id: AuthorityId) -> StoreResult<Authority>;
    /// Case-insensitive lookup by name.
    async fn find_authority_by_name(&self, name: &str) -> StoreResult<Authority>;
    async fn create_authority(&self, authority: Authority) -> StoreResult<Authority>;
    async fn update_authority(
        &self,
        id: AuthorityId,
        patch: AuthorityPatch,
    ) -> StoreResult<Authority>;
    /// Removes the authority together with its signing keys and API keys.
    async fn delete_authority(&self, id: AuthorityId) -> StoreResult<()>;

    async fn add_authority_key(
        &self,
        authority_id: AuthorityId,
        key: AuthorityKey,
    ) -> StoreResult<AuthorityKey>;
    async fn remove_authority_key(
        &self,
        authority_id: AuthorityId,
        key_id: AuthorityKeyId,
    ) -> StoreResult<()>;

    async fn create_api_key(&self, key: ApiKey) -> StoreResult<ApiKey>;
    async fn get_api_key(&self, id: ApiKeyId) -> StoreResult<ApiKey>;
    async fn list_api_keys(&self, authority_id: AuthorityId) -> StoreResult<Vec<ApiKey>>;
    async fn delete_api_key(&self, id: ApiKeyId) -> StoreResult<()>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}
