//! In-memory implementation of the registry store.
//!
//! # Purpose
//! Implements [`RegistryStore`] with `HashMap`s guarded by `tokio::sync::RwLock`
//! for local development and tests.
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - Mutations take the write lock of every map they touch, always in the
//!   order authorities then API keys.
use super::{RegistryStore, StoreError, StoreResult};
use crate::model::{ApiKey, Authority, AuthorityKey, AuthorityPatch};
use async_trait::async_trait;
use registry_common::{ApiKeyId, AuthorityId, AuthorityKeyId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryStore {
    authorities: Arc<RwLock<HashMap<AuthorityId, Authority>>>,
    api_keys: Arc<RwLock<HashMap<ApiKeyId, ApiKey>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn name_taken(
    authorities: &HashMap<AuthorityId, Authority>,
    name: &str,
    except: Option<AuthorityId>,
) -> bool {
    authorities
        .values()
        .any(|existing| Some(existing.id) != except && existing.matches_name(name))
}

#[async_trait]
impl RegistryStore for InMemoryStore {
    async fn list_authorities(&self) -> StoreResult<Vec<Authority>> {
        let mut items: Vec<Authority> = self.authorities.read().await.values().cloned().collect();
        items.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(items)
    }

    async fn get_authority(&self, id: AuthorityId) -> StoreResult<Authority> {
        self.authorities
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("authority".into()))
    }

    async fn find_authority_by_name(&self, name: &str) -> StoreResult<Authority> {
        self.authorities
            .read()
            .await
            .values()
            .find(|authority| authority.matches_name(name))
            .cloned()
            .ok_or_else(|| StoreError::NotFound("authority".into()))
    }

    async fn create_authority(&self, authority: Authority) -> StoreResult<Authority> {
        let mut authorities = self.authorities.write().await;
        if authorities.contains_key(&authority.id)
            || name_taken(&authorities, &authority.name, None)
        {
            return Err(StoreError::Conflict("authority exists".into()));
        }
        authorities.insert(authority.id, authority.clone());
        Ok(authority)
    }

    async fn update_authority(
        &self,
        id: AuthorityId,
        patch: AuthorityPatch,
    ) -> StoreResult<Authority> {
        let mut authorities = self.authorities.write().await;
        if let Some(name) = patch.name.as_deref()
            && name_taken(&authorities, name, Some(id))
        {
            return Err(StoreError::Conflict("authority exists".into()));
        }
        let authority = authorities
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("authority".into()))?;
        patch.apply(authority);
        Ok(authority.clone())
    }

    async fn delete_authority(&self, id: AuthorityId) -> StoreResult<()> {
        let mut authorities = self.authorities.write().await;
        if authorities.remove(&id).is_none() {
            return Err(StoreError::NotFound("authority".into()));
        }
        drop(authorities);
        // Cascade: API keys die with their authority.
        self.api_keys
            .write()
            .await
            .retain(|_, key| key.authority_id != id);
        Ok(())
    }

    async fn add_authority_key(
        &self,
        authority_id: AuthorityId,
        key: AuthorityKey,
    ) -> StoreResult<AuthorityKey> {
        let mut authorities = self.authorities.write().await;
        let authority = authorities
            .get_mut(&authority_id)
            .ok_or_else(|| StoreError::NotFound("authority".into()))?;
        if authority
            .keys
            .iter()
            .any(|existing| existing.id == key.id || existing.key_id == key.key_id)
        {
            return Err(StoreError::Conflict("authority key exists".into()));
        }
        authority.keys.push(key.clone());
        Ok(key)
    }

    async fn remove_authority_key(
        &self,
        authority_id: AuthorityId,
        key_id: AuthorityKeyId,
    ) -> StoreResult<()> {
        let mut authorities = self.authorities.write().await;
        let authority = authorities
            .get_mut(&authority_id)
            .ok_or_else(|| StoreError::NotFound("authority".into()))?;
        let before = authority.keys.len();
        authority.keys.retain(|key| key.id != key_id);
        if authority.keys.len() == before {
            return Err(StoreError::NotFound("authority key".into()));
        }
        Ok(())
    }

    async fn create_api_key(&self, key: ApiKey) -> StoreResult<ApiKey> {
        let authorities = self.authorities.read().await;
        if !authorities.contains_key(&key.authority_id) {
            return Err(StoreError::NotFound("authority".into()));
        }
        let mut api_keys = self.api_keys.write().await;
        if api_keys.contains_key(&key.id) {
            return Err(StoreError::Conflict("api key exists".into()));
        }
        api_keys.insert(key.id, key.clone());
        Ok(key)
    }

    async fn get_api_key(&self, id: ApiKeyId) -> StoreResult<ApiKey> {
        self.api_keys
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("api key".into()))
    }

    async fn list_api_keys(&self, authority_id: AuthorityId) -> StoreResult<Vec<ApiKey>> {
        let mut items: Vec<ApiKey> = self
            .api_keys
            .read()
            .await
            .values()
            .filter(|key| key.authority_id == authority_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(items)
    }

    async fn delete_api_key(&self, id: ApiKeyId) -> StoreResult<()> {
        self.api_keys.write().await.remove(&id);
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
