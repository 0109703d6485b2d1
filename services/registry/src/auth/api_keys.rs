//! API key lifecycle.
//!
//! # Purpose
//! Grants, looks up, and revokes the API keys that tie a caller to one
//! authority, and turns a presented key into a [`Subject`].
//!
//! # Key invariants
//! - A key without expiration never expires.
//! - Expired keys are evicted lazily, on the first lookup after expiry. There
//!   is no background sweep.
//! - Eviction and revoke tolerate a row that is already gone, so racing
//!   requests both observe `Expired` rather than a storage error.
use crate::model::ApiKey;
use crate::observability::set_api_key_count;
use crate::store::{RegistryStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use registry_authz::{Policy, Subject};
use registry_common::{ApiKeyId, AuthorityId};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiKeyError {
    #[error("cannot parse id: {0}")]
    CannotParseId(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("key not found")]
    KeyNotFound,
    #[error("api key expired")]
    Expired,
    #[error("expiry of {0} hours is out of range")]
    InvalidExpiry(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone)]
pub struct ApiKeyManager {
    store: Arc<dyn RegistryStore>,
    clock: Arc<dyn Clock>,
}

impl ApiKeyManager {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn RegistryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create a key for `authority_id`. `expire_in_hours <= 0` means the key
    /// never expires.
    ///
    /// # Errors
    /// - `InvalidExpiry` when `now + expire_in_hours` is not representable.
    /// - `Store(NotFound)` when the authority does not exist.
    pub async fn grant(
        &self,
        authority_id: AuthorityId,
        label: &str,
        expire_in_hours: i64,
        policies: Vec<Policy>,
    ) -> Result<ApiKey, ApiKeyError> {
        let expiration = if expire_in_hours > 0 {
            let expiration = Duration::try_hours(expire_in_hours)
                .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
                .ok_or(ApiKeyError::InvalidExpiry(expire_in_hours))?;
            Some(expiration)
        } else {
            None
        };
        let key = self
            .store
            .create_api_key(ApiKey {
                id: ApiKeyId::new(),
                authority_id,
                label: label.to_string(),
                expiration,
                policies,
            })
            .await?;
        tracing::info!(
            authority_id = %authority_id,
            api_key_id = %key.id,
            expires = ?key.expiration,
            "api key granted"
        );
        self.refresh_metrics(authority_id).await;
        Ok(key)
    }

    /// Look a key up, evicting it when it has expired.
    pub async fn find(&self, id: ApiKeyId) -> Result<ApiKey, ApiKeyError> {
        let key = match self.store.get_api_key(id).await {
            Ok(key) => key,
            Err(StoreError::NotFound(_)) => return Err(ApiKeyError::KeyNotFound),
            Err(err) => return Err(err.into()),
        };
        if !key.is_expired(self.clock.now()) {
            return Ok(key);
        }

        match self.store.delete_api_key(id).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(err) => {
                tracing::warn!(api_key_id = %id, error = %err, "failed to evict expired api key");
            }
        }
        tracing::debug!(api_key_id = %id, "expired api key evicted");
        self.refresh_metrics(key.authority_id).await;
        Err(ApiKeyError::Expired)
    }

    /// Delete a key. Revoking an absent or expired key succeeds.
    pub async fn revoke(&self, raw_id: &str) -> Result<(), ApiKeyError> {
        let id: ApiKeyId = raw_id
            .parse()
            .map_err(|_| ApiKeyError::CannotParseId(raw_id.to_string()))?;
        let authority_id = match self.find(id).await {
            Ok(key) => Some(key.authority_id),
            Err(ApiKeyError::KeyNotFound | ApiKeyError::Expired) => None,
            Err(err) => return Err(err),
        };
        match self.store.delete_api_key(id).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        if let Some(authority_id) = authority_id {
            tracing::info!(authority_id = %authority_id, api_key_id = %id, "api key revoked");
            self.refresh_metrics(authority_id).await;
        }
        Ok(())
    }

    pub async fn list(&self, authority_id: AuthorityId) -> Result<Vec<ApiKey>, ApiKeyError> {
        Ok(self.store.list_api_keys(authority_id).await?)
    }

    /// Resolve a presented key into the subject acting on behalf of its
    /// authority.
    ///
    /// # Errors
    /// - `CannotParseId` before any lookup when the key is not a UUID.
    /// - `KeyNotFound` / `Expired` from [`ApiKeyManager::find`].
    /// - `InvalidKey` when the owning authority cannot be loaded.
    pub async fn get_user_details(&self, raw_key: &str) -> Result<Subject, ApiKeyError> {
        let id: ApiKeyId = raw_key
            .trim()
            .parse()
            .map_err(|_| ApiKeyError::CannotParseId(raw_key.to_string()))?;
        let key = self.find(id).await?;
        let authority = self
            .store
            .get_authority(key.authority_id)
            .await
            .map_err(|err| ApiKeyError::InvalidKey(err.to_string()))?;
        Ok(Subject {
            email: authority.owner,
            authority: authority.name,
            authority_id: Some(authority.id),
            policies: key.policies,
            ..Subject::default()
        })
    }

    /// Publish active/expired counts for one authority. Failures are logged.
    async fn refresh_metrics(&self, authority_id: AuthorityId) {
        let authority = match self.store.get_authority(authority_id).await {
            Ok(authority) => authority,
            Err(err) => {
                tracing::debug!(authority_id = %authority_id, error = %err, "skip api key metrics");
                return;
            }
        };
        let keys = match self.store.list_api_keys(authority_id).await {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!(authority_id = %authority_id, error = %err, "count api keys failed");
                return;
            }
        };
        let now = self.clock.now();
        let expired = keys.iter().filter(|key| key.is_expired(now)).count();
        set_api_key_count(&authority.name, "active", keys.len() - expired);
        set_api_key_count(&authority.name, "expired", expired);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Authority;
    use crate::store::memory::InMemoryStore;
    use registry_authz::Effect;

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        manager: ApiKeyManager,
        authority: Authority,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let manager = ApiKeyManager::with_clock(store.clone(), clock.clone());
        let authority = store
            .create_authority(Authority::new("acme", "owner@acme.io", false))
            .await
            .expect("authority");
        Fixture {
            store,
            clock,
            manager,
            authority,
        }
    }

    #[tokio::test]
    async fn key_expires_and_is_evicted_once() {
        let f = fixture().await;
        let key = f
            .manager
            .grant(f.authority.id, "k", 1, vec![])
            .await
            .expect("grant");
        assert!(f.manager.find(key.id).await.is_ok());

        f.clock.advance(Duration::hours(1) + Duration::seconds(1));
        assert!(matches!(
            f.manager.find(key.id).await,
            Err(ApiKeyError::Expired)
        ));
        assert!(matches!(
            f.store.get_api_key(key.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            f.manager.find(key.id).await,
            Err(ApiKeyError::KeyNotFound)
        ));
        f.manager
            .revoke(&key.id.to_string())
            .await
            .expect("revoke after eviction");
    }

    #[tokio::test]
    async fn out_of_range_expiry_is_rejected() {
        let f = fixture().await;
        assert!(matches!(
            f.manager.grant(f.authority.id, "k", i64::MAX, vec![]).await,
            Err(ApiKeyError::InvalidExpiry(i64::MAX))
        ));
        // Representable as a duration, but past the last valid timestamp.
        assert!(matches!(
            f.manager.grant(f.authority.id, "k", 100_000_000_000, vec![]).await,
            Err(ApiKeyError::InvalidExpiry(_))
        ));
        assert!(
            f.store
                .list_api_keys(f.authority.id)
                .await
                .expect("list")
                .is_empty()
        );
    }

    /// Holds every `get_api_key` until two callers have read the row, so both
    /// lookups see the key before either evicts it.
    struct RacingStore {
        inner: InMemoryStore,
        barrier: tokio::sync::Barrier,
    }

    #[async_trait::async_trait]
    impl RegistryStore for RacingStore {
        async fn list_authorities(&self) -> crate::store::StoreResult<Vec<Authority>> {
            self.inner.list_authorities().await
        }
        async fn get_authority(&self, id: AuthorityId) -> crate::store::StoreResult<Authority> {
            self.inner.get_authority(id).await
        }
        async fn find_authority_by_name(
            &self,
            name: &str,
        ) -> crate::store::StoreResult<Authority> {
            self.inner.find_authority_by_name(name).await
        }
        async fn create_authority(
            &self,
            authority: Authority,
        ) -> crate::store::StoreResult<Authority> {
            self.inner.create_authority(authority).await
        }
        async fn update_authority(
            &self,
            id: AuthorityId,
            patch: crate::model::AuthorityPatch,
        ) -> crate::store::StoreResult<Authority> {
            self.inner.update_authority(id, patch).await
        }
        async fn delete_authority(&self, id: AuthorityId) -> crate::store::StoreResult<()> {
            self.inner.delete_authority(id).await
        }
        async fn add_authority_key(
            &self,
            authority_id: AuthorityId,
            key: crate::model::AuthorityKey,
        ) -> crate::store::StoreResult<crate::model::AuthorityKey> {
            self.inner.add_authority_key(authority_id, key).await
        }
        async fn remove_authority_key(
            &self,
            authority_id: AuthorityId,
            key_id: registry_common::AuthorityKeyId,
        ) -> crate::store::StoreResult<()> {
            self.inner.remove_authority_key(authority_id, key_id).await
        }
        async fn create_api_key(&self, key: ApiKey) -> crate::store::StoreResult<ApiKey> {
            self.inner.create_api_key(key).await
        }
        async fn get_api_key(&self, id: ApiKeyId) -> crate::store::StoreResult<ApiKey> {
            let key = self.inner.get_api_key(id).await;
            self.barrier.wait().await;
            key
        }
        async fn list_api_keys(
            &self,
            authority_id: AuthorityId,
        ) -> crate::store::StoreResult<Vec<ApiKey>> {
            self.inner.list_api_keys(authority_id).await
        }
        async fn delete_api_key(&self, id: ApiKeyId) -> crate::store::StoreResult<()> {
            self.inner.delete_api_key(id).await
        }
        async fn health_check(&self) -> crate::store::StoreResult<()> {
            Ok(())
        }
        fn is_durable(&self) -> bool {
            false
        }
        fn backend_name(&self) -> &'static str {
            "racing"
        }
    }

    #[tokio::test]
    async fn concurrent_lookups_of_expired_key_both_report_expired() {
        let store = Arc::new(RacingStore {
            inner: InMemoryStore::new(),
            barrier: tokio::sync::Barrier::new(2),
        });
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let manager = ApiKeyManager::with_clock(store.clone(), clock.clone());
        let authority = store
            .create_authority(Authority::new("acme", "owner@acme.io", false))
            .await
            .expect("authority");
        let key = manager
            .grant(authority.id, "k", 1, vec![])
            .await
            .expect("grant");

        clock.advance(Duration::hours(2));
        let (first, second) = tokio::join!(manager.find(key.id), manager.find(key.id));
        assert!(matches!(first, Err(ApiKeyError::Expired)), "{first:?}");
        assert!(matches!(second, Err(ApiKeyError::Expired)), "{second:?}");
        assert!(matches!(
            store.inner.get_api_key(key.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn key_without_expiry_never_expires() {
        let f = fixture().await;
        let key = f
            .manager
            .grant(f.authority.id, "ci-key", 0, vec![])
            .await
            .expect("grant");
        assert_eq!(key.expiration, None);

        f.clock.advance(Duration::days(365 * 50));
        assert_eq!(f.manager.find(key.id).await.expect("find").id, key.id);
    }

    #[tokio::test]
    async fn negative_expiry_means_no_expiry() {
        let f = fixture().await;
        let key = f
            .manager
            .grant(f.authority.id, "k", -5, vec![])
            .await
            .expect("grant");
        assert_eq!(key.expiration, None);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let f = fixture().await;
        let key = f
            .manager
            .grant(f.authority.id, "k", 0, vec![])
            .await
            .expect("grant");
        f.manager.revoke(&key.id.to_string()).await.expect("first");
        f.manager.revoke(&key.id.to_string()).await.expect("second");
        assert!(matches!(
            f.manager.find(key.id).await,
            Err(ApiKeyError::KeyNotFound)
        ));
        assert!(matches!(
            f.manager.revoke("not-a-uuid").await,
            Err(ApiKeyError::CannotParseId(_))
        ));
    }

    #[tokio::test]
    async fn grant_for_missing_authority_fails() {
        let f = fixture().await;
        assert!(matches!(
            f.manager.grant(AuthorityId::new(), "k", 0, vec![]).await,
            Err(ApiKeyError::Store(StoreError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn user_details_carry_authority_and_policies() {
        let f = fixture().await;
        let policy = Policy::new(
            "read-only",
            Effect::Deny,
            ["modules:create"],
            ["module:*"],
        );
        let key = f
            .manager
            .grant(f.authority.id, "k", 0, vec![policy.clone()])
            .await
            .expect("grant");

        let subject = f
            .manager
            .get_user_details(&key.id.to_string())
            .await
            .expect("details");
        assert_eq!(subject.email, "owner@acme.io");
        assert_eq!(subject.authority, "acme");
        assert_eq!(subject.authority_id, Some(f.authority.id));
        assert_eq!(subject.policies, vec![policy]);
        assert!(subject.is_api_key());
    }

    #[tokio::test]
    async fn user_details_error_kinds() {
        let f = fixture().await;
        assert!(matches!(
            f.manager.get_user_details("garbage").await,
            Err(ApiKeyError::CannotParseId(_))
        ));
        assert!(matches!(
            f.manager
                .get_user_details(&ApiKeyId::new().to_string())
                .await,
            Err(ApiKeyError::KeyNotFound)
        ));

        let key = f
            .manager
            .grant(f.authority.id, "k", 1, vec![])
            .await
            .expect("grant");
        f.clock.advance(Duration::hours(2));
        assert!(matches!(
            f.manager.get_user_details(&key.id.to_string()).await,
            Err(ApiKeyError::Expired)
        ));
    }
}
