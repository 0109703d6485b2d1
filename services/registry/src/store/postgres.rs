//! Postgres-backed implementation of the registry store.
//!
//! # Key invariants
//! - Authority names are unique under `lower(name)`; lookups compare the same way.
//! - Signing keys and API keys cascade with their authority (`ON DELETE CASCADE`).
//! - API key policies are stored as a JSONB array next to the key row.
//!
//! # Operational notes
//! - Migrations are executed at startup via `sqlx::migrate!("./migrations")`.
//! - Database URLs may contain credentials; never log `PostgresConfig::url`.
use super::{RegistryStore, StoreError, StoreResult};
use crate::config::PostgresConfig;
use crate::model::{ApiKey, Authority, AuthorityKey, AuthorityPatch};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use registry_authz::Policy;
use registry_common::{ApiKeyId, AuthorityId, AuthorityKeyId};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Durable registry store backed by Postgres.
pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, Clone, FromRow)]
struct DbAuthority {
    id: Uuid,
    name: String,
    owner: String,
    public: bool,
    policy_url: String,
}

#[derive(Debug, Clone, FromRow)]
struct DbAuthorityKey {
    id: Uuid,
    authority_id: Uuid,
    key_id: String,
    ascii_armor: String,
    trust_signature: String,
}

#[derive(Debug, Clone, FromRow)]
struct DbApiKey {
    id: Uuid,
    authority_id: Uuid,
    label: String,
    expiration: Option<DateTime<Utc>>,
    policies: Json<Vec<Policy>>,
}

impl PostgresStore {
    /// Connect, apply migrations, and return a ready store.
    ///
    /// # Errors
    /// - Connection, timeout, or migration failures.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, true).await
    }

    #[cfg(any(test, feature = "pg-tests"))]
    pub async fn connect_without_migrations(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, false).await
    }

    async fn connect_internal(pg: &PostgresConfig, run_migrations: bool) -> StoreResult<Self> {
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let connect = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options);
        let pool = tokio::time::timeout(Duration::from_millis(pg.connect_timeout_ms), connect)
            .await
            .map_err(|_| StoreError::Unexpected(anyhow!("postgres connect timed out")))??;

        if run_migrations {
            // Handlers assume the schema exists; fail startup otherwise.
            sqlx::migrate!("./migrations").run(&pool).await?;
        }

        Ok(Self { pool })
    }

    async fn keys_for(
        &self,
        authority_ids: &[Uuid],
    ) -> StoreResult<HashMap<Uuid, Vec<AuthorityKey>>> {
        let rows = sqlx::query_as::<_, DbAuthorityKey>(
            r#"SELECT id, authority_id, key_id, ascii_armor, trust_signature
               FROM authority_keys WHERE authority_id = ANY($1) ORDER BY created_at, id"#,
        )
        .bind(authority_ids)
        .fetch_all(&self.pool)
        .await?;
        let mut grouped: HashMap<Uuid, Vec<AuthorityKey>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.authority_id)
                .or_default()
                .push(authority_key_from_db(row));
        }
        Ok(grouped)
    }

    async fn hydrate(&self, rows: Vec<DbAuthority>) -> StoreResult<Vec<Authority>> {
        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut keys = self.keys_for(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let authority_keys = keys.remove(&row.id).unwrap_or_default();
                authority_from_db(row, authority_keys)
            })
            .collect())
    }

    async fn hydrate_one(&self, row: DbAuthority) -> StoreResult<Authority> {
        self.hydrate(vec![row])
            .await?
            .pop()
            .ok_or_else(|| StoreError::NotFound("authority".into()))
    }
}

#[async_trait]
impl RegistryStore for PostgresStore {
    async fn list_authorities(&self) -> StoreResult<Vec<Authority>> {
        let rows = sqlx::query_as::<_, DbAuthority>(
            "SELECT id, name, owner, public, policy_url FROM authorities ORDER BY lower(name)",
        )
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn get_authority(&self, id: AuthorityId) -> StoreResult<Authority> {
        let row = sqlx::query_as::<_, DbAuthority>(
            "SELECT id, name, owner, public, policy_url FROM authorities WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("authority".into()))?;
        self.hydrate_one(row).await
    }

    async fn find_authority_by_name(&self, name: &str) -> StoreResult<Authority> {
        let row = sqlx::query_as::<_, DbAuthority>(
            "SELECT id, name, owner, public, policy_url FROM authorities WHERE lower(name) = lower($1)",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("authority".into()))?;
        self.hydrate_one(row).await
    }

    async fn create_authority(&self, authority: Authority) -> StoreResult<Authority> {
        let mut tx = self.pool.begin().await?;
        let insert = sqlx::query(
            r#"INSERT INTO authorities (id, name, owner, public, policy_url)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(authority.id.as_uuid())
        .bind(&authority.name)
        .bind(&authority.owner)
        .bind(authority.public)
        .bind(&authority.policy_url)
        .execute(&mut *tx)
        .await;
        if let Err(err) = insert {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict("authority exists".into()));
            }
            return Err(err.into());
        }

        for key in &authority.keys {
            sqlx::query(
                r#"INSERT INTO authority_keys (id, authority_id, key_id, ascii_armor, trust_signature)
                   VALUES ($1, $2, $3, $4, $5)"#,
            )
            .bind(key.id.as_uuid())
            .bind(authority.id.as_uuid())
            .bind(&key.key_id)
            .bind(&key.ascii_armor)
            .bind(&key.trust_signature)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(authority)
    }

    async fn update_authority(
        &self,
        id: AuthorityId,
        patch: AuthorityPatch,
    ) -> StoreResult<Authority> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, DbAuthority>(
            "SELECT id, name, owner, public, policy_url FROM authorities WHERE id = $1 FOR UPDATE",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound("authority".into()))?;

        let mut authority = authority_from_db(row, Vec::new());
        patch.apply(&mut authority);
        let update = sqlx::query(
            r#"UPDATE authorities SET name = $2, owner = $3, public = $4, policy_url = $5
               WHERE id = $1"#,
        )
        .bind(id.as_uuid())
        .bind(&authority.name)
        .bind(&authority.owner)
        .bind(authority.public)
        .bind(&authority.policy_url)
        .execute(&mut *tx)
        .await;
        if let Err(err) = update {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict("authority exists".into()));
            }
            return Err(err.into());
        }
        tx.commit().await?;
        self.get_authority(id).await
    }

    async fn delete_authority(&self, id: AuthorityId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM authorities WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("authority".into()));
        }
        Ok(())
    }

    async fn add_authority_key(
        &self,
        authority_id: AuthorityId,
        key: AuthorityKey,
    ) -> StoreResult<AuthorityKey> {
        let insert = sqlx::query(
            r#"INSERT INTO authority_keys (id, authority_id, key_id, ascii_armor, trust_signature)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(key.id.as_uuid())
        .bind(authority_id.as_uuid())
        .bind(&key.key_id)
        .bind(&key.ascii_armor)
        .bind(&key.trust_signature)
        .execute(&self.pool)
        .await;
        match insert {
            Ok(_) => Ok(key),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::Conflict("authority key exists".into()))
            }
            Err(err) if is_foreign_key_violation(&err) => {
                Err(StoreError::NotFound("authority".into()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn remove_authority_key(
        &self,
        authority_id: AuthorityId,
        key_id: AuthorityKeyId,
    ) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM authority_keys WHERE authority_id = $1 AND id = $2")
            .bind(authority_id.as_uuid())
            .bind(key_id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("authority key".into()));
        }
        Ok(())
    }

    async fn create_api_key(&self, key: ApiKey) -> StoreResult<ApiKey> {
        let insert = sqlx::query(
            r#"INSERT INTO api_keys (id, authority_id, label, expiration, policies)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(key.id.as_uuid())
        .bind(key.authority_id.as_uuid())
        .bind(&key.label)
        .bind(key.expiration)
        .bind(Json(&key.policies))
        .execute(&self.pool)
        .await;
        match insert {
            Ok(_) => Ok(key),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::Conflict("api key exists".into()))
            }
            Err(err) if is_foreign_key_violation(&err) => {
                Err(StoreError::NotFound("authority".into()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_api_key(&self, id: ApiKeyId) -> StoreResult<ApiKey> {
        let row = sqlx::query_as::<_, DbApiKey>(
            "SELECT id, authority_id, label, expiration, policies FROM api_keys WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("api key".into()))?;
        Ok(api_key_from_db(row))
    }

    async fn list_api_keys(&self, authority_id: AuthorityId) -> StoreResult<Vec<ApiKey>> {
        let rows = sqlx::query_as::<_, DbApiKey>(
            r#"SELECT id, authority_id, label, expiration, policies
               FROM api_keys WHERE authority_id = $1 ORDER BY label, id"#,
        )
        .bind(authority_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(api_key_from_db).collect())
    }

    async fn delete_api_key(&self, id: ApiKeyId) -> StoreResult<()> {
        sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

fn authority_from_db(row: DbAuthority, keys: Vec<AuthorityKey>) -> Authority {
    Authority {
        id: AuthorityId::from_uuid(row.id),
        name: row.name,
        owner: row.owner,
        public: row.public,
        policy_url: row.policy_url,
        keys,
    }
}

fn authority_key_from_db(row: DbAuthorityKey) -> AuthorityKey {
    AuthorityKey {
        id: AuthorityKeyId::from_uuid(row.id),
        key_id: row.key_id,
        ascii_armor: row.ascii_armor,
        trust_signature: row.trust_signature,
    }
}

fn api_key_from_db(row: DbApiKey) -> ApiKey {
    ApiKey {
        id: ApiKeyId::from_uuid(row.id),
        authority_id: AuthorityId::from_uuid(row.authority_id),
        label: row.label,
        expiration: row.expiration,
        policies: row.policies.0,
    }
}

fn database_code(err: &sqlx::Error) -> Option<String> {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code.into_owned());
    }
    None
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    database_code(err).as_deref() == Some("23505")
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    database_code(err).as_deref() == Some("23503")
}
