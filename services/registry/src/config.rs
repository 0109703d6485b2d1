use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5758";
pub const DEFAULT_METRICS_BIND: &str = "0.0.0.0:9090";
pub const DEFAULT_ROLE: &str = "readonly";
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 86_400;
pub const DEFAULT_SESSION_COOKIE: &str = "registry_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" => Ok(StorageBackend::Postgres),
            other => bail!("unknown storage backend: {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_timeout_ms() -> u64 {
    5_000
}

// Registry configuration sourced from environment variables, optionally
// overridden by the YAML file named in REGISTRY_CONFIG.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub rbac_policy_path: Option<PathBuf>,
    pub rbac_default_role: String,
    pub token_secret: String,
    pub token_ttl_secs: u64,
    pub session_cookie_name: String,
}

#[derive(Debug, Deserialize)]
struct RegistryConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    storage: Option<String>,
    postgres: Option<PostgresConfig>,
    rbac_policy_path: Option<PathBuf>,
    rbac_default_role: Option<String>,
    token_secret: Option<String>,
    token_ttl_secs: Option<u64>,
    session_cookie_name: Option<String>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value.parse().with_context(|| format!("parse {key}")),
        Err(_) => Ok(default),
    }
}

impl RegistryConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self::env_values()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::env_values()?;
        if let Ok(path) = std::env::var("REGISTRY_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read REGISTRY_CONFIG: {path}"))?;
            let override_cfg: RegistryConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse registry config yaml")?;
            config.apply(override_cfg)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn env_values() -> Result<Self> {
        let bind_addr = env_or("REGISTRY_BIND", DEFAULT_BIND_ADDR)
            .parse()
            .with_context(|| "parse REGISTRY_BIND")?;
        let metrics_bind = env_or("REGISTRY_METRICS_BIND", DEFAULT_METRICS_BIND)
            .parse()
            .with_context(|| "parse REGISTRY_METRICS_BIND")?;
        let storage = env_or("REGISTRY_STORAGE", "memory").parse()?;
        let postgres = match std::env::var("REGISTRY_DATABASE_URL") {
            Ok(url) => Some(PostgresConfig {
                url,
                max_connections: env_parse(
                    "REGISTRY_PG_MAX_CONNECTIONS",
                    default_max_connections(),
                )?,
                connect_timeout_ms: env_parse(
                    "REGISTRY_PG_CONNECT_TIMEOUT_MS",
                    default_timeout_ms(),
                )?,
                acquire_timeout_ms: env_parse(
                    "REGISTRY_PG_ACQUIRE_TIMEOUT_MS",
                    default_timeout_ms(),
                )?,
            }),
            Err(_) => None,
        };
        let rbac_policy_path = std::env::var("REGISTRY_RBAC_POLICY_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        Ok(Self {
            bind_addr,
            metrics_bind,
            storage,
            postgres,
            rbac_policy_path,
            rbac_default_role: env_or("REGISTRY_RBAC_DEFAULT_ROLE", DEFAULT_ROLE),
            token_secret: std::env::var("REGISTRY_TOKEN_SECRET").unwrap_or_default(),
            token_ttl_secs: env_parse("REGISTRY_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?,
            session_cookie_name: env_or("REGISTRY_SESSION_COOKIE", DEFAULT_SESSION_COOKIE),
        })
    }

    fn apply(&mut self, override_cfg: RegistryConfigOverride) -> Result<()> {
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.storage {
            self.storage = value.parse()?;
        }
        if let Some(value) = override_cfg.postgres {
            self.postgres = Some(value);
        }
        if let Some(value) = override_cfg.rbac_policy_path {
            self.rbac_policy_path = Some(value);
        }
        if let Some(value) = override_cfg.rbac_default_role {
            self.rbac_default_role = value;
        }
        if let Some(value) = override_cfg.token_secret {
            self.token_secret = value;
        }
        if let Some(value) = override_cfg.token_ttl_secs {
            self.token_ttl_secs = value;
        }
        if let Some(value) = override_cfg.session_cookie_name {
            self.session_cookie_name = value;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.token_secret.is_empty() {
            bail!("REGISTRY_TOKEN_SECRET must be set");
        }
        if self.storage == StorageBackend::Postgres && self.postgres.is_none() {
            bail!("postgres storage requires REGISTRY_DATABASE_URL");
        }
        if self.token_ttl_secs == 0 {
            bail!("token_ttl_secs must be positive");
        }
        Ok(())
    }
}
