//! Registry HTTP service entry point.
//!
//! # Purpose
//! Wires configuration, storage, the role enforcer and credential parsers,
//! then starts the API server and the metrics listener.
//!
//! # Notes
//! The `build_state` helper keeps wiring testable and minimizes main setup logic.
use anyhow::Context;
use registry::app::{AppState, build_router};
use registry::auth::cli_token::CliTokenIssuer;
use registry::auth::rbac::enforcer::RoleEnforcer;
use registry::auth::session::{InMemorySessionStore, Sessions};
use registry::config::{self, RegistryConfig};
use registry::observability;
use registry::store::{RegistryStore, memory::InMemoryStore, postgres::PostgresStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RegistryConfig::from_env_or_yaml().context("registry config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: RegistryConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability("registry")?;
    let state = build_state(&config).await?;
    tracing::info!(
        backend = state.store.backend_name(),
        default_role = %state.default_role,
        "registry state ready"
    );
    let metrics_task = tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let app = build_router(state);
    let addr = config.bind_addr;
    tracing::info!(%addr, "registry listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        _ = &mut shutdown => {}
    }

    metrics_task.abort();
    let _ = metrics_task.await;
    Ok(())
}

async fn build_state(config: &RegistryConfig) -> anyhow::Result<AppState> {
    let store: Arc<dyn RegistryStore> = match config.storage {
        config::StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        config::StorageBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres configuration missing")?;
            Arc::new(PostgresStore::connect(pg).await?)
        }
    };
    let enforcer =
        RoleEnforcer::load(config.rbac_policy_path.as_deref(), &config.rbac_default_role).await?;
    let tokens = CliTokenIssuer::new(
        &config.token_secret,
        Duration::from_secs(config.token_ttl_secs),
    )
    .context("cli token issuer")?;
    let sessions = Sessions::new(
        Arc::new(InMemorySessionStore::new()),
        config.session_cookie_name.clone(),
    );
    Ok(AppState::new(store, enforcer, tokens, sessions))
}
