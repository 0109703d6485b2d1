//! Registry HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and defines the shared
//! application state injected into handlers.
//!
//! # Notes
//! Every route runs behind `attempt_authentication`. Authority and identity
//! routes additionally require a subject; `/v1/authority/*` requires an API
//! key. Per-route authorization guards sit innermost, wrapping the audit log
//! layer so only allowed requests are audited.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::auth::api_keys::ApiKeyManager;
use crate::auth::authenticate::{
    Authenticator, attempt_authentication, require_authentication, require_authority,
};
use crate::auth::authorize::{AuthorizationGuard, Authorizer, audit_logging};
use crate::auth::cli_token::CliTokenIssuer;
use crate::auth::rbac::enforcer::RoleEnforcer;
use crate::auth::session::Sessions;
use crate::observability;
use crate::store::RegistryStore;
use axum::Router;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::routing::{MethodRouter, delete, get, patch, post};
use registry_authz::{RbacAction, RbacResource};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub api_version: String,
    pub default_role: String,
    pub store: Arc<dyn RegistryStore>,
    pub authorizer: Authorizer,
    pub authenticator: Authenticator,
    pub api_keys: ApiKeyManager,
    pub tokens: CliTokenIssuer,
    pub sessions: Sessions,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        enforcer: RoleEnforcer,
        tokens: CliTokenIssuer,
        sessions: Sessions,
    ) -> Self {
        let api_keys = ApiKeyManager::new(store.clone());
        Self::with_api_keys(store, enforcer, tokens, sessions, api_keys)
    }

    pub fn with_api_keys(
        store: Arc<dyn RegistryStore>,
        enforcer: RoleEnforcer,
        tokens: CliTokenIssuer,
        sessions: Sessions,
        api_keys: ApiKeyManager,
    ) -> Self {
        Self {
            api_version: "v1".to_string(),
            default_role: enforcer.default_role().to_string(),
            authorizer: Authorizer::new(store.clone(), enforcer),
            authenticator: Authenticator::new(tokens.clone(), api_keys.clone(), sessions.clone()),
            store,
            api_keys,
            tokens,
            sessions,
        }
    }
}

fn guarded(route: MethodRouter<AppState>, guard: AuthorizationGuard) -> MethodRouter<AppState> {
    route
        .route_layer(middleware::from_fn(audit_logging))
        .route_layer(middleware::from_fn(move |request: Request, next: Next| {
            guard.clone().run(request, next)
        }))
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    let authorities = state
        .authorizer
        .require_authorization(RbacResource::Authorities);
    let store = state.store.clone();
    let by_id = |action| authorities.guard(action, api::authority_name_object(store.clone()));

    let authenticated = Router::new()
        .route(
            "/v1/authorities",
            get(api::authorities::list_authorities).post(api::authorities::create_authority),
        )
        .route(
            "/v1/authorities/:id",
            guarded(
                get(api::authorities::get_authority),
                by_id(RbacAction::Get),
            )
            .merge(guarded(
                patch(api::authorities::patch_authority),
                by_id(RbacAction::Update),
            ))
            .merge(guarded(
                delete(api::authorities::delete_authority),
                by_id(RbacAction::Delete),
            )),
        )
        .route(
            "/v1/authorities/:id/keys",
            guarded(
                post(api::authorities::add_authority_key),
                by_id(RbacAction::Update),
            ),
        )
        .route(
            "/v1/authorities/:id/keys/:key_id",
            guarded(
                delete(api::authorities::remove_authority_key),
                by_id(RbacAction::Update),
            ),
        )
        .route(
            "/v1/authorities/:id/api-keys",
            guarded(
                get(api::api_keys::list_api_keys).post(api::api_keys::grant_api_key),
                by_id(RbacAction::Update),
            ),
        )
        .route(
            "/v1/authorities/:id/api-keys/:api_key",
            guarded(
                delete(api::api_keys::revoke_api_key),
                by_id(RbacAction::Update),
            ),
        )
        .route("/v1/auth/whoami", get(api::auth::whoami))
        .route("/v1/auth/token", post(api::auth::issue_token))
        .route_layer(middleware::from_fn(require_authentication));

    let authority_scoped = Router::new()
        .route(
            "/v1/authority/api-keys/self",
            get(api::api_keys::api_key_self),
        )
        .route_layer(middleware::from_fn(audit_logging))
        .route_layer(middleware::from_fn(require_authority));

    Router::new()
        .route(
            "/v1/system/info",
            get(api::system::system_info),
        )
        .route(
            "/v1/system/health",
            get(api::system::system_health),
        )
        .route("/v1/auth/session", delete(api::auth::end_session))
        .merge(authenticated)
        .merge(authority_scoped)
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs").url("/v1/openapi.json", ApiDoc::openapi()),
        )
        .layer(middleware::from_fn_with_state(
            state.authenticator.clone(),
            attempt_authentication,
        ))
        .layer(trace_layer)
        .with_state(state)
}
