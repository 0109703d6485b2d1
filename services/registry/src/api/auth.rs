//! Caller identity handlers.
use crate::api::error::{ApiError, api_forbidden, api_internal_message, api_unauthorized};
use crate::api::types::{TokenResponse, WhoAmI};
use crate::app::AppState;
use crate::auth::context::RequestContext;
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

#[utoipa::path(
    get,
    path = "/v1/auth/whoami",
    tag = "auth",
    responses(
        (status = 200, description = "The authenticated caller", body = WhoAmI),
        (status = 401, description = "Not authenticated", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn whoami(context: RequestContext) -> Result<Json<WhoAmI>, ApiError> {
    let subject = context
        .subject
        .ok_or_else(|| api_unauthorized("authentication required"))?;
    Ok(Json(WhoAmI::from(subject)))
}

#[utoipa::path(
    post,
    path = "/v1/auth/token",
    tag = "auth",
    responses(
        (status = 200, description = "CLI bearer token for the caller", body = TokenResponse),
        (status = 403, description = "API keys cannot mint tokens", body = crate::api::types::ErrorResponse)
    )
)]
/// Mint a CLI token for the caller so the command-line client can reuse a
/// browser login.
pub(crate) async fn issue_token(
    State(state): State<AppState>,
    context: RequestContext,
) -> Result<Json<TokenResponse>, ApiError> {
    let subject = context
        .subject
        .ok_or_else(|| api_unauthorized("authentication required"))?;
    if subject.is_api_key() {
        return Err(api_forbidden("api keys cannot mint cli tokens"));
    }
    let token = state.tokens.mint(&subject).map_err(|err| {
        tracing::error!(error = %err, "failed to mint cli token");
        api_internal_message("failed to mint token")
    })?;
    Ok(Json(TokenResponse {
        token,
        expires_in: state.tokens.ttl().as_secs(),
    }))
}

#[utoipa::path(
    delete,
    path = "/v1/auth/session",
    tag = "auth",
    responses((status = 204, description = "Session ended"))
)]
pub(crate) async fn end_session(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    if let Some(session_id) = state.sessions.session_id(&headers) {
        state.sessions.end(&session_id);
    }
    StatusCode::NO_CONTENT
}
