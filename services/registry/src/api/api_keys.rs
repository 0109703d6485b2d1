//! API key API handlers.
//!
//! # Purpose
//! Grant, list and revoke the API keys of an authority. Guarded in `app.rs`
//! by `authorities:update` on the authority name.
use crate::api::error::{
    ApiError, api_internal, api_internal_message, api_not_found, api_validation_error,
};
use crate::api::types::{
    ApiKeyGrantRequest, ApiKeyGrantResponse, ApiKeyListResponse, ApiKeySelf, ApiKeyView,
};
use crate::api::{load_authority, parse_authority_id};
use crate::app::AppState;
use crate::auth::api_keys::ApiKeyError;
use crate::auth::context::RequestContext;
use crate::store::StoreError;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use registry_common::ApiKeyId;

fn api_key_error(message: &str, err: ApiKeyError) -> ApiError {
    match err {
        ApiKeyError::CannotParseId(_) => api_validation_error("invalid api key id"),
        ApiKeyError::InvalidExpiry(_) => api_validation_error("expire_in_hours is out of range"),
        ApiKeyError::KeyNotFound | ApiKeyError::Expired => api_not_found("api key not found"),
        ApiKeyError::Store(StoreError::NotFound(_)) => api_not_found("authority not found"),
        ApiKeyError::Store(err) => api_internal(message, &err),
        ApiKeyError::InvalidKey(reason) => {
            tracing::error!(reason = %reason, "api key points to an unreadable authority");
            api_internal_message(message)
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/authorities/{id}/api-keys",
    tag = "api-keys",
    params(("id" = String, Path, description = "Authority id")),
    responses(
        (status = 200, description = "API keys of the authority", body = ApiKeyListResponse)
    )
)]
pub(crate) async fn list_api_keys(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ApiKeyListResponse>, ApiError> {
    let id = parse_authority_id(&id)?;
    let keys = state
        .api_keys
        .list(id)
        .await
        .map_err(|err| api_key_error("failed to list api keys", err))?;
    Ok(Json(ApiKeyListResponse {
        items: keys.into_iter().map(ApiKeyView::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/authorities/{id}/api-keys",
    tag = "api-keys",
    params(("id" = String, Path, description = "Authority id")),
    request_body = ApiKeyGrantRequest,
    responses(
        (status = 201, description = "API key granted", body = ApiKeyGrantResponse),
        (status = 404, description = "Authority not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn grant_api_key(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<ApiKeyGrantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_authority_id(&id)?;
    if body.label.trim().is_empty() {
        return Err(api_validation_error("label must not be empty"));
    }
    let key = state
        .api_keys
        .grant(id, &body.label, body.expire_in_hours, body.policies)
        .await
        .map_err(|err| api_key_error("failed to grant api key", err))?;
    Ok((
        StatusCode::CREATED,
        Json(ApiKeyGrantResponse {
            id: key.id,
            label: key.label,
            expiration: key.expiration,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/v1/authorities/{id}/api-keys/{api_key}",
    tag = "api-keys",
    params(
        ("id" = String, Path, description = "Authority id"),
        ("api_key" = String, Path, description = "API key id")
    ),
    responses(
        (status = 204, description = "API key revoked (or already gone)"),
        (status = 404, description = "Key belongs to another authority", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn revoke_api_key(
    Path((id, api_key)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let authority_id = parse_authority_id(&id)?;
    let key_id: ApiKeyId = api_key
        .parse()
        .map_err(|_| api_validation_error("invalid api key id"))?;
    match state.api_keys.find(key_id).await {
        Ok(key) if key.authority_id != authority_id => {
            return Err(api_not_found("api key not found"));
        }
        Ok(_) | Err(ApiKeyError::KeyNotFound | ApiKeyError::Expired) => {}
        Err(err) => return Err(api_key_error("failed to revoke api key", err)),
    }
    state
        .api_keys
        .revoke(&api_key)
        .await
        .map_err(|err| api_key_error("failed to revoke api key", err))?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/authority/api-keys/self",
    tag = "api-keys",
    responses(
        (status = 200, description = "The API key used for this request", body = ApiKeySelf),
        (status = 401, description = "Not authenticated with an API key", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn api_key_self(
    State(state): State<AppState>,
    context: RequestContext,
) -> Result<Json<ApiKeySelf>, ApiError> {
    let subject = context.subject_or_anonymous();
    let authority_id = subject
        .authority_id
        .ok_or_else(|| api_internal_message("api key context without authority"))?;
    let authority = load_authority(state.store.as_ref(), &authority_id.to_string()).await?;
    Ok(Json(ApiKeySelf {
        authority_id,
        authority: authority.name,
        owner: authority.owner,
        policies: subject.policies.len(),
    }))
}
