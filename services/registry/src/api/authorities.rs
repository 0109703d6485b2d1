//! Authority API handlers.
//!
//! # Purpose
//! Authority CRUD and GPG signing key management. Routes under
//! `/v1/authorities/:id` are guarded in `app.rs`; list and create decide
//! inline because their objects come from the store or the body.
use crate::api::error::{
    ApiError, api_conflict, api_internal, api_not_found, api_validation_error,
};
use crate::api::types::{AuthorityCreateRequest, AuthorityKeyRequest, AuthorityListResponse};
use crate::api::{load_authority, parse_authority_id};
use crate::app::AppState;
use crate::auth::context::RequestContext;
use crate::model::{Authority, AuthorityKey, AuthorityPatch};
use crate::store::StoreError;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use registry_authz::{RbacAction, RbacResource};
use registry_common::AuthorityKeyId;

fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(api_validation_error("authority name must not be empty"));
    }
    if name.contains('/') || name.contains(':') {
        return Err(api_validation_error(
            "authority name must not contain '/' or ':'",
        ));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/v1/authorities",
    tag = "authorities",
    responses(
        (status = 200, description = "Authorities the caller may view", body = AuthorityListResponse),
        (status = 401, description = "Not authenticated", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn list_authorities(
    State(state): State<AppState>,
    context: RequestContext,
) -> Result<Json<AuthorityListResponse>, ApiError> {
    let authorities = state
        .store
        .list_authorities()
        .await
        .map_err(|err| api_internal("failed to list authorities", &err))?;
    let subject = context.subject_or_anonymous();
    let mut items = Vec::with_capacity(authorities.len());
    for authority in authorities {
        if state
            .authorizer
            .can_perform(
                &subject,
                RbacResource::Authorities.as_str(),
                RbacAction::Get.as_str(),
                &authority.name,
            )
            .await
        {
            items.push(authority);
        }
    }
    Ok(Json(AuthorityListResponse { items }))
}

#[utoipa::path(
    post,
    path = "/v1/authorities",
    tag = "authorities",
    request_body = AuthorityCreateRequest,
    responses(
        (status = 201, description = "Authority created", body = Authority),
        (status = 403, description = "Not allowed", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Authority already exists", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_authority(
    State(state): State<AppState>,
    context: RequestContext,
    Json(body): Json<AuthorityCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_name(&body.name)?;
    state
        .authorizer
        .authorize(
            &context,
            RbacResource::Authorities,
            RbacAction::Create,
            &body.name,
        )
        .await?;

    let mut authority = Authority::new(body.name, body.owner, body.public);
    authority.policy_url = body.policy_url;
    match state.store.create_authority(authority).await {
        Ok(created) => {
            tracing::info!(authority = %created.name, authority_id = %created.id, "authority created");
            Ok((StatusCode::CREATED, Json(created)))
        }
        Err(StoreError::Conflict(_)) => {
            Err(api_conflict("already_exists", "authority already exists"))
        }
        Err(err) => Err(api_internal("failed to create authority", &err)),
    }
}

#[utoipa::path(
    get,
    path = "/v1/authorities/{id}",
    tag = "authorities",
    params(("id" = String, Path, description = "Authority id")),
    responses(
        (status = 200, description = "Authority", body = Authority),
        (status = 404, description = "Authority not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_authority(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Authority>, ApiError> {
    Ok(Json(load_authority(state.store.as_ref(), &id).await?))
}

#[utoipa::path(
    patch,
    path = "/v1/authorities/{id}",
    tag = "authorities",
    params(("id" = String, Path, description = "Authority id")),
    request_body = AuthorityPatch,
    responses(
        (status = 200, description = "Authority updated", body = Authority),
        (status = 404, description = "Authority not found", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Name already taken", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn patch_authority(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(patch): Json<AuthorityPatch>,
) -> Result<Json<Authority>, ApiError> {
    let id = parse_authority_id(&id)?;
    if let Some(name) = patch.name.as_deref() {
        validate_name(name)?;
    }
    match state.store.update_authority(id, patch).await {
        Ok(updated) => Ok(Json(updated)),
        Err(StoreError::NotFound(_)) => Err(api_not_found("authority not found")),
        Err(StoreError::Conflict(_)) => {
            Err(api_conflict("already_exists", "authority name already taken"))
        }
        Err(err) => Err(api_internal("failed to update authority", &err)),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/authorities/{id}",
    tag = "authorities",
    params(("id" = String, Path, description = "Authority id")),
    responses(
        (status = 204, description = "Authority deleted"),
        (status = 404, description = "Authority not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_authority(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let id = parse_authority_id(&id)?;
    match state.store.delete_authority(id).await {
        Ok(()) => {
            tracing::info!(authority_id = %id, "authority deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(StoreError::NotFound(_)) => Err(api_not_found("authority not found")),
        Err(err) => Err(api_internal("failed to delete authority", &err)),
    }
}

#[utoipa::path(
    post,
    path = "/v1/authorities/{id}/keys",
    tag = "authorities",
    params(("id" = String, Path, description = "Authority id")),
    request_body = AuthorityKeyRequest,
    responses(
        (status = 201, description = "Signing key added", body = AuthorityKey),
        (status = 409, description = "Key id already present", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn add_authority_key(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<AuthorityKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_authority_id(&id)?;
    if body.key_id.trim().is_empty() || body.ascii_armor.trim().is_empty() {
        return Err(api_validation_error("key_id and ascii_armor are required"));
    }
    match state.store.add_authority_key(id, body.into()).await {
        Ok(key) => Ok((StatusCode::CREATED, Json(key))),
        Err(StoreError::NotFound(_)) => Err(api_not_found("authority not found")),
        Err(StoreError::Conflict(_)) => Err(api_conflict("already_exists", "key already exists")),
        Err(err) => Err(api_internal("failed to add signing key", &err)),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/authorities/{id}/keys/{key_id}",
    tag = "authorities",
    params(
        ("id" = String, Path, description = "Authority id"),
        ("key_id" = String, Path, description = "Signing key record id")
    ),
    responses(
        (status = 204, description = "Signing key removed"),
        (status = 404, description = "Key not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn remove_authority_key(
    Path((id, key_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let id = parse_authority_id(&id)?;
    let key_id: AuthorityKeyId = key_id
        .parse()
        .map_err(|_| api_validation_error("invalid key id"))?;
    match state.store.remove_authority_key(id, key_id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(StoreError::NotFound(_)) => Err(api_not_found("key not found")),
        Err(err) => Err(api_internal("failed to remove signing key", &err)),
    }
}
