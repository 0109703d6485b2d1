//! Registry HTTP API module.
//!
//! # Purpose
//! Exposes route handler modules and shared helpers for resolving path
//! identifiers.
pub mod api_keys;
pub mod auth;
pub mod authorities;
pub mod error;
pub mod openapi;
pub mod system;
pub mod types;

use crate::api::error::{ApiError, api_internal, api_not_found, api_validation_error};
use crate::auth::authorize::{ObjectFn, ObjectFuture, PathParams};
use crate::model::Authority;
use crate::store::{RegistryStore, StoreError};
use registry_common::AuthorityId;
use std::sync::Arc;

pub(crate) fn parse_authority_id(raw: &str) -> Result<AuthorityId, ApiError> {
    raw.parse()
        .map_err(|_| api_validation_error("invalid authority id"))
}

pub(crate) async fn load_authority(
    store: &dyn RegistryStore,
    raw_id: &str,
) -> Result<Authority, ApiError> {
    let id = parse_authority_id(raw_id)?;
    match store.get_authority(id).await {
        Ok(authority) => Ok(authority),
        Err(StoreError::NotFound(_)) => Err(api_not_found("authority not found")),
        Err(err) => Err(api_internal("failed to load authority", &err)),
    }
}

/// Authorization object for `/authorities/:id` routes: the authority name.
/// A malformed id yields 400 and an unknown one 404 before any decision.
pub fn authority_name_object(store: Arc<dyn RegistryStore>) -> ObjectFn {
    Arc::new(move |params: &PathParams| -> ObjectFuture {
        let store = store.clone();
        let raw_id = params.get("id").cloned().unwrap_or_default();
        Box::pin(async move {
            let authority = load_authority(store.as_ref(), &raw_id).await?;
            Ok(authority.name)
        })
    })
}
