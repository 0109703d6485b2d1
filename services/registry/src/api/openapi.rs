//! OpenAPI schema aggregation for the registry API.
use crate::api::{
    api_keys, auth, authorities, system,
    types::{
        ApiKeyGrantRequest, ApiKeyGrantResponse, ApiKeyListResponse, ApiKeySelf, ApiKeyView,
        AuthorityCreateRequest, AuthorityKeyRequest, AuthorityListResponse, ErrorResponse,
        HealthStatus, SystemInfo, TokenResponse, WhoAmI,
    },
};
use crate::model::{Authority, AuthorityKey, AuthorityPatch};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "registry",
        version = "v1",
        description = "Private Terraform registry access-control API"
    ),
    paths(
        system::system_info,
        system::system_health,
        authorities::list_authorities,
        authorities::create_authority,
        authorities::get_authority,
        authorities::patch_authority,
        authorities::delete_authority,
        authorities::add_authority_key,
        authorities::remove_authority_key,
        api_keys::list_api_keys,
        api_keys::grant_api_key,
        api_keys::revoke_api_key,
        api_keys::api_key_self,
        auth::whoami,
        auth::issue_token,
        auth::end_session
    ),
    components(schemas(
        SystemInfo,
        HealthStatus,
        ErrorResponse,
        Authority,
        AuthorityKey,
        AuthorityPatch,
        AuthorityCreateRequest,
        AuthorityListResponse,
        AuthorityKeyRequest,
        ApiKeyGrantRequest,
        ApiKeyGrantResponse,
        ApiKeyView,
        ApiKeyListResponse,
        ApiKeySelf,
        WhoAmI,
        TokenResponse
    )),
    tags(
        (name = "system", description = "System and health endpoints"),
        (name = "authorities", description = "Authority and signing key management"),
        (name = "api-keys", description = "API key lifecycle"),
        (name = "auth", description = "Caller identity and CLI tokens")
    )
)]
pub struct ApiDoc;
