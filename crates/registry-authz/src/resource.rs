//! Resource identifiers used by policies.
//!
//! A resource is a type tag plus an identifier, rendered `type:id`. Module
//! identifiers are `namespace/name/provider`, provider identifiers are
//! `namespace/name`. The namespace segment is always the owning authority's
//! name, which is what tenant isolation keys on.
use serde::{Deserialize, Serialize};

use crate::{AuthzError, AuthzResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    #[serde(rename = "module")]
    Module,
    #[serde(rename = "provider")]
    Provider,
    #[serde(rename = "authority")]
    Authority,
    #[serde(rename = "apiKey")]
    ApiKey,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Module => "module",
            ResourceType::Provider => "provider",
            ResourceType::Authority => "authority",
            ResourceType::ApiKey => "apiKey",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceType {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "module" => Ok(ResourceType::Module),
            "provider" => Ok(ResourceType::Provider),
            "authority" => Ok(ResourceType::Authority),
            "apiKey" => Ok(ResourceType::ApiKey),
            other => Err(AuthzError::InvalidResource(other.to_string())),
        }
    }
}

/// Render `type:id`.
pub fn compose_resource(resource_type: ResourceType, id: &str) -> String {
    format!("{}:{}", resource_type.as_str(), id)
}

/// Split a resource on its first `:`. The identifier may itself contain colons.
pub fn decompose_resource(resource: &str) -> AuthzResult<(ResourceType, &str)> {
    let Some((kind, id)) = resource.split_once(':') else {
        return Err(AuthzError::InvalidResource(resource.to_string()));
    };
    Ok((kind.parse()?, id))
}

/// Build the canonical module resource string.
///
/// # Returns
/// - `module:{namespace}/{name}/{provider}`.
pub fn module_resource(namespace: &str, name: &str, provider: &str) -> String {
    compose_resource(
        ResourceType::Module,
        &format!("{namespace}/{name}/{provider}"),
    )
}

/// First `/`-separated segment of an object identifier: the authority name.
pub fn namespace_of(object: &str) -> &str {
    object.split('/').next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_resource_format() {
        assert_eq!(module_resource("acme", "vpc", "aws"), "module:acme/vpc/aws");
    }

    #[test]
    fn decompose_splits_on_first_colon_only() {
        let (kind, id) = decompose_resource("module:acme/vpc:v2/aws").unwrap();
        assert_eq!(kind, ResourceType::Module);
        assert_eq!(id, "acme/vpc:v2/aws");
    }

    #[test]
    fn compose_inverts_decompose() {
        for resource in [
            "module:acme/vpc/aws",
            "provider:acme/aws",
            "authority:acme",
            "apiKey:a:b:c",
            "module:",
        ] {
            let (kind, id) = decompose_resource(resource).unwrap();
            assert_eq!(compose_resource(kind, id), resource);
        }
    }

    #[test]
    fn decompose_rejects_malformed() {
        assert_eq!(
            decompose_resource("module"),
            Err(AuthzError::InvalidResource("module".to_string()))
        );
        assert!(decompose_resource("widget:x").is_err());
    }

    #[test]
    fn namespace_of_takes_first_segment() {
        assert_eq!(namespace_of("acme/vpc/aws"), "acme");
        assert_eq!(namespace_of("acme"), "acme");
        assert_eq!(namespace_of(""), "");
    }
}
