//! Vocabulary understood by the role enforcer.
//!
//! Role policies name resources and actions with these exact, case-sensitive
//! tokens. `*` is only meaningful inside declarative policy files.
use serde::{Deserialize, Serialize};

use crate::{AuthzError, Operation, ResourceType, Target};

/// Prefix carried by every role alias.
pub const ROLE_PREFIX: &str = "role:";
pub const ADMIN_ROLE: &str = "role:admin";
pub const READONLY_ROLE: &str = "role:readonly";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RbacResource {
    #[serde(rename = "modules")]
    Modules,
    #[serde(rename = "providers")]
    Providers,
    #[serde(rename = "authorities")]
    Authorities,
    #[serde(rename = "apiKeys")]
    ApiKeys,
}

impl RbacResource {
    pub fn as_str(self) -> &'static str {
        match self {
            RbacResource::Modules => "modules",
            RbacResource::Providers => "providers",
            RbacResource::Authorities => "authorities",
            RbacResource::ApiKeys => "apiKeys",
        }
    }

    /// Modules and providers are owned by an authority through their namespace.
    pub fn is_tenant_scoped(self) -> bool {
        matches!(self, RbacResource::Modules | RbacResource::Providers)
    }

    pub fn target(self) -> Target {
        match self {
            RbacResource::Modules => Target::Modules,
            RbacResource::Providers => Target::Providers,
            RbacResource::Authorities => Target::Authorities,
            RbacResource::ApiKeys => Target::ApiKeys,
        }
    }

    pub fn resource_type(self) -> ResourceType {
        match self {
            RbacResource::Modules => ResourceType::Module,
            RbacResource::Providers => ResourceType::Provider,
            RbacResource::Authorities => ResourceType::Authority,
            RbacResource::ApiKeys => ResourceType::ApiKey,
        }
    }
}

impl std::fmt::Display for RbacResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RbacResource {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "modules" => Ok(RbacResource::Modules),
            "providers" => Ok(RbacResource::Providers),
            "authorities" => Ok(RbacResource::Authorities),
            "apiKeys" => Ok(RbacResource::ApiKeys),
            other => Err(AuthzError::Unsupported(format!("resource {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RbacAction {
    Get,
    Create,
    Update,
    Delete,
}

impl RbacAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RbacAction::Get => "get",
            RbacAction::Create => "create",
            RbacAction::Update => "update",
            RbacAction::Delete => "delete",
        }
    }

    pub fn operation(self) -> Operation {
        match self {
            RbacAction::Get => Operation::View,
            RbacAction::Create => Operation::Create,
            RbacAction::Update => Operation::Update,
            RbacAction::Delete => Operation::Delete,
        }
    }
}

impl std::fmt::Display for RbacAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RbacAction {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "get" => Ok(RbacAction::Get),
            "create" => Ok(RbacAction::Create),
            "update" => Ok(RbacAction::Update),
            "delete" => Ok(RbacAction::Delete),
            other => Err(AuthzError::Unsupported(format!("action {other}"))),
        }
    }
}

/// Render a group name as a role alias.
pub fn role_alias(group: &str) -> String {
    format!("{ROLE_PREFIX}{group}")
}
