//! Authority records.
//!
//! # Purpose
//! An authority is the tenant boundary of the registry: it owns a namespace of
//! modules and providers, publishes GPG signing keys, and anchors API keys.
use registry_common::{AuthorityId, AuthorityKeyId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct Authority {
    #[schema(value_type = String, format = Uuid)]
    pub id: AuthorityId,
    /// Unique, compared case-insensitively.
    pub name: String,
    /// Email of the owner; API keys of this authority authenticate as this address.
    pub owner: String,
    /// Public authorities allow anyone to read their modules and providers.
    pub public: bool,
    pub policy_url: String,
    #[serde(default)]
    pub keys: Vec<AuthorityKey>,
}

impl Authority {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, public: bool) -> Self {
        Self {
            id: AuthorityId::new(),
            name: name.into(),
            owner: owner.into(),
            public,
            policy_url: String::new(),
            keys: Vec::new(),
        }
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// GPG public key used to verify provider signatures.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct AuthorityKey {
    #[schema(value_type = String, format = Uuid)]
    pub id: AuthorityKeyId,
    pub key_id: String,
    pub ascii_armor: String,
    pub trust_signature: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default)]
pub struct AuthorityPatch {
    pub name: Option<String>,
    pub owner: Option<String>,
    pub public: Option<bool>,
    pub policy_url: Option<String>,
}

impl AuthorityPatch {
    pub fn apply(self, authority: &mut Authority) {
        if let Some(name) = self.name {
            authority.name = name;
        }
        if let Some(owner) = self.owner {
            authority.owner = owner;
        }
        if let Some(public) = self.public {
            authority.public = public;
        }
        if let Some(policy_url) = self.policy_url {
            authority.policy_url = policy_url;
        }
    }
}
