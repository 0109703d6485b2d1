use registry_common::AuthorityId;
use serde::{Deserialize, Serialize};

use crate::{Policy, role_alias};

pub const ANONYMOUS: &str = "anonymous";

/// The caller a request was authenticated as.
///
/// `authority_id` is set only when the caller presented an API key; such
/// callers are confined to their authority's namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub authority: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_id: Option<AuthorityId>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<Policy>,
}

impl Subject {
    pub fn user(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    pub fn anonymous() -> Self {
        Self {
            name: ANONYMOUS.to_string(),
            ..Self::default()
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.name == ANONYMOUS && self.email.is_empty() && self.authority_id.is_none()
    }

    pub fn is_api_key(&self) -> bool {
        self.authority_id.is_some()
    }

    /// Deduplicated aliases `{name, email} ∪ {role:<group>}` in first-seen order.
    /// Empty identifiers are skipped.
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = Vec::with_capacity(2 + self.groups.len());
        let candidates = [self.name.clone(), self.email.clone()]
            .into_iter()
            .chain(self.groups.iter().map(|group| role_alias(group)));
        for alias in candidates {
            if !alias.is_empty() && !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }
        aliases
    }
}
