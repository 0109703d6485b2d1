use chrono::{DateTime, Utc};
use registry_authz::Policy;
use registry_common::{ApiKeyId, AuthorityId};
use serde::{Deserialize, Serialize};

/// A credential bound to one authority. The key id is the secret presented by clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub authority_id: AuthorityId,
    pub label: String,
    /// `None` never expires.
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub policies: Vec<Policy>,
}

impl ApiKey {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|expiration| expiration <= now)
    }
}
