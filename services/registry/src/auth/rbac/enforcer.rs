//! Role enforcer.
//!
//! # Purpose
//! Decides whether a subject may perform `action` on `resource/object` using
//! the roles assigned by the rule backend.
//!
//! # Key invariants
//! - A subject without any role falls back to the configured default role.
//!   The anonymous subject never receives the default role.
//! - `role:admin` grants everything; `role:readonly` grants every `get`.
//! - Backend failures deny.
use crate::auth::rbac::backend::{CasbinRuleBackend, EnforceRequest, RuleBackend};
use crate::config::DEFAULT_ROLE;
use anyhow::Context;
use registry_authz::{
    ADMIN_ROLE, RbacAction, RbacError, RbacResource, READONLY_ROLE, ROLE_PREFIX, Subject,
};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct RoleEnforcer {
    backend: Arc<dyn RuleBackend>,
    default_role: String,
}

impl std::fmt::Debug for RoleEnforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleEnforcer")
            .field("default_role", &self.default_role)
            .finish_non_exhaustive()
    }
}

impl RoleEnforcer {
    /// `default_role` is a bare role name; empty selects `readonly`.
    pub fn new(backend: Arc<dyn RuleBackend>, default_role: &str) -> Self {
        let name = default_role.trim();
        let name = if name.is_empty() { DEFAULT_ROLE } else { name };
        let name = name.strip_prefix(ROLE_PREFIX).unwrap_or(name);
        Self {
            backend,
            default_role: format!("{ROLE_PREFIX}{name}"),
        }
    }

    /// Parse the policy file once. `None` yields an empty rule set, so only
    /// the default role applies.
    pub async fn load(policy_path: Option<&Path>, default_role: &str) -> anyhow::Result<Self> {
        let backend = CasbinRuleBackend::load(policy_path)
            .await
            .with_context(|| match policy_path {
                Some(path) => format!("load rbac policy {}", path.display()),
                None => "load empty rbac policy".to_string(),
            })?;
        Ok(Self::new(Arc::new(backend), default_role))
    }

    pub fn default_role(&self) -> &str {
        &self.default_role
    }

    /// Validate the vocabulary and enforce on behalf of `subject`.
    ///
    /// # Errors
    /// - `Unsupported` for a resource or action outside the vocabulary.
    /// - `UnauthorizedSubject` when no rule grants the request.
    pub fn protect(
        &self,
        subject: &Subject,
        resource: &str,
        action: &str,
        object: &str,
    ) -> Result<(), RbacError> {
        resource.parse::<RbacResource>()?;
        action.parse::<RbacAction>()?;

        let aliases = subject.aliases();
        let with_default = !subject.is_anonymous();
        if self.enforce(&aliases, resource, object, action, with_default) {
            Ok(())
        } else {
            Err(RbacError::UnauthorizedSubject)
        }
    }

    /// Enforce for a set of aliases. Only roles the backend assigns count as
    /// held roles; `role:<group>` aliases are plain rule subjects.
    pub fn enforce(
        &self,
        aliases: &[String],
        resource: &str,
        object: &str,
        action: &str,
        with_default: bool,
    ) -> bool {
        let mut roles: Vec<String> = Vec::new();
        for alias in aliases {
            match self.backend.roles_for_user(alias) {
                Ok(found) => roles.extend(found),
                Err(err) => {
                    tracing::warn!(alias = %alias, error = %err, "role lookup failed");
                }
            }
        }
        if roles.is_empty() && with_default {
            roles.push(self.default_role.clone());
        }

        if roles.iter().any(|role| role == ADMIN_ROLE) {
            tracing::debug!(resource, action, object, "granted by admin role");
            return true;
        }
        if action == RbacAction::Get.as_str() && roles.iter().any(|role| role == READONLY_ROLE) {
            tracing::debug!(resource, action, object, "granted by readonly role");
            return true;
        }

        let requests: Vec<EnforceRequest> = aliases
            .iter()
            .map(|alias| EnforceRequest {
                subject: alias.clone(),
                resource: resource.to_string(),
                action: action.to_string(),
                object: object.to_string(),
            })
            .collect();
        if requests.is_empty() {
            return false;
        }
        match self.backend.batch_enforce(&requests) {
            Ok(results) => results.into_iter().any(|granted| granted),
            Err(err) => {
                tracing::warn!(resource, action, object, error = %err, "batch enforce failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::rbac::policy_store::{GroupingRule, PolicyRule};

    async fn enforcer(
        policies: &[PolicyRule],
        groupings: &[GroupingRule],
        default_role: &str,
    ) -> RoleEnforcer {
        let backend = CasbinRuleBackend::from_rules(policies, groupings)
            .await
            .expect("backend");
        RoleEnforcer::new(Arc::new(backend), default_role)
    }

    struct FailingBackend {
        failing_alias: &'static str,
        batch_fails: bool,
        roles: Vec<String>,
    }

    impl RuleBackend for FailingBackend {
        fn roles_for_user(&self, subject: &str) -> Result<Vec<String>, RbacError> {
            if subject == self.failing_alias {
                return Err(RbacError::Backend("lookup exploded".to_string()));
            }
            Ok(self.roles.clone())
        }

        fn batch_enforce(&self, requests: &[EnforceRequest]) -> Result<Vec<bool>, RbacError> {
            if self.batch_fails {
                return Err(RbacError::Backend("batch exploded".to_string()));
            }
            Ok(vec![true; requests.len()])
        }
    }

    #[tokio::test]
    async fn default_role_normalization() {
        assert_eq!(enforcer(&[], &[], "").await.default_role(), "role:readonly");
        assert_eq!(enforcer(&[], &[], "admin").await.default_role(), "role:admin");
        assert_eq!(
            enforcer(&[], &[], "role:publisher").await.default_role(),
            "role:publisher"
        );
    }

    #[tokio::test]
    async fn readonly_default_grants_reads_only() {
        let enforcer = enforcer(&[], &[], "").await;
        let alice = Subject::user("alice", "alice@example.com");
        assert!(enforcer.protect(&alice, "modules", "get", "acme/vpc/aws").is_ok());
        assert_eq!(
            enforcer.protect(&alice, "modules", "create", "acme/vpc/aws"),
            Err(RbacError::UnauthorizedSubject)
        );
    }

    #[tokio::test]
    async fn admin_default_grants_everything() {
        let enforcer = enforcer(&[], &[], "admin").await;
        let alice = Subject::user("alice", "alice@example.com");
        assert!(enforcer.protect(&alice, "authorities", "delete", "acme").is_ok());
    }

    #[tokio::test]
    async fn assigned_role_replaces_default() {
        let enforcer = enforcer(
            &[PolicyRule::new("role:publisher", "modules", "*", "acme/*")],
            &[GroupingRule::new("alice@example.com", "role:publisher")],
            "",
        )
        .await;
        let alice = Subject::user("alice", "alice@example.com");
        assert!(enforcer.protect(&alice, "modules", "create", "acme/vpc/aws").is_ok());
        assert!(enforcer.protect(&alice, "modules", "get", "acme/vpc/aws").is_ok());
        // publisher does not inherit readonly
        assert_eq!(
            enforcer.protect(&alice, "modules", "get", "globex/vpc/aws"),
            Err(RbacError::UnauthorizedSubject)
        );
    }

    #[tokio::test]
    async fn admin_only_via_assigned_role() {
        let enforcer = enforcer(&[], &[GroupingRule::new("root", "role:admin")], "").await;
        assert!(
            enforcer
                .protect(&Subject::user("root", ""), "apiKeys", "delete", "x")
                .is_ok()
        );

        // A group named "admin" is only the rule subject `role:admin`.
        let ops = Subject::user("ops", "ops@example.com").with_groups(["admin"]);
        assert_eq!(
            enforcer.protect(&ops, "providers", "update", "acme/aws"),
            Err(RbacError::UnauthorizedSubject)
        );
        assert!(enforcer.protect(&ops, "providers", "get", "acme/aws").is_ok());
    }

    #[tokio::test]
    async fn group_alias_reaches_admin_via_grouping_rule() {
        let enforcer = enforcer(&[], &[GroupingRule::new("role:ops", "role:admin")], "").await;
        let ops = Subject::user("ops", "ops@example.com").with_groups(["ops"]);
        assert!(enforcer.protect(&ops, "providers", "delete", "acme/aws").is_ok());
    }

    #[tokio::test]
    async fn group_alias_rules_apply() {
        let enforcer = enforcer(
            &[PolicyRule::new("role:publishers", "providers", "create", "*")],
            &[],
            "",
        )
        .await;
        let bob = Subject::user("bob", "bob@example.com").with_groups(["publishers"]);
        assert!(enforcer.protect(&bob, "providers", "create", "acme/aws").is_ok());
        assert!(enforcer.protect(&bob, "providers", "delete", "acme/aws").is_err());
    }

    #[tokio::test]
    async fn anonymous_gets_no_default_role() {
        let enforcer = enforcer(&[], &[], "").await;
        assert_eq!(
            enforcer.protect(&Subject::anonymous(), "modules", "get", "acme/vpc/aws"),
            Err(RbacError::UnauthorizedSubject)
        );
    }

    #[tokio::test]
    async fn unsupported_vocabulary() {
        let enforcer = enforcer(&[], &[], "admin").await;
        let alice = Subject::user("alice", "alice@example.com");
        assert_eq!(
            enforcer.protect(&alice, "widgets", "get", "x"),
            Err(RbacError::Unsupported("resource widgets".to_string()))
        );
        assert_eq!(
            enforcer.protect(&alice, "modules", "Get", "x"),
            Err(RbacError::Unsupported("action Get".to_string()))
        );
    }

    #[test]
    fn role_lookup_failure_skips_alias() {
        let backend = FailingBackend {
            failing_alias: "alice",
            batch_fails: false,
            roles: vec!["role:admin".to_string()],
        };
        let enforcer = RoleEnforcer::new(Arc::new(backend), "");
        let aliases = vec!["alice".to_string(), "alice@example.com".to_string()];
        assert!(enforcer.enforce(&aliases, "modules", "x", "delete", true));
    }

    #[test]
    fn batch_failure_denies() {
        let backend = FailingBackend {
            failing_alias: "",
            batch_fails: true,
            roles: vec!["role:publisher".to_string()],
        };
        let enforcer = RoleEnforcer::new(Arc::new(backend), "");
        let aliases = vec!["alice".to_string()];
        assert!(!enforcer.enforce(&aliases, "modules", "x", "create", true));
        // readonly shortcut is not reached because an assigned role replaced the default
        assert!(!enforcer.enforce(&aliases, "modules", "x", "get", true));
    }

    #[tokio::test]
    async fn load_from_policy_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "p, role:publisher, modules, *, acme/*\ng, alice@example.com, role:publisher"
        )
        .expect("write");
        let enforcer = RoleEnforcer::load(Some(file.path()), "")
            .await
            .expect("load");
        let alice = Subject::user("alice", "alice@example.com");
        assert!(enforcer.protect(&alice, "modules", "delete", "acme/vpc/aws").is_ok());
    }
}
