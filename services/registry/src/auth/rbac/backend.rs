//! Declarative rule backend.
//!
//! # Purpose
//! The role enforcer only needs two questions answered: which roles a subject
//! holds, and whether a batch of `(subject, resource, action, object)`
//! requests match any rule. [`RuleBackend`] is that seam.
//!
//! # Notes
//! [`CasbinRuleBackend`] owns a Casbin enforcer built once at startup and
//! never mutated afterwards. Decisions go through the model's matcher
//! (`g(...)` role links plus `globMatch`) via `CoreApi::enforce`, which only
//! needs a shared reference.
use crate::auth::rbac::MODEL_CONF;
use crate::auth::rbac::policy_store::{GroupingRule, PolicyRule};
use casbin::{CoreApi, DefaultModel, Enforcer, FileAdapter, MemoryAdapter, MgmtApi};
use registry_authz::RbacError;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforceRequest {
    pub subject: String,
    pub resource: String,
    pub action: String,
    pub object: String,
}

pub trait RuleBackend: Send + Sync {
    /// Roles assigned directly to `subject`.
    fn roles_for_user(&self, subject: &str) -> Result<Vec<String>, RbacError>;

    /// One result per request, in order.
    fn batch_enforce(&self, requests: &[EnforceRequest]) -> Result<Vec<bool>, RbacError>;
}

pub struct CasbinRuleBackend {
    enforcer: Enforcer,
}

impl CasbinRuleBackend {
    /// Build an in-memory enforcer from explicit rules.
    ///
    /// # Errors
    /// - The embedded model fails to parse or a rule cannot be inserted.
    pub async fn from_rules(
        policies: &[PolicyRule],
        groupings: &[GroupingRule],
    ) -> casbin::Result<Self> {
        let model = DefaultModel::from_str(MODEL_CONF).await?;
        let mut enforcer = Enforcer::new(model, MemoryAdapter::default()).await?;
        for policy in policies {
            enforcer
                .add_policy(vec![
                    policy.subject.clone(),
                    policy.resource.clone(),
                    policy.action.clone(),
                    policy.object.clone(),
                ])
                .await?;
        }
        for grouping in groupings {
            enforcer
                .add_grouping_policy(vec![grouping.user.clone(), grouping.role.clone()])
                .await?;
        }
        enforcer.build_role_links()?;
        Ok(Self { enforcer })
    }

    /// Load rules from a Casbin CSV policy file. `None` yields an empty rule set.
    ///
    /// # Errors
    /// - The embedded model fails to parse, or the file cannot be read or parsed.
    pub async fn load(policy_path: Option<&Path>) -> casbin::Result<Self> {
        let Some(path) = policy_path else {
            return Self::from_rules(&[], &[]).await;
        };
        let model = DefaultModel::from_str(MODEL_CONF).await?;
        let enforcer = Enforcer::new(model, FileAdapter::new(path.to_path_buf())).await?;
        tracing::info!(
            path = %path.display(),
            policies = enforcer.get_policy().len(),
            groupings = enforcer.get_grouping_policy().len(),
            "rbac rules loaded"
        );
        Ok(Self { enforcer })
    }
}

impl RuleBackend for CasbinRuleBackend {
    fn roles_for_user(&self, subject: &str) -> Result<Vec<String>, RbacError> {
        Ok(self
            .enforcer
            .get_filtered_grouping_policy(0, vec![subject.to_string()])
            .iter()
            .filter_map(|row| GroupingRule::from_row(row))
            .map(|grouping| grouping.role)
            .collect())
    }

    fn batch_enforce(&self, requests: &[EnforceRequest]) -> Result<Vec<bool>, RbacError> {
        requests
            .iter()
            .map(|request| {
                self.enforcer
                    .enforce((
                        request.subject.as_str(),
                        request.resource.as_str(),
                        request.action.as_str(),
                        request.object.as_str(),
                    ))
                    .map_err(|err| RbacError::Backend(err.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn request(subject: &str, resource: &str, action: &str, object: &str) -> EnforceRequest {
        EnforceRequest {
            subject: subject.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
            object: object.to_string(),
        }
    }

    async fn backend() -> CasbinRuleBackend {
        CasbinRuleBackend::from_rules(
            &[
                PolicyRule::new("role:publisher", "modules", "*", "acme/*"),
                PolicyRule::new("bob@example.com", "providers", "create", "globex/*"),
            ],
            &[
                GroupingRule::new("alice@example.com", "role:publisher"),
                GroupingRule::new("role:lead", "role:publisher"),
                GroupingRule::new("carol@example.com", "role:lead"),
            ],
        )
        .await
        .expect("backend")
    }

    #[tokio::test]
    async fn direct_roles_only() {
        let backend = backend().await;
        assert_eq!(
            backend.roles_for_user("alice@example.com").unwrap(),
            vec!["role:publisher".to_string()]
        );
        assert_eq!(
            backend.roles_for_user("carol@example.com").unwrap(),
            vec!["role:lead".to_string()]
        );
        assert!(backend.roles_for_user("nobody").unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_enforce_matches_direct_inherited_and_subject_rules() {
        let backend = backend().await;
        let results = backend
            .batch_enforce(&[
                request("alice@example.com", "modules", "create", "acme/vpc/aws"),
                request("carol@example.com", "modules", "delete", "acme/vpc/aws"),
                request("alice@example.com", "modules", "create", "globex/vpc/aws"),
                request("bob@example.com", "providers", "create", "globex/aws"),
                request("bob@example.com", "providers", "delete", "globex/aws"),
            ])
            .unwrap();
        assert_eq!(results, vec![true, true, false, true, false]);
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        let backend = backend().await;
        assert!(backend.batch_enforce(&[]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_without_path_denies_everything() {
        let backend = CasbinRuleBackend::load(None).await.expect("load");
        assert!(backend.roles_for_user("alice@example.com").unwrap().is_empty());
        assert_eq!(
            backend
                .batch_enforce(&[request("alice@example.com", "modules", "get", "acme/x")])
                .unwrap(),
            vec![false]
        );
    }

    #[tokio::test]
    async fn load_reads_policy_csv() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "p, role:publisher, modules, *, acme/*\np, role:publisher, providers, *, acme/*\ng, alice@example.com, role:publisher"
        )
        .expect("write");

        let backend = CasbinRuleBackend::load(Some(file.path()))
            .await
            .expect("load");
        assert_eq!(
            backend.roles_for_user("alice@example.com").unwrap(),
            vec!["role:publisher".to_string()]
        );
        assert_eq!(
            backend
                .batch_enforce(&[
                    request("alice@example.com", "providers", "update", "acme/aws"),
                    request("alice@example.com", "providers", "update", "globex/aws"),
                ])
                .unwrap(),
            vec![true, false]
        );
    }

    #[tokio::test]
    async fn load_fails_for_missing_file() {
        let path = Path::new("/nonexistent/registry/policy.csv");
        assert!(CasbinRuleBackend::load(Some(path)).await.is_err());
    }
}
