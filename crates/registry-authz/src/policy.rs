//! Tri-state policy evaluation.
//!
//! # Purpose
//! A [`Policy`] grants or denies a set of actions on a set of resources. A
//! single policy either decides a request or abstains, so evaluation yields a
//! [`Permission`] rather than a boolean.
//!
//! # Key invariants
//! - A policy decides only when both an action pattern and a resource pattern match.
//! - An empty `actions` or `resources` set matches nothing.
//! - When several policies decide, any `Denied` wins over `Granted`.
//!
//! # Examples
//! ```rust
//! use registry_authz::{Action, Effect, Operation, Permission, Policy, Target};
//!
//! let policy = Policy::new("read", Effect::Allow, ["modules:*"], ["module:acme/*"]);
//! let action = Action::new(Target::Modules, Operation::View);
//! assert_eq!(policy.evaluate(&action, "module:acme/vpc/aws"), Permission::Granted);
//! ```
//!
//! # Common pitfalls
//! - `actions` and `resources` must be lists; a scalar string is rejected on deserialization.
use serde::{Deserialize, Serialize};

use crate::{Action, PatternSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Outcome of evaluating a policy against a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    Granted,
    Denied,
    Uncertain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub label: String,
    pub effect: Effect,
    pub actions: PatternSet,
    pub resources: PatternSet,
}

impl Policy {
    pub fn new<A, R>(label: impl Into<String>, effect: Effect, actions: A, resources: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            label: label.into(),
            effect,
            actions: actions.into_iter().collect(),
            resources: resources.into_iter().collect(),
        }
    }

    /// Evaluate this policy for `action` on `resource`.
    ///
    /// # Returns
    /// - `Granted` / `Denied` per `effect` when both sets match.
    /// - `Uncertain` otherwise.
    pub fn evaluate(&self, action: &Action, resource: &str) -> Permission {
        let has_action = self.actions.any_match(&action.to_string());
        let has_resource = self.resources.any_match(resource);
        if !(has_action && has_resource) {
            return Permission::Uncertain;
        }
        match self.effect {
            Effect::Allow => Permission::Granted,
            Effect::Deny => Permission::Denied,
        }
    }
}

/// Combine several policies: any `Denied` wins, then any `Granted`.
pub fn evaluate_all<'a, I>(policies: I, action: &Action, resource: &str) -> Permission
where
    I: IntoIterator<Item = &'a Policy>,
{
    let mut outcome = Permission::Uncertain;
    for policy in policies {
        match policy.evaluate(action, resource) {
            Permission::Denied => return Permission::Denied,
            Permission::Granted => outcome = Permission::Granted,
            Permission::Uncertain => {}
        }
    }
    outcome
}
