//! Access-control primitives for the registry service.
//!
//! # Purpose
//! Defines the glob matcher, the action/resource taxonomy, tri-state
//! policies, the role-enforcer vocabulary, and the authenticated [`Subject`].
//!
//! # How it fits
//! The registry service authenticates callers into a [`Subject`] and decides
//! each request with the types from this crate. Nothing here does I/O.
//!
//! # Key invariants
//! - Glob patterns are anchored at both ends; `*` matches any run, `?` one character.
//! - Actions render as `target:operation`, resources as `type:id`.
//! - Vocabulary tokens are case-sensitive.
//!
//! # Examples
//! ```rust
//! use registry_authz::{glob_match, module_resource};
//!
//! assert!(glob_match(&module_resource("acme", "vpc", "aws"), "module:acme/*"));
//! ```

mod action;
mod errors;
mod matcher;
mod policy;
mod rbac;
mod resource;
mod subject;

pub use action::{Action, Operation, Target};
pub use errors::{AuthzError, AuthzResult, RbacError};
pub use matcher::{PatternSet, glob_match};
pub use policy::{Effect, Permission, Policy, evaluate_all};
pub use rbac::{ADMIN_ROLE, READONLY_ROLE, ROLE_PREFIX, RbacAction, RbacResource, role_alias};
pub use resource::{
    ResourceType, compose_resource, decompose_resource, module_resource, namespace_of,
};
pub use subject::{ANONYMOUS, Subject};
