//! Role-based access control.
//!
//! # Purpose
//! Exposes the role enforcer, the narrow rule-backend seam, and the rule
//! shapes loaded from the declarative policy file.
pub mod backend;
pub mod enforcer;
pub mod policy_store;

// Embed the Casbin model so deployments only ship the policy CSV.
pub const MODEL_CONF: &str = include_str!("rbac/model.conf");
