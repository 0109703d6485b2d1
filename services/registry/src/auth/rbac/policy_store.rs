//! Rule shapes held by the rule backend.
//!
//! # Purpose
//! Mirrors the `p` and `g` lines of the policy file:
//! `p, <subject>, <resource>, <action>, <object>` and `g, <user>, <role>`.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub subject: String,
    pub resource: String,
    pub action: String,
    pub object: String,
}

impl PolicyRule {
    pub fn new(
        subject: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            resource: resource.into(),
            action: action.into(),
            object: object.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingRule {
    pub user: String,
    pub role: String,
}

impl GroupingRule {
    pub fn new(user: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            role: role.into(),
        }
    }

    /// Build from a raw `g` row; rows with fewer than two fields are rejected.
    pub fn from_row(row: &[String]) -> Option<Self> {
        match row {
            [user, role, ..] => Some(Self::new(user, role)),
            _ => None,
        }
    }
}
