use serde::{Deserialize, Serialize};

use crate::AuthzError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Target {
    Modules,
    Providers,
    Authorities,
    ApiKeys,
    Any,
}

impl Target {
    pub fn as_str(self) -> &'static str {
        match self {
            Target::Modules => "modules",
            Target::Providers => "providers",
            Target::Authorities => "authorities",
            Target::ApiKeys => "apiKeys",
            Target::Any => "*",
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Target {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "modules" => Ok(Target::Modules),
            "providers" => Ok(Target::Providers),
            "authorities" => Ok(Target::Authorities),
            "apiKeys" => Ok(Target::ApiKeys),
            "*" => Ok(Target::Any),
            other => Err(AuthzError::UnknownTarget(other.to_string())),
        }
    }
}

impl TryFrom<String> for Target {
    type Error = AuthzError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Target> for String {
    fn from(value: Target) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operation {
    View,
    Create,
    Update,
    Delete,
    All,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::View => "get",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::All => "*",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = AuthzError;

    /// HTTP verbs are accepted as aliases of the operation they perform.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "get" | "view" => Ok(Operation::View),
            "create" | "post" => Ok(Operation::Create),
            "update" | "patch" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            "*" => Ok(Operation::All),
            other => Err(AuthzError::UnknownOperation(other.to_string())),
        }
    }
}

impl TryFrom<String> for Operation {
    type Error = AuthzError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Operation> for String {
    fn from(value: Operation) -> Self {
        value.as_str().to_string()
    }
}

/// A target paired with an operation, rendered `target:operation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Action {
    pub target: Target,
    pub operation: Operation,
}

impl Action {
    pub fn new(target: Target, operation: Operation) -> Self {
        Self { target, operation }
    }

    pub fn any() -> Self {
        Self::new(Target::Any, Operation::All)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.target, self.operation) {
            (Target::Any, Operation::All) => f.write_str("*"),
            (target, operation) => write!(f, "{target}:{operation}"),
        }
    }
}

impl std::str::FromStr for Action {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "*" {
            return Ok(Action::any());
        }
        let Some((target, operation)) = value.split_once(':') else {
            return Err(AuthzError::InvalidAction(value.to_string()));
        };
        Ok(Action::new(target.parse()?, operation.parse()?))
    }
}
