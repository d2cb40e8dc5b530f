//! The two branch alternatives

use std::fmt;
use std::str::FromStr;

use super::errors::BranchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Then,
    Else,
}

impl Branch {
    /// `Then` when the condition holds
    pub fn select(condition: bool) -> Self {
        if condition {
            Branch::Then
        } else {
            Branch::Else
        }
    }

    /// Graph attribute name the branch is declared under
    pub fn attribute_name(&self) -> &'static str {
        match self {
            Branch::Then => "then_branch",
            Branch::Else => "else_branch",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.attribute_name())
    }
}

impl FromStr for Branch {
    type Err = BranchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "then_branch" => Ok(Branch::Then),
            "else_branch" => Ok(Branch::Else),
            other => Err(BranchError::UnknownBranch(other.to_string())),
        }
    }
}
