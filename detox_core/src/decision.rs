//! Decisions produced by rules and stacks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DetoxError;
use crate::model::ReplicaId;

/// Outcome of evaluating a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Veto removal of the replica.
    Protect,

    /// The replica is a candidate for removal.
    Delete,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Protect => f.write_str("PROTECT"),
            Decision::Delete => f.write_str("DELETE"),
        }
    }
}

impl FromStr for Decision {
    type Err = DetoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "protect" | "keep" => Ok(Decision::Protect),
            "delete" => Ok(Decision::Delete),
            other => Err(DetoxError::InvalidConfig(format!(
                "unknown decision '{}'",
                other
            ))),
        }
    }
}

/// A decision together with the reason it was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: Decision,
    pub reason: String,

    /// Name of the stack entry that decided, `None` for the default
    #[serde(default)]
    pub rule: Option<String>,
}

impl Verdict {
    pub fn protect(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Protect,
            reason: reason.into(),
            rule: None,
        }
    }

    pub fn delete(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Delete,
            reason: reason.into(),
            rule: None,
        }
    }

    pub fn new(decision: Decision, reason: impl Into<String>) -> Self {
        Self {
            decision,
            reason: reason.into(),
            rule: None,
        }
    }
}

/// Final decision for one replica, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaDecision {
    pub replica: ReplicaId,
    pub decision: Decision,
    pub reason: String,
}

impl fmt::Display for ReplicaDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.replica.site, self.replica.dataset, self.decision, self.reason
        )
    }
}
