//! Conjunctive conditions compiled from text.
//!
//! Grammar: `<clause> (" and " <clause>)*`, where a clause is
//! `<name> [<op> <rhs...>]` or `not <name>`. There is no `or` and no grouping.

use std::sync::Arc;

use crate::decision::{Decision, Verdict};
use crate::error::{DetoxError, Result};
use crate::expressions;
use crate::model::{Demand, ReplicaRef};
use crate::predicate::Predicate;
use crate::rule::Rule;

#[derive(Debug, Clone)]
pub struct Condition {
    text: String,
    predicates: Vec<Predicate>,
}

impl Condition {
    /// Compile a condition over global attributes only.
    pub fn new(text: &str) -> Result<Self> {
        Self::compile(text, None)
    }

    /// Compile a condition whose partition-scoped attributes refer to `partition`.
    pub fn with_partition(text: &str, partition: &str) -> Result<Self> {
        Self::compile(text, Some(partition))
    }

    fn compile(text: &str, partition: Option<&str>) -> Result<Self> {
        let mut predicates = Vec::new();

        // an empty condition matches everything
        let clauses = if text.trim().is_empty() {
            Vec::new()
        } else {
            text.split(" and ").collect()
        };

        for clause in clauses {
            let mut words: Vec<&str> = clause.split_whitespace().collect();
            if words.is_empty() {
                return Err(DetoxError::InvalidExpression(text.to_string()));
            }

            // "not X" reads as "X not"
            if words[0] == "not" && words.len() > 1 {
                words.swap(0, 1);
            }

            let name = words[0];
            let vardef = expressions::lookup(name)
                .map_err(|_| DetoxError::InvalidExpression(name.to_string()))?;
            let var = vardef.bind(partition)?;

            let operator = words.get(1).copied().unwrap_or("");
            let rhs = words.get(2..).map(|rest| rest.join(" ")).unwrap_or_default();

            predicates.push(Predicate::new(var, operator, &rhs)?);
        }

        Ok(Self {
            text: text.to_string(),
            predicates,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// True when every predicate holds.
    pub fn matches(&self, replica: &ReplicaRef<'_>, demand: &Demand) -> bool {
        self.predicates
            .iter()
            .all(|predicate| predicate.evaluate(replica, demand))
    }
}

/// A condition with a decision attached, usable as a stack entry.
#[derive(Debug, Clone)]
pub struct ConditionRule {
    condition: Arc<Condition>,
    decision: Decision,
    reason: String,
}

impl ConditionRule {
    pub fn new(condition: Condition, decision: Decision) -> Self {
        let reason = format!("Condition matched: {}", condition.text());
        Self {
            condition: Arc::new(condition),
            decision,
            reason,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }
}

impl Rule for ConditionRule {
    fn name(&self) -> &str {
        self.condition.text()
    }

    fn evaluate(&self, replica: &ReplicaRef<'_>, demand: &Demand) -> Option<Verdict> {
        if self.condition.matches(replica, demand) {
            Some(Verdict::new(self.decision, self.reason.clone()))
        } else {
            None
        }
    }
}
