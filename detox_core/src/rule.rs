//! The interface every stack entry implements.

use crate::decision::Verdict;
use crate::model::{Demand, ReplicaRef};

/// Interface for policy rules.
///
/// A rule either takes no position on a replica (`None`) or returns a
/// decision with a human-readable reason. Rules are immutable once built and
/// are evaluated concurrently from many threads.
pub trait Rule: Send + Sync {
    /// Get the rule name used in logs and verdicts.
    fn name(&self) -> &str;

    /// Evaluate a replica with the demand of its dataset.
    fn evaluate(&self, replica: &ReplicaRef<'_>, demand: &Demand) -> Option<Verdict>;
}
