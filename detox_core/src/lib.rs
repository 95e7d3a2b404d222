//! Detox - replica deletion policy engine
//!
//! Decides, for each replica of a dataset held at a site, whether the replica
//! must be protected or may be deleted. Decisions come from an ordered stack
//! of rules:
//!
//! 1. **Action lists**: explicit decisions keyed by (site, dataset) globs.
//!
//! 2. **Conditions**: text expressions such as
//!    `not replica.incomplete and dataset.status == DEPRECATED`, compiled
//!    against the expression registry.
//!
//! 3. **Rules**: single-purpose checks like [`rules::ProtectMinimumCopies`].
//!
//! The first entry that takes a position decides; otherwise the stack default
//! applies.

pub mod action_list;
pub mod condition;
pub mod config;
pub mod decision;
pub mod error;
pub mod expressions;
pub mod model;
pub mod pattern;
pub mod predicate;
pub mod rule;
pub mod rules;
pub mod site_requirement;
pub mod stack;

pub use action_list::ActionList;
pub use condition::{Condition, ConditionRule};
pub use config::{RuleConfig, StackConfig};
pub use decision::{Decision, ReplicaDecision, Verdict};
pub use error::{DetoxError, Result};
pub use model::{Dataset, DatasetReplica, Demand, Inventory, ReplicaRef, Site};
pub use rule::Rule;
pub use site_requirement::GroupOccupancy;
pub use stack::PolicyStack;
