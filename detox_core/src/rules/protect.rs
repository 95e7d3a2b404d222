//! Rules that can only protect a replica.

use chrono::{DateTime, Utc};

use super::age::{cutoff_time, AgeUnit};
use crate::decision::Verdict;
use crate::error::Result;
use crate::expressions::{replica_has_locked_block, replica_incomplete};
use crate::model::{Demand, ReplicaRef, SiteActivity, SiteStatus, TapeCopy};
use crate::pattern::Pattern;
use crate::rule::Rule;

/// PROTECT if the replica has incomplete blocks of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtectIncomplete;

impl Rule for ProtectIncomplete {
    fn name(&self) -> &str {
        "ProtectIncomplete"
    }

    fn evaluate(&self, replica: &ReplicaRef<'_>, _demand: &Demand) -> Option<Verdict> {
        replica_incomplete(replica).then(|| Verdict::protect("Replica is not complete."))
    }
}

/// PROTECT if any block of the replica is locked.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtectLocked;

impl Rule for ProtectLocked {
    fn name(&self) -> &str {
        "ProtectLocked"
    }

    fn evaluate(&self, replica: &ReplicaRef<'_>, demand: &Demand) -> Option<Verdict> {
        replica_has_locked_block(replica, demand).then(|| Verdict::protect("Locked block exists."))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProtectCustodial;

impl Rule for ProtectCustodial {
    fn name(&self) -> &str {
        "ProtectCustodial"
    }

    fn evaluate(&self, replica: &ReplicaRef<'_>, _demand: &Demand) -> Option<Verdict> {
        replica
            .replica
            .is_custodial
            .then(|| Verdict::protect("Replica is custodial."))
    }
}

/// PROTECT if the dataset has no full tape copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtectDiskOnly;

impl Rule for ProtectDiskOnly {
    fn name(&self) -> &str {
        "ProtectDiskOnly"
    }

    fn evaluate(&self, replica: &ReplicaRef<'_>, _demand: &Demand) -> Option<Verdict> {
        (replica.dataset.on_tape != TapeCopy::Full)
            .then(|| Verdict::protect("Dataset has no complete tape copy."))
    }
}

/// PROTECT disk-only datasets selected by name.
///
/// With `protect_match` set, datasets matching the pattern are protected;
/// otherwise the non-matching ones are.
#[derive(Debug, Clone)]
pub struct ProtectByNameDiskOnly {
    pattern: Pattern,
    protect_match: bool,
}

impl ProtectByNameDiskOnly {
    pub fn new(pattern: &str, protect_match: bool) -> Result<Self> {
        Ok(Self {
            pattern: Pattern::new(pattern)?,
            protect_match,
        })
    }
}

impl Rule for ProtectByNameDiskOnly {
    fn name(&self) -> &str {
        "ProtectByNameDiskOnly"
    }

    fn evaluate(&self, replica: &ReplicaRef<'_>, _demand: &Demand) -> Option<Verdict> {
        if replica.dataset.on_tape == TapeCopy::Full {
            return None;
        }

        (self.pattern.matches(&replica.dataset.name) == self.protect_match)
            .then(|| Verdict::protect("Dataset has no complete tape copy."))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProtectNonreadySite;

impl Rule for ProtectNonreadySite {
    fn name(&self) -> &str {
        "ProtectNonreadySite"
    }

    fn evaluate(&self, replica: &ReplicaRef<'_>, _demand: &Demand) -> Option<Verdict> {
        let site = replica.site;
        (site.status != SiteStatus::Ready || site.activity == SiteActivity::Ignore)
            .then(|| Verdict::protect("Site is not in ready state."))
    }
}

/// PROTECT while the dataset has no more full copies than it requires.
///
/// The required count comes from the dataset demand unless the dataset name
/// matches one of the exceptions; the first matching exception wins.
#[derive(Debug, Clone, Default)]
pub struct ProtectMinimumCopies {
    exceptions: Vec<(Pattern, u32)>,
}

impl ProtectMinimumCopies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exception(mut self, pattern: &str, required_copies: u32) -> Result<Self> {
        self.exceptions.push((Pattern::new(pattern)?, required_copies));
        Ok(self)
    }

    pub fn required_copies(&self, dataset_name: &str, demand: &Demand) -> u32 {
        self.exceptions
            .iter()
            .find(|(pattern, _)| pattern.matches(dataset_name))
            .map_or(demand.required_copies, |(_, n)| *n)
    }
}

impl Rule for ProtectMinimumCopies {
    fn name(&self) -> &str {
        "ProtectMinimumCopies"
    }

    fn evaluate(&self, replica: &ReplicaRef<'_>, demand: &Demand) -> Option<Verdict> {
        let num_copies = replica.dataset.num_full_copies();
        let required = self.required_copies(&replica.dataset.name, demand);

        (num_copies <= required as usize)
            .then(|| Verdict::protect(format!("Dataset has <= {} copies.", required)))
    }
}

/// PROTECT unless the whole replica is owned by the given group.
#[derive(Debug, Clone)]
pub struct ProtectNotOwnedBy {
    group: String,
}

impl ProtectNotOwnedBy {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
        }
    }
}

impl Rule for ProtectNotOwnedBy {
    fn name(&self) -> &str {
        "ProtectNotOwnedBy"
    }

    fn evaluate(&self, replica: &ReplicaRef<'_>, _demand: &Demand) -> Option<Verdict> {
        match replica.replica.group.as_deref() {
            Some(group) if group == self.group => None,
            _ => Some(Verdict::protect(format!(
                "Not all parts of replica are owned by {}",
                self.group
            ))),
        }
    }
}

/// PROTECT disk-only replicas with a block created after the threshold.
#[derive(Debug, Clone)]
pub struct ProtectNewDiskOnly {
    threshold: DateTime<Utc>,
    threshold_text: String,
}

impl ProtectNewDiskOnly {
    pub fn new(threshold: DateTime<Utc>) -> Self {
        Self {
            threshold,
            threshold_text: threshold.format("%Y-%m-%d").to_string(),
        }
    }

    /// Threshold at `amount` units before `now`.
    pub fn newer_than(amount: f64, unit: AgeUnit, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self::new(cutoff_time(amount, unit, now)?))
    }
}

impl Rule for ProtectNewDiskOnly {
    fn name(&self) -> &str {
        "ProtectNewDiskOnly"
    }

    fn evaluate(&self, replica: &ReplicaRef<'_>, _demand: &Demand) -> Option<Verdict> {
        (replica.dataset.on_tape != TapeCopy::Full
            && replica.replica.last_block_created > self.threshold)
            .then(|| {
                Verdict::protect(format!(
                    "Replica has no full tape copy and has a block newer than {}.",
                    self.threshold_text
                ))
            })
    }
}

/// PROTECT if a tape copy is requested but not finished.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtectIncompleteTapeCopy;

impl Rule for ProtectIncompleteTapeCopy {
    fn name(&self) -> &str {
        "ProtectIncompleteTapeCopy"
    }

    fn evaluate(&self, replica: &ReplicaRef<'_>, _demand: &Demand) -> Option<Verdict> {
        (replica.dataset.on_tape == TapeCopy::Partial)
            .then(|| Verdict::protect("A tape copy is requested but is not completed."))
    }
}
