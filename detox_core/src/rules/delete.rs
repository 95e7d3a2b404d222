//! Rules that can only mark a replica for deletion.

use chrono::{DateTime, Utc};

use super::age::{cutoff_time, AgeCutoff, AgeUnit};
use crate::decision::Verdict;
use crate::error::Result;
use crate::model::{AccessChannel, DatasetStatus, Demand, ReplicaRef};
use crate::pattern::Pattern;
use crate::rule::Rule;

#[derive(Debug, Clone, Copy, Default)]
pub struct DeletePartial;

impl Rule for DeletePartial {
    fn name(&self) -> &str {
        "DeletePartial"
    }

    fn evaluate(&self, replica: &ReplicaRef<'_>, _demand: &Demand) -> Option<Verdict> {
        replica
            .is_partial()
            .then(|| Verdict::delete("Replica is partial."))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteDeprecated;

impl Rule for DeleteDeprecated {
    fn name(&self) -> &str {
        "DeleteDeprecated"
    }

    fn evaluate(&self, replica: &ReplicaRef<'_>, _demand: &Demand) -> Option<Verdict> {
        (replica.dataset.status == DatasetStatus::Deprecated)
            .then(|| Verdict::delete("Dataset is deprecated."))
    }
}

/// DELETE replicas of matching datasets updated before the cutoff.
///
/// The update time is the dataset's last update when `use_dataset_time` is
/// set, otherwise the creation time of the replica's newest block.
#[derive(Debug, Clone)]
pub struct DeleteByNameOlderThan {
    age: AgeCutoff,
    pattern: Pattern,
    use_dataset_time: bool,
}

impl DeleteByNameOlderThan {
    pub fn new(amount: f64, unit: AgeUnit, pattern: &str, use_dataset_time: bool) -> Result<Self> {
        Self::at(amount, unit, pattern, use_dataset_time, Utc::now())
    }

    pub fn at(
        amount: f64,
        unit: AgeUnit,
        pattern: &str,
        use_dataset_time: bool,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            age: AgeCutoff::new(amount, unit, now)?,
            pattern: Pattern::new(pattern)?,
            use_dataset_time,
        })
    }
}

impl Rule for DeleteByNameOlderThan {
    fn name(&self) -> &str {
        "DeleteByNameOlderThan"
    }

    fn evaluate(&self, replica: &ReplicaRef<'_>, _demand: &Demand) -> Option<Verdict> {
        if !self.pattern.matches(&replica.dataset.name) {
            return None;
        }

        let last_update = if self.use_dataset_time {
            replica.dataset.last_update
        } else {
            replica.replica.last_block_created
        };

        (last_update.date_naive() < self.age.cutoff).then(|| {
            Verdict::delete(format!(
                "Replica was updated more than {} ago.",
                self.age.text
            ))
        })
    }
}

/// DELETE replicas that nobody accessed since the cutoff.
///
/// Replicas whose newest block is younger than the cutoff are not judged.
/// A recent access on any channel blocks deletion.
#[derive(Debug, Clone)]
pub struct DeleteNotAccessedFor {
    age: AgeCutoff,
}

impl DeleteNotAccessedFor {
    pub fn new(amount: f64, unit: AgeUnit) -> Result<Self> {
        Self::at(amount, unit, Utc::now())
    }

    pub fn at(amount: f64, unit: AgeUnit, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            age: AgeCutoff::new(amount, unit, now)?,
        })
    }
}

impl Rule for DeleteNotAccessedFor {
    fn name(&self) -> &str {
        "DeleteNotAccessedFor"
    }

    fn evaluate(&self, replica: &ReplicaRef<'_>, _demand: &Demand) -> Option<Verdict> {
        let created = replica.replica.last_block_created.date_naive();
        if created > self.age.cutoff {
            return None;
        }

        if replica.num_access() == 0 {
            return Some(Verdict::delete(format!(
                "Replica was created on {} but is never accessed.",
                created.format("%Y-%m-%d")
            )));
        }

        let accessed_recently = [AccessChannel::Local, AccessChannel::Remote]
            .into_iter()
            .filter_map(|channel| replica.replica.last_access(channel))
            .any(|last_access| last_access > self.age.cutoff);
        if accessed_recently {
            return None;
        }

        Some(Verdict::delete(format!(
            "Last access is older than {}.",
            self.age.text
        )))
    }
}

/// DELETE if the global usage rank is above the threshold (low rank = heavily used).
#[derive(Debug, Clone, Copy)]
pub struct DeleteUnused {
    threshold: f64,
}

impl DeleteUnused {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Rule for DeleteUnused {
    fn name(&self) -> &str {
        "DeleteUnused"
    }

    fn evaluate(&self, _replica: &ReplicaRef<'_>, demand: &Demand) -> Option<Verdict> {
        (demand.global_usage_rank > self.threshold).then(|| {
            Verdict::delete(format!(
                "Global usage rank is above {:.6}.",
                self.threshold
            ))
        })
    }
}

/// DELETE if the dataset is old, the replica is not recent, and the replica
/// was never accessed.
#[derive(Debug, Clone, Copy)]
pub struct DeleteOldUnused {
    dataset_threshold: DateTime<Utc>,
    replica_threshold: DateTime<Utc>,
}

impl DeleteOldUnused {
    pub fn new(dataset_age_days: f64, replica_age_days: f64) -> Result<Self> {
        Self::at(dataset_age_days, replica_age_days, Utc::now())
    }

    pub fn at(dataset_age_days: f64, replica_age_days: f64, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            dataset_threshold: cutoff_time(dataset_age_days, AgeUnit::Days, now)?,
            replica_threshold: cutoff_time(replica_age_days, AgeUnit::Days, now)?,
        })
    }
}

impl Rule for DeleteOldUnused {
    fn name(&self) -> &str {
        "DeleteOldUnused"
    }

    fn evaluate(&self, replica: &ReplicaRef<'_>, _demand: &Demand) -> Option<Verdict> {
        if replica.dataset.last_update > self.dataset_threshold {
            return None;
        }

        // copied recently; someone may still be waiting to use it
        if replica.replica.last_block_created > self.replica_threshold {
            return None;
        }

        (replica.num_access() == 0)
            .then(|| Verdict::delete("Dataset is old and replica is never accessed."))
    }
}
