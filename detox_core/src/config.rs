//! Stack definitions loaded from TOML.
//!
//! ```toml
//! name = "reco_cleanup"
//! default = "delete"
//!
//! [[rules]]
//! kind = "action_list"
//! files = ["exceptions.list"]
//! entries = [["Keep", "*", "/*/*/RECO"]]
//!
//! [[rules]]
//! kind = "delete_by_name_older_than"
//! amount = 90.0
//! unit = "d"
//! pattern = "/*/*/RECO"
//! ```

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::action_list::ActionList;
use crate::condition::{Condition, ConditionRule};
use crate::decision::Decision;
use crate::error::{DetoxError, Result};
use crate::rule::Rule;
use crate::rules::{
    AgeUnit, DeleteByNameOlderThan, DeleteDeprecated, DeleteNotAccessedFor, DeleteOldUnused,
    DeletePartial, DeleteUnused, ProtectByNameDiskOnly, ProtectCustodial, ProtectDiskOnly,
    ProtectIncomplete, ProtectIncompleteTapeCopy, ProtectLocked, ProtectMinimumCopies,
    ProtectNewDiskOnly, ProtectNonreadySite, ProtectNotOwnedBy,
};
use crate::site_requirement::{GroupOccupancy, OccupancyConfig};
use crate::stack::PolicyStack;

#[derive(Debug, Clone, Deserialize)]
pub struct StackConfig {
    /// Name of the stack, used in logs
    pub name: String,

    /// Decision taken when no rule matches
    pub default: Decision,

    /// Partition that partition-scoped condition attributes refer to
    #[serde(default)]
    pub partition: Option<String>,

    /// Optional requirement selecting the sites to clean
    #[serde(default)]
    pub occupancy: Option<OccupancyConfig>,

    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// Directory relative list files are resolved against
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleConfig {
    ActionList {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        files: Vec<String>,
        #[serde(default)]
        entries: Vec<(String, String, String)>,
        /// Reject malformed lines instead of skipping them
        #[serde(default)]
        strict: bool,
    },
    Condition {
        expr: String,
        decision: Decision,
        #[serde(default)]
        reason: Option<String>,
    },
    ProtectIncomplete,
    ProtectLocked,
    ProtectCustodial,
    ProtectDiskOnly,
    ProtectByNameDiskOnly {
        pattern: String,
        #[serde(default = "default_true")]
        protect_match: bool,
    },
    ProtectNonreadySite,
    ProtectMinimumCopies {
        #[serde(default)]
        exceptions: Vec<(String, u32)>,
    },
    ProtectNotOwnedBy {
        group: String,
    },
    ProtectNewDiskOnly {
        amount: f64,
        unit: AgeUnit,
    },
    ProtectIncompleteTapeCopy,
    DeletePartial,
    DeleteDeprecated,
    DeleteByNameOlderThan {
        amount: f64,
        unit: AgeUnit,
        pattern: String,
        #[serde(default)]
        use_dataset_time: bool,
    },
    DeleteNotAccessedFor {
        amount: f64,
        unit: AgeUnit,
    },
    DeleteUnused {
        threshold: f64,
    },
    DeleteOldUnused {
        dataset_age_days: f64,
        replica_age_days: f64,
    },
}

fn default_true() -> bool {
    true
}

impl StackConfig {
    pub fn from_str(text: &str) -> Result<Self> {
        let config: StackConfig = toml::from_str(text)?;
        config.validate().map_err(DetoxError::InvalidConfig)?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut config = Self::from_str(&text)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Stack name cannot be empty".to_string());
        }
        if let Some(ref occupancy) = self.occupancy {
            occupancy.validate()?;
        }
        for rule in &self.rules {
            let ages = match rule {
                RuleConfig::ProtectNewDiskOnly { amount, .. }
                | RuleConfig::DeleteByNameOlderThan { amount, .. }
                | RuleConfig::DeleteNotAccessedFor { amount, .. } => vec![*amount],
                RuleConfig::DeleteOldUnused {
                    dataset_age_days,
                    replica_age_days,
                } => vec![*dataset_age_days, *replica_age_days],
                _ => continue,
            };
            if let Some(age) = ages.into_iter().find(|a| !a.is_finite() || *a < 0.0) {
                return Err(format!("Invalid age threshold: {}", age));
            }
        }
        Ok(())
    }

    pub fn site_requirement(&self) -> Result<Option<GroupOccupancy>> {
        self.occupancy.as_ref().map(GroupOccupancy::new).transpose()
    }

    /// Compile every rule into a stack, with time thresholds relative to `now`.
    /// Validates the configuration first, whichever way it was loaded.
    pub fn build(&self, now: DateTime<Utc>) -> Result<PolicyStack> {
        self.validate().map_err(DetoxError::InvalidConfig)?;
        let mut builder = PolicyStack::builder(self.default).name(self.name.clone());
        for rule in &self.rules {
            builder = builder.push_shared(self.build_rule(rule, now)?);
        }
        Ok(builder.build())
    }

    fn resolve(&self, file: &str) -> PathBuf {
        match self.base_dir {
            Some(ref dir) => dir.join(file),
            None => PathBuf::from(file),
        }
    }

    fn build_rule(&self, rule: &RuleConfig, now: DateTime<Utc>) -> Result<Arc<dyn Rule>> {
        let built: Arc<dyn Rule> = match rule {
            RuleConfig::ActionList {
                name,
                files,
                entries,
                strict,
            } => {
                let mut list = match name {
                    Some(name) => ActionList::named(name.clone()),
                    None => ActionList::new(),
                };
                let paths: Vec<PathBuf> = files.iter().map(|file| self.resolve(file)).collect();
                if *strict {
                    for path in &paths {
                        list.load_lines_strict(&fs::read_to_string(path)?)?;
                    }
                } else {
                    list.load_files(&paths)?;
                }
                for (action, site, dataset) in entries {
                    list.add_action(action, site, dataset)?;
                }
                Arc::new(list)
            }
            RuleConfig::Condition {
                expr,
                decision,
                reason,
            } => {
                let condition = match self.partition {
                    Some(ref partition) => Condition::with_partition(expr, partition)?,
                    None => Condition::new(expr)?,
                };
                let mut condition_rule = ConditionRule::new(condition, *decision);
                if let Some(reason) = reason {
                    condition_rule = condition_rule.with_reason(reason.clone());
                }
                Arc::new(condition_rule)
            }
            RuleConfig::ProtectIncomplete => Arc::new(ProtectIncomplete),
            RuleConfig::ProtectLocked => Arc::new(ProtectLocked),
            RuleConfig::ProtectCustodial => Arc::new(ProtectCustodial),
            RuleConfig::ProtectDiskOnly => Arc::new(ProtectDiskOnly),
            RuleConfig::ProtectByNameDiskOnly {
                pattern,
                protect_match,
            } => Arc::new(ProtectByNameDiskOnly::new(pattern, *protect_match)?),
            RuleConfig::ProtectNonreadySite => Arc::new(ProtectNonreadySite),
            RuleConfig::ProtectMinimumCopies { exceptions } => {
                let mut minimum = ProtectMinimumCopies::new();
                for (pattern, copies) in exceptions {
                    minimum = minimum.with_exception(pattern, *copies)?;
                }
                Arc::new(minimum)
            }
            RuleConfig::ProtectNotOwnedBy { group } => Arc::new(ProtectNotOwnedBy::new(group.clone())),
            RuleConfig::ProtectNewDiskOnly { amount, unit } => {
                Arc::new(ProtectNewDiskOnly::newer_than(*amount, *unit, now)?)
            }
            RuleConfig::ProtectIncompleteTapeCopy => Arc::new(ProtectIncompleteTapeCopy),
            RuleConfig::DeletePartial => Arc::new(DeletePartial),
            RuleConfig::DeleteDeprecated => Arc::new(DeleteDeprecated),
            RuleConfig::DeleteByNameOlderThan {
                amount,
                unit,
                pattern,
                use_dataset_time,
            } => Arc::new(DeleteByNameOlderThan::at(
                *amount,
                *unit,
                pattern,
                *use_dataset_time,
                now,
            )?),
            RuleConfig::DeleteNotAccessedFor { amount, unit } => {
                Arc::new(DeleteNotAccessedFor::at(*amount, *unit, now)?)
            }
            RuleConfig::DeleteUnused { threshold } => Arc::new(DeleteUnused::new(*threshold)),
            RuleConfig::DeleteOldUnused {
                dataset_age_days,
                replica_age_days,
            } => Arc::new(DeleteOldUnused::at(*dataset_age_days, *replica_age_days, now)?),
        };
        Ok(built)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const LOCKED: &str = r#"
        name = "locked"
        default = "protect"

        [[rules]]
        kind = "action_list"
        entries = [["Delete", "T2_*", "/*/*/RAW"]]

        [[rules]]
        kind = "protect_incomplete"

        [[rules]]
        kind = "protect_by_name_disk_only"
        pattern = "/*/*/RAW"

        [[rules]]
        kind = "delete_by_name_older_than"
        amount = 90.0
        unit = "d"
        pattern = "/*/*/RECO"
        use_dataset_time = true
    "#;

    #[test]
    fn test_parse_and_build() {
        let config = StackConfig::from_str(LOCKED).unwrap();
        assert_eq!(config.name, "locked");
        assert_eq!(config.default, Decision::Protect);
        assert_eq!(config.rules.len(), 4);

        let stack = config.build(Utc::now()).unwrap();
        let names: Vec<&str> = stack.rules().iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            vec![
                "ActionList",
                "ProtectIncomplete",
                "ProtectByNameDiskOnly",
                "DeleteByNameOlderThan"
            ]
        );
        assert_eq!(stack.default_decision(), Decision::Protect);
    }

    #[test]
    fn test_compile_errors_surface_from_build() {
        let config = StackConfig::from_str(
            r#"
            name = "broken"
            default = "delete"

            [[rules]]
            kind = "condition"
            expr = "replica.colour == red"
            decision = "protect"
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.build(Utc::now()),
            Err(DetoxError::InvalidExpression(name)) if name == "replica.colour"
        ));
    }

    #[test]
    fn test_invalid_unit_rejected() {
        let result = StackConfig::from_str(
            r#"
            name = "units"
            default = "delete"

            [[rules]]
            kind = "delete_not_accessed_for"
            amount = 2.0
            unit = "w"
            "#,
        );
        assert!(matches!(result, Err(DetoxError::Toml(_))));
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            StackConfig::from_str("name = \"\"\ndefault = \"delete\"\n"),
            Err(DetoxError::InvalidConfig(_))
        ));
        assert!(matches!(
            StackConfig::from_str(
                "name = \"x\"\ndefault = \"delete\"\n[occupancy]\nthreshold_occupancy = 2.0\n"
            ),
            Err(DetoxError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_age_thresholds_validated() {
        for rule in [
            "kind = \"delete_not_accessed_for\"\namount = -1.0\nunit = \"d\"",
            "kind = \"protect_new_disk_only\"\namount = nan\nunit = \"d\"",
            "kind = \"delete_old_unused\"\ndataset_age_days = -5.0\nreplica_age_days = 10.0",
            "kind = \"delete_old_unused\"\ndataset_age_days = 5.0\nreplica_age_days = nan",
            "kind = \"delete_by_name_older_than\"\namount = inf\nunit = \"y\"\npattern = \"/*/*/RECO\"",
        ] {
            let text = format!("name = \"ages\"\ndefault = \"delete\"\n[[rules]]\n{}\n", rule);
            assert!(
                matches!(StackConfig::from_str(&text), Err(DetoxError::InvalidConfig(_))),
                "accepted {}",
                rule
            );
        }
    }

    #[test]
    fn test_huge_age_threshold_fails_build() {
        let config = StackConfig::from_str(
            r#"
            name = "ages"
            default = "delete"

            [[rules]]
            kind = "delete_not_accessed_for"
            amount = 1000000.0
            unit = "y"
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.build(Utc::now()),
            Err(DetoxError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_build_validates_deserialized_config() {
        let config: StackConfig = toml::from_str(
            r#"
            name = "raw"
            default = "delete"

            [[rules]]
            kind = "delete_old_unused"
            dataset_age_days = -5.0
            replica_age_days = 10.0
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.build(Utc::now()),
            Err(DetoxError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_partition_conditions() {
        let text = r#"
            name = "occupancy"
            default = "protect"
            partition = "AnalysisOps"

            [occupancy]
            included_sites = "T2_*"

            [[rules]]
            kind = "condition"
            expr = "site.occupancy > 0.9 and replica.num_access == 0"
            decision = "delete"
            reason = "Site is full and replica unused."
        "#;
        let config = StackConfig::from_str(text).unwrap();
        assert!(config.build(Utc::now()).is_ok());
        assert!(config.site_requirement().unwrap().is_some());

        let unscoped = text.replace("partition = \"AnalysisOps\"", "");
        let config = StackConfig::from_str(&unscoped).unwrap();
        assert!(matches!(
            config.build(Utc::now()),
            Err(DetoxError::MissingPartition(_))
        ));
    }

    #[test]
    fn test_list_files_relative_to_config() {
        let dir = tempdir().unwrap();
        let mut list = fs::File::create(dir.path().join("exceptions.list")).unwrap();
        writeln!(list, "Keep T2_CH_CERN /*/*/RECO").unwrap();
        writeln!(list, "not an entry").unwrap();

        let stack_path = dir.path().join("stack.toml");
        fs::write(
            &stack_path,
            r#"
            name = "files"
            default = "delete"

            [[rules]]
            kind = "action_list"
            name = "exceptions"
            files = ["exceptions.list"]
            "#,
        )
        .unwrap();

        let config = StackConfig::from_file(&stack_path).unwrap();
        let stack = config.build(Utc::now()).unwrap();
        assert_eq!(stack.rules()[0].name(), "exceptions");

        let strict = fs::read_to_string(&stack_path)
            .unwrap()
            .replace("name = \"exceptions\"", "strict = true");
        fs::write(&stack_path, strict).unwrap();
        let config = StackConfig::from_file(&stack_path).unwrap();
        assert!(matches!(
            config.build(Utc::now()),
            Err(DetoxError::InvalidActionLine { line_no: 2, .. })
        ));
    }
}
