//! Explicit decisions keyed by (site, dataset) glob pairs.
//!
//! List files hold one entry per line:
//!
//! ```text
//! Keep   T2_CH_CERN  /*/*/MINIAOD*
//! Delete T1_*        /*/Run2012*/RECO
//! ```
//!
//! Lines that do not have this shape are skipped, unless the list is loaded
//! with [`ActionList::load_lines_strict`].

use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::decision::{Decision, Verdict};
use crate::error::{DetoxError, Result};
use crate::model::{Demand, ReplicaRef};
use crate::pattern::Pattern;
use crate::rule::Rule;

lazy_static! {
    static ref LINE: Regex =
        Regex::new(r"^\s*(Keep|Delete)\s+([A-Za-z0-9_*]+)\s+(/[\w*-]+/[\w*-]+/[\w*-]+)(?:\s|$)")
            .expect("action list line regex");
}

#[derive(Debug, Clone)]
pub struct ActionEntry {
    pub decision: Decision,
    pub site: Pattern,
    pub dataset: Pattern,
    /// Decision word as written
    pub action: String,
}

impl ActionEntry {
    fn matches(&self, replica: &ReplicaRef<'_>) -> bool {
        self.site.matches(&replica.site.name) && self.dataset.matches(&replica.dataset.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActionList {
    name: String,
    entries: Vec<ActionEntry>,
}

impl ActionList {
    pub fn new() -> Self {
        Self {
            name: "ActionList".to_string(),
            entries: Vec::new(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Create a list from a file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut list = Self::named(path.display().to_string());
        list.load_file(path)?;
        Ok(list)
    }

    /// Append an entry. `"Keep"` protects; any other word deletes.
    pub fn add_action(&mut self, action: &str, site: &str, dataset: &str) -> Result<()> {
        let decision = if action == "Keep" {
            Decision::Protect
        } else {
            Decision::Delete
        };

        self.entries.push(ActionEntry {
            decision,
            site: Pattern::new(site)?,
            dataset: Pattern::new(dataset)?,
            action: action.to_string(),
        });
        Ok(())
    }

    /// Load entries from text, skipping lines that are not entries.
    ///
    /// Returns the number of entries added.
    pub fn load_lines(&mut self, text: &str) -> Result<usize> {
        let mut added = 0;
        for (index, line) in text.lines().enumerate() {
            match LINE.captures(line.trim()) {
                Some(caps) => {
                    self.add_action(&caps[1], &caps[2], &caps[3])?;
                    added += 1;
                }
                None => debug!("{}: ignoring line {}: {:?}", self.name, index + 1, line),
            }
        }
        Ok(added)
    }

    /// Load entries from text, rejecting any line that is neither an entry,
    /// blank, nor a `#` comment.
    pub fn load_lines_strict(&mut self, text: &str) -> Result<usize> {
        let mut parsed = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match LINE.captures(trimmed) {
                Some(caps) => parsed.push((caps[1].to_string(), caps[2].to_string(), caps[3].to_string())),
                None => {
                    return Err(DetoxError::InvalidActionLine {
                        line_no: index + 1,
                        line: line.to_string(),
                    })
                }
            }
        }

        for (action, site, dataset) in &parsed {
            self.add_action(action, site, dataset)?;
        }
        Ok(parsed.len())
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let added = self.load_lines(&text)?;
        info!("Loaded {} actions from {}", added, path.display());
        Ok(added)
    }

    pub fn load_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<usize> {
        let mut added = 0;
        for path in paths {
            added += self.load_file(path)?;
        }
        Ok(added)
    }

    pub fn entries(&self) -> &[ActionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Rule for ActionList {
    fn name(&self) -> &str {
        &self.name
    }

    /// Take the decision of the first entry matching both site and dataset.
    fn evaluate(&self, replica: &ReplicaRef<'_>, _demand: &Demand) -> Option<Verdict> {
        self.entries
            .iter()
            .find(|entry| entry.matches(replica))
            .map(|entry| {
                Verdict::new(
                    entry.decision,
                    format!(
                        "Pattern match: (action, site, dataset) = ({}, {}, {})",
                        entry.action, entry.site, entry.dataset
                    ),
                )
            })
    }
}
