//! Site requirements: which sites need cleaning for a partition.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DetoxError, Result};
use crate::model::Site;
use crate::pattern::Pattern;

/// Default occupancy above which a site is cleaned.
pub const DEFAULT_THRESHOLD_OCCUPANCY: f64 = 0.9;

/// Default occupancy cleaning stops at.
pub const DEFAULT_TARGET_OCCUPANCY: f64 = 0.85;

/// Settings for [`GroupOccupancy`], as written in stack files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyConfig {
    #[serde(default)]
    pub included_sites: Option<String>,
    #[serde(default = "default_threshold")]
    pub threshold_occupancy: f64,
    #[serde(default = "default_target")]
    pub target_occupancy: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD_OCCUPANCY
}

fn default_target() -> f64 {
    DEFAULT_TARGET_OCCUPANCY
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            included_sites: None,
            threshold_occupancy: DEFAULT_THRESHOLD_OCCUPANCY,
            target_occupancy: DEFAULT_TARGET_OCCUPANCY,
        }
    }
}

impl OccupancyConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        for (name, value) in [
            ("threshold_occupancy", self.threshold_occupancy),
            ("target_occupancy", self.target_occupancy),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.target_occupancy > self.threshold_occupancy {
            return Err("target_occupancy cannot exceed threshold_occupancy".to_string());
        }
        Ok(())
    }
}

/// A site needs cleaning when its partition occupancy is too high.
///
/// The initial pass triggers above the threshold; later iterations keep
/// going until the occupancy drops to the target.
#[derive(Debug, Clone)]
pub struct GroupOccupancy {
    included_sites: Option<Pattern>,
    threshold_occupancy: f64,
    target_occupancy: f64,
}

impl GroupOccupancy {
    pub fn new(config: &OccupancyConfig) -> Result<Self> {
        config.validate().map_err(DetoxError::InvalidConfig)?;

        let included_sites = config
            .included_sites
            .as_deref()
            .map(Pattern::new)
            .transpose()?;

        Ok(Self {
            included_sites,
            threshold_occupancy: config.threshold_occupancy,
            target_occupancy: config.target_occupancy,
        })
    }

    pub fn needs_cleanup(&self, site: &Site, partition: &str, initial: bool) -> bool {
        if let Some(ref pattern) = self.included_sites {
            if !pattern.matches(&site.name) {
                return false;
            }
        }

        if site.quota(partition) == 0.0 {
            return false;
        }

        let occupancy = site.occupancy(partition);
        let limit = if initial {
            self.threshold_occupancy
        } else {
            self.target_occupancy
        };

        debug!(
            "{} {}: occupancy {:.3}, limit {:.3}",
            site.name, partition, occupancy, limit
        );
        occupancy > limit
    }
}
