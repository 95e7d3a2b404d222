//! Read-only domain model consumed by the rule engine.
//!
//! The engine never mutates these types. Rules and expressions see a replica
//! through [`ReplicaRef`], which bundles the replica with its dataset and site.

use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetStatus {
    Production,
    Valid,
    Invalid,
    Deprecated,
    Deleted,
    Unknown,
}

impl DatasetStatus {
    pub fn code(self) -> f64 {
        self as u8 as f64
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.to_ascii_uppercase().as_str() {
            "PRODUCTION" => Some(Self::Production),
            "VALID" => Some(Self::Valid),
            "INVALID" => Some(Self::Invalid),
            "DEPRECATED" => Some(Self::Deprecated),
            "DELETED" => Some(Self::Deleted),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// State of the archival tape subscription of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TapeCopy {
    None,
    Partial,
    Full,
}

impl TapeCopy {
    pub fn code(self) -> f64 {
        self as u8 as f64
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.to_ascii_uppercase().as_str() {
            "NONE" => Some(Self::None),
            "PARTIAL" => Some(Self::Partial),
            "FULL" => Some(Self::Full),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteStatus {
    Ready,
    Waitroom,
    Morgue,
    Unknown,
}

impl SiteStatus {
    pub fn code(self) -> f64 {
        self as u8 as f64
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.to_ascii_uppercase().as_str() {
            "READY" => Some(Self::Ready),
            "WAITROOM" => Some(Self::Waitroom),
            "MORGUE" => Some(Self::Morgue),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteActivity {
    Available,
    Ignore,
}

impl SiteActivity {
    pub fn code(self) -> f64 {
        self as u8 as f64
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.to_ascii_uppercase().as_str() {
            "AVAILABLE" => Some(Self::Available),
            "IGNORE" => Some(Self::Ignore),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessChannel {
    Local,
    Remote,
}

/// Quota and usage of one partition at a site, in TB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionUsage {
    pub quota: f64,
    pub used: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    pub status: SiteStatus,
    #[serde(default = "default_activity")]
    pub activity: SiteActivity,
    #[serde(default)]
    pub partitions: HashMap<String, PartitionUsage>,
}

fn default_activity() -> SiteActivity {
    SiteActivity::Available
}

impl Site {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: SiteStatus::Ready,
            activity: SiteActivity::Available,
            partitions: HashMap::new(),
        }
    }

    pub fn quota(&self, partition: &str) -> f64 {
        self.partitions.get(partition).map_or(0.0, |p| p.quota)
    }

    pub fn used(&self, partition: &str) -> f64 {
        self.partitions.get(partition).map_or(0.0, |p| p.used)
    }

    /// Fraction of the partition quota in use; 0 when the site has no quota.
    pub fn occupancy(&self, partition: &str) -> f64 {
        let quota = self.quota(partition);
        if quota <= 0.0 {
            0.0
        } else {
            self.used(partition) / quota
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReplica {
    pub block: String,
    #[serde(default = "default_true")]
    pub is_complete: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetReplica {
    /// Name of the site holding the replica
    pub site: String,
    #[serde(default = "default_true")]
    pub is_complete: bool,
    #[serde(default)]
    pub is_custodial: bool,
    /// Owning group; `None` when the blocks are not owned by a single group
    #[serde(default)]
    pub group: Option<String>,
    pub last_block_created: DateTime<Utc>,
    #[serde(default)]
    pub block_replicas: Vec<BlockReplica>,
    /// Access counts per day for each channel
    #[serde(default)]
    pub accesses: HashMap<AccessChannel, BTreeMap<NaiveDate, u32>>,
}

impl DatasetReplica {
    pub fn new(site: impl Into<String>, last_block_created: DateTime<Utc>) -> Self {
        Self {
            site: site.into(),
            is_complete: true,
            is_custodial: false,
            group: None,
            last_block_created,
            block_replicas: Vec::new(),
            accesses: HashMap::new(),
        }
    }

    pub fn access_records(&self, channel: AccessChannel) -> Option<&BTreeMap<NaiveDate, u32>> {
        self.accesses.get(&channel)
    }

    /// Most recent access date on a channel.
    pub fn last_access(&self, channel: AccessChannel) -> Option<NaiveDate> {
        self.access_records(channel)
            .and_then(|records| records.keys().next_back().copied())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub status: DatasetStatus,
    pub on_tape: TapeCopy,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub replicas: Vec<DatasetReplica>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, last_update: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            status: DatasetStatus::Valid,
            on_tape: TapeCopy::None,
            last_update,
            blocks: Vec::new(),
            replicas: Vec::new(),
        }
    }

    /// A replica is full when it is complete and holds every block of the dataset.
    pub fn is_full_replica(&self, replica: &DatasetReplica) -> bool {
        replica.is_complete && replica.block_replicas.len() >= self.blocks.len()
    }

    pub fn num_full_copies(&self) -> usize {
        self.replicas
            .iter()
            .filter(|r| self.is_full_replica(r))
            .count()
    }
}

/// Per-dataset demand metadata supplied alongside a replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demand {
    #[serde(default = "default_required_copies")]
    pub required_copies: u32,
    #[serde(default)]
    pub locked_blocks: BTreeSet<String>,
    #[serde(default)]
    pub global_usage_rank: f64,
}

fn default_required_copies() -> u32 {
    1
}

lazy_static! {
    static ref DEFAULT_DEMAND: Demand = Demand::default();
}

impl Default for Demand {
    fn default() -> Self {
        Self {
            required_copies: default_required_copies(),
            locked_blocks: BTreeSet::new(),
            global_usage_rank: 0.0,
        }
    }
}

/// Borrowed view of one replica together with its dataset and site.
#[derive(Debug, Clone, Copy)]
pub struct ReplicaRef<'a> {
    pub dataset: &'a Dataset,
    pub replica: &'a DatasetReplica,
    pub site: &'a Site,
}

impl<'a> ReplicaRef<'a> {
    pub fn new(dataset: &'a Dataset, replica: &'a DatasetReplica, site: &'a Site) -> Self {
        Self {
            dataset,
            replica,
            site,
        }
    }

    pub fn id(&self) -> ReplicaId {
        ReplicaId {
            site: self.site.name.clone(),
            dataset: self.dataset.name.clone(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.dataset.is_full_replica(self.replica)
    }

    pub fn is_partial(&self) -> bool {
        self.replica.block_replicas.len() < self.dataset.blocks.len()
    }

    /// Total number of access records over all channels.
    pub fn num_access(&self) -> usize {
        self.replica.accesses.values().map(BTreeMap::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaId {
    pub site: String,
    pub dataset: String,
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.site, self.dataset)
    }
}

/// Snapshot of sites, datasets and demands, loaded from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(default)]
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub demands: HashMap<String, Demand>,
}

impl Inventory {
    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn site(&self, name: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.name == name)
    }

    /// All replicas in dataset order, each paired with its dataset demand.
    ///
    /// Replicas at sites missing from the snapshot are skipped.
    pub fn replicas(&self) -> Vec<(ReplicaRef<'_>, &Demand)> {
        let sites: HashMap<&str, &Site> =
            self.sites.iter().map(|s| (s.name.as_str(), s)).collect();

        let mut result = Vec::new();
        for dataset in &self.datasets {
            let demand = self.demands.get(&dataset.name).unwrap_or(&*DEFAULT_DEMAND);
            for replica in &dataset.replicas {
                match sites.get(replica.site.as_str()) {
                    Some(site) => result.push((ReplicaRef::new(dataset, replica, site), demand)),
                    None => warn!(
                        "Skipping replica of {} at unknown site {}",
                        dataset.name, replica.site
                    ),
                }
            }
        }

        result
    }
}
