//! Expression registry.
//!
//! Maps the dotted attribute names used in condition text (`dataset.status`,
//! `replica.num_access`, ...) to an accessor, a value type and an optional
//! resolver for symbolic constants. Some attributes are scoped to a storage
//! partition; their accessor is curried with the partition when a condition
//! binds the name.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{DetoxError, Result};
use crate::model::{DatasetStatus, Demand, ReplicaRef, SiteActivity, SiteStatus, TapeCopy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    Numeric,
    Text,
    Time,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Bool => "bool",
            ValueType::Numeric => "numeric",
            ValueType::Text => "text",
            ValueType::Time => "time",
        };
        f.write_str(name)
    }
}

/// Attribute value read from a replica.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
    Time(DateTime<Utc>),
}

/// Accessor bound to a concrete partition (or to none).
pub type Accessor = Arc<dyn Fn(&ReplicaRef<'_>, &Demand) -> Value + Send + Sync>;

/// Resolves a symbolic constant such as `DEPRECATED` to its value.
pub type Resolver = fn(&str) -> Option<Value>;

type GlobalFn = fn(&ReplicaRef<'_>, &Demand) -> Value;
type PartitionFn = fn(&str) -> Accessor;

enum Access {
    Global(GlobalFn),
    Partitioned(PartitionFn),
}

/// Registered definition of one attribute.
pub struct VarDef {
    name: &'static str,
    access: Access,
    value_type: ValueType,
    resolve: Option<Resolver>,
}

impl VarDef {
    fn global(name: &'static str, value_type: ValueType, accessor: GlobalFn) -> Self {
        Self {
            name,
            access: Access::Global(accessor),
            value_type,
            resolve: None,
        }
    }

    fn partitioned(name: &'static str, value_type: ValueType, accessor: PartitionFn) -> Self {
        Self {
            name,
            access: Access::Partitioned(accessor),
            value_type,
            resolve: None,
        }
    }

    fn with_resolver(mut self, resolve: Resolver) -> Self {
        self.resolve = Some(resolve);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn is_partitioned(&self) -> bool {
        matches!(self.access, Access::Partitioned(_))
    }

    /// Bind the accessor, currying partition-scoped attributes once.
    pub fn bind(&self, partition: Option<&str>) -> Result<BoundVar> {
        let accessor: Accessor = match (&self.access, partition) {
            (Access::Global(f), _) => {
                let f = *f;
                Arc::new(move |replica: &ReplicaRef<'_>, demand: &Demand| f(replica, demand))
            }
            (Access::Partitioned(f), Some(partition)) => f(partition),
            (Access::Partitioned(_), None) => {
                return Err(DetoxError::MissingPartition(self.name.to_string()))
            }
        };

        Ok(BoundVar {
            name: self.name,
            value_type: self.value_type,
            resolve: self.resolve,
            accessor,
        })
    }
}

impl fmt::Debug for VarDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VarDef")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("partitioned", &self.is_partitioned())
            .field("resolvable", &self.resolve.is_some())
            .finish()
    }
}

/// A variable definition with its accessor ready to evaluate.
#[derive(Clone)]
pub struct BoundVar {
    pub name: &'static str,
    pub value_type: ValueType,
    pub resolve: Option<Resolver>,
    accessor: Accessor,
}

impl BoundVar {
    pub fn get(&self, replica: &ReplicaRef<'_>, demand: &Demand) -> Value {
        (self.accessor)(replica, demand)
    }
}

impl fmt::Debug for BoundVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundVar")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .finish()
    }
}

/// Look up an attribute by name.
pub fn lookup(name: &str) -> Result<&'static VarDef> {
    REGISTRY
        .get(name)
        .ok_or_else(|| DetoxError::UnknownExpression(name.to_string()))
}

/// All registered attribute names, sorted.
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = REGISTRY.keys().copied().collect();
    names.sort_unstable();
    names
}

/// True if the replica is incomplete because of its own blocks.
///
/// A replica may be flagged incomplete only because of blocks outside the
/// scope being evaluated, so the block replicas are checked individually.
pub fn replica_incomplete(replica: &ReplicaRef<'_>) -> bool {
    !replica.replica.is_complete
        && replica
            .replica
            .block_replicas
            .iter()
            .any(|block| !block.is_complete)
}

pub fn replica_has_locked_block(replica: &ReplicaRef<'_>, demand: &Demand) -> bool {
    replica
        .replica
        .block_replicas
        .iter()
        .any(|block| demand.locked_blocks.contains(&block.block))
}

pub fn dataset_has_no_extra_copies(replica: &ReplicaRef<'_>, demand: &Demand) -> bool {
    replica.dataset.num_full_copies() <= demand.required_copies as usize
}

fn site_quota(partition: &str) -> Accessor {
    let partition = partition.to_string();
    Arc::new(move |replica: &ReplicaRef<'_>, _: &Demand| {
        Value::Number(replica.site.quota(&partition))
    })
}

fn site_used(partition: &str) -> Accessor {
    let partition = partition.to_string();
    Arc::new(move |replica: &ReplicaRef<'_>, _: &Demand| {
        Value::Number(replica.site.used(&partition))
    })
}

fn site_occupancy(partition: &str) -> Accessor {
    let partition = partition.to_string();
    Arc::new(move |replica: &ReplicaRef<'_>, _: &Demand| {
        Value::Number(replica.site.occupancy(&partition))
    })
}

lazy_static! {
    static ref REGISTRY: HashMap<&'static str, VarDef> = {
        use ValueType::*;

        let defs = vec![
            VarDef::global("dataset.name", Text, |r, _| Value::Text(r.dataset.name.clone())),
            VarDef::global("dataset.status", Numeric, |r, _| Value::Number(r.dataset.status.code()))
                .with_resolver(|v| DatasetStatus::from_symbol(v).map(|s| Value::Number(s.code()))),
            VarDef::global("dataset.on_tape", Numeric, |r, _| Value::Number(r.dataset.on_tape.code()))
                .with_resolver(|v| TapeCopy::from_symbol(v).map(|t| Value::Number(t.code()))),
            VarDef::global("dataset.last_update", Time, |r, _| Value::Time(r.dataset.last_update)),
            VarDef::global("dataset.has_no_extra_copies", Bool, |r, d| {
                Value::Bool(dataset_has_no_extra_copies(r, d))
            }),
            VarDef::global("dataset.usage_rank", Numeric, |_, d| Value::Number(d.global_usage_rank)),
            VarDef::global("dataset.num_full_copies", Numeric, |r, _| {
                Value::Number(r.dataset.num_full_copies() as f64)
            }),
            VarDef::global("site.name", Text, |r, _| Value::Text(r.site.name.clone())),
            VarDef::global("site.status", Numeric, |r, _| Value::Number(r.site.status.code()))
                .with_resolver(|v| SiteStatus::from_symbol(v).map(|s| Value::Number(s.code()))),
            VarDef::global("site.active", Numeric, |r, _| Value::Number(r.site.activity.code()))
                .with_resolver(|v| SiteActivity::from_symbol(v).map(|a| Value::Number(a.code()))),
            VarDef::partitioned("site.quota", Numeric, site_quota),
            VarDef::partitioned("site.used", Numeric, site_used),
            VarDef::partitioned("site.occupancy", Numeric, site_occupancy),
            VarDef::global("replica.incomplete", Bool, |r, _| Value::Bool(replica_incomplete(r))),
            VarDef::global("replica.is_custodial", Bool, |r, _| Value::Bool(r.replica.is_custodial)),
            VarDef::global("replica.is_partial", Bool, |r, _| Value::Bool(r.is_partial())),
            VarDef::global("replica.owner", Text, |r, _| {
                Value::Text(r.replica.group.clone().unwrap_or_default())
            }),
            VarDef::global("replica.last_block_created", Time, |r, _| {
                Value::Time(r.replica.last_block_created)
            }),
            VarDef::global("replica.num_access", Numeric, |r, _| Value::Number(r.num_access() as f64)),
            VarDef::global("replica.has_locked_block", Bool, |r, d| {
                Value::Bool(replica_has_locked_block(r, d))
            }),
        ];

        defs.into_iter().map(|def| (def.name, def)).collect()
    };
}
