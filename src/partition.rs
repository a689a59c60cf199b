//! Static mapping from instance identity to bus partition.
//!
//! Each service instance pins its writes to one partition so a single
//! consumer sees that instance's events in order. The table is a topology
//! decision made by the operator; identities must be unique across the
//! fleet.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

use crate::config::ConfigurationError;

/// Partition used for identities missing from the table.
pub const DEFAULT_PARTITION: i32 = 0;

/// What `assign` does with an identity that has no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedPolicy {
    /// Fall back to the default partition and log a warning.
    #[default]
    Warn,
    /// Fall back to the default partition quietly.
    Silent,
    /// Refuse to start.
    Reject,
}

/// Pure lookup from instance identity to partition index.
#[derive(Debug, Clone)]
pub struct PartitionAssigner {
    table: HashMap<String, i32>,
    default_partition: i32,
    policy: UnmappedPolicy,
}

impl PartitionAssigner {
    pub fn new(table: HashMap<String, i32>) -> Self {
        Self {
            table,
            default_partition: DEFAULT_PARTITION,
            policy: UnmappedPolicy::default(),
        }
    }

    /// Three-instance fleet: `service-a-1` → 0, `service-a-2` → 1, `service-a-3` → 2.
    pub fn fleet_default() -> Self {
        Self::new(fleet_table())
    }

    pub fn with_default(mut self, partition: i32) -> Self {
        self.default_partition = partition;
        self
    }

    pub fn with_policy(mut self, policy: UnmappedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn default_partition(&self) -> i32 {
        self.default_partition
    }

    /// The table entry for `identity`, if any.
    pub fn lookup(&self, identity: &str) -> Option<i32> {
        self.table.get(identity).copied()
    }

    /// Partition for `identity`, applying the unmapped policy.
    pub fn assign(&self, identity: &str) -> Result<i32, ConfigurationError> {
        if let Some(partition) = self.lookup(identity) {
            return Ok(partition);
        }
        match self.policy {
            UnmappedPolicy::Reject => Err(ConfigurationError::UnmappedIdentity(identity.to_string())),
            UnmappedPolicy::Warn => {
                warn!(
                    identity,
                    partition = self.default_partition,
                    "instance identity not in partition table, using default partition"
                );
                Ok(self.default_partition)
            }
            UnmappedPolicy::Silent => Ok(self.default_partition),
        }
    }

    /// Reject negative partitions in the table or the default.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.default_partition < 0 {
            return Err(ConfigurationError::NegativePartition {
                identity: "<default>".to_string(),
                partition: self.default_partition,
            });
        }
        for (identity, partition) in &self.table {
            if *partition < 0 {
                return Err(ConfigurationError::NegativePartition {
                    identity: identity.clone(),
                    partition: *partition,
                });
            }
        }
        Ok(())
    }
}

/// Identity table for the three-instance fleet.
pub fn fleet_table() -> HashMap<String, i32> {
    [("service-a-1", 0), ("service-a-2", 1), ("service-a-3", 2)]
        .into_iter()
        .map(|(name, p)| (name.to_string(), p))
        .collect()
}

/// The host identifier of this process, as reported by the OS.
pub fn local_identity() -> Result<String, ConfigurationError> {
    let name = hostname::get()
        .map_err(|e| ConfigurationError::Identity(e.to_string()))?
        .into_string()
        .map_err(|raw| ConfigurationError::Identity(format!("hostname {:?} is not UTF-8", raw)))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ConfigurationError::Identity("hostname is empty".to_string()));
    }
    Ok(name.to_string())
}
