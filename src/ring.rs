//! Replica resolution and location discovery.
//!
//! The container ring maps an `(account, container)` collection to a
//! partition and the ordered replica nodes that hold its listing.
//! [`StaticRing`] is a config-driven ring: deterministic, no rebalancing.
//!
//! # Placement
//!
//! ```text
//! digest    = sha256(prefix + "/" + account + "/" + container + suffix)
//! partition = u32_be(digest[0..4]) >> (32 - part_power)
//! replicas  = nodes[(partition + r) % n]   for r in 0..replicas
//! ```

use crate::config::{PolicyConfig, RingConfig};
use crate::entry::NodeId;
use crate::error::{Result, SweepError};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One replica node in the container ring.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaNode {
    pub id: NodeId,
    pub ip: String,
    pub port: u16,
    pub device: String,
}

impl ReplicaNode {
    /// `ip:port/device`, for logs.
    pub fn address(&self) -> String {
        format!("{}:{}/{}", self.ip, self.port, self.device)
    }
}

/// Resolved placement of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSet {
    pub partition: u32,
    pub nodes: Vec<ReplicaNode>,
}

/// Maps a collection to its partition and ordered replica nodes.
pub trait ReplicaResolver: Send + Sync + 'static {
    fn resolve(&self, account: &str, container: &str) -> Result<ReplicaSet>;
}

/// Container ring built from configuration.
#[derive(Debug, Clone)]
pub struct StaticRing {
    part_shift: u32,
    replicas: usize,
    hash_path_prefix: String,
    hash_path_suffix: String,
    nodes: Vec<ReplicaNode>,
}

impl StaticRing {
    pub fn new(config: &RingConfig) -> Result<Self> {
        if config.part_power > 32 {
            return Err(SweepError::Config(format!(
                "part_power must be at most 32, got {}",
                config.part_power
            )));
        }
        if config.replicas == 0 {
            return Err(SweepError::Config("ring must have at least one replica".to_string()));
        }
        // An empty ring loads; every resolve then fails.
        if !config.nodes.is_empty() && config.replicas > config.nodes.len() {
            return Err(SweepError::Config(format!(
                "ring has {} replicas but only {} nodes",
                config.replicas,
                config.nodes.len()
            )));
        }
        let unique: BTreeSet<NodeId> = config.nodes.iter().map(|n| n.id).collect();
        if unique.len() != config.nodes.len() {
            return Err(SweepError::Config("ring node ids must be unique".to_string()));
        }

        Ok(Self {
            part_shift: 32 - u32::from(config.part_power),
            replicas: config.replicas,
            hash_path_prefix: config.hash_path_prefix.clone(),
            hash_path_suffix: config.hash_path_suffix.clone(),
            nodes: config.nodes.clone(),
        })
    }

    /// Partition for a collection.
    pub fn partition(&self, account: &str, container: &str) -> u32 {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.hash_path_prefix.as_bytes());
        hasher.update(format!("/{}/{}", account, container).as_bytes());
        hasher.update(self.hash_path_suffix.as_bytes());
        let digest = hasher.finalize();
        let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        // part_shift == 32 means a single partition
        head.checked_shr(self.part_shift).unwrap_or(0)
    }

    pub fn replica_count(&self) -> usize {
        self.replicas
    }

    pub fn nodes(&self) -> &[ReplicaNode] {
        &self.nodes
    }
}

impl ReplicaResolver for StaticRing {
    fn resolve(&self, account: &str, container: &str) -> Result<ReplicaSet> {
        if self.nodes.is_empty() {
            return Err(SweepError::Resolve("container ring has no nodes".to_string()));
        }
        let partition = self.partition(account, container);
        let start = partition as usize % self.nodes.len();
        let nodes = (0..self.replicas)
            .map(|r| self.nodes[(start + r) % self.nodes.len()].clone())
            .collect();
        Ok(ReplicaSet { partition, nodes })
    }
}

/// Every location owned by this process across all policies.
///
/// Sorted and de-duplicated so each sweep visits locations in the same order.
pub fn policy_locations(policies: &[PolicyConfig]) -> Vec<String> {
    policies
        .iter()
        .flat_map(|policy| policy.devices.iter())
        .filter(|device| !device.trim().is_empty())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Locations to sweep: the override list if non-empty, otherwise every policy location.
///
/// The override keeps its given order, minus duplicates and blanks.
pub fn sweep_locations(overrides: &[String], policies: &[PolicyConfig]) -> Vec<String> {
    let overrides: IndexSet<String> = overrides
        .iter()
        .map(|d| d.trim())
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect();
    if overrides.is_empty() {
        policy_locations(policies)
    } else {
        overrides.into_iter().collect()
    }
}
