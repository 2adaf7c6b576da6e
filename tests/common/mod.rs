//! Shared test utilities for integration and property tests.
//!
//! This module provides:
//! - In-memory queue store and connector with injectable failures
//! - Scripted delivery client recording every call
//! - Fixed replica resolver and entry helpers

#![allow(dead_code)]

pub mod memory_queue;
pub mod mock_delivery;

pub use memory_queue::*;
pub use mock_delivery::*;

use update_sweeper::{HeaderMap, NodeId, PendingUpdate, ReplicaNode, UpdateOp};

/// A replica node with a predictable address.
pub fn node(id: NodeId) -> ReplicaNode {
    ReplicaNode {
        id,
        ip: format!("10.0.0.{}", id),
        port: 6201,
        device: "sdb".to_string(),
    }
}

/// Nodes for every id, in order.
pub fn nodes(ids: &[NodeId]) -> Vec<ReplicaNode> {
    ids.iter().copied().map(node).collect()
}

/// A PUT update for `acct/cont/<obj>` with a user-agent and a timestamp header.
pub fn put_update(obj: &str) -> PendingUpdate {
    let headers: HeaderMap = [("user-agent", "swift-client"), ("x-timestamp", "123")]
        .into_iter()
        .collect();
    PendingUpdate::new(UpdateOp::Put, "acct", "cont", obj, headers)
}
