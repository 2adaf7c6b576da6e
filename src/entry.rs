// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pending update entries and their on-disk encoding.
//!
//! A pending update is written by the object server when a container listing
//! update could not be fanned out synchronously. It is stored as a MessagePack
//! map so that writers in any language can produce it:
//!
//! ```text
//! {
//!   "op":        "PUT" | "DELETE",
//!   "account":   "AUTH_test",
//!   "container": "photos",
//!   "obj":       "2024/cat.jpg",
//!   "headers":   { "X-Timestamp": "...", "X-Etag": "...", "User-Agent": "..." },
//!   "successes": [3, 7]          # optional, node ids that acknowledged
//! }
//! ```
//!
//! `successes` only ever grows. Order is preserved through encode/decode so a
//! re-saved entry is byte-stable when nothing changed. Keys this crate does
//! not model are carried in [`PendingUpdate::extra`] and written back on
//! every re-save.

use crate::error::{Result, SweepError};
use crate::headers::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lower bound (inclusive) of the pending-update key namespace.
pub const ASYNC_PENDING_START: &str = "async_pending";

/// Upper bound (exclusive) of the pending-update key namespace.
pub const ASYNC_PENDING_END: &str = "async_pending/";

/// Identifier of a replica node in the container ring.
pub type NodeId = u64;

/// Kind of container listing update to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateOp {
    #[serde(rename = "PUT")]
    Put,
    #[serde(rename = "DELETE")]
    Delete,
}

impl UpdateOp {
    /// HTTP verb used to deliver this update.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateOp::Put => "PUT",
            UpdateOp::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for UpdateOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued container update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub op: UpdateOp,
    pub account: String,
    pub container: String,
    pub obj: String,
    #[serde(default)]
    pub headers: HeaderMap,
    /// Nodes that already acknowledged this update. Never shrinks.
    #[serde(default)]
    pub successes: Vec<NodeId>,
    /// Any other fields the writer stored, kept as-is.
    #[serde(flatten)]
    pub extra: BTreeMap<String, rmpv::Value>,
}

impl PendingUpdate {
    /// Create an update with no acknowledgments yet.
    pub fn new(
        op: UpdateOp,
        account: impl Into<String>,
        container: impl Into<String>,
        obj: impl Into<String>,
        headers: HeaderMap,
    ) -> Self {
        Self {
            op,
            account: account.into(),
            container: container.into(),
            obj: obj.into(),
            headers,
            successes: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Canonical object path, `/{account}/{container}/{obj}`.
    pub fn object_path(&self) -> String {
        format!("/{}/{}/{}", self.account, self.container, self.obj)
    }

    /// Whether `node_id` has already acknowledged this update.
    pub fn is_acknowledged(&self, node_id: NodeId) -> bool {
        self.successes.contains(&node_id)
    }

    /// Record an acknowledgment. Returns `false` if it was already recorded.
    pub fn record_success(&mut self, node_id: NodeId) -> bool {
        if self.is_acknowledged(node_id) {
            return false;
        }
        self.successes.push(node_id);
        true
    }

    /// Encode as a MessagePack map.
    pub fn encode(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(self)
            .map_err(|e| SweepError::Internal(format!("Failed to encode pending update: {}", e)))
    }

    /// Decode a queue blob. `key` is only used for error context.
    pub fn decode(key: &str, blob: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(blob).map_err(|e| SweepError::corrupt(key, e.to_string()))
    }

    /// Queue key for this update written at `timestamp`.
    ///
    /// Keys sort inside [`ASYNC_PENDING_START`, `ASYNC_PENDING_END`) and group
    /// updates for the same object together.
    pub fn queue_key(&self, timestamp: &str) -> String {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest(self.object_path().as_bytes());
        format!("{}.{}.{}", ASYNC_PENDING_START, hex::encode(hash), timestamp)
    }
}

/// Smallest key strictly greater than `key`.
///
/// Used to resume an inclusive range scan right after the last key seen.
pub fn key_successor(key: &str) -> String {
    let mut next = String::with_capacity(key.len() + 1);
    next.push_str(key);
    next.push('\0');
    next
}
