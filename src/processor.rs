// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-entry processing.
//!
//! [`UpdateProcessor::process`] takes one queued entry from load to its final
//! disposition:
//!
//! ```text
//!   get(key) ──► decode ──► strip user-agent ──► resolve replicas
//!                                                      │
//!          ┌───────────────────────────────────────────┘
//!          ▼
//!   deliver to every node not yet in `successes` (concurrently)
//!          │
//!          ▼
//!   merge acks into `successes` (union, resolved-node order)
//!          │
//!          ├── all resolved nodes acked ──► delete(key)      → true
//!          ├── some new ack              ──► put(key, blob)  → false
//!          └── nothing new               ──► no write        → false
//! ```
//!
//! At most one queue write happens per call. Queue and decode errors
//! propagate; delivery failures never do.

use crate::delivery::DeliveryClient;
use crate::entry::PendingUpdate;
use crate::error::{Result, SweepError};
use crate::headers::USER_AGENT;
use crate::queue::QueueStore;
use crate::ring::ReplicaResolver;
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

/// Drives one entry through delivery and bookkeeping.
pub struct UpdateProcessor<R, D> {
    resolver: Arc<R>,
    delivery: Arc<D>,
}

impl<R, D> Clone for UpdateProcessor<R, D> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
            delivery: Arc::clone(&self.delivery),
        }
    }
}

impl<R: ReplicaResolver, D: DeliveryClient> UpdateProcessor<R, D> {
    pub fn new(resolver: Arc<R>, delivery: Arc<D>) -> Self {
        Self { resolver, delivery }
    }

    /// Process the entry stored under `key` in `store`.
    ///
    /// Returns `Ok(true)` when every resolved replica has acknowledged and
    /// the entry was deleted, `Ok(false)` when at least one replica is still
    /// outstanding.
    ///
    /// # Errors
    ///
    /// - [`SweepError::NotFound`] if the key is absent
    /// - [`SweepError::Corrupt`] if the blob does not decode
    /// - [`SweepError::Resolve`] if the resolver returns no replicas
    /// - any queue or resolver error, unchanged
    pub async fn process<S: QueueStore + ?Sized>(
        &self,
        location: &str,
        store: &S,
        key: &str,
    ) -> Result<bool> {
        let blob = store
            .get(key)
            .await?
            .ok_or_else(|| SweepError::NotFound { key: key.to_string() })?;
        let mut update = PendingUpdate::decode(key, &blob)?;

        // Only the outgoing copy loses the header; a re-save keeps the original.
        let mut headers = update.headers.clone();
        headers.remove(USER_AGENT);

        let replicas = self.resolver.resolve(&update.account, &update.container)?;
        // Vacuously "all acknowledged"; never unlink on that.
        if replicas.nodes.is_empty() {
            return Err(SweepError::Resolve(format!(
                "no replicas for /{}/{}",
                update.account, update.container
            )));
        }
        let path = update.object_path();

        let pending: Vec<_> = replicas
            .nodes
            .iter()
            .filter(|node| !update.is_acknowledged(node.id))
            .collect();

        let outcomes = join_all(pending.iter().map(|node| {
            self.delivery
                .deliver(node, replicas.partition, update.op, &path, &headers)
        }))
        .await;

        let mut any_new_success = false;
        for (node, outcome) in pending.iter().zip(outcomes) {
            if outcome.acknowledged {
                debug!(location = %location, key = %key, node = %node.address(), "Update sent");
                any_new_success |= update.record_success(node.id);
            } else {
                debug!(location = %location, key = %key, node = %node.address(), "Update failed");
            }
        }

        let fully_delivered = replicas
            .nodes
            .iter()
            .all(|node| update.is_acknowledged(node.id));

        crate::metrics::record_update_outcome(update.op.as_str(), fully_delivered);

        if fully_delivered {
            store.delete(key).await?;
            crate::metrics::record_unlink();
            debug!(location = %location, key = %key, path = %path, "Update fully delivered, unlinked");
            return Ok(true);
        }

        if any_new_success {
            store.put(key, update.encode()?).await?;
            debug!(
                location = %location,
                key = %key,
                acked = update.successes.len(),
                replicas = replicas.nodes.len(),
                "Saved partial progress"
            );
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryFuture, DeliveryOutcome};
    use crate::entry::{NodeId, UpdateOp};
    use crate::error::FailureKind;
    use crate::headers::HeaderMap;
    use crate::queue::SqliteQueueStore;
    use crate::ring::{ReplicaNode, ReplicaSet};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct FixedResolver(Vec<ReplicaNode>);

    impl ReplicaResolver for FixedResolver {
        fn resolve(&self, _account: &str, _container: &str) -> Result<ReplicaSet> {
            Ok(ReplicaSet {
                partition: 9,
                nodes: self.0.clone(),
            })
        }
    }

    /// Acks every node in `acking`; records every call.
    #[derive(Default)]
    struct Scripted {
        acking: Mutex<HashSet<NodeId>>,
        calls: Mutex<Vec<(NodeId, HeaderMap)>>,
    }

    impl Scripted {
        fn acking(ids: &[NodeId]) -> Self {
            Self {
                acking: Mutex::new(ids.iter().copied().collect()),
                ..Default::default()
            }
        }

        fn set_acking(&self, ids: &[NodeId]) {
            *self.acking.lock().unwrap() = ids.iter().copied().collect();
        }

        fn called_nodes(&self) -> Vec<NodeId> {
            self.calls.lock().unwrap().iter().map(|(id, _)| *id).collect()
        }

        fn clear_calls(&self) {
            self.calls.lock().unwrap().clear();
        }
    }

    impl DeliveryClient for Scripted {
        fn deliver<'a>(
            &'a self,
            node: &'a ReplicaNode,
            _partition: u32,
            _op: UpdateOp,
            _path: &'a str,
            headers: &'a HeaderMap,
        ) -> DeliveryFuture<'a> {
            Box::pin(async move {
                self.calls.lock().unwrap().push((node.id, headers.clone()));
                if self.acking.lock().unwrap().contains(&node.id) {
                    DeliveryOutcome::acked(node.id)
                } else {
                    DeliveryOutcome::failed(node.id)
                }
            })
        }
    }

    fn nodes(ids: &[NodeId]) -> Vec<ReplicaNode> {
        ids.iter()
            .map(|&id| ReplicaNode {
                id,
                ip: format!("10.0.0.{}", id),
                port: 6201,
                device: "sdb".to_string(),
            })
            .collect()
    }

    fn update() -> PendingUpdate {
        let headers: HeaderMap = [("User-Agent", "swift-client"), ("x-timestamp", "123")]
            .into_iter()
            .collect();
        PendingUpdate::new(UpdateOp::Put, "acct", "cont", "obj", headers)
    }

    async fn store_with(entry: &PendingUpdate) -> (tempfile::TempDir, SqliteQueueStore, String) {
        let dir = tempdir().unwrap();
        let store = SqliteQueueStore::create(dir.path().join("q.db"), false)
            .await
            .unwrap();
        let key = entry.queue_key("1700000000.00000");
        store.put(&key, entry.encode().unwrap()).await.unwrap();
        (dir, store, key)
    }

    async fn load(store: &SqliteQueueStore, key: &str) -> Option<PendingUpdate> {
        store
            .get(key)
            .await
            .unwrap()
            .map(|blob| PendingUpdate::decode(key, &blob).unwrap())
    }

    #[tokio::test]
    async fn test_partial_then_complete() {
        let (_dir, store, key) = store_with(&update()).await;
        let delivery = Arc::new(Scripted::acking(&[1, 3]));
        let processor = UpdateProcessor::new(Arc::new(FixedResolver(nodes(&[1, 2, 3]))), delivery.clone());

        assert!(!processor.process("loc", &store, &key).await.unwrap());
        assert_eq!(load(&store, &key).await.unwrap().successes, vec![1, 3]);

        delivery.set_acking(&[2]);
        delivery.clear_calls();
        assert!(processor.process("loc", &store, &key).await.unwrap());
        assert_eq!(delivery.called_nodes(), vec![2]);
        assert!(load(&store, &key).await.is_none());
    }

    #[tokio::test]
    async fn test_second_process_is_not_found() {
        let (_dir, store, key) = store_with(&update()).await;
        let processor = UpdateProcessor::new(
            Arc::new(FixedResolver(nodes(&[1, 2]))),
            Arc::new(Scripted::acking(&[1, 2])),
        );

        assert!(processor.process("loc", &store, &key).await.unwrap());
        let err = processor.process("loc", &store, &key).await.unwrap_err();
        assert!(matches!(err, SweepError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_user_agent_never_delivered_but_kept_on_resave() {
        let (_dir, store, key) = store_with(&update()).await;
        let delivery = Arc::new(Scripted::acking(&[1]));
        let processor = UpdateProcessor::new(Arc::new(FixedResolver(nodes(&[1, 2]))), delivery.clone());

        processor.process("loc", &store, &key).await.unwrap();

        for (_, headers) in delivery.calls.lock().unwrap().iter() {
            assert!(!headers.contains("user-agent"));
            assert_eq!(headers.get("X-Timestamp"), Some("123"));
        }
        let saved = load(&store, &key).await.unwrap();
        assert_eq!(saved.headers.get("user-agent"), Some("swift-client"));
    }

    #[tokio::test]
    async fn test_no_new_success_leaves_blob_untouched() {
        let mut entry = update();
        entry.record_success(1);
        let (_dir, store, key) = store_with(&entry).await;
        let before = store.get(&key).await.unwrap().unwrap();

        let delivery = Arc::new(Scripted::acking(&[]));
        let processor = UpdateProcessor::new(Arc::new(FixedResolver(nodes(&[1, 2, 3]))), delivery.clone());

        assert!(!processor.process("loc", &store, &key).await.unwrap());
        assert_eq!(delivery.called_nodes().len(), 2);
        assert!(!delivery.called_nodes().contains(&1));
        assert_eq!(store.get(&key).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_stale_successes_are_kept() {
        let mut entry = update();
        entry.record_success(99);
        let (_dir, store, key) = store_with(&entry).await;

        let processor = UpdateProcessor::new(
            Arc::new(FixedResolver(nodes(&[1, 2]))),
            Arc::new(Scripted::acking(&[1])),
        );
        assert!(!processor.process("loc", &store, &key).await.unwrap());
        assert_eq!(load(&store, &key).await.unwrap().successes, vec![99, 1]);
    }

    #[tokio::test]
    async fn test_corrupt_entry_propagates_and_stays_queued() {
        let dir = tempdir().unwrap();
        let store = SqliteQueueStore::create(dir.path().join("q.db"), false)
            .await
            .unwrap();
        store.put("async_pending.bad", vec![0xc1, 0x00]).await.unwrap();

        let delivery = Arc::new(Scripted::acking(&[1]));
        let processor = UpdateProcessor::new(Arc::new(FixedResolver(nodes(&[1]))), delivery.clone());

        let err = processor.process("loc", &store, "async_pending.bad").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Corrupt);
        assert!(delivery.called_nodes().is_empty());
        assert!(store.get("async_pending.bad").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empty_replica_set_keeps_entry() {
        let (_dir, store, key) = store_with(&update()).await;
        let delivery = Arc::new(Scripted::acking(&[1]));
        let processor = UpdateProcessor::new(Arc::new(FixedResolver(Vec::new())), delivery.clone());

        let err = processor.process("loc", &store, &key).await.unwrap_err();
        assert!(matches!(err, SweepError::Resolve(_)));
        assert!(delivery.called_nodes().is_empty());
        assert!(load(&store, &key).await.is_some());
    }
}
