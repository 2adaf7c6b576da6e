//! In-memory QueueStore / QueueConnector for testing.
//!
//! Records writes so tests can assert "at most one queue write per entry".
//! Locations can be marked unavailable, and stores can be told to fail scans
//! or writes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use update_sweeper::queue::BoxFuture;
use update_sweeper::{PendingUpdate, QueueConnector, QueueStore, SweepError};

/// Ordered key-value queue held in memory.
#[derive(Default)]
pub struct MemoryQueueStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    puts: AtomicUsize,
    deletes: AtomicUsize,
    fail_scans: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an encoded update under its queue key. Returns the key.
    pub async fn insert_update(&self, update: &PendingUpdate, timestamp: &str) -> String {
        let key = update.queue_key(timestamp);
        self.entries
            .write()
            .await
            .insert(key.clone(), update.encode().unwrap());
        key
    }

    /// Store a raw blob without counting it as a write.
    pub async fn insert_raw(&self, key: &str, blob: Vec<u8>) {
        self.entries.write().await.insert(key.to_string(), blob);
    }

    pub async fn load(&self, key: &str) -> Option<PendingUpdate> {
        self.entries
            .read()
            .await
            .get(key)
            .map(|blob| PendingUpdate::decode(key, blob).unwrap())
    }

    pub async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Make every range scan fail with an unexpected queue error.
    pub fn fail_scans(&self, fail: bool) {
        self.fail_scans.store(fail, Ordering::SeqCst);
    }

    /// Make every put and delete fail without touching the entries.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_write(&self) -> update_sweeper::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SweepError::Internal("write failed".to_string()));
        }
        Ok(())
    }
}

impl QueueStore for MemoryQueueStore {
    fn range_keys<'a>(
        &'a self,
        start: &'a str,
        end: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            if self.fail_scans.load(Ordering::SeqCst) {
                return Err(SweepError::Internal("scan failed".to_string()));
            }
            Ok(self
                .entries
                .read()
                .await
                .range(start.to_string()..end.to_string())
                .take(limit)
                .map(|(k, _)| k.clone())
                .collect())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move { Ok(self.entries.read().await.get(key).cloned()) })
    }

    fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.check_write()?;
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.entries.write().await.insert(key.to_string(), value);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.check_write()?;
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.entries.write().await.remove(key);
            Ok(())
        })
    }
}

/// Connector over a fixed set of in-memory stores.
///
/// A location that was never added, or that was marked unavailable, fails to
/// connect with `SweepError::Unavailable`.
#[derive(Default)]
pub struct MemoryConnector {
    stores: RwLock<HashMap<String, Arc<MemoryQueueStore>>>,
    unavailable: RwLock<HashSet<String>>,
    connects: RwLock<Vec<String>>,
    closed: AtomicBool,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or fetch) the store of `location`.
    pub async fn store(&self, location: &str) -> Arc<MemoryQueueStore> {
        Arc::clone(
            self.stores
                .write()
                .await
                .entry(location.to_string())
                .or_default(),
        )
    }

    pub async fn set_unavailable(&self, location: &str) {
        self.unavailable.write().await.insert(location.to_string());
    }

    /// Every location passed to `connect`, in call order.
    pub async fn connects(&self) -> Vec<String> {
        self.connects.read().await.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl QueueConnector for MemoryConnector {
    type Store = MemoryQueueStore;

    fn connect<'a>(&'a self, location: &'a str) -> BoxFuture<'a, Arc<MemoryQueueStore>> {
        Box::pin(async move {
            self.connects.write().await.push(location.to_string());
            if self.unavailable.read().await.contains(location) {
                return Err(SweepError::unavailable(location, "connection refused"));
            }
            self.stores
                .read()
                .await
                .get(location)
                .cloned()
                .ok_or_else(|| SweepError::unavailable(location, "no such location"))
        })
    }

    fn close_all(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
        })
    }
}
