//! # Update Sweeper
//!
//! Delivers queued container-listing updates to replica nodes.
//!
//! ## Architecture
//!
//! When an object write cannot update every container replica synchronously,
//! the object server queues a pending update on the storage location that
//! took the write. The sweeper drains those queues:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                             update-sweeper                               │
//! │                                                                          │
//! │  ┌──────────────┐    ┌─────────────┐    ┌─────────────────────────────┐  │
//! │  │ Sweep loop   │───►│ SweepDriver │───►│ UpdateProcessor             │  │
//! │  │ (ticker +    │    │ (per        │    │ get → resolve → deliver →   │  │
//! │  │  jitter)     │    │  location)  │    │ delete | put | no-op        │  │
//! │  └──────────────┘    └─────────────┘    └─────────────────────────────┘  │
//! │                             │                    │            │          │
//! │                             ▼                    ▼            ▼          │
//! │                    ┌─────────────────┐  ┌──────────────┐ ┌───────────┐   │
//! │                    │ QueueStore      │  │ Replica      │ │ Delivery  │   │
//! │                    │ (SQLite / loc.) │  │ Resolver     │ │ Client    │   │
//! │                    └─────────────────┘  └──────────────┘ └───────────┘   │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entry records which replicas already acknowledged it, so a node is
//! contacted again only until it says yes. The entry is deleted once every
//! replica has.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use update_sweeper::{
//!     HttpDeliveryClient, SqliteQueueConnector, StaticRing, SweeperConfig, UpdateSweeper,
//! };
//!
//! #[tokio::main]
//! async fn main() -> update_sweeper::Result<()> {
//!     let config = SweeperConfig::from_file("/etc/update-sweeper/config.toml")?;
//!     let ring = StaticRing::new(&config.container_ring)?;
//!     let delivery = HttpDeliveryClient::new(
//!         config.conn_timeout_duration(),
//!         config.node_timeout_duration(),
//!     )?;
//!     let connector = SqliteQueueConnector::new(&config.queue.root_dir, config.queue.wal_mode);
//!
//!     let mut sweeper = UpdateSweeper::new(
//!         config,
//!         Arc::new(connector),
//!         Arc::new(ring),
//!         Arc::new(delivery),
//!     );
//!     sweeper.start().await?;
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     sweeper.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod delivery;
pub mod entry;
pub mod error;
pub mod headers;
pub mod metrics;
pub mod processor;
pub mod queue;
pub mod recon;
pub mod resilience;
pub mod ring;
pub mod stats;
pub mod sweeper;

// Re-exports for convenience
pub use config::{PolicyConfig, QueueConfig, RingConfig, SweeperConfig};
pub use delivery::{DeliveryClient, DeliveryOutcome, HttpDeliveryClient};
pub use entry::{NodeId, PendingUpdate, UpdateOp};
pub use error::{FailureKind, Result, SweepError};
pub use headers::HeaderMap;
pub use processor::UpdateProcessor;
pub use queue::{QueueConnector, QueueStore, SqliteQueueConnector, SqliteQueueStore};
pub use ring::{ReplicaNode, ReplicaResolver, ReplicaSet, StaticRing};
pub use stats::SweepStats;
pub use sweeper::{SweepDriver, SweeperState, UpdateSweeper};
