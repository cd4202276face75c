//! In-memory session store with bounded-latency TTL expiration.
//!
//! This crate provides a session registry that:
//! - Hands out unguessable session identifiers
//! - Replaces a session's payload wholesale on update and restarts its TTL
//! - Never extends a session's life on reads
//! - Reclaims stale sessions in the background, between `ttl` and
//!   [`StoreConfig::deletion_deadline`] after their last update
//!
//! Expirations are filed into one-second buckets so a sweep only touches the
//! sessions that are due, independent of how many are live. Bucket
//! membership may be stale; the expiration index is always re-checked
//! before a session is deleted.
//!
//! # Example
//!
//! ```rust,ignore
//! use lapse_session::{SessionStore, StoreConfig};
//!
//! let store: SessionStore = SessionStore::new(
//!     StoreConfig::default().with_ttl(Duration::from_secs(300)),
//! )?;
//!
//! let id = store.create().await?;
//! store.update(&id, data).await?;
//! let data = store.get(&id).await?;
//! ```

mod bucket;
mod clock;
mod config;
mod error;
mod id;
mod index;
mod reclaimer;
mod store;

pub use bucket::{BucketKey, ExpirationBuckets};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    BUCKET_WIDTH, DEFAULT_BOUNDARY_TOLERANCE, DEFAULT_MAX_ID_ATTEMPTS, DEFAULT_SWEEP_INTERVAL,
    DEFAULT_TTL, StoreConfig,
};
pub use error::{Error, Result};
pub use id::{ID_ENTROPY_BYTES, IdSource, OsRandomIds, SessionId};
pub use index::ExpirationIndex;
pub use store::{AuditReport, Data, Payload, Session, SessionStore, StoreStats, SweepReport};
