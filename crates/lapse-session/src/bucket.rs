//! Second-resolution expiration buckets.
//!
//! Buckets group session identifiers by the whole epoch second in which
//! they are expected to expire, so a sweep only has to look at the
//! sessions that are due rather than every live session. Membership is a
//! hint: an identifier stays in an old bucket after its session is renewed,
//! and the sweep re-checks the authoritative expiration before deleting.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::id::SessionId;

/// Whole epoch second identifying a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey(i64);

impl BucketKey {
    /// Bucket key from a raw epoch second.
    pub fn from_epoch_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Bucket a session expiring at `expires_at` is filed under.
    ///
    /// Rounds up, so every member of a bucket is due once the clock has
    /// reached the bucket's second.
    pub fn for_expiration(expires_at: DateTime<Utc>) -> Self {
        let secs = expires_at.timestamp();
        if expires_at.timestamp_subsec_nanos() > 0 {
            Self(secs.saturating_add(1))
        } else {
            Self(secs)
        }
    }

    /// Latest bucket a sweep running at `now` is responsible for.
    pub fn for_sweep(now: DateTime<Utc>) -> Self {
        Self(now.timestamp())
    }

    /// The following bucket.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Epoch second of this bucket.
    pub fn epoch_secs(self) -> i64 {
        self.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mapping from bucket key to the identifiers filed under it.
#[derive(Debug, Default)]
pub struct ExpirationBuckets {
    buckets: BTreeMap<BucketKey, Vec<SessionId>>,
}

impl ExpirationBuckets {
    /// Create an empty set of buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// File `id` under `key`. Earlier memberships are left untouched.
    pub fn file(&mut self, key: BucketKey, id: SessionId) {
        self.buckets.entry(key).or_default().push(id);
    }

    /// Iterate identifiers in every bucket up to and including `through`.
    pub fn due(&self, through: BucketKey) -> impl Iterator<Item = &SessionId> {
        self.buckets
            .range(..=through)
            .flat_map(|(_, ids)| ids.iter())
    }

    /// Remove every bucket up to and including `through`, returning them
    /// in key order.
    pub fn drain_through(&mut self, through: BucketKey) -> Vec<(BucketKey, Vec<SessionId>)> {
        let later = match through.epoch_secs().checked_add(1) {
            Some(next) => self.buckets.split_off(&BucketKey(next)),
            None => BTreeMap::new(),
        };
        std::mem::replace(&mut self.buckets, later)
            .into_iter()
            .collect()
    }

    /// Whether `id` is filed in any bucket at or after `from`.
    pub fn covers(&self, id: &SessionId, from: BucketKey) -> bool {
        self.buckets
            .range(from..)
            .any(|(_, ids)| ids.contains(id))
    }

    /// Number of non-empty buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Check if no bucket exists.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total number of memberships across all buckets, stale ones included.
    pub fn entries(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}
