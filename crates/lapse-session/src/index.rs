//! Authoritative expiration timestamps.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock;
use crate::id::SessionId;

/// Current expiration of every live session.
///
/// This is the ground truth the reclaimer consults; bucket membership only
/// tells it where to look.
#[derive(Debug, Default)]
pub struct ExpirationIndex {
    expirations: HashMap<SessionId, DateTime<Utc>>,
}

impl ExpirationIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the expiration of a session, replacing any previous one.
    pub fn set(&mut self, id: SessionId, expires_at: DateTime<Utc>) {
        self.expirations.insert(id, expires_at);
    }

    /// Current expiration of a session.
    pub fn get(&self, id: &SessionId) -> Option<DateTime<Utc>> {
        self.expirations.get(id).copied()
    }

    /// Forget a session.
    pub fn remove(&mut self, id: &SessionId) -> Option<DateTime<Utc>> {
        self.expirations.remove(id)
    }

    /// Whether the session is tracked and due at `now`.
    ///
    /// An expiration within `tolerance` after `now` counts as due. Untracked
    /// sessions are never due; they are already gone.
    pub fn is_due(&self, id: &SessionId, now: DateTime<Utc>, tolerance: Duration) -> bool {
        self.expirations
            .get(id)
            .is_some_and(|expires_at| clock::sub(*expires_at, tolerance) <= now)
    }

    /// Iterate all tracked sessions.
    pub fn iter(&self) -> impl Iterator<Item = (&SessionId, &DateTime<Utc>)> {
        self.expirations.iter()
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.expirations.len()
    }

    /// Check if no session is tracked.
    pub fn is_empty(&self) -> bool {
        self.expirations.is_empty()
    }
}
