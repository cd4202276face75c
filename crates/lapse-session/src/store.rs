//! Session store with bucketed TTL expiration.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use crate::bucket::{BucketKey, ExpirationBuckets};
use crate::clock::{self, Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::id::{IdSource, OsRandomIds, SessionId};
use crate::index::ExpirationIndex;
use crate::reclaimer::Reclaimer;

/// Default session payload: string keys to arbitrary JSON values.
pub type Data = serde_json::Map<String, serde_json::Value>;

/// Values that can be stored as a session payload.
///
/// New sessions start with `Default::default()`.
pub trait Payload: Clone + Default + Send + Sync + 'static {}

impl<T: Clone + Default + Send + Sync + 'static> Payload for T {}

/// A live session record.
#[derive(Debug, Clone)]
pub struct Session<T> {
    /// Application payload, replaced wholesale on update.
    pub data: T,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// When the payload was last replaced.
    pub updated_at: DateTime<Utc>,
}

impl<T> Session<T> {
    fn new(data: T, now: DateTime<Utc>) -> Self {
        Self {
            data,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Sessions, their expirations and the buckets pointing at them.
///
/// Always mutated as one unit under the store's write lock.
struct Registry<T> {
    sessions: HashMap<SessionId, Session<T>>,
    index: ExpirationIndex,
    buckets: ExpirationBuckets,
}

impl<T> Registry<T> {
    fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            index: ExpirationIndex::new(),
            buckets: ExpirationBuckets::new(),
        }
    }

    /// Record a fresh expiration and file the session under its bucket.
    fn schedule(&mut self, id: &SessionId, expires_at: DateTime<Utc>) -> BucketKey {
        let key = BucketKey::for_expiration(expires_at);
        self.index.set(id.clone(), expires_at);
        self.buckets.file(key, id.clone());
        key
    }

    /// Sessions filed in buckets up to `through` that are due at `now`.
    fn candidates(
        &self,
        through: BucketKey,
        now: DateTime<Utc>,
        tolerance: Duration,
    ) -> Vec<SessionId> {
        let mut seen = HashSet::new();
        self.buckets
            .due(through)
            .filter(|id| self.index.is_due(id, now, tolerance))
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect()
    }

    /// Delete the candidates that are still due and drop every bucket up to
    /// `through`.
    fn reclaim(
        &mut self,
        candidates: &[SessionId],
        through: BucketKey,
        now: DateTime<Utc>,
        tolerance: Duration,
    ) -> SweepReport {
        let mut removed = 0;
        for id in candidates {
            // Renewed since the candidate was collected.
            if !self.index.is_due(id, now, tolerance) {
                trace!(session_id = %id, "Session renewed during sweep, keeping");
                continue;
            }
            self.index.remove(id);
            if self.sessions.remove(id).is_some() {
                removed += 1;
                trace!(session_id = %id, "Reclaimed expired session");
            }
        }

        let drained = self.buckets.drain_through(through);
        let buckets = drained.len();

        // A live session whose own bucket was just dropped must not be left
        // without one; hand it to the next sweep.
        let mut carried = HashSet::new();
        for id in drained.into_iter().flat_map(|(_, ids)| ids) {
            if let Some(expires_at) = self.index.get(&id)
                && BucketKey::for_expiration(expires_at) <= through
                && carried.insert(id.clone())
            {
                self.buckets.file(through.next(), id);
            }
        }

        SweepReport {
            swept_through: through,
            buckets,
            candidates: candidates.len(),
            removed,
            carried_over: carried.len(),
        }
    }
}

/// State shared between store handles and the reclaimer task.
pub(crate) struct Shared<T> {
    registry: RwLock<Registry<T>>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
}

impl<T: Payload> Shared<T> {
    pub(crate) fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Run one sweep cycle.
    ///
    /// Candidates are collected under the read lock, then confirmed and
    /// deleted under the write lock. The lock is released in between, so
    /// every candidate is checked against the index again before deletion.
    pub(crate) async fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let through = BucketKey::for_sweep(now);
        let tolerance = self.config.boundary_tolerance;

        let candidates = self
            .registry
            .read()
            .await
            .candidates(through, now, tolerance);

        let mut registry = self.registry.write().await;
        let report = registry.reclaim(&candidates, through, now, tolerance);

        if report.removed > 0 || report.carried_over > 0 {
            debug!(
                swept_through = %through,
                buckets = report.buckets,
                removed = report.removed,
                carried_over = report.carried_over,
                remaining = registry.sessions.len(),
                "Reclaimed expired sessions"
            );
        } else {
            trace!(
                swept_through = %through,
                buckets = report.buckets,
                "Sweep found nothing to reclaim"
            );
        }

        report
    }
}

/// In-memory session store with background TTL reclamation.
///
/// This store provides:
/// - Unguessable session identifiers
/// - Reads that never extend a session's life
/// - Updates that replace the payload and restart the TTL
/// - A reclaimer that removes sessions between `ttl` and
///   [`StoreConfig::deletion_deadline`] after their last update
///
/// Handles are cheap to clone and share the same sessions. The reclaimer
/// stops on [`SessionStore::shutdown`] or once the last handle is dropped.
pub struct SessionStore<T: Payload = Data> {
    shared: Arc<Shared<T>>,
    reclaimer: Option<Arc<Reclaimer>>,
}

impl<T: Payload> SessionStore<T> {
    /// Create a store reading the system clock.
    ///
    /// Spawns the reclaimer on the current tokio runtime when
    /// `config.reclaimer_enabled` is set.
    pub fn new(config: StoreConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a store reading time from `clock`.
    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_sources(config, clock, Arc::new(OsRandomIds))
    }

    /// Create a store with an explicit clock and identifier source.
    pub fn with_sources(
        config: StoreConfig,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdSource>,
    ) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            registry: RwLock::new(Registry::new()),
            config,
            clock,
            ids,
        });

        let reclaimer = if shared.config.reclaimer_enabled {
            Some(Arc::new(Reclaimer::spawn(Arc::clone(&shared))?))
        } else {
            None
        };

        Ok(Self { shared, reclaimer })
    }

    /// Get the store configuration.
    pub fn config(&self) -> &StoreConfig {
        self.shared.config()
    }

    /// Create an empty session and return its identifier.
    pub async fn create(&self) -> Result<SessionId> {
        let mut registry = self.shared.registry.write().await;

        let id = self.fresh_id(&registry)?;
        let now = self.shared.clock.now();
        let expires_at = clock::add(now, self.shared.config.ttl);

        registry
            .sessions
            .insert(id.clone(), Session::new(T::default(), now));
        let bucket = registry.schedule(&id, expires_at);

        debug!(
            session_id = %id,
            expires_at = %expires_at,
            bucket = %bucket,
            live = registry.sessions.len(),
            "Session created"
        );

        Ok(id)
    }

    /// Get a copy of a session's payload.
    ///
    /// Reading does not extend the session's life.
    pub async fn get(&self, id: &SessionId) -> Result<T> {
        let registry = self.shared.registry.read().await;
        match registry.sessions.get(id) {
            Some(session) => {
                trace!(session_id = %id, "Session found");
                Ok(session.data.clone())
            }
            None => Err(Error::SessionNotFound(id.clone())),
        }
    }

    /// Get a copy of the full session record, timestamps included.
    pub async fn get_session(&self, id: &SessionId) -> Result<Session<T>> {
        let registry = self.shared.registry.read().await;
        registry
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(id.clone()))
    }

    /// Replace a session's payload and restart its TTL.
    pub async fn update(&self, id: &SessionId, data: T) -> Result<()> {
        let mut registry = self.shared.registry.write().await;
        let now = self.shared.clock.now();

        match registry.sessions.get_mut(id) {
            Some(session) => {
                session.data = data;
                session.updated_at = now;
            }
            None => return Err(Error::SessionNotFound(id.clone())),
        }

        let expires_at = clock::add(now, self.shared.config.ttl);
        let bucket = registry.schedule(id, expires_at);

        debug!(
            session_id = %id,
            expires_at = %expires_at,
            bucket = %bucket,
            "Session updated"
        );

        Ok(())
    }

    /// Authoritative expiration of a session.
    pub async fn expires_at(&self, id: &SessionId) -> Result<DateTime<Utc>> {
        let registry = self.shared.registry.read().await;
        if !registry.sessions.contains_key(id) {
            return Err(Error::SessionNotFound(id.clone()));
        }
        registry
            .index
            .get(id)
            .ok_or_else(|| Error::SessionNotFound(id.clone()))
    }

    /// Check if a session is live.
    pub async fn contains(&self, id: &SessionId) -> bool {
        self.shared.registry.read().await.sessions.contains_key(id)
    }

    /// Get the number of live sessions.
    pub async fn len(&self) -> usize {
        self.shared.registry.read().await.sessions.len()
    }

    /// Check if the store holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.shared.registry.read().await.sessions.is_empty()
    }

    /// Run one sweep cycle now, independent of the reclaimer's schedule.
    pub async fn sweep(&self) -> SweepReport {
        self.shared.sweep().await
    }

    /// Get store statistics.
    pub async fn stats(&self) -> StoreStats {
        let registry = self.shared.registry.read().await;
        StoreStats {
            sessions: registry.sessions.len(),
            indexed: registry.index.len(),
            buckets: registry.buckets.len(),
            bucket_entries: registry.buckets.entries(),
        }
    }

    /// Check the three internal maps against each other.
    pub async fn audit(&self) -> AuditReport {
        let registry = self.shared.registry.read().await;
        let mut report = AuditReport::default();

        for id in registry.sessions.keys() {
            if registry.index.get(id).is_none() {
                report.missing_expiration.push(id.clone());
            }
        }

        for (id, expires_at) in registry.index.iter() {
            if !registry.sessions.contains_key(id) {
                report.orphaned_expiration.push(id.clone());
            } else if !registry
                .buckets
                .covers(id, BucketKey::for_expiration(*expires_at))
            {
                report.unscheduled.push(id.clone());
            }
        }

        report
    }

    /// Stop the reclaimer and wait for it to finish.
    ///
    /// Sessions stay readable afterwards but are no longer reclaimed unless
    /// [`SessionStore::sweep`] is called. Calling this more than once is a no-op.
    pub async fn shutdown(&self) {
        if let Some(reclaimer) = &self.reclaimer {
            reclaimer.shutdown().await;
        }
    }

    fn fresh_id(&self, registry: &Registry<T>) -> Result<SessionId> {
        let attempts = self.shared.config.max_id_attempts;
        for attempt in 1..=attempts {
            let id = self.shared.ids.generate()?;
            if !registry.sessions.contains_key(&id) {
                return Ok(id);
            }
            warn!(attempt = attempt, "Generated session id collides with a live session");
        }
        Err(Error::IdentifierGeneration(format!(
            "no unused identifier after {} attempts",
            attempts
        )))
    }
}

impl<T: Payload> Clone for SessionStore<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            reclaimer: self.reclaimer.clone(),
        }
    }
}

/// Outcome of one sweep cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Latest bucket processed.
    pub swept_through: BucketKey,

    /// Number of buckets dropped.
    pub buckets: usize,

    /// Sessions that looked expired while collecting.
    pub candidates: usize,

    /// Sessions actually deleted.
    pub removed: usize,

    /// Live sessions moved to the next bucket because theirs was dropped.
    pub carried_over: usize,
}

/// Store statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Live sessions.
    pub sessions: usize,

    /// Entries in the expiration index.
    pub indexed: usize,

    /// Non-empty expiration buckets.
    pub buckets: usize,

    /// Bucket memberships, stale ones included.
    pub bucket_entries: usize,
}

/// Result of [`SessionStore::audit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Sessions without an expiration.
    pub missing_expiration: Vec<SessionId>,

    /// Expirations without a session.
    pub orphaned_expiration: Vec<SessionId>,

    /// Live sessions no bucket will ever bring to a sweep.
    pub unscheduled: Vec<SessionId>,
}

impl AuditReport {
    /// Whether no inconsistency was found.
    pub fn is_consistent(&self) -> bool {
        self.missing_expiration.is_empty()
            && self.orphaned_expiration.is_empty()
            && self.unscheduled.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 400_000_000).unwrap()
    }

    fn manual_store() -> (SessionStore, ManualClock) {
        let clock = ManualClock::new(start());
        let config = StoreConfig::new().with_reclaimer(false);
        let store = SessionStore::with_clock(config, Arc::new(clock.clone())).unwrap();
        (store, clock)
    }

    fn payload(key: &str, value: serde_json::Value) -> Data {
        let mut data = Data::new();
        data.insert(key.to_string(), value);
        data
    }

    #[tokio::test]
    async fn test_create_starts_empty() {
        let (store, _clock) = manual_store();
        let id = store.create().await.unwrap();

        assert!(store.get(&id).await.unwrap().is_empty());
        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.expires_at(&id).await.unwrap(),
            clock::add(start(), Duration::from_secs(5))
        );
    }

    #[tokio::test]
    async fn test_update_replaces_payload() {
        let (store, _clock) = manual_store();
        let id = store.create().await.unwrap();

        store
            .update(&id, payload("website", json!("longhoang.de")))
            .await
            .unwrap();
        store.update(&id, payload("theme", json!("dark"))).await.unwrap();

        let data = store.get(&id).await.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data["theme"], json!("dark"));
    }

    #[tokio::test]
    async fn test_update_unknown_session() {
        let (store, _clock) = manual_store();
        let result = store.update(&SessionId::from("nope"), Data::new()).await;
        assert!(matches!(result, Err(Error::SessionNotFound(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_unknown_session() {
        let (store, _clock) = manual_store();
        let result = store.get(&SessionId::from("nope")).await;
        assert!(matches!(result, Err(Error::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_update_extends_expiration() {
        let (store, clock) = manual_store();
        let id = store.create().await.unwrap();

        clock.advance(Duration::from_secs(3));
        store.update(&id, Data::new()).await.unwrap();

        assert_eq!(
            store.expires_at(&id).await.unwrap(),
            clock::add(start(), Duration::from_secs(8))
        );
        let session = store.get_session(&id).await.unwrap();
        assert_eq!(session.created_at, start());
        assert_eq!(session.updated_at, clock.now());
    }

    #[tokio::test]
    async fn test_sweep_before_ttl_keeps_session() {
        let (store, clock) = manual_store();
        let id = store.create().await.unwrap();

        clock.advance(Duration::from_secs(4));
        let report = store.sweep().await;

        assert_eq!(report.removed, 0);
        assert!(store.contains(&id).await);
    }

    #[tokio::test]
    async fn test_sweep_after_ttl_removes_session() {
        let (store, clock) = manual_store();
        let id = store.create().await.unwrap();

        clock.advance(Duration::from_secs(6));
        let report = store.sweep().await;

        assert_eq!(report.removed, 1);
        assert!(!store.contains(&id).await);
        assert!(matches!(
            store.expires_at(&id).await,
            Err(Error::SessionNotFound(_))
        ));
        assert_eq!(
            store.stats().await,
            StoreStats {
                sessions: 0,
                indexed: 0,
                buckets: 0,
                bucket_entries: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_stale_bucket_entry_does_not_evict_renewed_session() {
        let (store, clock) = manual_store();
        let id = store.create().await.unwrap();

        clock.advance(Duration::from_secs(4));
        store.update(&id, Data::new()).await.unwrap();
        assert_eq!(store.stats().await.bucket_entries, 2);

        // The first bucket is due now, the renewed expiration is not.
        clock.advance(Duration::from_secs(2));
        let report = store.sweep().await;

        assert_eq!(report.candidates, 0);
        assert_eq!(report.removed, 0);
        assert_eq!(report.buckets, 1);
        assert!(store.contains(&id).await);
        assert_eq!(store.stats().await.bucket_entries, 1);
        assert!(store.audit().await.is_consistent());
    }

    #[tokio::test]
    async fn test_sweep_catches_up_missed_buckets() {
        let (store, clock) = manual_store();
        let first = store.create().await.unwrap();
        clock.advance(Duration::from_secs(1));
        let second = store.create().await.unwrap();

        // No sweep ran for a while; both buckets are overdue.
        clock.advance(Duration::from_secs(30));
        let report = store.sweep().await;

        assert_eq!(report.removed, 2);
        assert_eq!(report.buckets, 2);
        assert!(!store.contains(&first).await);
        assert!(!store.contains(&second).await);
    }

    #[tokio::test]
    async fn test_repeated_sweep_is_harmless() {
        let (store, clock) = manual_store();
        store.create().await.unwrap();

        clock.advance(Duration::from_secs(6));
        assert_eq!(store.sweep().await.removed, 1);
        assert_eq!(store.sweep().await.removed, 0);
        assert!(store.audit().await.is_consistent());
    }

    #[test]
    fn test_session_filed_after_collection_is_carried_over() {
        let now = start();
        let through = BucketKey::for_sweep(now);
        let tolerance = Duration::from_millis(10);
        let mut registry: Registry<Data> = Registry::new();

        let candidates = registry.candidates(through, now, tolerance);
        assert!(candidates.is_empty());

        // Lands between the two phases with an expiration the sweep has
        // already passed, as after a backward wall-clock step.
        let id = SessionId::from("late");
        registry
            .sessions
            .insert(id.clone(), Session::new(Data::new(), now));
        registry.schedule(&id, clock::sub(now, Duration::from_secs(2)));

        let report = registry.reclaim(&candidates, through, now, tolerance);
        assert_eq!(report.removed, 0);
        assert_eq!(report.carried_over, 1);
        assert!(registry.sessions.contains_key(&id));
        assert!(registry.buckets.covers(&id, through.next()));

        // The next sweep picks it up.
        let later = clock::add(now, Duration::from_secs(1));
        let next = BucketKey::for_sweep(later);
        let candidates = registry.candidates(next, later, tolerance);
        let report = registry.reclaim(&candidates, next, later, tolerance);
        assert_eq!(report.removed, 1);
        assert!(registry.sessions.is_empty());
        assert!(registry.index.is_empty());
    }

    #[test]
    fn test_candidate_renewed_between_phases_survives() {
        let now = start();
        let through = BucketKey::for_sweep(now);
        let tolerance = Duration::from_millis(10);
        let mut registry: Registry<Data> = Registry::new();

        let id = SessionId::from("renewed");
        registry
            .sessions
            .insert(id.clone(), Session::new(Data::new(), now));
        registry.schedule(&id, clock::sub(now, Duration::from_secs(1)));

        let candidates = registry.candidates(through, now, tolerance);
        assert_eq!(candidates, vec![id.clone()]);

        // Update lands after collection.
        registry.schedule(&id, clock::add(now, Duration::from_secs(5)));

        let report = registry.reclaim(&candidates, through, now, tolerance);
        assert_eq!(report.candidates, 1);
        assert_eq!(report.removed, 0);
        assert!(registry.sessions.contains_key(&id));
        assert!(registry.index.get(&id).is_some());
    }

    #[test]
    fn test_expiration_without_session_is_dropped_quietly() {
        let now = start();
        let through = BucketKey::for_sweep(now);
        let tolerance = Duration::from_millis(10);
        let mut registry: Registry<Data> = Registry::new();

        // Indexed and filed, but no session record.
        let id = SessionId::from("orphan");
        registry.schedule(&id, clock::sub(now, Duration::from_secs(1)));

        let candidates = registry.candidates(through, now, tolerance);
        assert_eq!(candidates, vec![id.clone()]);

        let report = registry.reclaim(&candidates, through, now, tolerance);
        assert_eq!(report.candidates, 1);
        assert_eq!(report.removed, 0);
        assert_eq!(report.carried_over, 0);
        assert!(registry.index.is_empty());
        assert!(registry.buckets.is_empty());
    }

    #[tokio::test]
    async fn test_audit_clean_store() {
        let (store, _clock) = manual_store();
        for _ in 0..10 {
            store.create().await.unwrap();
        }
        let report = store.audit().await;
        assert!(report.is_consistent());
        assert_eq!(store.stats().await.indexed, 10);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = SessionStore::<Data>::new(StoreConfig::new().with_ttl(Duration::ZERO));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    struct FixedIds {
        calls: AtomicUsize,
    }

    impl IdSource for FixedIds {
        fn generate(&self) -> Result<SessionId> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SessionId::from("always-the-same"))
        }
    }

    struct BrokenIds;

    impl IdSource for BrokenIds {
        fn generate(&self) -> Result<SessionId> {
            Err(Error::IdentifierGeneration("entropy source unavailable".into()))
        }
    }

    #[tokio::test]
    async fn test_id_collision_exhausts_attempts() {
        let ids = Arc::new(FixedIds {
            calls: AtomicUsize::new(0),
        });
        let config = StoreConfig::new()
            .with_reclaimer(false)
            .with_max_id_attempts(3);
        let store: SessionStore =
            SessionStore::with_sources(config, Arc::new(SystemClock), ids.clone()).unwrap();

        store.create().await.unwrap();
        let result = store.create().await;

        assert!(matches!(result, Err(Error::IdentifierGeneration(_))));
        assert_eq!(ids.calls.load(Ordering::SeqCst), 4);
        assert_eq!(store.len().await, 1);
        assert!(store.audit().await.is_consistent());
    }

    #[tokio::test]
    async fn test_id_source_failure_creates_nothing() {
        let config = StoreConfig::new().with_reclaimer(false);
        let store: SessionStore =
            SessionStore::with_sources(config, Arc::new(SystemClock), Arc::new(BrokenIds))
                .unwrap();

        let result = store.create().await;
        assert!(matches!(result, Err(Error::IdentifierGeneration(_))));
        assert!(store.is_empty().await);
        assert_eq!(store.stats().await.bucket_entries, 0);
    }

    #[tokio::test]
    async fn test_typed_payload() {
        #[derive(Debug, Clone, Default, PartialEq)]
        struct Cart {
            items: Vec<String>,
        }

        let config = StoreConfig::new().with_reclaimer(false);
        let store: SessionStore<Cart> = SessionStore::new(config).unwrap();
        let id = store.create().await.unwrap();
        store
            .update(
                &id,
                Cart {
                    items: vec!["book".into()],
                },
            )
            .await
            .unwrap();

        assert_eq!(store.get(&id).await.unwrap().items, vec!["book"]);
    }
}
