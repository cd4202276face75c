//! Concurrent workload tests for the session store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lapse_session::{Clock, Data, Error, ManualClock, SessionId, SessionStore, StoreConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

const TTL: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_are_distinct() {
    let store: SessionStore = SessionStore::new(StoreConfig::default()).unwrap();

    let mut handles = Vec::new();
    for _ in 0..64 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for _ in 0..50 {
                ids.push(store.create().await.unwrap());
            }
            ids
        }));
    }

    let mut all = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(all.insert(id), "duplicate session id");
        }
    }

    assert_eq!(all.len(), 64 * 50);
    assert_eq!(store.len().await, 64 * 50);
    assert!(store.audit().await.is_consistent());
    store.shutdown().await;
}

/// Session a worker owns, with a lower bound on its last renewal.
struct Tracked {
    id: SessionId,
    renewed_no_earlier_than: DateTime<Utc>,
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_randomized_workload_stays_consistent() {
    let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
    let config = StoreConfig::new()
        .with_ttl(TTL)
        .with_sweep_interval(Duration::from_millis(5));
    let store: SessionStore = SessionStore::with_clock(config, Arc::new(clock.clone())).unwrap();

    // Drives the manual clock while workers run.
    let ticker = {
        let clock = clock.clone();
        tokio::spawn(async move {
            for _ in 0..400 {
                clock.advance(Duration::from_millis(50));
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    let mut workers = Vec::new();
    for seed in 0..8u64 {
        let store = store.clone();
        let clock = clock.clone();
        workers.push(tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut owned: Vec<Tracked> = Vec::new();
            let mut early_losses = 0;

            for step in 0..600 {
                match rng.random_range(0..10) {
                    0..=2 => {
                        let renewed_no_earlier_than = clock.now();
                        let id = store.create().await.unwrap();
                        owned.push(Tracked {
                            id,
                            renewed_no_earlier_than,
                        });
                    }
                    3..=5 if !owned.is_empty() => {
                        let pick = rng.random_range(0..owned.len());
                        let renewed_no_earlier_than = clock.now();
                        let mut data = Data::new();
                        data.insert("step".to_string(), json!(step));
                        match store.update(&owned[pick].id, data).await {
                            Ok(()) => owned[pick].renewed_no_earlier_than = renewed_no_earlier_than,
                            Err(Error::SessionNotFound(_)) => {
                                owned.swap_remove(pick);
                            }
                            Err(e) => panic!("unexpected error: {}", e),
                        }
                    }
                    6..=8 if !owned.is_empty() => {
                        let pick = rng.random_range(0..owned.len());
                        if let Err(Error::SessionNotFound(_)) = store.get(&owned[pick].id).await {
                            let observed = clock.now();
                            let ttl = chrono::Duration::from_std(TTL).unwrap();
                            if observed < owned[pick].renewed_no_earlier_than + ttl {
                                early_losses += 1;
                            }
                            owned.swap_remove(pick);
                        }
                    }
                    _ => {
                        store.sweep().await;
                    }
                }
                if step % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }

            early_losses
        }));
    }

    for worker in workers {
        assert_eq!(worker.await.unwrap(), 0, "session reclaimed before its TTL");
    }
    ticker.await.unwrap();

    let report = store.audit().await;
    assert!(report.is_consistent(), "inconsistent store: {:?}", report);

    let stats = store.stats().await;
    assert_eq!(stats.sessions, stats.indexed);
    store.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_everything_expires_once_idle() {
    let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
    let config = StoreConfig::new().with_reclaimer(false);
    let store: SessionStore = SessionStore::with_clock(config, Arc::new(clock.clone())).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                let id = store.create().await.unwrap();
                store.update(&id, Data::new()).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(store.len().await, 800);

    clock.advance(TTL + Duration::from_secs(2));
    let report = store.sweep().await;

    assert_eq!(report.removed, 800);
    assert!(store.is_empty().await);
    assert_eq!(store.stats().await.bucket_entries, 0);
}
