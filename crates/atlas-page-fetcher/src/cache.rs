//! In-memory result cache keyed by `hash(url, opts)` with an LRU
//! bound and a TTL (§4.5, §5). Screenshots are never cached — this
//! crate doesn't carry screenshot bytes at all, so that rule is
//! satisfied by omission.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::{FetchOptions, FetchOutcome};

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct Entry {
    outcome: FetchOutcome,
    inserted_at: Instant,
    last_used: Instant,
}

pub struct ResultCache {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<HashMap<u64, Entry>>,
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(url: &str, opts: &FetchOptions) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        url.hash(&mut hasher);
        opts.hash(&mut hasher);
        hasher.finish()
    }

    /// Concurrent reads are safe (the whole map is behind one lock,
    /// but lookups never block on a fetch in flight); writes are
    /// effectively exclusive per key since the inserter is whichever
    /// caller's `fetch` actually ran (§5).
    pub async fn get(&self, key: u64) -> Option<FetchOutcome> {
        let mut entries = self.entries.lock().await;
        let expired = entries
            .get(&key)
            .map(|entry| entry.inserted_at.elapsed() > self.ttl)
            .unwrap_or(false);
        if expired {
            entries.remove(&key);
            return None;
        }
        let now = Instant::now();
        entries.get_mut(&key).map(|entry| {
            entry.last_used = now;
            entry.outcome.clone()
        })
    }

    pub async fn put(&self, key: u64, outcome: FetchOutcome) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.insert(
            key,
            Entry {
                outcome,
                inserted_at: now,
                last_used: now,
            },
        );
        if entries.len() > self.capacity {
            if let Some(lru_key) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| *k)
            {
                entries.remove(&lru_key);
            }
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}
