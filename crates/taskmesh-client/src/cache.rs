//! TTL cache of agent records keyed by `(repo, name)`.
//!
//! Guarded by a std mutex that is only ever held for map operations, never
//! across a request.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use taskmesh_core::AgentRecord;

struct CachedAgent {
    agent: AgentRecord,
    stored_at: Instant,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<(String, String), CachedAgent>,
    hits: u64,
    misses: u64,
}

pub struct AgentCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
}

impl AgentCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            ttl,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of the cached record, unless absent or expired.
    pub fn get(&self, repo: &str, name: &str) -> Option<AgentRecord> {
        let key = (repo.to_string(), name.to_string());
        let mut guard = self.lock();
        let inner = &mut *guard;
        let expired = inner
            .entries
            .get(&key)
            .map(|entry| entry.stored_at.elapsed() > self.ttl);
        let fresh = match expired {
            Some(false) => inner.entries.get(&key).map(|entry| entry.agent.clone()),
            Some(true) => {
                inner.entries.remove(&key);
                None
            }
            None => None,
        };
        match fresh {
            Some(_) => inner.hits += 1,
            None => inner.misses += 1,
        }
        fresh
    }

    pub fn put(&self, agent: AgentRecord) {
        let key = agent.key();
        self.lock().entries.insert(
            key,
            CachedAgent {
                agent,
                stored_at: Instant::now(),
            },
        );
    }

    /// Store every record from a listing.
    pub fn put_all(&self, agents: &[AgentRecord]) {
        let now = Instant::now();
        let mut inner = self.lock();
        for agent in agents {
            inner.entries.insert(
                agent.key(),
                CachedAgent {
                    agent: agent.clone(),
                    stored_at: now,
                },
            );
        }
    }

    pub fn remove(&self, repo: &str, name: &str) {
        self.lock()
            .entries
            .remove(&(repo.to_string(), name.to_string()));
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::AgentType;

    #[test]
    fn test_get_returns_copy_until_ttl() {
        let cache = AgentCache::new(Duration::from_millis(50));
        cache.put(AgentRecord::new("acme/api", "w1", AgentType::Worker));

        let mut copy = cache.get("acme/api", "w1").unwrap();
        copy.name = "changed".to_string();
        assert_eq!(cache.get("acme/api", "w1").unwrap().name, "w1");

        std::thread::sleep(Duration::from_millis(80));
        assert!(cache.get("acme/api", "w1").is_none());
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 2,
                misses: 1,
                entries: 0
            }
        );
    }

    #[test]
    fn test_put_all_and_remove() {
        let cache = AgentCache::new(Duration::from_secs(30));
        cache.put_all(&[
            AgentRecord::new("a", "w1", AgentType::Worker),
            AgentRecord::new("b", "w1", AgentType::Review),
        ]);
        assert_eq!(cache.stats().entries, 2);

        cache.remove("a", "w1");
        assert!(cache.get("a", "w1").is_none());
        assert!(cache.get("b", "w1").is_some());

        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }
}
