//! TTL-bounded counter/cache port backing the threat heuristics.
//!
//! Counters are heuristic state, not a security boundary: eventual
//! consistency and the occasional lost increment are acceptable, which is why
//! the interface maps directly onto a shared cache (Redis in production,
//! in-memory here).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crewdesk_core::Clock;

#[derive(Debug, Error)]
pub enum CounterStoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Shared ephemeral state: counters, membership sets and small values, all
/// with a TTL. Keys are opaque strings owned by the caller.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter at `key` by one and return the new value.
    ///
    /// The TTL applies from the first increment of a window; increments
    /// within the window do not extend it. That gives "N events within T of
    /// the first" semantics, which is what the login-failure window wants.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, CounterStoreError>;

    /// Current counter value; 0 when absent or expired.
    async fn get(&self, key: &str) -> Result<u64, CounterStoreError>;

    async fn remove(&self, key: &str) -> Result<(), CounterStoreError>;

    /// Add `member` to the set at `key` and slide the set's TTL forward.
    async fn add_member(
        &self,
        key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<(), CounterStoreError>;

    async fn has_member(&self, key: &str, member: &str) -> Result<bool, CounterStoreError>;

    /// Overwrite the value at `key` with a fresh TTL.
    async fn put_value(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CounterStoreError>;

    async fn get_value(&self, key: &str) -> Result<Option<String>, CounterStoreError>;
}

#[async_trait]
impl<S> CounterStore for Arc<S>
where
    S: CounterStore + ?Sized,
{
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, CounterStoreError> {
        (**self).incr(key, ttl).await
    }

    async fn get(&self, key: &str) -> Result<u64, CounterStoreError> {
        (**self).get(key).await
    }

    async fn remove(&self, key: &str) -> Result<(), CounterStoreError> {
        (**self).remove(key).await
    }

    async fn add_member(
        &self,
        key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<(), CounterStoreError> {
        (**self).add_member(key, member, ttl).await
    }

    async fn has_member(&self, key: &str, member: &str) -> Result<bool, CounterStoreError> {
        (**self).has_member(key, member).await
    }

    async fn put_value(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CounterStoreError> {
        (**self).put_value(key, value, ttl).await
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, CounterStoreError> {
        (**self).get_value(key).await
    }
}

struct Expiring<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

impl<T> Expiring<T> {
    fn live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Default)]
struct CounterState {
    counters: HashMap<String, Expiring<u64>>,
    sets: HashMap<String, Expiring<HashSet<String>>>,
    values: HashMap<String, Expiring<String>>,
}

/// In-memory counter store.
///
/// Takes a [`Clock`] so TTL expiry is testable; expired entries are replaced
/// lazily on access rather than swept.
pub struct InMemoryCounterStore {
    state: RwLock<CounterState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(CounterState::default()),
            clock,
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, CounterState>, CounterStoreError> {
        self.state
            .read()
            .map_err(|_| CounterStoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, CounterState>, CounterStoreError> {
        self.state
            .write()
            .map_err(|_| CounterStoreError::Unavailable("lock poisoned".to_string()))
    }
}

fn deadline(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, CounterStoreError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| CounterStoreError::Unavailable(format!("ttl out of range: {e}")))?;
    Ok(now + ttl)
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, CounterStoreError> {
        let now = self.clock.now();
        let expires_at = deadline(now, ttl)?;
        let mut state = self.write()?;

        let entry = state.counters.entry(key.to_string()).or_insert(Expiring {
            value: 0,
            expires_at,
        });
        if !entry.live(now) {
            entry.value = 0;
            entry.expires_at = expires_at;
        }
        entry.value += 1;
        Ok(entry.value)
    }

    async fn get(&self, key: &str) -> Result<u64, CounterStoreError> {
        let now = self.clock.now();
        let state = self.read()?;
        Ok(state
            .counters
            .get(key)
            .filter(|e| e.live(now))
            .map(|e| e.value)
            .unwrap_or(0))
    }

    async fn remove(&self, key: &str) -> Result<(), CounterStoreError> {
        self.write()?.counters.remove(key);
        Ok(())
    }

    async fn add_member(
        &self,
        key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<(), CounterStoreError> {
        let now = self.clock.now();
        let expires_at = deadline(now, ttl)?;
        let mut state = self.write()?;

        let entry = state.sets.entry(key.to_string()).or_insert(Expiring {
            value: HashSet::new(),
            expires_at,
        });
        if !entry.live(now) {
            entry.value.clear();
        }
        entry.value.insert(member.to_string());
        entry.expires_at = expires_at;
        Ok(())
    }

    async fn has_member(&self, key: &str, member: &str) -> Result<bool, CounterStoreError> {
        let now = self.clock.now();
        let state = self.read()?;
        Ok(state
            .sets
            .get(key)
            .filter(|e| e.live(now))
            .is_some_and(|e| e.value.contains(member)))
    }

    async fn put_value(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CounterStoreError> {
        let now = self.clock.now();
        let expires_at = deadline(now, ttl)?;
        self.write()?.values.insert(
            key.to_string(),
            Expiring {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, CounterStoreError> {
        let now = self.clock.now();
        let state = self.read()?;
        Ok(state
            .values
            .get(key)
            .filter(|e| e.live(now))
            .map(|e| e.value.clone()))
    }
}
