//! TTL-bounded denylist of source IPs.
//!
//! Admission reads this before anything else in the request path, so the
//! read side must stay O(1) and free of side effects (no lazy purging on
//! read). Blocks are written by the scorer on critical verdicts and by
//! administrators; unblocking early is an operator action.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlockStoreError {
    #[error("block store unavailable: {0}")]
    Unavailable(String),
}

/// One active (or expired-but-unswept) block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub ip: IpAddr,
    /// What triggered the block, e.g. `"threat score 85"`.
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl BlockEntry {
    pub fn active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Admission-path read. O(1) and side-effect-free.
    async fn is_blocked(&self, ip: IpAddr, now: DateTime<Utc>) -> Result<bool, BlockStoreError>;

    /// Idempotent block. Extends an existing entry's expiry when the new
    /// deadline is later, never shortens it; the reason reflects the latest
    /// trigger. Expiry is read-then-max-then-write, so a rare lost update
    /// still leaves the source blocked.
    async fn block(
        &self,
        ip: IpAddr,
        ttl: Duration,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<BlockEntry, BlockStoreError>;

    /// Operator-initiated early removal. Returns whether an entry existed.
    async fn unblock(&self, ip: IpAddr) -> Result<bool, BlockStoreError>;

    /// Currently-active entries, newest expiry first. Metrics surface.
    async fn active(&self, now: DateTime<Utc>) -> Result<Vec<BlockEntry>, BlockStoreError>;
}

#[async_trait]
impl<S> BlockStore for Arc<S>
where
    S: BlockStore + ?Sized,
{
    async fn is_blocked(&self, ip: IpAddr, now: DateTime<Utc>) -> Result<bool, BlockStoreError> {
        (**self).is_blocked(ip, now).await
    }

    async fn block(
        &self,
        ip: IpAddr,
        ttl: Duration,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<BlockEntry, BlockStoreError> {
        (**self).block(ip, ttl, reason, now).await
    }

    async fn unblock(&self, ip: IpAddr) -> Result<bool, BlockStoreError> {
        (**self).unblock(ip).await
    }

    async fn active(&self, now: DateTime<Utc>) -> Result<Vec<BlockEntry>, BlockStoreError> {
        (**self).active(now).await
    }
}

/// In-memory block store.
#[derive(Debug, Default)]
pub struct InMemoryBlockStore {
    entries: RwLock<HashMap<IpAddr, BlockEntry>>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn block_deadline(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, BlockStoreError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| BlockStoreError::Unavailable(format!("ttl out of range: {e}")))?;
    Ok(now + ttl)
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn is_blocked(&self, ip: IpAddr, now: DateTime<Utc>) -> Result<bool, BlockStoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| BlockStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(entries.get(&ip).is_some_and(|e| e.active_at(now)))
    }

    async fn block(
        &self,
        ip: IpAddr,
        ttl: Duration,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<BlockEntry, BlockStoreError> {
        let requested = block_deadline(now, ttl)?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| BlockStoreError::Unavailable("lock poisoned".to_string()))?;

        let entry = match entries.get(&ip) {
            Some(existing) if existing.active_at(now) => BlockEntry {
                ip,
                reason: reason.to_string(),
                created_at: existing.created_at,
                expires_at: existing.expires_at.max(requested),
            },
            _ => BlockEntry {
                ip,
                reason: reason.to_string(),
                created_at: now,
                expires_at: requested,
            },
        };
        entries.insert(ip, entry.clone());
        Ok(entry)
    }

    async fn unblock(&self, ip: IpAddr) -> Result<bool, BlockStoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| BlockStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(entries.remove(&ip).is_some())
    }

    async fn active(&self, now: DateTime<Utc>) -> Result<Vec<BlockEntry>, BlockStoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| BlockStoreError::Unavailable("lock poisoned".to_string()))?;
        let mut active: Vec<BlockEntry> = entries
            .values()
            .filter(|e| e.active_at(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.expires_at.cmp(&a.expires_at));
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([203, 0, 113, last])
    }

    #[tokio::test]
    async fn block_then_admission_check() {
        let store = InMemoryBlockStore::new();
        let t0 = now();

        assert!(!store.is_blocked(ip(1), t0).await.unwrap());
        store
            .block(ip(1), Duration::from_secs(1800), "threat score 85", t0)
            .await
            .unwrap();
        assert!(store.is_blocked(ip(1), t0).await.unwrap());

        // TTL elapsed.
        let later = t0 + chrono::Duration::seconds(1801);
        assert!(!store.is_blocked(ip(1), later).await.unwrap());
        assert!(store.active(later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expiry_extends_but_never_shortens() {
        let store = InMemoryBlockStore::new();
        let t0 = now();

        let first = store
            .block(ip(2), Duration::from_secs(1800), "threat score 85", t0)
            .await
            .unwrap();

        // A shorter re-block keeps the original deadline.
        let shorter = store
            .block(ip(2), Duration::from_secs(60), "threat score 80", t0)
            .await
            .unwrap();
        assert_eq!(shorter.expires_at, first.expires_at);

        // A longer one moves it out and keeps created_at.
        let longer = store
            .block(ip(2), Duration::from_secs(3600), "threat score 95", t0)
            .await
            .unwrap();
        assert_eq!(longer.expires_at, t0 + chrono::Duration::seconds(3600));
        assert_eq!(longer.created_at, first.created_at);
    }

    #[tokio::test]
    async fn unblock_removes_the_entry() {
        let store = InMemoryBlockStore::new();
        let t0 = now();

        store
            .block(ip(3), Duration::from_secs(1800), "manual", t0)
            .await
            .unwrap();
        assert!(store.unblock(ip(3)).await.unwrap());
        assert!(!store.is_blocked(ip(3), t0).await.unwrap());
        assert!(!store.unblock(ip(3)).await.unwrap());
    }
}
