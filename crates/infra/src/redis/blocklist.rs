//! Redis-backed block store.
//!
//! Each blocked source lives under its own `blocked_ips:{ip}` key with a
//! server-side TTL, so the admission check is a single `EXISTS` and expiry
//! needs no sweeper. The entry body is the serialized [`BlockEntry`] so
//! the metrics surface can show reason and deadlines.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use crewdesk_threat::{BlockEntry, BlockStore, BlockStoreError};

const KEY_PREFIX: &str = "blocked_ips:";

fn unavailable(err: redis::RedisError) -> BlockStoreError {
    BlockStoreError::Unavailable(err.to_string())
}

fn block_key(ip: IpAddr) -> String {
    format!("{KEY_PREFIX}{ip}")
}

fn deadline(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, BlockStoreError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| BlockStoreError::Unavailable(format!("ttl out of range: {e}")))?;
    Ok(now + ttl)
}

/// Extend-never-shorten merge of a new block over whatever is stored.
fn merge_entry(
    existing: Option<BlockEntry>,
    ip: IpAddr,
    requested: DateTime<Utc>,
    reason: &str,
    now: DateTime<Utc>,
) -> BlockEntry {
    match existing {
        Some(prev) if prev.active_at(now) => BlockEntry {
            ip,
            reason: reason.to_string(),
            created_at: prev.created_at,
            expires_at: prev.expires_at.max(requested),
        },
        _ => BlockEntry {
            ip,
            reason: reason.to_string(),
            created_at: now,
            expires_at: requested,
        },
    }
}

#[derive(Clone)]
pub struct RedisBlockStore {
    conn: MultiplexedConnection,
}

impl RedisBlockStore {
    pub async fn connect(redis_url: &str) -> Result<Self, BlockStoreError> {
        let client = redis::Client::open(redis_url).map_err(unavailable)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;
        Ok(Self { conn })
    }

    async fn read_entry(&self, key: &str) -> Result<Option<BlockEntry>, BlockStoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.map_err(unavailable)?;
        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| BlockStoreError::Unavailable(format!("corrupt block entry: {e}")))
        })
        .transpose()
    }
}

#[async_trait]
impl BlockStore for RedisBlockStore {
    async fn is_blocked(&self, ip: IpAddr, _now: DateTime<Utc>) -> Result<bool, BlockStoreError> {
        // Redis enforces expiry itself, so existence is the whole answer.
        let mut conn = self.conn.clone();
        conn.exists(block_key(ip)).await.map_err(unavailable)
    }

    async fn block(
        &self,
        ip: IpAddr,
        ttl: Duration,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<BlockEntry, BlockStoreError> {
        let requested = deadline(now, ttl)?;
        let key = block_key(ip);

        let existing = self.read_entry(&key).await?;
        let entry = merge_entry(existing, ip, requested, reason, now);

        let json = serde_json::to_string(&entry)
            .map_err(|e| BlockStoreError::Unavailable(format!("encode block entry: {e}")))?;
        let remaining = (entry.expires_at - now).num_seconds().max(1) as u64;

        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, json, remaining)
            .await
            .map_err(unavailable)?;
        Ok(entry)
    }

    async fn unblock(&self, ip: IpAddr) -> Result<bool, BlockStoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(block_key(ip)).await.map_err(unavailable)?;
        Ok(removed > 0)
    }

    async fn active(&self, now: DateTime<Utc>) -> Result<Vec<BlockEntry>, BlockStoreError> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(format!("{KEY_PREFIX}*"))
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            // A key can expire between SCAN and GET; skip it.
            if let Some(entry) = self.read_entry(&key).await? {
                if entry.active_at(now) {
                    entries.push(entry);
                }
            }
        }
        entries.sort_by(|a, b| b.expires_at.cmp(&a.expires_at));
        Ok(entries)
    }
}

// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn ip() -> IpAddr {
        IpAddr::from([203, 0, 113, 9])
    }

    #[test]
    fn merge_keeps_the_later_deadline() {
        let t0 = now();
        let first = merge_entry(None, ip(), t0 + chrono::Duration::seconds(1800), "score 85", t0);
        assert_eq!(first.created_at, t0);

        let shorter = merge_entry(
            Some(first.clone()),
            ip(),
            t0 + chrono::Duration::seconds(60),
            "score 80",
            t0,
        );
        assert_eq!(shorter.expires_at, first.expires_at);
        assert_eq!(shorter.reason, "score 80");

        let longer = merge_entry(
            Some(first.clone()),
            ip(),
            t0 + chrono::Duration::seconds(3600),
            "score 95",
            t0,
        );
        assert_eq!(longer.expires_at, t0 + chrono::Duration::seconds(3600));
        assert_eq!(longer.created_at, first.created_at);
    }

    #[test]
    fn merge_restarts_over_an_expired_entry() {
        let t0 = now();
        let stale = BlockEntry {
            ip: ip(),
            reason: "old".to_string(),
            created_at: t0 - chrono::Duration::hours(2),
            expires_at: t0 - chrono::Duration::hours(1),
        };
        let fresh = merge_entry(
            Some(stale),
            ip(),
            t0 + chrono::Duration::seconds(1800),
            "score 85",
            t0,
        );
        assert_eq!(fresh.created_at, t0);
        assert_eq!(fresh.expires_at, t0 + chrono::Duration::seconds(1800));
    }
}
