//! Redis-backed counter store.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use crewdesk_threat::{CounterStore, CounterStoreError};

fn unavailable(err: redis::RedisError) -> CounterStoreError {
    CounterStoreError::Unavailable(err.to_string())
}

fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1)
}

/// Counter store over a multiplexed Redis connection.
///
/// The connection is cheap to clone and safe to share; reconnection is
/// handled inside the driver items. All TTL enforcement is server-side.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: MultiplexedConnection,
}

impl RedisCounterStore {
    pub async fn connect(redis_url: &str) -> Result<Self, CounterStoreError> {
        let client = redis::Client::open(redis_url).map_err(unavailable)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, CounterStoreError> {
        let mut conn = self.conn.clone();
        let value: u64 = conn.incr(key, 1u64).await.map_err(unavailable)?;
        // INCR created the key; pin the window to the first event.
        if value == 1 {
            let _: i64 = conn.expire(key, ttl_secs(ttl)).await.map_err(unavailable)?;
        }
        Ok(value)
    }

    async fn get(&self, key: &str) -> Result<u64, CounterStoreError> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = conn.get(key).await.map_err(unavailable)?;
        Ok(value.unwrap_or(0))
    }

    async fn remove(&self, key: &str) -> Result<(), CounterStoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await.map_err(unavailable)?;
        Ok(())
    }

    async fn add_member(
        &self,
        key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<(), CounterStoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.sadd(key, member).await.map_err(unavailable)?;
        let _: i64 = conn.expire(key, ttl_secs(ttl)).await.map_err(unavailable)?;
        Ok(())
    }

    async fn has_member(&self, key: &str, member: &str) -> Result<bool, CounterStoreError> {
        let mut conn = self.conn.clone();
        conn.sismember(key, member).await.map_err(unavailable)
    }

    async fn put_value(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CounterStoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl.as_secs().max(1))
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, CounterStoreError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(unavailable)
    }
}
