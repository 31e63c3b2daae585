//! Infrastructure adapters: Postgres persistence and Redis shared state.
//!
//! Everything here implements a port defined by a domain crate
//! (`GrantStore`, `AuditStore`, `DirectoryStore`, `CounterStore`,
//! `BlockStore`, `SecurityLogStore`, `EventBus`). The domain crates ship
//! in-memory implementations of the same ports; this crate is only wired
//! in when a deployment wants durability or cross-process state.

pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis;

pub use postgres::{
    PostgresAuditStore, PostgresDirectoryStore, PostgresGrantStore, PostgresSecurityLogStore,
    connect,
};

#[cfg(feature = "redis")]
pub use redis::{RedisBlockStore, RedisBusError, RedisCounterStore, RedisSecurityEventBus};
