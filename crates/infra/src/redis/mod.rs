//! Redis adapters (feature `redis`).
//!
//! Counters and blocks live in Redis because both are TTL-shaped and shared
//! by every handler process; Redis expiry does the cleanup the domain ports
//! promise. The security event bus uses pub/sub and is fire-and-forget:
//! the audit trail is the durable record, the bus only fans out.

pub mod blocklist;
pub mod counters;
pub mod event_bus;

pub use blocklist::RedisBlockStore;
pub use counters::RedisCounterStore;
pub use event_bus::{RedisBusError, RedisSecurityEventBus};
