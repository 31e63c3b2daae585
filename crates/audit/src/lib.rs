//! `crewdesk-audit` — immutable audit trail for access decisions.
//!
//! Auditing here is observation, not control flow: operations produce
//! [`AuditDraft`]s describing what they decided, and [`AuditSink`] records
//! them without ever failing the operation that produced them.

pub mod record;
pub mod sink;
pub mod store;

pub use record::{AuditAction, AuditDraft, AuditRecord};
pub use sink::AuditSink;
pub use store::{AuditStore, AuditStoreError, InMemoryAuditStore};
