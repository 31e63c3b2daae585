//! Audit store port.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crewdesk_core::{GrantId, TenantId, UserId};

use crate::record::AuditRecord;

/// Audit store operation error.
///
/// Infrastructure failures only; domain logic never sees these (the sink
/// absorbs them).
#[derive(Debug, Error)]
pub enum AuditStoreError {
    #[error("audit store unavailable: {0}")]
    Unavailable(String),

    #[error("audit record serialization failed: {0}")]
    Serialization(String),
}

/// Append-only, tenant-scoped audit store.
///
/// Implementations must never mutate or delete individual records;
/// `purge_older_than` exists solely for the retention job and works on whole
/// age bands.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<(), AuditStoreError>;

    /// All records referencing a grant, oldest first. Powers post-incident
    /// review of break-glass usage.
    async fn for_grant(
        &self,
        tenant_id: TenantId,
        grant_id: GrantId,
    ) -> Result<Vec<AuditRecord>, AuditStoreError>;

    /// Most recent records concerning a user, newest first.
    async fn for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, AuditStoreError>;

    /// Records created at or after `since`, newest first.
    async fn recent(
        &self,
        tenant_id: TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, AuditStoreError>;

    /// Drop records older than `cutoff` across all tenants. Returns the count
    /// removed. Scheduling is the retention job's concern, not this crate's.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AuditStoreError>;
}

#[async_trait]
impl<S> AuditStore for Arc<S>
where
    S: AuditStore + ?Sized,
{
    async fn append(&self, record: AuditRecord) -> Result<(), AuditStoreError> {
        (**self).append(record).await
    }

    async fn for_grant(
        &self,
        tenant_id: TenantId,
        grant_id: GrantId,
    ) -> Result<Vec<AuditRecord>, AuditStoreError> {
        (**self).for_grant(tenant_id, grant_id).await
    }

    async fn for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, AuditStoreError> {
        (**self).for_user(tenant_id, user_id, limit).await
    }

    async fn recent(
        &self,
        tenant_id: TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, AuditStoreError> {
        (**self).recent(tenant_id, since).await
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AuditStoreError> {
        (**self).purge_older_than(cutoff).await
    }
}

/// In-memory audit store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<AuditRecord>>, AuditStoreError> {
        self.records
            .read()
            .map_err(|_| AuditStoreError::Unavailable("lock poisoned".to_string()))
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, record: AuditRecord) -> Result<(), AuditStoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| AuditStoreError::Unavailable("lock poisoned".to_string()))?;
        records.push(record);
        Ok(())
    }

    async fn for_grant(
        &self,
        tenant_id: TenantId,
        grant_id: GrantId,
    ) -> Result<Vec<AuditRecord>, AuditStoreError> {
        let records = self.read()?;
        Ok(records
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.grant_id == Some(grant_id))
            .cloned()
            .collect())
    }

    async fn for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, AuditStoreError> {
        let records = self.read()?;
        let mut hits: Vec<AuditRecord> = records
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.user_id == Some(user_id))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn recent(
        &self,
        tenant_id: TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, AuditStoreError> {
        let records = self.read()?;
        let mut hits: Vec<AuditRecord> = records
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.created_at >= since)
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(hits)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AuditStoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| AuditStoreError::Unavailable("lock poisoned".to_string()))?;
        let before = records.len();
        records.retain(|r| r.created_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AuditDraft;
    use chrono::Duration;
    use crewdesk_core::AuditRecordId;

    fn record_at(tenant: TenantId, grant: Option<GrantId>, at: DateTime<Utc>) -> AuditRecord {
        let mut draft = AuditDraft::permission_denied(tenant, UserId::new(), "tickets.view", None);
        draft.grant_id = grant;
        draft.into_record(AuditRecordId::new(), at)
    }

    #[tokio::test]
    async fn for_grant_is_tenant_scoped() {
        let store = InMemoryAuditStore::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        let grant = GrantId::new();
        let now = Utc::now();

        store.append(record_at(tenant_a, Some(grant), now)).await.unwrap();
        store.append(record_at(tenant_b, Some(grant), now)).await.unwrap();

        let hits = store.for_grant(tenant_a, grant).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tenant_id, tenant_a);
    }

    #[tokio::test]
    async fn purge_removes_only_expired_records() {
        let store = InMemoryAuditStore::new();
        let tenant = TenantId::new();
        let now = Utc::now();

        store
            .append(record_at(tenant, None, now - Duration::days(120)))
            .await
            .unwrap();
        store.append(record_at(tenant, None, now)).await.unwrap();

        let removed = store.purge_older_than(now - Duration::days(90)).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.recent(tenant, now - Duration::days(365)).await.unwrap().len(), 1);
    }
}
